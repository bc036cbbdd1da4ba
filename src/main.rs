use std::process::{Command, ExitCode};

use clap::Parser;
use tracing_subscriber::EnvFilter;

use filelock::error::LockError;
use filelock::handle::LockHandle;

mod cli;
use cli::Cli;

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.debug.as_deref() == Some("true"));
    filelock::cleanup::install_signal_handlers_or_warn();

    let config = match cli.config() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("filelock: {err}");
            return ExitCode::from(1);
        }
    };

    let mut handle = LockHandle::new(cli.lockfile_path.clone(), config);

    let result = handle.with_lock(|| run_child(&cli.command));

    match result {
        Ok(child_status) => ExitCode::from(child_status),
        Err(err) => {
            eprintln!("filelock: {err}");
            ExitCode::from(exit_code_for(&err))
        }
    }
}

fn run_child(command: &[String]) -> filelock::error::Result<u8> {
    let (program, args) = command
        .split_first()
        .expect("clap requires at least one trailing command token");

    let status = Command::new(program).args(args).status().map_err(|source| {
        LockError::Io {
            path: std::path::PathBuf::from(program),
            source,
        }
    })?;

    Ok(status.code().unwrap_or(1).clamp(0, 255) as u8)
}

fn exit_code_for(err: &LockError) -> u8 {
    match err {
        LockError::TimeoutLockError { .. } => 2,
        LockError::MaxTriesLockError { .. } => 3,
        LockError::StolenLockError { .. } => 4,
        _ => 1,
    }
}

fn init_tracing(debug_flag: bool) {
    let env_debug = std::env::var("LOCKFILE_DEBUG")
        .map(|v| !v.is_empty() && v != "0" && v.to_lowercase() != "false")
        .unwrap_or(false);

    let filter = if debug_flag || env_debug {
        EnvFilter::new("filelock=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("filelock=warn"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}
