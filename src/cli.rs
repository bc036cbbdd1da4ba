//! Command-line surface (§6A): take a lockfile path, a long flag per
//! [`LockConfig`] field, a `--` separator, and a child command to run
//! while holding the lock.
//!
//! Every flag's value is one of the literal tokens `true`/`false`
//! (enabled/disabled) or `nil`/`null` (unset), or a plain number, mirroring
//! the source CLI this was distilled from. Accepting a closed, typed set
//! of fields means an unrecognized flag is a clap parse error rather than
//! a silently-ignored map entry.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::config::{LockConfig, LockConfigBuilder, Retries};
use crate::error::ConfigError;

#[derive(Parser, Debug)]
#[command(name = "filelock")]
#[command(version, about = "Hold an NFS-safe file lock while running a command", long_about = None)]
pub struct Cli {
    /// Path to the lockfile to acquire.
    pub lockfile_path: PathBuf,

    /// Outer retry bound: a count, or `nil`/`null` for unbounded.
    #[arg(long)]
    pub retries: Option<String>,

    /// Minimum backoff sleep, in seconds.
    #[arg(long)]
    pub min_sleep: Option<String>,

    /// Maximum backoff sleep, in seconds.
    #[arg(long)]
    pub max_sleep: Option<String>,

    /// Backoff step size, in seconds.
    #[arg(long)]
    pub sleep_inc: Option<String>,

    /// Age, in seconds, past which a held lock becomes stealable.
    /// `nil`/`null` disables stealing entirely.
    #[arg(long)]
    pub max_age: Option<String>,

    /// Pause after stealing a stale lock, in seconds.
    #[arg(long)]
    pub suspend: Option<String>,

    /// Background mtime-refresh interval, in seconds. `nil`/`null` (the
    /// default) disables the refresher.
    #[arg(long)]
    pub refresh: Option<String>,

    /// Wall-clock acquire deadline, in seconds. `nil`/`null` for none.
    #[arg(long)]
    pub timeout: Option<String>,

    /// Sub-attempts in each rapid polling phase.
    #[arg(long)]
    pub poll_retries: Option<String>,

    /// Upper bound, in seconds, on the random sleep between polls.
    #[arg(long)]
    pub poll_max_sleep: Option<String>,

    /// Suppress process-exit cleanup registration: `true`/`false`.
    #[arg(long)]
    pub dont_clean: Option<String>,

    /// Skip the sweeper pass at acquire time: `true`/`false`.
    #[arg(long)]
    pub dont_sweep: Option<String>,

    /// Enable debug tracing regardless of `LOCKFILE_DEBUG`: `true`/`false`.
    #[arg(long)]
    pub debug: Option<String>,

    /// Child command to run while holding the lock, after `--`.
    #[arg(last = true, required = true)]
    pub command: Vec<String>,
}

/// A token shared across every flag's grammar: `true`/`false`,
/// `nil`/`null`, or a raw value to be parsed by the field it belongs to.
enum Token<'a> {
    Bool(bool),
    Null,
    Raw(&'a str),
}

fn tokenize(s: &str) -> Token<'_> {
    match s {
        "true" => Token::Bool(true),
        "false" => Token::Bool(false),
        "nil" | "null" => Token::Null,
        raw => Token::Raw(raw),
    }
}

fn token_error(field: &str, value: &str) -> String {
    format!("invalid value for --{field}: {value:?}")
}

fn parse_flag(field: &str, value: &str) -> Result<bool, String> {
    match tokenize(value) {
        Token::Bool(b) => Ok(b),
        _ => Err(token_error(field, value)),
    }
}

fn parse_seconds(field: &str, value: &str) -> Result<Duration, String> {
    match tokenize(value) {
        Token::Raw(raw) => raw
            .parse::<f64>()
            .map(Duration::from_secs_f64)
            .map_err(|_| token_error(field, value)),
        _ => Err(token_error(field, value)),
    }
}

fn parse_optional_seconds(field: &str, value: &str) -> Result<Option<Duration>, String> {
    match tokenize(value) {
        Token::Null => Ok(None),
        Token::Raw(raw) => raw
            .parse::<f64>()
            .map(|secs| Some(Duration::from_secs_f64(secs)))
            .map_err(|_| token_error(field, value)),
        Token::Bool(_) => Err(token_error(field, value)),
    }
}

fn parse_retries(field: &str, value: &str) -> Result<Retries, String> {
    match tokenize(value) {
        Token::Null => Ok(Retries::Infinite),
        Token::Raw(raw) => raw
            .parse::<u64>()
            .map(Retries::Finite)
            .map_err(|_| token_error(field, value)),
        Token::Bool(_) => Err(token_error(field, value)),
    }
}

fn parse_count(field: &str, value: &str) -> Result<u64, String> {
    match tokenize(value) {
        Token::Raw(raw) => raw.parse::<u64>().map_err(|_| token_error(field, value)),
        _ => Err(token_error(field, value)),
    }
}

impl Cli {
    /// Build the [`LockConfig`] this invocation describes. Flag parse
    /// failures are reported as plain strings, matching the weak typing
    /// of the underlying token grammar; cross-field invariants are then
    /// checked by [`LockConfigBuilder::build`].
    pub fn config(&self) -> Result<LockConfig, String> {
        let mut builder = LockConfigBuilder::new();

        if let Some(v) = &self.retries {
            builder = builder.retries(parse_retries("retries", v)?);
        }
        if let Some(v) = &self.min_sleep {
            builder = builder.min_sleep(parse_seconds("min_sleep", v)?);
        }
        if let Some(v) = &self.max_sleep {
            builder = builder.max_sleep(parse_seconds("max_sleep", v)?);
        }
        if let Some(v) = &self.sleep_inc {
            builder = builder.sleep_inc(parse_seconds("sleep_inc", v)?);
        }
        if let Some(v) = &self.max_age {
            builder = builder.max_age(parse_optional_seconds("max_age", v)?);
        }
        if let Some(v) = &self.suspend {
            builder = builder.suspend(parse_seconds("suspend", v)?);
        }
        if let Some(v) = &self.refresh {
            builder = builder.refresh(parse_optional_seconds("refresh", v)?);
        }
        if let Some(v) = &self.timeout {
            builder = builder.timeout(parse_optional_seconds("timeout", v)?);
        }
        if let Some(v) = &self.poll_retries {
            builder = builder.poll_retries(parse_count("poll_retries", v)?);
        }
        if let Some(v) = &self.poll_max_sleep {
            builder = builder.poll_max_sleep(parse_seconds("poll_max_sleep", v)?);
        }
        if let Some(v) = &self.dont_clean {
            builder = builder.dont_clean(parse_flag("dont_clean", v)?);
        }
        if let Some(v) = &self.dont_sweep {
            builder = builder.dont_sweep(parse_flag("dont_sweep", v)?);
        }
        if let Some(v) = &self.debug {
            builder = builder.debug(parse_flag("debug", v)?);
        }

        builder.build().map_err(config_error_to_string)
    }
}

fn config_error_to_string(err: ConfigError) -> String {
    err.to_string()
}
