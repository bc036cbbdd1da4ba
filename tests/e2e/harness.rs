use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

static TEMP_COUNTER: AtomicUsize = AtomicUsize::new(0);

pub struct TestContext {
    pub bin_path: PathBuf,
    pub tmp_root: PathBuf,
}

pub struct CommandOutput {
    pub status: i32,
    pub stdout: String,
    pub stderr: String,
}

impl TestContext {
    pub fn new() -> Result<Self, String> {
        let bin_path = if let Some(path) = std::env::var_os("CARGO_BIN_EXE_filelock") {
            PathBuf::from(path)
        } else {
            let manifest_dir = std::env::var_os("CARGO_MANIFEST_DIR")
                .map(PathBuf::from)
                .ok_or_else(|| "CARGO_MANIFEST_DIR not set".to_string())?;
            let candidate = manifest_dir.join("target").join("debug").join("filelock");
            if !candidate.exists() {
                let status = Command::new("cargo")
                    .arg("build")
                    .current_dir(&manifest_dir)
                    .status()
                    .map_err(|e| format!("Failed to run cargo build: {e}"))?;
                if !status.success() {
                    return Err("cargo build failed".to_string());
                }
            }
            candidate
        };

        let tmp_root = std::env::temp_dir().join("filelock-e2e");
        fs::create_dir_all(&tmp_root).map_err(|e| format!("Failed to create temp root: {e}"))?;

        Ok(Self { bin_path, tmp_root })
    }

    pub fn unique_dir(&self, name: &str) -> Result<PathBuf, String> {
        let counter = TEMP_COUNTER.fetch_add(1, Ordering::SeqCst);
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| e.to_string())?
            .as_nanos();
        let dir = self.tmp_root.join(format!("{name}-{nanos}-{counter}"));
        fs::create_dir_all(&dir).map_err(|e| format!("Failed to create temp dir: {e}"))?;
        Ok(dir)
    }

    /// Run `filelock <args>` synchronously and collect its output.
    pub fn run_filelock(&self, args: &[&str], cwd: &Path) -> Result<CommandOutput, String> {
        let output = Command::new(&self.bin_path)
            .args(args)
            .current_dir(cwd)
            .output()
            .map_err(|e| format!("Failed to run filelock: {e}"))?;
        Ok(CommandOutput::from_output(output))
    }

    /// Spawn `filelock <args>` without waiting, for scenarios that need a
    /// background holder running concurrently with a foreground attempt.
    pub fn spawn_filelock(&self, args: &[&str], cwd: &Path) -> Result<std::process::Child, String> {
        Command::new(&self.bin_path)
            .args(args)
            .current_dir(cwd)
            .spawn()
            .map_err(|e| format!("Failed to spawn filelock: {e}"))
    }
}

impl CommandOutput {
    pub fn from_output(output: Output) -> Self {
        let status = output.status.code().unwrap_or(-1);
        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        Self {
            status,
            stdout,
            stderr,
        }
    }

    pub fn assert_exit_code(&self, expected: i32) -> Result<(), String> {
        if self.status == expected {
            Ok(())
        } else {
            Err(format!(
                "expected exit code {expected}, got {}: stdout={:?} stderr={:?}",
                self.status, self.stdout, self.stderr
            ))
        }
    }
}
