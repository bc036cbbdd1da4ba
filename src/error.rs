//! Error types for lock acquisition, release, and configuration.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors produced while building a [`crate::config::LockConfig`].
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("min_sleep ({min_sleep:?}) must be <= max_sleep ({max_sleep:?})")]
    SleepRangeInverted {
        min_sleep: std::time::Duration,
        max_sleep: std::time::Duration,
    },

    #[error("sleep_inc must be > 0")]
    ZeroSleepInc,

    #[error("max_age must be > 0 when set")]
    ZeroMaxAge,

    #[error("refresh must be > 0 when set")]
    ZeroRefresh,
}

/// Errors produced while acquiring, holding, or releasing a lock.
#[derive(Error, Debug)]
pub enum LockError {
    /// Outer retries exhausted without acquisition.
    #[error("failed to acquire lock on {path}: max retries exhausted")]
    MaxTriesLockError { path: PathBuf },

    /// Wall-clock deadline exceeded during acquire.
    #[error("failed to acquire lock on {path}: timed out after {timeout_secs:.3}s")]
    TimeoutLockError { path: PathBuf, timeout_secs: f64 },

    /// The refresher (or an explicit check) detected that the lockfile no
    /// longer names this holder's inode.
    #[error("lock on {path} was stolen out from under us")]
    StolenLockError { path: PathBuf },

    /// Unlinking the lockfile failed while it was owned by this handle.
    #[error("failed to unlock {path}: {source}")]
    UnlockError { path: PathBuf, source: io::Error },

    /// The identity check kept failing after `poll_retries` attempts in a
    /// way that indicates the filesystem's `link(2)` is lying to us (a
    /// known NFS failure mode) rather than ordinary contention.
    #[error("filesystem appears to misreport link(2) results for {path}")]
    NFSLockError { path: PathBuf },

    /// The handle is already `HELD`; re-entrant `lock()` is an error
    /// (see DESIGN.md Open Question: re-entrant `lock()`).
    #[error("lock handle for {path} is already held")]
    AlreadyHeld { path: PathBuf },

    /// Could not create the unique temp file, stat a path, or otherwise
    /// perform a filesystem operation that errors other than the ones
    /// above apply to.
    #[error("filesystem error on {path}: {source}")]
    Io { path: PathBuf, source: io::Error },

    #[error(transparent)]
    Config(#[from] ConfigError),
}

pub type Result<T> = std::result::Result<T, LockError>;
