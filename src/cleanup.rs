//! Process-exit cleanup registry (§4.H, §5 "Signal safety").
//!
//! Every unique-temp file and every lockfile we currently hold is
//! registered here the moment it's created. On a normal `Drop`, the path
//! is unregistered and removed individually. On SIGINT/SIGTERM, the
//! signal handler drains the whole registry and unlinks everything in
//! one pass, because the owning thread may never get to run its
//! destructors.
//!
//! The registry only ever does one thing in the signal path —
//! `unlink(2)` each path in a pre-allocated `Vec` — per the spec's
//! requirement that signal-handler work not allocate.

use std::path::{Path, PathBuf};
use std::sync::{LazyLock, Mutex};

use signal_hook::consts::{SIGINT, SIGTERM};
use signal_hook::iterator::Signals;
use tracing::{debug, warn};

static ACTIVE_PATHS: LazyLock<Mutex<Vec<PathBuf>>> = LazyLock::new(|| Mutex::new(Vec::new()));

/// Register `path` for removal if the process is interrupted before it
/// is unregistered normally.
pub fn register(path: &Path) {
    if let Ok(mut paths) = ACTIVE_PATHS.lock() {
        paths.push(path.to_path_buf());
    }
}

/// Unregister `path` after it has been cleaned up the ordinary way
/// (successful `Drop`/`unlock()`).
pub fn unregister(path: &Path) {
    if let Ok(mut paths) = ACTIVE_PATHS.lock() {
        paths.retain(|p| p != path);
    }
}

/// Remove every currently-registered path, draining the registry so each
/// one is only ever removed once. Recovers from a poisoned mutex so
/// cleanup still runs after a panic on another thread.
pub fn cleanup_all() {
    let paths = {
        let mut paths = ACTIVE_PATHS
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        std::mem::take(&mut *paths)
    };
    for path in paths {
        let _ = std::fs::remove_file(&path);
    }
}

/// Install SIGINT/SIGTERM handlers that drain [`cleanup_all`] before the
/// process terminates. Spawns a dedicated background thread to run the
/// signal iterator, matching the pattern `signal-hook`'s own docs use for
/// non-raw handling outside of strict async-signal-safety constraints.
///
/// Safe to call more than once per process; each call adds an
/// independent listener thread, so callers (normally just `main`) should
/// call this exactly once.
pub fn install_signal_handlers() -> std::io::Result<()> {
    let mut signals = Signals::new([SIGINT, SIGTERM])?;
    std::thread::spawn(move || {
        for signal in signals.forever() {
            debug!(signal, "received termination signal, cleaning up locks");
            cleanup_all();
            // Re-raise with the default disposition so the process exits
            // with the conventional signal-derived status instead of
            // silently swallowing the interrupt.
            unsafe {
                libc::signal(signal, libc::SIG_DFL);
                libc::raise(signal);
            }
        }
    });
    Ok(())
}

/// Best-effort variant used by callers that want to log install failure
/// rather than propagate it — losing signal-safe cleanup shouldn't stop
/// the program from doing its job, since `Drop` still covers the normal
/// exit path.
pub fn install_signal_handlers_or_warn() {
    if let Err(err) = install_signal_handlers() {
        warn!(?err, "failed to install signal handlers for lock cleanup");
    }
}
