//! Background activity that keeps a held lock alive and detects loss
//! (§4.F).
//!
//! Modeled as a supervised task per DESIGN.md's "Background refresher →
//! supervised task" note: a dedicated OS thread owned by the handle,
//! torn down through a termination channel the handle waits on for
//! acknowledgement. Theft is surfaced as a polled flag rather than
//! injected into the holder's call stack — there is no portable way to
//! interrupt an arbitrary Rust call site, so `StolenLockError` becomes
//! visible the next time the holder calls [`Refresher::check`] or at
//! `unlock()`.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::{LockError, Result};
use crate::identity::{identity, Identity};

/// Owns the background refresh thread for one held lock.
pub struct Refresher {
    stolen: Arc<AtomicBool>,
    stop_tx: mpsc::Sender<()>,
    join: Option<JoinHandle<()>>,
}

impl Refresher {
    /// Spawn the refresher for `target`, expected to still resolve to
    /// `expected` identity on every tick.
    pub fn spawn(target: PathBuf, expected: Identity, interval: Duration) -> Self {
        let stolen = Arc::new(AtomicBool::new(false));
        let (stop_tx, stop_rx) = mpsc::channel();
        let stolen_handle = Arc::clone(&stolen);

        let join = std::thread::spawn(move || {
            loop {
                match stop_rx.recv_timeout(interval) {
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    Err(RecvTimeoutError::Timeout) => {
                        match identity(&target) {
                            Ok(current) if current == expected => {
                                if let Err(err) = touch(&target) {
                                    warn!(?err, path = %target.display(), "refresher failed to touch lockfile");
                                }
                            }
                            _ => {
                                debug!(path = %target.display(), "refresher detected lock was stolen");
                                stolen_handle.store(true, Ordering::SeqCst);
                                break;
                            }
                        }
                    }
                }
            }
        });

        Self {
            stolen,
            stop_tx,
            join: Some(join),
        }
    }

    /// `true` if the refresher has observed the lock lost to another
    /// acquirer since it started.
    pub fn is_stolen(&self) -> bool {
        self.stolen.load(Ordering::SeqCst)
    }

    /// Surface `StolenLockError` if the refresher has flagged loss.
    pub fn check(&self, path: &Path) -> Result<()> {
        if self.is_stolen() {
            Err(LockError::StolenLockError {
                path: path.to_path_buf(),
            })
        } else {
            Ok(())
        }
    }

    /// Tell the refresher to stop and wait for it to acknowledge, so
    /// `unlock()` never races a final mtime touch against the unlink
    /// that follows.
    pub fn stop(mut self) {
        let _ = self.stop_tx.send(());
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

impl Drop for Refresher {
    fn drop(&mut self) {
        let _ = self.stop_tx.send(());
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

fn touch(target: &Path) -> std::io::Result<()> {
    let file = std::fs::File::open(target)?;
    file.set_modified(std::time::SystemTime::now())
}
