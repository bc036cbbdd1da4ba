//! Public lock handle lifecycle (§4.G).
//!
//! Binds a target path and a [`LockConfig`] to an acquire/release
//! discipline: `UNHELD → HELD → RELEASED`, the last state terminal.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::acquirer::{self, Acquired};
use crate::cleanup;
use crate::config::LockConfig;
use crate::error::{LockError, Result};
use crate::identity::identity;
use crate::refresher::Refresher;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Unheld,
    Held,
    Released,
}

/// A lock on a single target path. Not `Clone`: ownership of the held
/// state (and of the background refresher, if any) is exclusive.
pub struct LockHandle {
    target: PathBuf,
    config: LockConfig,
    state: State,
    temp_path: Option<PathBuf>,
    stolen_hold: bool,
    refresher: Option<Refresher>,
}

impl LockHandle {
    pub fn new(target: impl Into<PathBuf>, config: LockConfig) -> Self {
        Self {
            target: target.into(),
            config,
            state: State::Unheld,
            temp_path: None,
            stolen_hold: false,
            refresher: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.target
    }

    /// `true` if the current hold (if any) was obtained by stealing a
    /// stale lock rather than an uncontended link.
    pub fn thief(&self) -> bool {
        self.stolen_hold
    }

    /// Acquire the lock, transitioning `UNHELD → HELD`. Re-entrant calls
    /// on an already-`HELD` handle are an error (see DESIGN.md's Open
    /// Question on re-entrancy) rather than a counted no-op.
    pub fn lock(&mut self) -> Result<()> {
        if self.state == State::Held {
            return Err(LockError::AlreadyHeld {
                path: self.target.clone(),
            });
        }

        let Acquired {
            temp_path,
            stolen,
            ..
        } = acquirer::acquire(&self.target, &self.config)?;

        if !self.config.dont_clean {
            cleanup::register(&self.target);
        }

        self.refresher = match self.config.refresh {
            Some(interval) => match identity(&self.target) {
                Ok(id) => Some(Refresher::spawn(self.target.clone(), id, interval)),
                Err(err) => {
                    warn!(?err, path = %self.target.display(), "could not start refresher");
                    None
                }
            },
            None => None,
        };

        self.temp_path = Some(temp_path);
        self.stolen_hold = stolen;
        self.state = State::Held;
        Ok(())
    }

    /// Acquire, run `work`, and release on every exit path — including a
    /// panic unwind through `work`, though a panic is re-raised after
    /// release rather than converted into a `Result`. If `work` returns
    /// `Err`, that error is surfaced after release; a release failure is
    /// only surfaced when `work` itself succeeded.
    pub fn with_lock<T>(&mut self, work: impl FnOnce() -> Result<T>) -> Result<T> {
        self.lock()?;
        let work_result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(work));
        let unlock_result = self.unlock();

        match work_result {
            Ok(Ok(value)) => {
                unlock_result?;
                Ok(value)
            }
            Ok(Err(work_err)) => {
                if let Err(unlock_err) = unlock_result {
                    warn!(?unlock_err, "unlock failed after work also failed; reporting work's error");
                }
                Err(work_err)
            }
            Err(panic) => std::panic::resume_unwind(panic),
        }
    }

    /// Check whether a background refresher has flagged theft since the
    /// last check, without transitioning state. The only point at which
    /// theft otherwise becomes visible is `unlock()`.
    pub fn check(&self) -> Result<()> {
        if let Some(refresher) = &self.refresher {
            refresher.check(&self.target)?;
        }
        Ok(())
    }

    /// Release the lock: `HELD → RELEASED`. Safe to call repeatedly —
    /// every call after the first is a no-op returning `Ok(())`.
    pub fn unlock(&mut self) -> Result<()> {
        if self.state != State::Held {
            return Ok(());
        }

        let theft_result = self
            .refresher
            .take()
            .map(|refresher| {
                let stolen = refresher.is_stolen();
                refresher.stop();
                stolen
            })
            .unwrap_or(false);

        if let Some(temp_path) = self.temp_path.take() {
            let _ = std::fs::remove_file(&temp_path);
        }

        let unlink_result = std::fs::remove_file(&self.target);
        if !self.config.dont_clean {
            cleanup::unregister(&self.target);
        }
        self.state = State::Released;

        match unlink_result {
            Ok(()) => {
                debug!(path = %self.target.display(), "released lock");
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                // Already gone — stolen, or removed by someone else.
            }
            Err(source) => {
                return Err(LockError::UnlockError {
                    path: self.target.clone(),
                    source,
                });
            }
        }

        if theft_result {
            return Err(LockError::StolenLockError {
                path: self.target.clone(),
            });
        }

        Ok(())
    }
}

impl Drop for LockHandle {
    fn drop(&mut self) {
        if self.state == State::Held {
            let _ = self.unlock();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::tempdir;

    fn fast_config() -> LockConfig {
        LockConfig {
            retries: crate::config::Retries::Finite(3),
            min_sleep: Duration::from_millis(1),
            max_sleep: Duration::from_millis(2),
            sleep_inc: Duration::from_millis(1),
            max_age: None,
            suspend: Duration::ZERO,
            refresh: None,
            timeout: None,
            poll_retries: 2,
            poll_max_sleep: Duration::from_millis(1),
            dont_clean: true,
            dont_sweep: true,
            debug: false,
        }
    }

    #[test]
    fn lock_then_unlock_round_trips() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("x.lock");
        let mut handle = LockHandle::new(&target, fast_config());

        handle.lock().unwrap();
        assert!(target.exists());
        handle.unlock().unwrap();
        assert!(!target.exists());
    }

    #[test]
    fn unlock_is_idempotent() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("x.lock");
        let mut handle = LockHandle::new(&target, fast_config());

        handle.lock().unwrap();
        handle.unlock().unwrap();
        handle.unlock().unwrap();
    }

    #[test]
    fn reentrant_lock_errors() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("x.lock");
        let mut handle = LockHandle::new(&target, fast_config());

        handle.lock().unwrap();
        let err = handle.lock().unwrap_err();
        assert!(matches!(err, LockError::AlreadyHeld { .. }));
    }

    #[test]
    fn with_lock_surfaces_work_error_after_releasing() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("x.lock");
        let mut handle = LockHandle::new(&target, fast_config());

        let result = handle.with_lock(|| {
            Err(LockError::Io {
                path: PathBuf::from("irrelevant"),
                source: std::io::Error::other("boom"),
            })
        });

        assert!(result.is_err());
        assert!(!target.exists());
    }

    #[test]
    fn drop_without_explicit_unlock_still_releases() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("x.lock");
        {
            let mut handle = LockHandle::new(&target, fast_config());
            handle.lock().unwrap();
            assert!(target.exists());
        }
        assert!(!target.exists());
    }
}
