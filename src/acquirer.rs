//! The central link-and-verify acquire loop (§4.E).
//!
//! The pivotal design decision: `link(2)` on NFS may report success after
//! actually failing, or failure after actually succeeding. So its return
//! value is never trusted. The only thing trusted is a subsequent
//! comparison of `(dev, ino)` between the unique temp file and the
//! target — if they match, this process owns the lock, full stop.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use rand::Rng;
use tracing::{debug, trace, warn};

use crate::cleanup;
use crate::config::LockConfig;
use crate::error::{LockError, Result};
use crate::identity::{identity, same_file};
use crate::metadata::LockfileContents;
use crate::schedule::SleepSchedule;
use crate::sweeper;
use crate::temp::{create_unique_temp, current_process_contents};

/// The outcome of a successful acquire: everything the [`crate::handle::LockHandle`]
/// needs to track while `HELD`.
pub struct Acquired {
    pub temp_path: PathBuf,
    pub contents: LockfileContents,
    pub stolen: bool,
}

fn mtime_age(target: &Path) -> Option<Duration> {
    let meta = std::fs::metadata(target).ok()?;
    let modified = meta.modified().ok()?;
    modified.elapsed().ok()
}

fn random_poll_sleep(max: Duration) -> Duration {
    if max.is_zero() {
        return Duration::ZERO;
    }
    let nanos = max.as_nanos().min(u128::from(u64::MAX));
    let jitter = rand::thread_rng().gen_range(0..=nanos as u64);
    Duration::from_nanos(jitter)
}

/// Run the full acquire protocol for `target`, blocking the calling
/// thread until the lock is held or a terminal error occurs.
pub fn acquire(target: &Path, cfg: &LockConfig) -> Result<Acquired> {
    let deadline = cfg.timeout.map(|t| Instant::now() + t);

    if !cfg.dont_sweep {
        let removed = sweeper::sweep(target);
        if removed > 0 {
            debug!(removed, path = %target.display(), "swept orphaned temp files before acquire");
        }
    }

    let mut schedule = SleepSchedule::new(cfg.min_sleep, cfg.max_sleep, cfg.sleep_inc);
    schedule.reset();

    let mut k: u64 = 0;
    loop {
        // The deadline is only enforced once the first polling phase has
        // had a chance to run — `timeout = 0` still gets one attempt
        // before failing, per the boundary case that an uncontended
        // target should still be acquirable.
        if k > 0 {
            if let Some(deadline) = deadline {
                if Instant::now() >= deadline {
                    return Err(LockError::TimeoutLockError {
                        path: target.to_path_buf(),
                        timeout_secs: cfg.timeout.unwrap_or_default().as_secs_f64(),
                    });
                }
            }
        }

        let contents = current_process_contents();
        let temp_path = create_unique_temp(target, &contents)?;
        if !cfg.dont_clean {
            cleanup::register(&temp_path);
        }

        match poll_until_linked_or_exhausted(target, &temp_path, cfg, deadline)? {
            PollOutcome::Acquired { stolen } => {
                // U and T are now two names for the same inode; only T's
                // well-known name matters from here on, so U's name is
                // dropped immediately. unlock()'s own unlink of U is then
                // an idempotent no-op on the common path.
                if let Err(err) = std::fs::remove_file(&temp_path) {
                    debug!(?err, path = %temp_path.display(), "failed to drop temp name after acquire");
                }
                if !cfg.dont_clean {
                    cleanup::unregister(&temp_path);
                }
                return Ok(Acquired {
                    temp_path,
                    contents,
                    stolen,
                });
            }
            PollOutcome::Exhausted => {
                let _ = std::fs::remove_file(&temp_path);
                if !cfg.dont_clean {
                    cleanup::unregister(&temp_path);
                }

                if let Some(deadline) = deadline {
                    if Instant::now() >= deadline {
                        return Err(LockError::TimeoutLockError {
                            path: target.to_path_buf(),
                            timeout_secs: cfg.timeout.unwrap_or_default().as_secs_f64(),
                        });
                    }
                }

                k += 1;
                if cfg.retries.exhausted(k) {
                    return Err(LockError::MaxTriesLockError {
                        path: target.to_path_buf(),
                    });
                }

                let backoff = schedule.next();
                trace!(?backoff, attempt = k, "backing off before next outer attempt");
                std::thread::sleep(backoff);
            }
        }
    }
}

enum PollOutcome {
    Acquired { stolen: bool },
    Exhausted,
}

/// One polling phase: up to `poll_retries` sub-attempts at linking `U`
/// into `T` and checking identity. Returns once acquired, once the
/// phase's sub-attempts are used up, or raises `NFSLockError` if every
/// sub-attempt looked like a filesystem lie rather than ordinary
/// contention.
fn poll_until_linked_or_exhausted(
    target: &Path,
    temp_path: &Path,
    cfg: &LockConfig,
    deadline: Option<Instant>,
) -> Result<PollOutcome> {
    let mut stolen_this_phase = false;
    let mut suspicious_link_count: u64 = 0;

    for attempt in 0..=cfg.poll_retries {
        if attempt > 0 {
            if let Some(deadline) = deadline {
                if Instant::now() >= deadline {
                    return Ok(PollOutcome::Exhausted);
                }
            }
        }

        let link_result = std::fs::hard_link(temp_path, target);
        // `AlreadyExists` is the ordinary contention signal (T is held by
        // a live peer) and must not count as suspicious — only a link
        // that reported outright success yet still failed the identity
        // check points at a filesystem lying to us.
        let link_apparently_succeeded = link_result.is_ok();

        if same_file(temp_path, target) {
            return Ok(PollOutcome::Acquired {
                stolen: stolen_this_phase,
            });
        }

        if try_steal_if_stale(target, cfg)? {
            // A legitimate reason the identity check just failed: don't
            // count it as suspicious, theft explains the mismatch.
            stolen_this_phase = true;
            std::thread::sleep(cfg.suspend);
            continue;
        }

        if link_apparently_succeeded {
            suspicious_link_count += 1;
        }

        if attempt == cfg.poll_retries {
            break;
        }

        std::thread::sleep(random_poll_sleep(cfg.poll_max_sleep));
    }

    if cfg.poll_retries > 0 && suspicious_link_count >= cfg.poll_retries {
        warn!(
            path = %target.display(),
            "link(2) repeatedly reported success without identity ever matching; \
             treating as a filesystem bug rather than contention"
        );
        return Err(LockError::NFSLockError {
            path: target.to_path_buf(),
        });
    }

    Ok(PollOutcome::Exhausted)
}

/// If `T` is stealable under `cfg.max_age`, unlink it and report so.
/// Stealing is unlink-then-normal-acquire; the caller is responsible for
/// the `suspend` pause that follows.
fn try_steal_if_stale(target: &Path, cfg: &LockConfig) -> Result<bool> {
    let Some(max_age) = cfg.max_age else {
        return Ok(false);
    };
    let Some(age) = mtime_age(target) else {
        return Ok(false);
    };
    if age <= max_age {
        return Ok(false);
    }

    match std::fs::remove_file(target) {
        Ok(()) => {
            debug!(path = %target.display(), ?age, "stole stale lock");
            Ok(true)
        }
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(true),
        Err(_) => Ok(false),
    }
}

/// The identity of `target`, used by the refresher and by tests that
/// want to assert acquisition actually took effect.
pub fn target_identity(target: &Path) -> Result<crate::identity::Identity> {
    identity(target)
}
