//! Same-host dead-peer cleanup (§4.C).
//!
//! Before (and only before) a fresh acquire attempt, the sweeper looks at
//! sibling unique-temp files next to the target lockfile that carry our
//! own hostname in their name, and removes any whose owning PID is no
//! longer alive. A temp file is only ever a candidate for removal if the
//! sweeper itself created the naming prefix match — cross-host siblings
//! are left untouched, since PID liveness can only be checked locally.

use std::fs;
use std::path::Path;

use tracing::debug;

use crate::temp::temp_prefix;

/// `true` iff a process with this pid currently exists, checked via
/// `kill(pid, 0)`. An `EPERM` result still counts as alive: it means the
/// process exists but signals to it are refused.
fn process_is_alive(pid: u32) -> bool {
    // SAFETY: signal 0 sends no actual signal and only queries existence.
    let result = unsafe { libc::kill(pid as libc::pid_t, 0) };
    if result == 0 {
        return true;
    }
    std::io::Error::last_os_error().raw_os_error() != Some(libc::ESRCH)
}

/// Extract the numeric pid field from a unique-temp filename of the
/// shape produced by [`crate::temp::unique_temp_path`]:
/// `<basename>.<host>.<pid>.<tid>.<seq>.<time_ns>.<random>`.
fn pid_from_temp_name(name: &str, prefix: &str) -> Option<u32> {
    let rest = name.strip_prefix(prefix)?;
    let pid_field = rest.split('.').next()?;
    pid_field.parse().ok()
}

/// Remove sibling unique-temp files next to `target` that belong to this
/// host and whose owner process is dead. Returns the number removed.
/// Best-effort: individual removal failures are logged and skipped, never
/// propagated, since a sweep failing shouldn't block acquisition.
pub fn sweep(target: &Path) -> usize {
    let dir = match target.parent() {
        Some(dir) => dir,
        None => return 0,
    };
    let prefix = temp_prefix(target);

    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) => {
            debug!(?err, dir = %dir.display(), "sweeper could not read directory");
            return 0;
        }
    };

    let mut removed = 0;
    for entry in entries.flatten() {
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        let Some(pid) = pid_from_temp_name(name, &prefix) else {
            continue;
        };
        if process_is_alive(pid) {
            continue;
        }
        let path = entry.path();
        match fs::remove_file(&path) {
            Ok(()) => {
                debug!(path = %path.display(), pid, "swept orphaned temp file");
                removed += 1;
            }
            Err(err) => {
                debug!(?err, path = %path.display(), "failed to sweep orphaned temp file");
            }
        }
    }
    removed
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn sweeps_dead_pid_temp_file() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("x.lock");
        let prefix = temp_prefix(&target);
        // A pid essentially guaranteed not to exist.
        let dead_pid = 999_999u32;
        let orphan = dir.path().join(format!("{prefix}{dead_pid}.0.0.0.0"));
        std::fs::write(&orphan, b"").unwrap();

        let removed = sweep(&target);
        assert_eq!(removed, 1);
        assert!(!orphan.exists());
    }

    #[test]
    fn leaves_live_pid_temp_file_alone() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("x.lock");
        let prefix = temp_prefix(&target);
        let my_pid = std::process::id();
        let mine = dir.path().join(format!("{prefix}{my_pid}.0.0.0.0"));
        std::fs::write(&mine, b"").unwrap();

        let removed = sweep(&target);
        assert_eq!(removed, 0);
        assert!(mine.exists());
    }

    #[test]
    fn ignores_files_without_matching_prefix() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("x.lock");
        let unrelated = dir.path().join("unrelated-file.txt");
        std::fs::write(&unrelated, b"").unwrap();

        let removed = sweep(&target);
        assert_eq!(removed, 0);
        assert!(unrelated.exists());
    }
}
