//! Unique temp file naming and creation (§3 `UniqueTempName`, §4.A).
//!
//! `U` must live in the same directory as the target lockfile `T` — NFS
//! only guarantees `link(2)` atomicity within a single filesystem, and in
//! practice within a single directory.

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::Utc;
use rand::Rng;

use crate::error::{LockError, Result};
use crate::metadata::LockfileContents;

static SEQ: AtomicU64 = AtomicU64::new(0);

fn current_host() -> String {
    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "unknown-host".to_string())
}

/// Thread id rendered as a plain integer, for inclusion in the unique
/// name (there's no portable numeric thread id in std, so we hash the
/// `ThreadId`'s debug form down to something stable-within-process).
fn thread_tag() -> u64 {
    use std::hash::{Hash, Hasher};
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    std::thread::current().id().hash(&mut hasher);
    hasher.finish()
}

/// Build the unique temp file path for `target`, following:
/// `<lockfile_basename>.<hostname>.<pid>.<thread_id>.<monotonic_seq>.<time_ns>.<random>`
pub fn unique_temp_path(target: &Path) -> PathBuf {
    let dir = target.parent().unwrap_or_else(|| Path::new("."));
    let basename = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "lockfile".to_string());

    let host = current_host();
    let pid = std::process::id();
    let tid = thread_tag();
    let seq = SEQ.fetch_add(1, Ordering::Relaxed);
    let time_ns = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    let random: u64 = rand::thread_rng().r#gen();

    dir.join(format!(
        "{basename}.{host}.{pid}.{tid}.{seq}.{time_ns}.{random:016x}"
    ))
}

/// The static prefix (through the hostname component) that sibling temp
/// files for `target` begin with, used by the sweeper (§4.C) to recognize
/// same-host candidates without parsing the whole name.
pub fn temp_prefix(target: &Path) -> String {
    let basename = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "lockfile".to_string());
    format!("{basename}.{}.", current_host())
}

/// Create the unique temp file `U` next to `target`, write `contents`,
/// fsync, and close. Returns the path of `U`.
pub fn create_unique_temp(target: &Path, contents: &LockfileContents) -> Result<PathBuf> {
    let path = unique_temp_path(target);
    let mut file = File::create(&path).map_err(|source| LockError::Io {
        path: path.clone(),
        source,
    })?;
    file.write_all(contents.encode().as_bytes())
        .map_err(|source| LockError::Io {
            path: path.clone(),
            source,
        })?;
    file.sync_all().map_err(|source| LockError::Io {
        path: path.clone(),
        source,
    })?;
    Ok(path)
}

/// Build the `LockfileContents` record for a just-created temp file.
pub fn current_process_contents() -> LockfileContents {
    LockfileContents::new(
        current_host(),
        std::process::id(),
        parent_pid(),
        Utc::now(),
    )
}

fn parent_pid() -> u32 {
    // SAFETY: getppid(2) has no preconditions and cannot fail.
    unsafe { libc::getppid() as u32 }
}
