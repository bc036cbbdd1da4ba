//! Path & identity helpers (§4.A).
//!
//! The only trustworthy post-condition after `link(2)` on NFS is that two
//! paths now name the same inode — not `link`'s own return value. This
//! module is the place that decides "same inode", ignoring link count
//! because NFS clients may cache a stale `nlink` (§4.A).

use std::os::unix::fs::MetadataExt;
use std::path::Path;

use crate::error::{LockError, Result};

/// A filesystem object's `(device, inode)` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Identity {
    pub dev: u64,
    pub ino: u64,
}

/// Stat `path` (not following a trailing symlink) and return its identity.
pub fn identity(path: &Path) -> Result<Identity> {
    let meta = std::fs::symlink_metadata(path).map_err(|source| LockError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(Identity {
        dev: meta.dev(),
        ino: meta.ino(),
    })
}

/// `true` iff `a` and `b` currently name the same on-disk object.
///
/// Deliberately does not compare `nlink`: that is the whole point of this
/// function existing separately from a naive metadata comparison.
pub fn same_file(a: &Path, b: &Path) -> bool {
    match (identity(a), identity(b)) {
        (Ok(ia), Ok(ib)) => ia == ib,
        _ => false,
    }
}
