//! NFS-safe advisory file locking via hard-link identity.
//!
//! Mutual exclusion is the existence of a named regular file, taken by
//! atomically hard-linking a unique per-acquirer temp file into the
//! target name and then trusting only a `(device, inode)` comparison —
//! never `link(2)`'s own return value — to decide whether the lock was
//! actually won. See [`handle::LockHandle`] for the public entry point.

pub mod acquirer;
pub mod cleanup;
pub mod config;
pub mod error;
pub mod handle;
pub mod identity;
pub mod metadata;
pub mod refresher;
pub mod schedule;
pub mod sweeper;
pub mod temp;

pub use config::{LockConfig, LockConfigBuilder, Retries};
pub use error::{ConfigError, LockError, Result};
pub use handle::LockHandle;
