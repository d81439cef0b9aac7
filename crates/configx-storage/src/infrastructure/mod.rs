//! Infrastructure layer for the storage runtime.
//!
//! Contains the file-system adapters: snapshot stores, the write-ahead
//! journal, the checkpoint manifest, and TOML settings.
//!
//! **Dependency rule**: this layer may depend on `configx_core`, but MUST NOT
//! import from `application`.

pub mod journal;
pub mod manifest;
pub mod settings;
pub mod snapshot;

use std::io;
use std::path::Path;

/// Makes a rename or removal inside `dir` durable.
#[cfg(unix)]
pub(crate) fn sync_dir(dir: &Path) -> io::Result<()> {
    std::fs::File::open(dir)?.sync_all()
}

/// Directory handles cannot be synced on this platform; renames are
/// durable once the file system flushes its metadata.
#[cfg(not(unix))]
pub(crate) fn sync_dir(_dir: &Path) -> io::Result<()> {
    Ok(())
}
