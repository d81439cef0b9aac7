//! Snapshot persistence.
//!
//! A snapshot is one encoded [`TreeImage`] committed as a single unit.  The
//! [`SnapshotStore`] trait lets the runtime work against a durable file store
//! in production and an in-memory store (or a mock) in tests.
//!
//! Versions are allocated per tree name, start at 1 and strictly increase.

use std::fmt;
use std::path::PathBuf;

use configx_core::codec::{CodecError, EncodedImage, TreeImage};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod file;
pub mod memory;

pub use file::FileSnapshotStore;
pub use memory::MemorySnapshotStore;

/// Identifies one committed snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SnapshotHandle {
    pub tree: String,
    pub version: u64,
}

impl SnapshotHandle {
    pub fn new(tree: impl Into<String>, version: u64) -> Self {
        Self {
            tree: tree.into(),
            version,
        }
    }
}

impl fmt::Display for SnapshotHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}@v{}", self.tree, self.version)
    }
}

/// Errors raised by snapshot stores.
#[derive(Debug, Error)]
pub enum SnapshotError {
    /// No snapshot exists for the handle.
    #[error("snapshot {0} not found")]
    NotFound(SnapshotHandle),

    /// The stored bytes do not match their checksum.
    #[error("snapshot {handle} is corrupted: {source}")]
    ChecksumMismatch {
        handle: SnapshotHandle,
        #[source]
        source: CodecError,
    },

    /// The stored bytes are not a readable image, or the image could not be
    /// encoded.
    #[error("snapshot {handle} is unreadable: {source}")]
    Corrupt {
        handle: SnapshotHandle,
        #[source]
        source: CodecError,
    },

    /// A file system I/O error occurred.
    #[error("I/O error accessing snapshot at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl SnapshotError {
    /// Classifies a decode failure for `handle`.
    pub(crate) fn from_codec(handle: &SnapshotHandle, source: CodecError) -> Self {
        match source {
            CodecError::ChecksumMismatch { .. } => SnapshotError::ChecksumMismatch {
                handle: handle.clone(),
                source,
            },
            source => SnapshotError::Corrupt {
                handle: handle.clone(),
                source,
            },
        }
    }
}

/// Durable (or not) storage for encoded tree images.
///
/// Implementations must commit each image atomically: a reader sees either
/// the complete image or no snapshot at all.
#[cfg_attr(test, mockall::automock)]
pub trait SnapshotStore: Send + Sync {
    /// Commits `image` under the next version for `image.name`.
    fn write(&self, image: &EncodedImage) -> Result<SnapshotHandle, SnapshotError>;

    /// Reads and verifies a snapshot.
    fn read(&self, handle: &SnapshotHandle) -> Result<TreeImage, SnapshotError>;

    /// All snapshots of `tree`, oldest first.
    fn list(&self, tree: &str) -> Result<Vec<SnapshotHandle>, SnapshotError>;

    /// Removes a snapshot.
    fn delete(&self, handle: &SnapshotHandle) -> Result<(), SnapshotError>;

    /// The newest snapshot of `tree`, if any.
    fn latest(&self, tree: &str) -> Result<Option<SnapshotHandle>, SnapshotError> {
        Ok(self.list(tree)?.pop())
    }
}
