//! Domain entities for ConfigX.
//!
//! Pure tree logic with no file-system, OS, or grammar dependencies:
//!
//! - **`path`**  – [`KeyPath`], the dotted address of a node.
//! - **`node`**  – [`Value`] scalars, [`ConfigNode`] (leaf or branch) and the
//!   insertion-ordered [`Branch`] mapping.
//! - **`tree`**  – [`ConfigTree`]: insert, lookup, delete and the revision
//!   counter.
//! - **`merge`** – combining two trees under a [`MergePolicy`].
//! - **`diff`**  – ordered leaf-level differences between two trees.
//!
//! Everything here can be unit-tested without touching the disk.

pub mod diff;
pub mod merge;
pub mod node;
pub mod path;
pub mod tree;

use thiserror::Error;

pub use diff::{Change, DiffEntry};
pub use merge::MergePolicy;
pub use node::{Branch, ConfigNode, Value, ValueKind};
pub use path::{IntoKeyPath, KeyPath};
pub use tree::ConfigTree;

/// Errors raised by tree lookups and mutations.
///
/// Every variant carries the path that caused it.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum TreeError {
    /// The textual path could not be turned into a [`KeyPath`].
    #[error("invalid path {path:?}: {reason}")]
    InvalidPath { path: String, reason: &'static str },

    /// No node exists at the path.
    #[error("path not found: {0}")]
    NotFound(KeyPath),

    /// A leaf sits where the path needs a branch (`a.b` when `a` is a leaf).
    #[error("path conflict inserting {path}: {at} is a leaf")]
    PathConflict { path: KeyPath, at: KeyPath },

    /// A value was assigned to a node that has children.
    #[error("cannot assign a value to interior node {0}")]
    InteriorAssignment(KeyPath),

    /// Two trees disagree at a path and the merge policy does not resolve it.
    #[error("merge conflict at {path}: {reason}")]
    MergeConflict { path: KeyPath, reason: &'static str },

    /// The tree is in strict mode and the path does not exist yet.
    #[error("strict mode forbids creating {0}")]
    StrictMode(KeyPath),

    /// A scalar was requested from a branch.
    #[error("{0} is a branch, not a leaf")]
    NotALeaf(KeyPath),
}
