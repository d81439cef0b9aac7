//! # configx-core
//!
//! Configuration tree model for ConfigX: key paths, typed scalars, the
//! [`ConfigTree`] entity with merge and diff, the pluggable grammar front-end,
//! and the binary snapshot codec.
//!
//! This crate has no file-system, locking, or OS dependencies; the storage
//! runtime in `configx-storage` builds on it.
//!
//! # Architecture overview
//!
//! - **`domain`** – The tree itself.  A [`ConfigTree`] owns a root [`Branch`]
//!   whose children are either leaves holding a [`Value`] or further
//!   branches.  Children keep insertion order, so rendering, diffing and
//!   encoding are all deterministic.
//!
//! - **`grammar`** – How text becomes a tree.  A [`Grammar`] turns source
//!   text into a lazy stream of [`AssignmentEvent`]s; the bundled
//!   [`CfgxGrammar`] reads an INI-like syntax and [`render`] writes it back.
//!
//! - **`codec`** – Snapshot images: a fixed header, a SHA-256 checksum, and
//!   a compact big-endian encoding of the node graph.
//!
//! ```rust
//! use configx_core::{ConfigTree, MergePolicy, Value};
//!
//! let mut base = ConfigTree::parse("base", "[server]\nport = 8080\n").unwrap();
//! let overlay = ConfigTree::parse("overlay", "[server]\nhost = \"edge\"\n").unwrap();
//!
//! base.merge(&overlay, MergePolicy::Overwrite).unwrap();
//! assert_eq!(base.get_value("server.host").unwrap(), &Value::from("edge"));
//! assert_eq!(base.revision(), 1);
//! ```

pub mod codec;
pub mod domain;
pub mod grammar;

// Re-export the most-used types at the crate root so callers can write
// `configx_core::ConfigTree` instead of `configx_core::domain::tree::ConfigTree`.
pub use codec::{decode_image, encode_image, CodecError, EncodedImage, TreeImage};
pub use domain::{
    Branch, Change, ConfigNode, ConfigTree, DiffEntry, IntoKeyPath, KeyPath, MergePolicy,
    TreeError, Value, ValueKind,
};
pub use grammar::{
    render, AssignmentEvent, CfgxGrammar, Grammar, LoadError, SourcePosition, SyntaxError,
    SyntaxErrorKind,
};
