//! Application layer: the storage runtime.
//!
//! The runtime is the single entry point collaborators use.  It owns the
//! registry of named trees and orchestrates the domain (`configx_core`) with
//! the infrastructure adapters (snapshot store, journal, manifest).
//!
//! # Sub-modules
//!
//! - **`runtime`**  – [`StorageRuntime`]: registration, reads through
//!   [`TreeHandle`], mutations, snapshot and restore.
//! - **`recovery`** – Opening a durable runtime from its data directory,
//!   journal replay, checkpoints and shutdown.

pub mod recovery;
pub mod runtime;

pub use recovery::{JOURNAL_FILE, MANIFEST_FILE, SNAPSHOT_DIR};
pub use runtime::{RuntimeError, StorageRuntime, TreeHandle};
