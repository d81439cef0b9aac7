//! configx-storage library entry point.
//!
//! The storage runtime for ConfigX: a registry of named [`configx_core::ConfigTree`]s
//! guarded by per-tree read/write locks, snapshot persistence with checksum
//! verification, and an optional write-ahead journal with checkpoints.
//!
//! - **`application`** – [`StorageRuntime`] and [`TreeHandle`].
//! - **`infrastructure`** – Snapshot stores, journal, checkpoint manifest
//!   and the TOML settings file.

pub mod application;
pub mod infrastructure;

pub use application::{RuntimeError, StorageRuntime, TreeHandle};
pub use infrastructure::settings::{load_settings, save_settings, Settings};
pub use infrastructure::snapshot::{
    FileSnapshotStore, MemorySnapshotStore, SnapshotError, SnapshotHandle, SnapshotStore,
};
