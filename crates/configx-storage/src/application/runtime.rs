//! StorageRuntime: the registry of named configuration trees.
//!
//! # Concurrency
//!
//! Each tree sits behind its own `RwLock`: any number of readers, or one
//! writer.  Different trees never block each other.  The registry map is
//! locked only long enough to look up, insert or remove an entry, and never
//! while waiting on a tree's lock or on the journal.
//!
//! A removed tree's slot is emptied rather than dropped, so a [`TreeHandle`]
//! obtained earlier reports [`RuntimeError::NotFound`] instead of reading
//! stale content.
//!
//! # Mutation discipline
//!
//! Every mutation validates first, then appends a journal record (when the
//! runtime has a journal), then changes the tree, all under the tree's write
//! lock.  A call that fails validation or journaling changes nothing and logs
//! nothing.  Calls that would not change content (same value, self-merge,
//! deleting an absent path) are not journaled either.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use configx_core::codec::{encode_image, CodecError};
use configx_core::{Branch, ConfigTree, IntoKeyPath, MergePolicy, TreeError, Value};
use parking_lot::{MappedRwLockReadGuard, RwLock, RwLockReadGuard};
use thiserror::Error;
use tracing::{debug, info};

use crate::infrastructure::journal::{Journal, JournalError, JournalRecord};
use crate::infrastructure::manifest::ManifestError;
use crate::infrastructure::snapshot::{
    MemorySnapshotStore, SnapshotError, SnapshotHandle, SnapshotStore,
};

/// Errors returned by runtime operations.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// No tree is registered under the name (or it has been removed).
    #[error("tree {0:?} is not registered")]
    NotFound(String),

    /// `register` was called with a name already in use.
    #[error("a tree named {0:?} is already registered")]
    DuplicateName(String),

    /// The tree rejected the operation.
    #[error("tree {tree:?}: {source}")]
    Tree {
        tree: String,
        #[source]
        source: TreeError,
    },

    #[error(transparent)]
    Snapshot(#[from] SnapshotError),

    /// The tree could not be encoded into a snapshot image.
    #[error("failed to encode snapshot image: {0}")]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Journal(#[from] JournalError),

    #[error(transparent)]
    Manifest(#[from] ManifestError),
}

pub(super) type TreeSlot = Arc<RwLock<Option<ConfigTree>>>;

pub(super) fn tree_err(name: &str) -> impl FnOnce(TreeError) -> RuntimeError + '_ {
    move |source| RuntimeError::Tree {
        tree: name.to_string(),
        source,
    }
}

// ── TreeHandle ────────────────────────────────────────────────────────────────

/// Shared read access to one registered tree.
#[derive(Debug, Clone)]
pub struct TreeHandle {
    name: String,
    slot: TreeSlot,
}

impl TreeHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Locks the tree for reading.  Writers on this tree wait until the
    /// guard is dropped.
    ///
    /// # Errors
    ///
    /// [`RuntimeError::NotFound`] once the tree has been removed.
    pub fn read(&self) -> Result<MappedRwLockReadGuard<'_, ConfigTree>, RuntimeError> {
        RwLockReadGuard::try_map(self.slot.read(), Option::as_ref)
            .map_err(|_| RuntimeError::NotFound(self.name.clone()))
    }

    /// `false` once the tree has been removed from the runtime.
    pub fn is_live(&self) -> bool {
        self.slot.read().is_some()
    }
}

// ── StorageRuntime ────────────────────────────────────────────────────────────

/// Registry of named trees with snapshot, restore and (optionally) a
/// write-ahead journal.
///
/// # Examples
///
/// ```rust
/// use configx_core::ConfigTree;
/// use configx_storage::StorageRuntime;
///
/// let runtime = StorageRuntime::in_memory();
/// runtime.register("app", ConfigTree::new("app")).unwrap();
///
/// let revision = runtime.apply("app", "server.port", 8080).unwrap();
/// assert_eq!(revision, 1);
///
/// let handle = runtime.get_tree("app").unwrap();
/// assert!(handle.read().unwrap().contains("server.port"));
/// ```
pub struct StorageRuntime {
    pub(super) trees: RwLock<HashMap<String, TreeSlot>>,
    pub(super) store: Arc<dyn SnapshotStore>,
    /// Present for durable runtimes; replayed on open, truncated on checkpoint.
    pub(super) journal: Option<Journal>,
    /// Whether mutations are appended to `journal`.
    pub(super) journal_writes: bool,
    pub(super) manifest_path: Option<PathBuf>,
    /// Mutators hold this shared; `checkpoint` holds it exclusively.
    pub(super) gate: RwLock<()>,
    /// Register every tree in strict mode.
    pub(super) strict_default: bool,
}

impl StorageRuntime {
    /// A runtime over an in-memory snapshot store, without a journal.
    pub fn in_memory() -> Self {
        Self::with_store(MemorySnapshotStore::new())
    }

    /// A runtime over `store`, without a journal.
    pub fn with_store(store: impl SnapshotStore + 'static) -> Self {
        Self::with_shared_store(Arc::new(store))
    }

    /// A runtime over a store that is also used elsewhere.
    pub fn with_shared_store(store: Arc<dyn SnapshotStore>) -> Self {
        Self::assemble(store, None, false, None, false)
    }

    pub(crate) fn assemble(
        store: Arc<dyn SnapshotStore>,
        journal: Option<Journal>,
        journal_writes: bool,
        manifest_path: Option<PathBuf>,
        strict_default: bool,
    ) -> Self {
        Self {
            trees: RwLock::new(HashMap::new()),
            store,
            journal,
            journal_writes,
            manifest_path,
            gate: RwLock::new(()),
            strict_default,
        }
    }

    /// The snapshot store backing this runtime.
    pub fn store(&self) -> &dyn SnapshotStore {
        self.store.as_ref()
    }

    // ── Registry ─────────────────────────────────────────────────────────────

    /// Adds `tree` under `name`.  The tree is renamed to `name`.
    ///
    /// # Errors
    ///
    /// [`RuntimeError::DuplicateName`] if `name` is taken, or a journal error.
    pub fn register(&self, name: impl Into<String>, mut tree: ConfigTree) -> Result<TreeHandle, RuntimeError> {
        let name = name.into();
        let _gate = self.gate.read();

        tree.set_name(name.clone());
        if self.strict_default {
            tree.set_strict(true);
        }

        // The entry is published while its write lock is held, so lookups of
        // `name` wait until the registration is journaled.
        let slot: TreeSlot = Arc::new(RwLock::new(Some(tree)));
        let mut guard = slot.write();
        {
            let mut trees = self.trees.write();
            if trees.contains_key(&name) {
                return Err(RuntimeError::DuplicateName(name));
            }
            trees.insert(name.clone(), Arc::clone(&slot));
        }

        let Some(tree) = guard.as_ref() else {
            return Err(RuntimeError::NotFound(name));
        };
        let logged = self.log(&JournalRecord::Register {
            tree: name.clone(),
            root: tree.root().clone(),
            revision: tree.revision(),
            strict: tree.is_strict(),
        });
        if let Err(err) = logged {
            guard.take();
            self.unlink(&name, &slot);
            return Err(err);
        }

        info!(tree = %name, leaves = tree.leaf_count(), revision = tree.revision(), "registered tree");
        drop(guard);
        Ok(TreeHandle { name, slot })
    }

    /// Returns a read handle for `name`.
    ///
    /// # Errors
    ///
    /// [`RuntimeError::NotFound`] if no such tree is registered.
    pub fn get_tree(&self, name: &str) -> Result<TreeHandle, RuntimeError> {
        Ok(TreeHandle {
            name: name.to_string(),
            slot: self.slot(name)?,
        })
    }

    /// Unregisters `name` and returns its tree.  Existing handles stop
    /// resolving.
    ///
    /// # Errors
    ///
    /// [`RuntimeError::NotFound`] if no such tree is registered.
    pub fn remove(&self, name: &str) -> Result<ConfigTree, RuntimeError> {
        let _gate = self.gate.read();
        let slot = self.slot(name)?;

        let mut guard = slot.write();
        if guard.is_none() {
            return Err(RuntimeError::NotFound(name.to_string()));
        }
        self.log(&JournalRecord::Remove {
            tree: name.to_string(),
        })?;
        let tree = guard
            .take()
            .ok_or_else(|| RuntimeError::NotFound(name.to_string()))?;
        self.unlink(name, &slot);

        info!(tree = name, revision = tree.revision(), "removed tree");
        Ok(tree)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.trees.read().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn contains(&self, name: &str) -> bool {
        self.trees.read().contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.trees.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // ── Mutations ────────────────────────────────────────────────────────────

    /// Sets `path` to `value` in tree `name` and returns the tree's revision
    /// afterwards.
    ///
    /// # Errors
    ///
    /// [`RuntimeError::NotFound`], [`RuntimeError::Tree`] for the insert
    /// errors of [`ConfigTree::insert`], or a journal error.
    pub fn apply(&self, name: &str, path: impl IntoKeyPath, value: impl Into<Value>) -> Result<u64, RuntimeError> {
        let path = path.into_key_path().map_err(tree_err(name))?;
        let value = value.into();
        let _gate = self.gate.read();

        let slot = self.slot(name)?;
        let mut guard = slot.write();
        let tree = guard
            .as_mut()
            .ok_or_else(|| RuntimeError::NotFound(name.to_string()))?;

        if tree.check_insert(&path, &value).map_err(tree_err(name))? {
            self.log(&JournalRecord::Set {
                tree: name.to_string(),
                path: path.clone(),
                value: value.clone(),
            })?;
            tree.insert(&path, value).map_err(tree_err(name))?;
            debug!(tree = name, %path, revision = tree.revision(), "applied value");
        }
        Ok(tree.revision())
    }

    /// Deletes the node at `path` (and its subtree) from tree `name`.
    /// Returns `false` if nothing was there.
    ///
    /// # Errors
    ///
    /// [`RuntimeError::NotFound`], [`RuntimeError::Tree`] for a malformed
    /// path, or a journal error.
    pub fn delete(&self, name: &str, path: impl IntoKeyPath) -> Result<bool, RuntimeError> {
        let path = path.into_key_path().map_err(tree_err(name))?;
        let _gate = self.gate.read();

        let slot = self.slot(name)?;
        let mut guard = slot.write();
        let tree = guard
            .as_mut()
            .ok_or_else(|| RuntimeError::NotFound(name.to_string()))?;

        if !tree.contains(&path) {
            return Ok(false);
        }
        self.log(&JournalRecord::Delete {
            tree: name.to_string(),
            path: path.clone(),
        })?;
        let deleted = tree.delete(&path).map_err(tree_err(name))?;
        debug!(tree = name, %path, revision = tree.revision(), "deleted node");
        Ok(deleted)
    }

    /// Merges `source` into tree `target` under `policy` and returns the
    /// target's revision afterwards.  `source` need not be registered; it
    /// is typically a layer freshly parsed from text.
    ///
    /// # Errors
    ///
    /// [`RuntimeError::NotFound`] for `target`, [`RuntimeError::Tree`]
    /// wrapping [`TreeError::MergeConflict`], or a journal error.
    pub fn merge_into(&self, target: &str, source: &ConfigTree, policy: MergePolicy) -> Result<u64, RuntimeError> {
        let _gate = self.gate.read();
        self.merge_branch_into(target, source.root(), source.name(), policy)
    }

    /// Merges the registered tree `source` into tree `target`.
    ///
    /// The source is copied under its read lock first, so merging a tree
    /// into itself (or two trees into each other concurrently) cannot
    /// deadlock.
    ///
    /// # Errors
    ///
    /// As for [`StorageRuntime::merge_into`], plus [`RuntimeError::NotFound`]
    /// for `source`.
    pub fn merge_from(&self, target: &str, source: &str, policy: MergePolicy) -> Result<u64, RuntimeError> {
        let _gate = self.gate.read();

        let incoming = {
            let slot = self.slot(source)?;
            let guard = slot.read();
            guard
                .as_ref()
                .map(|tree| tree.root().clone())
                .ok_or_else(|| RuntimeError::NotFound(source.to_string()))?
        };
        self.merge_branch_into(target, &incoming, source, policy)
    }

    fn merge_branch_into(
        &self,
        target: &str,
        incoming: &Branch,
        source: &str,
        policy: MergePolicy,
    ) -> Result<u64, RuntimeError> {
        let slot = self.slot(target)?;
        let mut guard = slot.write();
        let tree = guard
            .as_mut()
            .ok_or_else(|| RuntimeError::NotFound(target.to_string()))?;

        if tree.check_merge(incoming, policy).map_err(tree_err(target))? {
            self.log(&JournalRecord::Merge {
                tree: target.to_string(),
                source: incoming.clone(),
                policy,
            })?;
            tree.merge_branch(incoming, policy).map_err(tree_err(target))?;
            debug!(tree = target, source, ?policy, revision = tree.revision(), "merged trees");
        }
        Ok(tree.revision())
    }

    // ── Snapshots ────────────────────────────────────────────────────────────

    /// Commits a snapshot of tree `name`.
    ///
    /// The image is encoded under the tree's read lock, so it reflects one
    /// consistent revision; the store commits it after the lock is released.
    ///
    /// # Errors
    ///
    /// [`RuntimeError::NotFound`], or the store's error if the commit fails.
    pub fn snapshot(&self, name: &str) -> Result<SnapshotHandle, RuntimeError> {
        let slot = self.slot(name)?;
        let image = {
            let guard = slot.read();
            let tree = guard
                .as_ref()
                .ok_or_else(|| RuntimeError::NotFound(name.to_string()))?;
            encode_image(tree)?
        };

        let handle = self.store.write(&image)?;
        info!(
            tree = name,
            snapshot = %handle,
            revision = image.revision,
            checksum = %image.checksum_hex(),
            "took snapshot"
        );
        Ok(handle)
    }

    /// Replaces the content and revision of tree `name` with the snapshot's.
    /// The tree keeps its registered name.  Returns the restored revision.
    ///
    /// The snapshot is read and verified before the tree is locked, so a
    /// missing or corrupted snapshot leaves the tree untouched.
    ///
    /// # Errors
    ///
    /// [`RuntimeError::NotFound`], [`RuntimeError::Snapshot`] (including
    /// [`SnapshotError::ChecksumMismatch`]), or a journal error.
    pub fn restore(&self, name: &str, handle: &SnapshotHandle) -> Result<u64, RuntimeError> {
        let _gate = self.gate.read();
        let slot = self.slot(name)?;
        let image = self.store.read(handle)?;

        let mut guard = slot.write();
        let tree = guard
            .as_mut()
            .ok_or_else(|| RuntimeError::NotFound(name.to_string()))?;
        self.log(&JournalRecord::Restore {
            tree: name.to_string(),
            snapshot: handle.clone(),
        })?;
        tree.replace_content(image.root, image.revision);

        info!(tree = name, snapshot = %handle, revision = tree.revision(), "restored snapshot");
        Ok(tree.revision())
    }

    // ── Helpers ──────────────────────────────────────────────────────────────

    pub(super) fn slot(&self, name: &str) -> Result<TreeSlot, RuntimeError> {
        self.trees
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| RuntimeError::NotFound(name.to_string()))
    }

    /// Drops the registry entry for `name` if it still points at `slot`.
    fn unlink(&self, name: &str, slot: &TreeSlot) {
        let mut trees = self.trees.write();
        if trees.get(name).is_some_and(|current| Arc::ptr_eq(current, slot)) {
            trees.remove(name);
        }
    }

    fn log(&self, record: &JournalRecord) -> Result<(), RuntimeError> {
        if let (true, Some(journal)) = (self.journal_writes, &self.journal) {
            journal.append(record)?;
        }
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::snapshot::MockSnapshotStore;
    use configx_core::codec::TreeImage;
    use configx_core::KeyPath;

    fn runtime_with(name: &str, pairs: &[(&str, i64)]) -> StorageRuntime {
        let runtime = StorageRuntime::in_memory();
        let mut tree = ConfigTree::new(name);
        for (path, value) in pairs {
            tree.insert(*path, *value).unwrap();
        }
        runtime.register(name, tree).unwrap();
        runtime
    }

    fn revision_of(runtime: &StorageRuntime, name: &str) -> u64 {
        runtime.get_tree(name).unwrap().read().unwrap().revision()
    }

    // ── Registry ──────────────────────────────────────────────────────────────

    #[test]
    fn test_register_renames_tree() {
        let runtime = StorageRuntime::in_memory();

        let handle = runtime.register("app", ConfigTree::new("other")).unwrap();

        assert_eq!(handle.read().unwrap().name(), "app");
        assert_eq!(runtime.names(), ["app"]);
    }

    #[test]
    fn test_register_duplicate_name_fails() {
        let runtime = runtime_with("app", &[]);

        let err = runtime.register("app", ConfigTree::new("app")).unwrap_err();

        assert!(matches!(err, RuntimeError::DuplicateName(ref n) if n == "app"));
        assert_eq!(runtime.len(), 1);
    }

    #[test]
    fn test_get_unknown_tree_is_not_found() {
        let runtime = StorageRuntime::in_memory();
        assert!(matches!(runtime.get_tree("nope"), Err(RuntimeError::NotFound(_))));
        assert!(runtime.is_empty());
    }

    #[test]
    fn test_handle_fails_after_remove() {
        // Arrange
        let runtime = runtime_with("app", &[("a", 1)]);
        let handle = runtime.get_tree("app").unwrap();

        // Act
        let removed = runtime.remove("app").unwrap();

        // Assert
        assert_eq!(removed.get_value("a").unwrap(), &Value::Int(1));
        assert!(!handle.is_live());
        assert!(matches!(handle.read(), Err(RuntimeError::NotFound(_))));
        assert!(!runtime.contains("app"));
        assert!(matches!(runtime.remove("app"), Err(RuntimeError::NotFound(_))));
    }

    #[test]
    fn test_name_can_be_reused_after_remove() {
        let runtime = runtime_with("app", &[("a", 1)]);
        let old = runtime.get_tree("app").unwrap();
        runtime.remove("app").unwrap();

        runtime.register("app", ConfigTree::new("app")).unwrap();

        assert!(old.read().is_err(), "old handles stay detached");
        assert!(runtime.get_tree("app").unwrap().read().unwrap().is_empty());
    }

    #[test]
    fn test_strict_default_applies_on_register() {
        let runtime = StorageRuntime::assemble(
            Arc::new(MemorySnapshotStore::new()),
            None,
            false,
            None,
            true,
        );
        let mut tree = ConfigTree::new("t");
        tree.insert("a", 1).unwrap();
        runtime.register("t", tree).unwrap();

        assert_eq!(runtime.apply("t", "a", 2).unwrap(), 2);
        let err = runtime.apply("t", "b", 1).unwrap_err();

        assert!(matches!(
            err,
            RuntimeError::Tree {
                source: TreeError::StrictMode(_),
                ..
            }
        ));
    }

    // ── Mutations ─────────────────────────────────────────────────────────────

    #[test]
    fn test_apply_returns_new_revision() {
        let runtime = runtime_with("app", &[]);

        assert_eq!(runtime.apply("app", "server.port", 8080).unwrap(), 1);
        assert_eq!(runtime.apply("app", "server.host", "local").unwrap(), 2);
        assert_eq!(runtime.apply("app", "server.host", "local").unwrap(), 2);
    }

    #[test]
    fn test_apply_conflict_reports_tree_and_path() {
        let runtime = runtime_with("app", &[("server", 1)]);

        let err = runtime.apply("app", "server.port", 8080).unwrap_err();

        match err {
            RuntimeError::Tree { tree, source } => {
                assert_eq!(tree, "app");
                assert!(matches!(source, TreeError::PathConflict { .. }));
            }
            other => panic!("expected a tree error, got {other:?}"),
        }
        assert_eq!(revision_of(&runtime, "app"), 1);
    }

    #[test]
    fn test_apply_to_unknown_tree() {
        let runtime = StorageRuntime::in_memory();
        assert!(matches!(runtime.apply("nope", "a", 1), Err(RuntimeError::NotFound(_))));
    }

    #[test]
    fn test_delete_through_runtime() {
        let runtime = runtime_with("app", &[("a.b", 1), ("c", 2)]);

        assert!(runtime.delete("app", "a").unwrap());
        assert!(!runtime.delete("app", "a").unwrap());

        let handle = runtime.get_tree("app").unwrap();
        let tree = handle.read().unwrap();
        assert!(!tree.contains("a.b"));
        assert_eq!(tree.revision(), 3);
    }

    #[test]
    fn test_merge_from_registered_tree() {
        // Arrange
        let runtime = runtime_with("base", &[("a.y", 2)]);
        let mut overlay = ConfigTree::new("overlay");
        overlay.insert("a.x", 1).unwrap();
        runtime.register("overlay", overlay).unwrap();

        // Act
        let revision = runtime.merge_from("base", "overlay", MergePolicy::Overwrite).unwrap();

        // Assert
        assert_eq!(revision, 2);
        let handle = runtime.get_tree("base").unwrap();
        let base = handle.read().unwrap();
        let names: Vec<&str> = base.get("a").unwrap().as_branch().unwrap().names().collect();
        assert_eq!(names, ["y", "x"]);
    }

    #[test]
    fn test_self_merge_through_runtime_is_noop() {
        let runtime = runtime_with("t", &[("a", 1)]);

        let revision = runtime.merge_from("t", "t", MergePolicy::Strict).unwrap();

        assert_eq!(revision, 1);
    }

    #[test]
    fn test_strict_merge_conflict_leaves_target() {
        let runtime = runtime_with("t", &[("a.y", 2)]);
        let mut source = ConfigTree::new("s");
        source.insert("a", 1).unwrap();
        runtime.register("s", source).unwrap();

        let err = runtime.merge_from("t", "s", MergePolicy::Strict).unwrap_err();

        assert!(matches!(
            err,
            RuntimeError::Tree {
                source: TreeError::MergeConflict { .. },
                ..
            }
        ));
        assert_eq!(revision_of(&runtime, "t"), 1);
    }

    // ── Snapshots ─────────────────────────────────────────────────────────────

    #[test]
    fn test_restore_to_revision_three() {
        // Arrange: revision 3, snapshot, then two more changes
        let runtime = runtime_with("app", &[("a", 1), ("b", 2), ("c", 3)]);
        let handle = runtime.snapshot("app").unwrap();
        runtime.apply("app", "a", 10).unwrap();
        runtime.apply("app", "d", 4).unwrap();
        assert_eq!(revision_of(&runtime, "app"), 5);

        // Act
        let revision = runtime.restore("app", &handle).unwrap();

        // Assert
        assert_eq!(revision, 3);
        let tree = runtime.get_tree("app").unwrap();
        let tree = tree.read().unwrap();
        assert_eq!(tree.get_value("a").unwrap(), &Value::Int(1));
        assert!(!tree.contains("d"));
        assert_eq!(tree.name(), "app");
    }

    #[test]
    fn test_restore_keeps_registered_name_for_foreign_snapshot() {
        let runtime = runtime_with("a", &[("k", 1)]);
        runtime.register("b", ConfigTree::new("b")).unwrap();
        let handle = runtime.snapshot("a").unwrap();

        runtime.restore("b", &handle).unwrap();

        let tree = runtime.get_tree("b").unwrap();
        let tree = tree.read().unwrap();
        assert_eq!(tree.name(), "b");
        assert_eq!(tree.get_value("k").unwrap(), &Value::Int(1));
    }

    #[test]
    fn test_snapshot_of_too_deep_tree_commits_nothing() {
        let runtime = StorageRuntime::in_memory();
        let path = KeyPath::from_segments(vec!["n"; configx_core::codec::MAX_DEPTH + 1]).unwrap();
        runtime.register("deep", ConfigTree::new("deep")).unwrap();
        runtime.apply("deep", &path, 1).unwrap();

        let err = runtime.snapshot("deep").unwrap_err();

        assert!(matches!(err, RuntimeError::Codec(CodecError::TooDeep { .. })));
        assert_eq!(runtime.store().latest("deep").unwrap(), None);
    }

    #[test]
    fn test_snapshot_commit_failure_leaves_tree_untouched() {
        // Arrange
        let mut store = MockSnapshotStore::new();
        store.expect_write().times(1).returning(|_| {
            Err(SnapshotError::Io {
                path: PathBuf::from("/unwritable"),
                source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
            })
        });
        let runtime = StorageRuntime::with_store(store);
        let mut tree = ConfigTree::new("app");
        tree.insert("a", 1).unwrap();
        runtime.register("app", tree.clone()).unwrap();

        // Act
        let err = runtime.snapshot("app").unwrap_err();

        // Assert
        assert!(matches!(err, RuntimeError::Snapshot(SnapshotError::Io { .. })));
        let handle = runtime.get_tree("app").unwrap();
        assert!(handle.read().unwrap().same_content(&tree));
        assert_eq!(handle.read().unwrap().revision(), 1);
    }

    #[test]
    fn test_restore_of_corrupted_snapshot_leaves_tree_untouched() {
        // Arrange
        let mut store = MockSnapshotStore::new();
        store.expect_read().returning(|handle| {
            Err(SnapshotError::ChecksumMismatch {
                handle: handle.clone(),
                source: CodecError::ChecksumMismatch {
                    stored: "00".into(),
                    computed: "11".into(),
                },
            })
        });
        let runtime = StorageRuntime::with_store(store);
        let mut tree = ConfigTree::new("app");
        tree.insert("a", 1).unwrap();
        runtime.register("app", tree).unwrap();

        // Act
        let err = runtime
            .restore("app", &SnapshotHandle::new("app", 1))
            .unwrap_err();

        // Assert
        assert!(matches!(
            err,
            RuntimeError::Snapshot(SnapshotError::ChecksumMismatch { .. })
        ));
        let handle = runtime.get_tree("app").unwrap();
        let tree = handle.read().unwrap();
        assert_eq!(tree.revision(), 1);
        assert_eq!(tree.get_value("a").unwrap(), &Value::Int(1));
    }

    #[test]
    fn test_restore_uses_image_from_store() {
        let mut root = configx_core::Branch::new();
        root.insert("from_store", configx_core::ConfigNode::Leaf(Value::Bool(true)));
        let mut store = MockSnapshotStore::new();
        store.expect_read().returning(move |_| {
            Ok(TreeImage {
                name: "elsewhere".into(),
                revision: 9,
                root: root.clone(),
                checksum: [0; 32],
            })
        });
        let runtime = StorageRuntime::with_store(store);
        runtime.register("app", ConfigTree::new("app")).unwrap();

        let revision = runtime.restore("app", &SnapshotHandle::new("x", 4)).unwrap();

        assert_eq!(revision, 9);
        let handle = runtime.get_tree("app").unwrap();
        let tree = handle.read().unwrap();
        assert!(tree.contains(&KeyPath::parse("from_store").unwrap()));
        assert_eq!(tree.name(), "app");
    }
}
