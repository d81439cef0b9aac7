//! In-memory snapshot store for tests and ephemeral runtimes.
//!
//! Images are kept encoded, so reads go through the same checksum
//! verification as the file store.

use std::collections::{BTreeMap, HashMap};

use configx_core::codec::{decode_image, EncodedImage, TreeImage};
use parking_lot::Mutex;

use super::{SnapshotError, SnapshotHandle, SnapshotStore};

#[derive(Debug, Default)]
struct TreeSnapshots {
    last_version: u64,
    images: BTreeMap<u64, Vec<u8>>,
}

/// Snapshot store that lives and dies with the process.
#[derive(Debug, Default)]
pub struct MemorySnapshotStore {
    trees: Mutex<HashMap<String, TreeSnapshots>>,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of stored snapshots across all trees.
    pub fn len(&self) -> usize {
        self.trees.lock().values().map(|t| t.images.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl SnapshotStore for MemorySnapshotStore {
    fn write(&self, image: &EncodedImage) -> Result<SnapshotHandle, SnapshotError> {
        let mut trees = self.trees.lock();
        let entry = trees.entry(image.name.clone()).or_default();
        entry.last_version += 1;
        entry.images.insert(entry.last_version, image.bytes.clone());
        Ok(SnapshotHandle::new(&image.name, entry.last_version))
    }

    fn read(&self, handle: &SnapshotHandle) -> Result<TreeImage, SnapshotError> {
        let trees = self.trees.lock();
        let bytes = trees
            .get(&handle.tree)
            .and_then(|t| t.images.get(&handle.version))
            .ok_or_else(|| SnapshotError::NotFound(handle.clone()))?;
        decode_image(bytes).map_err(|e| SnapshotError::from_codec(handle, e))
    }

    fn list(&self, tree: &str) -> Result<Vec<SnapshotHandle>, SnapshotError> {
        let trees = self.trees.lock();
        Ok(trees
            .get(tree)
            .map(|t| {
                t.images
                    .keys()
                    .map(|version| SnapshotHandle::new(tree, *version))
                    .collect()
            })
            .unwrap_or_default())
    }

    fn delete(&self, handle: &SnapshotHandle) -> Result<(), SnapshotError> {
        self.trees
            .lock()
            .get_mut(&handle.tree)
            .and_then(|t| t.images.remove(&handle.version))
            .map(|_| ())
            .ok_or_else(|| SnapshotError::NotFound(handle.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use configx_core::codec::encode_image;
    use configx_core::ConfigTree;

    fn image_of(name: &str, revision_bumps: usize) -> EncodedImage {
        let mut tree = ConfigTree::new(name);
        for i in 0..revision_bumps {
            tree.insert("k", i as i64).unwrap();
        }
        encode_image(&tree).unwrap()
    }

    #[test]
    fn test_round_trip_preserves_revision() {
        let store = MemorySnapshotStore::new();

        let handle = store.write(&image_of("t", 3)).unwrap();
        let image = store.read(&handle).unwrap();

        assert_eq!(image.revision, 3);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_versions_survive_deletion() {
        // Arrange
        let store = MemorySnapshotStore::new();
        let h1 = store.write(&image_of("t", 1)).unwrap();
        let h2 = store.write(&image_of("t", 2)).unwrap();

        // Act
        store.delete(&h2).unwrap();
        let h3 = store.write(&image_of("t", 3)).unwrap();

        // Assert: a deleted version is never handed out again
        assert_eq!(h3.version, 3);
        assert_eq!(store.list("t").unwrap(), [h1, h3]);
    }

    #[test]
    fn test_missing_snapshot_errors() {
        let store = MemorySnapshotStore::new();
        let handle = SnapshotHandle::new("t", 1);

        assert!(store.is_empty());
        assert!(matches!(store.read(&handle), Err(SnapshotError::NotFound(_))));
        assert!(matches!(store.delete(&handle), Err(SnapshotError::NotFound(_))));
        assert!(store.list("t").unwrap().is_empty());
    }
}
