//! Durable runtimes: open, recover, checkpoint, shutdown.
//!
//! A data directory holds three things:
//!
//! ```text
//! <data_dir>/
//!   snapshots/         FileSnapshotStore, one directory per tree
//!   journal.wal        mutations since the last checkpoint
//!   checkpoint.toml    snapshot version of every tree at the last checkpoint
//! ```
//!
//! Recovery restores every tree named in the manifest from its snapshot,
//! then replays the journal entries newer than the manifest's
//! `journal_seq`.  A checkpoint snapshots every tree, writes the manifest,
//! and only then truncates the journal; a crash between the two steps leaves
//! entries the sequence number already marks as covered.  Once the journal
//! is truncated, the snapshots of the previous checkpoint are deleted.

use std::sync::Arc;

use configx_core::codec::encode_image;
use configx_core::{ConfigTree, TreeError};
use parking_lot::RwLock;
use tracing::{debug, info, warn};

use super::runtime::{tree_err, RuntimeError, StorageRuntime};
use crate::infrastructure::journal::{Journal, JournalRecord};
use crate::infrastructure::manifest::{load_manifest, save_manifest, CheckpointManifest, ManifestEntry};
use crate::infrastructure::settings::Settings;
use crate::infrastructure::snapshot::{FileSnapshotStore, SnapshotError, SnapshotHandle};

/// Snapshot store directory inside the data directory.
pub const SNAPSHOT_DIR: &str = "snapshots";
/// Journal file inside the data directory.
pub const JOURNAL_FILE: &str = "journal.wal";
/// Checkpoint manifest inside the data directory.
pub const MANIFEST_FILE: &str = "checkpoint.toml";

impl StorageRuntime {
    /// Opens (or creates) the durable runtime rooted at
    /// `settings.storage.data_dir` and recovers its trees.
    ///
    /// The journal file is always replayed when present.  With
    /// `storage.journal = false` new mutations are not appended to it, so
    /// only checkpointed state survives a restart.
    ///
    /// # Errors
    ///
    /// Store, journal or manifest errors; a snapshot named by the manifest
    /// that fails its checksum is reported as [`RuntimeError::Snapshot`].
    pub fn open(settings: &Settings) -> Result<Self, RuntimeError> {
        let data_dir = &settings.storage.data_dir;
        let store = FileSnapshotStore::open(data_dir.join(SNAPSHOT_DIR))?;
        let journal = Journal::open(data_dir.join(JOURNAL_FILE), settings.storage.fsync)?;

        let runtime = Self::assemble(
            Arc::new(store),
            Some(journal),
            settings.storage.journal,
            Some(data_dir.join(MANIFEST_FILE)),
            settings.trees.strict,
        );
        runtime.recover()?;
        Ok(runtime)
    }

    fn recover(&self) -> Result<(), RuntimeError> {
        let manifest = match &self.manifest_path {
            Some(path) => load_manifest(path)?,
            None => None,
        };
        let covered = manifest.as_ref().map_or(0, |m| m.journal_seq);

        if let Some(manifest) = manifest {
            for entry in manifest.trees {
                let image = self.store.read(&entry.handle())?;
                let mut tree = image.into_tree();
                tree.set_name(entry.name.clone());
                tree.set_strict(entry.strict);
                debug!(tree = %entry.name, version = entry.version, revision = tree.revision(), "restored checkpointed tree");
                self.trees
                    .write()
                    .insert(entry.name, Arc::new(RwLock::new(Some(tree))));
            }
        }

        let mut replayed = 0usize;
        if let Some(journal) = &self.journal {
            journal.advance_seq(covered);
            for entry in journal.replay()? {
                if entry.seq <= covered {
                    continue;
                }
                self.replay_record(entry.record)?;
                replayed += 1;
            }
        }

        info!(trees = self.len(), checkpoint_seq = covered, replayed, "recovered runtime state");
        Ok(())
    }

    /// Applies one journal record without journaling it again.
    fn replay_record(&self, record: JournalRecord) -> Result<(), RuntimeError> {
        match record {
            JournalRecord::Register {
                tree,
                root,
                revision,
                strict,
            } => {
                let mut restored = ConfigTree::from_parts(tree.clone(), root, revision);
                restored.set_strict(strict);
                let mut trees = self.trees.write();
                if trees.contains_key(&tree) {
                    return Err(RuntimeError::DuplicateName(tree));
                }
                trees.insert(tree, Arc::new(RwLock::new(Some(restored))));
                Ok(())
            }
            JournalRecord::Set { tree, path, value } => {
                self.replay_on(&tree, |t| t.insert(&path, value).map(drop))
            }
            JournalRecord::Delete { tree, path } => self.replay_on(&tree, |t| t.delete(&path).map(drop)),
            JournalRecord::Merge {
                tree,
                source,
                policy,
            } => self.replay_on(&tree, |t| t.merge_branch(&source, policy).map(drop)),
            JournalRecord::Remove { tree } => {
                let slot = self
                    .trees
                    .write()
                    .remove(&tree)
                    .ok_or(RuntimeError::NotFound(tree))?;
                slot.write().take();
                Ok(())
            }
            JournalRecord::Restore { tree, snapshot } => {
                let image = self.store.read(&snapshot)?;
                self.replay_on(&tree, |t| {
                    t.replace_content(image.root, image.revision);
                    Ok(())
                })
            }
        }
    }

    fn replay_on<F>(&self, name: &str, apply: F) -> Result<(), RuntimeError>
    where
        F: FnOnce(&mut ConfigTree) -> Result<(), TreeError>,
    {
        let slot = self.slot(name)?;
        let mut guard = slot.write();
        let tree = guard
            .as_mut()
            .ok_or_else(|| RuntimeError::NotFound(name.to_string()))?;
        apply(tree).map_err(tree_err(name))
    }

    /// Snapshots every registered tree, records them in the manifest and
    /// truncates the journal.  Returns the new snapshot handles, sorted by
    /// tree name.
    ///
    /// Mutations wait while a checkpoint runs.  On failure the previous
    /// manifest and the journal are left as they were.
    ///
    /// # Errors
    ///
    /// The first store, codec, manifest or journal error encountered.
    pub fn checkpoint(&self) -> Result<Vec<SnapshotHandle>, RuntimeError> {
        let _gate = self.gate.write();
        let superseded = self.previous_checkpoint();

        let mut slots: Vec<_> = self
            .trees
            .read()
            .iter()
            .map(|(name, slot)| (name.clone(), Arc::clone(slot)))
            .collect();
        slots.sort_by(|a, b| a.0.cmp(&b.0));

        let mut handles = Vec::with_capacity(slots.len());
        let mut entries = Vec::with_capacity(slots.len());
        for (name, slot) in slots {
            let (image, strict) = {
                let guard = slot.read();
                match guard.as_ref() {
                    Some(tree) => (encode_image(tree)?, tree.is_strict()),
                    None => continue,
                }
            };
            let handle = self.store.write(&image)?;
            entries.push(ManifestEntry {
                name,
                version: handle.version,
                strict,
            });
            handles.push(handle);
        }

        let journal_seq = self.journal.as_ref().map_or(0, Journal::last_seq);
        if let Some(path) = &self.manifest_path {
            save_manifest(
                path,
                &CheckpointManifest {
                    journal_seq,
                    trees: entries,
                },
            )?;
            if let Some(journal) = &self.journal {
                journal.truncate()?;
            }
            self.prune(superseded, &handles);
        }

        info!(trees = handles.len(), journal_seq, "checkpoint complete");
        Ok(handles)
    }

    /// Snapshot handles named by the manifest on disk, if any.
    fn previous_checkpoint(&self) -> Vec<SnapshotHandle> {
        let Some(path) = &self.manifest_path else {
            return Vec::new();
        };
        match load_manifest(path) {
            Ok(manifest) => manifest
                .map(|m| m.trees.iter().map(ManifestEntry::handle).collect())
                .unwrap_or_default(),
            Err(e) => {
                warn!(error = %e, "previous checkpoint manifest unreadable; its snapshots are kept");
                Vec::new()
            }
        }
    }

    /// Deletes checkpoint snapshots the new manifest no longer names.
    /// Snapshots taken with [`StorageRuntime::snapshot`] are never touched.
    fn prune(&self, superseded: Vec<SnapshotHandle>, current: &[SnapshotHandle]) {
        for handle in superseded {
            if current.contains(&handle) {
                continue;
            }
            match self.store.delete(&handle) {
                Ok(()) => debug!(snapshot = %handle, "pruned superseded checkpoint snapshot"),
                Err(SnapshotError::NotFound(_)) => {}
                Err(e) => warn!(snapshot = %handle, error = %e, "failed to prune checkpoint snapshot"),
            }
        }
    }

    /// Takes a final checkpoint and consumes the runtime.
    ///
    /// # Errors
    ///
    /// As for [`StorageRuntime::checkpoint`].
    pub fn shutdown(self) -> Result<Vec<SnapshotHandle>, RuntimeError> {
        let handles = self.checkpoint()?;
        info!(trees = handles.len(), "runtime shut down");
        Ok(handles)
    }
}
