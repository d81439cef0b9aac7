//! Durable snapshot store on the local file system.
//!
//! Layout under the store root:
//!
//! ```text
//! <root>/<encoded tree name>/<version:020>.cfgx
//! <root>/<encoded tree name>/last_version
//! ```
//!
//! `last_version` records the highest version ever handed out for the tree,
//! so deleting the newest snapshot never lets a later commit reuse its
//! version, even across restarts.
//!
//! Tree names are percent-encoded so any name maps to exactly one safe
//! directory.  Each commit writes a uniquely named temporary file in the
//! tree's directory, syncs it, renames it into place and then syncs the
//! directory, so a crash leaves either the whole snapshot or none of it.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::fs::{self, File};
use std::io::{self, Write as _};
use std::path::{Path, PathBuf};

use configx_core::codec::{decode_image, EncodedImage, TreeImage};
use parking_lot::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

use super::{SnapshotError, SnapshotHandle, SnapshotStore};
use crate::infrastructure::sync_dir;

const EXTENSION: &str = "cfgx";
const VERSION_MARK: &str = "last_version";

/// Snapshot store rooted at a directory.
#[derive(Debug)]
pub struct FileSnapshotStore {
    root: PathBuf,
    /// Last version handed out per tree; loaded lazily from disk.
    versions: Mutex<HashMap<String, u64>>,
}

impl FileSnapshotStore {
    /// Opens (and creates if needed) a store rooted at `root`.
    ///
    /// # Errors
    ///
    /// Returns [`SnapshotError::Io`] if the directory cannot be created.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, SnapshotError> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|source| SnapshotError::Io {
            path: root.clone(),
            source,
        })?;
        Ok(Self {
            root,
            versions: Mutex::new(HashMap::new()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The file a snapshot is (or would be) stored in.
    pub fn snapshot_path(&self, handle: &SnapshotHandle) -> PathBuf {
        self.tree_dir(&handle.tree)
            .join(format!("{:020}.{EXTENSION}", handle.version))
    }

    fn tree_dir(&self, tree: &str) -> PathBuf {
        self.root.join(encode_tree_name(tree))
    }

    /// Reserves the next version for `tree` and records it in the tree's
    /// version mark.  The tree directory must exist.
    fn allocate_version(&self, tree: &str) -> Result<u64, SnapshotError> {
        let mut versions = self.versions.lock();
        let last = match versions.get(tree) {
            Some(v) => *v,
            None => {
                let on_disk = self.scan_versions(tree)?.last().copied().unwrap_or(0);
                on_disk.max(self.read_version_mark(tree)?)
            }
        };
        let next = last + 1;
        self.write_version_mark(tree, next)?;
        versions.insert(tree.to_string(), next);
        Ok(next)
    }

    fn read_version_mark(&self, tree: &str) -> Result<u64, SnapshotError> {
        let path = self.tree_dir(tree).join(VERSION_MARK);
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
            Err(source) => return Err(SnapshotError::Io { path, source }),
        };
        match text.trim().parse() {
            Ok(version) => Ok(version),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "ignoring unreadable version mark");
                Ok(0)
            }
        }
    }

    /// Replaces the version mark through a temporary file.  The directory
    /// sync that follows the snapshot rename makes both renames durable.
    fn write_version_mark(&self, tree: &str, version: u64) -> Result<(), SnapshotError> {
        let dir = self.tree_dir(tree);
        let path = dir.join(VERSION_MARK);
        let tmp_path = dir.join(format!(".{VERSION_MARK}.{}.tmp", Uuid::new_v4()));
        if let Err(e) = write_synced(&tmp_path, version.to_string().as_bytes()) {
            let _ = fs::remove_file(&tmp_path);
            return Err(e);
        }
        fs::rename(&tmp_path, &path).map_err(|source| {
            let _ = fs::remove_file(&tmp_path);
            SnapshotError::Io { path, source }
        })
    }

    /// Committed versions of `tree` on disk, ascending.
    fn scan_versions(&self, tree: &str) -> Result<Vec<u64>, SnapshotError> {
        let dir = self.tree_dir(tree);
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => return Err(SnapshotError::Io { path: dir, source }),
        };

        let mut versions = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| SnapshotError::Io {
                path: dir.clone(),
                source,
            })?;
            let file_name = entry.file_name();
            let Some(name) = file_name.to_str() else {
                continue;
            };
            // Temporary files start with '.'; anything else unexpected is skipped.
            if let Some(version) = name
                .strip_suffix(EXTENSION)
                .and_then(|stem| stem.strip_suffix('.'))
                .filter(|stem| !stem.starts_with('.'))
                .and_then(|stem| stem.parse::<u64>().ok())
            {
                versions.push(version);
            }
        }
        versions.sort_unstable();
        Ok(versions)
    }
}

impl SnapshotStore for FileSnapshotStore {
    fn write(&self, image: &EncodedImage) -> Result<SnapshotHandle, SnapshotError> {
        let dir = self.tree_dir(&image.name);
        fs::create_dir_all(&dir).map_err(|source| SnapshotError::Io {
            path: dir.clone(),
            source,
        })?;

        let handle = SnapshotHandle::new(&image.name, self.allocate_version(&image.name)?);
        let final_path = self.snapshot_path(&handle);
        let tmp_path = dir.join(format!(".{:020}.{}.tmp", handle.version, Uuid::new_v4()));

        if let Err(e) = write_synced(&tmp_path, &image.bytes) {
            let _ = fs::remove_file(&tmp_path);
            return Err(e);
        }
        if let Err(source) = fs::rename(&tmp_path, &final_path) {
            let _ = fs::remove_file(&tmp_path);
            return Err(SnapshotError::Io {
                path: final_path,
                source,
            });
        }
        sync_tree_dir(&dir)?;

        debug!(
            snapshot = %handle,
            bytes = image.bytes.len(),
            checksum = %image.checksum_hex(),
            "committed snapshot"
        );
        Ok(handle)
    }

    fn read(&self, handle: &SnapshotHandle) -> Result<TreeImage, SnapshotError> {
        let path = self.snapshot_path(handle);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(SnapshotError::NotFound(handle.clone()))
            }
            Err(source) => return Err(SnapshotError::Io { path, source }),
        };
        decode_image(&bytes).map_err(|e| {
            warn!(snapshot = %handle, error = %e, "snapshot failed verification");
            SnapshotError::from_codec(handle, e)
        })
    }

    fn list(&self, tree: &str) -> Result<Vec<SnapshotHandle>, SnapshotError> {
        Ok(self
            .scan_versions(tree)?
            .into_iter()
            .map(|version| SnapshotHandle::new(tree, version))
            .collect())
    }

    fn delete(&self, handle: &SnapshotHandle) -> Result<(), SnapshotError> {
        let path = self.snapshot_path(handle);
        match fs::remove_file(&path) {
            Ok(()) => {
                sync_tree_dir(&self.tree_dir(&handle.tree))?;
                debug!(snapshot = %handle, "deleted snapshot");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(SnapshotError::NotFound(handle.clone())),
            Err(source) => Err(SnapshotError::Io { path, source }),
        }
    }
}

// ── Utility helpers ───────────────────────────────────────────────────────────

/// Percent-encodes every byte outside `[A-Za-z0-9_-]`.  The empty name
/// becomes `%`, which no other name can produce.
pub(crate) fn encode_tree_name(name: &str) -> String {
    if name.is_empty() {
        return "%".to_string();
    }
    let mut out = String::with_capacity(name.len());
    for byte in name.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'_' || byte == b'-' {
            out.push(byte as char);
        } else {
            let _ = write!(out, "%{byte:02X}");
        }
    }
    out
}

/// Writes `bytes` to a new file at `path` and syncs it to disk.
pub(crate) fn write_synced(path: &Path, bytes: &[u8]) -> Result<(), SnapshotError> {
    let io_err = |source| SnapshotError::Io {
        path: path.to_path_buf(),
        source,
    };
    let mut file = File::create(path).map_err(io_err)?;
    file.write_all(bytes).map_err(io_err)?;
    file.sync_all().map_err(io_err)
}

fn sync_tree_dir(dir: &Path) -> Result<(), SnapshotError> {
    sync_dir(dir).map_err(|source| SnapshotError::Io {
        path: dir.to_path_buf(),
        source,
    })
}

// ── Tests ─────────────────────────────────────────────────────────────────────
