//! Checkpoint manifest: which snapshot holds each tree as of the last
//! checkpoint.
//!
//! ```toml
//! journal_seq = 42
//!
//! [[trees]]
//! name = "app"
//! version = 3
//! strict = false
//! ```
//!
//! `journal_seq` is the last journal entry the checkpoint covers; recovery
//! replays only later entries.  The file is replaced atomically (temporary
//! file, sync, rename).

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use super::snapshot::SnapshotHandle;
use super::sync_dir;

/// Error type for manifest operations.
#[derive(Debug, Error)]
pub enum ManifestError {
    /// A file system I/O error occurred.
    #[error("I/O error accessing checkpoint manifest at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse checkpoint manifest: {0}")]
    Parse(#[from] toml::de::Error),

    /// The manifest could not be serialized to TOML.
    #[error("failed to serialize checkpoint manifest: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Contents of `checkpoint.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CheckpointManifest {
    #[serde(default)]
    pub journal_seq: u64,
    #[serde(default)]
    pub trees: Vec<ManifestEntry>,
}

/// One checkpointed tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub name: String,
    pub version: u64,
    #[serde(default)]
    pub strict: bool,
}

impl ManifestEntry {
    pub fn handle(&self) -> SnapshotHandle {
        SnapshotHandle::new(&self.name, self.version)
    }
}

/// Loads the manifest at `path`; `None` if no checkpoint was ever taken.
///
/// # Errors
///
/// [`ManifestError::Io`] for read failures other than "not found",
/// [`ManifestError::Parse`] for malformed TOML.
pub fn load_manifest(path: &Path) -> Result<Option<CheckpointManifest>, ManifestError> {
    match fs::read_to_string(path) {
        Ok(content) => Ok(Some(toml::from_str(&content)?)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(source) => Err(ManifestError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Atomically replaces the manifest at `path`.
///
/// # Errors
///
/// [`ManifestError::Io`] for file-system failures,
/// [`ManifestError::Serialize`] if serialization fails.
pub fn save_manifest(path: &Path, manifest: &CheckpointManifest) -> Result<(), ManifestError> {
    let content = toml::to_string_pretty(manifest)?;
    let dir = path
        .parent()
        .filter(|d| !d.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let tmp = dir.join(format!(".checkpoint.{}.tmp", Uuid::new_v4()));

    let io_err = |path: &Path, source| ManifestError::Io {
        path: path.to_path_buf(),
        source,
    };
    let write = || -> Result<(), ManifestError> {
        let mut file = File::create(&tmp).map_err(|e| io_err(tmp.as_path(), e))?;
        file.write_all(content.as_bytes()).map_err(|e| io_err(tmp.as_path(), e))?;
        file.sync_all().map_err(|e| io_err(tmp.as_path(), e))?;
        fs::rename(&tmp, path).map_err(|e| io_err(path, e))
    };
    if let Err(e) = write() {
        let _ = fs::remove_file(&tmp);
        return Err(e);
    }

    sync_dir(dir).map_err(|e| io_err(dir, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path() -> (PathBuf, PathBuf) {
        let dir = std::env::temp_dir().join(format!("configx_manifest_{}", Uuid::new_v4()));
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("checkpoint.toml");
        (dir, path)
    }

    #[test]
    fn test_missing_manifest_is_none() {
        let (dir, path) = temp_path();
        assert_eq!(load_manifest(&path).unwrap(), None);
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn test_save_then_load() {
        // Arrange
        let (dir, path) = temp_path();
        let manifest = CheckpointManifest {
            journal_seq: 17,
            trees: vec![
                ManifestEntry {
                    name: "app".into(),
                    version: 3,
                    strict: false,
                },
                ManifestEntry {
                    name: "flags with spaces".into(),
                    version: 1,
                    strict: true,
                },
            ],
        };

        // Act
        save_manifest(&path, &manifest).unwrap();
        let loaded = load_manifest(&path).unwrap();

        // Assert
        assert_eq!(loaded, Some(manifest));
        let text = fs::read_to_string(&path).unwrap();
        assert!(text.contains("[[trees]]"));
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn test_save_replaces_and_leaves_no_temp_files() {
        let (dir, path) = temp_path();
        save_manifest(&path, &CheckpointManifest::default()).unwrap();
        let second = CheckpointManifest {
            journal_seq: 2,
            trees: Vec::new(),
        };

        save_manifest(&path, &second).unwrap();

        assert_eq!(load_manifest(&path).unwrap(), Some(second));
        assert_eq!(fs::read_dir(&dir).unwrap().count(), 1);
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn test_handwritten_manifest_defaults() {
        let manifest: CheckpointManifest =
            toml::from_str("[[trees]]\nname = \"a\"\nversion = 4\n").unwrap();

        assert_eq!(manifest.journal_seq, 0);
        assert_eq!(manifest.trees[0].handle(), SnapshotHandle::new("a", 4));
        assert!(!manifest.trees[0].strict);
    }
}
