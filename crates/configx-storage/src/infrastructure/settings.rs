//! TOML-based runtime settings.
//!
//! ```toml
//! [storage]
//! data_dir = "./configx-data"   # snapshots, journal and checkpoint manifest
//! journal = true                # write-ahead log of every mutation
//! fsync = true                  # sync the journal after each append
//!
//! [trees]
//! strict = false                # register every tree in strict mode
//! ```
//!
//! Every field has a serde default, so a partial file (or no file at all)
//! yields a working configuration.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type for settings file operations.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// A file system I/O error occurred.
    #[error("I/O error accessing settings at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse settings TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// The settings could not be serialized to TOML.
    #[error("failed to serialize settings: {0}")]
    Serialize(#[from] toml::ser::Error),
}

// ── Settings schema types ─────────────────────────────────────────────────────

/// Top-level runtime settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Settings {
    #[serde(default)]
    pub storage: StorageSettings,
    #[serde(default)]
    pub trees: TreeSettings,
}

/// Where and how the runtime persists state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StorageSettings {
    /// Root directory for snapshots, the journal and the checkpoint manifest.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Whether mutations are written ahead to `journal.wal`.
    #[serde(default = "default_true")]
    pub journal: bool,
    /// Whether each journal append is followed by `sync_data`.
    #[serde(default = "default_true")]
    pub fsync: bool,
}

/// Defaults applied to registered trees.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TreeSettings {
    /// Register every tree in strict mode (updates only, no new keys).
    #[serde(default)]
    pub strict: bool,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_data_dir() -> PathBuf {
    PathBuf::from("./configx-data")
}
fn default_true() -> bool {
    true
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            journal: default_true(),
            fsync: default_true(),
        }
    }
}

impl Settings {
    /// Default settings rooted at `data_dir`.
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        let mut settings = Self::default();
        settings.storage.data_dir = data_dir.into();
        settings
    }
}

// ── Settings repository ───────────────────────────────────────────────────────

/// Loads settings from `path`, returning `Settings::default()` if the file
/// does not exist.
///
/// # Errors
///
/// Returns [`SettingsError::Io`] for file-system errors other than "not
/// found", and [`SettingsError::Parse`] if the TOML is malformed.
pub fn load_settings(path: &Path) -> Result<Settings, SettingsError> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(toml::from_str(&content)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Settings::default()),
        Err(source) => Err(SettingsError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Persists `settings` to `path`, creating parent directories as needed.
///
/// # Errors
///
/// Returns [`SettingsError::Io`] for file-system failures or
/// [`SettingsError::Serialize`] if serialization fails.
pub fn save_settings(path: &Path, settings: &Settings) -> Result<(), SettingsError> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir).map_err(|source| SettingsError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
    }

    let content = toml::to_string_pretty(settings)?;
    std::fs::write(path, content).map_err(|source| SettingsError::Io {
        path: path.to_path_buf(),
        source,
    })
}

// ── Tests ─────────────────────────────────────────────────────────────────────
