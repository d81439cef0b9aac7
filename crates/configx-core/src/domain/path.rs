//! Key paths: the addresses of nodes inside a [`ConfigTree`].
//!
//! A key path is an ordered list of non-empty segments.  The textual form
//! joins segments with `.` (`server.tls.port`).  Two paths are equal when
//! every segment matches exactly; there is no case folding or trimming of
//! individual segments.
//!
//! [`ConfigTree`]: crate::domain::tree::ConfigTree

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::domain::TreeError;

/// An ordered sequence of segment names addressing one node.
///
/// # Examples
///
/// ```rust
/// use configx_core::KeyPath;
///
/// let path: KeyPath = "server.port".parse().unwrap();
/// assert_eq!(path.segments(), ["server", "port"]);
/// assert_eq!(path.to_string(), "server.port");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct KeyPath {
    segments: Vec<String>,
}

impl KeyPath {
    /// Parses a dotted path such as `"a.b.c"`.
    ///
    /// Surrounding whitespace is ignored.
    ///
    /// # Errors
    ///
    /// Returns [`TreeError::InvalidPath`] for an empty string or a path with
    /// an empty segment (`"a..b"`, `".a"`, `"a."`).
    pub fn parse(dotted: &str) -> Result<Self, TreeError> {
        let trimmed = dotted.trim();
        if trimmed.is_empty() {
            return Err(TreeError::InvalidPath {
                path: dotted.to_string(),
                reason: "path cannot be empty",
            });
        }

        let mut segments = Vec::new();
        for part in trimmed.split('.') {
            if part.is_empty() {
                return Err(TreeError::InvalidPath {
                    path: dotted.to_string(),
                    reason: "path segments cannot be empty",
                });
            }
            segments.push(part.to_string());
        }
        Ok(Self { segments })
    }

    /// Builds a path from already-split segments.
    ///
    /// Segments may contain any characters, including `.`.
    ///
    /// # Errors
    ///
    /// Returns [`TreeError::InvalidPath`] if `segments` is empty or any
    /// segment is the empty string.
    pub fn from_segments<I, S>(segments: I) -> Result<Self, TreeError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let segments: Vec<String> = segments.into_iter().map(Into::into).collect();
        if segments.is_empty() {
            return Err(TreeError::InvalidPath {
                path: String::new(),
                reason: "path cannot be empty",
            });
        }
        if segments.iter().any(String::is_empty) {
            return Err(TreeError::InvalidPath {
                path: segments.join("."),
                reason: "path segments cannot be empty",
            });
        }
        Ok(Self { segments })
    }

    /// Returns the segments in order.
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Number of segments (always at least one).
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    /// Always `false`; a key path has at least one segment.
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// The final segment.
    pub fn last(&self) -> &str {
        // Construction guarantees at least one segment.
        self.segments.last().map(String::as_str).unwrap_or_default()
    }

    /// Returns a new path with `segment` appended.
    pub fn child(&self, segment: impl Into<String>) -> KeyPath {
        let mut segments = self.segments.clone();
        segments.push(segment.into());
        KeyPath { segments }
    }

    /// Returns the first `len` segments as a path, or `None` for `len == 0`.
    pub fn prefix(&self, len: usize) -> Option<KeyPath> {
        if len == 0 || len > self.segments.len() {
            return None;
        }
        Some(KeyPath {
            segments: self.segments[..len].to_vec(),
        })
    }

    /// Appends every segment of `other` to this path.
    pub fn join(&self, other: &KeyPath) -> KeyPath {
        let mut segments = self.segments.clone();
        segments.extend(other.segments.iter().cloned());
        KeyPath { segments }
    }

    /// Internal constructor used by traversals that already hold a
    /// non-empty, validated segment list.
    pub(crate) fn from_trusted(segments: Vec<String>) -> KeyPath {
        debug_assert!(!segments.is_empty());
        KeyPath { segments }
    }
}

impl fmt::Display for KeyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.segments.join("."))
    }
}

impl FromStr for KeyPath {
    type Err = TreeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        KeyPath::parse(s)
    }
}

impl TryFrom<&str> for KeyPath {
    type Error = TreeError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        KeyPath::parse(value)
    }
}

impl TryFrom<String> for KeyPath {
    type Error = TreeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        KeyPath::parse(&value)
    }
}

/// Conversion into a [`KeyPath`], accepted by every tree operation.
///
/// Implemented for dotted strings and for paths themselves, so callers can
/// write `tree.get("server.port")` or `tree.get(&path)`.
pub trait IntoKeyPath {
    /// # Errors
    ///
    /// Returns [`TreeError::InvalidPath`] when a string is not a valid path.
    fn into_key_path(self) -> Result<KeyPath, TreeError>;
}

impl IntoKeyPath for KeyPath {
    fn into_key_path(self) -> Result<KeyPath, TreeError> {
        Ok(self)
    }
}

impl IntoKeyPath for &KeyPath {
    fn into_key_path(self) -> Result<KeyPath, TreeError> {
        Ok(self.clone())
    }
}

impl IntoKeyPath for &str {
    fn into_key_path(self) -> Result<KeyPath, TreeError> {
        KeyPath::parse(self)
    }
}

impl IntoKeyPath for String {
    fn into_key_path(self) -> Result<KeyPath, TreeError> {
        KeyPath::parse(&self)
    }
}

impl IntoKeyPath for &String {
    fn into_key_path(self) -> Result<KeyPath, TreeError> {
        KeyPath::parse(self)
    }
}
