//! Grammar front-ends: configuration text in, assignment events out.
//!
//! A grammar turns raw text into an ordered stream of [`AssignmentEvent`]s,
//! each carrying a key path, a typed scalar, and the position it came from.
//! The tree builder ([`ConfigTree::from_events`]) consumes that stream, so a
//! new concrete syntax only has to implement [`Grammar`].
//!
//! The bundled syntax is [`CfgxGrammar`]; [`render`] writes a tree back out
//! in the same syntax.

pub mod cfgx;
pub mod render;

use std::fmt;

use thiserror::Error;
use tracing::debug;

use crate::domain::{ConfigTree, KeyPath, TreeError, Value};

pub use cfgx::{CfgxEvents, CfgxGrammar};
pub use render::{render, render_segment, render_value};

/// 1-based line and column (in characters) within the source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SourcePosition {
    pub line: usize,
    pub column: usize,
}

impl fmt::Display for SourcePosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}, column {}", self.line, self.column)
    }
}

/// One `path = value` assignment recognised in the source text.
#[derive(Debug, Clone, PartialEq)]
pub struct AssignmentEvent {
    pub path: KeyPath,
    pub value: Value,
    pub position: SourcePosition,
}

/// What went wrong while recognising the text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyntaxErrorKind {
    #[error("unterminated string")]
    UnterminatedString,
    #[error("invalid escape sequence `{0}`")]
    InvalidEscape(String),
    #[error("duplicate key `{0}`")]
    DuplicateKey(String),
    #[error("`{0}` is not a recognised value")]
    InvalidValue(String),
    #[error("expected `=` after key")]
    MissingEquals,
    #[error("invalid key: {0}")]
    InvalidKey(&'static str),
    #[error("unterminated section header")]
    UnterminatedSection,
    #[error("unexpected trailing characters `{0}`")]
    TrailingCharacters(String),
    #[error("missing value after `=`")]
    EmptyValue,
}

/// Malformed configuration text, with the position of the offending token.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("syntax error at line {line}, column {column}: {kind}")]
pub struct SyntaxError {
    pub line: usize,
    pub column: usize,
    pub kind: SyntaxErrorKind,
}

impl SyntaxError {
    pub fn new(position: SourcePosition, kind: SyntaxErrorKind) -> Self {
        Self {
            line: position.line,
            column: position.column,
            kind,
        }
    }

    pub fn position(&self) -> SourcePosition {
        SourcePosition {
            line: self.line,
            column: self.column,
        }
    }
}

/// Errors from building a tree out of a grammar's event stream.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LoadError {
    /// The text itself is malformed.
    #[error(transparent)]
    Syntax(#[from] SyntaxError),

    /// The text is well-formed but an assignment clashes with an earlier one
    /// structurally (e.g. `a = 1` followed by `a.b = 2`).
    #[error("at {position}: {source}")]
    Tree {
        position: SourcePosition,
        #[source]
        source: TreeError,
    },
}

/// Lazy stream of assignment events produced by a grammar.
pub type EventStream<'a> = Box<dyn Iterator<Item = Result<AssignmentEvent, SyntaxError>> + 'a>;

/// A pluggable concrete syntax.
///
/// Implementations must:
/// - yield events in source order,
/// - report every failure as a [`SyntaxError`] with a precise position,
/// - stop after the first error,
/// - have no side effects; calling `events` again restarts from the top.
pub trait Grammar {
    /// Short identifier, e.g. `"cfgx"`.
    fn name(&self) -> &'static str;

    /// Starts recognising `text`.
    fn events<'a>(&'a self, text: &'a str) -> EventStream<'a>;
}

impl ConfigTree {
    /// Builds a tree from an event stream.  The new tree is at revision 0.
    ///
    /// # Errors
    ///
    /// [`LoadError::Syntax`] for the first syntax error in the stream, or
    /// [`LoadError::Tree`] when an assignment conflicts structurally with an
    /// earlier one.
    pub fn from_events<I>(name: impl Into<String>, events: I) -> Result<ConfigTree, LoadError>
    where
        I: IntoIterator<Item = Result<AssignmentEvent, SyntaxError>>,
    {
        let mut tree = ConfigTree::new(name);
        let mut count = 0usize;
        for event in events {
            let event = event?;
            tree.insert(&event.path, event.value)
                .map_err(|source| LoadError::Tree {
                    position: event.position,
                    source,
                })?;
            count += 1;
        }
        tree.reset_revision();
        debug!(tree = tree.name(), assignments = count, "built tree from events");
        Ok(tree)
    }

    /// Parses `text` with `grammar` into a new tree.
    ///
    /// # Errors
    ///
    /// See [`ConfigTree::from_events`].
    pub fn load(
        name: impl Into<String>,
        grammar: &dyn Grammar,
        text: &str,
    ) -> Result<ConfigTree, LoadError> {
        ConfigTree::from_events(name, grammar.events(text))
    }

    /// Parses cfgx text into a new tree.
    ///
    /// # Errors
    ///
    /// See [`ConfigTree::from_events`].
    ///
    /// # Examples
    ///
    /// ```rust
    /// use configx_core::{ConfigTree, Value};
    ///
    /// let tree = ConfigTree::parse("app", "[server]\nport = 8080\n").unwrap();
    /// assert_eq!(tree.get_value("server.port").unwrap(), &Value::Int(8080));
    /// ```
    pub fn parse(name: impl Into<String>, text: &str) -> Result<ConfigTree, LoadError> {
        ConfigTree::from_events(name, CfgxGrammar.parse_events(text))
    }
}
