//! Error types for cdr-validate
//!
//! Content problems found while validating a document are not Rust errors:
//! they are recorded as [`ValidationError`](crate::validators::ValidationError)
//! entries on a [`ValidationControl`](crate::validators::ValidationControl).
//! The [`Error`] type defined here is reserved for outcomes that stop a run:
//! a document that cannot be parsed, a broken schema or link configuration,
//! and failures of the storage collaborator.

use std::fmt;
use thiserror::Error;

/// Result type alias using the crate [`Error`]
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for cdr-validate operations
#[derive(Error, Debug)]
pub enum Error {
    /// Schema or link configuration is broken (duplicate type, unknown base,
    /// unknown custom rule, wrong root element for a schema, ...)
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Markup could not be turned into a tree
    #[error("malformed document: {0}")]
    Malformed(#[from] ParseError),

    /// Database failure reported by the link store
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Any other collaborator failure
    #[error("infrastructure error: {0}")]
    Infrastructure(String),

    /// Limit exceeded error
    #[error("limit exceeded: {0}")]
    LimitExceeded(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialisation error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Shorthand for a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Error::Configuration(message.into())
    }

    /// True for failures that signal a misconfigured system rather than bad
    /// document content
    pub fn is_configuration(&self) -> bool {
        matches!(self, Error::Configuration(_))
    }

    /// True for failures of the storage collaborator
    pub fn is_infrastructure(&self) -> bool {
        matches!(self, Error::Database(_) | Error::Infrastructure(_) | Error::Io(_))
    }
}

/// Error raised while building a document tree from markup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    /// Error message
    pub message: String,
    /// Byte offset in the source where the error was detected
    pub position: Option<usize>,
}

impl ParseError {
    /// Create a new parse error
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            position: None,
        }
    }

    /// Set the byte position of the error
    pub fn with_position(mut self, position: usize) -> Self {
        self.position = Some(position);
        self
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)?;

        if let Some(position) = self.position {
            write!(f, " at position {}", position)?;
        }

        Ok(())
    }
}

impl std::error::Error for ParseError {}
