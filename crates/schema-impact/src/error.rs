//! Error types for schema impact operations.
//!
//! Errors are categorized into two main types:
//!
//! - **`Error`**: Top-level errors that halt operations (database failures, bad configuration)
//! - **`SyncFailure`**: Source-level errors that are collected but don't halt a sync cycle
//!
//! ## Error Philosophy
//!
//! Dependency extraction follows a "best effort" approach:
//! - A single malformed procedure shouldn't prevent analysing the rest
//! - Unresolvable names are data-quality noise, not errors
//! - Only infrastructure failures (database, I/O, configuration) cause early termination

use std::fmt;

use thiserror::Error;

use crate::types::EntityRef;

/// Result type for schema impact operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type for schema impact operations.
///
/// These errors represent infrastructure failures that prevent
/// the operation from completing.
#[derive(Debug, Error)]
pub enum Error {
    /// Database operation failed
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// File system operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid configuration or arguments
    #[error("configuration error: {0}")]
    Config(String),

    /// A document could not be read or written
    #[error("serialization error: {0}")]
    Serialization(String),

    /// A requested entity does not exist
    #[error("not found: {0}")]
    NotFound(String),

    /// Internal invariant violated
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(e: serde_yaml::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

/// Error raised by the SQL dependency extractor.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtractError {
    /// Statement nesting exceeded the parser's recursion limit
    #[error("nesting deeper than {limit} levels near line {line}")]
    NestingTooDeep {
        /// The recursion limit that was hit
        limit: usize,
        /// Line where the limit was hit (1-indexed)
        line: u64,
    },
}

/// Error encountered while extracting dependencies from one definition.
///
/// These errors are collected during a sync cycle but don't halt it.
/// The sync continues with the remaining definitions and reports all
/// failures at the end.
#[derive(Debug, Clone)]
pub struct SyncFailure {
    /// The entity whose definition failed
    pub source: EntityRef,
    /// Category of the error
    pub kind: SyncFailureKind,
    /// Human-readable error message
    pub message: String,
}

impl fmt::Display for SyncFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} ({})", self.source, self.message, self.kind)
    }
}

impl std::error::Error for SyncFailure {}

/// Categorization of sync failures.
///
/// Uses a 4xx/5xx style pattern:
/// - Input problems are issues with the SQL definitions (user can fix)
/// - Internal problems are issues with the extractor itself (we need to fix)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncFailureKind {
    // === Input Problems (analogous to HTTP 4xx) ===
    /// The catalog lists the object but has no definition for it
    MissingDefinition,

    /// The definition nests deeper than the parser allows
    NestingTooDeep,

    // === Internal Problems (analogous to HTTP 5xx) ===
    /// The extractor panicked on this definition
    Panicked,
}

impl fmt::Display for SyncFailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingDefinition => write!(f, "missing definition"),
            Self::NestingTooDeep => write!(f, "nesting too deep"),
            Self::Panicked => write!(f, "extractor panicked"),
        }
    }
}

impl SyncFailureKind {
    /// Returns `true` if this is an input problem (4xx-style).
    #[must_use]
    pub fn is_input_error(&self) -> bool {
        matches!(self, Self::MissingDefinition | Self::NestingTooDeep)
    }

    /// Returns `true` if this is an internal problem (5xx-style).
    #[must_use]
    pub fn is_internal_error(&self) -> bool {
        matches!(self, Self::Panicked)
    }
}

impl SyncFailure {
    /// Create a new sync failure.
    #[must_use]
    pub fn new(source: EntityRef, kind: SyncFailureKind, message: impl Into<String>) -> Self {
        Self {
            source,
            kind,
            message: message.into(),
        }
    }

    /// Create a failure for an object listed without a definition.
    #[must_use]
    pub fn missing_definition(source: EntityRef) -> Self {
        Self::new(
            source,
            SyncFailureKind::MissingDefinition,
            "catalog has no definition for this object",
        )
    }

    /// Create a failure from an extractor error.
    #[must_use]
    pub fn extraction(source: EntityRef, error: &ExtractError) -> Self {
        let kind = match error {
            ExtractError::NestingTooDeep { .. } => SyncFailureKind::NestingTooDeep,
        };
        Self::new(source, kind, error.to_string())
    }

    /// Create a failure for a panic caught while extracting.
    #[must_use]
    pub fn panicked(source: EntityRef, message: impl Into<String>) -> Self {
        Self::new(source, SyncFailureKind::Panicked, message)
    }
}
