//! Error types for lectio.
//!
//! Taxonomy:
//! - Expected failures: bad input, calling a session operation with no session bound
//! - Infrastructure failures: disk I/O, serialization
//! - Corruption: a document exists but cannot be parsed
//!
//! "Not found" is deliberately absent. Missing sessions and metrics are
//! reported through `Option`, since resuming after a crash is the common case.

use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for lectio.
#[derive(Debug, Error)]
pub enum LectioError {
    // ═══════════════════════════════════════════════════════════════════
    // Expected failures
    // ═══════════════════════════════════════════════════════════════════

    #[error("Configuration error: {0}")]
    Config(#[from] super::ConfigError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("No active session: call start() or load() first")]
    NoActiveSession,

    // ═══════════════════════════════════════════════════════════════════
    // Infrastructure failures
    // ═══════════════════════════════════════════════════════════════════

    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Serialization error: {0}")]
    Serialize(#[source] serde_json::Error),

    // ═══════════════════════════════════════════════════════════════════
    // Corruption
    // ═══════════════════════════════════════════════════════════════════

    #[error("Corrupt document {}: {source}", path.display())]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl LectioError {
    /// Create an IO error with context.
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create a corruption error for the document at `path`.
    pub fn corrupt(path: impl Into<PathBuf>, source: serde_json::Error) -> Self {
        Self::Corrupt {
            path: path.into(),
            source,
        }
    }

    /// Whether this error means a document was present but unreadable.
    pub fn is_corruption(&self) -> bool {
        matches!(self, Self::Corrupt { .. })
    }
}

/// Result type alias for lectio.
pub type Result<T> = std::result::Result<T, LectioError>;
