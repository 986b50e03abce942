//! Core error types for structured document access.
//!
//! All errors are explicit and typed - lookups never panic on a shape the
//! caller did not expect.

use thiserror::Error;

/// Error raised while reading or writing a structured document.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    #[error("document path must not be empty")]
    EmptyPath,

    #[error("expected {expected} at '{path}', found {found}")]
    TypeMismatch {
        path: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error("serialization failed: {reason}")]
    Serialization { reason: String },
}

impl Error {
    /// Create a type mismatch error for a dotted path.
    pub fn type_mismatch(
        path: impl Into<String>,
        expected: &'static str,
        found: &'static str,
    ) -> Self {
        Self::TypeMismatch {
            path: path.into(),
            expected,
            found,
        }
    }

    /// Create a serialization error.
    pub fn serialization(reason: impl Into<String>) -> Self {
        Self::Serialization {
            reason: reason.into(),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::serialization(err.to_string())
    }
}
