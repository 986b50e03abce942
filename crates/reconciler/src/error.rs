//! Error types for the reconciler crate.

use thiserror::Error;

use crate::converter::ConverterError;
use crate::object::ObjectError;
use crate::repository::RepositoryError;
use crate::types::EnforceAction;

/// Result type alias for reconciler operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Reconciler error types.
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// A repository call failed; the underlying error is kept as-is.
    #[error(transparent)]
    Repository(#[from] RepositoryError),

    /// The converter could not produce a desired store.
    #[error(transparent)]
    Converter(#[from] ConverterError),

    /// The root object cannot own anything (never persisted, no name).
    #[error("invalid root object: {0}")]
    InvalidRoot(ObjectError),

    /// A desired object could not be prepared for enforcement.
    #[error("invalid desired object {slot}: {reason}")]
    InvalidDesired { slot: String, reason: String },

    /// Several owned objects matched one desired object; the rejected ones
    /// were deleted and another pass is needed. `applied` holds every write
    /// the pass performed before stopping, the deletions included.
    #[error(
        "{count} owned objects matched {slot}; kept '{kept}', deleted [{}]",
        .rejected.join(", ")
    )]
    MultipleCandidates {
        slot: String,
        count: usize,
        kept: String,
        rejected: Vec<String>,
        applied: Vec<EnforceAction>,
    },

    /// Invalid configuration.
    #[error("invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    /// The retry driver gave up.
    #[error("not converged after {passes} passes")]
    NotConverged {
        passes: u32,
        last_error: Option<Box<Error>>,
    },
}

impl Error {
    /// Create an invalid desired object error.
    pub fn invalid_desired(slot: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidDesired {
            slot: slot.into(),
            reason: reason.into(),
        }
    }

    /// Create an invalid config error.
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }

    /// Whether retrying without an external change is pointless.
    ///
    /// Terminal errors should surface as a status condition on the root
    /// instead of being retried.
    pub const fn is_terminal(&self) -> bool {
        match self {
            Self::Repository(err) => matches!(
                err,
                RepositoryError::Invalid { .. } | RepositoryError::UnknownKind { .. }
            ),
            Self::Converter(err) => err.is_terminal(),
            Self::InvalidRoot(_)
            | Self::InvalidDesired { .. }
            | Self::InvalidConfig { .. }
            | Self::NotConverged { .. } => true,
            Self::MultipleCandidates { .. } => false,
        }
    }

    /// Writes already performed by the pass that failed with this error.
    pub fn applied_actions(&self) -> &[EnforceAction] {
        match self {
            Self::MultipleCandidates { applied, .. } => applied.as_slice(),
            _ => &[],
        }
    }

    /// Whether the caller should run another pass (with backoff).
    pub const fn requeue(&self) -> bool {
        !self.is_terminal()
    }
}
