//! The converter contract: one implementation per root object kind.
//!
//! A converter binds a root object, loads whatever related state the
//! translation needs, and deterministically translates it into the desired
//! set of derived objects. It also supplies the reduction strategies used
//! when a desired object ends up with duplicate actual objects.

use async_trait::async_trait;
use thiserror::Error;

use crate::object::{GroupVersionKind, Object, Resource};
use crate::reduction::SharedStrategy;

/// Errors a converter can report.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConverterError {
    /// Reading related state failed; retrying later may succeed.
    #[error("transient failure loading state: {reason}")]
    Transient { reason: String },

    /// The root's spec cannot be translated until it changes.
    #[error("invalid root spec: {reason}")]
    InvalidSpec { reason: String },

    /// An internal invariant was violated.
    #[error("internal converter error: {reason}")]
    Internal { reason: String },

    /// A method was called before [`Converter::set_root_object`].
    #[error("no root object bound to the converter")]
    RootNotSet,
}

impl ConverterError {
    /// Create a transient error.
    pub fn transient(reason: impl Into<String>) -> Self {
        Self::Transient {
            reason: reason.into(),
        }
    }

    /// Create an invalid spec error.
    pub fn invalid_spec(reason: impl Into<String>) -> Self {
        Self::InvalidSpec {
            reason: reason.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(reason: impl Into<String>) -> Self {
        Self::Internal {
            reason: reason.into(),
        }
    }

    /// Whether retrying without a spec change is pointless.
    pub const fn is_terminal(&self) -> bool {
        !matches!(self, Self::Transient { .. })
    }
}

/// Outcome of [`Converter::load_store`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadStatus {
    /// Everything needed for translation is loaded.
    Ready,
    /// A referenced object does not exist yet; nothing to do until it does.
    Pending { reason: String },
}

/// Translates one root object kind into its desired derived objects.
#[async_trait]
pub trait Converter: Send + Sync {
    /// The root object kind this converter handles.
    type Root: Resource + Send + Sync;

    /// Bind the working root. Must be called before any other method.
    fn set_root_object(&mut self, root: Self::Root);

    /// The bound root, if any.
    fn root_object(&self) -> Option<&Self::Root>;

    /// Load related state needed by [`Self::translate`].
    ///
    /// # Errors
    ///
    /// [`ConverterError::Transient`] when reads fail,
    /// [`ConverterError::InvalidSpec`] when the root is structurally invalid.
    async fn load_store(&mut self) -> Result<LoadStatus, ConverterError>;

    /// Compute the desired objects from the loaded state.
    ///
    /// Must be deterministic and free of I/O.
    ///
    /// # Errors
    ///
    /// Only on internal invariant violations.
    fn translate(&mut self) -> Result<(), ConverterError>;

    /// The desired objects, in the order they should be enforced.
    fn get_store(&self) -> Vec<Object>;

    /// Strategies applied, in order, to duplicate candidates.
    fn reduct(&self) -> Vec<SharedStrategy>;

    /// Kinds this converter may have created in the past, swept for stale
    /// objects even when the current store holds none of them.
    fn owned_kinds(&self) -> Vec<GroupVersionKind> {
        Vec::new()
    }
}
