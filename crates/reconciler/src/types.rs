//! Core types describing what a pass did.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::object::{GroupVersionKind, Object, Resource};

/// Identifies one desired object: type, namespace and content hash.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SlotKey {
    pub gvk: GroupVersionKind,
    pub namespace: String,
    pub hash: String,
}

impl SlotKey {
    /// Slot of a desired object carrying `hash`.
    pub fn of(object: &Object, hash: impl Into<String>) -> Self {
        Self {
            gvk: object.gvk(),
            namespace: object.metadata.namespace.clone(),
            hash: hash.into(),
        }
    }
}

impl fmt::Display for SlotKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.gvk.kind, self.namespace, self.hash)
    }
}

/// Why an object was deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeleteReason {
    /// Rejected while collapsing duplicates of one slot.
    Reduced,
    /// Its hash is no longer desired.
    Stale,
}

/// A write performed by the enforcer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EnforceAction {
    /// The slot had no actual object.
    Created { slot: SlotKey, name: String },
    /// The actual object's spec drifted from the desired one.
    Patched { slot: SlotKey, name: String },
    /// An owned object was deleted.
    Deleted {
        slot: SlotKey,
        name: String,
        reason: DeleteReason,
    },
}

impl EnforceAction {
    /// The slot this action targets.
    pub const fn slot(&self) -> &SlotKey {
        match self {
            Self::Created { slot, .. } | Self::Patched { slot, .. } | Self::Deleted { slot, .. } => {
                slot
            }
        }
    }

    /// Get a description of the action.
    pub fn description(&self) -> String {
        match self {
            Self::Created { slot, name } => format!("create {name} for {slot}"),
            Self::Patched { slot, name } => format!("patch {name} for {slot}"),
            Self::Deleted {
                slot,
                name,
                reason: DeleteReason::Reduced,
            } => format!("delete duplicate {name} of {slot}"),
            Self::Deleted {
                slot,
                name,
                reason: DeleteReason::Stale,
            } => format!("delete stale {name} ({slot})"),
        }
    }
}

/// Result of one enforcement pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnforceResult {
    /// Another pass is needed soon.
    pub requeue: bool,
    /// Writes performed, in order.
    pub actions: Vec<EnforceAction>,
    /// Set when the converter reported nothing to do yet.
    pub pending: Option<String>,
}

impl EnforceResult {
    /// A pass that stopped because related state is not there yet.
    pub fn pending(reason: impl Into<String>) -> Self {
        Self {
            pending: Some(reason.into()),
            ..Self::default()
        }
    }

    /// Whether actual state already matched desired state.
    pub fn is_converged(&self) -> bool {
        !self.requeue && self.actions.is_empty() && self.pending.is_none()
    }

    /// Number of writes performed.
    pub fn writes(&self) -> usize {
        self.actions.len()
    }

    pub(crate) fn record(&mut self, action: EnforceAction) {
        tracing::debug!(action = %action.description(), "Applied action");
        self.actions.push(action);
    }
}
