//! Explicit registry of the resource types a repository accepts.
//!
//! The registry is assembled once through [`TypeRegistryBuilder`] and is
//! immutable afterwards; repositories receive it at construction instead of
//! consulting any process-wide table.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use crate::object::GroupVersionKind;

/// Immutable set of known resource types.
#[derive(Debug, Clone, Default)]
pub struct TypeRegistry {
    kinds: BTreeSet<GroupVersionKind>,
    by_api_version: BTreeMap<(String, String), GroupVersionKind>,
}

impl TypeRegistry {
    /// Start building a registry.
    pub fn builder() -> TypeRegistryBuilder {
        TypeRegistryBuilder::default()
    }

    /// Whether `gvk` was registered.
    pub fn is_registered(&self, gvk: &GroupVersionKind) -> bool {
        self.kinds.contains(gvk)
    }

    /// Look up a registered type by `apiVersion` and kind.
    pub fn resolve(&self, api_version: &str, kind: &str) -> Option<&GroupVersionKind> {
        self.by_api_version
            .get(&(api_version.to_string(), kind.to_string()))
    }

    /// Iterate over registered types in a stable order.
    pub fn kinds(&self) -> impl Iterator<Item = &GroupVersionKind> {
        self.kinds.iter()
    }

    /// Number of registered types.
    pub fn len(&self) -> usize {
        self.kinds.len()
    }

    /// Whether no type was registered.
    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }
}

/// Builder for [`TypeRegistry`].
#[derive(Debug, Default)]
pub struct TypeRegistryBuilder {
    kinds: BTreeSet<GroupVersionKind>,
}

impl TypeRegistryBuilder {
    /// Register a resource type.
    #[must_use]
    pub fn register(mut self, gvk: GroupVersionKind) -> Self {
        self.kinds.insert(gvk);
        self
    }

    /// Register several resource types.
    #[must_use]
    pub fn register_all(mut self, gvks: impl IntoIterator<Item = GroupVersionKind>) -> Self {
        self.kinds.extend(gvks);
        self
    }

    /// Freeze the registry.
    pub fn build(self) -> Arc<TypeRegistry> {
        let by_api_version = self
            .kinds
            .iter()
            .map(|gvk| ((gvk.api_version(), gvk.kind.clone()), gvk.clone()))
            .collect();
        Arc::new(TypeRegistry {
            kinds: self.kinds,
            by_api_version,
        })
    }
}
