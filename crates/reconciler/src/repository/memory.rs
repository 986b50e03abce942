//! In-memory object repository.
//!
//! Behaves like a strongly consistent API server: registry-validated
//! types, generated names, UIDs, resource versions and merge-patch
//! semantics. Every write is journaled so callers can assert exactly which
//! operations a reconciliation pass performed, and faults can be injected
//! per operation.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use converge_core::{document, merge};
use serde_json::Value;
use tokio::sync::RwLock;
use ulid::Ulid;

use super::{ObjectRepository, RepositoryError, RepositoryResult};
use crate::object::{GroupVersionKind, Object, Resource};
use crate::registry::TypeRegistry;
use crate::selector::LabelSelector;

/// Metadata fields owned by the server; patches never touch them.
const SERVER_MANAGED: &[&[&str]] = &[
    &["apiVersion"],
    &["kind"],
    &["metadata", "name"],
    &["metadata", "generateName"],
    &["metadata", "namespace"],
    &["metadata", "uid"],
    &["metadata", "resourceVersion"],
    &["metadata", "creationTimestamp"],
];

const GENERATED_SUFFIX_LEN: usize = 5;
const GENERATE_NAME_ATTEMPTS: usize = 8;

/// Repository operation, used for fault injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Get,
    List,
    Create,
    Patch,
    Delete,
}

/// A journaled write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOp {
    Created {
        gvk: GroupVersionKind,
        namespace: String,
        name: String,
    },
    Patched {
        gvk: GroupVersionKind,
        namespace: String,
        name: String,
    },
    Deleted {
        gvk: GroupVersionKind,
        namespace: String,
        name: String,
    },
}

impl WriteOp {
    /// Name of the object written.
    pub fn name(&self) -> &str {
        match self {
            Self::Created { name, .. } | Self::Patched { name, .. } | Self::Deleted { name, .. } => {
                name
            }
        }
    }

    /// Whether this write was a create.
    pub const fn is_create(&self) -> bool {
        matches!(self, Self::Created { .. })
    }

    /// Whether this write was a patch.
    pub const fn is_patch(&self) -> bool {
        matches!(self, Self::Patched { .. })
    }

    /// Whether this write was a delete.
    pub const fn is_delete(&self) -> bool {
        matches!(self, Self::Deleted { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct ObjectKey {
    gvk: GroupVersionKind,
    namespace: String,
    name: String,
}

impl ObjectKey {
    fn of(object: &Object, name: &str) -> Self {
        Self {
            gvk: object.gvk(),
            namespace: object.metadata.namespace.clone(),
            name: name.to_string(),
        }
    }

    fn display(&self) -> String {
        if self.namespace.is_empty() {
            self.name.clone()
        } else {
            format!("{}/{}", self.namespace, self.name)
        }
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    objects: BTreeMap<ObjectKey, Object>,
    last_version: u64,
    writes: Vec<WriteOp>,
    faults: Vec<(Operation, RepositoryError)>,
}

impl MemoryState {
    fn take_fault(&mut self, operation: Operation) -> RepositoryResult<()> {
        match self.faults.iter().position(|(op, _)| *op == operation) {
            Some(index) => Err(self.faults.remove(index).1),
            None => Ok(()),
        }
    }

    fn next_version(&mut self) -> String {
        self.last_version = self.last_version.saturating_add(1);
        self.last_version.to_string()
    }
}

/// Repository backed by an in-process map.
#[derive(Debug)]
pub struct InMemoryRepository {
    registry: Arc<TypeRegistry>,
    state: RwLock<MemoryState>,
}

impl InMemoryRepository {
    /// Create an empty repository accepting the types in `registry`.
    pub fn new(registry: Arc<TypeRegistry>) -> Self {
        Self {
            registry,
            state: RwLock::new(MemoryState::default()),
        }
    }

    /// Create an empty repository wrapped in an Arc.
    pub fn new_arc(registry: Arc<TypeRegistry>) -> Arc<Self> {
        Arc::new(Self::new(registry))
    }

    /// The registry this repository validates against.
    pub fn registry(&self) -> &Arc<TypeRegistry> {
        &self.registry
    }

    /// Store `object` as-is, filling in UID and resource version when
    /// missing. Seeding is not journaled.
    ///
    /// # Errors
    ///
    /// Fails for unregistered types and objects without a name.
    pub async fn seed(&self, object: Object) -> RepositoryResult<Object> {
        self.check_registered(&object)?;
        let name = object
            .metadata
            .name
            .clone()
            .ok_or_else(|| RepositoryError::invalid(&object.kind, "seeded objects need a name"))?;

        let mut state = self.state.write().await;
        let mut stored = object;
        if stored.metadata.uid.is_none() {
            stored.metadata.uid = Some(Ulid::new().to_string());
        }
        stored.metadata.resource_version = Some(state.next_version());
        if stored.metadata.creation_timestamp.is_none() {
            stored.metadata.creation_timestamp = Some(Utc::now());
        }
        state
            .objects
            .insert(ObjectKey::of(&stored, &name), stored.clone());
        Ok(stored)
    }

    /// Make the next call of `operation` fail with `error`.
    pub async fn fail_next(&self, operation: Operation, error: RepositoryError) {
        self.state.write().await.faults.push((operation, error));
    }

    /// All writes performed since creation (or the last [`Self::clear_writes`]).
    pub async fn writes(&self) -> Vec<WriteOp> {
        self.state.read().await.writes.clone()
    }

    /// Forget the write journal.
    pub async fn clear_writes(&self) {
        self.state.write().await.writes.clear();
    }

    /// Every stored object, ordered by type, namespace and name.
    pub async fn snapshot(&self) -> Vec<Object> {
        self.state.read().await.objects.values().cloned().collect()
    }

    /// Number of stored objects.
    pub async fn len(&self) -> usize {
        self.state.read().await.objects.len()
    }

    /// Whether nothing is stored.
    pub async fn is_empty(&self) -> bool {
        self.state.read().await.objects.is_empty()
    }

    fn check_registered(&self, object: &Object) -> RepositoryResult<()> {
        let gvk = object.gvk();
        if self.registry.is_registered(&gvk) {
            Ok(())
        } else {
            Err(RepositoryError::UnknownKind { gvk })
        }
    }

    fn require_name(object: &Object) -> RepositoryResult<&str> {
        object
            .metadata
            .name
            .as_deref()
            .ok_or_else(|| RepositoryError::invalid(&object.kind, "metadata.name is required"))
    }
}

fn generated_name(prefix: &str) -> String {
    let entropy = Ulid::new().to_string().to_lowercase();
    let suffix: String = entropy
        .chars()
        .rev()
        .take(GENERATED_SUFFIX_LEN)
        .collect();
    format!("{prefix}{suffix}")
}

fn to_document(object: &Object) -> RepositoryResult<Value> {
    serde_json::to_value(object).map_err(|e| RepositoryError::invalid(&object.kind, e.to_string()))
}

#[async_trait]
impl ObjectRepository for InMemoryRepository {
    async fn get(
        &self,
        gvk: &GroupVersionKind,
        namespace: &str,
        name: &str,
    ) -> RepositoryResult<Object> {
        let mut state = self.state.write().await;
        state.take_fault(Operation::Get)?;

        let key = ObjectKey {
            gvk: gvk.clone(),
            namespace: namespace.to_string(),
            name: name.to_string(),
        };
        state
            .objects
            .get(&key)
            .cloned()
            .ok_or_else(|| RepositoryError::not_found(&gvk.kind, key.display()))
    }

    async fn list(
        &self,
        gvk: &GroupVersionKind,
        namespace: &str,
        selector: &LabelSelector,
    ) -> RepositoryResult<Vec<Object>> {
        let mut state = self.state.write().await;
        state.take_fault(Operation::List)?;

        Ok(state
            .objects
            .iter()
            .filter(|(key, _)| &key.gvk == gvk)
            .filter(|(key, _)| namespace.is_empty() || key.namespace == namespace)
            .filter(|(_, object)| selector.matches(&object.metadata.labels))
            .map(|(_, object)| object.clone())
            .collect())
    }

    async fn create(&self, object: &Object) -> RepositoryResult<Object> {
        self.check_registered(object)?;
        let mut state = self.state.write().await;
        state.take_fault(Operation::Create)?;

        let name = match (&object.metadata.name, &object.metadata.generate_name) {
            (Some(name), _) => {
                let key = ObjectKey::of(object, name);
                if state.objects.contains_key(&key) {
                    return Err(RepositoryError::already_exists(&object.kind, key.display()));
                }
                name.clone()
            }
            (None, Some(prefix)) => (0..GENERATE_NAME_ATTEMPTS)
                .map(|_| generated_name(prefix))
                .find(|candidate| !state.objects.contains_key(&ObjectKey::of(object, candidate)))
                .ok_or_else(|| {
                    RepositoryError::already_exists(&object.kind, format!("{prefix}*"))
                })?,
            (None, None) => {
                return Err(RepositoryError::invalid(
                    &object.kind,
                    "metadata.name or metadata.generateName is required",
                ))
            }
        };

        let mut stored = object.clone();
        stored.metadata.name = Some(name.clone());
        stored.metadata.uid = Some(Ulid::new().to_string());
        stored.metadata.resource_version = Some(state.next_version());
        stored.metadata.creation_timestamp = Some(Utc::now());

        let key = ObjectKey::of(&stored, &name);
        state.writes.push(WriteOp::Created {
            gvk: key.gvk.clone(),
            namespace: key.namespace.clone(),
            name,
        });
        state.objects.insert(key, stored.clone());
        Ok(stored)
    }

    async fn patch(&self, object: &Object, merge_from: &Object) -> RepositoryResult<Object> {
        self.check_registered(object)?;
        let name = Self::require_name(object)?;
        let mut state = self.state.write().await;
        state.take_fault(Operation::Patch)?;

        let key = ObjectKey::of(object, name);
        let current = state
            .objects
            .get(&key)
            .cloned()
            .ok_or_else(|| RepositoryError::not_found(&object.kind, key.display()))?;

        if let Some(expected) = &merge_from.metadata.resource_version {
            if current.metadata.resource_version.as_ref() != Some(expected) {
                return Err(RepositoryError::conflict(
                    &object.kind,
                    key.display(),
                    format!(
                        "resourceVersion {expected} is stale, current is {}",
                        current.metadata.resource_version.as_deref().unwrap_or("unset")
                    ),
                ));
            }
        }

        let Some(mut patch) = merge::diff(&to_document(merge_from)?, &to_document(object)?) else {
            return Ok(current);
        };
        for path in SERVER_MANAGED {
            document::remove_path(&mut patch, path)
                .map_err(|e| RepositoryError::invalid(&object.kind, e.to_string()))?;
        }
        if patch.as_object().is_some_and(serde_json::Map::is_empty) {
            return Ok(current);
        }

        let mut merged = to_document(&current)?;
        merge::apply(&mut merged, &patch);
        let mut stored: Object = serde_json::from_value(merged)
            .map_err(|e| RepositoryError::invalid(&object.kind, e.to_string()))?;
        stored.metadata.resource_version = Some(state.next_version());

        state.writes.push(WriteOp::Patched {
            gvk: key.gvk.clone(),
            namespace: key.namespace.clone(),
            name: key.name.clone(),
        });
        state.objects.insert(key, stored.clone());
        Ok(stored)
    }

    async fn delete(&self, object: &Object) -> RepositoryResult<()> {
        let name = Self::require_name(object)?;
        let mut state = self.state.write().await;
        state.take_fault(Operation::Delete)?;

        let key = ObjectKey::of(object, name);
        let current = state
            .objects
            .get(&key)
            .ok_or_else(|| RepositoryError::not_found(&object.kind, key.display()))?;
        if let Some(uid) = &object.metadata.uid {
            if current.metadata.uid.as_ref() != Some(uid) {
                return Err(RepositoryError::conflict(
                    &object.kind,
                    key.display(),
                    "uid precondition failed",
                ));
            }
        }

        state.objects.remove(&key);
        state.writes.push(WriteOp::Deleted {
            gvk: key.gvk,
            namespace: key.namespace,
            name: key.name,
        });
        Ok(())
    }
}
