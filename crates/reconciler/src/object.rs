//! Object model shared by the repository, the converters and the enforcer.
//!
//! [`Object`] is the loosely-typed representation every derived resource is
//! handled as. Root objects can stay strongly typed: anything implementing
//! [`Resource`] can own derived objects.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Errors raised while converting or inspecting objects.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ObjectError {
    #[error("{kind} is missing metadata.{field}")]
    MissingField { kind: String, field: &'static str },

    #[error("object conversion failed: {reason}")]
    Conversion { reason: String },
}

impl ObjectError {
    /// Create a missing field error.
    pub fn missing_field(kind: impl Into<String>, field: &'static str) -> Self {
        Self::MissingField {
            kind: kind.into(),
            field,
        }
    }
}

impl From<serde_json::Error> for ObjectError {
    fn from(err: serde_json::Error) -> Self {
        Self::Conversion {
            reason: err.to_string(),
        }
    }
}

/// Group, version and kind of a resource type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GroupVersionKind {
    pub group: String,
    pub version: String,
    pub kind: String,
}

impl GroupVersionKind {
    /// Create a GVK.
    pub fn new(group: impl Into<String>, version: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            version: version.into(),
            kind: kind.into(),
        }
    }

    /// Create a GVK in the core (empty) group.
    pub fn core(version: impl Into<String>, kind: impl Into<String>) -> Self {
        Self::new("", version, kind)
    }

    /// Split an `apiVersion` string (`group/version` or bare `version`).
    pub fn from_api_version(api_version: &str, kind: impl Into<String>) -> Self {
        match api_version.split_once('/') {
            Some((group, version)) => Self::new(group, version, kind),
            None => Self::core(api_version, kind),
        }
    }

    /// The `apiVersion` string for this GVK.
    pub fn api_version(&self) -> String {
        if self.group.is_empty() {
            self.version.clone()
        } else {
            format!("{}/{}", self.group, self.version)
        }
    }
}

impl fmt::Display for GroupVersionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}, Kind={}", self.api_version(), self.kind)
    }
}

/// Reference from a derived object to the root object that created it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnerReference {
    pub api_version: String,
    pub kind: String,
    pub name: String,
    pub uid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub controller: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_owner_deletion: Option<bool>,
}

impl OwnerReference {
    /// Whether `self` points at the same owner as `other`.
    ///
    /// UID, kind, name and apiVersion must all be equal; the deletion flags
    /// are not part of the identity.
    pub fn matches(&self, other: &Self) -> bool {
        self.uid == other.uid
            && self.kind == other.kind
            && self.name == other.name
            && self.api_version == other.api_version
    }
}

/// Standard object metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generate_name: Option<String>,
    #[serde(default)]
    pub namespace: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_version: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub owner_references: Vec<OwnerReference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creation_timestamp: Option<DateTime<Utc>>,
}

/// Anything that has type information and metadata.
///
/// Root objects implement this so the enforcer can derive owner references
/// without knowing their concrete type.
pub trait Resource {
    /// The `apiVersion` of this resource.
    fn api_version(&self) -> &str;

    /// The kind of this resource.
    fn kind(&self) -> &str;

    /// The metadata of this resource.
    fn meta(&self) -> &ObjectMeta;

    /// Group, version and kind.
    fn gvk(&self) -> GroupVersionKind {
        GroupVersionKind::from_api_version(self.api_version(), self.kind())
    }

    /// Owner reference pointing at this resource.
    ///
    /// # Errors
    ///
    /// Fails when the resource has no name or no UID, i.e. it was never
    /// persisted.
    fn owner_reference(&self) -> Result<OwnerReference, ObjectError> {
        let meta = self.meta();
        let name = meta
            .name
            .clone()
            .ok_or_else(|| ObjectError::missing_field(self.kind(), "name"))?;
        let uid = meta
            .uid
            .clone()
            .ok_or_else(|| ObjectError::missing_field(self.kind(), "uid"))?;
        Ok(OwnerReference {
            api_version: self.api_version().to_string(),
            kind: self.kind().to_string(),
            name,
            uid,
            controller: Some(true),
            block_owner_deletion: Some(true),
        })
    }

    /// `namespace/name` key for logs and error messages.
    fn display_key(&self) -> String {
        let meta = self.meta();
        let name = meta
            .name
            .as_deref()
            .or(meta.generate_name.as_deref())
            .unwrap_or("<unnamed>");
        if meta.namespace.is_empty() {
            name.to_string()
        } else {
            format!("{}/{}", meta.namespace, name)
        }
    }
}

/// A loosely-typed resource: type information, metadata and free-form
/// `spec`/`status` documents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Object {
    pub api_version: String,
    pub kind: String,
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: Value,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub status: Value,
}

impl Object {
    /// Create an object with a fixed name.
    pub fn new(gvk: &GroupVersionKind, namespace: impl Into<String>, name: impl Into<String>) -> Self {
        let mut object = Self::empty(gvk, namespace);
        object.metadata.name = Some(name.into());
        object
    }

    /// Create an object whose name is generated by the repository from
    /// `prefix`.
    pub fn with_generate_name(
        gvk: &GroupVersionKind,
        namespace: impl Into<String>,
        prefix: impl Into<String>,
    ) -> Self {
        let mut object = Self::empty(gvk, namespace);
        object.metadata.generate_name = Some(prefix.into());
        object
    }

    fn empty(gvk: &GroupVersionKind, namespace: impl Into<String>) -> Self {
        Self {
            api_version: gvk.api_version(),
            kind: gvk.kind.clone(),
            metadata: ObjectMeta {
                namespace: namespace.into(),
                ..ObjectMeta::default()
            },
            spec: Value::Null,
            status: Value::Null,
        }
    }

    /// Set the spec document.
    #[must_use]
    pub fn with_spec(mut self, spec: Value) -> Self {
        self.spec = spec;
        self
    }

    /// Set the status document.
    #[must_use]
    pub fn with_status(mut self, status: Value) -> Self {
        self.status = status;
        self
    }

    /// Add a label.
    #[must_use]
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.labels.insert(key.into(), value.into());
        self
    }

    /// Add an annotation.
    #[must_use]
    pub fn with_annotation(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.annotations.insert(key.into(), value.into());
        self
    }

    /// Add an owner reference.
    #[must_use]
    pub fn with_owner(mut self, owner: OwnerReference) -> Self {
        self.metadata.owner_references.push(owner);
        self
    }

    /// Convert any serde resource into a loosely-typed object.
    ///
    /// # Errors
    ///
    /// Fails when the value does not serialize to an object shape.
    pub fn from_typed<T: Serialize>(value: &T) -> Result<Self, ObjectError> {
        Ok(serde_json::from_value(serde_json::to_value(value)?)?)
    }

    /// Convert this object into a typed resource.
    ///
    /// # Errors
    ///
    /// Fails when the object does not match the shape of `T`.
    pub fn to_typed<T: DeserializeOwned>(&self) -> Result<T, ObjectError> {
        Ok(serde_json::from_value(serde_json::to_value(self)?)?)
    }

    /// The object name, or an empty string before the repository assigned
    /// one.
    pub fn name(&self) -> &str {
        self.metadata.name.as_deref().unwrap_or_default()
    }

    /// The object UID, or an empty string if not yet persisted.
    pub fn uid(&self) -> &str {
        self.metadata.uid.as_deref().unwrap_or_default()
    }

    /// Value of a label.
    pub fn label(&self, key: &str) -> Option<&str> {
        self.metadata.labels.get(key).map(String::as_str)
    }

    /// Whether one of the owner references matches `owner`.
    pub fn is_owned_by(&self, owner: &OwnerReference) -> bool {
        self.metadata
            .owner_references
            .iter()
            .any(|reference| reference.matches(owner))
    }
}

impl Resource for Object {
    fn api_version(&self) -> &str {
        &self.api_version
    }

    fn kind(&self) -> &str {
        &self.kind
    }

    fn meta(&self) -> &ObjectMeta {
        &self.metadata
    }
}
