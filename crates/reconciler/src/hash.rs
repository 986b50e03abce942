//! Content-hash labeling of desired objects.
//!
//! The hash label, not the object name, is the key that matches a desired
//! object to its actual counterpart. It is derived only from fields that
//! describe desired behavior; server-managed metadata, owner references
//! and status never contribute.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::config::{EnforcerConfig, MAX_LABEL_VALUE_LEN, MIN_HASH_LEN};
use crate::object::{Object, ObjectError};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct FingerprintInput<'a> {
    api_version: &'a str,
    kind: &'a str,
    namespace: &'a str,
    name: Option<&'a str>,
    generate_name: Option<&'a str>,
    labels: BTreeMap<&'a str, &'a str>,
    annotations: BTreeMap<&'a str, &'a str>,
    spec: Value,
}

/// Computes and stamps content-hash labels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentHasher {
    label_key: String,
    length: usize,
}

impl ContentHasher {
    /// Create a hasher writing `length` hex digits under `label_key`.
    ///
    /// The length is clamped to what a label value can hold.
    pub fn new(label_key: impl Into<String>, length: usize) -> Self {
        Self {
            label_key: label_key.into(),
            length: length.clamp(MIN_HASH_LEN, MAX_LABEL_VALUE_LEN),
        }
    }

    /// Create a hasher from enforcer configuration.
    pub fn from_config(config: &EnforcerConfig) -> Self {
        Self::new(config.hash_label_key.clone(), config.hash_length)
    }

    /// The label key hashes are stored under.
    pub fn label_key(&self) -> &str {
        &self.label_key
    }

    /// Compute the fingerprint of `object`.
    ///
    /// # Errors
    ///
    /// Fails only if the object cannot be serialized.
    pub fn fingerprint(&self, object: &Object) -> Result<String, ObjectError> {
        let meta = &object.metadata;
        let input = FingerprintInput {
            api_version: &object.api_version,
            kind: &object.kind,
            namespace: &meta.namespace,
            name: meta.name.as_deref(),
            generate_name: meta.generate_name.as_deref(),
            labels: meta
                .labels
                .iter()
                .filter(|(key, _)| **key != self.label_key)
                .map(|(key, value)| (key.as_str(), value.as_str()))
                .collect(),
            annotations: meta
                .annotations
                .iter()
                .map(|(key, value)| (key.as_str(), value.as_str()))
                .collect(),
            spec: canonicalize(&object.spec),
        };

        let bytes = serde_json::to_vec(&input)?;
        let digest = Sha256::digest(&bytes);
        let mut hex = hex_encode(&digest);
        hex.truncate(self.length);
        Ok(hex)
    }

    /// Return a copy of `object` carrying its content-hash label.
    ///
    /// # Errors
    ///
    /// See [`Self::fingerprint`].
    pub fn label(&self, object: &Object) -> Result<Object, ObjectError> {
        let hash = self.fingerprint(object)?;
        let mut labeled = object.clone();
        labeled.metadata.labels.insert(self.label_key.clone(), hash);
        Ok(labeled)
    }

    /// The hash label carried by `object`, if any.
    pub fn hash_of<'a>(&self, object: &'a Object) -> Option<&'a str> {
        object.label(&self.label_key).filter(|hash| !hash.is_empty())
    }
}

/// Rebuild `value` with object keys in sorted order, whatever map ordering
/// `serde_json` was compiled with.
fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|(a, _), (b, _)| a.cmp(b));
            Value::Object(
                entries
                    .into_iter()
                    .map(|(key, nested)| (key.clone(), canonicalize(nested)))
                    .collect::<Map<String, Value>>(),
            )
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

/// Lowercase, zero-padded hex.
fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|byte| format!("{byte:02x}")).collect()
}
