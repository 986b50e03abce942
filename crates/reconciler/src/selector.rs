//! Label selectors used to list candidate objects.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use itertools::Itertools;

/// Equality and existence requirements over an object's labels.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelSelector {
    /// Labels that must be present with exactly this value.
    pub match_labels: BTreeMap<String, String>,
    /// Labels that must be present with any value.
    pub exists: BTreeSet<String>,
}

impl LabelSelector {
    /// A selector matching every object.
    pub fn new() -> Self {
        Self::default()
    }

    /// Require `key=value`.
    #[must_use]
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.match_labels.insert(key.into(), value.into());
        self
    }

    /// Require that `key` is set.
    #[must_use]
    pub fn with_exists(mut self, key: impl Into<String>) -> Self {
        self.exists.insert(key.into());
        self
    }

    /// Whether the label set satisfies every requirement.
    pub fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        self.match_labels
            .iter()
            .all(|(key, value)| labels.get(key) == Some(value))
            && self.exists.iter().all(|key| labels.contains_key(key))
    }

    /// Whether the selector has no requirements.
    pub fn is_empty(&self) -> bool {
        self.match_labels.is_empty() && self.exists.is_empty()
    }
}

impl fmt::Display for LabelSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let equals = self
            .match_labels
            .iter()
            .map(|(key, value)| format!("{key}={value}"));
        let exists = self.exists.iter().cloned();
        write!(f, "{}", equals.chain(exists).join(","))
    }
}
