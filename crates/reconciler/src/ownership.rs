//! Ownership indexing of candidate objects.
//!
//! Candidates are split three ways: owned by the root and hash-labelled
//! (eligible for matching), owned but unlabelled (orphans, left alone), and
//! owned by someone else (ignored).

use std::collections::{BTreeMap, HashSet};

use either::Either;
use itertools::Itertools;

use crate::hash::ContentHasher;
use crate::object::{Object, OwnerReference};

/// Owned candidates keyed by their content hash.
#[derive(Debug, Clone, Default)]
pub struct OwnershipIndex {
    by_hash: BTreeMap<String, Vec<Object>>,
    orphans: Vec<Object>,
    foreign: usize,
}

impl OwnershipIndex {
    /// Index `candidates` against `owner`.
    ///
    /// Candidates sharing a hash are ordered by name, then UID.
    pub fn build(
        owner: &OwnerReference,
        candidates: impl IntoIterator<Item = Object>,
        hasher: &ContentHasher,
    ) -> Self {
        let (owned, foreign): (Vec<Object>, Vec<Object>) =
            candidates.into_iter().partition_map(|object| {
                if object.is_owned_by(owner) {
                    Either::Left(object)
                } else {
                    Either::Right(object)
                }
            });

        let mut index = Self {
            foreign: foreign.len(),
            ..Self::default()
        };
        for object in owned {
            match hasher.hash_of(&object).map(str::to_string) {
                Some(hash) => index.by_hash.entry(hash).or_default().push(object),
                None => index.orphans.push(object),
            }
        }
        for objects in index.by_hash.values_mut() {
            objects.sort_by(|a, b| (a.name(), a.uid()).cmp(&(b.name(), b.uid())));
        }
        index
    }

    /// Owned objects carrying `hash`.
    pub fn candidates(&self, hash: &str) -> &[Object] {
        self.by_hash.get(hash).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Every hash with at least one owned object.
    pub fn hashes(&self) -> impl Iterator<Item = &str> {
        self.by_hash.keys().map(String::as_str)
    }

    /// Owned objects that carry no hash label.
    pub fn orphans(&self) -> &[Object] {
        &self.orphans
    }

    /// Number of candidates owned by other roots.
    pub const fn foreign_count(&self) -> usize {
        self.foreign
    }

    /// Number of owned, hash-labelled objects.
    pub fn owned_count(&self) -> usize {
        self.by_hash.values().map(Vec::len).sum()
    }

    /// Owned objects whose hash is not in `desired`.
    pub fn stale<'a>(&'a self, desired: &'a HashSet<String>) -> impl Iterator<Item = &'a Object> {
        self.by_hash
            .iter()
            .filter(|(hash, _)| !desired.contains(*hash))
            .flat_map(|(_, objects)| objects.iter())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_HASH_LABEL;
    use crate::object::{GroupVersionKind, Resource};

    fn owner(uid: &str) -> OwnerReference {
        let mut root = Object::new(&GroupVersionKind::new("example.io", "v1", "Route"), "ns", "root");
        root.metadata.uid = Some(uid.to_string());
        root.owner_reference().unwrap()
    }

    fn child(name: &str, hash: Option<&str>, owned_by: &OwnerReference) -> Object {
        let object = Object::new(&GroupVersionKind::core("v1", "Service"), "ns", name)
            .with_owner(owned_by.clone());
        match hash {
            Some(hash) => object.with_label(DEFAULT_HASH_LABEL, hash),
            None => object,
        }
    }

    fn hasher() -> ContentHasher {
        ContentHasher::new(DEFAULT_HASH_LABEL, 63)
    }

    #[test]
    fn test_partition() {
        let mine = owner("uid-1");
        let theirs = owner("uid-2");
        let index = OwnershipIndex::build(
            &mine,
            vec![
                child("b", Some("h1"), &mine),
                child("a", Some("h1"), &mine),
                child("c", Some("h2"), &mine),
                child("orphan", None, &mine),
                child("foreign", Some("h1"), &theirs),
            ],
            &hasher(),
        );

        let names: Vec<&str> = index.candidates("h1").iter().map(Object::name).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(index.candidates("h2").len(), 1);
        assert!(index.candidates("h3").is_empty());
        assert_eq!(index.orphans().len(), 1);
        assert_eq!(index.foreign_count(), 1);
        assert_eq!(index.owned_count(), 3);
        assert_eq!(index.hashes().collect::<Vec<_>>(), vec!["h1", "h2"]);
    }

    #[test]
    fn test_owner_requires_every_field() {
        let mine = owner("uid-1");
        let mut renamed = mine.clone();
        renamed.name = "other-root".to_string();

        let index = OwnershipIndex::build(&mine, vec![child("a", Some("h1"), &renamed)], &hasher());
        assert_eq!(index.owned_count(), 0);
        assert_eq!(index.foreign_count(), 1);
    }

    #[test]
    fn test_stale() {
        let mine = owner("uid-1");
        let index = OwnershipIndex::build(
            &mine,
            vec![child("a", Some("h1"), &mine), child("b", Some("old"), &mine)],
            &hasher(),
        );
        let desired: HashSet<String> = std::iter::once("h1".to_string()).collect();
        let stale: Vec<&str> = index.stale(&desired).map(Object::name).collect();
        assert_eq!(stale, vec!["b"]);
    }
}
