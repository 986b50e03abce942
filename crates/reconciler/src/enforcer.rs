//! State enforcer implementation.
//!
//! One pass converges the actual objects owned by a root toward the desired
//! store its converter produced:
//!
//! 1. every desired object is matched to owned objects by content hash
//! 2. no match: create it and ask for a requeue
//! 3. one match: merge-patch it if its spec drifted
//! 4. several matches: reduce, delete the rejects and report a conflict
//! 5. owned objects whose hash is no longer desired are pruned
//!
//! The pass stops at the first failure. Everything is recomputed from the
//! repository on the next pass, so a retried pass only redoes what is left.

use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};

use itertools::Itertools;
use tracing::{debug, info, warn};

use crate::config::EnforcerConfig;
use crate::converter::{Converter, ConverterError, LoadStatus};
use crate::error::{Error, Result};
use crate::hash::ContentHasher;
use crate::object::{GroupVersionKind, Object, OwnerReference, Resource};
use crate::ownership::OwnershipIndex;
use crate::reduction::{reduce, SharedStrategy};
use crate::repository::{ObjectRepository, RepositoryError};
use crate::selector::LabelSelector;
use crate::types::{DeleteReason, EnforceAction, EnforceResult, SlotKey};

type Scope = (GroupVersionKind, String);

/// A desired object ready for enforcement.
#[derive(Debug, Clone)]
struct Desired {
    slot: SlotKey,
    object: Object,
}

/// State carried through one pass.
#[derive(Debug, Default)]
struct Pass {
    indexes: HashMap<Scope, OwnershipIndex>,
    result: EnforceResult,
}

/// Converges owned objects toward a converter's desired store.
pub struct StateEnforcer<R: ObjectRepository> {
    /// Repository all reads and writes go through.
    repository: R,
    /// Configuration.
    config: EnforcerConfig,
    /// Hash labeler derived from the configuration.
    hasher: ContentHasher,
}

impl<R: ObjectRepository> StateEnforcer<R> {
    /// Create a new enforcer.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] when `config` does not validate.
    pub fn new(repository: R, config: EnforcerConfig) -> Result<Self> {
        config.validate()?;
        let hasher = ContentHasher::from_config(&config);
        Ok(Self {
            repository,
            config,
            hasher,
        })
    }

    /// Create an enforcer with the default configuration.
    pub fn with_defaults(repository: R) -> Self {
        let config = EnforcerConfig::default();
        let hasher = ContentHasher::from_config(&config);
        Self {
            repository,
            config,
            hasher,
        }
    }

    /// Get the repository.
    pub const fn repository(&self) -> &R {
        &self.repository
    }

    /// Get the configuration.
    pub const fn config(&self) -> &EnforcerConfig {
        &self.config
    }

    /// Get the hash labeler.
    pub const fn hasher(&self) -> &ContentHasher {
        &self.hasher
    }

    /// Full reconciliation for one root: bind, load, translate, enforce.
    ///
    /// # Errors
    ///
    /// Converter failures are returned as [`Error::Converter`]; see
    /// [`Self::enforce_state`] for the rest.
    #[tracing::instrument(skip_all, fields(root = %root.display_key()))]
    pub async fn reconcile<C: Converter>(&self, converter: &mut C, root: C::Root) -> Result<EnforceResult> {
        converter.set_root_object(root);

        if let LoadStatus::Pending { reason } = converter.load_store().await? {
            info!(%reason, "Related state not available yet, nothing to do");
            return Ok(EnforceResult::pending(reason));
        }

        converter.translate()?;
        self.enforce_state(converter).await
    }

    /// Converge actual state toward `converter`'s current desired store.
    ///
    /// Returns whether another pass is needed. Several owned objects for
    /// one desired object are reduced, and the pass then fails with
    /// [`Error::MultipleCandidates`] (which requests a requeue).
    ///
    /// # Errors
    ///
    /// Repository errors are returned unchanged, except optimistic
    /// concurrency conflicts on patch, which only request a requeue.
    #[tracing::instrument(skip_all, fields(root = tracing::field::Empty))]
    pub async fn enforce_state<C: Converter>(&self, converter: &C) -> Result<EnforceResult> {
        let root = converter.root_object().ok_or(ConverterError::RootNotSet)?;
        tracing::Span::current().record("root", root.display_key().as_str());
        let owner = root.owner_reference().map_err(Error::InvalidRoot)?;
        let root_namespace = root.meta().namespace.clone();

        let desired = self.prepare_store(converter.get_store(), &owner, &root_namespace)?;
        let strategies = converter.reduct();

        info!(desired = desired.len(), "Starting enforcement pass");

        let mut pass = Pass::default();
        let mut seen = HashSet::new();
        for item in &desired {
            if !seen.insert(&item.slot) {
                debug!(slot = %item.slot, "Desired object shares its slot with an earlier one, skipping");
                continue;
            }
            self.enforce_slot(&owner, item, &strategies, &mut pass)
                .await?;
        }

        if self.config.prune_stale {
            self.prune_stale(&owner, &root_namespace, &desired, converter.owned_kinds(), &mut pass)
                .await?;
        }

        let result = pass.result;
        if result.is_converged() {
            info!("Owned objects converged");
        } else {
            info!(
                writes = result.writes(),
                requeue = result.requeue,
                "Enforcement pass complete"
            );
        }
        Ok(result)
    }

    /// Default namespaces, stamp labels and owner reference, and pair each
    /// desired object with its slot.
    fn prepare_store(
        &self,
        store: Vec<Object>,
        owner: &OwnerReference,
        root_namespace: &str,
    ) -> Result<Vec<Desired>> {
        store
            .into_iter()
            .map(|mut object| -> Result<Desired> {
                if object.metadata.namespace.is_empty() {
                    object.metadata.namespace = root_namespace.to_string();
                }
                if let Some((key, value)) = &self.config.managed_by_label {
                    object
                        .metadata
                        .labels
                        .entry(key.clone())
                        .or_insert_with(|| value.clone());
                }
                if self.hasher.hash_of(&object).is_none() {
                    object = self
                        .hasher
                        .label(&object)
                        .map_err(|e| Error::invalid_desired(object.display_key(), e.to_string()))?;
                }
                if !object.is_owned_by(owner) {
                    object.metadata.owner_references.push(owner.clone());
                }

                let hash = self
                    .hasher
                    .hash_of(&object)
                    .map(str::to_string)
                    .ok_or_else(|| Error::invalid_desired(object.display_key(), "missing hash label"))?;
                Ok(Desired {
                    slot: SlotKey::of(&object, hash),
                    object,
                })
            })
            .collect()
    }

    /// Owned objects in `scope`, listed once per pass.
    async fn index_for<'p>(
        &self,
        owner: &OwnerReference,
        scope: Scope,
        indexes: &'p mut HashMap<Scope, OwnershipIndex>,
    ) -> Result<&'p OwnershipIndex> {
        match indexes.entry(scope) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                let (gvk, namespace) = entry.key();
                let selector = LabelSelector::new().with_exists(self.hasher.label_key());
                let listed = self.repository.list(gvk, namespace, &selector).await?;
                let index = OwnershipIndex::build(owner, listed, &self.hasher);
                if !index.orphans().is_empty() {
                    debug!(
                        kind = %gvk.kind,
                        namespace = %namespace,
                        orphans = index.orphans().len(),
                        "Ignoring owned objects without a content hash"
                    );
                }
                Ok(entry.insert(index))
            }
        }
    }

    async fn enforce_slot(
        &self,
        owner: &OwnerReference,
        desired: &Desired,
        strategies: &[SharedStrategy],
        pass: &mut Pass,
    ) -> Result<()> {
        let scope = (desired.slot.gvk.clone(), desired.slot.namespace.clone());
        let candidates = self
            .index_for(owner, scope, &mut pass.indexes)
            .await?
            .candidates(&desired.slot.hash)
            .to_vec();

        match candidates.as_slice() {
            [] => self.create(desired, &mut pass.result).await,
            [actual] => self.patch_if_drifted(desired, actual, &mut pass.result).await,
            _ => self.resolve_duplicates(desired, &candidates, strategies, &mut pass.result).await,
        }
    }

    async fn create(&self, desired: &Desired, result: &mut EnforceResult) -> Result<()> {
        // Downstream effects of a fresh object are not visible yet.
        result.requeue = true;

        match self.repository.create(&desired.object).await {
            Ok(stored) => {
                result.record(EnforceAction::Created {
                    slot: desired.slot.clone(),
                    name: stored.name().to_string(),
                });
                Ok(())
            }
            Err(err) if err.is_already_exists() => {
                warn!(slot = %desired.slot, error = %err, "Lost a create race, will re-list");
                Ok(())
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn patch_if_drifted(
        &self,
        desired: &Desired,
        actual: &Object,
        result: &mut EnforceResult,
    ) -> Result<()> {
        if desired.object.spec == actual.spec {
            debug!(slot = %desired.slot, name = actual.name(), "Spec up to date");
            return Ok(());
        }

        let mut updated = actual.clone();
        updated.spec = desired.object.spec.clone();
        updated.metadata.labels.extend(
            desired
                .object
                .metadata
                .labels
                .iter()
                .map(|(k, v)| (k.clone(), v.clone())),
        );
        updated.metadata.annotations.extend(
            desired
                .object
                .metadata
                .annotations
                .iter()
                .map(|(k, v)| (k.clone(), v.clone())),
        );

        match self.repository.patch(&updated, actual).await {
            Ok(_) => {
                result.record(EnforceAction::Patched {
                    slot: desired.slot.clone(),
                    name: actual.name().to_string(),
                });
                Ok(())
            }
            Err(err) if err.is_conflict() || err.is_not_found() => {
                warn!(slot = %desired.slot, error = %err, "Patch raced with another writer, requeueing");
                result.requeue = true;
                Ok(())
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn resolve_duplicates(
        &self,
        desired: &Desired,
        candidates: &[Object],
        strategies: &[SharedStrategy],
        result: &mut EnforceResult,
    ) -> Result<()> {
        let reduction = reduce(candidates, strategies);
        warn!(
            slot = %desired.slot,
            candidates = candidates.len(),
            rejected = reduction.rejected.len(),
            decided_by = ?reduction.decided_by,
            "Several owned objects match one desired object, reducing"
        );

        for rejected in &reduction.rejected {
            self.delete(&desired.slot, rejected, DeleteReason::Reduced, result)
                .await?;
        }

        Err(Error::MultipleCandidates {
            slot: desired.slot.to_string(),
            count: candidates.len(),
            kept: reduction
                .kept
                .first()
                .map(|object| object.name().to_string())
                .unwrap_or_default(),
            rejected: reduction
                .rejected
                .iter()
                .map(|object| object.name().to_string())
                .collect(),
            applied: std::mem::take(&mut result.actions),
        })
    }

    async fn prune_stale(
        &self,
        owner: &OwnerReference,
        root_namespace: &str,
        desired: &[Desired],
        owned_kinds: Vec<GroupVersionKind>,
        pass: &mut Pass,
    ) -> Result<()> {
        let desired_hashes: HashSet<String> = desired.iter().map(|d| d.slot.hash.clone()).collect();
        let scopes: Vec<Scope> = desired
            .iter()
            .map(|d| (d.slot.gvk.clone(), d.slot.namespace.clone()))
            .chain(
                owned_kinds
                    .into_iter()
                    .map(|gvk| (gvk, root_namespace.to_string())),
            )
            .unique()
            .collect();

        for scope in scopes {
            let stale: Vec<Object> = self
                .index_for(owner, scope, &mut pass.indexes)
                .await?
                .stale(&desired_hashes)
                .cloned()
                .collect();

            for object in &stale {
                let hash = self.hasher.hash_of(object).unwrap_or_default();
                let slot = SlotKey::of(object, hash);
                info!(slot = %slot, name = object.name(), "Pruning object no longer desired");
                self.delete(&slot, object, DeleteReason::Stale, &mut pass.result)
                    .await?;
            }
        }
        Ok(())
    }

    async fn delete(
        &self,
        slot: &SlotKey,
        object: &Object,
        reason: DeleteReason,
        result: &mut EnforceResult,
    ) -> Result<()> {
        match self.repository.delete(object).await {
            Ok(()) => {}
            Err(RepositoryError::NotFound { .. }) => {
                debug!(slot = %slot, name = object.name(), "Already deleted");
            }
            Err(err) => return Err(err.into()),
        }
        result.record(EnforceAction::Deleted {
            slot: slot.clone(),
            name: object.name().to_string(),
            reason,
        });
        Ok(())
    }
}
