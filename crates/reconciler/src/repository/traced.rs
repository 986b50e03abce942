//! A repository wrapper that traces every call.

use async_trait::async_trait;

use super::{ObjectRepository, RepositoryResult};
use crate::object::{GroupVersionKind, Object, Resource};
use crate::selector::LabelSelector;

/// Wraps a repository and emits a `tracing` event per call.
#[derive(Debug, Clone)]
pub struct TracingRepository<R: ObjectRepository> {
    inner: R,
}

impl<R: ObjectRepository> TracingRepository<R> {
    /// Wrap `inner`.
    pub const fn new(inner: R) -> Self {
        Self { inner }
    }

    /// The wrapped repository.
    pub const fn inner(&self) -> &R {
        &self.inner
    }
}

#[async_trait]
impl<R: ObjectRepository> ObjectRepository for TracingRepository<R> {
    async fn get(
        &self,
        gvk: &GroupVersionKind,
        namespace: &str,
        name: &str,
    ) -> RepositoryResult<Object> {
        tracing::debug!(%gvk, namespace, name, "Getting object");
        self.inner.get(gvk, namespace, name).await
    }

    async fn list(
        &self,
        gvk: &GroupVersionKind,
        namespace: &str,
        selector: &LabelSelector,
    ) -> RepositoryResult<Vec<Object>> {
        tracing::debug!(%gvk, namespace, %selector, "Listing objects");
        let result = self.inner.list(gvk, namespace, selector).await;
        if let Ok(ref objects) = result {
            tracing::trace!(count = objects.len(), "Objects listed");
        }
        result
    }

    async fn create(&self, object: &Object) -> RepositoryResult<Object> {
        tracing::debug!(kind = %object.kind, key = %object.display_key(), "Creating object");
        let result = self.inner.create(object).await;
        if let Ok(ref stored) = result {
            tracing::trace!(key = %stored.display_key(), uid = stored.uid(), "Object created");
        }
        result
    }

    async fn patch(&self, object: &Object, merge_from: &Object) -> RepositoryResult<Object> {
        tracing::debug!(
            kind = %object.kind,
            key = %object.display_key(),
            base_version = ?merge_from.metadata.resource_version,
            "Patching object"
        );
        self.inner.patch(object, merge_from).await
    }

    async fn delete(&self, object: &Object) -> RepositoryResult<()> {
        tracing::debug!(kind = %object.kind, key = %object.display_key(), "Deleting object");
        self.inner.delete(object).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::registry::TypeRegistry;
    use crate::repository::InMemoryRepository;

    #[tokio::test]
    async fn test_tracing_repository_delegates() {
        let gvk = GroupVersionKind::core("v1", "ConfigMap");
        let registry = TypeRegistry::builder().register(gvk.clone()).build();
        let repo = TracingRepository::new(InMemoryRepository::new(registry));

        let created = repo
            .create(&Object::new(&gvk, "default", "settings"))
            .await
            .unwrap();
        let fetched = repo.get(&gvk, "default", "settings").await.unwrap();
        assert_eq!(created, fetched);
        assert_eq!(repo.inner().writes().await.len(), 1);
    }
}
