//! The object repository contract the enforcer reads and writes through.
//!
//! Reads may be served from an eventually-consistent cache. Writes use
//! optimistic concurrency: a patch computed against a stale copy fails with
//! [`RepositoryError::Conflict`] instead of overwriting newer state.

mod error;
mod memory;
mod traced;

use std::sync::Arc;

use async_trait::async_trait;

use crate::object::{GroupVersionKind, Object};
use crate::selector::LabelSelector;

pub use error::RepositoryError;
pub use memory::{InMemoryRepository, Operation, WriteOp};
pub use traced::TracingRepository;

/// Result alias for repository calls.
pub type RepositoryResult<T> = std::result::Result<T, RepositoryError>;

/// Typed access to stored objects.
///
/// Every call is a potentially blocking remote round-trip. Dropping the
/// returned future abandons the call.
#[async_trait]
pub trait ObjectRepository: Send + Sync {
    /// Read one object.
    async fn get(
        &self,
        gvk: &GroupVersionKind,
        namespace: &str,
        name: &str,
    ) -> RepositoryResult<Object>;

    /// List objects of one type in a namespace matching `selector`.
    ///
    /// An empty namespace lists across all namespaces.
    async fn list(
        &self,
        gvk: &GroupVersionKind,
        namespace: &str,
        selector: &LabelSelector,
    ) -> RepositoryResult<Vec<Object>>;

    /// Create an object, returning it as stored (UID, name, resource
    /// version and creation timestamp assigned).
    async fn create(&self, object: &Object) -> RepositoryResult<Object>;

    /// Merge-patch `object` over the stored copy, using `merge_from` as the
    /// base the patch is computed against.
    async fn patch(&self, object: &Object, merge_from: &Object) -> RepositoryResult<Object>;

    /// Delete an object.
    async fn delete(&self, object: &Object) -> RepositoryResult<()>;
}

#[async_trait]
impl<R: ObjectRepository + ?Sized> ObjectRepository for Arc<R> {
    async fn get(
        &self,
        gvk: &GroupVersionKind,
        namespace: &str,
        name: &str,
    ) -> RepositoryResult<Object> {
        (**self).get(gvk, namespace, name).await
    }

    async fn list(
        &self,
        gvk: &GroupVersionKind,
        namespace: &str,
        selector: &LabelSelector,
    ) -> RepositoryResult<Vec<Object>> {
        (**self).list(gvk, namespace, selector).await
    }

    async fn create(&self, object: &Object) -> RepositoryResult<Object> {
        (**self).create(object).await
    }

    async fn patch(&self, object: &Object, merge_from: &Object) -> RepositoryResult<Object> {
        (**self).patch(object, merge_from).await
    }

    async fn delete(&self, object: &Object) -> RepositoryResult<()> {
        (**self).delete(object).await
    }
}
