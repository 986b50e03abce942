//! Shared fixtures for integration tests.
//!
//! `Route` is a typed root object: it exposes a set of hostnames in front of
//! a `Backend`. `RouteConverter` translates it into one `Listener` per
//! hostname, named by the repository.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use converge_core::document;
use converge_reconciler::{
    ContentHasher, Converter, ConverterError, EnforcerConfig, GroupVersionKind, InMemoryRepository,
    KeepProgrammed, KeepYoungest, LabelSelector, LoadStatus, Object, ObjectMeta, ObjectRepository,
    RepositoryResult, Resource, SharedStrategy, StateEnforcer, TypeRegistry,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::Barrier;

pub const NAMESPACE: &str = "edge";
pub const ROUTE_LABEL: &str = "example.io/route";

/// Install a test subscriber once; `RUST_LOG` controls verbosity.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn route_gvk() -> GroupVersionKind {
    GroupVersionKind::new("example.io", "v1", "Route")
}

pub fn backend_gvk() -> GroupVersionKind {
    GroupVersionKind::new("example.io", "v1", "Backend")
}

pub fn listener_gvk() -> GroupVersionKind {
    GroupVersionKind::new("example.io", "v1", "Listener")
}

pub fn registry() -> Arc<TypeRegistry> {
    TypeRegistry::builder()
        .register_all([route_gvk(), backend_gvk(), listener_gvk()])
        .build()
}

pub fn repository() -> Arc<InMemoryRepository> {
    InMemoryRepository::new_arc(registry())
}

pub fn enforcer(repository: Arc<InMemoryRepository>) -> StateEnforcer<Arc<InMemoryRepository>> {
    StateEnforcer::with_defaults(repository)
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteSpec {
    pub hostnames: Vec<String>,
    pub backend_ref: String,
    pub port: u16,
}

/// Typed root object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Route {
    pub api_version: String,
    pub kind: String,
    pub metadata: ObjectMeta,
    pub spec: RouteSpec,
}

impl Route {
    pub fn new(name: &str, hostnames: &[&str]) -> Self {
        let gvk = route_gvk();
        Self {
            api_version: gvk.api_version(),
            kind: gvk.kind,
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: NAMESPACE.to_string(),
                uid: Some(format!("{name}-uid")),
                ..ObjectMeta::default()
            },
            spec: RouteSpec {
                hostnames: hostnames.iter().map(ToString::to_string).collect(),
                backend_ref: "api".to_string(),
                port: 8080,
            },
        }
    }

    pub fn with_hostnames(mut self, hostnames: &[&str]) -> Self {
        self.spec.hostnames = hostnames.iter().map(ToString::to_string).collect();
        self
    }
}

impl Resource for Route {
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

/// Translates a [`Route`] into listeners.
pub struct RouteConverter<R: ObjectRepository> {
    repository: R,
    hasher: ContentHasher,
    root: Option<Route>,
    address: Option<String>,
    store: Vec<Object>,
    strategies: Option<Vec<SharedStrategy>>,
}

impl<R: ObjectRepository> RouteConverter<R> {
    pub fn new(repository: R) -> Self {
        Self {
            repository,
            hasher: ContentHasher::from_config(&EnforcerConfig::default()),
            root: None,
            address: None,
            store: Vec::new(),
            strategies: None,
        }
    }

    /// Replace the default `[KeepProgrammed, KeepYoungest]` ordering.
    pub fn with_strategies(mut self, strategies: Vec<SharedStrategy>) -> Self {
        self.strategies = Some(strategies);
        self
    }
}

#[async_trait]
impl<R: ObjectRepository> Converter for RouteConverter<R> {
    type Root = Route;

    fn set_root_object(&mut self, root: Route) {
        self.root = Some(root);
        self.address = None;
        self.store.clear();
    }

    fn root_object(&self) -> Option<&Route> {
        self.root.as_ref()
    }

    async fn load_store(&mut self) -> Result<LoadStatus, ConverterError> {
        let root = self.root.as_ref().ok_or(ConverterError::RootNotSet)?;
        if root.spec.backend_ref.is_empty() {
            return Err(ConverterError::invalid_spec("backendRef must not be empty"));
        }

        let backend = match self
            .repository
            .get(&backend_gvk(), &root.metadata.namespace, &root.spec.backend_ref)
            .await
        {
            Ok(backend) => backend,
            Err(err) if err.is_not_found() => {
                return Ok(LoadStatus::Pending {
                    reason: format!("backend {} not found", root.spec.backend_ref),
                });
            }
            Err(err) => return Err(ConverterError::transient(err.to_string())),
        };

        let address = document::get_str(&backend.spec, &["address"])
            .map_err(|e| ConverterError::invalid_spec(e.to_string()))?
            .ok_or_else(|| ConverterError::invalid_spec("backend has no address"))?;
        self.address = Some(address.to_string());
        Ok(LoadStatus::Ready)
    }

    fn translate(&mut self) -> Result<(), ConverterError> {
        let root = self.root.as_ref().ok_or(ConverterError::RootNotSet)?;
        let address = self
            .address
            .as_deref()
            .ok_or_else(|| ConverterError::internal("translate called before load_store"))?;
        let name = root.metadata.name.as_deref().unwrap_or_default();

        self.store = root
            .spec
            .hostnames
            .iter()
            .map(|hostname| {
                let listener = Object::with_generate_name(
                    &listener_gvk(),
                    &root.metadata.namespace,
                    format!("{name}-"),
                )
                .with_label(ROUTE_LABEL, name)
                .with_spec(json!({
                    "hostname": hostname,
                    "upstream": format!("{address}:{}", root.spec.port),
                }));
                self.hasher
                    .label(&listener)
                    .map_err(|e| ConverterError::internal(e.to_string()))
            })
            .collect::<Result<_, _>>()?;
        Ok(())
    }

    fn get_store(&self) -> Vec<Object> {
        self.store.clone()
    }

    fn reduct(&self) -> Vec<SharedStrategy> {
        self.strategies
            .clone()
            .unwrap_or_else(|| vec![Arc::new(KeepProgrammed::default()), Arc::new(KeepYoungest)])
    }

    fn owned_kinds(&self) -> Vec<GroupVersionKind> {
        vec![listener_gvk()]
    }
}

/// Seed the backend every route points at.
pub async fn seed_backend(repository: &InMemoryRepository) {
    let backend = Object::new(&backend_gvk(), NAMESPACE, "api").with_spec(json!({"address": "10.0.0.7"}));
    let _ = repository.seed(backend).await;
}

/// Desired listeners for `route`, exactly as the converter produces them.
pub async fn desired_listeners(repository: Arc<InMemoryRepository>, route: &Route) -> Vec<Object> {
    let mut converter = RouteConverter::new(repository);
    converter.set_root_object(route.clone());
    let _ = converter.load_store().await;
    let _ = converter.translate();
    converter.get_store()
}

pub fn at(minutes: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0)
        .single()
        .unwrap_or_default()
        + Duration::minutes(minutes)
}

/// An actual listener owned by `route`, matching `desired` by hash.
pub fn owned_copy(desired: &Object, route: &Route, name: &str, created: DateTime<Utc>) -> Object {
    let mut copy = desired.clone();
    copy.metadata.name = Some(name.to_string());
    copy.metadata.creation_timestamp = Some(created);
    if let Ok(owner) = route.owner_reference() {
        copy = copy.with_owner(owner);
    }
    copy
}

/// Mark `object` as programmed (or not).
pub fn programmed(object: Object, ready: bool) -> Object {
    let status = if ready { "True" } else { "False" };
    object.with_status(json!({"conditions": [{"type": "Programmed", "status": status}]}))
}

/// Stored listeners, by name.
pub async fn listeners(repository: &InMemoryRepository) -> Vec<Object> {
    repository
        .snapshot()
        .await
        .into_iter()
        .filter(|object| object.gvk() == listener_gvk())
        .collect()
}

/// Holds the first `parties` list calls until all of them arrived, so
/// concurrent passes see the same snapshot before any of them writes.
pub struct LockstepListRepository {
    inner: Arc<InMemoryRepository>,
    barrier: Barrier,
    held: AtomicUsize,
}

impl LockstepListRepository {
    pub fn new(inner: Arc<InMemoryRepository>, parties: usize) -> Self {
        Self {
            inner,
            barrier: Barrier::new(parties),
            held: AtomicUsize::new(parties),
        }
    }
}

#[async_trait]
impl ObjectRepository for LockstepListRepository {
    async fn get(&self, gvk: &GroupVersionKind, namespace: &str, name: &str) -> RepositoryResult<Object> {
        self.inner.get(gvk, namespace, name).await
    }

    async fn list(
        &self,
        gvk: &GroupVersionKind,
        namespace: &str,
        selector: &LabelSelector,
    ) -> RepositoryResult<Vec<Object>> {
        let listed = self.inner.list(gvk, namespace, selector).await;
        let hold = self
            .held
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if hold {
            self.barrier.wait().await;
        }
        listed
    }

    async fn create(&self, object: &Object) -> RepositoryResult<Object> {
        self.inner.create(object).await
    }

    async fn patch(&self, object: &Object, merge_from: &Object) -> RepositoryResult<Object> {
        self.inner.patch(object, merge_from).await
    }

    async fn delete(&self, object: &Object) -> RepositoryResult<()> {
        self.inner.delete(object).await
    }
}
