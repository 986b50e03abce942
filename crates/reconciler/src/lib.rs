//! Declarative state enforcement for owned child resources.
//!
//! A root object (a route, a gateway, an application) owns a set of derived
//! objects. A [`Converter`] translates the root into the desired set; the
//! [`StateEnforcer`] makes the repository match it:
//!
//! - **Hash labels**: every desired object carries a content hash of its
//!   identity and spec, which is how actual objects are matched back to it
//! - **Ownership**: only objects whose owner reference points at the root are
//!   ever touched
//! - **Reduction**: duplicates of one desired object are collapsed with
//!   converter-supplied strategies, the rest are deleted
//! - **Requeue**: creates and conflicts ask for another pass instead of
//!   blocking
//!
//! # Example
//!
//! ```ignore
//! use converge_reconciler::{
//!     DriverConfig, EnforcerConfig, InMemoryRepository, RetryDriver, StateEnforcer,
//!     TypeRegistry,
//! };
//!
//! #[tokio::main]
//! async fn main() -> converge_reconciler::Result<()> {
//!     let registry = TypeRegistry::builder().register(service_gvk()).build();
//!     let repository = InMemoryRepository::new_arc(registry);
//!     let enforcer = StateEnforcer::new(repository, EnforcerConfig::default())?;
//!
//!     let driver = RetryDriver::new(&enforcer, DriverConfig::default())?;
//!     let report = driver.drive(&mut RouteConverter::default(), route).await?;
//!     println!("converged after {} passes", report.passes);
//!     Ok(())
//! }
//! ```

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod config;
pub mod converter;
pub mod driver;
pub mod enforcer;
pub mod error;
pub mod hash;
pub mod object;
pub mod ownership;
pub mod reduction;
pub mod registry;
pub mod repository;
pub mod selector;
pub mod types;

// Re-export main types
pub use config::{DriverConfig, EnforcerConfig, EnforcerConfigBuilder, DEFAULT_HASH_LABEL};
pub use converter::{Converter, ConverterError, LoadStatus};
pub use driver::{DriveReport, RetryDriver};
pub use enforcer::StateEnforcer;
pub use error::{Error, Result};
pub use hash::ContentHasher;
pub use object::{GroupVersionKind, Object, ObjectError, ObjectMeta, OwnerReference, Resource};
pub use ownership::OwnershipIndex;
pub use reduction::{
    reduce, FnStrategy, KeepProgrammed, KeepYoungest, Reduction, ReductionStrategy, SharedStrategy,
    PROGRAMMED_CONDITION,
};
pub use registry::{TypeRegistry, TypeRegistryBuilder};
pub use repository::{
    InMemoryRepository, ObjectRepository, Operation, RepositoryError, RepositoryResult,
    TracingRepository, WriteOp,
};
pub use selector::LabelSelector;
pub use types::{DeleteReason, EnforceAction, EnforceResult, SlotKey};
