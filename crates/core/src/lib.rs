//! Shared building blocks for the converge reconciliation engine.
//!
//! - [`document`]: path-based reads and writes over loosely-typed
//!   [`serde_json::Value`] documents, with an explicit found / not-found /
//!   error trichotomy instead of runtime type assertions.
//! - [`merge`]: RFC 7386 JSON merge patches (diff and apply).
//! - [`error`] and [`result`]: the error type for document access and the
//!   railway-style result combinators used across the workspace.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod document;
pub mod error;
pub mod merge;
pub mod result;

pub use error::Error;
pub use result::{Result, ResultExt};
