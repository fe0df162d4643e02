//! Core domain types for Capstan.
//!
//! This crate defines the small Kubernetes object model the credential
//! providers operate on (secrets, service accounts, object references),
//! the [`Cluster`] trait that abstracts the API server, and the shared
//! error type.

pub mod cluster;
pub mod error;
pub mod object;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

pub use cluster::{Cluster, HttpCluster};
pub use error::{Error, Result};
pub use object::{LocalObjectReference, ObjectMeta, ObjectRef, Secret, ServiceAccount};
