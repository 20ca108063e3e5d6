//! Pinmap - city location hierarchy import and serviceability lookups
//!
//! This library provides the shared types and modules for the import and
//! query binaries: postal index and geocoder providers, the batched import
//! pipeline, the sled-backed hierarchy store and the serviceability resolver.

pub mod config;
pub mod error;
pub mod models;
pub mod pipeline;
pub mod providers;
pub mod serviceability;
pub mod slug;
pub mod store;

#[cfg(test)]
mod testing;

pub use config::Config;
pub use error::{ImportError, JobError, ResolveError, StoreError};
pub use models::{City, ImportJob, JobStatus, LatLng, PincodeRange};
pub use pipeline::{ImportRequest, ImportSummary, Importer};
pub use serviceability::{LocationResolver, ServiceabilityResolver, ServiceabilityResult};
pub use store::HierarchyStore;
