//! Error types for the store, import pipeline and resolver.

use thiserror::Error;

use crate::models::JobStatus;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage error: {0}")]
    Sled(#[from] sled::Error),

    #[error("corrupt record in tree '{tree}': {source}")]
    Decode {
        tree: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to encode record for tree '{tree}': {source}")]
    Encode {
        tree: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("pincode {pincode} already belongs to city {owner}")]
    PincodeConflict { pincode: u32, owner: String },

    #[error("city {0} not found")]
    CityNotFound(String),

    #[error("import job {0} not found")]
    JobNotFound(String),

    /// The job reached a terminal state before its hierarchy was written.
    #[error("import job {id} is already {status}")]
    JobClosed { id: String, status: JobStatus },
}

#[derive(Debug, Error)]
pub enum JobError {
    #[error("import job {0} not found")]
    NotFound(String),

    #[error("import job {id} cannot move from {from} to {to}")]
    InvalidTransition {
        id: String,
        from: JobStatus,
        to: JobStatus,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<sled::Error> for JobError {
    fn from(e: sled::Error) -> Self {
        JobError::Store(StoreError::Sled(e))
    }
}

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("no pincode ranges given")]
    EmptyRequest,

    #[error("city name '{0}' has no usable characters")]
    InvalidCityName(String),

    #[error("invalid pincode range {start}-{end}")]
    InvalidRange { start: u32, end: u32 },

    #[error("city center ({lat}, {lng}) is not a valid coordinate")]
    InvalidCenter { lat: f64, lng: f64 },

    #[error("no pincode data found for '{0}'; keeping the existing hierarchy")]
    NoData(String),

    #[error("an import for city '{0}' is already running")]
    AlreadyRunning(String),

    #[error("import job {0} was cancelled")]
    Cancelled(String),

    #[error("failed to build provider client: {0}")]
    Provider(#[from] reqwest::Error),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Job(#[from] JobError),
}

#[derive(Debug, Error)]
pub enum ResolveError {
    /// The hierarchy could not be read; distinct from "not serviceable".
    #[error("serviceability lookup unavailable: {0}")]
    Store(#[from] StoreError),

    #[error("no postal address found for ({lat}, {lng})")]
    AddressUnavailable { lat: f64, lng: f64 },
}

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache backend unavailable: {0}")]
    Unavailable(String),

    #[error("cache value could not be decoded: {0}")]
    Decode(#[from] serde_json::Error),
}
