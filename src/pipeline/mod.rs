//! Import pipeline: batched fetching, hierarchy building, job tracking.

mod batch;
mod hierarchy;
mod importer;
mod jobs;

pub use batch::{BatchOrchestrator, BatchReport, FetchOutcome, PincodeData, PincodeLookup};
pub use hierarchy::{centroid, HierarchyBuilder};
pub use importer::{
    expand_ranges, ImportRequest, ImportSummary, ImportTotals, Importer, LiveImporter,
};
pub use jobs::ImportJobTracker;
