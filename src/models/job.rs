//! Import job record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::PincodeRange;

/// Job lifecycle: `Started -> Processing -> {Completed | Failed | Cancelled}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Started,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    /// Whether a job in `self` may move to `next`.
    ///
    /// Staying in `Processing` is allowed so progress can be re-reported.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        match (self, next) {
            (JobStatus::Started, JobStatus::Processing) => true,
            (JobStatus::Processing, JobStatus::Processing) => true,
            (JobStatus::Started | JobStatus::Processing, s) => s.is_terminal(),
            _ => false,
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            JobStatus::Started => "started",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobProgress {
    pub total_pincodes: usize,
    pub processed_pincodes: usize,
    pub successful_pincodes: usize,
    pub failed_pincodes: usize,
    pub percentage: u8,
}

/// Rows written by the hierarchy replace.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportCounts {
    pub areas_created: usize,
    pub sub_areas_created: usize,
    pub pincodes_created: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PincodeFailure {
    pub pincode: u32,
    pub error: String,
    pub timestamp: DateTime<Utc>,
}

/// Settings captured when the job was created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobConfig {
    pub city_name: String,
    pub pincode_ranges: Vec<PincodeRange>,
    pub batch_size: usize,
    pub max_retries: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operator_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportJob {
    pub id: String,
    pub city_id: String,
    pub status: JobStatus,
    pub source: String,
    pub config: JobConfig,
    pub progress: JobProgress,
    pub results: ImportCounts,
    /// Per-pincode failures in the order they were recorded
    pub errors: Vec<PincodeFailure>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transitions() {
        use JobStatus::*;
        assert!(Started.can_transition_to(Processing));
        assert!(Started.can_transition_to(Failed));
        assert!(Processing.can_transition_to(Processing));
        assert!(Processing.can_transition_to(Completed));
        assert!(Processing.can_transition_to(Cancelled));
        assert!(!Processing.can_transition_to(Started));
        assert!(!Completed.can_transition_to(Processing));
        assert!(!Failed.can_transition_to(Completed));
        assert!(!Cancelled.can_transition_to(Cancelled));
    }
}
