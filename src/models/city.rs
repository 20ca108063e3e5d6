//! City: root of the location hierarchy.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::GeoPoint;

/// Inclusive range of pincodes to import for a city.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PincodeRange {
    pub start: u32,
    pub end: u32,
}

impl PincodeRange {
    pub fn new(start: u32, end: u32) -> Self {
        Self { start, end }
    }
}

impl std::fmt::Display for PincodeRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

/// Status of the most recent import for a city
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CityImportStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

/// Aggregate counters refreshed by every import.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CityMetadata {
    pub total_areas: usize,
    pub total_sub_areas: usize,
    pub total_pincodes: usize,
    pub last_imported_at: Option<DateTime<Utc>>,
    pub import_status: CityImportStatus,
}

impl Default for CityMetadata {
    fn default() -> Self {
        Self {
            total_areas: 0,
            total_sub_areas: 0,
            total_pincodes: 0,
            last_imported_at: None,
            import_status: CityImportStatus::Pending,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct City {
    pub id: String,
    pub name: String,
    /// Lowercase, hyphenated, unique across cities
    pub slug: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    pub country: String,
    pub center: GeoPoint,
    pub pincode_ranges: Vec<PincodeRange>,
    pub metadata: CityMetadata,
    pub is_active: bool,
}
