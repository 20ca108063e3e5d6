//! Areas (one per pincode) and their sub-areas (one per post office).

use serde::{Deserialize, Serialize};

use super::GeoPoint;

/// Area type tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AreaType {
    District,
    Locality,
    Zone,
    Region,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AreaMetadata {
    pub sub_area_count: usize,
    pub district: String,
    pub state: String,
    /// Mean of the valid sub-area coordinates, `None` when nothing was geocoded
    #[serde(skip_serializing_if = "Option::is_none")]
    pub average_coordinates: Option<GeoPoint>,
}

/// Aggregated locality for one pincode within one city.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Area {
    pub id: String,
    pub city_id: String,
    pub name: String,
    pub slug: String,
    pub area_type: AreaType,
    /// (0,0) when no sub-area could be geocoded
    pub centroid: GeoPoint,
    pub pincode: u32,
    pub metadata: AreaMetadata,
    pub is_serviceable: bool,
    pub priority: i32,
}

/// Sub-area type, normalized from the provider's branch type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubAreaType {
    PostOffice,
    SubPostOffice,
    HeadPostOffice,
    Locality,
    Landmark,
}

impl SubAreaType {
    /// Map a provider branch type onto the closed vocabulary.
    ///
    /// Unrecognized branch types fall back to `PostOffice`.
    pub fn from_branch_type(branch_type: &str) -> Self {
        match branch_type.trim().to_lowercase().as_str() {
            "head post office" | "head office" | "h.o" | "ho" => SubAreaType::HeadPostOffice,
            "sub post office" | "sub office" | "s.o" | "so" => SubAreaType::SubPostOffice,
            "branch post office" | "branch office" | "b.o" | "bo" | "post office" => {
                SubAreaType::PostOffice
            }
            _ => SubAreaType::PostOffice,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubAreaDetails {
    pub branch_type: String,
    pub delivery_status: String,
    pub district: String,
    pub state: String,
    pub division: String,
    pub region: String,
}

/// A single post office within an area.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubArea {
    pub id: String,
    pub area_id: String,
    pub city_id: String,
    pub name: String,
    /// name + pincode + ordinal, unique per city
    pub slug: String,
    pub pincode: u32,
    pub sub_area_type: SubAreaType,
    /// (0,0) when the post office could not be geocoded
    pub coordinates: GeoPoint,
    pub details: SubAreaDetails,
    pub is_serviceable: bool,
    pub priority: i32,
}
