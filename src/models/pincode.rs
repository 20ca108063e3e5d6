use serde::{Deserialize, Serialize};

use super::GeoPoint;

pub const PINCODE_MIN: u32 = 100_000;
pub const PINCODE_MAX: u32 = 999_999;

/// Whether `code` is a six digit postal code.
pub fn is_valid_pincode(code: u32) -> bool {
    (PINCODE_MIN..=PINCODE_MAX).contains(&code)
}

/// Parse user input into a pincode. Surrounding whitespace is ignored.
pub fn parse_pincode(input: &str) -> Option<u32> {
    let trimmed = input.trim();
    if trimmed.len() != 6 || !trimmed.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    trimmed.parse().ok().filter(|c| is_valid_pincode(*c))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PincodeMetadata {
    pub district: String,
    pub state: String,
    pub sub_area_count: usize,
    pub primary_area_name: String,
}

/// One row per distinct pincode; unique globally on `code`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pincode {
    pub code: u32,
    pub city_id: Option<String>,
    /// Areas sharing this pincode, in insertion order
    pub area_ids: Vec<String>,
    pub coordinates: GeoPoint,
    pub is_serviceable: bool,
    pub metadata: PincodeMetadata,
}
