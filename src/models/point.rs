//! Coordinate types.
//!
//! Providers and aggregation work in (latitude, longitude) order. Every point
//! that gets persisted is a GeoJSON-style `Point` in (longitude, latitude)
//! order, so the swap happens exactly once, in `GeoPoint::from(LatLng)`.

use serde::{Deserialize, Serialize};

/// Latitude/longitude pair as returned by providers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

impl LatLng {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Finite and within WGS84 bounds
    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lng.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lng)
    }
}

/// Persisted point: `coordinates` is `[lng, lat]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    #[serde(rename = "type")]
    pub geo_type: PointType,
    pub coordinates: [f64; 2],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PointType {
    Point,
}

impl GeoPoint {
    /// Sentinel for "not geocoded".
    pub const UNKNOWN: GeoPoint = GeoPoint {
        geo_type: PointType::Point,
        coordinates: [0.0, 0.0],
    };

    pub fn lng(&self) -> f64 {
        self.coordinates[0]
    }

    pub fn lat(&self) -> f64 {
        self.coordinates[1]
    }

    pub fn is_unknown(&self) -> bool {
        self.coordinates == [0.0, 0.0]
    }

    pub fn to_lat_lng(&self) -> LatLng {
        LatLng::new(self.lat(), self.lng())
    }
}

impl From<LatLng> for GeoPoint {
    fn from(p: LatLng) -> Self {
        Self {
            geo_type: PointType::Point,
            coordinates: [p.lng, p.lat],
        }
    }
}

impl Default for GeoPoint {
    fn default() -> Self {
        Self::UNKNOWN
    }
}
