//! External data providers: postal index and geocoder.
//!
//! Both are plain request/response wrappers with their own timeout. A miss,
//! timeout, or provider error comes back as `None`; retry policy belongs to
//! the caller (see `pipeline::BatchOrchestrator`).

mod cache;
mod india_post;
mod nominatim;

use serde::{Deserialize, Serialize};
use std::future::Future;

use crate::models::LatLng;

pub use cache::{CacheStore, CachedGeocoder, MemoryCache};
pub use india_post::IndiaPostClient;
pub use nominatim::NominatimClient;

/// Post office record as reported by the postal index.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PostOffice {
    pub name: String,
    pub branch_type: String,
    pub delivery_status: String,
    pub district: String,
    pub state: String,
    pub division: String,
    pub region: String,
    /// Provider-supplied or geocoded; `None` when neither worked
    pub coordinates: Option<LatLng>,
}

/// Postal address found for a coordinate.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReverseAddress {
    pub pincode: Option<String>,
    /// Most specific named locality (suburb, neighbourhood, ...)
    pub locality: Option<String>,
    pub city: Option<String>,
    pub display_name: Option<String>,
}

/// Pincode → post offices lookup.
pub trait PostalIndex: Send + Sync {
    /// Tag recorded on import jobs
    fn source(&self) -> &'static str;

    /// `None` on miss, timeout, connection failure or non-success payload.
    fn fetch_postal_index(
        &self,
        pincode: u32,
    ) -> impl Future<Output = Option<Vec<PostOffice>>> + Send;
}

/// Forward and reverse geocoding.
pub trait Geocoder: Send + Sync {
    fn geocode(
        &self,
        place_name: &str,
        city_name: &str,
    ) -> impl Future<Output = Option<LatLng>> + Send;

    fn reverse(&self, point: LatLng) -> impl Future<Output = Option<ReverseAddress>> + Send;
}
