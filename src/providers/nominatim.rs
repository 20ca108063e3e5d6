//! Nominatim geocoder client.

use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use super::{Geocoder, ReverseAddress};
use crate::models::LatLng;

pub struct NominatimClient {
    client: Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    lat: String,
    lon: String,
}

#[derive(Debug, Deserialize)]
struct ReverseResponse {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    address: Option<NominatimAddress>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct NominatimAddress {
    postcode: Option<String>,
    suburb: Option<String>,
    neighbourhood: Option<String>,
    quarter: Option<String>,
    city_district: Option<String>,
    village: Option<String>,
    town: Option<String>,
    city: Option<String>,
    county: Option<String>,
}

fn first_hit(hits: Vec<SearchHit>) -> Option<LatLng> {
    let hit = hits.into_iter().next()?;
    let point = LatLng::new(hit.lat.parse().ok()?, hit.lon.parse().ok()?);
    point.is_valid().then_some(point)
}

impl ReverseResponse {
    fn into_address(self) -> Option<ReverseAddress> {
        if self.error.is_some() {
            return None;
        }
        let address = self.address?;
        // Indian postcodes sometimes come back as "411 001"
        let pincode = address
            .postcode
            .map(|p| p.chars().filter(|c| !c.is_whitespace()).collect::<String>());
        let locality = address
            .suburb
            .or(address.neighbourhood)
            .or(address.quarter)
            .or(address.city_district)
            .or(address.village);
        let city = address.city.or(address.town).or(address.county);

        Some(ReverseAddress {
            pincode,
            locality,
            city,
            display_name: self.display_name,
        })
    }
}

impl NominatimClient {
    /// `user_agent` must identify the caller; Nominatim blocks anonymous clients.
    pub fn new(base_url: &str, user_agent: &str, timeout: Duration) -> reqwest::Result<Self> {
        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

impl Geocoder for NominatimClient {
    async fn geocode(&self, place_name: &str, city_name: &str) -> Option<LatLng> {
        let query = format!("{}, {}", place_name, city_name);
        let response = self
            .client
            .get(format!("{}/search", self.base_url))
            .query(&[("q", query.as_str()), ("format", "json"), ("limit", "1")])
            .send()
            .await;

        let response = match response {
            Ok(r) if r.status().is_success() => r,
            Ok(r) => {
                debug!("Geocoder returned status {} for '{}'", r.status(), query);
                return None;
            }
            Err(e) => {
                debug!("Geocoder request for '{}' failed: {}", query, e);
                return None;
            }
        };

        match response.json::<Vec<SearchHit>>().await {
            Ok(hits) => first_hit(hits),
            Err(e) => {
                debug!("Failed to parse geocoder response for '{}': {}", query, e);
                None
            }
        }
    }

    async fn reverse(&self, point: LatLng) -> Option<ReverseAddress> {
        let lat = point.lat.to_string();
        let lon = point.lng.to_string();
        let response = self
            .client
            .get(format!("{}/reverse", self.base_url))
            .query(&[
                ("lat", lat.as_str()),
                ("lon", lon.as_str()),
                ("format", "json"),
                ("addressdetails", "1"),
            ])
            .send()
            .await;

        let response = match response {
            Ok(r) if r.status().is_success() => r,
            Ok(r) => {
                debug!("Reverse geocoder returned status {}", r.status());
                return None;
            }
            Err(e) => {
                debug!("Reverse geocode for ({}, {}) failed: {}", lat, lon, e);
                return None;
            }
        };

        match response.json::<ReverseResponse>().await {
            Ok(resp) => resp.into_address(),
            Err(e) => {
                debug!("Failed to parse reverse geocoder response: {}", e);
                None
            }
        }
    }
}
