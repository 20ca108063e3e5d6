//! India Post pincode directory client.

use reqwest::Client;
use serde::{Deserialize, Deserializer};
use std::time::Duration;
use tracing::{debug, warn};

use super::{PostOffice, PostalIndex};
use crate::models::LatLng;

const SOURCE: &str = "india_post_api";

/// Client for `GET {base}/{pincode}`
pub struct IndiaPostClient {
    client: Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct PostalResponse {
    #[serde(rename = "Status", default)]
    status: String,
    #[serde(rename = "PostOffice", default)]
    post_office: Option<Vec<RawPostOffice>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct RawPostOffice {
    name: String,
    branch_type: String,
    delivery_status: String,
    district: String,
    state: String,
    division: String,
    region: String,
    #[serde(deserialize_with = "lenient_coord")]
    latitude: Option<f64>,
    #[serde(deserialize_with = "lenient_coord")]
    longitude: Option<f64>,
}

/// Coordinates arrive as numbers, numeric strings, "NA" or null.
fn lenient_coord<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::Number(n)) => n.as_f64(),
        Some(serde_json::Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    })
}

impl From<RawPostOffice> for PostOffice {
    fn from(raw: RawPostOffice) -> Self {
        let coordinates = match (raw.latitude, raw.longitude) {
            (Some(lat), Some(lng)) => Some(LatLng::new(lat, lng)).filter(|p| p.is_valid()),
            _ => None,
        };
        Self {
            name: raw.name.trim().to_string(),
            branch_type: raw.branch_type,
            delivery_status: raw.delivery_status,
            district: raw.district,
            state: raw.state,
            division: raw.division,
            region: raw.region,
            coordinates,
        }
    }
}

/// Pull the post offices out of a decoded payload.
fn post_offices(payload: Vec<PostalResponse>) -> Option<Vec<PostOffice>> {
    let first = payload.into_iter().next()?;
    if !first.status.eq_ignore_ascii_case("success") {
        return None;
    }
    let offices: Vec<PostOffice> = first
        .post_office?
        .into_iter()
        .map(PostOffice::from)
        .collect();
    if offices.is_empty() {
        None
    } else {
        Some(offices)
    }
}

impl IndiaPostClient {
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

impl PostalIndex for IndiaPostClient {
    fn source(&self) -> &'static str {
        SOURCE
    }

    async fn fetch_postal_index(&self, pincode: u32) -> Option<Vec<PostOffice>> {
        let url = format!("{}/{}", self.base_url, pincode);

        let response = match self.client.get(&url).send().await {
            Ok(r) => r,
            Err(e) => {
                debug!("Postal index request for {} failed: {}", pincode, e);
                return None;
            }
        };

        if !response.status().is_success() {
            warn!(
                "Postal index returned status {} for {}",
                response.status(),
                pincode
            );
            return None;
        }

        let payload: Vec<PostalResponse> = match response.json().await {
            Ok(p) => p,
            Err(e) => {
                warn!("Failed to parse postal index response for {}: {}", pincode, e);
                return None;
            }
        };

        let offices = post_offices(payload);
        if offices.is_none() {
            debug!("No post offices for {}", pincode);
        }
        offices
    }
}
