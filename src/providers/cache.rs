//! Key-value cache in front of the geocoder.
//!
//! The cache is best effort. A failing backend is logged and skipped, the
//! value is recomputed from the provider instead.

use moka::sync::Cache;
use moka::Expiry;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use super::{Geocoder, ReverseAddress};
use crate::error::CacheError;
use crate::models::LatLng;

/// get / set-with-TTL interface of the shared cache.
pub trait CacheStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, CacheError>;
    fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError>;
}

#[derive(Clone)]
struct Entry {
    value: String,
    ttl: Duration,
}

/// Per-entry TTL taken from the `set` call.
struct EntryTtl;

impl Expiry<String, Entry> for EntryTtl {
    fn expire_after_create(
        &self,
        _key: &String,
        entry: &Entry,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(entry.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        entry: &Entry,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(entry.ttl)
    }
}

/// Process-local cache, bounded by entry count.
pub struct MemoryCache {
    entries: Cache<String, Entry>,
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }
}

const DEFAULT_CAPACITY: u64 = 10_000;

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(max_entries: u64) -> Self {
        Self {
            entries: Cache::builder()
                .max_capacity(max_entries)
                .expire_after(EntryTtl)
                .build(),
        }
    }

    /// Live entries after pending evictions have run.
    pub fn len(&self) -> usize {
        self.entries.run_pending_tasks();
        self.entries.entry_count() as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl CacheStore for MemoryCache {
    fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        Ok(self.entries.get(key).map(|e| e.value))
    }

    fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError> {
        self.entries.insert(key.to_string(), Entry { value, ttl });
        Ok(())
    }
}

/// Geocoder decorator that caches hits. Misses are never cached.
pub struct CachedGeocoder<G> {
    inner: G,
    cache: Arc<dyn CacheStore>,
    ttl: Duration,
}

impl<G: Geocoder> CachedGeocoder<G> {
    pub fn new(inner: G, cache: Arc<dyn CacheStore>, ttl: Duration) -> Self {
        Self { inner, cache, ttl }
    }

    fn read<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        match self.cache.get(key) {
            Ok(Some(raw)) => match serde_json::from_str(&raw) {
                Ok(v) => Some(v),
                Err(e) => {
                    warn!("Discarding undecodable cache entry {}: {}", key, e);
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                warn!("Cache read for {} failed, recomputing: {}", key, e);
                None
            }
        }
    }

    fn write<T: Serialize>(&self, key: &str, value: &T) {
        let raw = match serde_json::to_string(value) {
            Ok(raw) => raw,
            Err(e) => {
                warn!("Could not encode cache entry {}: {}", key, e);
                return;
            }
        };
        if let Err(e) = self.cache.set(key, raw, self.ttl) {
            warn!("Cache write for {} failed: {}", key, e);
        }
    }
}

fn geocode_key(place_name: &str, city_name: &str) -> String {
    format!(
        "geocode:{}|{}",
        place_name.trim().to_lowercase(),
        city_name.trim().to_lowercase()
    )
}

fn reverse_key(point: LatLng) -> String {
    // ~1m precision
    format!("reverse:{:.5},{:.5}", point.lat, point.lng)
}

impl<G: Geocoder> Geocoder for CachedGeocoder<G> {
    async fn geocode(&self, place_name: &str, city_name: &str) -> Option<LatLng> {
        let key = geocode_key(place_name, city_name);
        if let Some(hit) = self.read::<LatLng>(&key) {
            debug!("Geocode cache hit for {}", key);
            return Some(hit);
        }
        let found = self.inner.geocode(place_name, city_name).await?;
        self.write(&key, &found);
        Some(found)
    }

    async fn reverse(&self, point: LatLng) -> Option<ReverseAddress> {
        let key = reverse_key(point);
        if let Some(hit) = self.read::<ReverseAddress>(&key) {
            debug!("Reverse geocode cache hit for {}", key);
            return Some(hit);
        }
        let found = self.inner.reverse(point).await?;
        self.write(&key, &found);
        Some(found)
    }
}
