use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub global: GlobalConfig,
    #[serde(default)]
    pub providers: ProviderConfig,
    #[serde(default)]
    pub import: ImportConfig,
    #[serde(default)]
    pub cache: CacheConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct GlobalConfig {
    pub db_path: PathBuf,
    pub listen: String,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("data/pinmap.sled"),
            listen: "0.0.0.0:3000".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ProviderConfig {
    pub postal_index_url: String,
    pub geocoder_url: String,
    /// Sent on every geocoder request; anonymous traffic gets blocked
    pub user_agent: String,
    pub postal_timeout_secs: u64,
    pub geocoder_timeout_secs: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            postal_index_url: "https://api.postalpincode.in/pincode".to_string(),
            geocoder_url: "https://nominatim.openstreetmap.org".to_string(),
            user_agent: "pinmap/0.1 (location import)".to_string(),
            postal_timeout_secs: 10,
            geocoder_timeout_secs: 10,
        }
    }
}

impl ProviderConfig {
    pub fn postal_timeout(&self) -> Duration {
        Duration::from_secs(self.postal_timeout_secs)
    }

    pub fn geocoder_timeout(&self) -> Duration {
        Duration::from_secs(self.geocoder_timeout_secs)
    }
}

/// Batch and retry knobs handed to the orchestrator.
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct ImportConfig {
    /// Pincodes fetched concurrently per batch
    pub batch_size: usize,
    /// Pause between batches (not after the last one)
    pub batch_delay_ms: u64,
    /// Extra postal index attempts after the first miss
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    /// Pause between consecutive geocode calls for one pincode
    pub geocode_delay_ms: u64,
    /// Geocode post offices that came back without coordinates
    pub geocode_missing: bool,
    pub country: String,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            batch_size: 25,
            batch_delay_ms: 250,
            max_retries: 3,
            retry_delay_ms: 2000,
            geocode_delay_ms: 1000,
            geocode_missing: true,
            country: "India".to_string(),
        }
    }
}

impl ImportConfig {
    pub fn batch_delay(&self) -> Duration {
        Duration::from_millis(self.batch_delay_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn geocode_delay(&self) -> Duration {
        Duration::from_millis(self.geocode_delay_ms)
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct CacheConfig {
    pub ttl_secs: u64,
    /// Upper bound on cached geocoder answers
    pub max_entries: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 86_400,
            max_entries: 10_000,
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

impl Config {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path).context("Failed to read config file")?;
        let config = Self::from_toml(&content)?;
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).context("Failed to parse config file")?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        Url::parse(&self.providers.postal_index_url).context("Invalid postal_index_url")?;
        Url::parse(&self.providers.geocoder_url).context("Invalid geocoder_url")?;
        if self.import.batch_size == 0 {
            anyhow::bail!("import.batch_size must be at least 1");
        }
        if self.providers.user_agent.trim().is_empty() {
            anyhow::bail!("providers.user_agent must not be empty");
        }
        Ok(())
    }
}
