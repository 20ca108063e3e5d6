//! Batched, rate-limited pincode fetching.
//!
//! Pincodes are fetched in fixed-size batches. Everything inside a batch runs
//! concurrently; batches run one after another with a pause in between. The
//! only suspension points are provider calls and the configured sleeps.

use futures::future::join_all;
use std::ops::ControlFlow;
use tracing::{debug, info, warn};

use crate::config::ImportConfig;
use crate::providers::{Geocoder, PostOffice, PostalIndex};

/// Postal data for a pincode that the index knows about.
#[derive(Debug, Clone, PartialEq)]
pub struct PincodeData {
    pub pincode: u32,
    /// Name of the first post office
    pub main_area: Option<String>,
    pub district: String,
    pub state: String,
    pub post_offices: Vec<PostOffice>,
}

/// Outcome of fetching one pincode. `Missing` is terminal but not an error.
#[derive(Debug, Clone, PartialEq)]
pub enum PincodeLookup {
    Found(PincodeData),
    Missing(u32),
}

impl PincodeLookup {
    pub fn pincode(&self) -> u32 {
        match self {
            PincodeLookup::Found(data) => data.pincode,
            PincodeLookup::Missing(pincode) => *pincode,
        }
    }

    pub fn is_found(&self) -> bool {
        matches!(self, PincodeLookup::Found(_))
    }
}

/// Progress after one batch finished.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchReport {
    /// Zero-based batch number
    pub batch: usize,
    pub batch_len: usize,
    pub processed: usize,
    pub successful: usize,
    pub total: usize,
    pub percentage: u8,
    /// Pincodes of this batch that came back missing
    pub missing: Vec<u32>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FetchOutcome {
    pub found: Vec<PincodeData>,
    pub missing: Vec<u32>,
    pub batches: usize,
    /// Set when the report callback asked to stop scheduling batches
    pub stopped: bool,
}

impl FetchOutcome {
    pub fn processed(&self) -> usize {
        self.found.len() + self.missing.len()
    }
}

pub struct BatchOrchestrator<P, G> {
    postal: P,
    geocoder: G,
    config: ImportConfig,
}

fn percentage(processed: usize, total: usize) -> u8 {
    if total == 0 {
        return 100;
    }
    ((processed * 100 + total / 2) / total).min(100) as u8
}

impl<P: PostalIndex, G: Geocoder> BatchOrchestrator<P, G> {
    pub fn new(postal: P, geocoder: G, config: ImportConfig) -> Self {
        Self {
            postal,
            geocoder,
            config,
        }
    }

    pub fn config(&self) -> &ImportConfig {
        &self.config
    }

    pub fn source(&self) -> &'static str {
        self.postal.source()
    }

    pub fn geocoder(&self) -> &G {
        &self.geocoder
    }

    /// Fetch one pincode, retrying misses, then geocode offices that came
    /// back without coordinates.
    ///
    /// The postal index is tried `1 + max_retries` times with
    /// `retry_delay` between attempts. Geocode calls for the pincode's offices
    /// run one at a time with `geocode_delay` between them; a geocode miss
    /// leaves that office's coordinates empty.
    pub async fn fetch_pincode_data(&self, pincode: u32, city_name: &str) -> PincodeLookup {
        let attempts = 1 + self.config.max_retries;
        let mut offices = None;

        for attempt in 1..=attempts {
            offices = self
                .postal
                .fetch_postal_index(pincode)
                .await
                .filter(|o| !o.is_empty());
            if offices.is_some() {
                break;
            }
            if attempt < attempts {
                debug!(
                    "No postal data for {} (attempt {}/{}), retrying",
                    pincode, attempt, attempts
                );
                tokio::time::sleep(self.config.retry_delay()).await;
            }
        }

        let Some(mut offices) = offices else {
            warn!("Giving up on {} after {} attempts", pincode, attempts);
            return PincodeLookup::Missing(pincode);
        };

        if self.config.geocode_missing {
            let mut first_call = true;
            for office in offices.iter_mut().filter(|o| o.coordinates.is_none()) {
                if !first_call {
                    tokio::time::sleep(self.config.geocode_delay()).await;
                }
                first_call = false;

                office.coordinates = self.geocoder.geocode(&office.name, city_name).await;
                if office.coordinates.is_none() {
                    debug!("Could not geocode '{}' ({})", office.name, pincode);
                }
            }
        }

        let first = &offices[0];
        PincodeLookup::Found(PincodeData {
            pincode,
            main_area: Some(first.name.clone()).filter(|n| !n.is_empty()),
            district: first.district.clone(),
            state: first.state.clone(),
            post_offices: offices,
        })
    }

    /// Fetch all `pincodes` in batches of `batch_size`.
    ///
    /// `on_batch` runs after every batch; returning `ControlFlow::Break`
    /// stops before the next batch is scheduled. There is no pause after
    /// the last batch.
    pub async fn fetch_pincodes_in_batches<F>(
        &self,
        pincodes: &[u32],
        city_name: &str,
        mut on_batch: F,
    ) -> FetchOutcome
    where
        F: FnMut(&BatchReport) -> ControlFlow<()>,
    {
        let total = pincodes.len();
        let batch_size = self.config.batch_size.max(1);
        let batch_count = total.div_ceil(batch_size);
        let mut outcome = FetchOutcome::default();

        info!(
            "Fetching {} pincodes for {} in {} batches of up to {}",
            total, city_name, batch_count, batch_size
        );

        for (index, batch) in pincodes.chunks(batch_size).enumerate() {
            if index > 0 {
                tokio::time::sleep(self.config.batch_delay()).await;
            }

            let lookups = join_all(
                batch
                    .iter()
                    .map(|&pincode| self.fetch_pincode_data(pincode, city_name)),
            )
            .await;

            let mut missing = Vec::new();
            for lookup in lookups {
                match lookup {
                    PincodeLookup::Found(data) => outcome.found.push(data),
                    PincodeLookup::Missing(pincode) => missing.push(pincode),
                }
            }
            outcome.missing.extend_from_slice(&missing);
            outcome.batches += 1;

            let report = BatchReport {
                batch: index,
                batch_len: batch.len(),
                processed: outcome.processed(),
                successful: outcome.found.len(),
                total,
                percentage: percentage(outcome.processed(), total),
                missing,
            };
            info!(
                "Batch {}/{}: {}/{} pincodes processed, {} found ({}%)",
                index + 1,
                batch_count,
                report.processed,
                total,
                report.successful,
                report.percentage
            );

            if on_batch(&report).is_break() {
                info!("Stopping after batch {}/{}", index + 1, batch_count);
                outcome.stopped = true;
                break;
            }
        }

        outcome
    }
}
