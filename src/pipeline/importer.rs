//! `import_city`: the end-to-end import run for one city.

use chrono::Utc;
use hashbrown::HashSet;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeSet;
use std::ops::ControlFlow;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;
use tracing::{debug, error, info, warn};

use super::{BatchOrchestrator, BatchReport, FetchOutcome, HierarchyBuilder, ImportJobTracker};
use crate::config::Config;
use crate::error::{ImportError, JobError, StoreError};
use crate::models::{
    is_valid_pincode, City, CityImportStatus, ImportJob, JobConfig, JobStatus,
    LatLng, PincodeFailure, PincodeRange,
};
use crate::providers::{
    CacheStore, CachedGeocoder, Geocoder, IndiaPostClient, NominatimClient, PostalIndex,
};
use crate::slug::slugify;
use crate::store::HierarchyStore;

const NOT_FOUND: &str = "No data found after retries";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportRequest {
    pub city_name: String,
    pub pincode_ranges: Vec<PincodeRange>,
    /// City center; `{"lat", "lng"}` or a `[lat, lng]` pair
    #[serde(alias = "centerCoordinate", deserialize_with = "deserialize_center")]
    pub center: LatLng,
    #[serde(default)]
    pub operator_id: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum CenterInput {
    Pair([f64; 2]),
    Point { lat: f64, lng: f64 },
}

fn deserialize_center<'de, D>(deserializer: D) -> Result<LatLng, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match CenterInput::deserialize(deserializer)? {
        CenterInput::Pair([lat, lng]) | CenterInput::Point { lat, lng } => LatLng::new(lat, lng),
    })
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImportSummary {
    pub success: bool,
    pub city_id: String,
    pub import_job_id: String,
    pub summary: ImportTotals,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImportTotals {
    pub total_pincodes: usize,
    pub successful_pincodes: usize,
    pub failed_pincodes: usize,
    pub areas_created: usize,
    pub sub_areas_created: usize,
    pub pincodes_created: usize,
    pub duration_ms: u64,
}

/// Validate the ranges and list every pincode they cover, ascending and
/// without duplicates.
pub fn expand_ranges(ranges: &[PincodeRange]) -> Result<Vec<u32>, ImportError> {
    if ranges.is_empty() {
        return Err(ImportError::EmptyRequest);
    }
    let mut pincodes = BTreeSet::new();
    for range in ranges {
        if !is_valid_pincode(range.start) || !is_valid_pincode(range.end) || range.start > range.end
        {
            return Err(ImportError::InvalidRange {
                start: range.start,
                end: range.end,
            });
        }
        pincodes.extend(range.start..=range.end);
    }
    Ok(pincodes.into_iter().collect())
}

/// Marks a city as being imported until dropped.
struct RunningImport<'a> {
    running: &'a Mutex<HashSet<String>>,
    slug: String,
}

impl Drop for RunningImport<'_> {
    fn drop(&mut self) {
        self.running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.slug);
    }
}

/// Runs imports: fetch, build, replace, and job bookkeeping.
///
/// Imports of the same city are serialized by rejecting the second caller;
/// different cities can import concurrently.
pub struct Importer<P, G> {
    orchestrator: BatchOrchestrator<P, G>,
    builder: HierarchyBuilder,
    store: HierarchyStore,
    tracker: ImportJobTracker,
    running: Mutex<HashSet<String>>,
}

/// Importer wired to India Post and a cached Nominatim.
pub type LiveImporter = Importer<IndiaPostClient, CachedGeocoder<NominatimClient>>;

impl LiveImporter {
    pub fn from_config(
        config: &Config,
        store: HierarchyStore,
        cache: Arc<dyn CacheStore>,
    ) -> Result<Self, ImportError> {
        let providers = &config.providers;
        let postal = IndiaPostClient::new(
            &providers.postal_index_url,
            &providers.user_agent,
            providers.postal_timeout(),
        )?;
        let nominatim = NominatimClient::new(
            &providers.geocoder_url,
            &providers.user_agent,
            providers.geocoder_timeout(),
        )?;
        let geocoder = CachedGeocoder::new(nominatim, cache, config.cache.ttl());
        let orchestrator = BatchOrchestrator::new(postal, geocoder, config.import.clone());
        Ok(Self::new(orchestrator, store)?)
    }
}

impl<P: PostalIndex, G: Geocoder> Importer<P, G> {
    pub fn new(orchestrator: BatchOrchestrator<P, G>, store: HierarchyStore) -> Result<Self, JobError> {
        Ok(Self {
            tracker: ImportJobTracker::open(store.db())?,
            builder: HierarchyBuilder::new(store.clone()),
            store,
            orchestrator,
            running: Mutex::new(HashSet::new()),
        })
    }

    pub fn store(&self) -> &HierarchyStore {
        &self.store
    }

    pub fn tracker(&self) -> &ImportJobTracker {
        &self.tracker
    }

    pub fn geocoder(&self) -> &G {
        self.orchestrator.geocoder()
    }

    pub fn get_import_status(&self, job_id: &str) -> Result<Option<ImportJob>, JobError> {
        self.tracker.get(job_id)
    }

    /// Cancel a running import. The run stops before its next batch and
    /// never writes its hierarchy.
    pub fn cancel_import(&self, job_id: &str) -> Result<ImportJob, JobError> {
        self.tracker.cancel(job_id)
    }

    fn claim(&self, slug: &str) -> Result<RunningImport<'_>, ImportError> {
        let mut running = self.running.lock().unwrap_or_else(PoisonError::into_inner);
        if !running.insert(slug.to_string()) {
            return Err(ImportError::AlreadyRunning(slug.to_string()));
        }
        Ok(RunningImport {
            running: &self.running,
            slug: slug.to_string(),
        })
    }

    /// Import a city and wait for the run to finish.
    ///
    /// Progress is visible through `get_import_status` while this runs.
    /// Per-pincode misses are recorded on the job and never fail the run;
    /// anything else marks the job failed and is returned.
    pub async fn import_city(&self, request: ImportRequest) -> Result<ImportSummary, ImportError> {
        let pincodes = expand_ranges(&request.pincode_ranges)?;
        let slug = slugify(&request.city_name);
        if slug.is_empty() {
            return Err(ImportError::InvalidCityName(request.city_name));
        }
        if !request.center.is_valid() {
            return Err(ImportError::InvalidCenter {
                lat: request.center.lat,
                lng: request.center.lng,
            });
        }
        let _running = self.claim(&slug)?;
        let started = Instant::now();

        info!(
            "Importing {} ({} pincodes from {} ranges)",
            request.city_name,
            pincodes.len(),
            request.pincode_ranges.len()
        );

        let config = self.orchestrator.config();
        let city = self.store.upsert_city_for_import(
            &request.city_name,
            &config.country,
            request.center,
            &request.pincode_ranges,
        )?;

        let job_config = JobConfig {
            city_name: request.city_name.clone(),
            pincode_ranges: request.pincode_ranges.clone(),
            batch_size: config.batch_size,
            max_retries: config.max_retries,
            operator_id: request.operator_id.clone(),
        };
        let job = match self.tracker.create(
            &city.id,
            self.orchestrator.source(),
            job_config,
            pincodes.len(),
        ) {
            Ok(job) => job,
            Err(e) => {
                self.mark_city_failed(&city);
                return Err(e.into());
            }
        };

        match self.run(&city, &job.id, &pincodes, started).await {
            Ok(summary) => Ok(summary),
            Err(e @ ImportError::Cancelled(_)) => {
                self.mark_city_failed(&city);
                Err(e)
            }
            Err(e) => {
                error!("Import of {} failed: {}", city.slug, e);
                if let Err(job_err) = self.tracker.fail(&job.id, &e.to_string()) {
                    warn!("Could not mark job {} failed: {}", job.id, job_err);
                }
                self.mark_city_failed(&city);
                Err(e)
            }
        }
    }

    async fn run(
        &self,
        city: &City,
        job_id: &str,
        pincodes: &[u32],
        started: Instant,
    ) -> Result<ImportSummary, ImportError> {
        let outcome: FetchOutcome = self
            .orchestrator
            .fetch_pincodes_in_batches(pincodes, &city.name, |report| {
                self.report_batch(job_id, report)
            })
            .await;

        if outcome.stopped {
            return Err(ImportError::Cancelled(job_id.to_string()));
        }
        self.commit(city, job_id, pincodes.len(), &outcome, started)
    }

    /// Write the fetched hierarchy and complete the job in one transaction.
    ///
    /// A cancel that lands after the last batch report still wins: the
    /// write is dropped and the run reports `Cancelled`.
    fn commit(
        &self,
        city: &City,
        job_id: &str,
        total_pincodes: usize,
        outcome: &FetchOutcome,
        started: Instant,
    ) -> Result<ImportSummary, ImportError> {
        if outcome.found.is_empty() && !self.store.areas_for_city(&city.id)?.is_empty() {
            return Err(ImportError::NoData(city.name.clone()));
        }

        let duration = started.elapsed();
        let (counts, _) = self
            .builder
            .replace(city, &outcome.found, job_id, duration)
            .map_err(|e| match e {
                StoreError::JobClosed {
                    status: JobStatus::Cancelled,
                    ..
                } => ImportError::Cancelled(job_id.to_string()),
                e => e.into(),
            })?;
        info!(
            "Import job {} completed in {}ms: {} areas, {} sub-areas, {} pincodes",
            job_id,
            duration.as_millis(),
            counts.areas_created,
            counts.sub_areas_created,
            counts.pincodes_created
        );

        Ok(ImportSummary {
            success: true,
            city_id: city.id.clone(),
            import_job_id: job_id.to_string(),
            summary: ImportTotals {
                total_pincodes,
                successful_pincodes: outcome.found.len(),
                failed_pincodes: outcome.missing.len(),
                areas_created: counts.areas_created,
                sub_areas_created: counts.sub_areas_created,
                pincodes_created: counts.pincodes_created,
                duration_ms: duration.as_millis() as u64,
            },
        })
    }

    /// Best-effort job telemetry; returns `Break` once the job was cancelled.
    fn report_batch(&self, job_id: &str, report: &BatchReport) -> ControlFlow<()> {
        if !report.missing.is_empty() {
            let now = Utc::now();
            let failures: Vec<PincodeFailure> = report
                .missing
                .iter()
                .map(|&pincode| PincodeFailure {
                    pincode,
                    error: NOT_FOUND.to_string(),
                    timestamp: now,
                })
                .collect();
            if let Err(e) = self.tracker.record_failures(job_id, &failures) {
                debug!("Failures for job {} not recorded: {}", job_id, e);
            }
        }
        if let Err(e) = self
            .tracker
            .update_progress(job_id, report.processed, report.successful, report.percentage)
        {
            debug!("Progress for job {} not recorded: {}", job_id, e);
        }

        match self.tracker.get(job_id) {
            Ok(Some(job)) if job.status == JobStatus::Cancelled => ControlFlow::Break(()),
            Ok(_) => ControlFlow::Continue(()),
            Err(e) => {
                warn!("Could not read job {}: {}", job_id, e);
                ControlFlow::Continue(())
            }
        }
    }

    fn mark_city_failed(&self, city: &City) {
        if let Err(e) = self
            .store
            .set_city_import_status(&city.id, CityImportStatus::Failed)
        {
            warn!("Could not mark city {} failed: {}", city.slug, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ImportConfig;
    use crate::error::StoreError;
    use crate::models::{GeoPoint, ImportCounts, Pincode, PincodeMetadata};
    use crate::providers::PostOffice;
    use crate::store::HierarchySnapshot;
    use crate::testing::{office, MockGeocoder, MockPostalIndex};

    fn config() -> ImportConfig {
        ImportConfig {
            batch_size: 2,
            max_retries: 1,
            ..ImportConfig::default()
        }
    }

    fn postal() -> MockPostalIndex {
        MockPostalIndex::new()
            .with(
                411001,
                vec![
                    office("Camp", "Head Post Office", Some((18.51, 73.87))),
                    office("Koregaon Park", "Sub Post Office", None),
                ],
            )
            .with(411002, vec![office("Bhavani Peth", "Sub Post Office", None)])
            .with(411004, vec![office("Deccan Gymkhana", "Sub Post Office", None)])
    }

    fn geocoder() -> MockGeocoder {
        MockGeocoder::new().with_place("Koregaon Park", LatLng::new(18.53, 73.89))
    }

    fn request() -> ImportRequest {
        ImportRequest {
            city_name: "Pune".into(),
            pincode_ranges: vec![PincodeRange::new(411001, 411005)],
            center: LatLng::new(18.52, 73.85),
            operator_id: Some("ops-1".into()),
        }
    }

    fn importer<P: PostalIndex>(postal: P, store: HierarchyStore) -> Importer<P, MockGeocoder> {
        Importer::new(BatchOrchestrator::new(postal, geocoder(), config()), store).unwrap()
    }

    #[test]
    fn test_expand_ranges() {
        let pincodes = expand_ranges(&[
            PincodeRange::new(411003, 411005),
            PincodeRange::new(411001, 411004),
        ])
        .unwrap();
        assert_eq!(pincodes, vec![411001, 411002, 411003, 411004, 411005]);

        assert!(matches!(expand_ranges(&[]), Err(ImportError::EmptyRequest)));
        assert!(matches!(
            expand_ranges(&[PincodeRange::new(411010, 411001)]),
            Err(ImportError::InvalidRange { .. })
        ));
        assert!(matches!(
            expand_ranges(&[PincodeRange::new(41100, 411001)]),
            Err(ImportError::InvalidRange { .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_import_city_end_to_end() {
        let store = HierarchyStore::temporary().unwrap();
        let importer = importer(postal(), store.clone());

        let summary = importer.import_city(request()).await.unwrap();
        assert!(summary.success);
        assert_eq!(summary.summary.total_pincodes, 5);
        assert_eq!(summary.summary.successful_pincodes, 3);
        assert_eq!(summary.summary.failed_pincodes, 2);
        assert_eq!(summary.summary.areas_created, 3);
        assert_eq!(summary.summary.sub_areas_created, 4);
        assert_eq!(summary.summary.pincodes_created, 3);

        let job = importer
            .get_import_status(&summary.import_job_id)
            .unwrap()
            .unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.source, "mock");
        assert_eq!(job.progress.processed_pincodes, 5);
        assert_eq!(job.progress.successful_pincodes, 3);
        assert_eq!(job.progress.failed_pincodes, 2);
        assert_eq!(job.progress.percentage, 100);
        let failed: Vec<u32> = job.errors.iter().map(|f| f.pincode).collect();
        assert_eq!(failed, vec![411003, 411005]);
        assert_eq!(job.config.operator_id.as_deref(), Some("ops-1"));

        let city = store.get_city(&summary.city_id).unwrap().unwrap();
        assert_eq!(city.metadata.import_status, CityImportStatus::Completed);
        assert_eq!(city.metadata.total_pincodes, 3);
        assert_eq!(city.state.as_deref(), Some("Maharashtra"));
        assert_eq!(city.center.coordinates, [73.85, 18.52]);

        let camp = store.find_pincode(411001).unwrap().unwrap();
        assert_eq!(camp.coordinates.coordinates, [73.87, 18.51]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reimport_is_idempotent() {
        let store = HierarchyStore::temporary().unwrap();
        let importer = importer(postal(), store.clone());

        let first = importer.import_city(request()).await.unwrap();
        let areas = store.areas_for_city(&first.city_id).unwrap();
        let sub_areas = store.sub_areas_for_city(&first.city_id).unwrap();
        let pincodes = store.pincodes_for_city(&first.city_id).unwrap();

        let second = importer.import_city(request()).await.unwrap();
        assert_eq!(second.city_id, first.city_id);
        assert_ne!(second.import_job_id, first.import_job_id);
        assert_eq!(store.areas_for_city(&first.city_id).unwrap(), areas);
        assert_eq!(store.sub_areas_for_city(&first.city_id).unwrap(), sub_areas);
        assert_eq!(store.pincodes_for_city(&first.city_id).unwrap(), pincodes);
    }

    #[tokio::test(start_paused = true)]
    async fn test_same_city_is_rejected_while_running() {
        let store = HierarchyStore::temporary().unwrap();
        let importer = importer(postal(), store);

        let held = importer.claim("pune").unwrap();
        let err = importer.import_city(request()).await.unwrap_err();
        assert!(matches!(err, ImportError::AlreadyRunning(ref s) if s == "pune"));

        drop(held);
        assert!(importer.import_city(request()).await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_write_failure_fails_job() {
        let store = HierarchyStore::temporary().unwrap();

        // 411002 already belongs to another city
        let other = store
            .upsert_city_for_import("Khadki", "India", LatLng::new(18.56, 73.84), &[])
            .unwrap();
        let taken = Pincode {
            code: 411002,
            city_id: Some(other.id.clone()),
            area_ids: Vec::new(),
            coordinates: GeoPoint::UNKNOWN,
            is_serviceable: true,
            metadata: PincodeMetadata {
                district: "Pune".into(),
                state: "Maharashtra".into(),
                sub_area_count: 0,
                primary_area_name: String::new(),
            },
        };
        store
            .replace_city_hierarchy(
                &other.id,
                &HierarchySnapshot {
                    pincodes: vec![taken],
                    ..Default::default()
                },
            )
            .unwrap();

        let importer = importer(postal(), store.clone());
        let err = importer.import_city(request()).await.unwrap_err();
        assert!(matches!(
            err,
            ImportError::Store(StoreError::PincodeConflict { pincode: 411002, .. })
        ));

        let city = store.find_city_by_slug("pune").unwrap().unwrap();
        assert_eq!(city.metadata.import_status, CityImportStatus::Failed);
        let jobs = importer.tracker().jobs_for_city(&city.id).unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].status, JobStatus::Failed);
        assert!(jobs[0].error.as_deref().unwrap().contains("411002"));
        assert!(store.areas_for_city(&city.id).unwrap().is_empty());
    }

    /// Cancels the running Pune job when it sees `trigger`.
    struct CancelOn {
        inner: MockPostalIndex,
        trigger: u32,
        store: HierarchyStore,
        tracker: ImportJobTracker,
    }

    impl PostalIndex for CancelOn {
        fn source(&self) -> &'static str {
            "mock"
        }

        async fn fetch_postal_index(&self, pincode: u32) -> Option<Vec<PostOffice>> {
            if pincode == self.trigger {
                let city = self.store.find_city_by_slug("pune").unwrap().unwrap();
                for job in self.tracker.jobs_for_city(&city.id).unwrap() {
                    if !job.status.is_terminal() {
                        self.tracker.cancel(&job.id).unwrap();
                    }
                }
            }
            self.inner.fetch_postal_index(pincode).await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_stops_before_next_batch() {
        let store = HierarchyStore::temporary().unwrap();
        let inner = postal();
        let calls = inner.calls();
        let postal = CancelOn {
            inner,
            trigger: 411002,
            store: store.clone(),
            tracker: ImportJobTracker::open(store.db()).unwrap(),
        };
        let importer = importer(postal, store.clone());

        let err = importer.import_city(request()).await.unwrap_err();
        assert!(matches!(err, ImportError::Cancelled(_)));

        // only the first batch of two was fetched
        assert_eq!(calls.attempts(411001), 1);
        assert_eq!(calls.attempts(411002), 1);
        assert_eq!(calls.attempts(411003), 0);

        let city = store.find_city_by_slug("pune").unwrap().unwrap();
        assert_eq!(city.metadata.import_status, CityImportStatus::Failed);
        assert!(store.areas_for_city(&city.id).unwrap().is_empty());
        let jobs = importer.tracker().jobs_for_city(&city.id).unwrap();
        assert_eq!(jobs[0].status, JobStatus::Cancelled);
    }

    /// Create the city and job the way `import_city` does, without running.
    fn start<P: PostalIndex>(importer: &Importer<P, MockGeocoder>) -> (City, ImportJob, Vec<u32>) {
        let request = request();
        let pincodes = expand_ranges(&request.pincode_ranges).unwrap();
        let city = importer
            .store()
            .upsert_city_for_import("Pune", "India", request.center, &request.pincode_ranges)
            .unwrap();
        let job = importer
            .tracker()
            .create(
                &city.id,
                "mock",
                JobConfig {
                    city_name: request.city_name,
                    pincode_ranges: request.pincode_ranges,
                    batch_size: 2,
                    max_retries: 1,
                    operator_id: None,
                },
                pincodes.len(),
            )
            .unwrap();
        (city, job, pincodes)
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_after_last_report_drops_write() {
        let store = HierarchyStore::temporary().unwrap();
        let importer = importer(postal(), store.clone());
        let (city, job, pincodes) = start(&importer);

        let outcome = importer
            .orchestrator
            .fetch_pincodes_in_batches(&pincodes, &city.name, |report| {
                importer.report_batch(&job.id, report)
            })
            .await;
        assert!(!outcome.stopped);
        assert_eq!(outcome.found.len(), 3);

        importer.cancel_import(&job.id).unwrap();
        let err = importer
            .commit(&city, &job.id, pincodes.len(), &outcome, Instant::now())
            .unwrap_err();
        assert!(matches!(err, ImportError::Cancelled(ref id) if *id == job.id));

        assert!(store.areas_for_city(&city.id).unwrap().is_empty());
        assert!(store.find_pincode(411001).unwrap().is_none());
        let job = importer.get_import_status(&job.id).unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Cancelled);
        assert_eq!(job.results, ImportCounts::default());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_after_commit_is_rejected() {
        let store = HierarchyStore::temporary().unwrap();
        let importer = importer(postal(), store.clone());

        let summary = importer.import_city(request()).await.unwrap();
        let err = importer.cancel_import(&summary.import_job_id).unwrap_err();
        assert!(matches!(
            err,
            JobError::InvalidTransition {
                from: JobStatus::Completed,
                to: JobStatus::Cancelled,
                ..
            }
        ));

        let job = importer
            .get_import_status(&summary.import_job_id)
            .unwrap()
            .unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.results.areas_created, 3);
        assert!(job.duration_ms.is_some());
        assert!(matches!(
            importer.cancel_import("no-such-job"),
            Err(JobError::NotFound(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_all_miss_reimport_keeps_hierarchy() {
        let store = HierarchyStore::temporary().unwrap();
        let first = importer(postal(), store.clone())
            .import_city(request())
            .await
            .unwrap();
        let areas = store.areas_for_city(&first.city_id).unwrap();
        assert_eq!(areas.len(), 3);

        // postal index now knows none of the range
        let importer = importer(MockPostalIndex::new(), store.clone());
        let err = importer.import_city(request()).await.unwrap_err();
        assert!(matches!(err, ImportError::NoData(ref name) if name == "Pune"));

        assert_eq!(store.areas_for_city(&first.city_id).unwrap(), areas);
        assert!(store.find_pincode(411001).unwrap().is_some());
        let jobs = importer.tracker().jobs_for_city(&first.city_id).unwrap();
        assert_eq!(jobs.len(), 2);
        assert_eq!(jobs[1].status, JobStatus::Failed);
        let city = store.get_city(&first.city_id).unwrap().unwrap();
        assert_eq!(city.metadata.import_status, CityImportStatus::Failed);
        assert_eq!(city.metadata.total_pincodes, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_all_miss_first_import_completes_empty() {
        let store = HierarchyStore::temporary().unwrap();
        let importer = importer(MockPostalIndex::new(), store.clone());

        let summary = importer.import_city(request()).await.unwrap();
        assert_eq!(summary.summary.successful_pincodes, 0);
        assert_eq!(summary.summary.failed_pincodes, 5);
        assert_eq!(summary.summary.areas_created, 0);
    }

    #[test]
    fn test_request_accepts_center_pair() {
        let request: ImportRequest = serde_json::from_str(
            r#"{
                "city_name": "Pune",
                "pincode_ranges": [{"start": 411001, "end": 411005}],
                "centerCoordinate": [18.52, 73.85]
            }"#,
        )
        .unwrap();
        assert_eq!(request.center, LatLng::new(18.52, 73.85));
        assert_eq!(request.operator_id, None);

        let request: ImportRequest = serde_json::from_str(
            r#"{
                "city_name": "Pune",
                "pincode_ranges": [{"start": 411001, "end": 411005}],
                "center": {"lat": 18.52, "lng": 73.85}
            }"#,
        )
        .unwrap();
        assert_eq!(request.center, LatLng::new(18.52, 73.85));

        assert!(serde_json::from_str::<ImportRequest>(
            r#"{"city_name": "Pune", "pincode_ranges": [], "center": [18.52]}"#
        )
        .is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_center_is_rejected() {
        let store = HierarchyStore::temporary().unwrap();
        let importer = importer(postal(), store.clone());

        let err = importer
            .import_city(ImportRequest {
                center: LatLng::new(118.52, 73.85),
                ..request()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ImportError::InvalidCenter { lat, .. } if lat == 118.52));
        assert!(store.find_city_by_slug("pune").unwrap().is_none());
    }
}
