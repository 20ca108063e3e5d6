//! Import job state log.

use chrono::Utc;
use sled::{Db, Tree};
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::JobError;
use crate::models::{
    ImportCounts, ImportJob, JobConfig, JobProgress, JobStatus, PincodeFailure,
};
use crate::store::{decode, encode, IMPORT_JOBS};

/// Persists import jobs and enforces
/// `started -> processing -> {completed | failed | cancelled}`.
#[derive(Clone)]
pub struct ImportJobTracker {
    jobs: Tree,
}

impl ImportJobTracker {
    pub fn open(db: &Db) -> Result<Self, JobError> {
        Ok(Self {
            jobs: db.open_tree(IMPORT_JOBS)?,
        })
    }

    pub fn create(
        &self,
        city_id: &str,
        source: &str,
        config: JobConfig,
        total_pincodes: usize,
    ) -> Result<ImportJob, JobError> {
        let job = ImportJob {
            id: Uuid::new_v4().to_string(),
            city_id: city_id.to_string(),
            status: JobStatus::Started,
            source: source.to_string(),
            config,
            progress: JobProgress {
                total_pincodes,
                ..JobProgress::default()
            },
            results: ImportCounts::default(),
            errors: Vec::new(),
            error: None,
            started_at: Utc::now(),
            completed_at: None,
            duration_ms: None,
        };
        self.jobs
            .insert(job.id.as_bytes(), encode(IMPORT_JOBS, &job)?)?;
        info!(
            "Created import job {} for city {} ({} pincodes)",
            job.id, city_id, total_pincodes
        );
        Ok(job)
    }

    pub fn get(&self, job_id: &str) -> Result<Option<ImportJob>, JobError> {
        Ok(self
            .jobs
            .get(job_id.as_bytes())?
            .map(|raw| decode(IMPORT_JOBS, &raw))
            .transpose()?)
    }

    /// Jobs of a city, oldest first.
    pub fn jobs_for_city(&self, city_id: &str) -> Result<Vec<ImportJob>, JobError> {
        let mut jobs = Vec::new();
        for entry in self.jobs.iter() {
            let (_, raw) = entry?;
            let job: ImportJob = decode(IMPORT_JOBS, &raw)?;
            if job.city_id == city_id {
                jobs.push(job);
            }
        }
        jobs.sort_by_key(|j| j.started_at);
        Ok(jobs)
    }

    /// Record batch progress. Counters never move backwards.
    pub fn update_progress(
        &self,
        job_id: &str,
        processed: usize,
        successful: usize,
        percentage: u8,
    ) -> Result<ImportJob, JobError> {
        self.transition(job_id, JobStatus::Processing, |job| {
            let progress = &mut job.progress;
            progress.processed_pincodes = progress.processed_pincodes.max(processed);
            progress.successful_pincodes = progress.successful_pincodes.max(successful);
            progress.failed_pincodes = progress
                .processed_pincodes
                .saturating_sub(progress.successful_pincodes);
            progress.percentage = progress.percentage.max(percentage.min(100));
        })
    }

    /// Append per-pincode failures in the order given.
    pub fn record_failures(
        &self,
        job_id: &str,
        failures: &[PincodeFailure],
    ) -> Result<ImportJob, JobError> {
        self.transition(job_id, JobStatus::Processing, |job| {
            job.errors.extend_from_slice(failures);
        })
    }

    pub fn complete(
        &self,
        job_id: &str,
        results: ImportCounts,
        duration: Duration,
    ) -> Result<ImportJob, JobError> {
        let job = self.transition(job_id, JobStatus::Completed, |job| {
            job.results = results;
            job.completed_at = Some(Utc::now());
            job.duration_ms = Some(duration.as_millis() as u64);
        })?;
        info!(
            "Import job {} completed in {}ms: {} areas, {} sub-areas, {} pincodes",
            job.id,
            duration.as_millis(),
            results.areas_created,
            results.sub_areas_created,
            results.pincodes_created
        );
        Ok(job)
    }

    pub fn fail(&self, job_id: &str, error: &str) -> Result<ImportJob, JobError> {
        let job = self.transition(job_id, JobStatus::Failed, |job| {
            let now = Utc::now();
            job.error = Some(error.to_string());
            job.completed_at = Some(now);
            job.duration_ms = (now - job.started_at).num_milliseconds().try_into().ok();
        })?;
        warn!("Import job {} failed: {}", job.id, error);
        Ok(job)
    }

    /// Ask a running import to stop scheduling batches.
    ///
    /// In-flight provider calls still finish; the orchestrator notices the
    /// cancellation before it starts the next batch.
    pub fn cancel(&self, job_id: &str) -> Result<ImportJob, JobError> {
        let job = self.transition(job_id, JobStatus::Cancelled, |job| {
            let now = Utc::now();
            job.completed_at = Some(now);
            job.duration_ms = (now - job.started_at).num_milliseconds().try_into().ok();
        })?;
        info!("Import job {} cancelled", job.id);
        Ok(job)
    }

    fn transition<F>(&self, job_id: &str, to: JobStatus, apply: F) -> Result<ImportJob, JobError>
    where
        F: Fn(&mut ImportJob),
    {
        loop {
            let old = self
                .jobs
                .get(job_id.as_bytes())?
                .ok_or_else(|| JobError::NotFound(job_id.to_string()))?;
            let mut job: ImportJob = decode(IMPORT_JOBS, &old)?;

            if !job.status.can_transition_to(to) {
                return Err(JobError::InvalidTransition {
                    id: job_id.to_string(),
                    from: job.status,
                    to,
                });
            }
            job.status = to;
            apply(&mut job);

            let new = encode(IMPORT_JOBS, &job)?;
            match self
                .jobs
                .compare_and_swap(job_id.as_bytes(), Some(old), Some(new))?
            {
                Ok(()) => return Ok(job),
                Err(_) => debug!("Concurrent update on job {}, retrying", job_id),
            }
        }
    }
}
