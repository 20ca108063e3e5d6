//! Persisted location hierarchy backed by sled.
//!
//! Trees:
//! - `cities`: city id → City
//! - `city_slugs`: slug → city id
//! - `areas`, `sub_areas`: `{city_id}/{id}` → record
//! - `pincodes`: big-endian u32 → Pincode
//! - `import_jobs`: job id → ImportJob (owned by `pipeline::ImportJobTracker`)
//!
//! Records are stored as JSON.

use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Serialize;
use sled::transaction::{ConflictableTransactionError, TransactionError, TransactionResult};
use sled::{Db, IVec, Transactional, Tree};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::StoreError;
use crate::models::{
    Area, City, CityImportStatus, CityMetadata, GeoPoint, ImportCounts, ImportJob, JobStatus,
    LatLng, Pincode, PincodeRange, SubArea,
};
use crate::slug::slugify;

const CITIES: &str = "cities";
const CITY_SLUGS: &str = "city_slugs";
const AREAS: &str = "areas";
const SUB_AREAS: &str = "sub_areas";
const PINCODES: &str = "pincodes";
pub(crate) const IMPORT_JOBS: &str = "import_jobs";

/// Full replacement write-set for one city.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HierarchySnapshot {
    pub areas: Vec<Area>,
    pub sub_areas: Vec<SubArea>,
    pub pincodes: Vec<Pincode>,
    /// State reported by the postal index, copied onto the city
    pub state: Option<String>,
}

#[derive(Clone)]
pub struct HierarchyStore {
    db: Db,
    cities: Tree,
    city_slugs: Tree,
    areas: Tree,
    sub_areas: Tree,
    pincodes: Tree,
    jobs: Tree,
}

pub(crate) fn encode<T: Serialize>(tree: &'static str, value: &T) -> Result<Vec<u8>, StoreError> {
    serde_json::to_vec(value).map_err(|source| StoreError::Encode { tree, source })
}

pub(crate) fn decode<T: DeserializeOwned>(tree: &'static str, bytes: &[u8]) -> Result<T, StoreError> {
    serde_json::from_slice(bytes).map_err(|source| StoreError::Decode { tree, source })
}

fn child_key(city_id: &str, id: &str) -> Vec<u8> {
    format!("{}/{}", city_id, id).into_bytes()
}

fn city_prefix(city_id: &str) -> Vec<u8> {
    format!("{}/", city_id).into_bytes()
}

fn pincode_key(code: u32) -> [u8; 4] {
    code.to_be_bytes()
}

impl HierarchyStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        info!("Opening hierarchy store at {}", path.as_ref().display());
        let db = sled::open(path)?;
        Self::from_db(db)
    }

    /// In-memory store, removed when dropped
    pub fn temporary() -> Result<Self, StoreError> {
        let db = sled::Config::new().temporary(true).open()?;
        Self::from_db(db)
    }

    pub fn from_db(db: Db) -> Result<Self, StoreError> {
        Ok(Self {
            cities: db.open_tree(CITIES)?,
            city_slugs: db.open_tree(CITY_SLUGS)?,
            areas: db.open_tree(AREAS)?,
            sub_areas: db.open_tree(SUB_AREAS)?,
            pincodes: db.open_tree(PINCODES)?,
            jobs: db.open_tree(IMPORT_JOBS)?,
            db,
        })
    }

    pub fn db(&self) -> &Db {
        &self.db
    }

    /// Create the city or refresh its import inputs, keyed by slug.
    ///
    /// The city id survives re-imports. The city is left in `Processing`.
    pub fn upsert_city_for_import(
        &self,
        name: &str,
        country: &str,
        center: LatLng,
        ranges: &[PincodeRange],
    ) -> Result<City, StoreError> {
        let slug = slugify(name);

        let existing = match self.city_slugs.get(slug.as_bytes())? {
            Some(id) => self.get_city(&String::from_utf8_lossy(&id))?,
            None => None,
        };

        let city = match existing {
            Some(mut city) => {
                city.name = name.to_string();
                city.center = GeoPoint::from(center);
                city.pincode_ranges = ranges.to_vec();
                city.metadata.import_status = CityImportStatus::Processing;
                city
            }
            None => City {
                id: Uuid::new_v4().to_string(),
                name: name.to_string(),
                slug: slug.clone(),
                state: None,
                country: country.to_string(),
                center: GeoPoint::from(center),
                pincode_ranges: ranges.to_vec(),
                metadata: CityMetadata {
                    import_status: CityImportStatus::Processing,
                    ..CityMetadata::default()
                },
                is_active: true,
            },
        };

        let bytes = encode(CITIES, &city)?;
        let result: TransactionResult<(), StoreError> = (&self.cities, &self.city_slugs)
            .transaction(|(cities, slugs)| {
                cities.insert(city.id.as_bytes(), bytes.as_slice())?;
                slugs.insert(city.slug.as_bytes(), city.id.as_bytes())?;
                Ok(())
            });
        result.map_err(flatten)?;

        debug!("Upserted city {} ({})", city.slug, city.id);
        Ok(city)
    }

    pub fn get_city(&self, city_id: &str) -> Result<Option<City>, StoreError> {
        self.cities
            .get(city_id.as_bytes())?
            .map(|raw| decode(CITIES, &raw))
            .transpose()
    }

    pub fn find_city_by_slug(&self, slug: &str) -> Result<Option<City>, StoreError> {
        match self.city_slugs.get(slug.as_bytes())? {
            Some(id) => self.get_city(&String::from_utf8_lossy(&id)),
            None => Ok(None),
        }
    }

    fn update_city<F>(&self, city_id: &str, f: F) -> Result<City, StoreError>
    where
        F: Fn(&mut City),
    {
        loop {
            let old = self
                .cities
                .get(city_id.as_bytes())?
                .ok_or_else(|| StoreError::CityNotFound(city_id.to_string()))?;
            let mut city: City = decode(CITIES, &old)?;
            f(&mut city);
            let new = encode(CITIES, &city)?;
            if self
                .cities
                .compare_and_swap(city_id.as_bytes(), Some(old), Some(new))?
                .is_ok()
            {
                return Ok(city);
            }
        }
    }

    pub fn set_city_import_status(
        &self,
        city_id: &str,
        status: CityImportStatus,
    ) -> Result<City, StoreError> {
        self.update_city(city_id, |city| city.metadata.import_status = status)
    }

    /// Operator activation switch. Not consulted by serviceability checks.
    pub fn set_city_active(&self, city_id: &str, active: bool) -> Result<City, StoreError> {
        self.update_city(city_id, |city| city.is_active = active)
    }

    pub fn find_pincode(&self, code: u32) -> Result<Option<Pincode>, StoreError> {
        self.pincodes
            .get(pincode_key(code))?
            .map(|raw| decode(PINCODES, &raw))
            .transpose()
    }

    pub fn get_area(&self, city_id: &str, area_id: &str) -> Result<Option<Area>, StoreError> {
        self.areas
            .get(child_key(city_id, area_id))?
            .map(|raw| decode(AREAS, &raw))
            .transpose()
    }

    /// Areas of a city ordered by pincode, then name.
    pub fn areas_for_city(&self, city_id: &str) -> Result<Vec<Area>, StoreError> {
        let mut areas: Vec<Area> = scan(&self.areas, AREAS, &city_prefix(city_id))?;
        areas.sort_by(|a, b| a.pincode.cmp(&b.pincode).then_with(|| a.name.cmp(&b.name)));
        Ok(areas)
    }

    /// Sub-areas of a city ordered by pincode, then slug.
    pub fn sub_areas_for_city(&self, city_id: &str) -> Result<Vec<SubArea>, StoreError> {
        let mut subs: Vec<SubArea> = scan(&self.sub_areas, SUB_AREAS, &city_prefix(city_id))?;
        subs.sort_by(|a, b| a.pincode.cmp(&b.pincode).then_with(|| a.slug.cmp(&b.slug)));
        Ok(subs)
    }

    /// Pincodes owned by a city, ascending.
    pub fn pincodes_for_city(&self, city_id: &str) -> Result<Vec<Pincode>, StoreError> {
        Ok(self
            .pincode_entries()?
            .into_iter()
            .filter(|(_, p)| p.city_id.as_deref() == Some(city_id))
            .map(|(_, p)| p)
            .collect())
    }

    fn pincode_entries(&self) -> Result<Vec<(IVec, Pincode)>, StoreError> {
        self.pincodes
            .iter()
            .map(|entry| -> Result<_, StoreError> {
                let (key, raw) = entry?;
                Ok((key, decode(PINCODES, &raw)?))
            })
            .collect()
    }

    /// Replace the city's areas, sub-areas and pincodes with `snapshot`.
    ///
    /// Deletes and inserts run in one transaction together with the city
    /// metadata update, so readers see either the old or the new hierarchy.
    /// A pincode owned by another city aborts the whole replace.
    pub fn replace_city_hierarchy(
        &self,
        city_id: &str,
        snapshot: &HierarchySnapshot,
    ) -> Result<ImportCounts, StoreError> {
        self.replace(city_id, snapshot, None).map(|(counts, _)| counts)
    }

    /// Like `replace_city_hierarchy`, and completes the import job in the
    /// same transaction.
    ///
    /// A job that is no longer running (for instance cancelled while the
    /// snapshot was being built) aborts the replace with
    /// `StoreError::JobClosed`; nothing is written.
    pub fn replace_city_hierarchy_for_job(
        &self,
        city_id: &str,
        snapshot: &HierarchySnapshot,
        job_id: &str,
        duration: Duration,
    ) -> Result<(ImportCounts, ImportJob), StoreError> {
        let (counts, job) = self.replace(city_id, snapshot, Some((job_id, duration)))?;
        let job = job.ok_or_else(|| StoreError::JobNotFound(job_id.to_string()))?;
        Ok((counts, job))
    }

    fn replace(
        &self,
        city_id: &str,
        snapshot: &HierarchySnapshot,
        job: Option<(&str, Duration)>,
    ) -> Result<(ImportCounts, Option<ImportJob>), StoreError> {
        let prefix = city_prefix(city_id);
        let stale_areas: Vec<IVec> = self
            .areas
            .scan_prefix(&prefix)
            .keys()
            .collect::<Result<_, _>>()?;
        let stale_sub_areas: Vec<IVec> = self
            .sub_areas
            .scan_prefix(&prefix)
            .keys()
            .collect::<Result<_, _>>()?;
        let stale_pincodes: Vec<IVec> = self
            .pincode_entries()?
            .into_iter()
            .filter(|(_, p)| p.city_id.as_deref() == Some(city_id))
            .map(|(key, _)| key)
            .collect();

        let areas = snapshot
            .areas
            .iter()
            .map(|a| -> Result<_, StoreError> { Ok((child_key(city_id, &a.id), encode(AREAS, a)?)) })
            .collect::<Result<Vec<_>, StoreError>>()?;
        let sub_areas = snapshot
            .sub_areas
            .iter()
            .map(|s| -> Result<_, StoreError> { Ok((child_key(city_id, &s.id), encode(SUB_AREAS, s)?)) })
            .collect::<Result<Vec<_>, StoreError>>()?;
        let pincodes = snapshot
            .pincodes
            .iter()
            .map(|p| -> Result<_, StoreError> { Ok((p.code, encode(PINCODES, p)?)) })
            .collect::<Result<Vec<_>, StoreError>>()?;

        let counts = ImportCounts {
            areas_created: areas.len(),
            sub_areas_created: sub_areas.len(),
            pincodes_created: pincodes.len(),
        };
        let imported_at = Utc::now();

        let result: TransactionResult<Option<ImportJob>, StoreError> = (
            &self.cities,
            &self.areas,
            &self.sub_areas,
            &self.pincodes,
            &self.jobs,
        )
            .transaction(
                |(cities, areas_tx, sub_areas_tx, pincodes_tx, jobs_tx)| {
                    let finished = match job {
                        Some((job_id, duration)) => {
                            let raw = jobs_tx.get(job_id.as_bytes())?.ok_or_else(|| {
                                ConflictableTransactionError::Abort(StoreError::JobNotFound(
                                    job_id.to_string(),
                                ))
                            })?;
                            let mut job: ImportJob = decode(IMPORT_JOBS, &raw)
                                .map_err(ConflictableTransactionError::Abort)?;
                            if !job.status.can_transition_to(JobStatus::Completed) {
                                return Err(ConflictableTransactionError::Abort(
                                    StoreError::JobClosed {
                                        id: job_id.to_string(),
                                        status: job.status,
                                    },
                                ));
                            }
                            job.status = JobStatus::Completed;
                            job.results = counts;
                            job.completed_at = Some(imported_at);
                            job.duration_ms = Some(duration.as_millis() as u64);
                            let bytes = encode(IMPORT_JOBS, &job)
                                .map_err(ConflictableTransactionError::Abort)?;
                            jobs_tx.insert(job_id.as_bytes(), bytes)?;
                            Some(job)
                        }
                        None => None,
                    };

                    let raw = cities.get(city_id.as_bytes())?.ok_or_else(|| {
                        ConflictableTransactionError::Abort(StoreError::CityNotFound(
                            city_id.to_string(),
                        ))
                    })?;
                    let mut city: City =
                        decode(CITIES, &raw).map_err(ConflictableTransactionError::Abort)?;

                    for key in &stale_areas {
                        areas_tx.remove(key.clone())?;
                    }
                    for (key, value) in &areas {
                        areas_tx.insert(key.as_slice(), value.as_slice())?;
                    }

                    for key in &stale_sub_areas {
                        sub_areas_tx.remove(key.clone())?;
                    }
                    for (key, value) in &sub_areas {
                        sub_areas_tx.insert(key.as_slice(), value.as_slice())?;
                    }

                    for key in &stale_pincodes {
                        pincodes_tx.remove(key.clone())?;
                    }
                    for (code, value) in &pincodes {
                        let key = pincode_key(*code);
                        if let Some(existing) = pincodes_tx.get(&key[..])? {
                            let existing: Pincode = decode(PINCODES, &existing)
                                .map_err(ConflictableTransactionError::Abort)?;
                            if let Some(owner) = existing.city_id.filter(|o| o != city_id) {
                                return Err(ConflictableTransactionError::Abort(
                                    StoreError::PincodeConflict {
                                        pincode: *code,
                                        owner,
                                    },
                                ));
                            }
                        }
                        pincodes_tx.insert(&key[..], value.as_slice())?;
                    }

                    if snapshot.state.is_some() {
                        city.state = snapshot.state.clone();
                    }
                    city.metadata.total_areas = counts.areas_created;
                    city.metadata.total_sub_areas = counts.sub_areas_created;
                    city.metadata.total_pincodes = counts.pincodes_created;
                    city.metadata.last_imported_at = Some(imported_at);
                    city.metadata.import_status = CityImportStatus::Completed;
                    let bytes = encode(CITIES, &city).map_err(ConflictableTransactionError::Abort)?;
                    cities.insert(city_id.as_bytes(), bytes)?;

                    Ok(finished)
                },
            );
        let finished = result.map_err(flatten)?;

        info!(
            "Replaced hierarchy for city {}: {} areas, {} sub-areas, {} pincodes (removed {}/{}/{})",
            city_id,
            counts.areas_created,
            counts.sub_areas_created,
            counts.pincodes_created,
            stale_areas.len(),
            stale_sub_areas.len(),
            stale_pincodes.len()
        );
        Ok((counts, finished))
    }
}

fn scan<T: DeserializeOwned>(
    tree: &Tree,
    name: &'static str,
    prefix: &[u8],
) -> Result<Vec<T>, StoreError> {
    tree.scan_prefix(prefix)
        .values()
        .map(|raw| decode(name, &raw?))
        .collect()
}

fn flatten(e: TransactionError<StoreError>) -> StoreError {
    match e {
        TransactionError::Abort(e) => e,
        TransactionError::Storage(e) => StoreError::Sled(e),
    }
}
