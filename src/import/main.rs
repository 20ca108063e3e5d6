//! Import pipeline CLI.
//!
//! Imports a city's pincode ranges into the local hierarchy store, shows
//! import job records and checks pincode serviceability.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use pinmap::models::{ImportJob, LatLng, PincodeRange};
use pinmap::pipeline::{ImportJobTracker, ImportRequest, LiveImporter};
use pinmap::providers::MemoryCache;
use pinmap::slug::slugify;
use pinmap::{Config, HierarchyStore, ServiceabilityResolver};

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

#[derive(Parser, Debug)]
#[command(name = "import")]
#[command(about = "Import city location hierarchies from postal data")]
struct Args {
    /// TOML config file (built-in defaults when omitted)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Import a city and wait for it to finish
    Run {
        /// City name
        #[arg(long)]
        city: String,

        /// Inclusive pincode range, e.g. 411001-411062 (repeatable)
        #[arg(long = "range", required = true, value_parser = parse_range)]
        ranges: Vec<PincodeRange>,

        /// City center as lat,lng
        #[arg(long, value_parser = parse_center)]
        center: LatLng,

        /// Operator recorded on the import job
        #[arg(long)]
        operator: Option<String>,
    },

    /// Print an import job as JSON
    Status { job_id: String },

    /// Check whether a pincode is serviceable
    Check {
        pincode: String,

        /// Area name hint
        #[arg(long)]
        area: Option<String>,
    },
}

fn parse_range(s: &str) -> Result<PincodeRange, String> {
    let (start, end) = s
        .split_once('-')
        .ok_or_else(|| format!("expected START-END, got '{}'", s))?;
    let start = start.trim().parse().map_err(|_| format!("bad pincode '{}'", start))?;
    let end = end.trim().parse().map_err(|_| format!("bad pincode '{}'", end))?;
    Ok(PincodeRange::new(start, end))
}

fn parse_center(s: &str) -> Result<LatLng, String> {
    let (lat, lng) = s
        .split_once(',')
        .ok_or_else(|| format!("expected LAT,LNG, got '{}'", s))?;
    let lat = lat.trim().parse().map_err(|_| format!("bad latitude '{}'", lat))?;
    let lng = lng.trim().parse().map_err(|_| format!("bad longitude '{}'", lng))?;
    let point = LatLng::new(lat, lng);
    if !point.is_valid() {
        return Err(format!("coordinate out of range: {}", s));
    }
    Ok(point)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let args = Args::parse();

    let config = match &args.config {
        Some(path) => Config::load_from_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => Config::default(),
    };

    let store = HierarchyStore::open(&config.global.db_path).with_context(|| {
        format!(
            "Failed to open hierarchy store at {}",
            config.global.db_path.display()
        )
    })?;

    match args.command {
        Command::Run {
            city,
            ranges,
            center,
            operator,
        } => {
            let request = ImportRequest {
                city_name: city,
                pincode_ranges: ranges,
                center,
                operator_id: operator,
            };
            run_import(&config, store, request).await
        }
        Command::Status { job_id } => {
            let tracker = ImportJobTracker::open(store.db())?;
            let job = tracker
                .get(&job_id)?
                .with_context(|| format!("Import job {} not found", job_id))?;
            println!("{}", serde_json::to_string_pretty(&job)?);
            Ok(())
        }
        Command::Check { pincode, area } => {
            let resolver = ServiceabilityResolver::new(store);
            let result = resolver.check_serviceability(Some(&pincode), area.as_deref())?;
            println!("{}", serde_json::to_string_pretty(&result)?);
            Ok(())
        }
    }
}

async fn run_import(config: &Config, store: HierarchyStore, request: ImportRequest) -> Result<()> {
    let cache = Arc::new(MemoryCache::with_capacity(config.cache.max_entries));
    let importer = Arc::new(LiveImporter::from_config(config, store, cache)?);

    info!(
        "Importing {} ({})",
        request.city_name,
        request
            .pincode_ranges
            .iter()
            .map(|r| r.to_string())
            .collect::<Vec<_>>()
            .join(", ")
    );

    let slug = slugify(&request.city_name);
    let launched = Utc::now();

    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")?
            .progress_chars("#>-"),
    );

    let mut task = {
        let importer = importer.clone();
        tokio::spawn(async move { importer.import_city(request).await })
    };

    let mut ticker = tokio::time::interval(Duration::from_millis(500));
    let outcome = loop {
        tokio::select! {
            joined = &mut task => break joined.context("Import task panicked")?,
            _ = ticker.tick() => {
                if let Some(job) = current_job(&importer, &slug, launched)? {
                    pb.set_length(job.progress.total_pincodes as u64);
                    pb.set_position(job.progress.processed_pincodes as u64);
                    pb.set_message(format!(
                        "{} ({} missing)",
                        job.status, job.progress.failed_pincodes
                    ));
                }
            }
        }
    };
    pb.finish_and_clear();

    let summary = outcome?;
    info!(
        "Import finished: {}/{} pincodes found, {} areas in {}ms",
        summary.summary.successful_pincodes,
        summary.summary.total_pincodes,
        summary.summary.areas_created,
        summary.summary.duration_ms
    );
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

/// The job started by this run, once the importer has created it.
fn current_job(
    importer: &LiveImporter,
    slug: &str,
    launched: DateTime<Utc>,
) -> Result<Option<ImportJob>> {
    let Some(city) = importer.store().find_city_by_slug(slug)? else {
        return Ok(None);
    };
    let jobs = importer.tracker().jobs_for_city(&city.id)?;
    Ok(jobs.into_iter().rev().find(|j| j.started_at >= launched))
}
