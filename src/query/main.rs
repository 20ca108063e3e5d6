//! Query server for serviceability lookups.
//!
//! Provides an HTTP API for pincode and coordinate serviceability checks and
//! for triggering and inspecting city imports.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use clap::Parser;
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use pinmap::error::{ImportError, JobError, ResolveError, StoreError};
use pinmap::models::ImportJob;
use pinmap::pipeline::{ImportRequest, ImportSummary, LiveImporter};
use pinmap::providers::{CacheStore, CachedGeocoder, MemoryCache, NominatimClient};
use pinmap::{Config, HierarchyStore, LocationResolver, ServiceabilityResolver, ServiceabilityResult};

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

#[derive(Parser, Debug)]
#[command(name = "query")]
#[command(about = "Serviceability query server")]
struct Args {
    /// TOML config file (built-in defaults when omitted)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Listen address, overrides the config
    #[arg(short, long)]
    listen: Option<String>,
}

/// Application state shared across handlers
struct AppState {
    store: HierarchyStore,
    importer: LiveImporter,
    resolver: ServiceabilityResolver,
    locator: LocationResolver<CachedGeocoder<NominatimClient>>,
}

type ApiError = (StatusCode, String);

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let args = Args::parse();

    let config = match &args.config {
        Some(path) => Config::load_from_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => Config::default(),
    };
    let listen = args.listen.unwrap_or_else(|| config.global.listen.clone());

    info!("Pinmap Query Server");
    info!("Opening hierarchy store at {}", config.global.db_path.display());
    let store = HierarchyStore::open(&config.global.db_path)
        .context("Failed to open hierarchy store")?;
    let app = router(Arc::new(build_state(&config, store)?));

    info!("Starting server on {}", listen);

    let listener = tokio::net::TcpListener::bind(&listen).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn build_state(config: &Config, store: HierarchyStore) -> Result<AppState> {
    // Both geocoders share one cache
    let cache: Arc<dyn CacheStore> =
        Arc::new(MemoryCache::with_capacity(config.cache.max_entries));
    let importer = LiveImporter::from_config(config, store.clone(), cache.clone())?;
    let nominatim = NominatimClient::new(
        &config.providers.geocoder_url,
        &config.providers.user_agent,
        config.providers.geocoder_timeout(),
    )?;
    let resolver = ServiceabilityResolver::new(store.clone());
    let locator = LocationResolver::new(
        CachedGeocoder::new(nominatim, cache, config.cache.ttl()),
        resolver.clone(),
    );

    Ok(AppState {
        store,
        importer,
        resolver,
        locator,
    })
}

fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/v1/serviceability", get(serviceability_handler))
        .route("/v1/locate", get(locate_handler))
        .route("/v1/imports", post(import_handler))
        .route("/v1/imports/{job_id}", get(import_status_handler))
        .route("/v1/imports/{job_id}/cancel", post(cancel_handler))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    store: bool,
}

/// Health check endpoint
async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let healthy = state.store.db().size_on_disk().is_ok();
    Json(HealthResponse {
        status: if healthy { "ok" } else { "degraded" },
        store: healthy,
    })
}

#[derive(Deserialize)]
struct ServiceabilityParams {
    pincode: Option<String>,
    area: Option<String>,
}

fn resolve_error(e: ResolveError) -> ApiError {
    match e {
        ResolveError::Store(e) => {
            error!("Serviceability lookup failed: {}", e);
            (StatusCode::SERVICE_UNAVAILABLE, e.to_string())
        }
        e @ ResolveError::AddressUnavailable { .. } => {
            (StatusCode::UNPROCESSABLE_ENTITY, e.to_string())
        }
    }
}

async fn serviceability_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ServiceabilityParams>,
) -> Result<Json<ServiceabilityResult>, ApiError> {
    state
        .resolver
        .check_serviceability(params.pincode.as_deref(), params.area.as_deref())
        .map(Json)
        .map_err(resolve_error)
}

#[derive(Deserialize)]
struct LocateParams {
    lat: f64,
    lng: f64,
}

async fn locate_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<LocateParams>,
) -> Result<Json<ServiceabilityResult>, ApiError> {
    state
        .locator
        .locate(params.lat, params.lng)
        .await
        .map(Json)
        .map_err(resolve_error)
}

fn store_status(e: &StoreError) -> StatusCode {
    match e {
        StoreError::PincodeConflict { .. } | StoreError::JobClosed { .. } => StatusCode::CONFLICT,
        StoreError::CityNotFound(_) | StoreError::JobNotFound(_) => StatusCode::NOT_FOUND,
        _ => StatusCode::SERVICE_UNAVAILABLE,
    }
}

fn job_status(e: &JobError) -> StatusCode {
    match e {
        JobError::NotFound(_) => StatusCode::NOT_FOUND,
        JobError::InvalidTransition { .. } => StatusCode::CONFLICT,
        JobError::Store(e) => store_status(e),
    }
}

/// Synchronous import: responds once the run has finished.
async fn import_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ImportRequest>,
) -> Result<Json<ImportSummary>, ApiError> {
    state.importer.import_city(request).await.map(Json).map_err(|e| {
        let status = match &e {
            ImportError::EmptyRequest
            | ImportError::InvalidCityName(_)
            | ImportError::InvalidRange { .. }
            | ImportError::InvalidCenter { .. } => StatusCode::BAD_REQUEST,
            ImportError::AlreadyRunning(_) | ImportError::Cancelled(_) => StatusCode::CONFLICT,
            ImportError::NoData(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ImportError::Provider(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ImportError::Store(e) => store_status(e),
            ImportError::Job(e) => job_status(e),
        };
        warn!("Import request rejected ({}): {}", status, e);
        (status, e.to_string())
    })
}

async fn import_status_handler(
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<String>,
) -> Result<Json<ImportJob>, ApiError> {
    match state.importer.get_import_status(&job_id) {
        Ok(Some(job)) => Ok(Json(job)),
        Ok(None) => Err((
            StatusCode::NOT_FOUND,
            format!("import job {} not found", job_id),
        )),
        Err(e) => {
            error!("Job lookup failed: {}", e);
            Err((job_status(&e), e.to_string()))
        }
    }
}

async fn cancel_handler(
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<String>,
) -> Result<Json<ImportJob>, ApiError> {
    state.importer.cancel_import(&job_id).map(Json).map_err(|e| {
        let status = job_status(&e);
        warn!("Cancel of import job {} rejected ({}): {}", job_id, status, e);
        (status, e.to_string())
    })
}
