use axum::{
    Json,
    body::Bytes,
    extract::{Path, Query, State},
    http::{StatusCode, header},
    response::IntoResponse,
};
use chrono::{Duration, Utc};
use tracing::{error, info};
use uuid::Uuid;

use super::{
    error::ApiError,
    models::{HealthResponse, LogsQuery, SyncAcceptedResponse, SyncRequestBody},
    state::AppState,
    validation::validate_sync_body,
};
use crate::cities::CityDraft;
use crate::observability::tail_log;
use crate::progress::{ProgressTracker, SyncProgress};
use crate::sync::{SyncError, chunk_dates};

/// Health check endpoint (GET /health)
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let response = HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        metrics: state.metrics.snapshot(),
    };

    (StatusCode::OK, Json(response))
}

/// GET /cities
pub async fn list_cities(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let cities = state.cities.list().await?;
    Ok(Json(cities))
}

/// GET /cities/{city_id}
pub async fn get_city(
    State(state): State<AppState>,
    Path(city_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let city = state
        .cities
        .get(&city_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("city {city_id}")))?;

    Ok(Json(city))
}

/// POST /cities
///
/// The body is parsed by hand so malformed JSON gets the same
/// `{code, message}` error shape as every other failure.
pub async fn create_city(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let draft: CityDraft = serde_json::from_slice(&body)?;
    let city = state.cities.create(draft).await?;

    info!(city_id = %city.city_id, city = %city.label(), "City created");
    Ok((StatusCode::CREATED, Json(city)))
}

/// PUT /cities/{city_id}
pub async fn update_city(
    State(state): State<AppState>,
    Path(city_id): Path<String>,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let draft: CityDraft = serde_json::from_slice(&body)?;
    let city = state.cities.update(&city_id, draft).await?;

    info!(city_id = %city.city_id, city = %city.label(), "City updated");
    Ok(Json(city))
}

/// DELETE /cities/{city_id}
pub async fn delete_city(
    State(state): State<AppState>,
    Path(city_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let city = state.cities.delete(&city_id).await?;

    info!(city_id = %city.city_id, city = %city.label(), "City deleted");
    Ok(Json(city))
}

/// Ad-hoc sync of one city (POST /cities/{city_id}/sync)
///
/// Everything that can be rejected up front is checked here: the city's
/// area of interest, the dates, the target and the number of vendor jobs
/// the range needs. The sync itself runs in the background; progress is
/// visible under `/syncs/{sync_id}`.
pub async fn start_sync(
    State(state): State<AppState>,
    Path(city_id): Path<String>,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let city = state
        .cities
        .get(&city_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("city {city_id}")))?;
    city.validate()?;

    let request: SyncRequestBody = serde_json::from_slice(&body)?;
    let (range, target) = validate_sync_body(&request, &state.config)?;

    let settings = state.orchestrator.settings();
    let chunks = chunk_dates(range, settings.max_days_per_request).len();
    if chunks > settings.max_single_city_chunks {
        return Err(SyncError::TooManyChunks {
            chunks,
            max: settings.max_single_city_chunks,
        }
        .into());
    }

    let sync_id = Uuid::now_v7().to_string();
    let tracker = ProgressTracker::new(
        state.progress.clone(),
        SyncProgress::new(sync_id.clone(), city.label(), range),
    );

    info!(
        sync_id = %sync_id,
        city = %city.label(),
        range = %range,
        endpoint = %target.endpoint,
        schema = %target.schema,
        "Starting background sync"
    );

    let orchestrator = state.orchestrator.clone();
    tokio::spawn(async move {
        match orchestrator.sync_city(&city, range, &target, &tracker).await {
            Ok(outcome) => {
                info!(sync_id = %tracker.sync_id(), city = %city.label(), "{}", outcome.summary());
            }
            Err(e) => {
                error!(sync_id = %tracker.sync_id(), city = %city.label(), error = %e, "Sync failed");
            }
        }
    });

    Ok((StatusCode::ACCEPTED, Json(SyncAcceptedResponse { sync_id })))
}

/// GET /syncs: syncs started within the configured window, newest first
pub async fn list_syncs(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let window = Duration::days(i64::from(state.config.server.syncs_window_days));
    let cutoff = Utc::now() - window;

    let syncs: Vec<SyncProgress> = state
        .progress
        .list()?
        .into_iter()
        .filter(|entry| entry.started_at >= cutoff)
        .collect();

    Ok(Json(syncs))
}

/// GET /syncs/{sync_id}
pub async fn get_sync(
    State(state): State<AppState>,
    Path(sync_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let progress = state
        .progress
        .get(&sync_id)?
        .ok_or_else(|| ApiError::NotFound(format!("sync {sync_id}")))?;

    Ok(Json(progress))
}

/// GET /logs?lines=N: tail of the log file as plain text
pub async fn logs(
    State(state): State<AppState>,
    Query(query): Query<LogsQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let path = state.log_file();
    let lines = tokio::task::spawn_blocking(move || tail_log(&path, query.lines))
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?
        .map_err(|e| ApiError::Internal(format!("failed to read log file: {e}")))?;

    let mut body = lines.join("\n");
    if !body.is_empty() {
        body.push('\n');
    }

    Ok(([(header::CONTENT_TYPE, "text/plain; charset=utf-8")], body))
}
