//! HTTP request handlers
//!
//! Thin adapters from JSON bodies to `PlaybackEngine` and
//! `DownloadRegistry` calls.

use crate::api::server::AppContext;
use crate::db::library::DownloadData;
use crate::error::Error;
use crate::library::{LibraryEntry, RemoveOutcome};
use crate::playback::{PlayOptions, PlaybackStatus, QueueEntry, QueueTarget};
use axum::{extract::State, http::StatusCode, Json};
use cadence_common::transport::PlayerCommand;
use cadence_common::{MediaItem, MediaRef, QualityKey};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    status: String,
    module: String,
    version: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: String,
}

#[derive(Debug, Serialize)]
pub struct QueueResponse {
    queue: Vec<QueueEntry>,
}

#[derive(Debug, Deserialize)]
pub struct PlayRequest {
    item: MediaItem,
    #[serde(default)]
    options: PlayOptions,
}

#[derive(Debug, Deserialize)]
pub struct ReplaceQueueRequest {
    items: Vec<MediaItem>,
    #[serde(default)]
    start: Option<MediaItem>,
}

#[derive(Debug, Deserialize)]
pub struct AddNextRequest {
    items: Vec<MediaItem>,
}

#[derive(Debug, Deserialize)]
pub struct RemoveRequest {
    target: QueueTarget,
}

#[derive(Debug, Serialize)]
pub struct RemoveResponse {
    removed: bool,
}

#[derive(Debug, Deserialize)]
pub struct SeekRequest {
    position: f64,
}

#[derive(Debug, Deserialize)]
pub struct VolumeRequest {
    volume: f32,
}

#[derive(Debug, Deserialize)]
pub struct SpeedRequest {
    speed: f32,
}

#[derive(Debug, Deserialize)]
pub struct QualityRequest {
    quality: QualityKey,
}

#[derive(Debug, Deserialize)]
pub struct ProgressRequest {
    current_time: f64,
    #[serde(default)]
    duration: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub struct OutputErrorRequest {
    reason: String,
}

#[derive(Debug, Serialize)]
pub struct LibraryItemInfo {
    #[serde(flatten)]
    item: MediaItem,
    ref_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    download: Option<DownloadData>,
}

type ApiError = (StatusCode, Json<StatusResponse>);

fn api_error(e: Error) -> ApiError {
    let code = match &e {
        Error::InvalidCommand(_) | Error::BadRequest(_) => StatusCode::BAD_REQUEST,
        Error::ResolutionExhausted(_) | Error::UnknownPlatform(_) => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if code == StatusCode::INTERNAL_SERVER_ERROR {
        error!("Request failed: {}", e);
    }
    (
        code,
        Json(StatusResponse {
            status: format!("error: {}", e),
        }),
    )
}

fn ok() -> Json<StatusResponse> {
    Json(StatusResponse {
        status: "ok".to_string(),
    })
}

// ============================================================================
// Health Endpoint
// ============================================================================

/// GET /health
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        module: "cadence-player".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============================================================================
// Playback Endpoints
// ============================================================================

/// GET /player/status
pub async fn get_status(State(ctx): State<AppContext>) -> Json<PlaybackStatus> {
    Json(ctx.engine.snapshot().await)
}

/// POST /player/command - `{ "cmd": ..., "payload": ... }` envelope
pub async fn command(
    State(ctx): State<AppContext>,
    Json(body): Json<serde_json::Value>,
) -> Result<Json<StatusResponse>, ApiError> {
    let command = PlayerCommand::decode(body).map_err(|e| api_error(e.into()))?;
    ctx.engine.handle_command(command).await.map_err(api_error)?;
    Ok(ok())
}

/// POST /player/play
pub async fn play(
    State(ctx): State<AppContext>,
    Json(req): Json<PlayRequest>,
) -> Result<Json<StatusResponse>, ApiError> {
    info!("Play request: {}", req.item.media);
    ctx.engine
        .play_media(req.item, req.options)
        .await
        .map_err(api_error)?;
    Ok(ok())
}

/// POST /player/seek
pub async fn seek(
    State(ctx): State<AppContext>,
    Json(req): Json<SeekRequest>,
) -> Result<Json<StatusResponse>, ApiError> {
    ctx.engine.seek_to(req.position).await.map_err(api_error)?;
    Ok(ok())
}

/// POST /player/volume - 0.0 to 1.0
pub async fn set_volume(
    State(ctx): State<AppContext>,
    Json(req): Json<VolumeRequest>,
) -> Result<Json<StatusResponse>, ApiError> {
    ctx.engine.set_volume(req.volume).await.map_err(api_error)?;
    Ok(ok())
}

/// POST /player/speed
pub async fn set_speed(
    State(ctx): State<AppContext>,
    Json(req): Json<SpeedRequest>,
) -> Result<Json<StatusResponse>, ApiError> {
    ctx.engine.set_speed(req.speed).await.map_err(api_error)?;
    Ok(ok())
}

/// POST /player/quality
pub async fn set_quality(
    State(ctx): State<AppContext>,
    Json(req): Json<QualityRequest>,
) -> Result<Json<StatusResponse>, ApiError> {
    ctx.engine.set_quality(req.quality).await.map_err(api_error)?;
    Ok(ok())
}

// ============================================================================
// Output Feedback Endpoints
// ============================================================================

/// POST /player/progress
pub async fn progress(
    State(ctx): State<AppContext>,
    Json(req): Json<ProgressRequest>,
) -> StatusCode {
    ctx.engine.on_progress(req.current_time, req.duration).await;
    StatusCode::NO_CONTENT
}

/// POST /player/ended
///
/// A failure to start the next track is reported through events, not here.
pub async fn ended(State(ctx): State<AppContext>) -> StatusCode {
    if let Err(e) = ctx.engine.on_track_ended().await {
        info!("Next track did not start: {}", e);
    }
    StatusCode::NO_CONTENT
}

/// POST /player/error
pub async fn output_error(
    State(ctx): State<AppContext>,
    Json(req): Json<OutputErrorRequest>,
) -> StatusCode {
    ctx.engine.on_output_error(req.reason).await;
    StatusCode::NO_CONTENT
}

// ============================================================================
// Queue Endpoints
// ============================================================================

/// GET /player/queue
pub async fn get_queue(State(ctx): State<AppContext>) -> Json<QueueResponse> {
    Json(QueueResponse {
        queue: ctx.engine.queue().await,
    })
}

/// DELETE /player/queue
pub async fn clear_queue(State(ctx): State<AppContext>) -> StatusCode {
    ctx.engine.clear_queue().await;
    StatusCode::NO_CONTENT
}

/// POST /player/queue/replace
pub async fn replace_queue(
    State(ctx): State<AppContext>,
    Json(req): Json<ReplaceQueueRequest>,
) -> Result<Json<StatusResponse>, ApiError> {
    info!("Replacing queue with {} items", req.items.len());
    ctx.engine
        .play_with_replace_queue(req.items, req.start)
        .await
        .map_err(api_error)?;
    Ok(ok())
}

/// POST /player/queue/next
pub async fn add_next(
    State(ctx): State<AppContext>,
    Json(req): Json<AddNextRequest>,
) -> StatusCode {
    ctx.engine.add_next(req.items).await;
    StatusCode::NO_CONTENT
}

/// POST /player/queue/remove - target is an index or a MediaRef
pub async fn remove_from_queue(
    State(ctx): State<AppContext>,
    Json(req): Json<RemoveRequest>,
) -> Json<RemoveResponse> {
    Json(RemoveResponse {
        removed: ctx.engine.remove_from_queue(req.target).await,
    })
}

// ============================================================================
// Library Endpoints
// ============================================================================

/// GET /library - downloaded items
pub async fn get_library(
    State(ctx): State<AppContext>,
) -> Result<Json<Vec<LibraryItemInfo>>, ApiError> {
    let records = ctx.registry.downloaded_items().await.map_err(api_error)?;
    Ok(Json(
        records
            .into_iter()
            .map(|r| LibraryItemInfo {
                item: r.item,
                ref_count: r.ref_count,
                download: r.download,
            })
            .collect(),
    ))
}

#[derive(Debug, Deserialize)]
pub struct LibraryAddRequest {
    items: Vec<LibraryEntry>,
}

#[derive(Debug, Serialize)]
pub struct LibraryAddResponse {
    added: Vec<MediaRef>,
}

/// POST /library/add
pub async fn library_add(
    State(ctx): State<AppContext>,
    Json(req): Json<LibraryAddRequest>,
) -> Result<Json<LibraryAddResponse>, ApiError> {
    let added = ctx
        .registry
        .add_to_library(req.items)
        .await
        .map_err(api_error)?;
    Ok(Json(LibraryAddResponse { added }))
}

#[derive(Debug, Deserialize)]
pub struct LibraryRemoveRequest {
    items: Vec<MediaRef>,
    #[serde(default)]
    delete_file: bool,
}

/// POST /library/remove
pub async fn library_remove(
    State(ctx): State<AppContext>,
    Json(req): Json<LibraryRemoveRequest>,
) -> Result<Json<RemoveOutcome>, ApiError> {
    let outcome = ctx
        .registry
        .remove_from_library(&req.items, req.delete_file)
        .await
        .map_err(api_error)?;
    Ok(Json(outcome))
}
