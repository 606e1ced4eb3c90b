//! Trigger and watch-sample API handlers
//!
//! **[EPI-API-010]** POST /triggers, POST /samples

use axum::{
    extract::State,
    http::StatusCode,
    routing::post,
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use pulsera_common::events::{EpisodePhase, PulseraEvent, TriggerData};
use pulsera_common::Episode;

use crate::error::{ApiError, ApiResult};
use crate::services::triggers::ANOMALY_SUSTAINED_HR;
use crate::AppState;

/// POST /triggers request
#[derive(Debug, Deserialize)]
pub struct ManualTriggerRequest {
    pub subject_id: Uuid,
    pub subject_name: String,
    pub heart_rate: f64,
    pub hrv: f64,
    /// Anomaly label carried onto the episode
    #[serde(default = "default_anomaly_type")]
    pub anomaly_type: String,
}

fn default_anomaly_type() -> String {
    ANOMALY_SUSTAINED_HR.to_string()
}

/// POST /triggers response
#[derive(Debug, Serialize)]
pub struct TriggerResponse {
    pub episode_id: Uuid,
    pub subject_id: Uuid,
    pub phase: EpisodePhase,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// POST /samples request (one watch reading)
#[derive(Debug, Deserialize)]
pub struct SampleRequest {
    pub subject_id: Uuid,
    pub subject_name: String,
    pub heart_rate: f64,
    pub hrv: f64,
}

/// POST /samples response
#[derive(Debug, Serialize)]
pub struct SampleResponse {
    pub accepted: bool,
    /// Whether this sample completed an anomalous run and opened an episode
    pub triggered: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub episode_id: Option<Uuid>,
}

/// **[EPI-API-010]** POST /triggers
///
/// Open an episode directly from a reported anomaly. Returns 201 Created.
/// Rejected with 409 while the subject already has an active episode.
pub async fn create_trigger(
    State(state): State<AppState>,
    Json(request): Json<ManualTriggerRequest>,
) -> ApiResult<(StatusCode, Json<TriggerResponse>)> {
    if !request.heart_rate.is_finite() || request.heart_rate < 0.0 {
        return Err(ApiError::BadRequest(format!(
            "Heart rate out of range: {}",
            request.heart_rate
        )));
    }
    if !request.hrv.is_finite() || request.hrv < 0.0 {
        return Err(ApiError::BadRequest(format!(
            "HRV out of range: {}",
            request.hrv
        )));
    }

    // **[EPI-ST-020]** One active episode per subject
    if let Some(active) = state.active_episode_for(request.subject_id).await {
        return Err(ApiError::Conflict(format!(
            "Subject {} already has an active episode: {}",
            request.subject_id, active.episode_id
        )));
    }

    let trigger = TriggerData {
        heart_rate: request.heart_rate,
        hrv: request.hrv,
        anomaly_type: request.anomaly_type,
    };
    let episode = open_episode(&state, request.subject_id, request.subject_name, trigger).await;

    let response = TriggerResponse {
        episode_id: episode.episode_id,
        subject_id: episode.subject_id,
        phase: episode.phase,
        created_at: episode.created_at,
    };
    Ok((StatusCode::CREATED, Json(response)))
}

/// **[EPI-TRG-010]** POST /samples
///
/// Feed one watch reading into the rolling anomaly window. Opens an episode
/// when a sustained run completes, unless the subject already has one active.
pub async fn ingest_sample(
    State(state): State<AppState>,
    Json(request): Json<SampleRequest>,
) -> ApiResult<Json<SampleResponse>> {
    let fired = {
        let mut monitor = state.monitor.lock().await;
        monitor
            .record_sample(request.subject_id, request.heart_rate, request.hrv)
            .map_err(|e| ApiError::BadRequest(e.to_string()))?
    };

    let Some(trigger) = fired else {
        return Ok(Json(SampleResponse {
            accepted: true,
            triggered: false,
            episode_id: None,
        }));
    };

    // Suppress the trigger while an episode is already running for the
    // subject; the sample still counted toward the feed.
    if let Some(active) = state.active_episode_for(request.subject_id).await {
        tracing::debug!(
            subject_id = %request.subject_id,
            episode_id = %active.episode_id,
            "Trigger suppressed: subject already has an active episode"
        );
        return Ok(Json(SampleResponse {
            accepted: true,
            triggered: false,
            episode_id: None,
        }));
    }

    let episode = open_episode(&state, request.subject_id, request.subject_name, trigger).await;

    Ok(Json(SampleResponse {
        accepted: true,
        triggered: true,
        episode_id: Some(episode.episode_id),
    }))
}

/// Open a new episode and broadcast its creation
async fn open_episode(
    state: &AppState,
    subject_id: Uuid,
    subject_name: String,
    trigger: TriggerData,
) -> Episode {
    let episode = Episode::from_trigger(subject_id, subject_name, trigger);

    {
        let mut episodes = state.episodes.write().await;
        episodes.insert(episode.episode_id, episode.clone());
    }

    tracing::info!(
        episode_id = %episode.episode_id,
        subject_id = %episode.subject_id,
        heart_rate = episode.trigger_data.heart_rate,
        anomaly_type = %episode.trigger_data.anomaly_type,
        "Episode opened"
    );

    state.event_bus.emit_lossy(PulseraEvent::TriggerDetected {
        subject_id: episode.subject_id,
        subject_name: episode.subject_name.clone(),
        heart_rate: episode.trigger_data.heart_rate,
        hrv: episode.trigger_data.hrv,
        episode_id: episode.episode_id,
        timestamp: Utc::now(),
    });
    state.emit_episode_event(&episode);

    episode
}

/// Build trigger routes
pub fn trigger_routes() -> Router<AppState> {
    Router::new()
        .route("/triggers", post(create_trigger))
        .route("/samples", post(ingest_sample))
}
