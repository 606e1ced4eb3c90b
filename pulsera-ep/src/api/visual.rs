//! Camera scan API handlers
//!
//! **[EPI-API-010]** POST /episodes/:id/visual/start and /visual/cancel
//!
//! The scan itself runs as a spawned task so the start request returns
//! immediately; progress lands on the episode via `record_visual` and is
//! broadcast like any other state change.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::post,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use pulsera_common::events::{EpisodePhase, VisualSource};

use crate::error::{ApiError, ApiResult};
use crate::services::{EngineError, OracleError, VisualOutcome};
use crate::AppState;

/// Outcome reason recorded when a scan is cancelled or skipped
const SCAN_CANCELLED: &str = "scan_cancelled";

/// POST /episodes/:id/visual/start request
#[derive(Debug, Default, Deserialize)]
pub struct StartScanRequest {
    /// Steer the synthetic generator toward a distressed draw; the real
    /// oracle ignores this
    #[serde(default)]
    pub distressed: bool,
}

/// POST /episodes/:id/visual/start response (202)
#[derive(Debug, Serialize)]
pub struct StartScanResponse {
    pub episode_id: Uuid,
    /// How long the scan will run before a reading is captured
    pub scan_seconds: u64,
    /// Which capture capability will serve the scan
    pub source: VisualSource,
}

/// POST /episodes/:id/visual/cancel response
#[derive(Debug, Serialize)]
pub struct CancelScanResponse {
    pub episode_id: Uuid,
    pub cancelled: bool,
    /// True when a live scan task was interrupted, false when the check-in
    /// was skipped directly
    pub scan_was_running: bool,
}

/// **[EPI-ASYNC-010]** POST /episodes/:id/visual/start
///
/// Kick off the camera scan for an episode sitting in visual_check. The
/// request returns 202 immediately; after the scan window elapses the
/// outcome is recorded on the episode and broadcast. Starting a second scan
/// for the same check, or scanning outside visual_check, is a 409.
pub async fn start_visual_scan(
    State(state): State<AppState>,
    Path(episode_id): Path<Uuid>,
    body: Option<Json<StartScanRequest>>,
) -> ApiResult<(StatusCode, Json<StartScanResponse>)> {
    let distressed = body.map(|Json(request)| request.distressed).unwrap_or(false);

    let subject_id = {
        let episodes = state.episodes.read().await;
        let episode = episodes
            .get(&episode_id)
            .ok_or_else(|| ApiError::NotFound(format!("Episode not found: {}", episode_id)))?;
        if episode.phase != EpisodePhase::VisualCheck {
            return Err(EngineError::PhaseMismatch {
                episode_id,
                expected: EpisodePhase::VisualCheck,
                actual: episode.phase,
            }
            .into());
        }
        if episode.visual_checked_at.is_some() {
            return Err(EngineError::VisualAlreadyRecorded { episode_id }.into());
        }
        episode.subject_id
    };

    let token = CancellationToken::new();
    {
        let mut tokens = state.scan_tokens.write().await;
        if tokens.contains_key(&episode_id) {
            return Err(ApiError::Conflict(format!(
                "A camera scan is already running for episode {}",
                episode_id
            )));
        }
        tokens.insert(episode_id, token.clone());
    }

    tracing::info!(
        episode_id = %episode_id,
        subject_id = %subject_id,
        scan_seconds = state.scan_seconds,
        source = %state.visual.source(),
        distressed_profile = distressed,
        "Camera scan started"
    );

    let task_state = state.clone();
    tokio::spawn(async move {
        run_scan(task_state, episode_id, subject_id, distressed, token).await;
    });

    Ok((
        StatusCode::ACCEPTED,
        Json(StartScanResponse {
            episode_id,
            scan_seconds: state.scan_seconds,
            source: state.visual.source(),
        }),
    ))
}

/// POST /episodes/:id/visual/cancel
///
/// Interrupt a running scan, or skip the camera check-in outright when no
/// scan is running. Either way the episode gets an unavailable outcome and
/// can advance into fusing on watch evidence alone.
pub async fn cancel_visual_scan(
    State(state): State<AppState>,
    Path(episode_id): Path<Uuid>,
) -> ApiResult<Json<CancelScanResponse>> {
    // A live scan task records the unavailable outcome itself once the
    // token fires.
    if let Some(token) = state.scan_tokens.write().await.remove(&episode_id) {
        token.cancel();
        tracing::info!(episode_id = %episode_id, "Camera scan cancelled");
        return Ok(Json(CancelScanResponse {
            episode_id,
            cancelled: true,
            scan_was_running: true,
        }));
    }

    // No scan running: record the skip directly, still phase-guarded
    let snapshot = {
        let mut episodes = state.episodes.write().await;
        let episode = episodes
            .get_mut(&episode_id)
            .ok_or_else(|| ApiError::NotFound(format!("Episode not found: {}", episode_id)))?;
        state.engine.record_visual(
            episode,
            VisualOutcome::Unavailable {
                reason: SCAN_CANCELLED.to_string(),
            },
        )?;
        episode.clone()
    };

    tracing::info!(episode_id = %episode_id, "Camera check-in skipped");
    state.emit_episode_event(&snapshot);

    Ok(Json(CancelScanResponse {
        episode_id,
        cancelled: true,
        scan_was_running: false,
    }))
}

/// Run one scan to completion or cancellation, then record the outcome
async fn run_scan(
    state: AppState,
    episode_id: Uuid,
    subject_id: Uuid,
    distressed: bool,
    token: CancellationToken,
) {
    let outcome = tokio::select! {
        _ = token.cancelled() => VisualOutcome::Unavailable {
            reason: SCAN_CANCELLED.to_string(),
        },
        result = capture_after_window(&state, subject_id, distressed) => match result {
            Ok(reading) => VisualOutcome::Captured(reading),
            Err(err) => {
                tracing::warn!(
                    episode_id = %episode_id,
                    subject_id = %subject_id,
                    error = %err,
                    "Camera capture failed, recording unavailable outcome"
                );
                *state.last_error.write().await =
                    Some(format!("Visual capture failed: {}", err));
                VisualOutcome::Unavailable {
                    reason: err.to_string(),
                }
            }
        },
    };

    state.scan_tokens.write().await.remove(&episode_id);

    let snapshot = {
        let mut episodes = state.episodes.write().await;
        let Some(episode) = episodes.get_mut(&episode_id) else {
            return;
        };
        match state.engine.record_visual(episode, outcome) {
            Ok(()) => episode.clone(),
            Err(err) => {
                // The episode moved on (abandoned, or a direct skip won the
                // race) while the scan ran; its outcome has nowhere to land
                tracing::debug!(
                    episode_id = %episode_id,
                    error = %err,
                    "Scan outcome discarded"
                );
                return;
            }
        }
    };
    state.emit_episode_event(&snapshot);
}

/// Hold for the configured scan window, then capture one reading
async fn capture_after_window(
    state: &AppState,
    subject_id: Uuid,
    distressed: bool,
) -> Result<pulsera_common::events::VisualReading, OracleError> {
    tokio::time::sleep(Duration::from_secs(state.scan_seconds)).await;
    state.visual.capture(subject_id, distressed).await
}

/// Build camera scan routes
pub fn visual_routes() -> Router<AppState> {
    Router::new()
        .route("/episodes/:episode_id/visual/start", post(start_visual_scan))
        .route(
            "/episodes/:episode_id/visual/cancel",
            post(cancel_visual_scan),
        )
}
