//! Episode lifecycle API handlers
//!
//! **[EPI-API-010]** GET /episodes, GET /episodes/:id, POST advance /
//! acknowledge / abandon

use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use pulsera_common::events::EpisodePhase;
use pulsera_common::Episode;

use crate::error::{ApiError, ApiResult};
use crate::services::phase_engine::RESOLUTION_ABANDONED;
use crate::services::{AdvanceContext, AdvanceOutcome, VitalsSnapshot};
use crate::AppState;

/// GET /episodes query filters
#[derive(Debug, Deserialize)]
pub struct EpisodeListQuery {
    /// Restrict to one monitored subject
    pub subject_id: Option<Uuid>,
    /// Only episodes that have not resolved yet
    #[serde(default)]
    pub active: bool,
}

/// GET /episodes response
#[derive(Debug, Serialize)]
pub struct EpisodeListResponse {
    pub count: usize,
    pub episodes: Vec<Episode>,
}

/// POST /episodes/:id/abandon request
#[derive(Debug, Deserialize)]
pub struct AbandonRequest {
    /// Resolution tag recorded on the episode (default "abandoned")
    pub resolution: Option<String>,
}

/// Response for the advance / acknowledge / abandon operations
#[derive(Debug, Serialize)]
pub struct AdvanceResponse {
    pub episode_id: Uuid,
    /// False when the episode was already terminal and nothing changed
    pub transitioned: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from: Option<EpisodePhase>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to: Option<EpisodePhase>,
    /// Full episode snapshot after the operation
    pub episode: Episode,
}

impl AdvanceResponse {
    fn from_outcome(outcome: AdvanceOutcome, episode: Episode) -> Self {
        match outcome {
            AdvanceOutcome::Transitioned { from, to, .. } => Self {
                episode_id: episode.episode_id,
                transitioned: true,
                from: Some(from),
                to: Some(to),
                episode,
            },
            AdvanceOutcome::AlreadyResolved => Self {
                episode_id: episode.episode_id,
                transitioned: false,
                from: None,
                to: None,
                episode,
            },
        }
    }
}

/// **[EPI-ST-010]** GET /episodes
///
/// Registry inspection, newest first.
pub async fn list_episodes(
    State(state): State<AppState>,
    Query(query): Query<EpisodeListQuery>,
) -> Json<EpisodeListResponse> {
    let episodes = state.episodes.read().await;
    let mut matched: Vec<Episode> = episodes
        .values()
        .filter(|e| query.subject_id.map_or(true, |s| e.subject_id == s))
        .filter(|e| !query.active || !e.is_terminal())
        .cloned()
        .collect();
    matched.sort_by(|a, b| b.created_at.cmp(&a.created_at));

    Json(EpisodeListResponse {
        count: matched.len(),
        episodes: matched,
    })
}

/// GET /episodes/:id
pub async fn get_episode(
    State(state): State<AppState>,
    Path(episode_id): Path<Uuid>,
) -> ApiResult<Json<Episode>> {
    let episodes = state.episodes.read().await;
    let episode = episodes
        .get(&episode_id)
        .ok_or_else(|| ApiError::NotFound(format!("Episode not found: {}", episode_id)))?;
    Ok(Json(episode.clone()))
}

/// **[EPI-WF-020]** POST /episodes/:id/advance
///
/// One engine step. External pacing: the caller decides when the calming
/// interval or camera scan has run long enough. The freshest watch sample in
/// the monitor feed (if any) rides along for the re-evaluation entry.
/// Advancing a resolved episode is a harmless no-op; leaving visual_check
/// without a recorded camera outcome is a 409.
pub async fn advance_episode(
    State(state): State<AppState>,
    Path(episode_id): Path<Uuid>,
) -> ApiResult<Json<AdvanceResponse>> {
    let subject_id = {
        let episodes = state.episodes.read().await;
        episodes
            .get(&episode_id)
            .map(|e| e.subject_id)
            .ok_or_else(|| ApiError::NotFound(format!("Episode not found: {}", episode_id)))?
    };

    let latest_vitals = {
        let monitor = state.monitor.lock().await;
        monitor.latest(subject_id).map(|sample| VitalsSnapshot {
            heart_rate: sample.heart_rate,
            hrv: sample.hrv,
        })
    };
    let ctx = AdvanceContext { latest_vitals };

    let (outcome, snapshot) = {
        let mut episodes = state.episodes.write().await;
        let episode = episodes
            .get_mut(&episode_id)
            .ok_or_else(|| ApiError::NotFound(format!("Episode not found: {}", episode_id)))?;
        let outcome = state.engine.advance(episode, &ctx)?;
        (outcome, episode.clone())
    };

    if let AdvanceOutcome::Transitioned { from, to, .. } = outcome {
        tracing::info!(
            episode_id = %episode_id,
            from = %from,
            to = %to,
            "Episode advanced"
        );
        state.emit_episode_event(&snapshot);
    }

    Ok(Json(AdvanceResponse::from_outcome(outcome, snapshot)))
}

/// **[EPI-WF-030]** POST /episodes/:id/acknowledge
///
/// Caregiver acknowledgment: escalating -> resolved. 409 outside escalating.
pub async fn acknowledge_episode(
    State(state): State<AppState>,
    Path(episode_id): Path<Uuid>,
) -> ApiResult<Json<AdvanceResponse>> {
    let (outcome, snapshot) = {
        let mut episodes = state.episodes.write().await;
        let episode = episodes
            .get_mut(&episode_id)
            .ok_or_else(|| ApiError::NotFound(format!("Episode not found: {}", episode_id)))?;
        let outcome = state.engine.acknowledge(episode)?;
        (outcome, episode.clone())
    };

    tracing::info!(
        episode_id = %episode_id,
        subject_id = %snapshot.subject_id,
        "Episode acknowledged by caregiver"
    );
    state.emit_episode_event(&snapshot);

    Ok(Json(AdvanceResponse::from_outcome(outcome, snapshot)))
}

/// **[EPI-WF-040]** POST /episodes/:id/abandon
///
/// Close the episode from any non-terminal phase. Accepts an optional JSON
/// body carrying a resolution tag. Abandoning a terminal episode is a no-op.
pub async fn abandon_episode(
    State(state): State<AppState>,
    Path(episode_id): Path<Uuid>,
    body: Option<Json<AbandonRequest>>,
) -> ApiResult<Json<AdvanceResponse>> {
    let resolution = body
        .and_then(|Json(request)| request.resolution)
        .unwrap_or_else(|| RESOLUTION_ABANDONED.to_string());

    let (outcome, snapshot) = {
        let mut episodes = state.episodes.write().await;
        let episode = episodes
            .get_mut(&episode_id)
            .ok_or_else(|| ApiError::NotFound(format!("Episode not found: {}", episode_id)))?;
        let outcome = state.engine.abandon(episode, &resolution)?;
        (outcome, episode.clone())
    };

    // A scan left running for this episode has nothing to report into
    if let Some(token) = state.scan_tokens.write().await.remove(&episode_id) {
        token.cancel();
    }

    if matches!(outcome, AdvanceOutcome::Transitioned { .. }) {
        tracing::info!(
            episode_id = %episode_id,
            resolution = %resolution,
            "Episode abandoned"
        );
        state.emit_episode_event(&snapshot);
    }

    Ok(Json(AdvanceResponse::from_outcome(outcome, snapshot)))
}

/// Build episode lifecycle routes
pub fn episode_routes() -> Router<AppState> {
    Router::new()
        .route("/episodes", get(list_episodes))
        .route("/episodes/:episode_id", get(get_episode))
        .route("/episodes/:episode_id/advance", post(advance_episode))
        .route("/episodes/:episode_id/acknowledge", post(acknowledge_episode))
        .route("/episodes/:episode_id/abandon", post(abandon_episode))
}
