//! pulsera-ep library interface for testing
//!
//! Exposes public APIs for integration testing

pub mod api;
pub mod config;
pub mod error;
pub mod services;

pub use crate::error::{ApiError, ApiResult};

use axum::Router;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use pulsera_common::events::{EventBus, PulseraEvent};
use pulsera_common::Episode;

use crate::config::{EpConfig, OracleMode};
use crate::services::{
    FusionEngine, PhaseEngine, PresageClient, SyntheticVitals, TriggerMonitor, VisualCapture,
};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Episode store, keyed by episode id **[EPI-ST-010]**
    pub episodes: Arc<RwLock<HashMap<Uuid, Episode>>>,
    /// Stateless workflow engine
    pub engine: Arc<PhaseEngine>,
    /// Rolling watch-sample windows per subject
    pub monitor: Arc<Mutex<TriggerMonitor>>,
    /// Visual capture capability selected at startup **[EPI-ORA-020]**
    pub visual: Arc<VisualCapture>,
    /// Cancellation tokens for running camera scans **[EPI-ASYNC-010]**
    pub scan_tokens: Arc<RwLock<HashMap<Uuid, CancellationToken>>>,
    /// Event bus for SSE and relay broadcasting
    pub event_bus: EventBus,
    /// Camera scan duration in seconds
    pub scan_seconds: u64,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
    /// Last error for diagnostic purposes
    pub last_error: Arc<RwLock<Option<String>>>,
}

impl AppState {
    /// Assemble application state from resolved configuration
    ///
    /// # Errors
    /// Returns error when the configured capture mode cannot be constructed
    /// or the trigger parameters are invalid.
    pub fn new(config: &EpConfig, event_bus: EventBus) -> anyhow::Result<Self> {
        let visual = match config.oracle {
            OracleMode::Real => {
                let url = config
                    .presage_url
                    .clone()
                    .ok_or_else(|| anyhow::anyhow!("Real oracle mode requires a Presage URL"))?;
                VisualCapture::Real(PresageClient::new(url)?)
            }
            OracleMode::Synthetic => {
                let vitals = match config.synthetic_seed {
                    Some(seed) => SyntheticVitals::with_seed(seed),
                    None => SyntheticVitals::new(),
                };
                VisualCapture::Synthetic(Mutex::new(vitals))
            }
        };

        let monitor = TriggerMonitor::new()
            .with_window_size(config.trigger_window_samples)?
            .with_hr_threshold(config.sustained_hr_threshold)?;

        let engine = PhaseEngine::new(
            FusionEngine::with_config(config.fusion.clone()),
            config.calming_seconds,
        );

        Ok(Self {
            episodes: Arc::new(RwLock::new(HashMap::new())),
            engine: Arc::new(engine),
            monitor: Arc::new(Mutex::new(monitor)),
            visual: Arc::new(visual),
            scan_tokens: Arc::new(RwLock::new(HashMap::new())),
            event_bus,
            scan_seconds: config.scan_seconds,
            startup_time: Utc::now(),
            last_error: Arc::new(RwLock::new(None)),
        })
    }

    /// Active (non-terminal) episode for a subject, if one exists
    ///
    /// **[EPI-ST-020]** At most one episode per subject is ever active.
    pub async fn active_episode_for(&self, subject_id: Uuid) -> Option<Episode> {
        let episodes = self.episodes.read().await;
        episodes
            .values()
            .find(|e| e.subject_id == subject_id && !e.is_terminal())
            .cloned()
    }

    /// Broadcast the episode state after a change
    ///
    /// **[EPI-EVT-010]** Non-terminal episodes emit `EpisodeUpdate`,
    /// terminal ones emit `EpisodeResolved`.
    pub fn emit_episode_event(&self, episode: &Episode) {
        let event = if episode.is_terminal() {
            PulseraEvent::EpisodeResolved {
                episode: episode.clone(),
                resolution: episode.resolution.clone().unwrap_or_default(),
                timestamp: Utc::now(),
            }
        } else {
            PulseraEvent::EpisodeUpdate {
                episode: episode.clone(),
                timestamp: Utc::now(),
            }
        };
        self.event_bus.emit_lossy(event);
    }
}

/// Build application router
///
/// **[EPI-API-010]** API endpoint routing
pub fn build_router(state: AppState) -> Router {
    use axum::routing::get;
    use tower_http::cors::CorsLayer;
    use tower_http::trace::TraceLayer;

    Router::new()
        .merge(api::trigger_routes())
        .merge(api::episode_routes())
        .merge(api::visual_routes())
        .route("/events", get(api::event_stream))
        .route("/vene/ws", get(api::vene_relay))
        .merge(api::health_routes())
        .with_state(state)
        // Enable CORS for local access
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}
