//! Vene caregiver relay over WebSocket
//!
//! **[EPI-MS-020]** Forwards episode lifecycle events to paired caregiver
//! devices. Each connection gets its own broadcast subscription; an optional
//! subject filter narrows the feed to one monitored subject.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::IntoResponse,
};
use serde::Deserialize;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::AppState;

/// GET /vene/ws query parameters
#[derive(Debug, Deserialize)]
pub struct VeneQuery {
    /// Restrict the relay to one monitored subject
    pub subject_id: Option<Uuid>,
}

/// GET /vene/ws - WebSocket relay of episode events to a caregiver device
pub async fn vene_relay(
    ws: WebSocketUpgrade,
    Query(query): Query<VeneQuery>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| relay_events(socket, state, query.subject_id))
}

/// Forward broadcast events onto the socket until either side disconnects
async fn relay_events(mut socket: WebSocket, state: AppState, subject_filter: Option<Uuid>) {
    info!(subject_filter = ?subject_filter, "Vene caregiver relay connected");

    let mut rx = state.event_bus.subscribe();

    loop {
        tokio::select! {
            event = rx.recv() => {
                match event {
                    Ok(event) => {
                        if subject_filter.map_or(false, |s| event.subject_id() != s) {
                            continue;
                        }
                        let event_type = event.event_type();
                        let payload = match serde_json::to_string(&event) {
                            Ok(json) => json,
                            Err(e) => {
                                warn!("Vene relay: failed to serialize {}: {}", event_type, e);
                                continue;
                            }
                        };
                        debug!("Vene relay: forwarding {}", event_type);
                        if socket.send(Message::Text(payload)).await.is_err() {
                            break;
                        }
                    }
                    Err(RecvError::Lagged(missed)) => {
                        warn!(missed, "Vene relay fell behind, missed events dropped");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            incoming = socket.recv() => {
                match incoming {
                    // Caregiver devices only listen; anything except a ping
                    // is ignored until the socket closes
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        debug!("Vene relay: socket error: {}", e);
                        break;
                    }
                }
            }
        }
    }

    info!("Vene caregiver relay disconnected");
}
