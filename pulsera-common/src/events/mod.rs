//! Event types for the Pulsera event system
//!
//! Provides shared event definitions and EventBus for all Pulsera services.

// Sub-module (supporting types)
mod episode_types;

pub use episode_types::{
    EpisodePhase, EyeResponsiveness, FacialExpression, FusionDecision, FusionResult,
    TimelineEntry, TriggerData, VisualReading, VisualSource,
};

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::episode::Episode;

/// Pulsera event types
///
/// Events are broadcast via EventBus and can be serialized for SSE and
/// WebSocket transmission. All events use this central enum for type safety
/// and exhaustive matching.
///
/// **[EPI-EVT-010]** The orchestration layer emits exactly one event per
/// lifecycle step: `EpisodeUpdate` for non-terminal transitions,
/// `EpisodeResolved` for the terminal one, each carrying the full episode
/// snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PulseraEvent {
    /// A qualifying anomalous reading opened a new episode
    ///
    /// Triggers:
    /// - SSE: Show new episode banner
    /// - Vene relay: Notify the paired caregiver
    TriggerDetected {
        /// Monitored subject
        subject_id: Uuid,
        /// Subject display name
        subject_name: String,
        /// Heart rate (bpm) of the triggering reading
        heart_rate: f64,
        /// Heart rate variability (ms) of the triggering reading
        hrv: f64,
        /// Episode opened for this trigger
        episode_id: Uuid,
        /// When the trigger fired
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Episode state changed (non-terminal transition or visual outcome)
    ///
    /// Triggers:
    /// - SSE: Update episode card / phase indicator
    /// - Vene relay: Forward to the paired caregiver
    EpisodeUpdate {
        /// Full episode snapshot after the change
        episode: Episode,
        /// When the change occurred
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Episode reached the terminal phase
    ///
    /// Triggers:
    /// - SSE: Show resolution notification
    /// - Vene relay: Forward to the paired caregiver
    EpisodeResolved {
        /// Full episode snapshot at resolution
        episode: Episode,
        /// Resolution tag ("false_positive", "caregiver_acknowledged", ...)
        resolution: String,
        /// When the episode resolved
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

impl PulseraEvent {
    /// Get event type as string for filtering
    pub fn event_type(&self) -> &str {
        match self {
            PulseraEvent::TriggerDetected { .. } => "TriggerDetected",
            PulseraEvent::EpisodeUpdate { .. } => "EpisodeUpdate",
            PulseraEvent::EpisodeResolved { .. } => "EpisodeResolved",
        }
    }

    /// Monitored subject this event concerns (for per-subject relays)
    pub fn subject_id(&self) -> Uuid {
        match self {
            PulseraEvent::TriggerDetected { subject_id, .. } => *subject_id,
            PulseraEvent::EpisodeUpdate { episode, .. } => episode.subject_id,
            PulseraEvent::EpisodeResolved { episode, .. } => episode.subject_id,
        }
    }
}

// ========================================
// EventBus Implementation
// ========================================

/// Central event distribution bus for application-wide events
///
/// The EventBus uses tokio::broadcast internally, providing:
/// - Non-blocking publish (slow subscribers don't block producers)
/// - Multiple concurrent subscribers
/// - Automatic cleanup when subscribers drop
/// - Lagged message detection for slow subscribers
///
/// # Examples
///
/// ```
/// use pulsera_common::events::{EventBus, PulseraEvent};
/// use std::sync::Arc;
/// use uuid::Uuid;
///
/// let event_bus = Arc::new(EventBus::new(100));
///
/// // Subscribe to events
/// let mut rx = event_bus.subscribe();
///
/// // Emit an event
/// event_bus.emit(PulseraEvent::TriggerDetected {
///     subject_id: Uuid::new_v4(),
///     subject_name: "Iris".to_string(),
///     heart_rate: 142.0,
///     hrv: 22.0,
///     episode_id: Uuid::new_v4(),
///     timestamp: chrono::Utc::now(),
/// }).ok();
/// ```
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<PulseraEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// # Arguments
    ///
    /// * `capacity` - Number of events to buffer before dropping old events
    ///   (development: 1000, testing: 10-100)
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    ///
    /// Returns a receiver that will receive all events emitted after
    /// subscription. Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<PulseraEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)` if at least one subscriber exists.
    /// Returns `Err` if no subscribers are listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: PulseraEvent,
    ) -> Result<usize, broadcast::error::SendError<PulseraEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    ///
    /// Useful for non-critical events where it's acceptable if no component
    /// is currently listening.
    ///
    /// # Examples
    ///
    /// ```
    /// use pulsera_common::events::{EventBus, PulseraEvent};
    /// use uuid::Uuid;
    ///
    /// let event_bus = EventBus::new(100);
    ///
    /// // OK if no one is listening yet
    /// event_bus.emit_lossy(PulseraEvent::TriggerDetected {
    ///     subject_id: Uuid::new_v4(),
    ///     subject_name: "Iris".to_string(),
    ///     heart_rate: 142.0,
    ///     hrv: 22.0,
    ///     episode_id: Uuid::new_v4(),
    ///     timestamp: chrono::Utc::now(),
    /// });
    /// ```
    pub fn emit_lossy(&self, event: PulseraEvent) {
        let _ = self.tx.send(event);
    }

    /// Get the current number of active subscribers
    ///
    /// Useful for debugging and monitoring
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Get the configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
