//! Episode lifecycle model
//!
//! **[EPI-WF-010]** An episode records one detection-to-resolution lifecycle:
//! anomaly_detected → calming → re_evaluating → visual_check → fusing →
//! escalating/resolved

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use crate::events::{
    EpisodePhase, FusionResult, TimelineEntry, TriggerData, VisualReading,
};

/// **[EPI-WF-010]** Phase transition record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseTransition {
    pub episode_id: Uuid,
    pub old_phase: EpisodePhase,
    pub new_phase: EpisodePhase,
    pub transitioned_at: DateTime<Utc>,
}

/// **[EPI-WF-020]** Episode (in-memory state)
///
/// Exclusively mutated by the phase engine while active; retained for
/// display/history once resolved. `resolved_at` is set if and only if
/// `phase == Resolved`; `fusion_result` is set if and only if the episode has
/// passed through fusing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Episode {
    /// Unique episode identifier, never reused
    pub episode_id: Uuid,

    /// Monitored subject, immutable after creation
    pub subject_id: Uuid,
    pub subject_name: String,

    /// Current lifecycle phase
    pub phase: EpisodePhase,

    /// Trigger vitals captured once at creation
    pub trigger_data: TriggerData,

    /// Append-only ordered log of lifecycle steps
    pub timeline: Vec<TimelineEntry>,

    /// Bounds of the calming phase, each set exactly once
    pub calming_started_at: Option<DateTime<Utc>>,
    pub calming_ended_at: Option<DateTime<Utc>>,

    /// Visual corroboration result, set at most once
    pub visual_data: Option<VisualReading>,

    /// When the visual check-in recorded an outcome (with or without data)
    pub visual_checked_at: Option<DateTime<Utc>>,

    /// Fusion outcome, set exactly when fusing completes
    pub fusion_result: Option<FusionResult>,

    /// Severity in [0, 1]; starts at 0.5, overwritten once by the fused score
    pub severity_score: f64,

    /// 0 until escalation occurs, then >= 1
    pub escalation_level: u32,

    /// How the episode ended ("false_positive", "caregiver_acknowledged", ...)
    pub resolution: Option<String>,

    /// Set iff phase == Resolved
    pub resolved_at: Option<DateTime<Utc>>,

    /// Immutable creation timestamp
    pub created_at: DateTime<Utc>,
}

impl Episode {
    /// Create a new episode from a qualifying trigger reading
    ///
    /// **[EPI-WF-020]** Opens at `anomaly_detected` with a singleton timeline
    /// entry, `severity_score = 0.5` and `escalation_level = 0`.
    pub fn from_trigger(
        subject_id: Uuid,
        subject_name: String,
        trigger_data: TriggerData,
    ) -> Self {
        let created_at = Utc::now();
        let timeline = vec![TimelineEntry {
            phase: EpisodePhase::AnomalyDetected.to_string(),
            timestamp: created_at,
            data: json!({
                "heart_rate": trigger_data.heart_rate,
                "hrv": trigger_data.hrv,
                "anomaly_type": trigger_data.anomaly_type,
            }),
        }];

        Self {
            episode_id: Uuid::new_v4(),
            subject_id,
            subject_name,
            phase: EpisodePhase::AnomalyDetected,
            trigger_data,
            timeline,
            calming_started_at: None,
            calming_ended_at: None,
            visual_data: None,
            visual_checked_at: None,
            fusion_result: None,
            severity_score: 0.5,
            escalation_level: 0,
            resolution: None,
            resolved_at: None,
            created_at,
        }
    }

    /// Transition to a new phase
    ///
    /// Sets `resolved_at` when entering the terminal phase. Timeline entries
    /// are appended separately by the engine so each carries the data
    /// relevant to its step.
    pub fn transition_to(&mut self, new_phase: EpisodePhase) -> PhaseTransition {
        let transition = PhaseTransition {
            episode_id: self.episode_id,
            old_phase: self.phase,
            new_phase,
            transitioned_at: Utc::now(),
        };
        self.phase = new_phase;

        if new_phase == EpisodePhase::Resolved {
            self.resolved_at = Some(transition.transitioned_at);
        }

        transition
    }

    /// Append one timeline entry
    ///
    /// Entries are immutable once appended; insertion order is chronological
    /// order.
    pub fn append_entry(&mut self, phase_label: impl Into<String>, data: serde_json::Value) {
        self.timeline.push(TimelineEntry {
            phase: phase_label.into(),
            timestamp: Utc::now(),
            data,
        });
    }

    /// Check if the episode is terminal (resolved)
    pub fn is_terminal(&self) -> bool {
        self.phase == EpisodePhase::Resolved
    }
}
