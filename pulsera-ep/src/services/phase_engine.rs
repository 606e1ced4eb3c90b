//! Episode Phase Engine
//!
//! **[EPI-WF-010]** Seven-phase escalation workflow
//! **[EPI-WF-020]** External pacing: the engine never sleeps or schedules,
//! it advances an episode one phase per call
//!
//! The engine is stateless. It operates on an `Episode` handed to it by the
//! caller, mutating phase, timeline, and fusion fields in place. Persistence
//! and event emission stay with the orchestration layer.

use chrono::{DateTime, Utc};
use pulsera_common::events::{EpisodePhase, FusionDecision, VisualReading};
use pulsera_common::Episode;
use serde_json::json;
use thiserror::Error;
use uuid::Uuid;

use super::fusion::{FusionEngine, FusionError};

/// Resolution tag for episodes the fusion step cleared
pub const RESOLUTION_FALSE_POSITIVE: &str = "false_positive";
/// Resolution tag for caregiver-acknowledged escalations
pub const RESOLUTION_ACKNOWLEDGED: &str = "caregiver_acknowledged";
/// Resolution tag for episodes closed without completing the workflow
pub const RESOLUTION_ABANDONED: &str = "abandoned";

/// Phase engine errors
#[derive(Debug, Error)]
pub enum EngineError {
    /// Advance requested while the camera scan outcome is still missing
    #[error("Visual check still pending for episode {episode_id}: record a camera outcome (or cancel the scan) before advancing")]
    VisualCheckPending { episode_id: Uuid },

    /// Operation requires a different phase
    #[error("Episode {episode_id} is in phase {actual}, expected {expected}")]
    PhaseMismatch {
        episode_id: Uuid,
        expected: EpisodePhase,
        actual: EpisodePhase,
    },

    /// A visual outcome was already recorded for this check
    #[error("Visual outcome already recorded for episode {episode_id}")]
    VisualAlreadyRecorded { episode_id: Uuid },

    /// Fusion rejected the stored inputs
    #[error(transparent)]
    Fusion(#[from] FusionError),
}

/// Camera scan outcome handed to the engine
#[derive(Debug, Clone)]
pub enum VisualOutcome {
    /// The camera produced a usable reading
    Captured(VisualReading),
    /// No usable reading (camera offline, scan cancelled, no face in frame)
    Unavailable { reason: String },
}

/// Most recent watch vitals, for the post-calming re-evaluation entry
#[derive(Debug, Clone, Copy)]
pub struct VitalsSnapshot {
    pub heart_rate: f64,
    pub hrv: f64,
}

/// Caller-supplied context for an advance
///
/// `latest_vitals` feeds the re-evaluation timeline entry; when absent the
/// engine falls back to the trigger vitals.
#[derive(Debug, Clone, Copy, Default)]
pub struct AdvanceContext {
    pub latest_vitals: Option<VitalsSnapshot>,
}

/// Result of a successful advance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdvanceOutcome {
    /// The episode moved one phase forward
    Transitioned {
        from: EpisodePhase,
        to: EpisodePhase,
        at: DateTime<Utc>,
    },
    /// The episode was already terminal; nothing changed
    AlreadyResolved,
}

/// Episode Phase Engine
///
/// **[EPI-WF-010]** Transition table:
///
/// | From            | To                    | Side effects                           |
/// |-----------------|-----------------------|----------------------------------------|
/// | anomaly_detected| calming               | stamps calming_started_at              |
/// | calming         | re_evaluating         | stamps calming_ended_at                |
/// | re_evaluating   | visual_check          | records escalation reason              |
/// | visual_check    | fusing                | requires a recorded visual outcome     |
/// | fusing          | escalating / resolved | runs fusion, sets severity and level   |
/// | escalating      | resolved              | resolution "caregiver_acknowledged"    |
/// | resolved        | (no-op)               | AlreadyResolved                        |
///
/// Every successful transition appends exactly one timeline entry.
pub struct PhaseEngine {
    fusion: FusionEngine,
    calming_seconds: u64,
}

impl PhaseEngine {
    pub fn new(fusion: FusionEngine, calming_seconds: u64) -> Self {
        Self {
            fusion,
            calming_seconds,
        }
    }

    /// Advance the episode one phase
    ///
    /// Returns `AlreadyResolved` without touching the episode when it is
    /// already terminal.
    ///
    /// # Errors
    /// - `VisualCheckPending` when leaving visual_check without a recorded
    ///   camera outcome
    /// - `Fusion` when the stored inputs fail validation
    pub fn advance(
        &self,
        episode: &mut Episode,
        ctx: &AdvanceContext,
    ) -> Result<AdvanceOutcome, EngineError> {
        match episode.phase {
            EpisodePhase::AnomalyDetected => {
                let transition = episode.transition_to(EpisodePhase::Calming);
                episode.calming_started_at = Some(transition.transitioned_at);
                episode.append_entry(
                    "calming",
                    json!({
                        "calming": "guided_breathing",
                        "duration": self.calming_seconds,
                    }),
                );
                Ok(transition.into())
            }

            EpisodePhase::Calming => {
                let transition = episode.transition_to(EpisodePhase::ReEvaluating);
                episode.calming_ended_at = Some(transition.transitioned_at);
                // Re-evaluation looks at the freshest vitals the caller has;
                // the trigger reading stands in when none arrived since.
                let (heart_rate, hrv) = match ctx.latest_vitals {
                    Some(vitals) => (vitals.heart_rate, vitals.hrv),
                    None => (episode.trigger_data.heart_rate, episode.trigger_data.hrv),
                };
                episode.append_entry(
                    "re_evaluating",
                    json!({
                        "heart_rate": heart_rate,
                        "hrv": hrv,
                    }),
                );
                Ok(transition.into())
            }

            EpisodePhase::ReEvaluating => {
                let transition = episode.transition_to(EpisodePhase::VisualCheck);
                episode.append_entry(
                    "visual_check",
                    json!({
                        "reason": "post_calming_still_elevated",
                    }),
                );
                Ok(transition.into())
            }

            EpisodePhase::VisualCheck => {
                if episode.visual_checked_at.is_none() {
                    return Err(EngineError::VisualCheckPending {
                        episode_id: episode.episode_id,
                    });
                }
                let transition = episode.transition_to(EpisodePhase::Fusing);
                episode.append_entry(
                    "fusing",
                    json!({
                        "presage_received": episode.visual_data.is_some(),
                    }),
                );
                Ok(transition.into())
            }

            EpisodePhase::Fusing => {
                let result = self
                    .fusion
                    .fuse(&episode.trigger_data, episode.visual_data.as_ref())?;

                episode.severity_score = result.combined_score;
                let next_phase = match result.decision {
                    FusionDecision::FalsePositive => {
                        episode.escalation_level = 0;
                        episode.resolution = Some(RESOLUTION_FALSE_POSITIVE.to_string());
                        EpisodePhase::Resolved
                    }
                    FusionDecision::Escalate | FusionDecision::Ambiguous => {
                        episode.escalation_level = 1;
                        EpisodePhase::Escalating
                    }
                };

                let transition = episode.transition_to(next_phase);
                episode.append_entry(
                    "fusion_complete",
                    json!({
                        "decision": result.decision.as_str(),
                        "watch_score": result.watch_score,
                        "presage_score": result.presage_score,
                        "combined_score": result.combined_score,
                        "explanation": result.explanation,
                    }),
                );
                episode.fusion_result = Some(result);
                Ok(transition.into())
            }

            EpisodePhase::Escalating => {
                episode.resolution = Some(RESOLUTION_ACKNOWLEDGED.to_string());
                let transition = episode.transition_to(EpisodePhase::Resolved);
                episode.append_entry(
                    "resolved",
                    json!({
                        "resolution": RESOLUTION_ACKNOWLEDGED,
                    }),
                );
                Ok(transition.into())
            }

            EpisodePhase::Resolved => Ok(AdvanceOutcome::AlreadyResolved),
        }
    }

    /// Record the camera scan outcome while the episode sits in visual_check
    ///
    /// Does not transition; the next `advance` moves into fusing. A captured
    /// reading becomes the fusion input, an unavailable outcome leaves the
    /// episode to fuse on watch evidence alone.
    ///
    /// # Errors
    /// - `PhaseMismatch` outside visual_check
    /// - `VisualAlreadyRecorded` when an outcome exists for this check
    pub fn record_visual(
        &self,
        episode: &mut Episode,
        outcome: VisualOutcome,
    ) -> Result<(), EngineError> {
        if episode.phase != EpisodePhase::VisualCheck {
            return Err(EngineError::PhaseMismatch {
                episode_id: episode.episode_id,
                expected: EpisodePhase::VisualCheck,
                actual: episode.phase,
            });
        }
        if episode.visual_checked_at.is_some() {
            return Err(EngineError::VisualAlreadyRecorded {
                episode_id: episode.episode_id,
            });
        }

        match outcome {
            VisualOutcome::Captured(reading) => {
                episode.visual_checked_at = Some(reading.captured_at);
                episode.append_entry(
                    "visual_check",
                    json!({
                        "outcome": "captured",
                        "source": reading.source.to_string(),
                        "visual_heart_rate": reading.visual_heart_rate,
                        "breathing_rate": reading.breathing_rate,
                        "blink_rate": reading.blink_rate,
                        "facial_expression": reading.facial_expression.to_string(),
                        "eye_responsiveness": reading.eye_responsiveness.to_string(),
                        "confidence_score": reading.confidence_score,
                    }),
                );
                episode.visual_data = Some(reading);
            }
            VisualOutcome::Unavailable { reason } => {
                tracing::info!(
                    episode_id = %episode.episode_id,
                    reason = %reason,
                    "Visual check unavailable, continuing on watch evidence"
                );
                episode.visual_checked_at = Some(Utc::now());
                episode.append_entry(
                    "visual_check",
                    json!({
                        "outcome": "unavailable",
                        "reason": reason,
                    }),
                );
            }
        }
        Ok(())
    }

    /// Resolve an escalating episode on caregiver acknowledgement
    ///
    /// # Errors
    /// Returns `PhaseMismatch` outside the escalating phase.
    pub fn acknowledge(&self, episode: &mut Episode) -> Result<AdvanceOutcome, EngineError> {
        if episode.phase != EpisodePhase::Escalating {
            return Err(EngineError::PhaseMismatch {
                episode_id: episode.episode_id,
                expected: EpisodePhase::Escalating,
                actual: episode.phase,
            });
        }
        self.advance(episode, &AdvanceContext::default())
    }

    /// Close an episode from any non-terminal phase without completing it
    ///
    /// The caller supplies the resolution tag ("abandoned",
    /// "subject_confirmed_ok", ...). Terminal episodes return
    /// `AlreadyResolved` unchanged.
    pub fn abandon(
        &self,
        episode: &mut Episode,
        resolution: &str,
    ) -> Result<AdvanceOutcome, EngineError> {
        if episode.is_terminal() {
            return Ok(AdvanceOutcome::AlreadyResolved);
        }
        episode.resolution = Some(resolution.to_string());
        let transition = episode.transition_to(EpisodePhase::Resolved);
        episode.append_entry(
            "resolved",
            json!({
                "resolution": resolution,
            }),
        );
        Ok(transition.into())
    }
}

impl From<pulsera_common::episode::PhaseTransition> for AdvanceOutcome {
    fn from(transition: pulsera_common::episode::PhaseTransition) -> Self {
        AdvanceOutcome::Transitioned {
            from: transition.old_phase,
            to: transition.new_phase,
            at: transition.transitioned_at,
        }
    }
}
