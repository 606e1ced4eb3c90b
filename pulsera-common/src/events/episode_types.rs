//! Episode-related type definitions
//!
//! Supporting types for the episode lifecycle, visual corroboration and
//! sensor fusion.

use serde::{Deserialize, Serialize};

/// Episode lifecycle phase
///
/// **[EPI-WF-010]** An episode progresses through 7 defined phases:
/// anomaly_detected → calming → re_evaluating → visual_check → fusing →
/// escalating → resolved, where fusing may route directly to resolved on a
/// false-positive decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EpisodePhase {
    /// Anomalous wearable reading accepted, episode opened
    AnomalyDetected,
    /// Subject guided through a calming interval
    Calming,
    /// Wearable vitals re-checked after calming
    ReEvaluating,
    /// Secondary visual check-in (camera oracle or fallback)
    VisualCheck,
    /// Watch and visual signals combined into one decision
    Fusing,
    /// Caregiver attention requested, awaiting acknowledgment
    Escalating,
    /// Terminal phase, episode archived
    Resolved,
}

impl EpisodePhase {
    /// Fixed display label for UI consumers
    ///
    /// **[EPI-UI-010]** Rendering contract: consumers map `phase` to a label
    /// and color without any episode logic of their own.
    pub fn display_label(&self) -> &'static str {
        match self {
            EpisodePhase::AnomalyDetected => "Anomaly Detected",
            EpisodePhase::Calming => "Calming",
            EpisodePhase::ReEvaluating => "Re-evaluating",
            EpisodePhase::VisualCheck => "Visual Check-in",
            EpisodePhase::Fusing => "Fusing Signals",
            EpisodePhase::Escalating => "Escalating",
            EpisodePhase::Resolved => "Resolved",
        }
    }

    /// Fixed display color (hex) paired with [`display_label`](Self::display_label)
    pub fn display_color(&self) -> &'static str {
        match self {
            EpisodePhase::AnomalyDetected => "#EF4444",
            EpisodePhase::Calming => "#8B5CF6",
            EpisodePhase::ReEvaluating => "#F59E0B",
            EpisodePhase::VisualCheck => "#3B82F6",
            EpisodePhase::Fusing => "#06B6D4",
            EpisodePhase::Escalating => "#DC2626",
            EpisodePhase::Resolved => "#10B981",
        }
    }
}

impl std::fmt::Display for EpisodePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EpisodePhase::AnomalyDetected => write!(f, "anomaly_detected"),
            EpisodePhase::Calming => write!(f, "calming"),
            EpisodePhase::ReEvaluating => write!(f, "re_evaluating"),
            EpisodePhase::VisualCheck => write!(f, "visual_check"),
            EpisodePhase::Fusing => write!(f, "fusing"),
            EpisodePhase::Escalating => write!(f, "escalating"),
            EpisodePhase::Resolved => write!(f, "resolved"),
        }
    }
}

/// Trigger vitals captured once at episode creation, immutable afterwards
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerData {
    /// Wearable heart rate (bpm) at trigger time
    pub heart_rate: f64,
    /// Heart rate variability (ms) at trigger time
    pub hrv: f64,
    /// Anomaly classification tag (e.g. "sustained_elevated_hr")
    pub anomaly_type: String,
}

/// One structured timeline log line, immutable once appended
///
/// `phase` is a free-form label rather than [`EpisodePhase`]: fusion appends
/// a `fusion_complete` entry and visual capture appends an outcome entry, so
/// labels outnumber phases.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimelineEntry {
    /// Entry label (phase name or step tag)
    pub phase: String,
    /// When the entry was appended
    pub timestamp: chrono::DateTime<chrono::Utc>,
    /// Fields relevant to this step (calming duration, vitals, fusion payload)
    pub data: serde_json::Value,
}

/// Facial expression classes reported by the visual channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FacialExpression {
    Calm,
    Confused,
    Distressed,
    Pain,
}

impl std::fmt::Display for FacialExpression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FacialExpression::Calm => write!(f, "calm"),
            FacialExpression::Confused => write!(f, "confused"),
            FacialExpression::Distressed => write!(f, "distressed"),
            FacialExpression::Pain => write!(f, "pain"),
        }
    }
}

/// Eye responsiveness classes reported by the visual channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EyeResponsiveness {
    Normal,
    Slow,
    Unresponsive,
}

impl std::fmt::Display for EyeResponsiveness {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EyeResponsiveness::Normal => write!(f, "normal"),
            EyeResponsiveness::Slow => write!(f, "slow"),
            EyeResponsiveness::Unresponsive => write!(f, "unresponsive"),
        }
    }
}

/// Where a visual reading came from
///
/// **[EPI-VIS-030]** Fallback-derived readings must be distinguishable from
/// genuine oracle output for any human reviewer, so the marker rides in the
/// reading itself and everything derived from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VisualSource {
    /// Real camera-based vitals oracle
    Oracle,
    /// Synthetic demo fallback generator
    Synthetic,
}

impl std::fmt::Display for VisualSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VisualSource::Oracle => write!(f, "oracle"),
            VisualSource::Synthetic => write!(f, "synthetic"),
        }
    }
}

/// Canonical visual corroboration result
///
/// **[EPI-VIS-010]** Normalized secondary-signal shape, produced either from
/// real oracle metrics or from the synthetic fallback.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisualReading {
    /// Camera-estimated heart rate (bpm, rounded)
    pub visual_heart_rate: i32,
    /// Breaths per minute (rounded)
    pub breathing_rate: i32,
    /// Blinks per minute (rounded)
    pub blink_rate: i32,
    /// Classified facial expression
    pub facial_expression: FacialExpression,
    /// Classified eye responsiveness
    pub eye_responsiveness: EyeResponsiveness,
    /// Combined channel confidence in [0, 1]
    pub confidence_score: f64,
    /// Oracle or synthetic fallback marker
    pub source: VisualSource,
    /// When the reading was captured
    pub captured_at: chrono::DateTime<chrono::Utc>,
}

/// Discrete fusion decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FusionDecision {
    /// Both channels indicate genuine distress, request caregiver attention
    Escalate,
    /// The anomalous reading did not reflect genuine distress
    FalsePositive,
    /// Channels disagree, escalate with caution
    Ambiguous,
}

impl FusionDecision {
    /// Convert to the canonical string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            FusionDecision::Escalate => "escalate",
            FusionDecision::FalsePositive => "false_positive",
            FusionDecision::Ambiguous => "ambiguous",
        }
    }
}

impl std::fmt::Display for FusionDecision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Sensor fusion outcome attached to an episode when fusing completes
///
/// **[EPI-FUS-010]** All scores are rounded to 3 decimal places.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FusionResult {
    /// Discrete decision derived from the combined score
    pub decision: FusionDecision,
    /// Wearable-channel score in [0, 1]
    pub watch_score: f64,
    /// Visual-channel score in [0, 1], None when no visual data was available
    pub presage_score: Option<f64>,
    /// Blended severity score in [0, 1]
    pub combined_score: f64,
    /// Reproducible human-readable summary of the decision
    pub explanation: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_episode_phase_wire_values() {
        let json = serde_json::to_string(&EpisodePhase::AnomalyDetected).unwrap();
        assert_eq!(json, "\"anomaly_detected\"");
        let json = serde_json::to_string(&EpisodePhase::ReEvaluating).unwrap();
        assert_eq!(json, "\"re_evaluating\"");

        let phase: EpisodePhase = serde_json::from_str("\"visual_check\"").unwrap();
        assert_eq!(phase, EpisodePhase::VisualCheck);
    }

    #[test]
    fn test_episode_phase_display_matches_wire() {
        for phase in [
            EpisodePhase::AnomalyDetected,
            EpisodePhase::Calming,
            EpisodePhase::ReEvaluating,
            EpisodePhase::VisualCheck,
            EpisodePhase::Fusing,
            EpisodePhase::Escalating,
            EpisodePhase::Resolved,
        ] {
            let wire = serde_json::to_string(&phase).unwrap();
            assert_eq!(wire, format!("\"{}\"", phase));
        }
    }

    /// **[EPI-UI-010]** Seven fixed label/color pairs, all distinct
    #[test]
    fn test_display_label_color_pairs() {
        let phases = [
            EpisodePhase::AnomalyDetected,
            EpisodePhase::Calming,
            EpisodePhase::ReEvaluating,
            EpisodePhase::VisualCheck,
            EpisodePhase::Fusing,
            EpisodePhase::Escalating,
            EpisodePhase::Resolved,
        ];

        let mut labels: Vec<&str> = phases.iter().map(|p| p.display_label()).collect();
        let mut colors: Vec<&str> = phases.iter().map(|p| p.display_color()).collect();
        labels.dedup();
        colors.dedup();
        assert_eq!(labels.len(), 7, "labels must be distinct");
        assert_eq!(colors.len(), 7, "colors must be distinct");

        for color in colors {
            assert!(color.starts_with('#') && color.len() == 7);
        }
    }

    #[test]
    fn test_fusion_decision_wire_values() {
        assert_eq!(
            serde_json::to_string(&FusionDecision::FalsePositive).unwrap(),
            "\"false_positive\""
        );
        assert_eq!(FusionDecision::Escalate.as_str(), "escalate");
        assert_eq!(FusionDecision::Ambiguous.to_string(), "ambiguous");
    }

    #[test]
    fn test_visual_reading_round_trip() {
        let reading = VisualReading {
            visual_heart_rate: 138,
            breathing_rate: 25,
            blink_rate: 6,
            facial_expression: FacialExpression::Pain,
            eye_responsiveness: EyeResponsiveness::Slow,
            confidence_score: 0.87,
            source: VisualSource::Synthetic,
            captured_at: chrono::Utc::now(),
        };

        let json = serde_json::to_string(&reading).unwrap();
        assert!(json.contains("\"facial_expression\":\"pain\""));
        assert!(json.contains("\"source\":\"synthetic\""));

        let back: VisualReading = serde_json::from_str(&json).unwrap();
        assert_eq!(back.visual_heart_rate, 138);
        assert_eq!(back.facial_expression, FacialExpression::Pain);
        assert_eq!(back.source, VisualSource::Synthetic);
    }
}
