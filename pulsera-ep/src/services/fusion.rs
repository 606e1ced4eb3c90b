//! Sensor Fusion Service
//!
//! **[EPI-FUS-010]** Weighted fusion of watch vitals and camera observations
//! **[EPI-FUS-020]** Escalation decision thresholds
//!
//! Combines the trigger vitals (heart rate, HRV) with a visual reading
//! (facial expression, eye responsiveness, capture confidence) to produce
//! a combined risk score and a decision (Escalate/FalsePositive/Ambiguous).

use pulsera_common::events::{
    EyeResponsiveness, FacialExpression, FusionDecision, FusionResult, TriggerData, VisualReading,
};
use serde::Deserialize;
use thiserror::Error;

/// Fusion errors
#[derive(Debug, Error)]
pub enum FusionError {
    /// Invalid input (non-finite or out-of-range values)
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Fusion weights and decision thresholds
///
/// Loaded from the `[episode.fusion]` section of the config file when
/// present; every field falls back to the compiled default.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FusionConfig {
    /// Heart rate weight inside the watch score (default 0.7)
    pub hr_weight: f64,

    /// HRV weight inside the watch score (default 0.3)
    pub hrv_weight: f64,

    /// Facial expression weight inside the camera score (default 0.6)
    pub expression_weight: f64,

    /// Eye responsiveness weight inside the camera score (default 0.4)
    pub eye_weight: f64,

    /// Watch contribution to the combined score (default 0.5)
    pub watch_weight: f64,

    /// Camera contribution to the combined score (default 0.5)
    pub presage_weight: f64,

    /// Escalate when combined score reaches this (default 0.6)
    pub escalate_threshold: f64,

    /// False positive when combined score is at or below this (default 0.3)
    pub false_positive_threshold: f64,

    /// Without visual data, scores at or above this stay open as
    /// ambiguous instead of resolving (default 0.7)
    pub watch_only_threshold: f64,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            hr_weight: 0.7,
            hrv_weight: 0.3,
            expression_weight: 0.6,
            eye_weight: 0.4,
            watch_weight: 0.5,
            presage_weight: 0.5,
            escalate_threshold: 0.6,
            false_positive_threshold: 0.3,
            watch_only_threshold: 0.7,
        }
    }
}

/// Sensor Fusion Engine
///
/// **[EPI-FUS-010]** Pure function of its inputs: same trigger and visual
/// reading always produce the same result.
pub struct FusionEngine {
    config: FusionConfig,
}

impl FusionEngine {
    /// Create a fusion engine with default weights and thresholds
    pub fn new() -> Self {
        Self {
            config: FusionConfig::default(),
        }
    }

    /// Create a fusion engine with explicit weights and thresholds
    pub fn with_config(config: FusionConfig) -> Self {
        Self { config }
    }

    /// Fuse trigger vitals with an optional visual reading
    ///
    /// **[EPI-FUS-010]** Combination: watch = 0.7*hr + 0.3*hrv scores,
    /// camera = (0.6*expression + 0.4*eye) * confidence, combined =
    /// 0.5*watch + 0.5*camera. Without a visual reading the combined score
    /// is the watch score alone.
    ///
    /// **[EPI-FUS-020]** Decision with visual data: Escalate at >= 0.6,
    /// FalsePositive at <= 0.3, Ambiguous between. Without visual data the
    /// episode never escalates on watch evidence alone: Ambiguous at >= 0.7,
    /// FalsePositive below.
    ///
    /// Decisions compare unrounded scores; the reported scores are rounded
    /// to three decimals afterwards.
    ///
    /// # Errors
    /// Returns error if vitals are non-finite or negative, or if the visual
    /// confidence is outside 0.0-1.0
    pub fn fuse(
        &self,
        trigger: &TriggerData,
        visual: Option<&VisualReading>,
    ) -> Result<FusionResult, FusionError> {
        // Validate vitals
        if !trigger.heart_rate.is_finite() || trigger.heart_rate < 0.0 {
            return Err(FusionError::InvalidInput(format!(
                "Heart rate out of range: {}",
                trigger.heart_rate
            )));
        }
        if !trigger.hrv.is_finite() || trigger.hrv < 0.0 {
            return Err(FusionError::InvalidInput(format!(
                "HRV out of range: {}",
                trigger.hrv
            )));
        }
        if let Some(reading) = visual {
            if !reading.confidence_score.is_finite()
                || reading.confidence_score < 0.0
                || reading.confidence_score > 1.0
            {
                return Err(FusionError::InvalidInput(format!(
                    "Visual confidence out of range: {}",
                    reading.confidence_score
                )));
            }
        }

        let watch = self.watch_score(trigger);

        match visual {
            Some(reading) => {
                let expression = Self::expression_score(reading.facial_expression);
                let eye = Self::eye_score(reading.eye_responsiveness);
                let presage = (self.config.expression_weight * expression
                    + self.config.eye_weight * eye)
                    * reading.confidence_score;
                let combined =
                    self.config.watch_weight * watch + self.config.presage_weight * presage;

                let decision = if combined >= self.config.escalate_threshold {
                    FusionDecision::Escalate
                } else if combined <= self.config.false_positive_threshold {
                    FusionDecision::FalsePositive
                } else {
                    FusionDecision::Ambiguous
                };

                Ok(FusionResult {
                    decision,
                    watch_score: round3(watch),
                    presage_score: Some(round3(presage)),
                    combined_score: round3(combined),
                    explanation: Self::explain_with_visual(decision, combined, trigger, reading),
                })
            }
            None => {
                // Watch evidence alone never escalates
                let decision = if watch >= self.config.watch_only_threshold {
                    FusionDecision::Ambiguous
                } else {
                    FusionDecision::FalsePositive
                };

                Ok(FusionResult {
                    decision,
                    watch_score: round3(watch),
                    presage_score: None,
                    combined_score: round3(watch),
                    explanation: Self::explain_watch_only(decision, watch, trigger),
                })
            }
        }
    }

    /// Watch risk from heart rate and HRV
    ///
    /// Heart rate maps 80-160 bpm onto 0.0-1.0; HRV maps 50-10 ms onto
    /// 0.0-1.0 (lower variability is riskier). Both clamp at the ends.
    fn watch_score(&self, trigger: &TriggerData) -> f64 {
        let hr_score = ((trigger.heart_rate - 80.0) / 80.0).clamp(0.0, 1.0);
        let hrv_score = ((50.0 - trigger.hrv) / 40.0).clamp(0.0, 1.0);
        self.config.hr_weight * hr_score + self.config.hrv_weight * hrv_score
    }

    fn expression_score(expression: FacialExpression) -> f64 {
        match expression {
            FacialExpression::Calm => 0.1,
            FacialExpression::Confused => 0.4,
            FacialExpression::Distressed => 0.8,
            FacialExpression::Pain => 0.95,
        }
    }

    fn eye_score(eye: EyeResponsiveness) -> f64 {
        match eye {
            EyeResponsiveness::Normal => 0.1,
            EyeResponsiveness::Slow => 0.5,
            EyeResponsiveness::Unresponsive => 0.95,
        }
    }

    fn explain_with_visual(
        decision: FusionDecision,
        combined: f64,
        trigger: &TriggerData,
        reading: &VisualReading,
    ) -> String {
        let verdict = match decision {
            FusionDecision::Escalate => "Escalation recommended",
            FusionDecision::FalsePositive => "Likely false positive",
            FusionDecision::Ambiguous => "Evidence inconclusive",
        };
        format!(
            "{}: combined risk {:.0}%. Watch reported {:.0} bpm (HRV {:.0} ms); \
             camera observed a {} expression with {} eye response at {:.0}% confidence.",
            verdict,
            combined * 100.0,
            trigger.heart_rate,
            trigger.hrv,
            reading.facial_expression,
            reading.eye_responsiveness,
            reading.confidence_score * 100.0,
        )
    }

    fn explain_watch_only(decision: FusionDecision, watch: f64, trigger: &TriggerData) -> String {
        let verdict = match decision {
            FusionDecision::Ambiguous => "Evidence inconclusive",
            _ => "Likely false positive",
        };
        format!(
            "{}: no visual data available; watch risk {:.0}% from {:.0} bpm (HRV {:.0} ms).",
            verdict,
            watch * 100.0,
            trigger.heart_rate,
            trigger.hrv,
        )
    }
}

impl Default for FusionEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// Round to three decimal places for reporting
fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use pulsera_common::events::VisualSource;

    fn trigger(heart_rate: f64, hrv: f64) -> TriggerData {
        TriggerData {
            heart_rate,
            hrv,
            anomaly_type: "sustained_elevated_hr".to_string(),
        }
    }

    fn reading(
        expression: FacialExpression,
        eye: EyeResponsiveness,
        confidence: f64,
    ) -> VisualReading {
        VisualReading {
            visual_heart_rate: 120,
            breathing_rate: 20,
            blink_rate: 10,
            facial_expression: expression,
            eye_responsiveness: eye,
            confidence_score: confidence,
            source: VisualSource::Oracle,
            captured_at: chrono::Utc::now(),
        }
    }

    /// **[TC-U-FUS-010-01]** Unit test: Distressed vitals plus pain expression escalate
    #[test]
    fn tc_u_fus_010_01_escalation_with_visual() {
        let engine = FusionEngine::new();

        let result = engine
            .fuse(
                &trigger(160.0, 15.0),
                Some(&reading(
                    FacialExpression::Pain,
                    EyeResponsiveness::Unresponsive,
                    0.9,
                )),
            )
            .unwrap();

        // watch = 0.7*1.0 + 0.3*0.875 = 0.9625
        assert!((result.watch_score - 0.9625).abs() < 0.001);
        // presage = (0.6*0.95 + 0.4*0.95) * 0.9 = 0.855
        assert!((result.presage_score.unwrap() - 0.855).abs() < 0.001);
        // combined = 0.5*0.9625 + 0.5*0.855 = 0.90875, reported as 0.909
        assert!((result.combined_score - 0.909).abs() < 1e-9);
        assert_eq!(result.decision, FusionDecision::Escalate);
    }

    /// **[TC-U-FUS-010-02]** Unit test: Near-baseline vitals without visual resolve as false positive
    #[test]
    fn tc_u_fus_010_02_false_positive_without_visual() {
        let engine = FusionEngine::new();

        let result = engine.fuse(&trigger(82.0, 52.0), None).unwrap();

        // hr score = 2/80 = 0.025, hrv score clamps to 0, watch = 0.0175
        assert!((result.watch_score - 0.0175).abs() < 0.001);
        assert!(result.presage_score.is_none());
        assert_eq!(result.combined_score, result.watch_score);
        assert_eq!(result.decision, FusionDecision::FalsePositive);
    }

    /// **[TC-U-FUS-020-01]** Unit test: Verify decision thresholds with visual data
    #[test]
    fn tc_u_fus_020_01_decision_thresholds() {
        let engine = FusionEngine::new();
        let hot = trigger(160.0, 10.0); // watch = 1.0
        let cool = trigger(80.0, 50.0); // watch = 0.0

        // combined = 0.5*1.0 + 0.5*0.95 = 0.975 -> Escalate
        let escalate = engine
            .fuse(
                &hot,
                Some(&reading(
                    FacialExpression::Pain,
                    EyeResponsiveness::Unresponsive,
                    1.0,
                )),
            )
            .unwrap();
        assert_eq!(escalate.decision, FusionDecision::Escalate);

        // combined = 0.5*0.0 + 0.5*0.1 = 0.05 -> FalsePositive
        let false_positive = engine
            .fuse(
                &cool,
                Some(&reading(
                    FacialExpression::Calm,
                    EyeResponsiveness::Normal,
                    1.0,
                )),
            )
            .unwrap();
        assert_eq!(false_positive.decision, FusionDecision::FalsePositive);

        // combined = 0.5*1.0 + 0.5*0.1 = 0.55 -> Ambiguous
        let ambiguous = engine
            .fuse(
                &hot,
                Some(&reading(
                    FacialExpression::Calm,
                    EyeResponsiveness::Normal,
                    1.0,
                )),
            )
            .unwrap();
        assert_eq!(ambiguous.decision, FusionDecision::Ambiguous);
    }

    /// **[TC-U-FUS-020-02]** Unit test: High watch score without visual stays ambiguous
    #[test]
    fn tc_u_fus_020_02_watch_only_never_escalates() {
        let engine = FusionEngine::new();

        let result = engine.fuse(&trigger(200.0, 10.0), None).unwrap();

        assert_eq!(result.watch_score, 1.0);
        assert!(result.presage_score.is_none());
        assert_eq!(result.decision, FusionDecision::Ambiguous);
    }

    /// **[TC-U-FUS-010-03]** Unit test: Verify out-of-range rejection
    #[test]
    fn tc_u_fus_010_03_out_of_range_rejection() {
        let engine = FusionEngine::new();

        assert!(engine.fuse(&trigger(-5.0, 40.0), None).is_err());
        assert!(engine.fuse(&trigger(120.0, f64::NAN), None).is_err());

        let bad_confidence = reading(FacialExpression::Calm, EyeResponsiveness::Normal, 1.5);
        assert!(engine
            .fuse(&trigger(120.0, 40.0), Some(&bad_confidence))
            .is_err());
    }

    /// **[TC-U-FUS-010-04]** Unit test: Verify score clamping at range ends
    #[test]
    fn tc_u_fus_010_04_score_clamping() {
        let engine = FusionEngine::new();

        // Below-baseline heart rate and generous HRV both clamp to zero
        let floor = engine.fuse(&trigger(60.0, 90.0), None).unwrap();
        assert_eq!(floor.watch_score, 0.0);

        // Extreme vitals clamp to the ceiling
        let ceiling = engine.fuse(&trigger(250.0, 2.0), None).unwrap();
        assert_eq!(ceiling.watch_score, 1.0);
    }

    /// **[TC-U-FUS-030-01]** Unit test: Explanation names the evidence behind the decision
    #[test]
    fn tc_u_fus_030_01_explanation_mentions_evidence() {
        let engine = FusionEngine::new();

        let with_visual = engine
            .fuse(
                &trigger(160.0, 15.0),
                Some(&reading(
                    FacialExpression::Pain,
                    EyeResponsiveness::Unresponsive,
                    0.9,
                )),
            )
            .unwrap();
        assert!(with_visual.explanation.contains("160 bpm"));
        assert!(with_visual.explanation.contains("pain"));
        assert!(with_visual.explanation.contains('%'));
        assert!(with_visual.explanation.contains("Escalation recommended"));

        let watch_only = engine.fuse(&trigger(82.0, 52.0), None).unwrap();
        assert!(watch_only.explanation.contains("no visual data"));
        assert!(watch_only.explanation.contains("82 bpm"));
    }

    /// **[TC-U-FUS-030-02]** Unit test: Fusion is deterministic for identical inputs
    #[test]
    fn tc_u_fus_030_02_deterministic() {
        let engine = FusionEngine::new();
        let t = trigger(142.0, 22.0);
        let r = reading(FacialExpression::Distressed, EyeResponsiveness::Slow, 0.8);

        let first = engine.fuse(&t, Some(&r)).unwrap();
        let second = engine.fuse(&t, Some(&r)).unwrap();

        assert_eq!(first.decision, second.decision);
        assert_eq!(first.watch_score, second.watch_score);
        assert_eq!(first.presage_score, second.presage_score);
        assert_eq!(first.combined_score, second.combined_score);
        assert_eq!(first.explanation, second.explanation);
    }

    /// **[TC-U-FUS-040-01]** Unit test: Empty config section deserializes to defaults
    #[test]
    fn tc_u_fus_040_01_config_defaults() {
        let config: FusionConfig = toml::from_str("").unwrap();
        assert_eq!(config.hr_weight, 0.7);
        assert_eq!(config.escalate_threshold, 0.6);
        assert_eq!(config.watch_only_threshold, 0.7);

        let overridden: FusionConfig = toml::from_str("escalate_threshold = 0.75\n").unwrap();
        assert_eq!(overridden.escalate_threshold, 0.75);
        assert_eq!(overridden.hr_weight, 0.7);
    }
}
