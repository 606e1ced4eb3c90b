//! Watch sample monitoring and anomaly trigger detection
//!
//! **[EPI-TRG-010]** Sustained-anomaly detection over a rolling window
//!
//! The monitor keeps the last N samples per subject. A trigger fires when a
//! full window of consecutive samples all sit above the heart rate bound,
//! and the window resets so the next trigger needs a fresh run.

use chrono::{DateTime, Utc};
use pulsera_common::events::TriggerData;
use std::collections::{HashMap, VecDeque};
use thiserror::Error;
use uuid::Uuid;

/// Anomaly type reported for sustained elevated heart rate
pub const ANOMALY_SUSTAINED_HR: &str = "sustained_elevated_hr";

/// Trigger monitor errors
#[derive(Debug, Error)]
pub enum TriggerError {
    /// Invalid sample values (non-finite or negative)
    #[error("Invalid sample: {0}")]
    InvalidSample(String),

    /// Invalid detection parameters
    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),
}

/// One watch reading
#[derive(Debug, Clone, Copy)]
pub struct WatchSample {
    pub heart_rate: f64,
    pub hrv: f64,
    pub recorded_at: DateTime<Utc>,
}

/// Rolling-window anomaly detector over the watch sample feed
pub struct TriggerMonitor {
    /// Consecutive samples required to fire (default: 3)
    window_size: usize,

    /// Heart rate bound in bpm; a sample above it counts toward the run
    /// (default: 120.0)
    hr_threshold: f64,

    /// Per-subject sample windows
    windows: HashMap<Uuid, VecDeque<WatchSample>>,
}

impl TriggerMonitor {
    /// Create a monitor with default window and threshold
    pub fn new() -> Self {
        Self {
            window_size: 3,
            hr_threshold: 120.0,
            windows: HashMap::new(),
        }
    }

    /// Set the number of consecutive samples required to fire
    pub fn with_window_size(mut self, window_size: usize) -> Result<Self, TriggerError> {
        if window_size == 0 {
            return Err(TriggerError::InvalidParameters(
                "Window size must be >= 1".to_string(),
            ));
        }
        self.window_size = window_size;
        Ok(self)
    }

    /// Set the heart rate bound in bpm
    pub fn with_hr_threshold(mut self, hr_threshold: f64) -> Result<Self, TriggerError> {
        if !hr_threshold.is_finite() || hr_threshold <= 0.0 {
            return Err(TriggerError::InvalidParameters(
                "Heart rate threshold must be a positive number".to_string(),
            ));
        }
        self.hr_threshold = hr_threshold;
        Ok(self)
    }

    /// Record one sample and report whether it completed an anomalous run
    ///
    /// Returns `Some(TriggerData)` built from the newest sample when the
    /// window fills with above-bound readings. The window clears on fire.
    ///
    /// # Errors
    /// Rejects non-finite or negative vitals.
    pub fn record_sample(
        &mut self,
        subject_id: Uuid,
        heart_rate: f64,
        hrv: f64,
    ) -> Result<Option<TriggerData>, TriggerError> {
        if !heart_rate.is_finite() || heart_rate < 0.0 {
            return Err(TriggerError::InvalidSample(format!(
                "Heart rate out of range: {}",
                heart_rate
            )));
        }
        if !hrv.is_finite() || hrv < 0.0 {
            return Err(TriggerError::InvalidSample(format!(
                "HRV out of range: {}",
                hrv
            )));
        }

        let window = self.windows.entry(subject_id).or_default();
        window.push_back(WatchSample {
            heart_rate,
            hrv,
            recorded_at: Utc::now(),
        });
        if window.len() > self.window_size {
            window.pop_front();
        }

        let sustained = window.len() == self.window_size
            && window.iter().all(|s| s.heart_rate > self.hr_threshold);
        if !sustained {
            return Ok(None);
        }

        window.clear();
        tracing::info!(
            %subject_id,
            heart_rate,
            hrv,
            "Sustained elevated heart rate detected"
        );
        Ok(Some(TriggerData {
            heart_rate,
            hrv,
            anomaly_type: ANOMALY_SUSTAINED_HR.to_string(),
        }))
    }

    /// Most recent sample for a subject, if any survived the last fire
    pub fn latest(&self, subject_id: Uuid) -> Option<&WatchSample> {
        self.windows.get(&subject_id).and_then(|w| w.back())
    }
}

impl Default for TriggerMonitor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_monitor_creation() {
        let monitor = TriggerMonitor::new();
        assert_eq!(monitor.window_size, 3);
        assert_eq!(monitor.hr_threshold, 120.0);
    }

    #[test]
    fn test_with_parameters() {
        let monitor = TriggerMonitor::new()
            .with_window_size(5)
            .unwrap()
            .with_hr_threshold(110.0)
            .unwrap();
        assert_eq!(monitor.window_size, 5);
        assert_eq!(monitor.hr_threshold, 110.0);
    }

    #[test]
    fn test_invalid_parameters() {
        assert!(TriggerMonitor::new().with_window_size(0).is_err());
        assert!(TriggerMonitor::new().with_hr_threshold(-10.0).is_err());
        assert!(TriggerMonitor::new().with_hr_threshold(f64::NAN).is_err());
    }

    /// **[TC-U-TRG-010-01]** A full window of elevated samples fires once
    #[test]
    fn tc_u_trg_010_01_sustained_run_fires() {
        let mut monitor = TriggerMonitor::new();
        let subject = Uuid::new_v4();

        assert!(monitor.record_sample(subject, 135.0, 25.0).unwrap().is_none());
        assert!(monitor.record_sample(subject, 138.0, 24.0).unwrap().is_none());

        let trigger = monitor
            .record_sample(subject, 142.0, 22.0)
            .unwrap()
            .expect("third elevated sample should fire");
        assert_eq!(trigger.heart_rate, 142.0);
        assert_eq!(trigger.hrv, 22.0);
        assert_eq!(trigger.anomaly_type, ANOMALY_SUSTAINED_HR);
    }

    /// **[TC-U-TRG-010-02]** A below-bound sample breaks the run
    #[test]
    fn tc_u_trg_010_02_interrupted_run() {
        let mut monitor = TriggerMonitor::new();
        let subject = Uuid::new_v4();

        assert!(monitor.record_sample(subject, 135.0, 25.0).unwrap().is_none());
        assert!(monitor.record_sample(subject, 138.0, 24.0).unwrap().is_none());
        // Recovery sample resets the streak
        assert!(monitor.record_sample(subject, 85.0, 45.0).unwrap().is_none());
        assert!(monitor.record_sample(subject, 140.0, 23.0).unwrap().is_none());
        assert!(monitor.record_sample(subject, 141.0, 23.0).unwrap().is_none());

        // Window now holds [85, 140, 141]: still not a sustained run
        assert!(monitor
            .record_sample(subject, 142.0, 22.0)
            .unwrap()
            .is_some());
    }

    /// **[TC-U-TRG-010-03]** The window clears after firing
    #[test]
    fn tc_u_trg_010_03_window_clears_on_fire() {
        let mut monitor = TriggerMonitor::new();
        let subject = Uuid::new_v4();

        for _ in 0..2 {
            monitor.record_sample(subject, 135.0, 25.0).unwrap();
        }
        assert!(monitor.record_sample(subject, 136.0, 25.0).unwrap().is_some());
        assert!(monitor.latest(subject).is_none());

        // The next elevated sample starts a fresh run instead of re-firing
        assert!(monitor.record_sample(subject, 137.0, 25.0).unwrap().is_none());
        assert!(monitor.record_sample(subject, 138.0, 25.0).unwrap().is_none());
        assert!(monitor.record_sample(subject, 139.0, 25.0).unwrap().is_some());
    }

    /// **[TC-U-TRG-010-04]** Subjects are tracked independently
    #[test]
    fn tc_u_trg_010_04_per_subject_windows() {
        let mut monitor = TriggerMonitor::new();
        let iris = Uuid::new_v4();
        let noah = Uuid::new_v4();

        monitor.record_sample(iris, 135.0, 25.0).unwrap();
        monitor.record_sample(noah, 72.0, 55.0).unwrap();
        monitor.record_sample(iris, 138.0, 24.0).unwrap();
        monitor.record_sample(noah, 74.0, 52.0).unwrap();

        assert!(monitor.record_sample(iris, 142.0, 22.0).unwrap().is_some());
        assert!(monitor.record_sample(noah, 73.0, 54.0).unwrap().is_none());
    }

    #[test]
    fn test_latest_returns_most_recent() {
        let mut monitor = TriggerMonitor::new();
        let subject = Uuid::new_v4();

        monitor.record_sample(subject, 90.0, 40.0).unwrap();
        monitor.record_sample(subject, 95.0, 38.0).unwrap();

        let latest = monitor.latest(subject).expect("latest sample");
        assert_eq!(latest.heart_rate, 95.0);
        assert_eq!(latest.hrv, 38.0);
        assert!(monitor.latest(Uuid::new_v4()).is_none());
    }

    #[test]
    fn test_invalid_samples_rejected() {
        let mut monitor = TriggerMonitor::new();
        let subject = Uuid::new_v4();

        assert!(monitor.record_sample(subject, f64::NAN, 40.0).is_err());
        assert!(monitor.record_sample(subject, -10.0, 40.0).is_err());
        assert!(monitor.record_sample(subject, 90.0, f64::INFINITY).is_err());
    }
}
