//! Presage visual oracle client and synthetic fallback
//!
//! **[EPI-ORA-010]** Camera oracle integration and metric mapping
//! **[EPI-ORA-020]** Synthetic vitals generation for camera-less demos
//!
//! The capture capability is chosen once at startup (config `oracle` mode).
//! A failing camera yields an unavailable outcome, never a silent switch to
//! synthetic data.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use uuid::Uuid;

use pulsera_common::events::{
    EyeResponsiveness, FacialExpression, VisualReading, VisualSource,
};

const USER_AGENT: &str = "Pulsera/0.1.0";

/// Visual oracle errors
#[derive(Debug, Error)]
pub enum OracleError {
    #[error("Camera reported no usable data")]
    NoData,

    #[error("Network error: {0}")]
    Network(String),

    #[error("Oracle error {0}: {1}")]
    Api(u16, String),

    #[error("Parse error: {0}")]
    Parse(String),
}

/// Raw metrics as the Presage oracle reports them
///
/// The oracle wire format is camelCase JSON; everything downstream of the
/// mapping speaks snake_case.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RawVisualMetrics {
    pub pulse_rate: f64,
    pub pulse_confidence: f64,
    pub breathing_rate: f64,
    pub breathing_confidence: f64,
    pub blink_rate: f64,
    pub is_talking: bool,
    pub has_data: bool,
}

/// Map raw oracle metrics onto a categorical visual reading
///
/// **[EPI-ORA-010]** Rates are rounded to whole numbers first; the category
/// rules then run in priority order on the rounded values:
/// - pain: pulse > 130 and breathing > 24
/// - distressed: pulse > 110 and breathing > 20
/// - confused: blink < 5 or blink > 35
/// - calm otherwise
///
/// Eye responsiveness bands on the rounded blink rate: unresponsive below 3,
/// slow below 10, normal otherwise. Confidence is the mean of the pulse and
/// breathing confidences, clamped to 0.0-1.0.
///
/// # Errors
/// Returns `NoData` when the oracle flagged the frame as unusable.
pub fn map_raw_metrics(
    raw: &RawVisualMetrics,
    source: VisualSource,
) -> Result<VisualReading, OracleError> {
    if !raw.has_data {
        return Err(OracleError::NoData);
    }

    let visual_heart_rate = raw.pulse_rate.round() as i32;
    let breathing_rate = raw.breathing_rate.round() as i32;
    let blink_rate = raw.blink_rate.round() as i32;

    let facial_expression = if visual_heart_rate > 130 && breathing_rate > 24 {
        FacialExpression::Pain
    } else if visual_heart_rate > 110 && breathing_rate > 20 {
        FacialExpression::Distressed
    } else if blink_rate < 5 || blink_rate > 35 {
        FacialExpression::Confused
    } else {
        FacialExpression::Calm
    };

    let eye_responsiveness = if blink_rate < 3 {
        EyeResponsiveness::Unresponsive
    } else if blink_rate < 10 {
        EyeResponsiveness::Slow
    } else {
        EyeResponsiveness::Normal
    };

    let confidence_score =
        ((raw.pulse_confidence + raw.breathing_confidence) / 2.0).clamp(0.0, 1.0);

    Ok(VisualReading {
        visual_heart_rate,
        breathing_rate,
        blink_rate,
        facial_expression,
        eye_responsiveness,
        confidence_score,
        source,
        captured_at: chrono::Utc::now(),
    })
}

/// Seedable generator for synthetic camera metrics
///
/// **[EPI-ORA-020]** Draws raw metrics inside the documented ranges; the
/// expression and eye categories fall out of the shared mapping, so synthetic
/// and real captures go through identical rules.
pub struct SyntheticVitals {
    rng: StdRng,
}

impl SyntheticVitals {
    /// Entropy-seeded generator for normal operation
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    /// Fixed-seed generator for reproducible demos and tests
    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Draw one set of raw metrics
    ///
    /// Distressed draws: pulse 130-150, breathing 22-28, blink under 10,
    /// confidences 0.75-0.95. Calm draws: pulse 70-85, breathing 12-16,
    /// blink 12-25, confidences 0.85-0.95.
    pub fn draw(&mut self, is_distressed: bool) -> RawVisualMetrics {
        if is_distressed {
            RawVisualMetrics {
                pulse_rate: self.rng.gen_range(130.0..150.0),
                pulse_confidence: self.rng.gen_range(0.75..0.95),
                breathing_rate: self.rng.gen_range(22.0..28.0),
                breathing_confidence: self.rng.gen_range(0.75..0.95),
                // Stays below 9.5 so the rounded value lands in the slow or
                // unresponsive band
                blink_rate: self.rng.gen_range(0.0..9.5),
                is_talking: false,
                has_data: true,
            }
        } else {
            RawVisualMetrics {
                pulse_rate: self.rng.gen_range(70.0..85.0),
                pulse_confidence: self.rng.gen_range(0.85..0.95),
                breathing_rate: self.rng.gen_range(12.0..16.0),
                breathing_confidence: self.rng.gen_range(0.85..0.95),
                blink_rate: self.rng.gen_range(12.0..25.0),
                is_talking: false,
                has_data: true,
            }
        }
    }
}

impl Default for SyntheticVitals {
    fn default() -> Self {
        Self::new()
    }
}

/// Presage oracle HTTP client
pub struct PresageClient {
    http_client: reqwest::Client,
    base_url: String,
}

impl PresageClient {
    pub fn new(base_url: String) -> Result<Self, OracleError> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| OracleError::Network(e.to_string()))?;

        Ok(Self {
            http_client,
            base_url,
        })
    }

    /// Request one scan of the subject from the camera oracle
    pub async fn scan(&self, subject_id: Uuid) -> Result<RawVisualMetrics, OracleError> {
        let url = format!(
            "{}/scan/{}",
            self.base_url.trim_end_matches('/'),
            subject_id
        );

        tracing::debug!(%subject_id, "Querying Presage oracle");

        let response = self
            .http_client
            .get(&url)
            .send()
            .await
            .map_err(|e| OracleError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(OracleError::Api(status.as_u16(), error_text));
        }

        let raw: RawVisualMetrics = response
            .json()
            .await
            .map_err(|e| OracleError::Parse(e.to_string()))?;

        tracing::info!(
            %subject_id,
            pulse_rate = raw.pulse_rate,
            has_data = raw.has_data,
            "Presage scan returned"
        );

        Ok(raw)
    }
}

/// Capture capability selected at startup
///
/// **[EPI-ORA-020]** The mode is explicit configuration. Real mode failures
/// surface as errors for the caller to record as an unavailable outcome.
pub enum VisualCapture {
    /// Live Presage oracle
    Real(PresageClient),
    /// Seedable synthetic generator
    Synthetic(Mutex<SyntheticVitals>),
}

impl VisualCapture {
    /// Capture one visual reading for the subject
    ///
    /// `distressed_profile` steers the synthetic generator only; real
    /// captures ignore it.
    pub async fn capture(
        &self,
        subject_id: Uuid,
        distressed_profile: bool,
    ) -> Result<VisualReading, OracleError> {
        match self {
            VisualCapture::Real(client) => {
                let raw = client.scan(subject_id).await?;
                map_raw_metrics(&raw, VisualSource::Oracle)
            }
            VisualCapture::Synthetic(vitals) => {
                let raw = vitals.lock().await.draw(distressed_profile);
                map_raw_metrics(&raw, VisualSource::Synthetic)
            }
        }
    }

    pub fn source(&self) -> VisualSource {
        match self {
            VisualCapture::Real(_) => VisualSource::Oracle,
            VisualCapture::Synthetic(_) => VisualSource::Synthetic,
        }
    }
}
