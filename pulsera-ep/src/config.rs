//! Configuration resolution for pulsera-ep
//!
//! **[EPI-RES-010]** Multi-tier resolution with CLI -> ENV -> TOML priority.
//!
//! The typed config comes from the `[episode]` section of the shared config
//! file. Environment variables override individual fields; the listen port
//! additionally honors the command line.

use pulsera_common::config::{load_config_table, resolve_listen_port};
use pulsera_common::{Error, Result};
use serde::Deserialize;
use tracing::{info, warn};

use crate::services::FusionConfig;

/// Default listen port for the episode service
pub const DEFAULT_PORT: u16 = 5810;

/// Visual capture mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OracleMode {
    /// Seedable generated metrics, no camera required
    Synthetic,
    /// Live Presage oracle at `presage_url`
    Real,
}

/// Episode service configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EpConfig {
    /// HTTP listen port
    pub port: u16,

    /// Visual capture mode
    pub oracle: OracleMode,

    /// Presage oracle base URL (required in real mode)
    pub presage_url: Option<String>,

    /// Fixed seed for the synthetic generator; entropy-seeded when absent
    pub synthetic_seed: Option<u64>,

    /// Consecutive elevated samples required to open an episode
    pub trigger_window_samples: usize,

    /// Heart rate bound in bpm for the sustained-elevation trigger
    pub sustained_hr_threshold: f64,

    /// Calming activity duration reported on the timeline
    pub calming_seconds: u64,

    /// Camera scan duration before the outcome is recorded
    pub scan_seconds: u64,

    /// Fusion weights and thresholds
    pub fusion: FusionConfig,
}

impl Default for EpConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            oracle: OracleMode::Synthetic,
            presage_url: None,
            synthetic_seed: None,
            trigger_window_samples: 3,
            sustained_hr_threshold: 120.0,
            calming_seconds: 120,
            scan_seconds: 3,
            fusion: FusionConfig::default(),
        }
    }
}

impl EpConfig {
    /// Load configuration with CLI -> ENV -> TOML -> default priority
    ///
    /// # Errors
    /// Returns error when real oracle mode is selected without a Presage URL,
    /// or when the `[episode]` section fails to parse.
    pub fn load(cli_port: Option<u16>) -> Result<Self> {
        let mut config = match load_config_table() {
            Ok(table) => match table.get("episode") {
                Some(section) => section
                    .clone()
                    .try_into::<EpConfig>()
                    .map_err(|e| Error::Config(format!("Parse [episode] section failed: {}", e)))?,
                None => EpConfig::default(),
            },
            Err(_) => EpConfig::default(),
        };

        config.apply_env_overrides();

        config.port = resolve_listen_port(
            cli_port,
            "PULSERA_EP_PORT",
            Some("episode.port"),
            config.port,
        );

        if config.oracle == OracleMode::Real && config.presage_url.is_none() {
            return Err(Error::Config(
                "Oracle mode is 'real' but no Presage URL is configured. Set one of:\n\
                 1. Environment: PULSERA_PRESAGE_URL=http://host:port\n\
                 2. TOML config: [episode] presage_url = \"http://host:port\""
                    .to_string(),
            ));
        }

        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(mode) = std::env::var("PULSERA_ORACLE") {
            match mode.as_str() {
                "synthetic" => self.oracle = OracleMode::Synthetic,
                "real" => self.oracle = OracleMode::Real,
                other => warn!("Ignoring unknown PULSERA_ORACLE value: {}", other),
            }
        }

        let env_url = std::env::var("PULSERA_PRESAGE_URL").ok();
        if env_url.is_some() {
            let mut sources = vec!["environment"];
            if self.presage_url.is_some() {
                sources.push("TOML");
            }
            if sources.len() > 1 {
                warn!(
                    "Presage URL found in multiple sources: {}. Using environment (highest priority).",
                    sources.join(", ")
                );
            }
            info!("Presage URL loaded from environment variable");
            self.presage_url = env_url;
        }

        if let Ok(seed) = std::env::var("PULSERA_SYNTHETIC_SEED") {
            match seed.parse::<u64>() {
                Ok(seed) => self.synthetic_seed = Some(seed),
                Err(_) => warn!("Ignoring unparseable PULSERA_SYNTHETIC_SEED: {}", seed),
            }
        }
    }
}
