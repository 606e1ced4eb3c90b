//! Service modules for the episode workflow
//!
//! **[EPI-COMP-010]** Component implementations

pub mod fusion;
pub mod phase_engine;
pub mod triggers;
pub mod visual;

pub use fusion::{FusionConfig, FusionEngine, FusionError};
pub use phase_engine::{
    AdvanceContext, AdvanceOutcome, EngineError, PhaseEngine, VisualOutcome, VitalsSnapshot,
};
pub use triggers::{TriggerError, TriggerMonitor, WatchSample};
pub use visual::{
    map_raw_metrics, OracleError, PresageClient, RawVisualMetrics, SyntheticVitals, VisualCapture,
};
