//! # Pulsera Common Library
//!
//! Shared code for Pulsera services including:
//! - Episode data model and timeline
//! - Event types (PulseraEvent enum) and EventBus
//! - Configuration loading
//! - Common error types

pub mod config;
pub mod episode;
pub mod error;
pub mod events;

pub use episode::Episode;
pub use error::{Error, Result};
