//! HTTP API handlers for pulsera-ep
//!
//! **[EPI-MS-010]** Integration via HTTP REST + SSE + WebSocket relay
//! **[EPI-API-010]** API endpoint implementations

pub mod episodes;
pub mod health;
pub mod sse;
pub mod triggers;
pub mod vene;
pub mod visual;

pub use episodes::episode_routes;
pub use health::health_routes;
pub use sse::event_stream;
pub use triggers::trigger_routes;
pub use vene::vene_relay;
pub use visual::visual_routes;
