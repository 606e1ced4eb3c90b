//! pulsera-ep (Episode Processor) - Episode detection and sensor fusion
//!
//! Watches trigger ingestion for qualifying anomalies, walks each episode
//! through the calming / re-evaluation / visual-check / fusion workflow and
//! broadcasts every state change to SSE dashboards and Vene caregiver
//! relays.
//!
//! **[EPI-RES-010]**: CLI -> ENV -> TOML port resolution
//! **[EPI-API-010]**: REST API endpoints
//! **[EPI-MS-010]**: SSE event streaming

use anyhow::Result;
use clap::Parser;
use tracing::info;

use pulsera_common::events::EventBus;
use pulsera_ep::config::EpConfig;
use pulsera_ep::{build_router, AppState};

/// Command-line arguments for pulsera-ep
#[derive(Parser, Debug)]
#[command(name = "pulsera-ep")]
#[command(about = "Episode Processor microservice for Pulsera")]
#[command(version)]
struct Args {
    /// Port to listen on (overrides PULSERA_EP_PORT and the config file)
    #[arg(short, long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    // Log build identification immediately after tracing init
    info!(
        "Starting Pulsera Episode Processor (pulsera-ep) v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    let args = Args::parse();

    let config = EpConfig::load(args.port)?;
    info!(
        "Configuration resolved: port={} oracle={:?} scan_seconds={} calming_seconds={}",
        config.port, config.oracle, config.scan_seconds, config.calming_seconds
    );

    let event_bus = EventBus::new(100);
    let state = AppState::new(&config, event_bus)?;
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(format!("127.0.0.1:{}", config.port)).await?;
    info!("pulsera-ep listening on http://127.0.0.1:{}", config.port);
    info!("Health check: http://127.0.0.1:{}/health", config.port);
    info!("Event stream: http://127.0.0.1:{}/events", config.port);

    axum::serve(listener, app).await?;

    Ok(())
}
