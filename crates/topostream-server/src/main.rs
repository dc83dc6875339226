//! Topology stream server binary.
//!
//! # Startup Sequence
//!
//! 1. Load configuration from `topostream.yaml` (defaults if absent)
//! 2. Initialize structured logging (tracing)
//! 3. Build the in-memory backend, seeded from the fixture if configured
//! 4. Create the broadcast engine
//! 5. Spawn the HTTP + `WebSocket` server
//! 6. Run until `Ctrl-C`

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use topostream_server::config::{LogFormat, LoggingConfig, TopostreamConfig};
use topostream_server::{AppState, BroadcastEngine, InMemorySource, TopologySource};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Application entry point.
///
/// # Errors
///
/// Returns an error if configuration, the fixture, or the listen address
/// is invalid.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Load configuration.
    let config = load_config()?;

    // 2. Initialize structured logging.
    init_tracing(&config.logging);
    info!(
        host = %config.server.host,
        port = config.server.port,
        send_timeout_ms = config.stream.send_timeout_ms,
        outbox_capacity = config.stream.outbox_capacity,
        "topostream-server starting"
    );

    // 3. Build the backend.
    let source = match &config.source.fixture {
        Some(path) => InMemorySource::from_fixture(path)
            .with_context(|| format!("loading fixture {}", path.display()))?,
        None => {
            info!("No fixture configured, starting with an empty topology");
            InMemorySource::new()
        }
    };
    let source: Arc<dyn TopologySource> = Arc::new(source);

    // 4. Create the broadcast engine.
    let engine = Arc::new(BroadcastEngine::new(source, config.stream.send_timeout()));
    let state = Arc::new(AppState::new(engine, config.stream.clone()));

    // 5. Spawn the server.
    let handle = topostream_server::spawn_server(config.server.clone(), state)?;

    // 6. Run until interrupted.
    tokio::signal::ctrl_c()
        .await
        .context("waiting for Ctrl-C")?;
    info!("Shutdown requested");
    handle.abort();

    info!("topostream-server shutdown complete");
    Ok(())
}

/// Load `topostream.yaml` from the working directory, or defaults.
fn load_config() -> anyhow::Result<TopostreamConfig> {
    let path = Path::new("topostream.yaml");
    if path.exists() {
        TopostreamConfig::from_file(path).context("loading topostream.yaml")
    } else {
        TopostreamConfig::parse("").context("building default configuration")
    }
}

fn init_tracing(logging: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);
    match logging.format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}
