//! Topology stream watcher.
//!
//! Connects to a topology stream server and logs every change it
//! reconciles. Useful for checking a server's output without a viewer.
//!
//! # Startup Sequence
//!
//! 1. Load configuration from `topostream-client.yaml` (defaults if absent)
//! 2. Initialize structured logging (tracing)
//! 3. Register the logging consumer and start the connection loop
//! 4. Run until `Ctrl-C`, then close the connection

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use topostream_client::{ClientConfig, Consumer, ConsumerError, ConsumerService, TopologyGraph};
use topostream_types::{Alarm, Edge, Event, Situation, Vertex};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Logs every callback at `info`.
struct LogConsumer;

impl Consumer for LogConsumer {
    fn accept(
        &self,
        graph: &TopologyGraph,
        alarms: &[Alarm],
        situations: &[Situation],
    ) -> Result<(), ConsumerError> {
        info!(
            vertices = graph.vertex_count(),
            edges = graph.edge_count(),
            alarms = alarms.len(),
            situations = situations.len(),
            "Topology"
        );
        Ok(())
    }

    fn accept_vertex(&self, vertex: &Vertex) -> Result<(), ConsumerError> {
        info!(id = %vertex.id, label = %vertex.label, "Vertex added");
        Ok(())
    }

    fn accept_edge(&self, edge: &Edge) -> Result<(), ConsumerError> {
        info!(id = %edge.id, source = %edge.source.id, target = %edge.target.id, "Edge added");
        Ok(())
    }

    fn accept_deleted_edge(&self, edge_id: &str) -> Result<(), ConsumerError> {
        info!(id = edge_id, "Edge deleted");
        Ok(())
    }

    fn accept_alarm(&self, alarm: &Alarm) -> Result<(), ConsumerError> {
        info!(key = %alarm.reduction_key, severity = ?alarm.severity, "Alarm");
        Ok(())
    }

    fn accept_deleted_alarm(&self, reduction_key: &str) -> Result<(), ConsumerError> {
        info!(key = reduction_key, "Alarm cleared");
        Ok(())
    }

    fn accept_situation(&self, situation: &Situation) -> Result<(), ConsumerError> {
        info!(
            key = %situation.reduction_key,
            related = situation.related_alarms.len(),
            "Situation"
        );
        Ok(())
    }

    fn accept_deleted_situation(&self, reduction_key: &str) -> Result<(), ConsumerError> {
        info!(key = reduction_key, "Situation cleared");
        Ok(())
    }

    fn accept_event(&self, event: &Event) -> Result<(), ConsumerError> {
        info!(uei = %event.uei, vertex = %event.vertex_id, "Event");
        Ok(())
    }
}

/// Application entry point.
///
/// # Errors
///
/// Returns an error if the configuration is invalid.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Load configuration.
    let config = load_config()?;

    // 2. Initialize structured logging.
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();
    info!(url = %config.url, locations = ?config.locations, "topostream-watch starting");

    // 3. Register the consumer and connect.
    let service = ConsumerService::new(config);
    service.accept(Arc::new(LogConsumer));
    service.start()?;

    // 4. Run until interrupted.
    tokio::signal::ctrl_c()
        .await
        .context("waiting for Ctrl-C")?;
    info!("Shutdown requested");
    service.stop().await;

    Ok(())
}

/// Load `topostream-client.yaml` from the working directory, or defaults.
fn load_config() -> anyhow::Result<ClientConfig> {
    let path = Path::new("topostream-client.yaml");
    if path.exists() {
        ClientConfig::from_file(path).context("loading topostream-client.yaml")
    } else {
        ClientConfig::parse("").context("building default configuration")
    }
}
