//! Topology streaming client.
//!
//! This crate keeps a local mirror of a remote topology stream and hands
//! changes to registered observers:
//!
//! - **Reconciliation** ([`reconcile`]) -- applies snapshot and delta
//!   messages to the local vertex/edge cache
//! - **Graph** ([`graph`]) -- the reconstructed multigraph handed to
//!   consumers on every snapshot
//! - **Consumers** ([`consumer`]) -- the observer trait, with per-consumer
//!   failure isolation
//! - **Service** ([`service`]) -- subscription lifecycle over a
//!   reconnecting `WebSocket` connection with exponential backoff
//!
//! # Usage
//!
//! ```no_run
//! # async fn run(consumer: std::sync::Arc<dyn topostream_client::Consumer>) {
//! use topostream_client::{ClientConfig, ConsumerService};
//!
//! let service = ConsumerService::new(ClientConfig::for_url("ws://127.0.0.1:8980/ws"));
//! service.accept(consumer);
//! let _ = service.start();
//! // ...
//! service.stop().await;
//! # }
//! ```

pub mod backoff;
pub mod config;
mod connection;
pub mod consumer;
pub mod error;
pub mod graph;
pub mod reconcile;
pub mod service;

// Re-export primary types for convenience.
pub use backoff::Backoff;
pub use config::{BackoffConfig, ClientConfig, ConfigError};
pub use consumer::Consumer;
pub use error::{ClientError, ConsumerError};
pub use graph::TopologyGraph;
pub use reconcile::Reconciler;
pub use service::ConsumerService;
