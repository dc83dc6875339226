//! Topology streaming server.
//!
//! This crate streams a live network topology to remote viewers over
//! `WebSocket`:
//!
//! - **Broadcast engine** ([`engine`]) -- subscriber registry, filtered
//!   snapshots, alarm/node/edge/event deltas, and per-connection
//!   de-duplication of node announcements
//! - **Filter evaluator** ([`filter`]) -- location-based visibility
//!   predicates shared by snapshot generation and broadcasts
//! - **Backend source** ([`source`]) -- the pull interface snapshots are
//!   built from, plus an in-memory implementation
//! - **Transport** ([`ws`], [`router`], [`server`]) -- Axum routes for the
//!   stream (`/ws`) and a status endpoint (`/api/status`)
//!
//! # Architecture
//!
//! The monitoring backend pushes changes into the engine through its
//! `on_*` methods and is pulled from through [`source::TopologySource`]
//! whenever a client subscribes. The engine encodes each change once and
//! queues it on the bounded outbox of every connection entitled to see it.
//! A connection that cannot keep up is evicted rather than allowed to
//! stall the others.

pub mod config;
pub mod diff;
pub mod engine;
pub mod error;
pub mod filter;
pub mod handlers;
pub mod router;
pub mod server;
pub mod source;
pub mod startup;
pub mod state;
pub mod ws;

// Re-export primary types for convenience.
pub use config::{ConfigError, ServerConfig, StreamConfig, TopostreamConfig};
pub use engine::{BroadcastEngine, EngineStats, Outbox};
pub use error::{EngineError, ServerError, SourceError};
pub use router::build_router;
pub use server::{serve_listener, start_server};
pub use source::{InMemorySource, SourceSnapshot, TopologySource};
pub use startup::spawn_server;
pub use state::AppState;
