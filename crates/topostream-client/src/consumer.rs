//! Observer interface for reconciled topology changes.
//!
//! A [`Consumer`] is whatever sits behind the client: a renderer, a test
//! recorder, a log sink. Callbacks run on the client's connection task, so
//! an implementation that mutates UI state should record the change and
//! let its own loop pick it up.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use topostream_types::{Alarm, Edge, Event, Situation, Vertex};
use tracing::warn;

use crate::error::ConsumerError;
use crate::graph::TopologyGraph;

/// Receives topology changes from the reconciliation engine.
///
/// Only [`Consumer::accept`] is required; every delta callback defaults to
/// ignoring the change.
pub trait Consumer: Send + Sync {
    /// A full topology was received. Replaces everything seen so far.
    fn accept(
        &self,
        graph: &TopologyGraph,
        alarms: &[Alarm],
        situations: &[Situation],
    ) -> Result<(), ConsumerError>;

    /// A vertex was added.
    fn accept_vertex(&self, _vertex: &Vertex) -> Result<(), ConsumerError> {
        Ok(())
    }

    /// A vertex was removed.
    fn accept_deleted_vertex(&self, _vertex_id: &str) -> Result<(), ConsumerError> {
        Ok(())
    }

    /// An edge was added.
    fn accept_edge(&self, _edge: &Edge) -> Result<(), ConsumerError> {
        Ok(())
    }

    /// An edge was removed.
    fn accept_deleted_edge(&self, _edge_id: &str) -> Result<(), ConsumerError> {
        Ok(())
    }

    /// An alarm was raised or updated.
    fn accept_alarm(&self, _alarm: &Alarm) -> Result<(), ConsumerError> {
        Ok(())
    }

    /// An alarm was cleared.
    fn accept_deleted_alarm(&self, _reduction_key: &str) -> Result<(), ConsumerError> {
        Ok(())
    }

    /// A situation was raised or updated.
    fn accept_situation(&self, _situation: &Situation) -> Result<(), ConsumerError> {
        Ok(())
    }

    /// A situation was cleared.
    fn accept_deleted_situation(&self, _reduction_key: &str) -> Result<(), ConsumerError> {
        Ok(())
    }

    /// A monitoring event occurred. Events are never replayed.
    fn accept_event(&self, _event: &Event) -> Result<(), ConsumerError> {
        Ok(())
    }
}

/// Invoke `callback` on every consumer.
///
/// An error or panic from one consumer is logged and delivery continues
/// with the next.
pub(crate) fn fan_out<F>(consumers: &[Arc<dyn Consumer>], callback: &str, subject: &str, f: F)
where
    F: Fn(&dyn Consumer) -> Result<(), ConsumerError>,
{
    for (index, consumer) in consumers.iter().enumerate() {
        match catch_unwind(AssertUnwindSafe(|| f(consumer.as_ref()))) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                warn!(consumer = index, callback, subject, error = %e, "Consumer failed");
            }
            Err(_panic) => {
                warn!(consumer = index, callback, subject, "Consumer panicked");
            }
        }
    }
}
