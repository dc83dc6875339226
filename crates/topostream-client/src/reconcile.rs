//! Client reconciliation engine.
//!
//! The [`Reconciler`] mirrors the server's view of the topology from the
//! snapshot-plus-delta stream. A `Topology` message replaces the cache
//! wholesale; every other message is applied incrementally on top.
//!
//! # Locking
//!
//! Cache mutation happens under one mutex, so a rebuild is atomic with
//! respect to deltas. Consumers are notified only after the lock has been
//! released, from a copy of the registry taken at notification time, so a
//! consumer may register or dismiss others from within a callback.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use chrono::Utc;
use topostream_types::{
    Alarm, AlarmDelete, CodecError, EdgeVertices, Event, RawAlarm, RawEvent, RawNode,
    RawTopologyEdge, Situation, StreamMessage, Topology, Vertex, edge_id,
};
use tracing::{debug, info, warn};

use crate::consumer::{Consumer, fan_out};
use crate::graph::TopologyGraph;

/// Everything the client knows about the topology.
#[derive(Debug, Default)]
struct ClientCache {
    /// Vertices and edges.
    graph: TopologyGraph,
    /// Plain alarms from the last snapshot.
    initial_alarms: Vec<Alarm>,
    /// Situations from the last snapshot.
    initial_situations: Vec<Situation>,
    /// Whether a snapshot has been received.
    initialized: bool,
}

/// Copy of the last snapshot handed to consumers.
struct Snapshot {
    graph: TopologyGraph,
    alarms: Vec<Alarm>,
    situations: Vec<Situation>,
}

/// Applies stream messages to the local cache and notifies consumers.
#[derive(Default)]
pub struct Reconciler {
    cache: Mutex<ClientCache>,
    consumers: RwLock<Vec<Arc<dyn Consumer>>>,
}

impl Reconciler {
    /// Create an empty, uninitialized reconciler with no consumers.
    pub fn new() -> Self {
        Self::default()
    }

    // -------------------------------------------------------------------
    // Consumer registry
    // -------------------------------------------------------------------

    /// Register a consumer. Returns the number registered afterwards.
    pub fn add_consumer(&self, consumer: Arc<dyn Consumer>) -> usize {
        let mut consumers = self
            .consumers
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        consumers.push(consumer);
        consumers.len()
    }

    /// Remove a consumer by identity. Returns the number registered
    /// afterwards.
    pub fn remove_consumer(&self, consumer: &Arc<dyn Consumer>) -> usize {
        let target = Arc::as_ptr(consumer).cast::<()>();
        let mut consumers = self
            .consumers
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        consumers.retain(|c| Arc::as_ptr(c).cast::<()>() != target);
        consumers.len()
    }

    /// Number of registered consumers.
    pub fn consumer_count(&self) -> usize {
        self.consumers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Hand the last received snapshot to a single consumer.
    ///
    /// Returns `false` without calling the consumer if no snapshot has been
    /// received yet.
    pub fn replay_to(&self, consumer: &Arc<dyn Consumer>) -> bool {
        let snapshot = {
            let cache = self.lock_cache();
            if !cache.initialized {
                return false;
            }
            Snapshot::of(&cache)
        };
        fan_out(std::slice::from_ref(consumer), "accept", "replay", |c| {
            c.accept(&snapshot.graph, &snapshot.alarms, &snapshot.situations)
        });
        true
    }

    // -------------------------------------------------------------------
    // Cache queries
    // -------------------------------------------------------------------

    /// Whether a snapshot has been received.
    pub fn is_initialized(&self) -> bool {
        self.lock_cache().initialized
    }

    /// Number of cached vertices.
    pub fn vertex_count(&self) -> usize {
        self.lock_cache().graph.vertex_count()
    }

    /// Number of cached edges.
    pub fn edge_count(&self) -> usize {
        self.lock_cache().graph.edge_count()
    }

    /// Copy of the current graph.
    pub fn graph(&self) -> TopologyGraph {
        self.lock_cache().graph.clone()
    }

    // -------------------------------------------------------------------
    // Message handling
    // -------------------------------------------------------------------

    /// Decode a text frame and apply it.
    ///
    /// A frame that fails to decode is logged and dropped; the error is
    /// returned for callers that want to count them.
    pub fn handle_text(&self, text: &str) -> Result<(), CodecError> {
        match StreamMessage::decode(text) {
            Ok(message) => {
                self.apply(message);
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "Dropping undecodable stream message");
                Err(e)
            }
        }
    }

    /// Apply one stream message.
    pub fn apply(&self, message: StreamMessage) {
        match message {
            StreamMessage::Topology(topology) => self.apply_topology(&topology),
            StreamMessage::Node(node) => self.apply_node(&node),
            StreamMessage::Edge(edge) => self.apply_edge(&edge),
            StreamMessage::EdgeDelete(edge) => self.apply_edge_delete(&edge),
            StreamMessage::Alarm(alarm) => self.apply_alarm(&alarm),
            StreamMessage::AlarmDelete(delete) => self.apply_alarm_delete(&delete),
            StreamMessage::Event(event) => self.apply_event(&event),
        }
    }

    fn apply_topology(&self, topology: &Topology) {
        let (alarms, situations): (Vec<&RawAlarm>, Vec<&RawAlarm>) =
            topology.alarms().iter().partition(|alarm| !alarm.situation);

        let snapshot = {
            let mut cache = self.lock_cache();
            *cache = ClientCache {
                graph: TopologyGraph::from_topology(topology),
                initial_alarms: alarms.into_iter().map(Alarm::from).collect(),
                initial_situations: situations.into_iter().map(Situation::from).collect(),
                initialized: true,
            };
            Snapshot::of(&cache)
        };

        info!(
            vertices = snapshot.graph.vertex_count(),
            edges = snapshot.graph.edge_count(),
            alarms = snapshot.alarms.len(),
            situations = snapshot.situations.len(),
            "Topology rebuilt"
        );
        fan_out(&self.consumers(), "accept", "topology", |c| {
            c.accept(&snapshot.graph, &snapshot.alarms, &snapshot.situations)
        });
    }

    fn apply_node(&self, node: &RawNode) {
        let vertex = Vertex::from(node);
        let added = self.lock_cache().graph.add_vertex(vertex.clone());
        if !added {
            debug!(vertex_id = %vertex.id, "Ignoring update to known vertex");
            return;
        }
        debug!(vertex_id = %vertex.id, "New vertex");
        fan_out(&self.consumers(), "accept_vertex", &vertex.id, |c| {
            c.accept_vertex(&vertex)
        });
    }

    fn apply_edge(&self, raw: &RawTopologyEdge) {
        let EdgeVertices {
            edge,
            source,
            target,
        } = EdgeVertices::from(raw);
        if raw.is_segment_to_segment() {
            // Same treatment as a rebuild: endpoints are kept, the edge is not.
            let mut cache = self.lock_cache();
            cache.graph.add_vertex(source);
            cache.graph.add_vertex(target);
            drop(cache);
            debug!(edge_id = %edge.id, "Skipping segment-to-segment edge");
            return;
        }
        let added = self.lock_cache().graph.add_edge(edge.clone());
        if !added {
            debug!(edge_id = %edge.id, "Ignoring update to known edge");
            return;
        }
        debug!(edge_id = %edge.id, "New edge");
        fan_out(&self.consumers(), "accept_edge", &edge.id, |c| {
            c.accept_edge(&edge)
        });
    }

    fn apply_edge_delete(&self, raw: &RawTopologyEdge) {
        let id = edge_id(raw);
        let removed = self.lock_cache().graph.remove_edge(&id);
        if removed.is_none() {
            debug!(edge_id = %id, "Edge to delete is not known");
            return;
        }
        debug!(edge_id = %id, "Edge deleted");
        fan_out(&self.consumers(), "accept_deleted_edge", &id, |c| {
            c.accept_deleted_edge(&id)
        });
    }

    fn apply_alarm(&self, raw: &RawAlarm) {
        let key = raw.reduction_key.as_str();
        if raw.situation {
            let situation = Situation::from(raw);
            fan_out(&self.consumers(), "accept_situation", key, |c| {
                c.accept_situation(&situation)
            });
        } else {
            let alarm = Alarm::from(raw);
            fan_out(&self.consumers(), "accept_alarm", key, |c| {
                c.accept_alarm(&alarm)
            });
        }
    }

    fn apply_alarm_delete(&self, delete: &AlarmDelete) {
        let key = delete.reduction_key.as_str();
        if delete.is_situation {
            fan_out(&self.consumers(), "accept_deleted_situation", key, |c| {
                c.accept_deleted_situation(key)
            });
        } else {
            fan_out(&self.consumers(), "accept_deleted_alarm", key, |c| {
                c.accept_deleted_alarm(key)
            });
        }
    }

    fn apply_event(&self, raw: &RawEvent) {
        let event = Event::from_raw(raw, Utc::now());
        fan_out(&self.consumers(), "accept_event", &event.uei, |c| {
            c.accept_event(&event)
        });
    }

    // -------------------------------------------------------------------
    // Internals
    // -------------------------------------------------------------------

    fn lock_cache(&self) -> MutexGuard<'_, ClientCache> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn consumers(&self) -> Vec<Arc<dyn Consumer>> {
        self.consumers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Snapshot {
    fn of(cache: &ClientCache) -> Self {
        Self {
            graph: cache.graph.clone(),
            alarms: cache.initial_alarms.clone(),
            situations: cache.initial_situations.clone(),
        }
    }
}
