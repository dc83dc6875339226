//! Server-side broadcast engine.
//!
//! [`BroadcastEngine`] owns the subscriber registry, the per-connection
//! record of announced nodes, and the node and alarm caches. Client
//! requests arrive through [`subscribe`](BroadcastEngine::subscribe) and
//! [`unsubscribe`](BroadcastEngine::unsubscribe); backend notifications
//! arrive through the `on_*` methods. Every outgoing message is encoded
//! once and pushed into the bounded outbox of each receiving connection.
//!
//! # Locking
//!
//! The node cache and the alarm cache each sit behind their own mutex and
//! are always taken in that order. A subscription holds both while it reads
//! the backend, queues its snapshot and registers, so every broadcast is
//! computed either entirely before the snapshot or entirely after the
//! registration. Edge broadcasts hold the node lock from the endpoint
//! announcements to the edge itself; alarm broadcasts hold the alarm lock.
//! Registries are lock-free concurrent maps, and no map guard is ever held
//! across an `.await`.
//!
//! # Node announcements
//!
//! A connection must never receive an alarm or edge that references a node
//! it has not been told about. Before such a message is broadcast, the
//! referenced nodes are sent to every eligible receiver that has not yet
//! seen them. Seen sets are seeded from the subscription snapshot and are
//! dropped when the subscription ends.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::error::SendTimeoutError;
use tokio::sync::{Mutex, Notify, mpsc};
use topostream_types::{
    AlarmDelete, AlarmId, ConnectionId, FilterCriteria, NodeId, RawAlarm, RawEvent, RawNode,
    RawTopologyEdge, StreamMessage, Topology,
};
use tracing::{debug, info, trace, warn};

use crate::diff::AlarmDiff;
use crate::error::EngineError;
use crate::filter;
use crate::source::TopologySource;

/// Sending half of a connection's outbox of encoded text frames.
///
/// Besides the bounded frame channel it carries an eviction signal, so the
/// transport can close a connection the engine gave up on.
#[derive(Debug, Clone)]
pub struct Outbox {
    frames: mpsc::Sender<String>,
    evicted: Arc<Notify>,
}

impl Outbox {
    /// Create an outbox and the receiver its writer drains.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<String>) {
        let (frames, rx) = mpsc::channel(capacity.max(1));
        let outbox = Self {
            frames,
            evicted: Arc::new(Notify::new()),
        };
        (outbox, rx)
    }

    /// Queue one frame, waiting at most `timeout` for space.
    pub async fn send(
        &self,
        frame: String,
        timeout: Duration,
    ) -> Result<(), SendTimeoutError<String>> {
        self.frames.send_timeout(frame, timeout).await
    }

    /// Resolves once the engine has evicted this connection.
    pub async fn evicted(&self) {
        self.evicted.notified().await;
    }

    fn evict(&self) {
        self.evicted.notify_one();
    }
}

/// An active subscription.
#[derive(Debug, Clone)]
pub struct Subscription {
    /// What the connection asked to see.
    pub criteria: FilterCriteria,
    /// Where its frames go.
    pub outbox: Outbox,
}

/// Counters exposed on the status endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineStats {
    /// Connections with an active subscription.
    pub subscribers: usize,
    /// Nodes in the node cache.
    pub cached_nodes: usize,
    /// Alarms in the alarm cache.
    pub cached_alarms: usize,
    /// Connections with a seen-node set.
    pub tracked_connections: usize,
}

/// Receivers of one broadcast.
type Receivers = Vec<(ConnectionId, Outbox)>;

/// The node cache, as seen through its lock.
type NodeCache = HashMap<NodeId, RawNode>;

/// Server-side broadcast engine.
pub struct BroadcastEngine {
    source: Arc<dyn TopologySource>,
    send_timeout: Duration,
    subscribers: DashMap<ConnectionId, Subscription>,
    seen_nodes: DashMap<ConnectionId, HashSet<NodeId>>,
    node_cache: Mutex<NodeCache>,
    alarm_cache: Mutex<HashMap<AlarmId, RawAlarm>>,
}

impl BroadcastEngine {
    /// Create an engine reading snapshots from `source`.
    ///
    /// `send_timeout` bounds how long a broadcast waits on one full outbox
    /// before that connection is dropped.
    pub fn new(source: Arc<dyn TopologySource>, send_timeout: Duration) -> Self {
        Self {
            source,
            send_timeout,
            subscribers: DashMap::new(),
            seen_nodes: DashMap::new(),
            node_cache: Mutex::new(HashMap::new()),
            alarm_cache: Mutex::new(HashMap::new()),
        }
    }

    // -----------------------------------------------------------------------
    // Client requests
    // -----------------------------------------------------------------------

    /// Send the connection its snapshot and register the subscription.
    ///
    /// Absent criteria match everything. The snapshot is generated from a
    /// single read of the backend and filtered by `criteria`; the node ids
    /// it implies become the connection's seen set. The connection only
    /// joins the broadcast registry once its snapshot is queued, and both
    /// cache locks are held throughout, so no delta can precede or slip
    /// past the snapshot.
    ///
    /// # Errors
    ///
    /// [`EngineError::AlreadySubscribed`] if `conn` is already subscribed.
    /// [`EngineError::Source`] if the backend cannot be read; nothing is
    /// registered and nothing is sent.
    pub async fn subscribe(
        &self,
        conn: ConnectionId,
        criteria: Option<FilterCriteria>,
        outbox: Outbox,
    ) -> Result<(), EngineError> {
        let criteria = criteria.unwrap_or_default();
        let mut nodes = self.node_cache.lock().await;
        let alarms = self.alarm_cache.lock().await;

        if self.subscribers.contains_key(&conn) {
            return Err(EngineError::AlreadySubscribed(conn));
        }

        let snapshot = match self.source.snapshot() {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(%conn, error = %e, "Snapshot generation failed");
                return Err(EngineError::Source(e));
            }
        };

        for node in &snapshot.nodes {
            nodes.insert(node.id, node.clone());
        }

        let topology = filter::filter_snapshot(&criteria, snapshot);
        let (node_count, edge_count, alarm_count) = (
            topology.nodes().len(),
            topology.edges().len(),
            topology.alarms().len(),
        );
        self.seen_nodes.insert(conn, snapshot_node_ids(&topology));

        let delivered = self
            .deliver(vec![(conn, outbox.clone())], &StreamMessage::Topology(topology))
            .await;
        if delivered.is_empty() {
            debug!(%conn, "Connection dropped before its snapshot was queued");
        } else {
            self.subscribers.insert(
                conn,
                Subscription {
                    criteria: criteria.clone(),
                    outbox,
                },
            );
            info!(
                %conn,
                match_all = criteria.is_match_all(),
                nodes = node_count,
                edges = edge_count,
                alarms = alarm_count,
                "Subscription registered"
            );
        }

        drop(alarms);
        drop(nodes);
        Ok(())
    }

    /// End a subscription.
    ///
    /// # Errors
    ///
    /// [`EngineError::NotSubscribed`] if `conn` has no subscription.
    pub fn unsubscribe(&self, conn: ConnectionId) -> Result<(), EngineError> {
        if self.subscribers.remove(&conn).is_none() {
            return Err(EngineError::NotSubscribed(conn));
        }
        self.seen_nodes.remove(&conn);
        info!(%conn, "Subscription removed");
        Ok(())
    }

    /// Drop every trace of a closed connection. Never fails.
    pub fn on_disconnect(&self, conn: ConnectionId) {
        let was_subscribed = self.subscribers.remove(&conn).is_some();
        self.seen_nodes.remove(&conn);
        debug!(%conn, was_subscribed, "Connection released");
    }

    // -----------------------------------------------------------------------
    // Backend notifications
    // -----------------------------------------------------------------------

    /// An alarm or situation was created or updated.
    pub async fn on_alarm_upserted(&self, alarm: RawAlarm) {
        let mut nodes = self.node_cache.lock().await;
        if let Some(node) = &alarm.node {
            self.handle_node(&mut nodes, node).await;
        }

        let mut cache = self.alarm_cache.lock().await;
        drop(nodes);
        cache.insert(alarm.id, alarm.clone());
        self.broadcast_alarm(alarm).await;
        drop(cache);
    }

    /// An alarm or situation was deleted.
    ///
    /// The cached copy supplies the location and the situation flag, which
    /// the notification does not carry. The cache entry is removed whether
    /// or not anyone receives the delete.
    pub async fn on_alarm_deleted(&self, alarm_id: AlarmId, reduction_key: &str) {
        let mut cache = self.alarm_cache.lock().await;
        let cached = cache.remove(&alarm_id);
        if cached.is_none() {
            debug!(%alarm_id, reduction_key, "Deleted alarm was not cached");
        }
        self.broadcast_alarm_delete(cached.as_ref(), reduction_key).await;
        drop(cache);
    }

    /// Reconcile the alarm cache against a full backend listing.
    ///
    /// New or changed alarms are broadcast as upserts, cached alarms missing
    /// from the listing as deletes, then the cache is replaced. The diff,
    /// the replacement and the broadcasts happen under one hold of the
    /// alarm lock.
    pub async fn on_alarm_snapshot(&self, alarms: Vec<RawAlarm>) {
        let mut nodes = self.node_cache.lock().await;
        let mut cache = self.alarm_cache.lock().await;

        let diff = AlarmDiff::compute(&cache, &alarms);
        if diff.is_empty() {
            trace!(alarms = alarms.len(), "Alarm cache already current");
            return;
        }

        for alarm in &diff.upserts {
            if let Some(node) = &alarm.node {
                self.handle_node(&mut nodes, node).await;
            }
        }
        drop(nodes);

        *cache = alarms.into_iter().map(|alarm| (alarm.id, alarm)).collect();
        debug!(
            cached = cache.len(),
            upserts = diff.upserts.len(),
            deletes = diff.deletes.len(),
            "Alarm cache reconciled"
        );

        let AlarmDiff { upserts, deletes } = diff;
        for removed in &deletes {
            self.broadcast_alarm_delete(Some(removed), &removed.reduction_key).await;
        }
        for alarm in upserts {
            self.broadcast_alarm(alarm).await;
        }
        drop(cache);
    }

    /// A topology edge was discovered or changed.
    ///
    /// Endpoint nodes are announced first. Only subscriptions accepting
    /// both endpoints receive the edge.
    pub async fn on_edge_added_or_updated(&self, edge: RawTopologyEdge) {
        let mut nodes = self.node_cache.lock().await;
        let (source, target) = edge.endpoint_nodes();
        for node in [source, target].into_iter().flatten() {
            self.handle_node(&mut nodes, node).await;
        }

        let receivers = self.receivers(|criteria| filter::accepts_edge(criteria, &edge));
        self.deliver(receivers, &StreamMessage::Edge(edge)).await;
        drop(nodes);
    }

    /// A topology edge went away.
    pub async fn on_edge_deleted(&self, edge: RawTopologyEdge) {
        let nodes = self.node_cache.lock().await;
        let receivers = self.receivers(|criteria| filter::accepts_edge(criteria, &edge));
        self.deliver(receivers, &StreamMessage::EdgeDelete(edge)).await;
        drop(nodes);
    }

    /// A monitoring event arrived.
    ///
    /// Dropped unless it names a node already in the node cache.
    pub async fn on_monitoring_event(&self, event: RawEvent) {
        let Some(node_id) = event.node_id else {
            trace!(uei = %event.uei, "Event without node dropped");
            return;
        };
        let node = self.node_cache.lock().await.get(&node_id).cloned();
        let Some(node) = node else {
            trace!(uei = %event.uei, %node_id, "Event for unknown node dropped");
            return;
        };

        let receivers = self.receivers(|criteria| filter::accepts_node(criteria, &node));
        self.deliver(receivers, &StreamMessage::Event(event)).await;
    }

    // -----------------------------------------------------------------------
    // Introspection
    // -----------------------------------------------------------------------

    /// Whether `conn` has an active subscription.
    pub fn is_subscribed(&self, conn: ConnectionId) -> bool {
        self.subscribers.contains_key(&conn)
    }

    /// Number of active subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Current counters.
    pub async fn stats(&self) -> EngineStats {
        let cached_nodes = self.node_cache.lock().await.len();
        let cached_alarms = self.alarm_cache.lock().await.len();
        EngineStats {
            subscribers: self.subscribers.len(),
            cached_nodes,
            cached_alarms,
            tracked_connections: self.seen_nodes.len(),
        }
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    /// Cache `node` and announce it to eligible receivers that have not
    /// seen it yet. The caller holds the node lock.
    async fn handle_node(&self, cache: &mut NodeCache, node: &RawNode) {
        cache.insert(node.id, node.clone());

        let fresh = self.receivers(|criteria| filter::accepts_node(criteria, node));
        let fresh: Receivers = fresh
            .into_iter()
            .filter(|(conn, _)| {
                !self
                    .seen_nodes
                    .get(conn)
                    .is_some_and(|seen| seen.contains(&node.id))
            })
            .collect();
        if fresh.is_empty() {
            return;
        }

        let delivered = self.deliver(fresh, &StreamMessage::Node(node.clone())).await;
        for conn in delivered {
            // Only existing sets are updated; a connection evicted meanwhile
            // has none.
            if let Some(mut seen) = self.seen_nodes.get_mut(&conn) {
                seen.insert(node.id);
            }
        }
    }

    async fn broadcast_alarm(&self, alarm: RawAlarm) {
        let receivers = self.receivers(|criteria| filter::accepts_alarm(criteria, &alarm));
        self.deliver(receivers, &StreamMessage::Alarm(alarm)).await;
    }

    async fn broadcast_alarm_delete(&self, cached: Option<&RawAlarm>, reduction_key: &str) {
        let location = cached.and_then(RawAlarm::location);
        let receivers =
            self.receivers(|criteria| filter::matches_optional_location(criteria, location));
        let message = StreamMessage::AlarmDelete(AlarmDelete {
            reduction_key: reduction_key.to_owned(),
            is_situation: cached.is_some_and(|alarm| alarm.situation),
        });
        self.deliver(receivers, &message).await;
    }

    /// Subscriptions whose criteria pass `accepts`.
    fn receivers<F>(&self, accepts: F) -> Receivers
    where
        F: Fn(&FilterCriteria) -> bool,
    {
        self.subscribers
            .iter()
            .filter(|entry| accepts(&entry.criteria))
            .map(|entry| (*entry.key(), entry.outbox.clone()))
            .collect()
    }

    /// Encode `message` once and push it to every receiver.
    ///
    /// A receiver whose outbox stays full past the send timeout, or whose
    /// outbox is closed, is evicted. Returns the connections that accepted
    /// the frame.
    async fn deliver(&self, receivers: Receivers, message: &StreamMessage) -> Vec<ConnectionId> {
        let kind = message.message_type();
        if receivers.is_empty() {
            trace!(%kind, "No receivers");
            return Vec::new();
        }

        let frame = match message.encode() {
            Ok(frame) => frame,
            Err(e) => {
                warn!(%kind, error = %e, "Failed to encode message");
                return Vec::new();
            }
        };

        let mut delivered = Vec::with_capacity(receivers.len());
        for (conn, outbox) in receivers {
            match outbox.send(frame.clone(), self.send_timeout).await {
                Ok(()) => delivered.push(conn),
                Err(e) => {
                    warn!(%conn, %kind, error = %e, "Send failed, dropping connection");
                    self.on_disconnect(conn);
                    outbox.evict();
                }
            }
        }
        debug!(%kind, receivers = delivered.len(), "Broadcast");
        delivered
    }
}

/// Node ids a client learns from `topology`: listed nodes, node endpoints
/// of edges, and owners of alarms.
fn snapshot_node_ids(topology: &Topology) -> HashSet<NodeId> {
    let listed = topology.nodes().iter().map(|node| node.id);
    let from_edges = topology.edges().iter().flat_map(|edge| {
        let (source, target) = edge.endpoint_nodes();
        [source, target].into_iter().flatten().map(|node| node.id)
    });
    let from_alarms = topology
        .alarms()
        .iter()
        .filter_map(|alarm| alarm.node.as_ref().map(|node| node.id));
    listed.chain(from_edges).chain(from_alarms).collect()
}
