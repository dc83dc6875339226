//! Behavioural tests for the broadcast engine.
//!
//! Each test drives the engine directly with in-process outboxes and
//! decodes whatever frames land in them.

#![allow(clippy::unwrap_used, clippy::panic)]

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc;
use topostream_server::{
    BroadcastEngine, EngineError, InMemorySource, Outbox, SourceError, TopologySource,
};
use topostream_types::{
    AlarmId, ConnectionId, FilterCriteria, MessageType, NodeId, RawAlarm, RawEndpoint, RawEvent,
    RawNode, RawPort, RawTopologyEdge, Severity, StreamMessage, Topology, TopologyProtocol,
};

const SEND_TIMEOUT: Duration = Duration::from_millis(50);

fn node(id: i64, location: &str) -> RawNode {
    RawNode::new(id, format!("node-{id}"), location)
}

fn link(id: &str, a: &RawNode, b: &RawNode) -> RawTopologyEdge {
    RawTopologyEdge {
        id: id.to_owned(),
        protocol: TopologyProtocol::Bridge,
        source: RawEndpoint::Node(a.clone()),
        target: RawEndpoint::Node(b.clone()),
        tooltip_text: None,
    }
}

fn alarm(id: i64, owner: Option<&RawNode>) -> RawAlarm {
    RawAlarm {
        id: AlarmId::new(id),
        reduction_key: format!("alarm-{id}"),
        severity: Severity::Major,
        description: String::new(),
        last_event_time: Utc::now(),
        node: owner.cloned(),
        situation: false,
        related_alarms: Vec::new(),
    }
}

fn engine(source: InMemorySource) -> BroadcastEngine {
    BroadcastEngine::new(Arc::new(source), SEND_TIMEOUT)
}

struct Client {
    conn: ConnectionId,
    outbox: Outbox,
    frames: mpsc::Receiver<String>,
}

impl Client {
    fn new() -> Self {
        Self::with_capacity(64)
    }

    fn with_capacity(capacity: usize) -> Self {
        let (outbox, frames) = Outbox::channel(capacity);
        Self {
            conn: ConnectionId::new(),
            outbox,
            frames,
        }
    }

    async fn subscribe(&self, engine: &BroadcastEngine, criteria: Option<FilterCriteria>) {
        engine
            .subscribe(self.conn, criteria, self.outbox.clone())
            .await
            .unwrap();
    }

    fn drain(&mut self) -> Vec<StreamMessage> {
        let mut messages = Vec::new();
        while let Ok(frame) = self.frames.try_recv() {
            messages.push(StreamMessage::decode(&frame).unwrap());
        }
        messages
    }

    fn topology(&mut self) -> Topology {
        match self.drain().as_slice() {
            [StreamMessage::Topology(topology)] => topology.clone(),
            other => panic!("expected a single topology, got {other:?}"),
        }
    }
}

fn dc1() -> Option<FilterCriteria> {
    Some(FilterCriteria::for_locations(["DC1"]))
}

// ---------------------------------------------------------------------------
// Subscription lifecycle
// ---------------------------------------------------------------------------

#[tokio::test]
async fn snapshot_respects_location_filter() {
    let a = node(1, "DC1");
    let b = node(2, "DC2");
    let source = InMemorySource::from_topology(Topology::from_parts(
        vec![a.clone(), b.clone()],
        vec![link("ab", &a, &b)],
        Vec::new(),
    ));
    let engine = engine(source);

    let mut narrow = Client::new();
    narrow.subscribe(&engine, dc1()).await;
    let topology = narrow.topology();
    assert_eq!(topology.nodes(), std::slice::from_ref(&a));
    assert!(topology.edges.is_none());
    assert!(topology.alarms.is_none());

    let mut wide = Client::new();
    wide.subscribe(
        &engine,
        Some(FilterCriteria::for_locations(["DC1", "DC2"])),
    )
    .await;
    let topology = wide.topology();
    assert_eq!(topology.nodes().len(), 2);
    assert_eq!(topology.edges().len(), 1);
}

#[tokio::test]
async fn absent_criteria_match_everything() {
    let a = node(1, "DC1");
    let source = InMemorySource::from_topology(Topology::from_parts(
        vec![a.clone()],
        Vec::new(),
        vec![alarm(1, Some(&a)), alarm(2, None)],
    ));
    let engine = engine(source);

    let mut client = Client::new();
    client.subscribe(&engine, None).await;
    let topology = client.topology();
    assert_eq!(topology.nodes().len(), 1);
    assert_eq!(topology.alarms().len(), 2);
}

#[tokio::test]
async fn second_subscribe_is_rejected() {
    let engine = engine(InMemorySource::new());
    let mut client = Client::new();
    client.subscribe(&engine, None).await;
    client.drain();

    let result = engine
        .subscribe(client.conn, dc1(), client.outbox.clone())
        .await;
    assert!(matches!(result, Err(EngineError::AlreadySubscribed(conn)) if conn == client.conn));
    assert!(client.drain().is_empty());
    assert!(engine.is_subscribed(client.conn));
}

#[tokio::test]
async fn unsubscribe_requires_subscription() {
    let engine = engine(InMemorySource::new());
    let client = Client::new();

    let result = engine.unsubscribe(client.conn);
    assert!(matches!(result, Err(EngineError::NotSubscribed(_))));
    assert!(result.unwrap_err().is_protocol_violation());

    client.subscribe(&engine, None).await;
    assert_eq!(engine.stats().await.tracked_connections, 1);
    assert!(engine.unsubscribe(client.conn).is_ok());
    assert!(!engine.is_subscribed(client.conn));
    assert_eq!(engine.stats().await.tracked_connections, 0);
}

#[tokio::test]
async fn disconnect_never_fails() {
    let engine = engine(InMemorySource::new());
    let client = Client::new();
    engine.on_disconnect(client.conn);

    client.subscribe(&engine, None).await;
    engine
        .on_edge_added_or_updated(link("ab", &node(1, "DC1"), &node(2, "DC1")))
        .await;
    assert_eq!(engine.stats().await.tracked_connections, 1);

    engine.on_disconnect(client.conn);
    engine.on_disconnect(client.conn);
    let stats = engine.stats().await;
    assert_eq!(stats.subscribers, 0);
    assert_eq!(stats.tracked_connections, 0);
}

struct DownSource;

impl TopologySource for DownSource {
    fn alarms(&self) -> Result<Vec<RawAlarm>, SourceError> {
        Err(SourceError::Unavailable("alarm store down".to_owned()))
    }

    fn nodes(&self) -> Result<Vec<RawNode>, SourceError> {
        Ok(vec![node(1, "DC1")])
    }

    fn edges(&self) -> Result<Vec<RawTopologyEdge>, SourceError> {
        Ok(Vec::new())
    }
}

#[tokio::test]
async fn source_failure_fails_subscribe_without_partial_snapshot() {
    let engine = BroadcastEngine::new(Arc::new(DownSource), SEND_TIMEOUT);
    let mut client = Client::new();

    let result = engine
        .subscribe(client.conn, None, client.outbox.clone())
        .await;
    assert!(matches!(result, Err(EngineError::Source(_))));
    assert!(!engine.is_subscribed(client.conn));
    assert!(client.drain().is_empty());
    assert_eq!(engine.stats().await.tracked_connections, 0);
}

/// Backend whose node listing takes a while.
struct SlowSource {
    inner: InMemorySource,
    delay: Duration,
}

impl TopologySource for SlowSource {
    fn alarms(&self) -> Result<Vec<RawAlarm>, SourceError> {
        self.inner.alarms()
    }

    fn nodes(&self) -> Result<Vec<RawNode>, SourceError> {
        std::thread::sleep(self.delay);
        self.inner.nodes()
    }

    fn edges(&self) -> Result<Vec<RawTopologyEdge>, SourceError> {
        self.inner.edges()
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn deltas_during_subscribe_follow_the_snapshot() {
    let a = node(1, "DC1");
    let b = node(2, "DC1");
    let c = node(3, "DC1");
    let ab = link("ab", &a, &b);
    let bc = link("bc", &b, &c);
    let source = SlowSource {
        inner: InMemorySource::from_topology(Topology::from_parts(
            vec![a, b.clone()],
            vec![ab.clone()],
            vec![alarm(1, None)],
        )),
        delay: Duration::from_millis(300),
    };
    let engine = Arc::new(BroadcastEngine::new(Arc::new(source), SEND_TIMEOUT));
    engine.on_alarm_upserted(alarm(1, None)).await;

    let mut client = Client::new();
    let subscribing = {
        let engine = Arc::clone(&engine);
        let conn = client.conn;
        let outbox = client.outbox.clone();
        tokio::spawn(async move { engine.subscribe(conn, None, outbox).await })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;

    engine.on_edge_deleted(ab).await;
    engine.on_alarm_deleted(AlarmId::new(1), "alarm-1").await;
    engine.on_edge_added_or_updated(bc.clone()).await;
    subscribing.await.unwrap().unwrap();

    let messages = client.drain();
    let kinds: Vec<MessageType> = messages.iter().map(StreamMessage::message_type).collect();
    assert_eq!(
        kinds,
        vec![
            MessageType::Topology,
            MessageType::EdgeDelete,
            MessageType::AlarmDelete,
            MessageType::Node,
            MessageType::Edge,
        ]
    );
    assert_eq!(messages.get(3), Some(&StreamMessage::Node(c)));
    assert_eq!(messages.get(4), Some(&StreamMessage::Edge(bc)));
}

#[tokio::test]
async fn resubscribe_after_unsubscribe_gets_fresh_snapshot() {
    let a = node(1, "DC1");
    let engine = engine(InMemorySource::from_topology(Topology::from_parts(
        vec![a],
        Vec::new(),
        Vec::new(),
    )));
    let mut client = Client::new();
    client.subscribe(&engine, None).await;
    client.drain();

    engine.unsubscribe(client.conn).unwrap();
    client.subscribe(&engine, dc1()).await;
    assert_eq!(client.topology().nodes().len(), 1);
}

// ---------------------------------------------------------------------------
// Nodes and edges
// ---------------------------------------------------------------------------

#[tokio::test]
async fn endpoint_nodes_precede_edge_and_are_announced_once() {
    let engine = engine(InMemorySource::new());
    let mut client = Client::new();
    client.subscribe(&engine, None).await;
    client.drain();

    let a = node(1, "DC1");
    let b = node(2, "DC1");
    engine.on_edge_added_or_updated(link("ab", &a, &b)).await;
    let messages = client.drain();
    assert_eq!(
        messages,
        vec![
            StreamMessage::Node(a.clone()),
            StreamMessage::Node(b.clone()),
            StreamMessage::Edge(link("ab", &a, &b)),
        ]
    );

    let c = node(3, "DC1");
    engine.on_edge_added_or_updated(link("bc", &b, &c)).await;
    let messages = client.drain();
    assert_eq!(
        messages,
        vec![
            StreamMessage::Node(c.clone()),
            StreamMessage::Edge(link("bc", &b, &c)),
        ]
    );
}

#[tokio::test]
async fn snapshot_nodes_are_not_announced_again() {
    let a = node(1, "DC1");
    let engine = engine(InMemorySource::from_topology(Topology::from_parts(
        vec![a.clone()],
        Vec::new(),
        Vec::new(),
    )));
    let mut client = Client::new();
    client.subscribe(&engine, None).await;
    client.drain();

    engine.on_alarm_upserted(alarm(7, Some(&a))).await;
    let messages = client.drain();
    assert_eq!(messages.len(), 1);
    assert!(matches!(messages.first(), Some(StreamMessage::Alarm(_))));
}

#[tokio::test]
async fn edge_with_excluded_endpoint_is_never_delivered() {
    let engine = engine(InMemorySource::new());
    let mut client = Client::new();
    client.subscribe(&engine, dc1()).await;
    client.drain();

    let a = node(1, "DC1");
    let b = node(2, "DC2");
    engine.on_edge_added_or_updated(link("ab", &a, &b)).await;
    engine.on_edge_deleted(link("ab", &a, &b)).await;

    let messages = client.drain();
    assert_eq!(messages, vec![StreamMessage::Node(a)]);
}

#[tokio::test]
async fn port_endpoint_does_not_gate_edge() {
    let engine = engine(InMemorySource::new());
    let mut client = Client::new();
    client.subscribe(&engine, dc1()).await;
    client.drain();

    let a = node(1, "DC1");
    let edge = RawTopologyEdge {
        id: "ap".to_owned(),
        protocol: TopologyProtocol::Lldp,
        source: RawEndpoint::Node(a.clone()),
        target: RawEndpoint::Port(RawPort {
            id: "port-1".to_owned(),
            if_index: Some(1),
            if_name: Some("eth0".to_owned()),
            node_id: Some(NodeId::new(9)),
        }),
        tooltip_text: None,
    };
    engine.on_edge_added_or_updated(edge.clone()).await;
    engine.on_edge_deleted(edge.clone()).await;

    assert_eq!(
        client.drain(),
        vec![
            StreamMessage::Node(a),
            StreamMessage::Edge(edge.clone()),
            StreamMessage::EdgeDelete(edge),
        ]
    );
}

// ---------------------------------------------------------------------------
// Alarms
// ---------------------------------------------------------------------------

#[tokio::test]
async fn alarm_goes_to_matching_subscriptions_after_its_node() {
    let engine = engine(InMemorySource::new());
    let mut dc1_client = Client::new();
    let mut dc2_client = Client::new();
    dc1_client.subscribe(&engine, dc1()).await;
    dc2_client
        .subscribe(&engine, Some(FilterCriteria::for_locations(["DC2"])))
        .await;
    dc1_client.drain();
    dc2_client.drain();

    let a = node(1, "DC1");
    let raised = alarm(1, Some(&a));
    engine.on_alarm_upserted(raised.clone()).await;

    assert_eq!(
        dc1_client.drain(),
        vec![StreamMessage::Node(a), StreamMessage::Alarm(raised)]
    );
    assert!(dc2_client.drain().is_empty());
}

#[tokio::test]
async fn alarm_without_node_reaches_match_all_only() {
    let engine = engine(InMemorySource::new());
    let mut all = Client::new();
    let mut narrow = Client::new();
    all.subscribe(&engine, None).await;
    narrow.subscribe(&engine, dc1()).await;
    all.drain();
    narrow.drain();

    engine.on_alarm_upserted(alarm(1, None)).await;
    assert_eq!(all.drain().len(), 1);
    assert!(narrow.drain().is_empty());
}

#[tokio::test]
async fn alarm_delete_recovers_situation_flag_from_cache() {
    let engine = engine(InMemorySource::new());
    let mut client = Client::new();
    client.subscribe(&engine, dc1()).await;
    client.drain();

    let a = node(1, "DC1");
    let mut situation = alarm(5, Some(&a));
    situation.situation = true;
    engine.on_alarm_upserted(situation).await;
    client.drain();

    engine.on_alarm_deleted(AlarmId::new(5), "alarm-5").await;
    let messages = client.drain();
    match messages.as_slice() {
        [StreamMessage::AlarmDelete(delete)] => {
            assert_eq!(delete.reduction_key, "alarm-5");
            assert!(delete.is_situation);
        }
        other => panic!("unexpected messages {other:?}"),
    }
    assert_eq!(engine.stats().await.cached_alarms, 0);
}

#[tokio::test]
async fn unknown_alarm_delete_reaches_match_all_only() {
    let engine = engine(InMemorySource::new());
    let mut all = Client::new();
    let mut narrow = Client::new();
    all.subscribe(&engine, None).await;
    narrow.subscribe(&engine, dc1()).await;
    all.drain();
    narrow.drain();

    engine.on_alarm_deleted(AlarmId::new(99), "ghost").await;
    match all.drain().as_slice() {
        [StreamMessage::AlarmDelete(delete)] => assert!(!delete.is_situation),
        other => panic!("unexpected messages {other:?}"),
    }
    assert!(narrow.drain().is_empty());
}

#[tokio::test]
async fn alarm_snapshot_broadcasts_the_difference() {
    let engine = engine(InMemorySource::new());
    let kept = alarm(1, None);
    let changed = alarm(2, None);
    let dropped = alarm(3, None);
    for raised in [kept.clone(), changed.clone(), dropped.clone()] {
        engine.on_alarm_upserted(raised).await;
    }

    let mut client = Client::new();
    client.subscribe(&engine, None).await;
    client.drain();

    let mut escalated = changed;
    escalated.severity = Severity::Critical;
    let fresh = alarm(4, None);
    engine
        .on_alarm_snapshot(vec![kept, escalated.clone(), fresh.clone()])
        .await;

    let messages = client.drain();
    assert_eq!(
        messages,
        vec![
            StreamMessage::AlarmDelete(topostream_types::AlarmDelete {
                reduction_key: dropped.reduction_key,
                is_situation: false,
            }),
            StreamMessage::Alarm(escalated),
            StreamMessage::Alarm(fresh),
        ]
    );
    assert_eq!(engine.stats().await.cached_alarms, 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrent_delete_during_alarm_snapshot_is_sent_once() {
    let engine = Arc::new(engine(InMemorySource::new()));
    let a = node(1, "DC1");
    engine.on_alarm_upserted(alarm(3, Some(&a))).await;

    let mut client = Client::new();
    client.subscribe(&engine, dc1()).await;
    client.drain();

    let listing = vec![alarm(4, Some(&node(2, "DC1")))];
    let reconciling = {
        let engine = Arc::clone(&engine);
        tokio::spawn(async move { engine.on_alarm_snapshot(listing).await })
    };
    engine.on_alarm_deleted(AlarmId::new(3), "alarm-3").await;
    reconciling.await.unwrap();

    let deletes = client
        .drain()
        .into_iter()
        .filter(|message| matches!(message, StreamMessage::AlarmDelete(_)))
        .count();
    assert_eq!(deletes, 1);
    assert_eq!(engine.stats().await.cached_alarms, 1);
}

// ---------------------------------------------------------------------------
// Events and caches
// ---------------------------------------------------------------------------

#[tokio::test]
async fn caches_stay_current_without_subscribers() {
    let engine = engine(InMemorySource::new());
    let a = node(1, "DC1");
    engine.on_alarm_upserted(alarm(1, Some(&a))).await;

    let stats = engine.stats().await;
    assert_eq!(stats.subscribers, 0);
    assert_eq!(stats.cached_nodes, 1);
    assert_eq!(stats.cached_alarms, 1);
}

#[tokio::test]
async fn events_need_a_known_node() {
    let engine = engine(InMemorySource::new());
    let mut client = Client::new();
    client.subscribe(&engine, dc1()).await;
    client.drain();

    let event = RawEvent {
        uei: "uei.opennms.org/nodes/nodeDown".to_owned(),
        node_id: Some(NodeId::new(1)),
        description: None,
        time: None,
        severity: Some(Severity::Major),
    };
    engine.on_monitoring_event(event.clone()).await;
    assert!(client.drain().is_empty());

    engine
        .on_edge_added_or_updated(link("aa", &node(1, "DC1"), &node(2, "DC1")))
        .await;
    client.drain();

    engine.on_monitoring_event(event.clone()).await;
    assert_eq!(client.drain(), vec![StreamMessage::Event(event)]);
}

#[tokio::test]
async fn events_follow_location_filter() {
    let engine = engine(InMemorySource::from_topology(Topology::from_parts(
        vec![node(2, "DC2")],
        Vec::new(),
        Vec::new(),
    )));
    let mut client = Client::new();
    client.subscribe(&engine, dc1()).await;
    client.drain();

    engine
        .on_monitoring_event(RawEvent {
            uei: "uei.test/thing".to_owned(),
            node_id: Some(NodeId::new(2)),
            description: None,
            time: None,
            severity: None,
        })
        .await;
    assert!(client.drain().is_empty());
}

// ---------------------------------------------------------------------------
// Slow consumers
// ---------------------------------------------------------------------------

#[tokio::test]
async fn full_outbox_evicts_connection() {
    let engine = engine(InMemorySource::new());
    let client = Client::with_capacity(1);
    client.subscribe(&engine, None).await;

    // The snapshot still occupies the only slot.
    engine.on_alarm_upserted(alarm(1, None)).await;

    assert!(!engine.is_subscribed(client.conn));
    let evicted = tokio::time::timeout(Duration::from_secs(1), client.outbox.evicted()).await;
    assert!(evicted.is_ok());
}

#[tokio::test]
async fn closed_outbox_evicts_connection() {
    let engine = engine(InMemorySource::new());
    let client = Client::new();
    client.subscribe(&engine, None).await;
    let conn = client.conn;
    drop(client);

    engine.on_alarm_upserted(alarm(1, None)).await;
    assert!(!engine.is_subscribed(conn));
}

// ---------------------------------------------------------------------------
// Backend updates
// ---------------------------------------------------------------------------

#[tokio::test]
async fn late_subscriber_snapshot_reflects_backend_updates() {
    let source = Arc::new(InMemorySource::new());
    let engine = BroadcastEngine::new(source.clone(), SEND_TIMEOUT);

    let a = node(1, "DC1");
    let b = node(2, "DC1");
    source.upsert_node(a.clone()).unwrap();
    source.upsert_node(b.clone()).unwrap();
    source.upsert_edge(link("ab", &a, &b)).unwrap();
    source.upsert_alarm(alarm(1, Some(&a))).unwrap();
    source.upsert_alarm(alarm(2, Some(&b))).unwrap();
    let removed = source.remove_alarm(AlarmId::new(1)).unwrap();
    assert_eq!(removed.map(|alarm| alarm.id), Some(AlarmId::new(1)));
    assert!(source.remove_alarm(AlarmId::new(1)).unwrap().is_none());

    let mut client = Client::new();
    client.subscribe(&engine, None).await;
    let topology = client.topology();
    assert_eq!(topology.nodes().len(), 2);
    assert_eq!(topology.edges().len(), 1);
    assert_eq!(topology.alarms().len(), 1);
    assert_eq!(
        topology.alarms().first().map(|alarm| alarm.id),
        Some(AlarmId::new(2))
    );
}
