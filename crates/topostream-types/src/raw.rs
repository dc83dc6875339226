//! Backend entities as they travel on the wire.
//!
//! These mirror what the monitoring backend hands to the streaming server:
//! nodes, topology edges with typed endpoints, alarms (including
//! situations), and in-memory monitoring events. The [`Topology`] snapshot
//! bundles the first three for a full refresh.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::enums::{Severity, TopologyProtocol};
use crate::ids::{AlarmId, NodeId};

/// Location assigned to nodes that do not declare one.
pub const DEFAULT_LOCATION: &str = "Default";

fn default_location() -> String {
    DEFAULT_LOCATION.to_owned()
}

// ---------------------------------------------------------------------------
// Nodes and endpoints
// ---------------------------------------------------------------------------

/// A monitored node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "bindings/")]
pub struct RawNode {
    /// Backend identifier.
    pub id: NodeId,
    /// Human readable label.
    #[serde(default)]
    pub label: String,
    /// Monitoring location the node belongs to. Drives subscription filters.
    #[serde(default = "default_location")]
    pub location: String,
    /// Provisioning requisition the node came from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub foreign_source: Option<String>,
    /// Identifier of the node inside its requisition.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub foreign_id: Option<String>,
}

impl RawNode {
    /// Build a node with the given id, label and location.
    pub fn new(id: i64, label: impl Into<String>, location: impl Into<String>) -> Self {
        Self {
            id: NodeId::new(id),
            label: label.into(),
            location: location.into(),
            foreign_source: None,
            foreign_id: None,
        }
    }
}

/// A port on a node, as reported by link discovery.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "bindings/")]
pub struct RawPort {
    /// Port identifier, unique across the topology.
    pub id: String,
    /// SNMP interface index.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub if_index: Option<i32>,
    /// Interface name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub if_name: Option<String>,
    /// Node that owns the port, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_id: Option<NodeId>,
}

/// A shared segment joining several ports.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "bindings/")]
pub struct RawSegment {
    /// Segment identifier.
    pub id: String,
    /// Free-form description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tooltip_text: Option<String>,
}

/// One side of a topology edge: exactly one of node, port or segment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(tag = "kind")]
#[ts(export, export_to = "bindings/")]
pub enum RawEndpoint {
    /// The edge terminates on a node.
    Node(RawNode),
    /// The edge terminates on a port.
    Port(RawPort),
    /// The edge terminates on a segment.
    Segment(RawSegment),
}

impl RawEndpoint {
    /// The node behind this endpoint, if it is a node endpoint.
    pub const fn as_node(&self) -> Option<&RawNode> {
        match self {
            Self::Node(node) => Some(node),
            Self::Port(_) | Self::Segment(_) => None,
        }
    }

    /// The location of a node endpoint. Ports and segments have none.
    pub fn location(&self) -> Option<&str> {
        self.as_node().map(|node| node.location.as_str())
    }

    /// Whether this endpoint is a segment.
    pub const fn is_segment(&self) -> bool {
        matches!(self, Self::Segment(_))
    }
}

// ---------------------------------------------------------------------------
// Topology edges
// ---------------------------------------------------------------------------

/// A link discovered between two endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "bindings/")]
pub struct RawTopologyEdge {
    /// Identifier of the underlying link.
    pub id: String,
    /// Protocol that discovered the link.
    pub protocol: TopologyProtocol,
    /// Source side.
    pub source: RawEndpoint,
    /// Target side.
    pub target: RawEndpoint,
    /// Free-form description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tooltip_text: Option<String>,
}

/// Visitor over the typed endpoints of a [`RawTopologyEdge`].
///
/// Every method defaults to a no-op so implementors only handle the
/// endpoint kinds they care about.
pub trait EndpointVisitor<'a> {
    /// Source is a node.
    fn visit_source_node(&mut self, _node: &'a RawNode) {}
    /// Source is a port.
    fn visit_source_port(&mut self, _port: &'a RawPort) {}
    /// Source is a segment.
    fn visit_source_segment(&mut self, _segment: &'a RawSegment) {}
    /// Target is a node.
    fn visit_target_node(&mut self, _node: &'a RawNode) {}
    /// Target is a port.
    fn visit_target_port(&mut self, _port: &'a RawPort) {}
    /// Target is a segment.
    fn visit_target_segment(&mut self, _segment: &'a RawSegment) {}
}

/// Collects the node endpoints of an edge.
#[derive(Default)]
struct NodeEndpoints<'a> {
    source: Option<&'a RawNode>,
    target: Option<&'a RawNode>,
}

impl<'a> EndpointVisitor<'a> for NodeEndpoints<'a> {
    fn visit_source_node(&mut self, node: &'a RawNode) {
        self.source = Some(node);
    }

    fn visit_target_node(&mut self, node: &'a RawNode) {
        self.target = Some(node);
    }
}

impl RawTopologyEdge {
    /// Dispatch the source then the target endpoint to `visitor`.
    pub fn visit_endpoints<'a, V: EndpointVisitor<'a> + ?Sized>(&'a self, visitor: &mut V) {
        match &self.source {
            RawEndpoint::Node(node) => visitor.visit_source_node(node),
            RawEndpoint::Port(port) => visitor.visit_source_port(port),
            RawEndpoint::Segment(segment) => visitor.visit_source_segment(segment),
        }
        match &self.target {
            RawEndpoint::Node(node) => visitor.visit_target_node(node),
            RawEndpoint::Port(port) => visitor.visit_target_port(port),
            RawEndpoint::Segment(segment) => visitor.visit_target_segment(segment),
        }
    }

    /// The `(source, target)` nodes of this edge; ports and segments map to `None`.
    pub fn endpoint_nodes(&self) -> (Option<&RawNode>, Option<&RawNode>) {
        let mut nodes = NodeEndpoints::default();
        self.visit_endpoints(&mut nodes);
        (nodes.source, nodes.target)
    }

    /// Whether both sides are segments. Such edges are never rendered.
    pub const fn is_segment_to_segment(&self) -> bool {
        self.source.is_segment() && self.target.is_segment()
    }
}

// ---------------------------------------------------------------------------
// Alarms
// ---------------------------------------------------------------------------

/// An alarm, or a situation when [`RawAlarm::situation`] is set.
///
/// A situation aggregates correlated alarms in `related_alarms` and shares
/// the reduction-key identity space with plain alarms.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "bindings/")]
pub struct RawAlarm {
    /// Backend identifier.
    pub id: AlarmId,
    /// De-duplication key; the alarm's identity on the client.
    pub reduction_key: String,
    /// Current severity.
    #[serde(default)]
    pub severity: Severity,
    /// Description of the problem.
    #[serde(default)]
    pub description: String,
    /// Time of the most recent event that touched the alarm.
    pub last_event_time: DateTime<Utc>,
    /// Node the alarm is raised against.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node: Option<RawNode>,
    /// Situation discriminator.
    #[serde(default, rename = "isSituation")]
    pub situation: bool,
    /// Alarms correlated into this situation.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub related_alarms: Vec<RawAlarm>,
}

impl RawAlarm {
    /// Location of the owning node, if the alarm has one.
    pub fn location(&self) -> Option<&str> {
        self.node.as_ref().map(|node| node.location.as_str())
    }

    /// Client vertex id of the owning node.
    pub fn vertex_id(&self) -> Option<String> {
        self.node.as_ref().map(|node| node.id.to_string())
    }
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// A monitoring event held in memory by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "bindings/")]
pub struct RawEvent {
    /// Unique event identifier (event class).
    pub uei: String,
    /// Node the event is about.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_id: Option<NodeId>,
    /// Description of the event.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// When the event occurred.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<DateTime<Utc>>,
    /// Event severity.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<Severity>,
}

// ---------------------------------------------------------------------------
// Topology snapshot
// ---------------------------------------------------------------------------

/// Full point-in-time topology sent on subscribe.
///
/// An absent field and an empty one mean the same thing; empty sets are
/// encoded as absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Topology {
    /// Nodes visible to the subscriber.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nodes: Option<Vec<RawNode>>,
    /// Edges visible to the subscriber.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edges: Option<Vec<RawTopologyEdge>>,
    /// Alarms and situations visible to the subscriber.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alarms: Option<Vec<RawAlarm>>,
}

impl Topology {
    /// Build a snapshot, collapsing empty collections to `None`.
    pub fn from_parts(
        nodes: Vec<RawNode>,
        edges: Vec<RawTopologyEdge>,
        alarms: Vec<RawAlarm>,
    ) -> Self {
        Self {
            nodes: non_empty(nodes),
            edges: non_empty(edges),
            alarms: non_empty(alarms),
        }
    }

    /// Nodes in the snapshot, empty if absent.
    pub fn nodes(&self) -> &[RawNode] {
        self.nodes.as_deref().unwrap_or_default()
    }

    /// Edges in the snapshot, empty if absent.
    pub fn edges(&self) -> &[RawTopologyEdge] {
        self.edges.as_deref().unwrap_or_default()
    }

    /// Alarms in the snapshot, empty if absent.
    pub fn alarms(&self) -> &[RawAlarm] {
        self.alarms.as_deref().unwrap_or_default()
    }
}

fn non_empty<T>(items: Vec<T>) -> Option<Vec<T>> {
    if items.is_empty() { None } else { Some(items) }
}
