//! Domain objects handed to topology consumers.
//!
//! The client converts every backend entity it receives into one of these
//! before caching it or passing it to observers. Vertices and edges are
//! identified by string ids; alarms and situations by reduction key.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::enums::{Severity, VertexType};
use crate::raw::{RawAlarm, RawEndpoint, RawEvent, RawNode, RawPort, RawSegment, RawTopologyEdge};

/// A vertex of the reconstructed graph.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Vertex {
    /// Vertex identity.
    pub id: String,
    /// Display label. Empty for ports and segments without a name.
    pub label: String,
    /// Kind of entity behind the vertex.
    pub vertex_type: VertexType,
}

impl Vertex {
    /// Build a vertex.
    pub fn new(id: impl Into<String>, label: impl Into<String>, vertex_type: VertexType) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            vertex_type,
        }
    }

    /// Vertex for a typed edge endpoint.
    pub fn from_endpoint(endpoint: &RawEndpoint) -> Self {
        match endpoint {
            RawEndpoint::Node(node) => Self::from(node),
            RawEndpoint::Port(port) => Self::from(port),
            RawEndpoint::Segment(segment) => Self::from(segment),
        }
    }
}

impl From<&RawNode> for Vertex {
    fn from(node: &RawNode) -> Self {
        Self::new(node.id.to_string(), node.label.clone(), VertexType::Node)
    }
}

impl From<&RawPort> for Vertex {
    fn from(port: &RawPort) -> Self {
        Self::new(
            port.id.clone(),
            port.if_name.clone().unwrap_or_default(),
            VertexType::Port,
        )
    }
}

impl From<&RawSegment> for Vertex {
    fn from(segment: &RawSegment) -> Self {
        Self::new(
            segment.id.clone(),
            segment.tooltip_text.clone().unwrap_or_default(),
            VertexType::Segment,
        )
    }
}

/// An edge of the reconstructed graph.
///
/// The id is `<topologyEdgeId>-<PROTOCOL>`, so one physical link reported by
/// several protocols yields several edges.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Edge {
    /// Edge identity.
    pub id: String,
    /// Source vertex.
    pub source: Vertex,
    /// Target vertex.
    pub target: Vertex,
    /// Discovery protocol name, e.g. `LLDP`.
    pub protocol: String,
}

/// Client edge id for a backend topology edge.
pub fn edge_id(edge: &RawTopologyEdge) -> String {
    format!("{}-{}", edge.id, edge.protocol.as_str())
}

/// An edge together with its resolved endpoint vertices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EdgeVertices {
    /// The converted edge.
    pub edge: Edge,
    /// Source endpoint vertex.
    pub source: Vertex,
    /// Target endpoint vertex.
    pub target: Vertex,
}

impl From<&RawTopologyEdge> for EdgeVertices {
    fn from(raw: &RawTopologyEdge) -> Self {
        let source = Vertex::from_endpoint(&raw.source);
        let target = Vertex::from_endpoint(&raw.target);
        let edge = Edge {
            id: edge_id(raw),
            source: source.clone(),
            target: target.clone(),
            protocol: raw.protocol.as_str().to_owned(),
        };
        Self {
            edge,
            source,
            target,
        }
    }
}

/// A plain alarm.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alarm {
    /// Identity of the alarm.
    pub reduction_key: String,
    /// Current severity.
    pub severity: Severity,
    /// Description of the problem.
    pub description: String,
    /// Time of the last update.
    pub last_updated: DateTime<Utc>,
    /// Vertex the alarm is raised against, if any.
    pub vertex_id: Option<String>,
}

impl From<&RawAlarm> for Alarm {
    fn from(raw: &RawAlarm) -> Self {
        Self {
            reduction_key: raw.reduction_key.clone(),
            severity: raw.severity,
            description: raw.description.clone(),
            last_updated: raw.last_event_time,
            vertex_id: raw.vertex_id(),
        }
    }
}

/// An alarm aggregating a set of correlated alarms.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Situation {
    /// Identity of the situation (same space as alarms).
    pub reduction_key: String,
    /// Current severity.
    pub severity: Severity,
    /// Description of the situation.
    pub description: String,
    /// Time of the last update.
    pub last_updated: DateTime<Utc>,
    /// Vertex the situation is raised against, if any.
    pub vertex_id: Option<String>,
    /// Correlated alarms.
    pub related_alarms: Vec<Alarm>,
}

impl From<&RawAlarm> for Situation {
    fn from(raw: &RawAlarm) -> Self {
        Self {
            reduction_key: raw.reduction_key.clone(),
            severity: raw.severity,
            description: raw.description.clone(),
            last_updated: raw.last_event_time,
            vertex_id: raw.vertex_id(),
            related_alarms: raw.related_alarms.iter().map(Alarm::from).collect(),
        }
    }
}

/// A monitoring event tied to a vertex.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Event class.
    pub uei: String,
    /// Description, empty when the backend supplied none.
    pub description: String,
    /// When the event happened.
    pub time: DateTime<Utc>,
    /// Vertex the event is about. Empty when the event names no node.
    pub vertex_id: String,
}

impl Event {
    /// Convert a backend event, stamping it with `received_at` when it
    /// carries no time of its own.
    pub fn from_raw(raw: &RawEvent, received_at: DateTime<Utc>) -> Self {
        Self {
            uei: raw.uei.clone(),
            description: raw.description.clone().unwrap_or_default(),
            time: raw.time.unwrap_or(received_at),
            vertex_id: raw.node_id.map(|id| id.to_string()).unwrap_or_default(),
        }
    }
}
