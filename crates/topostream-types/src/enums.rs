//! Enumeration types shared by the server and the client.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

// ---------------------------------------------------------------------------
// Alarm severity
// ---------------------------------------------------------------------------

/// Alarm severity, ordered from least to most severe.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[ts(export, export_to = "bindings/")]
pub enum Severity {
    /// Severity could not be determined.
    #[default]
    Indeterminate,
    /// The problem has been cleared.
    Cleared,
    /// Informational.
    Normal,
    /// Warning.
    Warning,
    /// Minor.
    Minor,
    /// Major.
    Major,
    /// Critical.
    Critical,
}

impl Severity {
    /// Wire name of the severity.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Indeterminate => "INDETERMINATE",
            Self::Cleared => "CLEARED",
            Self::Normal => "NORMAL",
            Self::Warning => "WARNING",
            Self::Minor => "MINOR",
            Self::Major => "MAJOR",
            Self::Critical => "CRITICAL",
        }
    }
}

// ---------------------------------------------------------------------------
// Topology
// ---------------------------------------------------------------------------

/// Discovery protocol that produced a topology edge.
///
/// Several protocol-specific edges may share the same underlying link, so
/// the protocol name is part of the client-side edge identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "UPPERCASE")]
#[ts(export, export_to = "bindings/")]
pub enum TopologyProtocol {
    /// Wildcard used when listening for every protocol.
    All,
    /// Bridge forwarding tables.
    Bridge,
    /// Cisco Discovery Protocol.
    Cdp,
    /// IS-IS adjacencies.
    Isis,
    /// Link Layer Discovery Protocol.
    Lldp,
    /// OSPF neighbours.
    Ospf,
    /// Links drawn by an operator.
    UserDefined,
    /// Node-to-node links.
    Nodes,
}

impl TopologyProtocol {
    /// Wire name of the protocol, used when deriving edge ids.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::All => "ALL",
            Self::Bridge => "BRIDGE",
            Self::Cdp => "CDP",
            Self::Isis => "ISIS",
            Self::Lldp => "LLDP",
            Self::Ospf => "OSPF",
            Self::UserDefined => "USERDEFINED",
            Self::Nodes => "NODES",
        }
    }
}

impl core::fmt::Display for TopologyProtocol {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of vertex in the reconstructed client graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub enum VertexType {
    /// A monitored node.
    Node,
    /// A port on a node.
    Port,
    /// A shared segment (e.g. a bridge domain).
    Segment,
}

// ---------------------------------------------------------------------------
// Protocol
// ---------------------------------------------------------------------------

/// Action carried by a client request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "UPPERCASE")]
#[ts(export, export_to = "bindings/")]
pub enum RequestAction {
    /// Start streaming; the server answers with a full topology.
    Subscribe,
    /// Stop streaming.
    Unsubscribe,
}

/// Discriminant of a server-to-client message.
///
/// This enumeration is the only compatibility surface of the protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub enum MessageType {
    /// New or updated alarm (or situation).
    Alarm,
    /// Deleted alarm (or situation).
    AlarmDelete,
    /// New or updated topology edge.
    Edge,
    /// Deleted topology edge.
    EdgeDelete,
    /// Monitoring event tied to a node.
    Event,
    /// Full topology snapshot.
    Topology,
    /// Node announcement.
    Node,
}

impl MessageType {
    /// Every message type, in wire order.
    pub const ALL: [Self; 7] = [
        Self::Alarm,
        Self::AlarmDelete,
        Self::Edge,
        Self::EdgeDelete,
        Self::Event,
        Self::Topology,
        Self::Node,
    ];

    /// Wire tag of the message type.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Alarm => "Alarm",
            Self::AlarmDelete => "AlarmDelete",
            Self::Edge => "Edge",
            Self::EdgeDelete => "EdgeDelete",
            Self::Event => "Event",
            Self::Topology => "Topology",
            Self::Node => "Node",
        }
    }

    /// Look up a message type by its wire tag.
    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == tag)
    }
}

impl core::fmt::Display for MessageType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}
