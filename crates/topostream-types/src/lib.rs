//! Shared type definitions for the topology streaming protocol.
//!
//! This crate is the single source of truth for everything that crosses the
//! wire between the streaming server and its clients, plus the domain
//! objects the client hands to consumers. Wire types flow downstream to
//! `TypeScript` via `ts-rs` for browser clients.
//!
//! # Modules
//!
//! - [`ids`] -- Type-safe wrappers for backend and connection identifiers
//! - [`enums`] -- Severity, discovery protocol, request action, message tag
//! - [`raw`] -- Backend entities as they travel on the wire
//! - [`protocol`] -- Request and message envelopes plus the wire codec
//! - [`model`] -- Domain objects produced by the client for consumers

pub mod enums;
pub mod ids;
pub mod model;
pub mod protocol;
pub mod raw;

// Re-export all public types at crate root for convenience.
pub use enums::{MessageType, RequestAction, Severity, TopologyProtocol, VertexType};
pub use ids::{AlarmId, ConnectionId, NodeId};
pub use model::{Alarm, Edge, EdgeVertices, Event, Situation, Vertex, edge_id};
pub use protocol::{AlarmDelete, CodecError, FilterCriteria, Request, StreamMessage};
pub use raw::{
    DEFAULT_LOCATION, EndpointVisitor, RawAlarm, RawEndpoint, RawEvent, RawNode, RawPort,
    RawSegment, RawTopologyEdge, Topology,
};

#[cfg(test)]
mod tests {
    //! `TypeScript` binding generation.

    #[test]
    fn export_bindings() {
        // Files are written to `bindings/` relative to the crate root.
        use ts_rs::TS;

        // IDs
        let _ = crate::ids::NodeId::export_all();
        let _ = crate::ids::AlarmId::export_all();

        // Enums
        let _ = crate::enums::Severity::export_all();
        let _ = crate::enums::TopologyProtocol::export_all();
        let _ = crate::enums::VertexType::export_all();
        let _ = crate::enums::RequestAction::export_all();
        let _ = crate::enums::MessageType::export_all();

        // Wire entities
        let _ = crate::raw::RawNode::export_all();
        let _ = crate::raw::RawPort::export_all();
        let _ = crate::raw::RawSegment::export_all();
        let _ = crate::raw::RawEndpoint::export_all();
        let _ = crate::raw::RawTopologyEdge::export_all();
        let _ = crate::raw::RawAlarm::export_all();
        let _ = crate::raw::RawEvent::export_all();
        let _ = crate::raw::Topology::export_all();

        // Protocol
        let _ = crate::protocol::FilterCriteria::export_all();
        let _ = crate::protocol::Request::export_all();
        let _ = crate::protocol::AlarmDelete::export_all();
    }
}
