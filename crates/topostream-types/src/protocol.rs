//! Request and message envelopes plus the two-phase wire codec.
//!
//! Server-to-client traffic is a JSON envelope `{"type": ..., "payload": ...}`.
//! Decoding first reads the envelope with an opaque payload, then branches
//! on the tag and decodes the payload into the matching [`StreamMessage`]
//! variant. Client-to-server traffic is a [`Request`].

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::enums::{MessageType, RequestAction};
use crate::raw::{RawAlarm, RawEvent, RawNode, RawTopologyEdge, Topology};

/// Errors raised while encoding or decoding protocol traffic.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The outer `{type, payload}` envelope could not be read.
    #[error("malformed envelope: {0}")]
    Envelope(#[source] serde_json::Error),

    /// The envelope carried a tag outside the message-type enumeration.
    #[error("unknown message type '{0}'")]
    UnknownMessageType(String),

    /// The payload did not match the shape required by its tag.
    #[error("malformed {kind} payload: {source}")]
    Payload {
        /// Tag of the envelope.
        kind: MessageType,
        /// The underlying decode error.
        source: serde_json::Error,
    },

    /// A client request could not be read.
    #[error("malformed request: {0}")]
    Request(#[source] serde_json::Error),

    /// A value could not be serialized.
    #[error("encode error: {0}")]
    Encode(#[source] serde_json::Error),
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

/// Subscription-scoped visibility predicate.
///
/// `locations: None` matches everything; a present set requires the
/// entity's location to be a member.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct FilterCriteria {
    /// Locations the subscriber wants to see.
    #[serde(default)]
    pub locations: Option<BTreeSet<String>>,
}

impl FilterCriteria {
    /// Criteria that match every entity.
    pub const fn match_all() -> Self {
        Self { locations: None }
    }

    /// Criteria restricted to the given locations.
    pub fn for_locations<I, S>(locations: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            locations: Some(locations.into_iter().map(Into::into).collect()),
        }
    }

    /// Whether these criteria match every entity.
    pub const fn is_match_all(&self) -> bool {
        self.locations.is_none()
    }
}

/// A client request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Request {
    /// What the client wants.
    pub action: RequestAction,
    /// Filter to apply. Absent means match everything.
    #[serde(default)]
    pub criteria: Option<FilterCriteria>,
}

impl Request {
    /// A subscribe request with optional criteria.
    pub const fn subscribe(criteria: Option<FilterCriteria>) -> Self {
        Self {
            action: RequestAction::Subscribe,
            criteria,
        }
    }

    /// An unsubscribe request.
    pub const fn unsubscribe() -> Self {
        Self {
            action: RequestAction::Unsubscribe,
            criteria: None,
        }
    }

    /// Encode the request as JSON text.
    pub fn encode(&self) -> Result<String, CodecError> {
        serde_json::to_string(self).map_err(CodecError::Encode)
    }

    /// Decode a request from JSON text.
    pub fn decode(text: &str) -> Result<Self, CodecError> {
        serde_json::from_str(text).map_err(CodecError::Request)
    }
}

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

/// Payload of an [`MessageType::AlarmDelete`] message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "bindings/")]
pub struct AlarmDelete {
    /// Identity of the deleted alarm.
    pub reduction_key: String,
    /// Whether the deleted alarm was a situation.
    #[serde(default)]
    pub is_situation: bool,
}

/// A decoded server-to-client message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamMessage {
    /// New or updated alarm or situation.
    Alarm(RawAlarm),
    /// Deleted alarm or situation.
    AlarmDelete(AlarmDelete),
    /// New or updated edge.
    Edge(RawTopologyEdge),
    /// Deleted edge.
    EdgeDelete(RawTopologyEdge),
    /// Monitoring event.
    Event(RawEvent),
    /// Full snapshot.
    Topology(Topology),
    /// Node announcement.
    Node(RawNode),
}

/// Envelope as read from the wire, payload still opaque.
#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    payload: serde_json::Value,
}

/// Envelope as written to the wire, borrowing its payload.
#[derive(Serialize)]
struct EnvelopeRef<'a, T: Serialize> {
    #[serde(rename = "type")]
    kind: MessageType,
    payload: &'a T,
}

impl StreamMessage {
    /// Tag of this message.
    pub const fn message_type(&self) -> MessageType {
        match self {
            Self::Alarm(_) => MessageType::Alarm,
            Self::AlarmDelete(_) => MessageType::AlarmDelete,
            Self::Edge(_) => MessageType::Edge,
            Self::EdgeDelete(_) => MessageType::EdgeDelete,
            Self::Event(_) => MessageType::Event,
            Self::Topology(_) => MessageType::Topology,
            Self::Node(_) => MessageType::Node,
        }
    }

    /// Encode the message as envelope JSON text.
    pub fn encode(&self) -> Result<String, CodecError> {
        let kind = self.message_type();
        let text = match self {
            Self::Alarm(alarm) => to_envelope(kind, alarm),
            Self::AlarmDelete(delete) => to_envelope(kind, delete),
            Self::Edge(edge) | Self::EdgeDelete(edge) => to_envelope(kind, edge),
            Self::Event(event) => to_envelope(kind, event),
            Self::Topology(topology) => to_envelope(kind, topology),
            Self::Node(node) => to_envelope(kind, node),
        };
        text.map_err(CodecError::Encode)
    }

    /// Decode envelope JSON text.
    ///
    /// # Errors
    ///
    /// [`CodecError::UnknownMessageType`] for a tag outside the enumeration,
    /// [`CodecError::Payload`] when the payload does not fit its tag.
    pub fn decode(text: &str) -> Result<Self, CodecError> {
        let envelope: Envelope = serde_json::from_str(text).map_err(CodecError::Envelope)?;
        let kind = MessageType::from_tag(&envelope.kind)
            .ok_or(CodecError::UnknownMessageType(envelope.kind))?;
        let payload = envelope.payload;

        let message = match kind {
            MessageType::Alarm => Self::Alarm(from_payload(kind, payload)?),
            MessageType::AlarmDelete => Self::AlarmDelete(from_payload(kind, payload)?),
            MessageType::Edge => Self::Edge(from_payload(kind, payload)?),
            MessageType::EdgeDelete => Self::EdgeDelete(from_payload(kind, payload)?),
            MessageType::Event => Self::Event(from_payload(kind, payload)?),
            MessageType::Topology => Self::Topology(from_payload(kind, payload)?),
            MessageType::Node => Self::Node(from_payload(kind, payload)?),
        };
        Ok(message)
    }
}

fn to_envelope<T: Serialize>(kind: MessageType, payload: &T) -> serde_json::Result<String> {
    serde_json::to_string(&EnvelopeRef { kind, payload })
}

fn from_payload<T: serde::de::DeserializeOwned>(
    kind: MessageType,
    payload: serde_json::Value,
) -> Result<T, CodecError> {
    serde_json::from_value(payload).map_err(|source| CodecError::Payload { kind, source })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::enums::{Severity, TopologyProtocol};
    use crate::ids::AlarmId;
    use crate::raw::RawEndpoint;

    #[test]
    fn request_wire_shape() {
        let request = Request::subscribe(Some(FilterCriteria::for_locations(["DC1"])));
        let value: serde_json::Value = serde_json::from_str(&request.encode().unwrap()).unwrap();
        assert_eq!(value["action"], "SUBSCRIBE");
        assert_eq!(value["criteria"]["locations"][0], "DC1");
    }

    #[test]
    fn request_without_criteria_decodes() {
        let request = Request::decode(r#"{"action": "UNSUBSCRIBE"}"#).unwrap();
        assert_eq!(request, Request::unsubscribe());
    }

    #[test]
    fn null_locations_mean_match_all() {
        let criteria: FilterCriteria = serde_json::from_str(r#"{"locations": null}"#).unwrap();
        assert!(criteria.is_match_all());
    }

    #[test]
    fn envelope_carries_tag_and_payload() {
        let message = StreamMessage::Node(RawNode::new(4, "n4", "DC2"));
        let text = message.encode().unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["type"], "Node");
        assert_eq!(value["payload"]["id"], 4);
        assert_eq!(value["payload"]["location"], "DC2");
    }

    #[test]
    fn decode_branches_on_tag() {
        let edge = RawTopologyEdge {
            id: "a-z".to_owned(),
            protocol: TopologyProtocol::UserDefined,
            source: RawEndpoint::Node(RawNode::new(1, "a", "Ottawa")),
            target: RawEndpoint::Node(RawNode::new(2, "z", "Ottawa")),
            tooltip_text: None,
        };
        let text = StreamMessage::EdgeDelete(edge.clone()).encode().unwrap();
        let decoded = StreamMessage::decode(&text).unwrap();
        assert_eq!(decoded, StreamMessage::EdgeDelete(edge));
    }

    #[test]
    fn alarm_message_decodes() {
        let alarm = RawAlarm {
            id: AlarmId::new(1),
            reduction_key: "alarm1".to_owned(),
            severity: Severity::Critical,
            description: String::new(),
            last_event_time: Utc::now(),
            node: Some(RawNode::new(1, "a", "Ottawa")),
            situation: false,
            related_alarms: Vec::new(),
        };
        let text = StreamMessage::Alarm(alarm.clone()).encode().unwrap();
        assert_eq!(
            StreamMessage::decode(&text).unwrap(),
            StreamMessage::Alarm(alarm)
        );
    }

    #[test]
    fn unknown_tag_is_reported() {
        let result = StreamMessage::decode(r#"{"type": "Situation", "payload": {}}"#);
        assert!(matches!(
            result,
            Err(CodecError::UnknownMessageType(ref tag)) if tag == "Situation"
        ));
    }

    #[test]
    fn payload_mismatch_names_the_tag() {
        let result = StreamMessage::decode(r#"{"type": "AlarmDelete", "payload": {"x": 1}}"#);
        assert!(matches!(
            result,
            Err(CodecError::Payload {
                kind: MessageType::AlarmDelete,
                ..
            })
        ));
    }

    #[test]
    fn garbage_is_an_envelope_error() {
        assert!(matches!(
            StreamMessage::decode("not json"),
            Err(CodecError::Envelope(_))
        ));
    }

    #[test]
    fn empty_topology_payload_decodes() {
        let decoded = StreamMessage::decode(r#"{"type": "Topology", "payload": {}}"#).unwrap();
        assert_eq!(decoded, StreamMessage::Topology(Topology::default()));
    }
}
