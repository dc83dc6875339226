//! Location-based visibility predicates.
//!
//! Pure functions with no shared state. Nodes and alarms reduce to a single
//! location check. Edges are visible only when **both** sides pass; port
//! and segment endpoints carry no location and always pass their side.

use topostream_types::{
    EndpointVisitor, FilterCriteria, RawAlarm, RawNode, RawTopologyEdge, Topology,
};

use crate::source::SourceSnapshot;

/// Whether `location` passes `criteria`.
pub fn matches_location(criteria: &FilterCriteria, location: &str) -> bool {
    criteria
        .locations
        .as_ref()
        .is_none_or(|locations| locations.contains(location))
}

/// Like [`matches_location`] for an entity that may have no location.
///
/// Only match-all criteria accept an entity without a location.
pub fn matches_optional_location(criteria: &FilterCriteria, location: Option<&str>) -> bool {
    location.map_or_else(
        || criteria.is_match_all(),
        |location| matches_location(criteria, location),
    )
}

/// Whether a node is visible under `criteria`.
pub fn accepts_node(criteria: &FilterCriteria, node: &RawNode) -> bool {
    matches_location(criteria, &node.location)
}

/// Whether an alarm is visible under `criteria`.
pub fn accepts_alarm(criteria: &FilterCriteria, alarm: &RawAlarm) -> bool {
    matches_optional_location(criteria, alarm.location())
}

/// Whether an edge is visible under `criteria`.
pub fn accepts_edge(criteria: &FilterCriteria, edge: &RawTopologyEdge) -> bool {
    let mut sides = EdgeSides::new(criteria);
    edge.visit_endpoints(&mut sides);
    sides.source && sides.target
}

/// Per-side verdicts for an edge. Sides start out satisfied and only node
/// endpoints can fail them.
struct EdgeSides<'c> {
    criteria: &'c FilterCriteria,
    source: bool,
    target: bool,
}

impl<'c> EdgeSides<'c> {
    const fn new(criteria: &'c FilterCriteria) -> Self {
        Self {
            criteria,
            source: true,
            target: true,
        }
    }
}

impl<'a> EndpointVisitor<'a> for EdgeSides<'_> {
    fn visit_source_node(&mut self, node: &'a RawNode) {
        self.source = accepts_node(self.criteria, node);
    }

    fn visit_target_node(&mut self, node: &'a RawNode) {
        self.target = accepts_node(self.criteria, node);
    }
}

/// Filter a full backend snapshot down to what `criteria` may see.
///
/// Each collection is filtered independently; empty results are encoded
/// as absent.
pub fn filter_snapshot(criteria: &FilterCriteria, snapshot: SourceSnapshot) -> Topology {
    let SourceSnapshot {
        nodes,
        edges,
        alarms,
    } = snapshot;

    Topology::from_parts(
        nodes
            .into_iter()
            .filter(|node| accepts_node(criteria, node))
            .collect(),
        edges
            .into_iter()
            .filter(|edge| accepts_edge(criteria, edge))
            .collect(),
        alarms
            .into_iter()
            .filter(|alarm| accepts_alarm(criteria, alarm))
            .collect(),
    )
}
