//! Pull side of the monitoring backend.
//!
//! The broadcast engine reads full alarm, node and edge lists from a
//! [`TopologySource`] when it builds a subscription snapshot. Push
//! notifications flow the other way, through the engine's `on_*` methods.
//!
//! [`InMemorySource`] is a self-contained backend used by the server
//! binary and by tests. It can be seeded from a JSON fixture holding a
//! `Topology`.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::RwLock;

use topostream_types::{AlarmId, NodeId, RawAlarm, RawNode, RawTopologyEdge, Topology, edge_id};
use tracing::info;

use crate::error::SourceError;

/// Everything the backend knows at one point in time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceSnapshot {
    /// All nodes.
    pub nodes: Vec<RawNode>,
    /// All topology edges.
    pub edges: Vec<RawTopologyEdge>,
    /// All alarms and situations.
    pub alarms: Vec<RawAlarm>,
}

/// Backend data access used for snapshot generation.
pub trait TopologySource: Send + Sync {
    /// Every current alarm and situation.
    fn alarms(&self) -> Result<Vec<RawAlarm>, SourceError>;

    /// Every known node.
    fn nodes(&self) -> Result<Vec<RawNode>, SourceError>;

    /// Every known topology edge.
    fn edges(&self) -> Result<Vec<RawTopologyEdge>, SourceError>;

    /// Read all three collections in one pass.
    ///
    /// Implementations that can read atomically should override this.
    fn snapshot(&self) -> Result<SourceSnapshot, SourceError> {
        Ok(SourceSnapshot {
            nodes: self.nodes()?,
            edges: self.edges()?,
            alarms: self.alarms()?,
        })
    }
}

#[derive(Debug, Default)]
struct SourceData {
    nodes: BTreeMap<NodeId, RawNode>,
    edges: BTreeMap<String, RawTopologyEdge>,
    alarms: BTreeMap<AlarmId, RawAlarm>,
}

/// Backend held entirely in memory.
///
/// Edges are keyed by their client edge id, so the same link reported by
/// two protocols is stored twice.
#[derive(Debug, Default)]
pub struct InMemorySource {
    data: RwLock<SourceData>,
}

impl InMemorySource {
    /// Create an empty backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a backend holding the contents of `topology`.
    pub fn from_topology(topology: Topology) -> Self {
        let data = SourceData {
            nodes: topology
                .nodes
                .unwrap_or_default()
                .into_iter()
                .map(|node| (node.id, node))
                .collect(),
            edges: topology
                .edges
                .unwrap_or_default()
                .into_iter()
                .map(|edge| (edge_id(&edge), edge))
                .collect(),
            alarms: topology
                .alarms
                .unwrap_or_default()
                .into_iter()
                .map(|alarm| (alarm.id, alarm))
                .collect(),
        };
        Self {
            data: RwLock::new(data),
        }
    }

    /// Load a backend from a JSON fixture file.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::Io`] if the file cannot be read, or
    /// [`SourceError::Fixture`] if it does not hold a `Topology`.
    pub fn from_fixture(path: &Path) -> Result<Self, SourceError> {
        let contents = std::fs::read_to_string(path)?;
        let topology: Topology = serde_json::from_str(&contents)?;
        info!(
            path = %path.display(),
            nodes = topology.nodes().len(),
            edges = topology.edges().len(),
            alarms = topology.alarms().len(),
            "Fixture loaded"
        );
        Ok(Self::from_topology(topology))
    }

    /// Insert or replace a node.
    pub fn upsert_node(&self, node: RawNode) -> Result<(), SourceError> {
        let mut data = self.data.write().map_err(|_poison| SourceError::Poisoned)?;
        data.nodes.insert(node.id, node);
        Ok(())
    }

    /// Insert or replace an edge.
    pub fn upsert_edge(&self, edge: RawTopologyEdge) -> Result<(), SourceError> {
        let mut data = self.data.write().map_err(|_poison| SourceError::Poisoned)?;
        data.edges.insert(edge_id(&edge), edge);
        Ok(())
    }

    /// Remove an edge. Returns whether it was present.
    pub fn remove_edge(&self, edge: &RawTopologyEdge) -> Result<bool, SourceError> {
        let mut data = self.data.write().map_err(|_poison| SourceError::Poisoned)?;
        Ok(data.edges.remove(&edge_id(edge)).is_some())
    }

    /// Insert or replace an alarm.
    pub fn upsert_alarm(&self, alarm: RawAlarm) -> Result<(), SourceError> {
        let mut data = self.data.write().map_err(|_poison| SourceError::Poisoned)?;
        data.alarms.insert(alarm.id, alarm);
        Ok(())
    }

    /// Remove an alarm. Returns the removed alarm.
    pub fn remove_alarm(&self, id: AlarmId) -> Result<Option<RawAlarm>, SourceError> {
        let mut data = self.data.write().map_err(|_poison| SourceError::Poisoned)?;
        Ok(data.alarms.remove(&id))
    }
}

impl TopologySource for InMemorySource {
    fn alarms(&self) -> Result<Vec<RawAlarm>, SourceError> {
        let data = self.data.read().map_err(|_poison| SourceError::Poisoned)?;
        Ok(data.alarms.values().cloned().collect())
    }

    fn nodes(&self) -> Result<Vec<RawNode>, SourceError> {
        let data = self.data.read().map_err(|_poison| SourceError::Poisoned)?;
        Ok(data.nodes.values().cloned().collect())
    }

    fn edges(&self) -> Result<Vec<RawTopologyEdge>, SourceError> {
        let data = self.data.read().map_err(|_poison| SourceError::Poisoned)?;
        Ok(data.edges.values().cloned().collect())
    }

    fn snapshot(&self) -> Result<SourceSnapshot, SourceError> {
        let data = self.data.read().map_err(|_poison| SourceError::Poisoned)?;
        Ok(SourceSnapshot {
            nodes: data.nodes.values().cloned().collect(),
            edges: data.edges.values().cloned().collect(),
            alarms: data.alarms.values().cloned().collect(),
        })
    }
}
