//! Reconstructed topology graph: vertices as nodes, edges as an undirected
//! multigraph.
//!
//! Two vertices may be joined by several edges, one per discovery protocol.
//! An incidence map indexes the edge ids touching each vertex:
//! `BTreeMap<vertex id, BTreeSet<edge id>>`.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use topostream_types::{Edge, EdgeVertices, Topology, Vertex};

/// The client-side topology graph.
///
/// Owns the vertex and edge caches. Every edge's endpoints are present as
/// vertices.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TopologyGraph {
    /// All vertices indexed by id.
    vertices: BTreeMap<String, Vertex>,
    /// All edges indexed by id.
    edges: BTreeMap<String, Edge>,
    /// Incidence: vertex id -> ids of the edges touching it.
    incident: BTreeMap<String, BTreeSet<String>>,
}

impl TopologyGraph {
    /// Create an empty graph.
    pub const fn new() -> Self {
        Self {
            vertices: BTreeMap::new(),
            edges: BTreeMap::new(),
            incident: BTreeMap::new(),
        }
    }

    /// Build the graph for a full topology snapshot.
    ///
    /// Vertices are the snapshot's nodes plus every edge endpoint. Edges
    /// between two segments are left out.
    pub fn from_topology(topology: &Topology) -> Self {
        let mut graph = Self::new();
        for node in topology.nodes() {
            graph.add_vertex(Vertex::from(node));
        }
        for raw in topology.edges() {
            let converted = EdgeVertices::from(raw);
            graph.add_vertex(converted.source);
            graph.add_vertex(converted.target);
            if raw.is_segment_to_segment() {
                tracing::trace!(edge_id = %raw.id, "Skipping segment-to-segment edge");
                continue;
            }
            graph.add_edge(converted.edge);
        }
        graph
    }

    // -------------------------------------------------------------------
    // Mutation
    // -------------------------------------------------------------------

    /// Add a vertex. Returns `false`, leaving the graph unchanged, if a
    /// vertex with the same id exists.
    pub fn add_vertex(&mut self, vertex: Vertex) -> bool {
        if self.vertices.contains_key(&vertex.id) {
            return false;
        }
        self.vertices.insert(vertex.id.clone(), vertex);
        true
    }

    /// Add an edge, inserting any endpoint vertex not yet present.
    ///
    /// Returns `false`, leaving the graph unchanged, if an edge with the
    /// same id exists.
    pub fn add_edge(&mut self, edge: Edge) -> bool {
        if self.edges.contains_key(&edge.id) {
            return false;
        }
        self.add_vertex(edge.source.clone());
        self.add_vertex(edge.target.clone());
        for endpoint in [&edge.source.id, &edge.target.id] {
            self.incident
                .entry(endpoint.clone())
                .or_default()
                .insert(edge.id.clone());
        }
        self.edges.insert(edge.id.clone(), edge);
        true
    }

    /// Remove an edge by id. Its endpoint vertices stay.
    pub fn remove_edge(&mut self, edge_id: &str) -> Option<Edge> {
        let edge = self.edges.remove(edge_id)?;
        for endpoint in [&edge.source.id, &edge.target.id] {
            if let Some(ids) = self.incident.get_mut(endpoint) {
                ids.remove(edge_id);
                if ids.is_empty() {
                    self.incident.remove(endpoint);
                }
            }
        }
        Some(edge)
    }

    // -------------------------------------------------------------------
    // Queries
    // -------------------------------------------------------------------

    /// Look up a vertex.
    pub fn vertex(&self, id: &str) -> Option<&Vertex> {
        self.vertices.get(id)
    }

    /// Look up an edge.
    pub fn edge(&self, id: &str) -> Option<&Edge> {
        self.edges.get(id)
    }

    /// Whether a vertex with this id exists.
    pub fn contains_vertex(&self, id: &str) -> bool {
        self.vertices.contains_key(id)
    }

    /// Whether an edge with this id exists.
    pub fn contains_edge(&self, id: &str) -> bool {
        self.edges.contains_key(id)
    }

    /// Number of vertices.
    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    /// Number of edges.
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// All vertices in id order.
    pub fn vertices(&self) -> impl Iterator<Item = &Vertex> {
        self.vertices.values()
    }

    /// All edges in id order.
    pub fn edges(&self) -> impl Iterator<Item = &Edge> {
        self.edges.values()
    }

    /// Edges touching the vertex.
    pub fn incident_edges(&self, vertex_id: &str) -> Vec<&Edge> {
        let Some(ids) = self.incident.get(vertex_id) else {
            return Vec::new();
        };
        ids.iter().filter_map(|id| self.edges.get(id)).collect()
    }

    /// Vertices sharing at least one edge with the vertex, each listed once.
    pub fn neighbors(&self, vertex_id: &str) -> Vec<&Vertex> {
        let ids: BTreeSet<&str> = self
            .incident_edges(vertex_id)
            .into_iter()
            .map(|edge| {
                if edge.source.id == vertex_id {
                    edge.target.id.as_str()
                } else {
                    edge.source.id.as_str()
                }
            })
            .collect();
        ids.into_iter()
            .filter_map(|id| self.vertices.get(id))
            .collect()
    }
}
