// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

use crate::{earth_distance, BoundingBox, Edge, Node};
use std::collections::btree_map::{BTreeMap, Entry};

/// Represents a street network as a set of [Nodes](Node)
/// and [Edges](Edge) between them.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Graph(pub(crate) BTreeMap<i64, (Node, Vec<Edge>)>);

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of nodes in the graph.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the number of edges in the graph, including edges to unknown nodes.
    pub fn edge_count(&self) -> usize {
        self.0.values().map(|(_, edges)| edges.len()).sum()
    }

    /// Returns an iterator over all [Nodes](Node) in the graph, ordered by id.
    pub fn iter(&self) -> impl Iterator<Item = &Node> {
        self.0.values().map(|(node, _)| node)
    }

    /// Returns an iterator over all `(from_id, edge)` pairs in the graph.
    pub fn edges(&self) -> impl Iterator<Item = (i64, &Edge)> {
        self.0
            .iter()
            .flat_map(|(&from, (_, edges))| edges.iter().map(move |e| (from, e)))
    }

    /// Retrieves a [Node] with the provided id.
    pub fn get_node(&self, id: i64) -> Option<Node> {
        self.0.get(&id).map(|&(node, _)| node)
    }

    /// Creates or updates a [Node] with `node.id`.
    ///
    /// All outgoing and incoming edges are preserved.
    pub fn set_node(&mut self, node: Node) {
        assert_ne!(node.id, 0);

        match self.0.entry(node.id) {
            Entry::Vacant(e) => {
                e.insert((node, Vec::default()));
            }
            Entry::Occupied(mut e) => {
                e.get_mut().0 = node;
            }
        }
    }

    /// Deletes a [Node] with a given `id`.
    ///
    /// While all outgoing edges are removed, incoming edges are preserved
    /// (as this would require a walk over all nodes in the graph).
    pub fn delete_node(&mut self, id: i64) {
        self.0.remove(&id);
    }

    /// Finds the closest [Node] to the given position.
    ///
    /// This function requires computing the distance to every [Node] in the graph,
    /// and is not suitable for large graphs - use a [KDTree](crate::KDTree) instead.
    pub fn find_nearest_node(&self, lat: f64, lon: f64) -> Option<Node> {
        self.iter()
            .map(|nd| (earth_distance(lat, lon, nd.lat, nd.lon), *nd))
            .min_by(|(a_dist, _), (b_dist, _)| a_dist.total_cmp(b_dist))
            .map(|(_, nd)| nd)
    }

    /// Gets all outgoing [Edges](Edge) from a node with a given id.
    pub fn get_edges(&self, from_id: i64) -> &[Edge] {
        self.0
            .get(&from_id)
            .map(|(_, e)| e.as_slice())
            .unwrap_or_default()
    }

    /// Gets the length of an [Edge] from one node to another.
    /// If such an edge doesn't exist, returns [f64::INFINITY].
    pub fn get_edge(&self, from_id: i64, to_id: i64) -> f64 {
        self.get_edges(from_id)
            .iter()
            .find(|edge| edge.to == to_id)
            .map(|edge| edge.length)
            .unwrap_or(f64::INFINITY)
    }

    /// Creates or replaces an [Edge] from a node with a given id.
    /// Does nothing if the `from_id` node doesn't exist.
    pub fn set_edge(&mut self, from_id: i64, edge: Edge) {
        assert_ne!(from_id, 0);
        assert_ne!(edge.to, 0);

        if let Some((_, edges)) = self.0.get_mut(&from_id) {
            if let Some(candidate) = edges.iter_mut().find(|e| e.to == edge.to) {
                *candidate = edge;
            } else {
                edges.push(edge);
            }
        }
    }

    /// Adds an [Edge] from a node with a given id, unless a shorter
    /// (or equally long) edge between the same nodes already exists.
    /// Street networks may have multiple parallel ways between two nodes;
    /// only the shortest one matters for routing.
    pub fn add_edge(&mut self, from_id: i64, edge: Edge) {
        if self.get_edge(from_id, edge.to) > edge.length {
            self.set_edge(from_id, edge);
        }
    }

    /// Removes an edge from one node to another.
    pub fn delete_edge(&mut self, from_id: i64, to_id: i64) {
        if let Some((_, edges)) = self.0.get_mut(&from_id) {
            if let Some(idx) = edges.iter().position(|edge| edge.to == to_id) {
                edges.swap_remove(idx);
            }
        }
    }

    /// Returns the envelope of all nodes, or `None` for an empty graph.
    pub fn bounding_box(&self) -> Option<BoundingBox> {
        BoundingBox::enclosing(self.iter().map(Node::point))
    }
}
