//! Weighted topology graph of one flow network.
//!
//! Nodes are the parts that take part in transfers (endpoints and
//! junctions). Plain transmitter segments are folded into edge weights.
//! Every edge is stored in both directions; adjacency is kept symmetric.

use crate::id::NodeId;
use crate::path::{PathRequest, PathRequestCache, PathResult, shortest_paths};
use crate::spatial::GridPosition;
use serde::{Deserialize, Serialize};
use slotmap::SecondaryMap;
use std::collections::BTreeMap;

/// A directed connection between two nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetEdge {
    pub from: NodeId,
    pub to: NodeId,
    /// Cell of `from` where the connection leaves.
    pub from_cell: GridPosition,
    /// Cell of `to` where the connection arrives.
    pub to_cell: GridPosition,
    /// Transmitter segments between the two nodes. 0 is a direct contact.
    pub weight: u32,
}

impl NetEdge {
    pub fn reverse(&self) -> NetEdge {
        NetEdge {
            from: self.to,
            to: self.from,
            from_cell: self.to_cell,
            to_cell: self.from_cell,
            weight: self.weight,
        }
    }

    pub fn is_direct(&self) -> bool {
        self.weight == 0
    }
}

#[derive(Debug, Clone, Default)]
pub struct TopologyGraph {
    /// Insertion order. Network phases walk nodes in this order.
    nodes: Vec<NodeId>,
    adjacency: SecondaryMap<NodeId, Vec<NodeId>>,
    edges: BTreeMap<(NodeId, NodeId), NetEdge>,
    cache: PathRequestCache,
}

impl TopologyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    // -----------------------------------------------------------------------
    // Mutation
    // -----------------------------------------------------------------------

    /// Add a node. Returns false when already present.
    pub fn add_node(&mut self, node: NodeId) -> bool {
        if self.adjacency.contains_key(node) {
            return false;
        }
        self.nodes.push(node);
        self.adjacency.insert(node, Vec::new());
        true
    }

    /// Register `edge` and its reverse. Missing endpoints are added.
    /// Self-loops and duplicates are rejected.
    pub fn add_edge(&mut self, edge: NetEdge) -> bool {
        if edge.from == edge.to {
            tracing::warn!(node = ?edge.from, "rejected self-loop edge");
            return false;
        }
        if self.edges.contains_key(&(edge.from, edge.to)) {
            tracing::warn!(from = ?edge.from, to = ?edge.to, "rejected duplicate edge");
            return false;
        }
        self.add_node(edge.from);
        self.add_node(edge.to);

        let reverse = edge.reverse();
        self.edges.insert((edge.from, edge.to), edge);
        self.edges.insert((reverse.from, reverse.to), reverse);
        if let Some(list) = self.adjacency.get_mut(edge.from) {
            list.push(edge.to);
        }
        if let Some(list) = self.adjacency.get_mut(edge.to) {
            list.push(edge.from);
        }
        self.cache.notify_node_changed(edge.from);
        self.cache.notify_node_changed(edge.to);
        true
    }

    /// Remove the edge between `a` and `b` in both directions.
    pub fn remove_edge(&mut self, a: NodeId, b: NodeId) -> Option<NetEdge> {
        let edge = self.edges.remove(&(a, b))?;
        self.edges.remove(&(b, a));
        if let Some(list) = self.adjacency.get_mut(a) {
            list.retain(|n| *n != b);
        }
        if let Some(list) = self.adjacency.get_mut(b) {
            list.retain(|n| *n != a);
        }
        self.cache.notify_node_changed(a);
        self.cache.notify_node_changed(b);
        Some(edge)
    }

    /// Remove a node and every edge touching it.
    pub fn remove_node(&mut self, node: NodeId) -> bool {
        let Some(neighbors) = self.adjacency.get(node).cloned() else {
            return false;
        };
        for neighbor in neighbors {
            self.remove_edge(node, neighbor);
        }
        self.adjacency.remove(node);
        self.nodes.retain(|n| *n != node);
        self.cache.notify_node_changed(node);
        true
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    pub fn nodes(&self) -> &[NodeId] {
        &self.nodes
    }

    pub fn contains_node(&self, node: NodeId) -> bool {
        self.adjacency.contains_key(node)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Undirected edge count.
    pub fn edge_count(&self) -> usize {
        self.edges.len() / 2
    }

    pub fn try_get_edge(&self, from: NodeId, to: NodeId) -> Option<&NetEdge> {
        self.edges.get(&(from, to))
    }

    /// Every directed edge, both directions included.
    pub fn edges(&self) -> impl Iterator<Item = &NetEdge> {
        self.edges.values()
    }

    pub fn neighbors(&self, node: NodeId) -> &[NodeId] {
        self.adjacency.get(node).map(Vec::as_slice).unwrap_or(&[])
    }

    // -----------------------------------------------------------------------
    // Paths
    // -----------------------------------------------------------------------

    /// Answer `request` through the cache. `matcher` decides which nodes
    /// are targets; it must agree with `request.target`.
    pub fn process_request(
        &mut self,
        request: &PathRequest,
        matcher: impl Fn(NodeId) -> bool,
    ) -> &PathResult {
        let adjacency = &self.adjacency;
        let edges = &self.edges;
        self.cache.process(request, || {
            shortest_paths(
                request,
                move |node| {
                    adjacency
                        .get(node)
                        .into_iter()
                        .flatten()
                        .filter_map(move |next| edges.get(&(node, *next)))
                        .map(|e| (e.to, e.weight))
                },
                matcher,
            )
        })
    }

    pub fn notify_node_changed(&mut self, node: NodeId) -> usize {
        self.cache.notify_node_changed(node)
    }

    pub fn cache(&self) -> &PathRequestCache {
        &self.cache
    }
}
