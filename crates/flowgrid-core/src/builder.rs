//! Adjacency discovery and topology graph construction.
//!
//! Building happens in two passes. [`discover_links`] reads the spatial
//! snapshot and records which same-family parts touch each other.
//! [`GraphBuilder::build`] then walks those links from one seed, folding
//! runs of plain transmitters into weighted edges and splitting the graph
//! at junctions.

use crate::graph::{NetEdge, TopologyGraph};
use crate::id::NodeId;
use crate::part::{NetworkPart, PartLink};
use crate::role::Role;
use crate::spatial::{GridPosition, SpatialQuery};
use slotmap::SlotMap;
use std::collections::{BTreeSet, VecDeque};

/// Parts touching `node` across a cell border, one link per neighbor.
///
/// Only in-bounds cells are checked and only parts of `node`'s family are
/// kept. Each link records the first contact found.
pub fn discover_links(
    parts: &SlotMap<NodeId, NetworkPart>,
    node: NodeId,
    spatial: &impl SpatialQuery,
) -> Vec<PartLink> {
    let Some(part) = parts.get(node) else {
        return Vec::new();
    };
    let cells = spatial.cells_occupied_by(node);
    let mut links: Vec<PartLink> = Vec::new();

    for cell in &cells {
        for next in cell.neighbors() {
            if cells.contains(&next) || !spatial.is_in_bounds(next) {
                continue;
            }
            for other in spatial.parts_at(next) {
                if other == node || links.iter().any(|l| l.neighbor == other) {
                    continue;
                }
                let Some(other_part) = parts.get(other) else {
                    tracing::warn!(cell = ?next, part = ?other, "spatial index reports an unknown part");
                    continue;
                };
                if other_part.family() != part.family() {
                    continue;
                }
                links.push(PartLink {
                    neighbor: other,
                    from_cell: *cell,
                    to_cell: next,
                });
            }
        }
    }
    links
}

/// True when `node` becomes a vertex of the topology graph: anything that
/// is not a plain transmitter, plus transmitters joining more than two
/// transmitter runs.
pub fn is_graph_node(parts: &SlotMap<NodeId, NetworkPart>, node: NodeId) -> bool {
    let Some(part) = parts.get(node) else {
        return false;
    };
    if !part.roles().is_transmitter_only() {
        return true;
    }
    part.direct_neighbors()
        .filter(|n| parts.get(*n).is_some_and(|p| p.has_role(Role::Transmitter)))
        .count()
        > 2
}

/// Result of one build.
#[derive(Debug, Clone)]
pub struct GraphBuild {
    pub root: NodeId,
    pub graph: TopologyGraph,
    /// Every part reached, transmitter segments included, in discovery
    /// order.
    pub members: Vec<NodeId>,
}

/// Scratch state owned by a single build.
struct BuildContext {
    visited: BTreeSet<NodeId>,
    members: Vec<NodeId>,
    frontier: VecDeque<NodeId>,
    graph: TopologyGraph,
}

impl BuildContext {
    fn new() -> Self {
        Self {
            visited: BTreeSet::new(),
            members: Vec::new(),
            frontier: VecDeque::new(),
            graph: TopologyGraph::new(),
        }
    }

    fn visit(&mut self, node: NodeId) -> bool {
        if !self.visited.insert(node) {
            return false;
        }
        self.members.push(node);
        true
    }

    /// Register an edge ending at a graph node and queue that node.
    fn connect(
        &mut self,
        from: NodeId,
        to: NodeId,
        from_cell: GridPosition,
        to_cell: GridPosition,
        weight: u32,
    ) {
        if from == to {
            return;
        }
        let edge = NetEdge {
            from,
            to,
            from_cell,
            to_cell,
            weight,
        };
        if let Some(existing) = self.graph.try_get_edge(from, to) {
            // Direct contacts are met again from the far side.
            if *existing != edge {
                tracing::warn!(
                    from = ?from,
                    to = ?to,
                    kept = existing.weight,
                    dropped = weight,
                    "rejected duplicate edge"
                );
            }
            return;
        }
        self.graph.add_edge(edge);
        if self.visit(to) {
            self.frontier.push_back(to);
        }
    }

    /// Follow the transmitter run that starts at `first`, adding one edge
    /// from `origin` to every graph node at its far ends.
    fn walk_run(&mut self, parts: &SlotMap<NodeId, NetworkPart>, origin: NodeId, first: &PartLink) {
        if !self.visit(first.neighbor) {
            return;
        }
        let mut stack = vec![(first.neighbor, 1u32)];
        while let Some((segment, weight)) = stack.pop() {
            let Some(part) = parts.get(segment) else {
                continue;
            };
            for link in part.links() {
                let next = link.neighbor;
                if next == origin {
                    continue;
                }
                if is_graph_node(parts, next) {
                    self.connect(origin, next, first.from_cell, link.to_cell, weight);
                } else if self.visit(next) {
                    stack.push((next, weight + 1));
                }
            }
        }
    }
}

pub struct GraphBuilder;

impl GraphBuilder {
    /// Find the graph node a build starting at `seed` grows from. A plain
    /// transmitter seed is resolved by walking outward until a node shows
    /// up; a run with no node at all resolves to `None`.
    pub fn resolve_root(parts: &SlotMap<NodeId, NetworkPart>, seed: NodeId) -> Option<NodeId> {
        if !parts.contains_key(seed) {
            return None;
        }
        let mut seen = BTreeSet::from([seed]);
        let mut queue = VecDeque::from([seed]);
        while let Some(current) = queue.pop_front() {
            if is_graph_node(parts, current) {
                return Some(current);
            }
            let Some(part) = parts.get(current) else {
                continue;
            };
            for next in part.direct_neighbors() {
                if seen.insert(next) {
                    queue.push_back(next);
                }
            }
        }
        None
    }

    /// Build the complete graph reachable from `seed`.
    pub fn build(parts: &SlotMap<NodeId, NetworkPart>, seed: NodeId) -> Option<GraphBuild> {
        let Some(root) = Self::resolve_root(parts, seed) else {
            tracing::debug!(seed = ?seed, "no graph node reachable from seed");
            return None;
        };

        let mut ctx = BuildContext::new();
        ctx.visit(root);
        ctx.graph.add_node(root);
        ctx.frontier.push_back(root);

        while let Some(node) = ctx.frontier.pop_front() {
            let Some(part) = parts.get(node) else {
                continue;
            };
            for link in part.links() {
                if is_graph_node(parts, link.neighbor) {
                    ctx.connect(node, link.neighbor, link.from_cell, link.to_cell, 0);
                } else {
                    ctx.walk_run(parts, node, link);
                }
            }
        }

        tracing::debug!(
            root = ?root,
            nodes = ctx.graph.node_count(),
            edges = ctx.graph.edge_count(),
            members = ctx.members.len(),
            "built topology graph"
        );
        Some(GraphBuild {
            root,
            graph: ctx.graph,
            members: ctx.members,
        })
    }
}
