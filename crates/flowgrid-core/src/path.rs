//! Shortest-path queries over a topology graph and their memoization.
//!
//! A [`PathRequest`] asks for the cheapest path from one node to every node
//! matching a target. Results are cached per request in a
//! [`PathRequestCache`] together with the set of nodes the search touched.
//! When any touched node changes, the entry is marked dirty and recomputed
//! on its next use.

use crate::id::{FlowKindId, NodeId};
use crate::role::Role;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, BinaryHeap};

// ---------------------------------------------------------------------------
// Requests and results
// ---------------------------------------------------------------------------

/// What a path search looks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum PathTarget {
    /// One specific node.
    Node(NodeId),
    /// Every node carrying `role`, optionally restricted to nodes whose
    /// role handles `kind`.
    Role { role: Role, kind: Option<FlowKindId> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PathRequest {
    pub requester: NodeId,
    pub target: PathTarget,
    /// Maximum number of edges in a returned path.
    pub max_depth: Option<u32>,
}

impl PathRequest {
    pub fn to_node(requester: NodeId, target: NodeId) -> Self {
        Self {
            requester,
            target: PathTarget::Node(target),
            max_depth: None,
        }
    }

    pub fn to_role(requester: NodeId, role: Role, kind: Option<FlowKindId>) -> Self {
        Self {
            requester,
            target: PathTarget::Role { role, kind },
            max_depth: None,
        }
    }

    pub fn with_max_depth(mut self, max_depth: Option<u32>) -> Self {
        self.max_depth = max_depth;
        self
    }
}

/// Cheapest path to one matched node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodePath {
    pub target: NodeId,
    /// Requester first, target last.
    pub nodes: Vec<NodeId>,
    /// Sum of edge weights along the path.
    pub weight: u32,
}

impl NodePath {
    pub fn hops(&self) -> usize {
        self.nodes.len().saturating_sub(1)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathResult {
    /// One path per matched node, in settle order.
    pub paths: Vec<NodePath>,
    /// Every node the search settled, the requester included.
    pub touched: BTreeSet<NodeId>,
}

impl PathResult {
    /// False when the search matched nothing.
    pub fn is_valid(&self) -> bool {
        !self.paths.is_empty()
    }

    pub fn targets(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.paths.iter().map(|p| p.target)
    }

    pub fn path_to(&self, node: NodeId) -> Option<&NodePath> {
        self.paths.iter().find(|p| p.target == node)
    }
}

// ---------------------------------------------------------------------------
// Search
// ---------------------------------------------------------------------------

/// Frontier entry. Ordered for a min-heap on cost, with earlier discovery
/// winning ties.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Frontier {
    cost: u32,
    seq: u64,
    hops: u32,
    node: NodeId,
}

impl Ord for Frontier {
    fn cmp(&self, other: &Self) -> Ordering {
        match other.cost.cmp(&self.cost) {
            Ordering::Equal => other.seq.cmp(&self.seq),
            ord => ord,
        }
    }
}

impl PartialOrd for Frontier {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Search state. Hops only take part in the key when the request is
/// hop-limited; otherwise every state of a node collapses to hop 0.
type State = (NodeId, u32);

/// Dijkstra from `request.requester` to every node accepted by `is_target`.
///
/// `neighbors` yields `(neighbor, edge_weight)` pairs. The requester itself
/// is never a target. With `max_depth` set, the search runs over
/// `(node, hops)` so a cheap path with many hops cannot hide a dearer one
/// that fits within the limit.
pub fn shortest_paths<N, I>(
    request: &PathRequest,
    mut neighbors: N,
    is_target: impl Fn(NodeId) -> bool,
) -> PathResult
where
    N: FnMut(NodeId) -> I,
    I: IntoIterator<Item = (NodeId, u32)>,
{
    let start = request.requester;
    let limited = request.max_depth.is_some();
    let level = |hops: u32| if limited { hops } else { 0 };
    let key = |node: NodeId, hops: u32| -> State { (node, level(hops)) };

    let mut result = PathResult::default();
    // Fewest hops at which each node has been settled.
    let mut settled: BTreeMap<NodeId, u32> = BTreeMap::new();
    let mut best: BTreeMap<State, u32> = BTreeMap::new();
    let mut came_from: BTreeMap<State, State> = BTreeMap::new();
    let mut heap = BinaryHeap::new();
    let mut seq = 0u64;

    best.insert(key(start, 0), 0);
    heap.push(Frontier {
        cost: 0,
        seq,
        hops: 0,
        node: start,
    });

    while let Some(current) = heap.pop() {
        // A node settled earlier was reached no dearer and in no more hops.
        if settled.get(&current.node).is_some_and(|h| *h <= level(current.hops)) {
            continue;
        }
        settled.insert(current.node, level(current.hops));
        let state = key(current.node, current.hops);

        if result.touched.insert(current.node) && current.node != start && is_target(current.node)
        {
            result.paths.push(NodePath {
                target: current.node,
                nodes: reconstruct(&came_from, key(start, 0), state),
                weight: current.cost,
            });
        }
        if request.max_depth.is_some_and(|d| current.hops >= d) {
            continue;
        }
        let hops = current.hops + 1;
        for (next, weight) in neighbors(current.node) {
            if settled.get(&next).is_some_and(|h| *h <= level(hops)) {
                continue;
            }
            let cost = current.cost.saturating_add(weight);
            let next_state = key(next, hops);
            if best.get(&next_state).is_some_and(|b| *b <= cost) {
                continue;
            }
            best.insert(next_state, cost);
            came_from.insert(next_state, state);
            seq += 1;
            heap.push(Frontier {
                cost,
                seq,
                hops,
                node: next,
            });
        }
    }

    result
}

fn reconstruct(came_from: &BTreeMap<State, State>, start: State, end: State) -> Vec<NodeId> {
    let mut nodes = vec![end.0];
    let mut current = end;
    while current != start {
        match came_from.get(&current) {
            Some(prev) => {
                current = *prev;
                nodes.push(current.0);
            }
            None => break,
        }
    }
    nodes.reverse();
    nodes
}

// ---------------------------------------------------------------------------
// Cache
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct CacheEntry {
    result: PathResult,
    dirty: bool,
}

/// Memoized path results, invalidated per touched node.
#[derive(Debug, Clone, Default)]
pub struct PathRequestCache {
    entries: BTreeMap<PathRequest, CacheEntry>,
    /// Node -> requests whose search touched it.
    reach: BTreeMap<NodeId, BTreeSet<PathRequest>>,
    hits: u64,
    misses: u64,
}

impl PathRequestCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached result for `request`, running `compute` when the
    /// entry is missing or dirty.
    pub fn process(
        &mut self,
        request: &PathRequest,
        compute: impl FnOnce() -> PathResult,
    ) -> &PathResult {
        if self.entries.get(request).is_some_and(|e| !e.dirty) {
            self.hits += 1;
        } else {
            self.misses += 1;
            self.evict(request);
            let result = compute();
            for node in &result.touched {
                self.reach.entry(*node).or_default().insert(*request);
            }
            self.entries.insert(
                *request,
                CacheEntry {
                    result,
                    dirty: false,
                },
            );
        }
        &self.entries[request].result
    }

    /// Mark every request that touched `node` dirty. Returns how many were
    /// marked.
    pub fn notify_node_changed(&mut self, node: NodeId) -> usize {
        let Some(requests) = self.reach.get(&node) else {
            return 0;
        };
        let mut marked = 0;
        for request in requests {
            if let Some(entry) = self.entries.get_mut(request)
                && !entry.dirty
            {
                entry.dirty = true;
                marked += 1;
            }
        }
        marked
    }

    /// The cached result for `request`, dirty or not.
    pub fn get(&self, request: &PathRequest) -> Option<&PathResult> {
        self.entries.get(request).map(|e| &e.result)
    }

    pub fn is_dirty(&self, request: &PathRequest) -> bool {
        self.entries.get(request).is_some_and(|e| e.dirty)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.reach.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn hits(&self) -> u64 {
        self.hits
    }

    pub fn misses(&self) -> u64 {
        self.misses
    }

    fn evict(&mut self, request: &PathRequest) {
        let Some(entry) = self.entries.remove(request) else {
            return;
        };
        for node in &entry.result.touched {
            if let Some(set) = self.reach.get_mut(node) {
                set.remove(request);
                if set.is_empty() {
                    self.reach.remove(node);
                }
            }
        }
    }
}
