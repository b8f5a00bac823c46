//! The flow system: owner of every part and network.
//!
//! Hosts report lifecycle changes through [`FlowSystem::on_spawned`] and
//! [`FlowSystem::on_destroyed`]. Those only queue work; topology is rebuilt
//! at the start of the next [`FlowSystem::tick`] (or an explicit
//! [`FlowSystem::apply_rebuilds`]), never in the middle of a tick.

use crate::builder::{GraphBuilder, discover_links};
use crate::container::{ContainerChange, FillState, FilterSettings, FlowContainer};
use crate::event::FlowEvent;
use crate::fixed::{Fixed64, FlowAmount, Ticks};
use crate::id::{FlowKindId, NetworkFamilyId, NetworkId, NodeId};
use crate::kind::{DestroyEffect, KindRegistry};
use crate::network::{ConsumerHook, Network, PassiveConsumers, TickContext, TransferRecord};
use crate::part::{NetworkPart, PartSpec, PartState, RequestMode, RequesterSettings};
use crate::path::{PathRequest, PathResult};
use crate::result::ValueResult;
use crate::role::Role;
use crate::spatial::SpatialQuery;
use serde::{Deserialize, Serialize};
use slotmap::SlotMap;
use std::collections::{BTreeMap, BTreeSet};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

fn default_base_unit() -> FlowAmount {
    Fixed64::ONE
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemConfig {
    /// Amount moved per transfer step for a kind of viscosity 1.
    #[serde(default = "default_base_unit")]
    pub base_unit: FlowAmount,
    /// Hop limit applied to every partner search. `None` is unlimited.
    #[serde(default)]
    pub max_path_depth: Option<u32>,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            base_unit: default_base_unit(),
            max_path_depth: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Destruction
// ---------------------------------------------------------------------------

/// How a part left the world.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DestroyMode {
    /// Removed without trace (unloaded, replaced by script).
    Vanish,
    /// Taken down by the player.
    Deconstruct,
    /// Destroyed by damage.
    Kill,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReleaseEffect {
    DropAsItems,
    ReleaseIntoWorld,
    Explode,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReleasedValue {
    pub kind: FlowKindId,
    pub amount: FlowAmount,
    pub effect: ReleaseEffect,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DestroyReport {
    pub node: NodeId,
    pub mode: DestroyMode,
    pub former_network: Option<NetworkId>,
    /// What the host should spawn, spill or detonate.
    pub released: Vec<ReleasedValue>,
}

fn released_contents(
    container: &FlowContainer,
    mode: DestroyMode,
    registry: &KindRegistry,
) -> Vec<ReleasedValue> {
    container
        .stored()
        .iter()
        .filter_map(|(&kind, &amount)| {
            let effect = match mode {
                DestroyMode::Vanish => return None,
                DestroyMode::Deconstruct => ReleaseEffect::DropAsItems,
                DestroyMode::Kill => match registry.get(kind).map(|k| k.destroy_effect) {
                    Some(DestroyEffect::Explode) => ReleaseEffect::Explode,
                    _ => ReleaseEffect::ReleaseIntoWorld,
                },
            };
            Some(ReleasedValue {
                kind,
                amount,
                effect,
            })
        })
        .collect()
}

fn change_event(node: NodeId, change: &ContainerChange, tick: Ticks) -> Option<FlowEvent> {
    if !change.fill_state_changed() {
        return None;
    }
    match change.current {
        FillState::Full => Some(FlowEvent::ContainerFull {
            node,
            kind: change.kind,
            tick,
        }),
        FillState::Empty => Some(FlowEvent::ContainerEmptied {
            node,
            kind: change.kind,
            tick,
        }),
        FillState::Partial => None,
    }
}

// ---------------------------------------------------------------------------
// FlowSystem
// ---------------------------------------------------------------------------

pub struct FlowSystem {
    pub(crate) registry: KindRegistry,
    pub(crate) config: SystemConfig,
    pub(crate) parts: SlotMap<NodeId, NetworkPart>,
    pub(crate) networks: SlotMap<NetworkId, Network>,
    pub(crate) controller_families: BTreeSet<NetworkFamilyId>,
    /// Parts whose links must be rediscovered.
    pub(crate) pending: BTreeSet<NodeId>,
    /// Parts left without a network by a dissolve.
    pub(crate) orphans: BTreeSet<NodeId>,
    pub(crate) events: Vec<FlowEvent>,
    pub(crate) tick: Ticks,
    pub(crate) hook: Box<dyn ConsumerHook>,
    pub(crate) last_transfers: Vec<TransferRecord>,
}

impl FlowSystem {
    pub fn new(registry: KindRegistry, config: SystemConfig) -> Self {
        Self {
            registry,
            config,
            parts: SlotMap::with_key(),
            networks: SlotMap::with_key(),
            controller_families: BTreeSet::new(),
            pending: BTreeSet::new(),
            orphans: BTreeSet::new(),
            events: Vec::new(),
            tick: 0,
            hook: Box::new(PassiveConsumers),
            last_transfers: Vec::new(),
        }
    }

    pub fn with_consumer_hook(mut self, hook: Box<dyn ConsumerHook>) -> Self {
        self.hook = hook;
        self
    }

    pub fn set_consumer_hook(&mut self, hook: Box<dyn ConsumerHook>) {
        self.hook = hook;
    }

    /// Networks of `family` only work while an active controller is
    /// connected.
    pub fn require_controller(&mut self, family: NetworkFamilyId) {
        self.controller_families.insert(family);
        for network in self.networks.values_mut() {
            if network.family() == family {
                network.set_requires_controller(true);
            }
        }
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Create a part from a template and queue it for network building.
    pub fn spawn_part(&mut self, spec: &PartSpec) -> NodeId {
        let node = self
            .parts
            .insert(NetworkPart::from_spec(spec, &self.registry));
        self.on_spawned(node, false);
        node
    }

    /// Recreate a part from persisted state, contents included.
    pub fn restore_part(&mut self, state: &PartState) -> NodeId {
        let node = self
            .parts
            .insert(NetworkPart::from_state(state, &self.registry));
        self.on_spawned(node, true);
        node
    }

    pub fn on_spawned(&mut self, node: NodeId, is_reload: bool) {
        if !self.parts.contains_key(node) {
            tracing::warn!(part = ?node, "spawn reported for an unknown part");
            return;
        }
        tracing::debug!(part = ?node, is_reload, "queued rebuild for spawned part");
        self.pending.insert(node);
    }

    /// Remove a part. Its network is dissolved and its former neighbors are
    /// queued for rebuilding. Returns `None` for unknown parts.
    pub fn on_destroyed(&mut self, node: NodeId, mode: DestroyMode) -> Option<DestroyReport> {
        let Some(part) = self.parts.remove(node) else {
            tracing::warn!(part = ?node, "destroy reported for an unknown part");
            return None;
        };
        self.pending.remove(&node);
        self.orphans.remove(&node);

        for neighbor in part.direct_neighbors() {
            if let Some(other) = self.parts.get_mut(neighbor) {
                other.unlink(node);
                self.pending.insert(neighbor);
            }
        }

        let former_network = part.network();
        if let Some(id) = former_network {
            self.dissolve(id);
        }

        let released = part
            .container()
            .map(|c| released_contents(c, mode, &self.registry))
            .unwrap_or_default();
        for value in &released {
            self.events.push(FlowEvent::ContentsReleased {
                node,
                kind: value.kind,
                amount: value.amount,
                tick: self.tick,
            });
        }

        tracing::debug!(part = ?node, ?mode, released = released.len(), "part destroyed");
        Some(DestroyReport {
            node,
            mode,
            former_network,
            released,
        })
    }

    /// Drop a network and mark its members for reassignment.
    fn dissolve(&mut self, id: NetworkId) -> bool {
        let Some(network) = self.networks.remove(id) else {
            return false;
        };
        for &member in network.members() {
            if let Some(part) = self.parts.get_mut(member) {
                part.set_network(None);
                self.orphans.insert(member);
            }
        }
        self.events.push(FlowEvent::NetworkDissolved {
            network: id,
            tick: self.tick,
        });
        tracing::debug!(network = ?id, members = network.members().len(), "network dissolved");
        true
    }

    /// Relink queued parts from `spatial` and rebuild every network they
    /// touch. Returns the formation events.
    pub fn apply_rebuilds(&mut self, spatial: &impl SpatialQuery) -> Vec<FlowEvent> {
        if self.pending.is_empty() && self.orphans.is_empty() {
            return Vec::new();
        }

        let seeds: Vec<NodeId> = std::mem::take(&mut self.pending)
            .into_iter()
            .filter(|n| self.parts.contains_key(*n))
            .collect();

        // Relink the seeds, then every part they touched before or touch now.
        let mut ring: BTreeSet<NodeId> = BTreeSet::new();
        for &seed in &seeds {
            let links = discover_links(&self.parts, seed, spatial);
            if let Some(part) = self.parts.get_mut(seed) {
                ring.extend(part.direct_neighbors());
                ring.extend(links.iter().map(|l| l.neighbor));
                part.set_links(links);
            }
        }
        for &node in &ring {
            if seeds.contains(&node) {
                continue;
            }
            let links = discover_links(&self.parts, node, spatial);
            if let Some(part) = self.parts.get_mut(node) {
                part.set_links(links);
            }
        }

        let mut affected: BTreeSet<NodeId> = seeds.iter().copied().collect();
        affected.extend(ring);
        let stale: BTreeSet<NetworkId> = affected
            .iter()
            .filter_map(|n| self.parts.get(*n).and_then(NetworkPart::network))
            .collect();
        for id in stale {
            self.dissolve(id);
        }
        affected.extend(std::mem::take(&mut self.orphans));

        let mut events = std::mem::take(&mut self.events);
        for candidate in affected {
            let unassigned = self
                .parts
                .get(candidate)
                .is_some_and(|p| p.network().is_none());
            if !unassigned {
                continue;
            }
            let Some(build) = GraphBuilder::build(&self.parts, candidate) else {
                continue;
            };
            let family = self
                .parts
                .get(build.root)
                .map(NetworkPart::family)
                .unwrap_or_default();
            let requires_controller = self.controller_families.contains(&family);
            let nodes = build.graph.node_count();
            let edges = build.graph.edge_count();
            let members = build.members.clone();
            let max_depth = self.config.max_path_depth;
            let parts = &self.parts;
            let id = self.networks.insert_with_key(|id| {
                Network::new(id, family, build, parts, requires_controller, max_depth)
            });
            for &member in &members {
                if let Some(part) = self.parts.get_mut(member) {
                    part.set_network(Some(id));
                }
            }
            tracing::debug!(network = ?id, ?family, nodes, edges, members = members.len(), "network formed");
            events.push(FlowEvent::NetworkFormed {
                network: id,
                family,
                nodes,
                edges,
                members: members.len(),
                tick: self.tick,
            });
        }
        events
    }

    /// Apply queued rebuilds, then run one tick on every working network.
    pub fn tick(&mut self, spatial: &impl SpatialQuery) -> Vec<FlowEvent> {
        let mut events = self.apply_rebuilds(spatial);
        events.append(&mut self.events);

        self.tick += 1;
        self.last_transfers.clear();
        let tick = self.tick;
        let base_unit = self.config.base_unit;
        for network in self.networks.values_mut() {
            let mut ctx = TickContext {
                parts: &mut self.parts,
                registry: &self.registry,
                base_unit,
                hook: &mut *self.hook,
                tick,
            };
            let report = network.tick(&mut ctx);
            self.last_transfers.extend(report.transfers);
            events.extend(
                report
                    .changes
                    .iter()
                    .filter_map(|(node, change)| change_event(*node, change, tick)),
            );
        }
        events
    }

    // -----------------------------------------------------------------------
    // Operations
    // -----------------------------------------------------------------------

    pub fn try_add(&mut self, node: NodeId, kind: FlowKindId, amount: FlowAmount) -> ValueResult {
        let Some(container) = self.parts.get_mut(node).and_then(NetworkPart::container_mut) else {
            return ValueResult::failed(amount);
        };
        let result = container.try_add(kind, amount);
        self.flush_changes(node);
        result
    }

    pub fn try_remove(
        &mut self,
        node: NodeId,
        kind: FlowKindId,
        amount: FlowAmount,
    ) -> ValueResult {
        let Some(container) = self.parts.get_mut(node).and_then(NetworkPart::container_mut) else {
            return ValueResult::failed(amount);
        };
        let result = container.try_remove(kind, amount);
        self.flush_changes(node);
        result
    }

    pub fn set_filter(&mut self, node: NodeId, kind: FlowKindId, settings: FilterSettings) -> bool {
        let changed = self
            .parts
            .get_mut(node)
            .and_then(NetworkPart::container_mut)
            .is_some_and(|c| c.set_filter(kind, settings));
        if changed {
            self.invalidate(node);
        }
        changed
    }

    pub fn set_requester_mode(&mut self, node: NodeId, mode: RequestMode) -> bool {
        match self.parts.get_mut(node).and_then(NetworkPart::requester_mut) {
            Some(settings) => {
                settings.mode = mode;
                true
            }
            None => false,
        }
    }

    /// Replace a requester's settings. Fails for parts that were not built
    /// as requesters.
    pub fn set_request(&mut self, node: NodeId, request: RequesterSettings) -> bool {
        match self.parts.get_mut(node).and_then(NetworkPart::requester_mut) {
            Some(settings) => {
                *settings = request;
                true
            }
            None => false,
        }
    }

    pub fn set_controller_active(&mut self, node: NodeId, active: bool) -> bool {
        match self.parts.get_mut(node) {
            Some(part) => {
                part.set_controller_active(active);
                true
            }
            None => false,
        }
    }

    fn flush_changes(&mut self, node: NodeId) {
        let Some(part) = self.parts.get_mut(node) else {
            return;
        };
        let network = part.network();
        let Some(container) = part.container_mut() else {
            return;
        };
        for change in container.take_changes() {
            if change.fill_state_changed()
                && let Some(net) = network.and_then(|id| self.networks.get_mut(id))
            {
                net.notify_node_changed(node);
            }
            if let Some(event) = change_event(node, &change, self.tick) {
                self.events.push(event);
            }
        }
    }

    fn invalidate(&mut self, node: NodeId) {
        let network = self.parts.get(node).and_then(NetworkPart::network);
        if let Some(net) = network.and_then(|id| self.networks.get_mut(id)) {
            net.notify_node_changed(node);
        }
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    pub fn registry(&self) -> &KindRegistry {
        &self.registry
    }

    pub fn config(&self) -> &SystemConfig {
        &self.config
    }

    pub fn tick_count(&self) -> Ticks {
        self.tick
    }

    pub fn part(&self, node: NodeId) -> Option<&NetworkPart> {
        self.parts.get(node)
    }

    pub fn parts(&self) -> impl Iterator<Item = (NodeId, &NetworkPart)> {
        self.parts.iter()
    }

    pub fn part_count(&self) -> usize {
        self.parts.len()
    }

    pub fn container(&self, node: NodeId) -> Option<&FlowContainer> {
        self.parts.get(node).and_then(NetworkPart::container)
    }

    pub fn network_of(&self, node: NodeId) -> Option<NetworkId> {
        self.parts.get(node).and_then(NetworkPart::network)
    }

    pub fn network(&self, id: NetworkId) -> Option<&Network> {
        self.networks.get(id)
    }

    pub fn networks(&self) -> impl Iterator<Item = (NetworkId, &Network)> {
        self.networks.iter()
    }

    pub fn network_count(&self) -> usize {
        self.networks.len()
    }

    /// Stored amount per kind over a network's members.
    pub fn totals_by_kind(&self, id: NetworkId) -> Option<BTreeMap<FlowKindId, FlowAmount>> {
        Some(self.networks.get(id)?.totals_by_kind(&self.parts))
    }

    pub fn totals_by_role(&self, id: NetworkId) -> Option<BTreeMap<Role, FlowAmount>> {
        Some(self.networks.get(id)?.totals_by_role(&self.parts))
    }

    /// True while lifecycle changes are waiting for a rebuild.
    pub fn has_pending_rebuilds(&self) -> bool {
        !self.pending.is_empty() || !self.orphans.is_empty()
    }

    /// Transfers made during the last tick.
    pub fn last_transfers(&self) -> &[TransferRecord] {
        &self.last_transfers
    }

    /// The cached result for `request`, if its network has one.
    pub fn path_result(&self, request: &PathRequest) -> Option<&PathResult> {
        let id = self.network_of(request.requester)?;
        self.networks.get(id)?.cached_path(request)
    }

    /// Run `request` now, through the cache of the requester's network.
    pub fn find_paths(&mut self, request: &PathRequest) -> Option<&PathResult> {
        let id = self.network_of(request.requester)?;
        let network = self.networks.get_mut(id)?;
        Some(network.find_paths(&self.parts, request))
    }
}
