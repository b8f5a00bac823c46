//! A live flow network and its per-tick transfer protocol.
//!
//! Each tick runs four phases in fixed order: producers push into storage,
//! storage rebalances and feeds consumers, consumers run their hook, and
//! requesters pull from storage. Partners are found through the graph's
//! path cache, so every transfer follows a real connection.

use crate::builder::GraphBuild;
use crate::container::ContainerChange;
use crate::fixed::{FLOW_EPSILON, Fixed64, FlowAmount, Ticks};
use crate::graph::TopologyGraph;
use crate::id::{FlowKindId, NetworkFamilyId, NetworkId, NodeId};
use crate::kind::KindRegistry;
use crate::part::{NetworkPart, RequesterSettings};
use crate::path::{PathRequest, PathResult, PathTarget};
use crate::role::Role;
use crate::transfer::{equalize, transfer, transfer_filtered};
use serde::{Deserialize, Serialize};
use slotmap::SlotMap;
use std::collections::{BTreeMap, BTreeSet};

// ---------------------------------------------------------------------------
// Consumer behavior
// ---------------------------------------------------------------------------

/// Per-tick behavior of consumer parts. The default does nothing.
pub trait ConsumerHook {
    fn consume(&mut self, node: NodeId, part: &mut NetworkPart, tick: Ticks) {
        let _ = (node, part, tick);
    }
}

/// Consumers that only receive.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassiveConsumers;

impl ConsumerHook for PassiveConsumers {}

// ---------------------------------------------------------------------------
// Tick I/O
// ---------------------------------------------------------------------------

/// One committed transfer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TransferRecord {
    pub from: NodeId,
    pub to: NodeId,
    pub kind: FlowKindId,
    pub amount: FlowAmount,
    /// Phase that issued the transfer.
    pub phase: Role,
}

#[derive(Debug, Clone, Default)]
pub struct NetworkTickReport {
    pub transfers: Vec<TransferRecord>,
    /// Container changes drained from members, in phase then member order.
    pub changes: Vec<(NodeId, ContainerChange)>,
    /// True when the network was not working and did nothing.
    pub skipped: bool,
}

/// Everything a network borrows for one tick.
pub struct TickContext<'a> {
    pub parts: &'a mut SlotMap<NodeId, NetworkPart>,
    pub registry: &'a KindRegistry,
    pub base_unit: FlowAmount,
    pub hook: &'a mut dyn ConsumerHook,
    pub tick: Ticks,
}

impl TickContext<'_> {
    fn unit_for(&self, kind: FlowKindId) -> FlowAmount {
        self.registry.unit_for(kind, self.base_unit)
    }
}

// ---------------------------------------------------------------------------
// Network
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Network {
    id: NetworkId,
    family: NetworkFamilyId,
    root: NodeId,
    graph: TopologyGraph,
    /// Every member part, transmitter segments included.
    members: Vec<NodeId>,
    /// Graph nodes per role, in graph insertion order.
    by_role: BTreeMap<Role, Vec<NodeId>>,
    requires_controller: bool,
    max_depth: Option<u32>,
}

impl Network {
    pub fn new(
        id: NetworkId,
        family: NetworkFamilyId,
        build: GraphBuild,
        parts: &SlotMap<NodeId, NetworkPart>,
        requires_controller: bool,
        max_depth: Option<u32>,
    ) -> Self {
        let mut by_role: BTreeMap<Role, Vec<NodeId>> = BTreeMap::new();
        for &node in build.graph.nodes() {
            let Some(part) = parts.get(node) else {
                continue;
            };
            for role in part.roles().iter() {
                if role != Role::Transmitter {
                    by_role.entry(role).or_default().push(node);
                }
            }
        }
        Self {
            id,
            family,
            root: build.root,
            graph: build.graph,
            members: build.members,
            by_role,
            requires_controller,
            max_depth,
        }
    }

    pub fn id(&self) -> NetworkId {
        self.id
    }

    pub fn family(&self) -> NetworkFamilyId {
        self.family
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn graph(&self) -> &TopologyGraph {
        &self.graph
    }

    pub fn members(&self) -> &[NodeId] {
        &self.members
    }

    pub fn contains(&self, node: NodeId) -> bool {
        self.members.contains(&node)
    }

    /// Graph nodes carrying `role`.
    pub fn nodes_with(&self, role: Role) -> &[NodeId] {
        self.by_role.get(&role).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn requires_controller(&self) -> bool {
        self.requires_controller
    }

    pub(crate) fn set_requires_controller(&mut self, required: bool) {
        self.requires_controller = required;
    }

    /// False when a controller is required and none is active.
    pub fn is_working(&self, parts: &SlotMap<NodeId, NetworkPart>) -> bool {
        !self.requires_controller
            || self
                .nodes_with(Role::Controller)
                .iter()
                .any(|c| parts.get(*c).is_some_and(NetworkPart::controller_active))
    }

    /// Stored amount per kind over every member container.
    pub fn totals_by_kind(
        &self,
        parts: &SlotMap<NodeId, NetworkPart>,
    ) -> BTreeMap<FlowKindId, FlowAmount> {
        let mut totals = BTreeMap::new();
        for &member in &self.members {
            let Some(container) = parts.get(member).and_then(NetworkPart::container) else {
                continue;
            };
            for (&kind, &amount) in container.stored() {
                *totals.entry(kind).or_insert(Fixed64::ZERO) += amount;
            }
        }
        totals
    }

    /// Total stored per role. A part with several roles counts toward each.
    pub fn totals_by_role(&self, parts: &SlotMap<NodeId, NetworkPart>) -> BTreeMap<Role, FlowAmount> {
        self.by_role
            .iter()
            .map(|(role, nodes)| {
                let total = nodes
                    .iter()
                    .filter_map(|n| parts.get(*n).and_then(NetworkPart::container))
                    .fold(Fixed64::ZERO, |acc, c| acc + c.total_stored());
                (*role, total)
            })
            .collect()
    }

    /// Cached result of a request, if one has been made.
    pub fn cached_path(&self, request: &PathRequest) -> Option<&PathResult> {
        self.graph.cache().get(request)
    }

    /// Answer a request against this network's graph. Role targets match
    /// parts whose role handles the requested kind.
    pub fn find_paths(
        &mut self,
        parts: &SlotMap<NodeId, NetworkPart>,
        request: &PathRequest,
    ) -> &PathResult {
        let target = request.target;
        self.graph
            .process_request(request, |node| matches_target(parts, node, &target))
    }

    /// How much of `kind` `requester` wants right now: its outstanding
    /// amount capped by what the storage it can reach holds. Zero for parts
    /// that are not requesters.
    pub fn requester_demand(
        &mut self,
        parts: &SlotMap<NodeId, NetworkPart>,
        requester: NodeId,
        kind: FlowKindId,
    ) -> FlowAmount {
        let Some(settings) = parts.get(requester).and_then(NetworkPart::requester) else {
            return Fixed64::ZERO;
        };
        let sources = self.partners(parts, requester, Role::Storage, kind);
        desired_amount(parts, settings, requester, kind, &sources)
    }

    pub fn notify_node_changed(&mut self, node: NodeId) -> usize {
        self.graph.notify_node_changed(node)
    }

    // -----------------------------------------------------------------------
    // Tick
    // -----------------------------------------------------------------------

    pub fn tick(&mut self, ctx: &mut TickContext<'_>) -> NetworkTickReport {
        let mut report = NetworkTickReport::default();
        if !self.is_working(ctx.parts) {
            tracing::trace!(network = ?self.id, "network not working; skipping tick");
            report.skipped = true;
            return report;
        }

        let mut full = BTreeSet::new();
        self.producer_phase(ctx, &mut full, &mut report);
        self.collect_changes(ctx.parts, &mut report);
        self.storage_phase(ctx, &mut full, &mut report);
        self.collect_changes(ctx.parts, &mut report);
        self.consumer_phase(ctx);
        self.collect_changes(ctx.parts, &mut report);
        self.requester_phase(ctx, &mut full, &mut report);
        self.collect_changes(ctx.parts, &mut report);
        report
    }

    fn partners(
        &mut self,
        parts: &SlotMap<NodeId, NetworkPart>,
        node: NodeId,
        role: Role,
        kind: FlowKindId,
    ) -> Vec<NodeId> {
        let request = PathRequest::to_role(node, role, Some(kind)).with_max_depth(self.max_depth);
        self.find_paths(parts, &request).targets().collect()
    }

    fn producer_phase(
        &mut self,
        ctx: &mut TickContext<'_>,
        full: &mut BTreeSet<NodeId>,
        report: &mut NetworkTickReport,
    ) {
        for producer in self.nodes_with(Role::Producer).to_vec() {
            for kind in role_kinds(ctx.parts, producer, Role::Producer) {
                let unit = ctx.unit_for(kind);
                for target in self.partners(ctx.parts, producer, Role::Storage, kind) {
                    if stored_of(ctx.parts, producer, kind) <= FLOW_EPSILON {
                        break;
                    }
                    if full.contains(&target) {
                        continue;
                    }
                    push(ctx.parts, producer, target, kind, unit, Role::Producer, full, report);
                }
            }
        }
    }

    fn storage_phase(
        &mut self,
        ctx: &mut TickContext<'_>,
        full: &mut BTreeSet<NodeId>,
        report: &mut NetworkTickReport,
    ) {
        for storage in self.nodes_with(Role::Storage).to_vec() {
            // Kinds no longer allowed to stay here go to storage that keeps them.
            let purge: Vec<FlowKindId> = ctx
                .parts
                .get(storage)
                .and_then(NetworkPart::container)
                .map(|c| c.stored_kinds().filter(|k| !c.can_store(*k)).collect())
                .unwrap_or_default();
            if !purge.is_empty() {
                self.purge_phase(ctx, storage, &purge, full, report);
            }

            let kinds = role_kinds(ctx.parts, storage, Role::Storage);

            if ctx.parts.get(storage).is_some_and(NetworkPart::store_evenly) {
                for &kind in &kinds {
                    let unit = ctx.unit_for(kind);
                    for target in self.partners(ctx.parts, storage, Role::Storage, kind) {
                        if stored_of(ctx.parts, storage, kind) <= FLOW_EPSILON {
                            break;
                        }
                        if full.contains(&target) || !can_keep(ctx.parts, target, kind) {
                            continue;
                        }
                        let result = equalize(ctx.parts, storage, target, kind, unit);
                        if result.is_success() {
                            record(ctx.parts, storage, target, kind, result.actual, Role::Storage, full, report);
                        }
                    }
                }
            }

            for &kind in &kinds {
                let unit = ctx.unit_for(kind);
                for target in self.partners(ctx.parts, storage, Role::Consumer, kind) {
                    if stored_of(ctx.parts, storage, kind) <= FLOW_EPSILON {
                        break;
                    }
                    if full.contains(&target) {
                        continue;
                    }
                    push(ctx.parts, storage, target, kind, unit, Role::Storage, full, report);
                }
            }
        }
    }

    /// Forward kinds `storage` may no longer keep to storage partners that
    /// keep them, nearest partner first.
    fn purge_phase(
        &mut self,
        ctx: &mut TickContext<'_>,
        storage: NodeId,
        purge: &[FlowKindId],
        full: &mut BTreeSet<NodeId>,
        report: &mut NetworkTickReport,
    ) {
        // Partner -> purged kinds it was found for, in first-found order.
        let mut targets: Vec<(NodeId, BTreeSet<FlowKindId>)> = Vec::new();
        for &kind in purge {
            for target in self.partners(ctx.parts, storage, Role::Storage, kind) {
                match targets.iter_mut().find(|(t, _)| *t == target) {
                    Some((_, kinds)) => {
                        kinds.insert(kind);
                    }
                    None => targets.push((target, BTreeSet::from([kind]))),
                }
            }
        }

        let registry = ctx.registry;
        let base_unit = ctx.base_unit;
        for (target, kinds) in targets {
            let leftover = purge
                .iter()
                .any(|k| stored_of(ctx.parts, storage, *k) > FLOW_EPSILON);
            if !leftover {
                break;
            }
            if full.contains(&target) {
                continue;
            }
            let moved = transfer_filtered(
                ctx.parts,
                storage,
                target,
                |k| registry.unit_for(k, base_unit),
                |from, to, k| kinds.contains(&k) && !from.can_store(k) && to.can_store(k),
            );
            for (kind, result) in moved {
                record(ctx.parts, storage, target, kind, result.actual, Role::Storage, full, report);
            }
        }
    }

    fn consumer_phase(&mut self, ctx: &mut TickContext<'_>) {
        for &consumer in self.nodes_with(Role::Consumer) {
            if let Some(part) = ctx.parts.get_mut(consumer) {
                ctx.hook.consume(consumer, part, ctx.tick);
            }
        }
    }

    fn requester_phase(
        &mut self,
        ctx: &mut TickContext<'_>,
        full: &mut BTreeSet<NodeId>,
        report: &mut NetworkTickReport,
    ) {
        for requester in self.nodes_with(Role::Requester).to_vec() {
            let Some(settings) = ctx
                .parts
                .get(requester)
                .and_then(|p| p.requester().cloned())
            else {
                continue;
            };
            let handled = role_kinds(ctx.parts, requester, Role::Requester);
            for &kind in settings.requested.keys() {
                if !handled.contains(&kind) {
                    continue;
                }
                let unit = ctx.unit_for(kind);
                let sources = self.partners(ctx.parts, requester, Role::Storage, kind);
                let mut remaining = desired_amount(ctx.parts, &settings, requester, kind, &sources);
                for source in sources {
                    if remaining <= FLOW_EPSILON {
                        break;
                    }
                    let available = stored_of(ctx.parts, source, kind);
                    if available <= FLOW_EPSILON {
                        continue;
                    }
                    let amount = unit.min(remaining).min(available);
                    remaining -= push(ctx.parts, source, requester, kind, amount, Role::Requester, full, report);
                }
            }
        }
    }

    /// Drain member outboxes. Fill-state transitions invalidate cached
    /// paths through the member.
    fn collect_changes(
        &mut self,
        parts: &mut SlotMap<NodeId, NetworkPart>,
        report: &mut NetworkTickReport,
    ) {
        for &member in &self.members {
            let Some(container) = parts.get_mut(member).and_then(NetworkPart::container_mut) else {
                continue;
            };
            for change in container.take_changes() {
                if change.fill_state_changed() {
                    self.graph.notify_node_changed(member);
                }
                report.changes.push((member, change));
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Whether `node` satisfies a path target.
pub fn matches_target(
    parts: &SlotMap<NodeId, NetworkPart>,
    node: NodeId,
    target: &PathTarget,
) -> bool {
    match *target {
        PathTarget::Node(id) => id == node,
        PathTarget::Role { role, kind } => parts.get(node).is_some_and(|p| match kind {
            Some(kind) => p.handles(role, kind),
            None => p.has_role(role),
        }),
    }
}

fn role_kinds(parts: &SlotMap<NodeId, NetworkPart>, node: NodeId, role: Role) -> Vec<FlowKindId> {
    parts
        .get(node)
        .map(|p| p.kinds_for(role).to_vec())
        .unwrap_or_default()
}

fn stored_of(parts: &SlotMap<NodeId, NetworkPart>, node: NodeId, kind: FlowKindId) -> FlowAmount {
    parts
        .get(node)
        .and_then(NetworkPart::container)
        .map(|c| c.stored_of(kind))
        .unwrap_or(Fixed64::ZERO)
}

fn desired_amount(
    parts: &SlotMap<NodeId, NetworkPart>,
    settings: &RequesterSettings,
    requester: NodeId,
    kind: FlowKindId,
    sources: &[NodeId],
) -> FlowAmount {
    let reachable = sources
        .iter()
        .fold(Fixed64::ZERO, |acc, s| acc + stored_of(parts, *s, kind));
    parts
        .get(requester)
        .and_then(NetworkPart::container)
        .map(|c| settings.desired(kind, c, reachable))
        .unwrap_or(Fixed64::ZERO)
}

fn can_keep(parts: &SlotMap<NodeId, NetworkPart>, node: NodeId, kind: FlowKindId) -> bool {
    parts
        .get(node)
        .and_then(NetworkPart::container)
        .is_some_and(|c| c.can_store(kind))
}

#[allow(clippy::too_many_arguments)]
fn push(
    parts: &mut SlotMap<NodeId, NetworkPart>,
    from: NodeId,
    to: NodeId,
    kind: FlowKindId,
    amount: FlowAmount,
    phase: Role,
    full: &mut BTreeSet<NodeId>,
    report: &mut NetworkTickReport,
) -> FlowAmount {
    let result = transfer(parts, from, to, kind, amount);
    if !result.is_success() {
        return Fixed64::ZERO;
    }
    record(parts, from, to, kind, result.actual, phase, full, report);
    result.actual
}

#[allow(clippy::too_many_arguments)]
fn record(
    parts: &SlotMap<NodeId, NetworkPart>,
    from: NodeId,
    to: NodeId,
    kind: FlowKindId,
    amount: FlowAmount,
    phase: Role,
    full: &mut BTreeSet<NodeId>,
    report: &mut NetworkTickReport,
) {
    tracing::trace!(from = ?from, to = ?to, kind = ?kind, amount = %amount, phase = ?phase, "transfer");
    report.transfers.push(TransferRecord {
        from,
        to,
        kind,
        amount,
        phase,
    });
    if parts
        .get(to)
        .and_then(NetworkPart::container)
        .is_some_and(|c| c.is_full())
    {
        full.insert(to);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::GraphBuilder;
    use crate::container::FilterSettings;
    use crate::fixed::approx_eq;
    use crate::part::RequesterSettings;
    use crate::test_utils::*;
    use slotmap::SlotMap;

    struct Fixture {
        parts: SlotMap<NodeId, NetworkPart>,
        registry: KindRegistry,
        world: CellMap,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                parts: SlotMap::with_key(),
                registry: standard_registry(),
                world: CellMap::new(32, 32),
            }
        }

        fn place(&mut self, spec: &crate::part::PartSpec, x: i32, y: i32) -> NodeId {
            self.world.place(&mut self.parts, &self.registry, spec, x, y)
        }

        fn network(&mut self, seed: NodeId, requires_controller: bool) -> Network {
            link_all(&mut self.parts, &self.world);
            let build = GraphBuilder::build(&self.parts, seed).unwrap();
            let mut ids = SlotMap::<NetworkId, ()>::with_key();
            Network::new(
                ids.insert(()),
                NetworkFamilyId::default(),
                build,
                &self.parts,
                requires_controller,
                None,
            )
        }

        fn tick(&mut self, network: &mut Network, tick: Ticks) -> NetworkTickReport {
            let mut hook = PassiveConsumers;
            let mut ctx = TickContext {
                parts: &mut self.parts,
                registry: &self.registry,
                base_unit: fixed(1.0),
                hook: &mut hook,
                tick,
            };
            network.tick(&mut ctx)
        }

        fn stored(&self, node: NodeId, kind: FlowKindId) -> Fixed64 {
            stored_of(&self.parts, node, kind)
        }

        fn add(&mut self, node: NodeId, kind: FlowKindId, amount: f64) {
            self.parts[node]
                .container_mut()
                .unwrap()
                .try_add(kind, fixed(amount));
        }
    }

    #[test]
    fn producer_pushes_one_unit_into_storage() {
        let mut f = Fixture::new();
        let producer = f.place(&producer_spec("well", 10.0), 0, 0);
        f.place(&pipe_spec(), 1, 0);
        let tank = f.place(&storage_spec("tank", 100.0), 2, 0);
        f.add(producer, gas_a(), 5.0);
        let mut network = f.network(producer, false);

        let report = f.tick(&mut network, 1);
        assert_eq!(f.stored(producer, gas_a()), fixed(4.0));
        assert_eq!(f.stored(tank, gas_a()), fixed(1.0));
        assert_eq!(report.transfers.len(), 1);
        assert_eq!(report.transfers[0].phase, Role::Producer);
        assert!(!report.changes.is_empty());
    }

    #[test]
    fn viscous_kind_moves_smaller_unit() {
        let mut f = Fixture::new();
        let producer = f.place(&producer_spec("well", 10.0), 0, 0);
        let tank = f.place(&storage_spec("tank", 100.0), 1, 0);
        // gas_b has viscosity 2 in the standard registry.
        f.add(producer, gas_b(), 5.0);
        let mut network = f.network(producer, false);
        f.tick(&mut network, 1);
        assert_eq!(f.stored(tank, gas_b()), fixed(0.5));
    }

    #[test]
    fn storage_feeds_consumer_and_hook_runs() {
        struct Burner(Vec<NodeId>);
        impl ConsumerHook for Burner {
            fn consume(&mut self, node: NodeId, part: &mut NetworkPart, _tick: Ticks) {
                if let Some(c) = part.container_mut() {
                    c.try_consume(fixed(0.5));
                }
                self.0.push(node);
            }
        }

        let mut f = Fixture::new();
        let tank = f.place(&storage_spec("tank", 100.0), 0, 0);
        let burner = f.place(&consumer_spec("burner", 10.0), 1, 0);
        f.add(tank, gas_a(), 10.0);
        let mut network = f.network(tank, false);

        let mut hook = Burner(Vec::new());
        let mut ctx = TickContext {
            parts: &mut f.parts,
            registry: &f.registry,
            base_unit: fixed(1.0),
            hook: &mut hook,
            tick: 1,
        };
        network.tick(&mut ctx);
        assert_eq!(hook.0, vec![burner]);
        assert_eq!(f.stored(tank, gas_a()), fixed(9.0));
        assert_eq!(f.stored(burner, gas_a()), fixed(0.5));
    }

    #[test]
    fn requester_fills_to_target_capped_by_stock() {
        let mut f = Fixture::new();
        let tank = f.place(&storage_spec("tank", 100.0), 0, 0);
        f.place(&pipe_spec(), 1, 0);
        f.place(&pipe_spec(), 2, 0);
        let spec = requester_spec("inlet", 100.0)
            .with_requester(RequesterSettings::automatic(fixed(0.5), &[gas_a()]));
        let inlet = f.place(&spec, 3, 0);
        f.add(tank, gas_a(), 80.0);
        let mut network = f.network(inlet, false);

        for tick in 0..60 {
            f.tick(&mut network, tick);
        }
        assert_eq!(f.stored(inlet, gas_a()), fixed(50.0));
        assert_eq!(f.stored(tank, gas_a()), fixed(30.0));
    }

    #[test]
    fn requester_stops_when_storage_runs_dry() {
        let mut f = Fixture::new();
        let tank = f.place(&storage_spec("tank", 100.0), 0, 0);
        let spec = requester_spec("inlet", 100.0)
            .with_requester(RequesterSettings::automatic(fixed(0.5), &[gas_a()]));
        let inlet = f.place(&spec, 1, 0);
        f.add(tank, gas_a(), 12.5);
        let mut network = f.network(tank, false);
        for tick in 0..30 {
            f.tick(&mut network, tick);
        }
        assert_eq!(f.stored(inlet, gas_a()), fixed(12.5));
        assert_eq!(f.stored(tank, gas_a()), Fixed64::ZERO);
    }

    #[test]
    fn requester_demand_is_capped_by_reachable_storage() {
        let mut f = Fixture::new();
        let east = f.place(&storage_spec("east", 100.0), 0, 0);
        let spec = requester_spec("inlet", 100.0)
            .with_requester(RequesterSettings::automatic(fixed(0.5), &[gas_a()]));
        let inlet = f.place(&spec, 1, 0);
        let west = f.place(&storage_spec("west", 100.0), 2, 0);
        f.add(east, gas_a(), 1.0);
        f.add(west, gas_a(), 2.0);
        let mut network = f.network(inlet, false);

        assert_eq!(network.requester_demand(&f.parts, inlet, gas_a()), fixed(3.0));
        assert_eq!(network.requester_demand(&f.parts, east, gas_a()), Fixed64::ZERO);

        f.add(east, gas_a(), 79.0);
        assert_eq!(network.requester_demand(&f.parts, inlet, gas_a()), fixed(50.0));
    }

    #[test]
    fn network_without_active_controller_skips() {
        let mut f = Fixture::new();
        let producer = f.place(&producer_spec("well", 10.0), 0, 0);
        let tank = f.place(&storage_spec("tank", 100.0), 1, 0);
        let controller = f.place(&controller_spec(), 2, 0);
        f.add(producer, gas_a(), 5.0);
        let mut network = f.network(producer, true);
        assert!(network.is_working(&f.parts));

        f.parts[controller].set_controller_active(false);
        assert!(!network.is_working(&f.parts));
        let report = f.tick(&mut network, 1);
        assert!(report.skipped);
        assert_eq!(f.stored(tank, gas_a()), Fixed64::ZERO);
    }

    #[test]
    fn full_receivers_are_skipped_for_the_tick() {
        let mut f = Fixture::new();
        let producer = f.place(&producer_spec("well", 10.0), 0, 0);
        let small = f.place(&storage_spec("small", 1.0), 1, 0);
        let big = f.place(&storage_spec("big", 100.0), 2, 0);
        f.add(producer, gas_a(), 5.0);
        let mut network = f.network(producer, false);

        f.tick(&mut network, 1);
        assert_eq!(f.stored(small, gas_a()), fixed(1.0));
        assert_eq!(f.stored(big, gas_a()), fixed(1.0));
        f.tick(&mut network, 2);
        assert_eq!(f.stored(small, gas_a()), fixed(1.0));
        assert_eq!(f.stored(producer, gas_a()), fixed(2.0));
    }

    #[test]
    fn unstorable_kind_is_purged_to_partner() {
        let mut f = Fixture::new();
        let a = f.place(&storage_spec("a", 100.0), 0, 0);
        let b = f.place(&storage_spec("b", 100.0), 1, 0);
        f.add(a, gas_b(), 3.0);
        f.parts[a].container_mut().unwrap().set_filter(
            gas_b(),
            FilterSettings {
                can_store: false,
                ..FilterSettings::ALLOW_ALL
            },
        );
        let mut network = f.network(a, false);
        for tick in 0..10 {
            f.tick(&mut network, tick);
        }
        assert_eq!(f.stored(a, gas_b()), Fixed64::ZERO);
        assert_eq!(f.stored(b, gas_b()), fixed(3.0));
    }

    #[test]
    fn purge_passes_over_partner_that_cannot_keep_kind() {
        let mut f = Fixture::new();
        let a = f.place(&storage_spec("a", 100.0), 0, 0);
        let b = f.place(&storage_spec("b", 100.0), 1, 0);
        let c = f.place(&storage_spec("c", 100.0), 2, 0);
        f.add(a, gas_b(), 3.0);
        let refuse = FilterSettings {
            can_store: false,
            ..FilterSettings::ALLOW_ALL
        };
        f.parts[a].container_mut().unwrap().set_filter(gas_b(), refuse);
        f.parts[b].container_mut().unwrap().set_filter(gas_b(), refuse);
        let mut network = f.network(a, false);
        for tick in 0..10 {
            f.tick(&mut network, tick);
        }
        assert_eq!(f.stored(a, gas_b()), Fixed64::ZERO);
        assert_eq!(f.stored(b, gas_b()), Fixed64::ZERO);
        assert_eq!(f.stored(c, gas_b()), fixed(3.0));
    }

    #[test]
    fn even_storage_balances_fill() {
        let mut f = Fixture::new();
        let a = f.place(&storage_spec("a", 100.0).with_store_evenly(true), 0, 0);
        let b = f.place(&storage_spec("b", 100.0), 1, 0);
        f.add(a, gas_a(), 10.0);
        let mut network = f.network(a, false);
        for tick in 0..20 {
            f.tick(&mut network, tick);
        }
        assert!(approx_eq(f.stored(a, gas_a()), fixed(5.0)));
        assert!(approx_eq(f.stored(b, gas_a()), fixed(5.0)));
        assert_eq!(
            f.stored(a, gas_a()) + f.stored(b, gas_a()),
            fixed(10.0)
        );
    }

    #[test]
    fn aggregates_by_kind_and_role() {
        let mut f = Fixture::new();
        let producer = f.place(&producer_spec("well", 10.0), 0, 0);
        let tank = f.place(&storage_spec("tank", 100.0), 1, 0);
        f.add(producer, gas_a(), 4.0);
        f.add(tank, gas_a(), 6.0);
        f.add(tank, gas_b(), 1.0);
        let network = f.network(tank, false);

        let by_kind = network.totals_by_kind(&f.parts);
        assert_eq!(by_kind[&gas_a()], fixed(10.0));
        assert_eq!(by_kind[&gas_b()], fixed(1.0));
        let by_role = network.totals_by_role(&f.parts);
        assert_eq!(by_role[&Role::Producer], fixed(4.0));
        assert_eq!(by_role[&Role::Storage], fixed(7.0));
        assert_eq!(network.nodes_with(Role::Storage), &[tank]);
    }
}
