//! Network parts: the role-tagged endpoints, junctions and segments that
//! make up a flow network.

use crate::container::{ContainerConfig, ContainerState, FlowContainer};
use crate::fixed::{Fixed64, FlowAmount, clamp_unit};
use crate::id::{FlowKindId, NetworkFamilyId, NetworkId, NodeId};
use crate::kind::KindRegistry;
use crate::role::{Role, RoleSet};
use crate::spatial::GridPosition;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ---------------------------------------------------------------------------
// Requester settings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RequestMode {
    /// Fill every requested kind to an equal share of `target_fill`.
    #[default]
    Automatic,
    /// Fill each requested kind to its explicit amount.
    Manual,
}

/// How much a requester part pulls from storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequesterSettings {
    pub mode: RequestMode,
    /// Fraction of capacity to fill in automatic mode, in `[0, 1]`.
    pub target_fill: Fixed64,
    /// Requested kinds. Amounts are only read in manual mode.
    pub requested: BTreeMap<FlowKindId, FlowAmount>,
}

impl RequesterSettings {
    pub fn automatic(target_fill: Fixed64, kinds: &[FlowKindId]) -> Self {
        Self {
            mode: RequestMode::Automatic,
            target_fill: clamp_unit(target_fill),
            requested: kinds.iter().map(|k| (*k, Fixed64::ZERO)).collect(),
        }
    }

    pub fn manual(amounts: BTreeMap<FlowKindId, FlowAmount>) -> Self {
        Self {
            mode: RequestMode::Manual,
            target_fill: Fixed64::ZERO,
            requested: amounts,
        }
    }

    /// Target stored amount of `kind` in `container`.
    pub fn target_for(&self, kind: FlowKindId, container: &FlowContainer) -> FlowAmount {
        let Some(amount) = self.requested.get(&kind) else {
            return Fixed64::ZERO;
        };
        match self.mode {
            RequestMode::Manual => *amount,
            RequestMode::Automatic => {
                let count = Fixed64::from_num(self.requested.len());
                clamp_unit(self.target_fill) * container.capacity() / count
            }
        }
    }

    /// How much more of `kind` the requester still wants.
    pub fn outstanding(&self, kind: FlowKindId, container: &FlowContainer) -> FlowAmount {
        (self.target_for(kind, container) - container.stored_of(kind)).max(Fixed64::ZERO)
    }

    /// What to pull of `kind` this tick: the outstanding amount, reduced to
    /// what reachable storage holds.
    pub fn desired(
        &self,
        kind: FlowKindId,
        container: &FlowContainer,
        reachable: FlowAmount,
    ) -> FlowAmount {
        self.outstanding(kind, container)
            .min(reachable.max(Fixed64::ZERO))
    }
}

// ---------------------------------------------------------------------------
// Part template
// ---------------------------------------------------------------------------

/// Construction template for a [`NetworkPart`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartSpec {
    pub name: String,
    pub roles: RoleSet,
    #[serde(default)]
    pub family: NetworkFamilyId,
    #[serde(default)]
    pub container: Option<ContainerConfig>,
    /// Kinds each role handles. A role missing here handles every kind the
    /// container accepts.
    #[serde(default)]
    pub role_kinds: BTreeMap<Role, Vec<FlowKindId>>,
    #[serde(default)]
    pub requester: Option<RequesterSettings>,
    #[serde(default)]
    pub store_evenly: bool,
}

impl PartSpec {
    pub fn new(name: &str, roles: RoleSet) -> Self {
        Self {
            name: name.to_string(),
            roles,
            family: NetworkFamilyId::default(),
            container: None,
            role_kinds: BTreeMap::new(),
            requester: None,
            store_evenly: false,
        }
    }

    pub fn with_family(mut self, family: NetworkFamilyId) -> Self {
        self.family = family;
        self
    }

    pub fn with_container(mut self, config: ContainerConfig) -> Self {
        self.container = Some(config);
        self
    }

    pub fn with_role_kinds(mut self, role: Role, kinds: Vec<FlowKindId>) -> Self {
        self.role_kinds.insert(role, kinds);
        self
    }

    pub fn with_requester(mut self, settings: RequesterSettings) -> Self {
        self.requester = Some(settings);
        self
    }

    pub fn with_store_evenly(mut self, evenly: bool) -> Self {
        self.store_evenly = evenly;
        self
    }
}

// ---------------------------------------------------------------------------
// Part
// ---------------------------------------------------------------------------

/// A direct spatial contact with a neighboring part of the same family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartLink {
    pub neighbor: NodeId,
    /// Cell of this part where the contact happens.
    pub from_cell: GridPosition,
    /// Cell of the neighbor across the contact.
    pub to_cell: GridPosition,
}

/// Persisted form of a part.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartState {
    pub spec: PartSpec,
    pub container: Option<ContainerState>,
    pub requester: Option<RequesterSettings>,
    pub controller_active: bool,
}

/// One role-tagged member of a flow network.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkPart {
    spec: PartSpec,
    container: Option<FlowContainer>,
    /// Accepted kinds per role, fixed at construction.
    role_kinds: BTreeMap<Role, Vec<FlowKindId>>,
    requester: Option<RequesterSettings>,
    controller_active: bool,
    #[serde(skip)]
    links: Vec<PartLink>,
    #[serde(skip)]
    network: Option<NetworkId>,
}

impl NetworkPart {
    pub fn from_spec(spec: &PartSpec, registry: &KindRegistry) -> Self {
        let container = spec
            .container
            .as_ref()
            .map(|config| FlowContainer::new(config, registry));

        let accepted: Vec<FlowKindId> = container
            .as_ref()
            .map(|c| c.accepted_kinds().collect())
            .unwrap_or_default();
        let mut role_kinds = BTreeMap::new();
        for role in spec.roles.iter() {
            if matches!(role, Role::Transmitter | Role::Controller) {
                continue;
            }
            let kinds = match spec.role_kinds.get(&role) {
                Some(listed) => listed
                    .iter()
                    .copied()
                    .filter(|k| accepted.contains(k))
                    .collect(),
                None => accepted.clone(),
            };
            role_kinds.insert(role, kinds);
        }

        if spec.roles.contains(Role::Requester) && spec.requester.is_none() {
            tracing::warn!(part = %spec.name, "requester part has no request settings; it will request nothing");
        }

        Self {
            spec: spec.clone(),
            container,
            role_kinds,
            requester: spec.requester.clone(),
            controller_active: true,
            links: Vec::new(),
            network: None,
        }
    }

    /// Rebuild a part from persisted state.
    pub fn from_state(state: &PartState, registry: &KindRegistry) -> Self {
        let mut part = Self::from_spec(&state.spec, registry);
        if let (Some(container), Some(saved)) = (part.container.as_mut(), state.container.as_ref())
        {
            container.restore_state(saved);
        }
        part.requester = state.requester.clone();
        part.controller_active = state.controller_active;
        part
    }

    pub fn save_state(&self) -> PartState {
        PartState {
            spec: self.spec.clone(),
            container: self.container.as_ref().map(FlowContainer::save_state),
            requester: self.requester.clone(),
            controller_active: self.controller_active,
        }
    }

    pub fn name(&self) -> &str {
        &self.spec.name
    }

    pub fn spec(&self) -> &PartSpec {
        &self.spec
    }

    pub fn roles(&self) -> RoleSet {
        self.spec.roles
    }

    pub fn has_role(&self, role: Role) -> bool {
        self.spec.roles.contains(role)
    }

    pub fn family(&self) -> NetworkFamilyId {
        self.spec.family
    }

    pub fn container(&self) -> Option<&FlowContainer> {
        self.container.as_ref()
    }

    pub fn container_mut(&mut self) -> Option<&mut FlowContainer> {
        self.container.as_mut()
    }

    /// Kinds `role` handles on this part. Empty for roles the part lacks.
    pub fn kinds_for(&self, role: Role) -> &[FlowKindId] {
        self.role_kinds.get(&role).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn handles(&self, role: Role, kind: FlowKindId) -> bool {
        self.kinds_for(role).contains(&kind)
    }

    pub fn requester(&self) -> Option<&RequesterSettings> {
        self.requester.as_ref()
    }

    pub fn requester_mut(&mut self) -> Option<&mut RequesterSettings> {
        self.requester.as_mut()
    }

    pub fn store_evenly(&self) -> bool {
        self.spec.store_evenly
    }

    pub fn controller_active(&self) -> bool {
        self.controller_active
    }

    pub fn set_controller_active(&mut self, active: bool) {
        self.controller_active = active;
    }

    pub fn links(&self) -> &[PartLink] {
        &self.links
    }

    pub fn direct_neighbors(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.links.iter().map(|l| l.neighbor)
    }

    pub fn is_linked_to(&self, other: NodeId) -> bool {
        self.links.iter().any(|l| l.neighbor == other)
    }

    pub fn link_to(&self, other: NodeId) -> Option<&PartLink> {
        self.links.iter().find(|l| l.neighbor == other)
    }

    pub fn network(&self) -> Option<NetworkId> {
        self.network
    }

    pub(crate) fn set_links(&mut self, links: Vec<PartLink>) {
        self.links = links;
    }

    pub(crate) fn unlink(&mut self, other: NodeId) {
        self.links.retain(|l| l.neighbor != other);
    }

    pub(crate) fn set_network(&mut self, network: Option<NetworkId>) {
        self.network = network;
    }
}
