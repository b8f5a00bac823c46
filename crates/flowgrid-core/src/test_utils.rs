//! Shared test helpers for unit tests, integration tests and benchmarks.
//!
//! Gated behind `#[cfg(any(test, feature = "test-utils"))]`.

use crate::builder::discover_links;
use crate::container::ContainerConfig;
use crate::fixed::Fixed64;
use crate::id::{FlowKindId, NetworkFamilyId, NodeId};
use crate::kind::{Color, DestroyEffect, FlowValueKind, KindRegistry, KindRegistryBuilder};
use crate::part::{NetworkPart, PartSpec};
use crate::role::RoleSet;
use crate::spatial::{GridPosition, SpatialQuery};
use slotmap::{SecondaryMap, SlotMap};
use std::collections::BTreeMap;

// ===========================================================================
// Fixed-point helper
// ===========================================================================

pub fn fixed(v: f64) -> Fixed64 {
    Fixed64::from_num(v)
}

// ===========================================================================
// Flow kinds
// ===========================================================================

pub fn gas_a() -> FlowKindId {
    FlowKindId(0)
}
pub fn gas_b() -> FlowKindId {
    FlowKindId(1)
}
pub fn fluid() -> FlowKindId {
    FlowKindId(2)
}

/// gas_a: red, shares capacity. gas_b: blue, viscosity 2, explodes.
/// fluid: keeps its own capacity slice.
pub fn standard_registry() -> KindRegistry {
    let mut builder = KindRegistryBuilder::new();
    builder.register(FlowValueKind::new("gas_a").with_color(Color::rgb(1.0, 0.0, 0.0)));
    builder.register(
        FlowValueKind::new("gas_b")
            .with_color(Color::rgb(0.0, 0.0, 1.0))
            .with_viscosity(fixed(2.0))
            .with_destroy_effect(DestroyEffect::Explode),
    );
    builder.register(
        FlowValueKind::new("fluid")
            .with_color(Color::rgb(0.0, 1.0, 0.0))
            .with_shared_capacity(false),
    );
    builder.build().expect("standard registry is valid")
}

// ===========================================================================
// Part templates
// ===========================================================================

fn gas_container(capacity: f64) -> ContainerConfig {
    ContainerConfig::new(fixed(capacity), vec![gas_a(), gas_b()])
}

pub fn storage_spec(name: &str, capacity: f64) -> PartSpec {
    PartSpec::new(name, RoleSet::STORAGE).with_container(gas_container(capacity))
}

pub fn producer_spec(name: &str, capacity: f64) -> PartSpec {
    PartSpec::new(name, RoleSet::PRODUCER).with_container(gas_container(capacity))
}

pub fn consumer_spec(name: &str, capacity: f64) -> PartSpec {
    PartSpec::new(name, RoleSet::CONSUMER).with_container(gas_container(capacity))
}

/// Requester without settings; chain `with_requester`.
pub fn requester_spec(name: &str, capacity: f64) -> PartSpec {
    PartSpec::new(name, RoleSet::REQUESTER).with_container(gas_container(capacity))
}

pub fn controller_spec() -> PartSpec {
    PartSpec::new("controller", RoleSet::CONTROLLER)
}

pub fn pipe_spec() -> PartSpec {
    PartSpec::new("pipe", RoleSet::TRANSMITTER)
}

/// A transmitter of family 1, never linking to pipes.
pub fn wire_spec() -> PartSpec {
    PartSpec::new("wire", RoleSet::TRANSMITTER).with_family(NetworkFamilyId(1))
}

// ===========================================================================
// Grid
// ===========================================================================

/// Minimal in-memory placement map. Footprints are unchecked: any number
/// of parts may share a cell and placement ignores the bounds.
#[derive(Debug, Clone)]
pub struct CellMap {
    width: i32,
    height: i32,
    cells: BTreeMap<GridPosition, Vec<NodeId>>,
    footprints: SecondaryMap<NodeId, Vec<GridPosition>>,
}

impl CellMap {
    pub fn new(width: i32, height: i32) -> Self {
        Self {
            width,
            height,
            cells: BTreeMap::new(),
            footprints: SecondaryMap::new(),
        }
    }

    pub fn insert(&mut self, node: NodeId, cells: &[GridPosition]) {
        for &cell in cells {
            self.cells.entry(cell).or_default().push(node);
        }
        self.footprints.insert(node, cells.to_vec());
    }

    pub fn insert_at(&mut self, node: NodeId, x: i32, y: i32) {
        self.insert(node, &[GridPosition::new(x, y)]);
    }

    pub fn remove(&mut self, node: NodeId) -> bool {
        let Some(cells) = self.footprints.remove(node) else {
            return false;
        };
        for cell in cells {
            if let Some(occupants) = self.cells.get_mut(&cell) {
                occupants.retain(|n| *n != node);
                if occupants.is_empty() {
                    self.cells.remove(&cell);
                }
            }
        }
        true
    }

    /// Build a part from `spec` straight into `parts` and place it.
    pub fn place(
        &mut self,
        parts: &mut SlotMap<NodeId, NetworkPart>,
        registry: &KindRegistry,
        spec: &PartSpec,
        x: i32,
        y: i32,
    ) -> NodeId {
        let node = parts.insert(NetworkPart::from_spec(spec, registry));
        self.insert_at(node, x, y);
        node
    }
}

impl SpatialQuery for CellMap {
    fn cells_occupied_by(&self, node: NodeId) -> Vec<GridPosition> {
        self.footprints.get(node).cloned().unwrap_or_default()
    }

    fn parts_at(&self, cell: GridPosition) -> Vec<NodeId> {
        self.cells.get(&cell).cloned().unwrap_or_default()
    }

    fn is_in_bounds(&self, cell: GridPosition) -> bool {
        (0..self.width).contains(&cell.x) && (0..self.height).contains(&cell.y)
    }
}

/// Rediscover the links of every part in `parts`.
pub fn link_all(parts: &mut SlotMap<NodeId, NetworkPart>, spatial: &impl SpatialQuery) {
    let nodes: Vec<NodeId> = parts.keys().collect();
    for node in nodes {
        let links = discover_links(parts, node, spatial);
        if let Some(part) = parts.get_mut(node) {
            part.set_links(links);
        }
    }
}
