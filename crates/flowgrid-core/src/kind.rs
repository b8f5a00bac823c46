//! Flow value kinds and the frozen kind registry.
//!
//! A [`FlowValueKind`] describes one category of resource (a gas, a fluid,
//! an energy type). Kinds are registered once through a
//! [`KindRegistryBuilder`] and frozen into a [`KindRegistry`]; nothing
//! mutates them afterwards.

use crate::fixed::{FLOW_EPSILON, Fixed64, FlowAmount};
use crate::id::FlowKindId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ---------------------------------------------------------------------------
// Color
// ---------------------------------------------------------------------------

/// Display color with linear RGBA components in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Color {
    /// Fully transparent black.
    pub const CLEAR: Color = Color::rgba(0.0, 0.0, 0.0, 0.0);
    pub const WHITE: Color = Color::rgba(1.0, 1.0, 1.0, 1.0);

    pub const fn rgba(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    pub const fn rgb(r: f32, g: f32, b: f32) -> Self {
        Self::rgba(r, g, b, 1.0)
    }

    /// Multiply every channel by `factor`.
    pub fn scaled(self, factor: f32) -> Self {
        Self::rgba(
            self.r * factor,
            self.g * factor,
            self.b * factor,
            self.a * factor,
        )
    }

    /// Channel-wise sum, saturating at 1.0.
    pub fn saturating_add(self, other: Color) -> Self {
        Self::rgba(
            (self.r + other.r).min(1.0),
            (self.g + other.g).min(1.0),
            (self.b + other.b).min(1.0),
            (self.a + other.a).min(1.0),
        )
    }
}

// ---------------------------------------------------------------------------
// Kind definition
// ---------------------------------------------------------------------------

/// What happens to a stored kind when its part is destroyed by force.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DestroyEffect {
    /// Contents leak into the world around the part.
    #[default]
    Release,
    /// Contents detonate, scaled by the destroyed amount.
    Explode,
}

/// Immutable descriptor of one flow value kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowValueKind {
    /// Unique registry name.
    pub name: String,
    /// Short display label.
    pub label: String,
    pub color: Color,
    /// Inverse of the flow rate. A kind with viscosity 2 moves half a unit
    /// per transfer step.
    pub viscosity: Fixed64,
    /// Weight of this kind's capacity slice when it does not share capacity.
    pub capacity_factor: Fixed64,
    /// When true the kind competes for the container's whole capacity pool.
    /// When false it is capped by its own per-kind allowance.
    pub shares_capacity: bool,
    pub destroy_effect: DestroyEffect,
}

impl FlowValueKind {
    /// A kind with neutral defaults: viscosity 1, capacity factor 1,
    /// shared capacity, white, released on destruction.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            label: name.to_string(),
            color: Color::WHITE,
            viscosity: Fixed64::ONE,
            capacity_factor: Fixed64::ONE,
            shares_capacity: true,
            destroy_effect: DestroyEffect::Release,
        }
    }

    pub fn with_label(mut self, label: &str) -> Self {
        self.label = label.to_string();
        self
    }

    pub fn with_color(mut self, color: Color) -> Self {
        self.color = color;
        self
    }

    pub fn with_viscosity(mut self, viscosity: Fixed64) -> Self {
        self.viscosity = viscosity;
        self
    }

    pub fn with_capacity_factor(mut self, factor: Fixed64) -> Self {
        self.capacity_factor = factor;
        self
    }

    pub fn with_shared_capacity(mut self, shares: bool) -> Self {
        self.shares_capacity = shares;
        self
    }

    pub fn with_destroy_effect(mut self, effect: DestroyEffect) -> Self {
        self.destroy_effect = effect;
        self
    }

    /// Flow rate (`1 / viscosity`).
    pub fn flow_rate(&self) -> Fixed64 {
        if self.viscosity <= FLOW_EPSILON {
            return Fixed64::ONE;
        }
        Fixed64::ONE / self.viscosity
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors raised while freezing the registry.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("duplicate flow kind name: {0}")]
    DuplicateName(String),
    #[error("flow kind '{0}' has a non-positive viscosity")]
    InvalidViscosity(String),
    #[error("flow kind '{0}' has a non-positive capacity factor")]
    InvalidCapacityFactor(String),
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Collects kind definitions before they are frozen.
#[derive(Debug, Default)]
pub struct KindRegistryBuilder {
    kinds: Vec<FlowValueKind>,
    duplicates: Vec<String>,
    name_to_id: HashMap<String, FlowKindId>,
}

impl KindRegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a kind. Returns its ID. Duplicate names are reported by
    /// [`build`](Self::build).
    pub fn register(&mut self, kind: FlowValueKind) -> FlowKindId {
        let id = FlowKindId(self.kinds.len() as u32);
        if self.name_to_id.contains_key(&kind.name) {
            self.duplicates.push(kind.name.clone());
        } else {
            self.name_to_id.insert(kind.name.clone(), id);
        }
        self.kinds.push(kind);
        id
    }

    /// Lookup a kind ID by name.
    pub fn kind_id(&self, name: &str) -> Option<FlowKindId> {
        self.name_to_id.get(name).copied()
    }

    /// Validate and freeze the registry.
    pub fn build(self) -> Result<KindRegistry, RegistryError> {
        if let Some(name) = self.duplicates.into_iter().next() {
            return Err(RegistryError::DuplicateName(name));
        }
        for kind in &self.kinds {
            if kind.viscosity <= Fixed64::ZERO {
                return Err(RegistryError::InvalidViscosity(kind.name.clone()));
            }
            if kind.capacity_factor <= Fixed64::ZERO {
                return Err(RegistryError::InvalidCapacityFactor(kind.name.clone()));
            }
        }
        Ok(KindRegistry {
            kinds: self.kinds,
            name_to_id: self.name_to_id,
        })
    }
}

/// Immutable registry of flow value kinds. Frozen after build().
#[derive(Debug, Clone, Default)]
pub struct KindRegistry {
    kinds: Vec<FlowValueKind>,
    name_to_id: HashMap<String, FlowKindId>,
}

impl KindRegistry {
    pub fn get(&self, id: FlowKindId) -> Option<&FlowValueKind> {
        self.kinds.get(id.0 as usize)
    }

    pub fn kind_id(&self, name: &str) -> Option<FlowKindId> {
        self.name_to_id.get(name).copied()
    }

    pub fn contains(&self, id: FlowKindId) -> bool {
        (id.0 as usize) < self.kinds.len()
    }

    pub fn len(&self) -> usize {
        self.kinds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }

    /// Iterate kinds in registration order.
    pub fn iter(&self) -> impl Iterator<Item = (FlowKindId, &FlowValueKind)> {
        self.kinds
            .iter()
            .enumerate()
            .map(|(i, k)| (FlowKindId(i as u32), k))
    }

    /// The discrete amount moved per transfer step for `kind`:
    /// `base_unit * flow_rate`. Unknown kinds move `base_unit`.
    pub fn unit_for(&self, kind: FlowKindId, base_unit: FlowAmount) -> FlowAmount {
        match self.get(kind) {
            Some(def) => base_unit * def.flow_rate(),
            None => base_unit,
        }
    }
}
