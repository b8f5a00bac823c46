//! Serde data file structs for flow content definitions.
//!
//! These structs define the on-disk format for flow kinds, part templates
//! and system settings. They are deserialized from RON, JSON, or TOML data
//! files and then resolved into core types by the loader.

use serde::Deserialize;
use std::collections::BTreeMap;

fn default_one() -> f64 {
    1.0
}

fn default_true() -> bool {
    true
}

// ===========================================================================
// Flow kinds
// ===========================================================================

/// A flow kind definition in a data file.
#[derive(Debug, Clone, Deserialize)]
pub struct KindData {
    pub name: String,
    #[serde(default)]
    pub label: Option<String>,
    /// RGBA, each channel in `[0, 1]`. Defaults to opaque white.
    #[serde(default)]
    pub color: Option<[f32; 4]>,
    #[serde(default = "default_one")]
    pub viscosity: f64,
    #[serde(default = "default_one")]
    pub capacity_factor: f64,
    #[serde(default = "default_true")]
    pub shares_capacity: bool,
    #[serde(default)]
    pub destroy_effect: DestroyEffectData,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DestroyEffectData {
    #[default]
    Release,
    Explode,
}

// ===========================================================================
// Parts
// ===========================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoleData {
    Producer,
    Consumer,
    Storage,
    Requester,
    Transmitter,
    Controller,
}

/// A part template in a data file.
#[derive(Debug, Clone, Deserialize)]
pub struct PartData {
    pub name: String,
    pub roles: Vec<RoleData>,
    /// Network family. Parts only link within their family.
    #[serde(default)]
    pub family: u32,
    #[serde(default)]
    pub container: Option<ContainerData>,
    /// Per-role kind lists, by kind name. Roles left out handle every
    /// accepted kind.
    #[serde(default)]
    pub role_kinds: BTreeMap<RoleData, Vec<String>>,
    #[serde(default)]
    pub requester: Option<RequesterData>,
    #[serde(default)]
    pub store_evenly: bool,
    #[serde(default = "default_footprint")]
    pub footprint: FootprintData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ContainerData {
    pub capacity: f64,
    /// Accepted kinds, by name.
    pub accepts: Vec<String>,
    #[serde(default)]
    pub exclusive: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestModeData {
    Automatic,
    Manual,
}

/// Requester settings. Automatic mode reads `target_fill` and `kinds`;
/// manual mode reads `amounts`.
#[derive(Debug, Clone, Deserialize)]
pub struct RequesterData {
    pub mode: RequestModeData,
    #[serde(default = "default_one")]
    pub target_fill: f64,
    #[serde(default)]
    pub kinds: Vec<String>,
    #[serde(default)]
    pub amounts: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct FootprintData {
    pub width: u32,
    pub height: u32,
}

fn default_footprint() -> FootprintData {
    FootprintData {
        width: 1,
        height: 1,
    }
}

// ===========================================================================
// System settings
// ===========================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct SystemData {
    #[serde(default = "default_one")]
    pub base_unit: f64,
    #[serde(default)]
    pub max_path_depth: Option<u32>,
    /// Families whose networks need an active controller.
    #[serde(default)]
    pub controller_families: Vec<u32>,
}

impl Default for SystemData {
    fn default() -> Self {
        Self {
            base_unit: default_one(),
            max_path_depth: None,
            controller_families: Vec::new(),
        }
    }
}

// ===========================================================================
// TOML wrappers
// ===========================================================================

/// TOML files hold lists under a top-level key.
#[derive(Debug, Clone, Deserialize)]
pub struct TomlKinds {
    pub kinds: Vec<KindData>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TomlParts {
    pub parts: Vec<PartData>,
}
