//! Versioned binary snapshots of a [`FlowSystem`].
//!
//! Only parts and configuration are stored. Links, graphs, networks and
//! path caches are rebuilt from the spatial layout after loading, so a
//! loaded system forms its networks on its first tick.

use crate::fixed::Ticks;
use crate::id::{NetworkFamilyId, NodeId};
use crate::kind::KindRegistry;
use crate::part::NetworkPart;
use crate::system::{FlowSystem, SystemConfig};
use serde::{Deserialize, Serialize};
use slotmap::SlotMap;
use std::collections::BTreeSet;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Magic number identifying a flow system snapshot.
pub const SNAPSHOT_MAGIC: u32 = 0xF10A_0001;

/// Current format version. Increment when breaking the wire format.
pub const FORMAT_VERSION: u32 = 1;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("bitcode encoding failed: {0}")]
    Encode(String),
    #[error("bitcode decoding failed: {0}")]
    Decode(String),
    #[error("invalid magic number: expected 0x{:08X}, got 0x{:08X}", SNAPSHOT_MAGIC, .0)]
    InvalidMagic(u32),
    #[error("unsupported format version: expected {}, got {}", FORMAT_VERSION, .0)]
    UnsupportedVersion(u32),
    #[error("snapshot from future version {0} (this build supports up to {FORMAT_VERSION})")]
    FutureVersion(u32),
}

// ---------------------------------------------------------------------------
// Header
// ---------------------------------------------------------------------------

/// Header stored in front of every snapshot payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotHeader {
    pub magic: u32,
    pub version: u32,
    /// Tick count when the snapshot was taken.
    pub tick: Ticks,
}

impl SnapshotHeader {
    pub fn new(tick: Ticks) -> Self {
        Self {
            magic: SNAPSHOT_MAGIC,
            version: FORMAT_VERSION,
            tick,
        }
    }

    pub fn validate(&self) -> Result<(), SnapshotError> {
        if self.magic != SNAPSHOT_MAGIC {
            return Err(SnapshotError::InvalidMagic(self.magic));
        }
        if self.version > FORMAT_VERSION {
            return Err(SnapshotError::FutureVersion(self.version));
        }
        if self.version < FORMAT_VERSION {
            return Err(SnapshotError::UnsupportedVersion(self.version));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

/// Serializable state of a flow system. Node ids survive the round trip,
/// so host-side placement keyed by `NodeId` stays valid.
#[derive(Debug, Serialize, Deserialize)]
pub struct SystemSnapshot {
    pub header: SnapshotHeader,
    pub config: SystemConfig,
    pub parts: SlotMap<NodeId, NetworkPart>,
    #[serde(default)]
    pub controller_families: BTreeSet<NetworkFamilyId>,
}

impl FlowSystem {
    pub fn snapshot(&self) -> SystemSnapshot {
        SystemSnapshot {
            header: SnapshotHeader::new(self.tick),
            config: self.config.clone(),
            parts: self.parts.clone(),
            controller_families: self.controller_families.clone(),
        }
    }

    /// Rebuild a system from `snapshot`, resolving kinds against `registry`.
    /// Every part is queued as a reload spawn.
    pub fn from_snapshot(snapshot: SystemSnapshot, registry: KindRegistry) -> Self {
        let mut system = FlowSystem::new(registry, snapshot.config);
        system.tick = snapshot.header.tick;
        system.controller_families = snapshot.controller_families;
        system.parts = snapshot.parts;

        let nodes: Vec<NodeId> = system.parts.keys().collect();
        for node in nodes {
            // Kind data may have changed since the save.
            if let Some(part) = system.parts.get_mut(node) {
                *part = NetworkPart::from_state(&part.save_state(), &system.registry);
            }
            system.on_spawned(node, true);
        }
        tracing::debug!(parts = system.parts.len(), tick = system.tick, "flow system restored");
        system
    }

    /// Encode the system as a versioned bitcode snapshot.
    pub fn save(&self) -> Result<Vec<u8>, SnapshotError> {
        bitcode::serialize(&self.snapshot()).map_err(|e| SnapshotError::Encode(e.to_string()))
    }

    /// Decode a snapshot produced by [`FlowSystem::save`].
    pub fn load(data: &[u8], registry: KindRegistry) -> Result<Self, SnapshotError> {
        let snapshot: SystemSnapshot =
            bitcode::deserialize(data).map_err(|e| SnapshotError::Decode(e.to_string()))?;
        snapshot.header.validate()?;
        Ok(Self::from_snapshot(snapshot, registry))
    }
}
