use crate::fixed::{FlowAmount, Ticks};
use crate::id::{FlowKindId, NetworkFamilyId, NetworkId, NodeId};
use serde::{Deserialize, Serialize};

/// Notifications produced by the flow system for the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FlowEvent {
    NetworkFormed {
        network: NetworkId,
        family: NetworkFamilyId,
        nodes: usize,
        edges: usize,
        members: usize,
        tick: Ticks,
    },
    NetworkDissolved {
        network: NetworkId,
        tick: Ticks,
    },
    /// A container reached capacity.
    ContainerFull {
        node: NodeId,
        kind: FlowKindId,
        tick: Ticks,
    },
    /// A container lost its last stored amount.
    ContainerEmptied {
        node: NodeId,
        kind: FlowKindId,
        tick: Ticks,
    },
    /// Contents released by a destroyed part.
    ContentsReleased {
        node: NodeId,
        kind: FlowKindId,
        amount: FlowAmount,
        tick: Ticks,
    },
}
