use serde::{Deserialize, Serialize};
use slotmap::new_key_type;

new_key_type! {
    /// Identifies a network part (node, junction, or transmitter segment).
    pub struct NodeId;

    /// Identifies a live network formed by the graph builder.
    pub struct NetworkId;
}

/// Identifies a flow value kind in the registry. Cheap to copy and compare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FlowKindId(pub u32);

/// Identifies a family of parts that may connect to each other.
/// Parts of different families never share a network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct NetworkFamilyId(pub u32);
