//! Flowgrid Core -- network flow simulation for grid-based building games.
//!
//! Parts placed on a grid (tanks, pipes, pumps, machines) link to adjacent
//! parts of the same family and form networks. Each network moves typed
//! flow values (gases, liquids, power) between the containers of its
//! members every tick.
//!
//! # Tick Pipeline
//!
//! Each call to [`system::FlowSystem::tick`]:
//!
//! 1. **Rebuild** -- Apply queued spawns and destroys: relink parts from the
//!    spatial layout, dissolve stale networks and build new ones.
//! 2. **Producer** -- Producers push one unit per kind to each reachable
//!    storage with room, nearest first.
//! 3. **Storage** -- Storage purges kinds it may not keep, balances with
//!    neighbors when configured to store evenly, then feeds consumers.
//! 4. **Consumer** -- The host's [`network::ConsumerHook`] runs on every
//!    consumer.
//! 5. **Requester** -- Requesters pull toward their target amounts from
//!    storage.
//!
//! Container fill transitions become [`event::FlowEvent`]s and invalidate
//! cached partner searches.
//!
//! # Key Types
//!
//! - [`container::FlowContainer`] -- Capacity-bounded multi-kind store.
//! - [`part::NetworkPart`] -- A placed part: roles, container, links.
//! - [`graph::TopologyGraph`] -- Weighted graph with a path request cache.
//! - [`builder::GraphBuilder`] -- Folds transmitter runs into weighted edges.
//! - [`network::Network`] -- One connected network and its tick protocol.
//! - [`system::FlowSystem`] -- Arena owner and lifecycle entry point.
//! - [`fixed::Fixed64`] -- Q32.32 fixed-point type for deterministic math.
//! - [`persist`] -- Versioned snapshots via bitcode.

pub mod builder;
pub mod container;
pub mod event;
pub mod fixed;
pub mod graph;
pub mod id;
pub mod kind;
pub mod network;
pub mod part;
pub mod path;
pub mod persist;
pub mod result;
pub mod role;
pub mod spatial;
pub mod system;
pub mod transfer;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
