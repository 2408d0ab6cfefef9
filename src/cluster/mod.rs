//! Cluster membership: the fixed 7-node layout and shard ownership.

pub mod topology;

pub use topology::{NodeAddress, NodeTopology};
