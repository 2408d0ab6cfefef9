//! Replication: the distributed write and read paths.

pub mod coordinator;

pub use coordinator::{validate_key, ReplicationConfig, ReplicationCoordinator, WriteReport};
