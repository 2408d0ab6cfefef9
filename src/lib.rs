//! ecvault - Erasure-Coded Record Store
//!
//! Stores small sensor records across a fixed 7-node cluster. Each record
//! is split into 4 data shards and 3 parity shards, one per node, and any
//! 4 of the 7 rebuild it exactly.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        Storage Node                              │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  ┌──────────────┐    ┌──────────────┐    ┌──────────────┐       │
//! │  │   HTTP API   │───▶│ Replication  │───▶│ Shard Codec  │       │
//! │  │              │    │ Coordinator  │    │  (4 + 3 EC)  │       │
//! │  └──────────────┘    └──────┬───────┘    └──────────────┘       │
//! │                             │                                    │
//! │              ┌──────────────┴───────────────┐                    │
//! │              ▼                              ▼                    │
//! │  ┌──────────────────────┐      ┌──────────────────────────┐     │
//! │  │  Local Shard Store   │      │  Peer Transport (TCP)    │     │
//! │  │  + Key Lock Table    │◀─────│  STORE / FETCH / RESP    │     │
//! │  └──────────────────────┘      └──────────────────────────┘     │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`adapters`] - Infrastructure adapters implementing domain ports
//! - [`api`] - HTTP surface
//! - [`cluster`] - Static node topology
//! - [`config`] - Node configuration
//! - [`domain`] - Record value object and ports
//! - [`ec`] - Erasure coding components
//! - [`error`] - Error types
//! - [`metrics`] - Prometheus metrics
//! - [`node`] - Node bootstrap and shutdown
//! - [`replication`] - Distributed write and read paths
//! - [`storage`] - Local shard store and key locks
//! - [`transport`] - Peer wire protocol over TCP

pub mod adapters;
pub mod api;
pub mod cluster;
pub mod config;
pub mod domain;
pub mod ec;
pub mod error;
pub mod metrics;
pub mod node;
pub mod replication;
pub mod storage;
pub mod transport;

// Re-export commonly used types
pub use cluster::{NodeAddress, NodeTopology};
pub use config::{CodecKind, NodeConfig};
pub use domain::Record;
pub use ec::ShardCodec;
pub use error::{Error, Result};
pub use node::StorageNode;
pub use replication::{ReplicationCoordinator, WriteReport};
