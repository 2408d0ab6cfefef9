//! Domain Layer
//!
//! The record value object and the ports the replication core depends on.
//!
//! - **Record** (`record.rs`) - the unit that gets sharded, with its byte form
//! - **Ports** (`ports.rs`) - `ErasureCodec` and `ShardTransport` traits
//!
//! # Usage
//!
//! ```ignore
//! use ecvault::domain::{Record, ShardTransport};
//!
//! async fn push<T: ShardTransport>(transport: &T, peer: &NodeAddress, shard: Bytes) -> Result<()> {
//!     transport.store(peer, "loc-1", shard).await
//! }
//! ```

pub mod ports;
pub mod record;

pub use ports::{ErasureCodec, ShardTransport};
pub use record::Record;
