//! Domain Ports (Port/Adapter Pattern)
//!
//! Trait abstractions the replication core depends on. Infrastructure
//! adapters implement these to provide concrete erasure coding and peer
//! transport.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Domain Layer                            │
//! │  ┌─────────────────────────────────────────────────────┐    │
//! │  │                    Ports (Traits)                    │    │
//! │  │         ErasureCodec   │   ShardTransport            │    │
//! │  └─────────────────────────────────────────────────────┘    │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   Infrastructure Layer                       │
//! │  ┌─────────────────────────────────────────────────────┐    │
//! │  │                  Adapters (Impls)                    │    │
//! │  │  SystematicCodec │ ReedSolomonCodecAdapter │ TcpPeer │    │
//! │  └─────────────────────────────────────────────────────┘    │
//! └─────────────────────────────────────────────────────────────┘
//! ```

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use crate::cluster::NodeAddress;
use crate::error::Result;

// =============================================================================
// Erasure Coding Port
// =============================================================================

/// Port for systematic erasure coding.
///
/// Data shards are stored unchanged; parity shards are GF(2^8) linear
/// combinations of them. Any `data_shards()` survivors reconstruct the rest.
pub trait ErasureCodec: Send + Sync + std::fmt::Debug {
    /// Number of data shards (k)
    fn data_shards(&self) -> usize;

    /// Number of parity shards (m)
    fn parity_shards(&self) -> usize;

    /// Total number of shards (k + m)
    fn total_shards(&self) -> usize {
        self.data_shards() + self.parity_shards()
    }

    /// Compute the parity shards for `data`.
    ///
    /// `data` must hold exactly `data_shards()` buffers of equal length.
    /// Identical inputs always produce identical parity.
    fn generate_parity(&self, data: &[Vec<u8>]) -> Result<Vec<Vec<u8>>>;

    /// Fill in every `None` slot of `shards` (length `total_shards()`).
    ///
    /// # Errors
    ///
    /// - `InsufficientShards` if fewer than `data_shards()` are present
    /// - `ShardSizeMismatch` if present shards disagree in length
    /// - `SingularMatrix` if the decode matrix cannot be inverted
    fn reconstruct(&self, shards: &mut [Option<Vec<u8>>]) -> Result<()>;
}

// =============================================================================
// Transport Port
// =============================================================================

/// Port for moving shards between nodes.
///
/// Failures are per peer: callers log them and carry on with the
/// remaining peers.
#[async_trait]
pub trait ShardTransport: Send + Sync {
    /// Ask `peer` to store `shard` under `key`. Returns once the message
    /// has been handed to the connection; there is no acknowledgement.
    async fn store(&self, peer: &NodeAddress, key: &str, shard: Bytes) -> Result<()>;

    /// Fetch `peer`'s shard for `key`, waiting at most `timeout` for the
    /// reply. `Ok(None)` means the peer answered that it holds nothing.
    async fn fetch(&self, peer: &NodeAddress, key: &str, timeout: Duration)
        -> Result<Option<Bytes>>;

    /// Forget the connection to `peer`; later operations towards it fail
    /// fast until it reconnects.
    fn disconnect(&self, peer: &NodeAddress);

    /// Whether a live connection to `peer` is currently registered
    fn is_connected(&self, peer: &NodeAddress) -> bool;

    /// Number of peers with a live connection
    fn connected_peers(&self) -> usize;
}
