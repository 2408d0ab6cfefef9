//! Error types for the erasure-coded record store

use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while encoding, storing, replicating or
/// reconstructing records
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Metrics registration error
    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    // =========================================================================
    // Record Errors
    // =========================================================================
    /// Record could not be serialized; nothing was stored or sent
    #[error("Failed to encode record: {0}")]
    EncodeFailure(String),

    /// Reassembled bytes could not be parsed back into a record
    #[error("Failed to decode record: {0}")]
    Decode(String),

    /// Key cannot be carried by the peer wire protocol
    #[error("Invalid key {key:?}: {reason}")]
    InvalidKey { key: String, reason: String },

    // =========================================================================
    // Erasure Coding Errors
    // =========================================================================
    /// Invalid EC configuration
    #[error("Invalid EC configuration: {0}")]
    InvalidEcConfig(String),

    /// Insufficient shards for reconstruction
    #[error("Insufficient shards for reconstruction: have {available}, need {required}")]
    InsufficientShards { available: usize, required: usize },

    /// Present shards disagree in length
    #[error("Shard size mismatch: shard {index} has {actual} bytes, expected {expected}")]
    ShardSizeMismatch {
        index: usize,
        expected: usize,
        actual: usize,
    },

    /// Decode sub-matrix could not be inverted
    #[error("Singular matrix during reconstruction (present rows {rows:?})")]
    SingularMatrix { rows: Vec<usize> },

    /// Reconstruction failed for a reason other than the above
    #[error("EC reconstruction failed: {0}")]
    Reconstruction(String),

    // =========================================================================
    // Peer Errors
    // =========================================================================
    /// Connect, send or receive failure towards one peer
    #[error("Peer {peer} unreachable: {reason}")]
    PeerUnreachable { peer: String, reason: String },

    /// Peer did not answer a fetch in time
    #[error("Fetch from peer {peer} timed out after {timeout_ms}ms")]
    FetchTimeout { peer: String, timeout_ms: u64 },

    /// Malformed line on a peer connection
    #[error("Protocol error: {0}")]
    Protocol(String),
}

impl Error {
    /// Shorthand for a [`Error::PeerUnreachable`].
    pub fn peer_unreachable(peer: impl Into<String>, reason: impl ToString) -> Self {
        Error::PeerUnreachable {
            peer: peer.into(),
            reason: reason.to_string(),
        }
    }

    /// True when the failure is a cluster-wide shortfall of shards rather
    /// than a malformed request.
    pub fn is_insufficient_shards(&self) -> bool {
        matches!(self, Error::InsufficientShards { .. })
    }
}
