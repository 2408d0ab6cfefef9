//! Erasure Coding Module
//!
//! Splits each record into 4 data shards plus 3 parity shards so that any
//! 4 of the 7 reconstruct the original exactly.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Erasure Coding Module                             │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                          │
//! │  ┌──────────────────────┐      ┌──────────────────────────────────────┐  │
//! │  │   Shard Codec        │─────▶│  ErasureCodec port                   │  │
//! │  │   (header, pad,      │      │  SystematicCodec (native) or         │  │
//! │  │    split, reassemble)│      │  ReedSolomonCodecAdapter             │  │
//! │  └──────────────────────┘      └──────────────────┬───────────────────┘  │
//! │                                                   │                      │
//! │                              ┌────────────────────┴─────────────────┐    │
//! │                              │  GF(2^8) matrices & byte arithmetic  │    │
//! │                              └──────────────────────────────────────┘    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Components
//!
//! - **Galois** (`galois.rs`): log/exp tables over polynomial 0x11D
//! - **Matrix** (`matrix.rs`): Vandermonde construction, products, inversion
//! - **Codec** (`codec.rs`): systematic 4+3 parity generation and reconstruction
//! - **Shard Codec** (`shard_codec.rs`): record ⇄ 7 equal-length shards
//!
//! # Usage
//!
//! ```rust,ignore
//! use ecvault::ec::ShardCodec;
//! use ecvault::domain::Record;
//!
//! let codec = ShardCodec::native()?;
//! let record = Record::new("loc-1", 1.2, 20.5, 0.003);
//!
//! let shards = codec.encode(&record)?;
//! let mut slots: Vec<_> = shards.into_iter().map(Some).collect();
//! slots[2] = None;
//! slots[5] = None;
//!
//! assert_eq!(codec.decode(&slots)?, record);
//! ```

pub mod codec;
pub mod galois;
pub mod matrix;
pub mod shard_codec;

#[cfg(test)]
mod proptest;

pub use codec::SystematicCodec;
pub use matrix::Matrix;
pub use shard_codec::{
    shard_len_for, ShardCodec, DATA_SHARDS, LENGTH_PREFIX_BYTES, PARITY_SHARDS, TOTAL_SHARDS,
};
