//! Infrastructure Adapters
//!
//! Adapter implementations for the domain ports, following the
//! Port/Adapter (Hexagonal) architecture pattern.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        Domain Layer                              │
//! │  ┌────────────────────────────────────────────────────────────┐ │
//! │  │          Ports (Traits): ErasureCodec │ ShardTransport      │ │
//! │  └────────────────────────────────────────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────┘
//!                               │
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                     Adapters                                     │
//! │  ┌────────────────────────────────────────────────────────────┐ │
//! │  │ ReedSolomonCodecAdapter (this module)                       │ │
//! │  │ SystematicCodec (ec) │ TcpPeerTransport (transport)         │ │
//! │  └────────────────────────────────────────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use std::sync::Arc;
//! use ecvault::adapters::ReedSolomonCodecAdapter;
//! use ecvault::ec::ShardCodec;
//!
//! let codec = ShardCodec::new(Arc::new(ReedSolomonCodecAdapter::new(4, 3)?))?;
//! let shards = codec.encode(&record)?;
//! ```

mod reed_solomon;

pub use reed_solomon::ReedSolomonCodecAdapter;
