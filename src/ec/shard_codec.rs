//! Record Shard Codec
//!
//! Turns a [`Record`] into the fixed set of 7 shards and back.
//!
//! # Layout
//!
//! ```text
//! ┌──────────────┬───────────────────────────┬─────────┐
//! │ len (u32 BE) │ serialized record (len B) │ 0-pad   │
//! └──────────────┴───────────────────────────┴─────────┘
//!  split evenly into 4 data shards, then 3 parity shards appended
//! ```
//!
//! Every shard of a record has length `ceil((len + 4) / 4)`.

use std::sync::Arc;

use bytes::Bytes;
use tracing::{debug, instrument};

use crate::domain::ports::ErasureCodec;
use crate::domain::record::Record;
use crate::ec::codec::{uniform_shard_len, SystematicCodec};
use crate::error::{Error, Result};

/// Number of data shards per record
pub const DATA_SHARDS: usize = 4;

/// Number of parity shards per record
pub const PARITY_SHARDS: usize = 3;

/// Total shards per record, one per node
pub const TOTAL_SHARDS: usize = DATA_SHARDS + PARITY_SHARDS;

/// Size of the big-endian payload length header
pub const LENGTH_PREFIX_BYTES: usize = 4;

/// Shard length for a payload of `payload_len` bytes
pub fn shard_len_for(payload_len: usize) -> usize {
    (payload_len + LENGTH_PREFIX_BYTES).div_ceil(DATA_SHARDS)
}

/// Splits serialized records into data shards and delegates parity and
/// reconstruction to an [`ErasureCodec`].
#[derive(Debug, Clone)]
pub struct ShardCodec {
    codec: Arc<dyn ErasureCodec>,
}

impl ShardCodec {
    /// Wrap an erasure codec. It must be configured for 4 data + 3 parity.
    pub fn new(codec: Arc<dyn ErasureCodec>) -> Result<Self> {
        if codec.data_shards() != DATA_SHARDS || codec.parity_shards() != PARITY_SHARDS {
            return Err(Error::InvalidEcConfig(format!(
                "record sharding needs {}+{}, codec is {}+{}",
                DATA_SHARDS,
                PARITY_SHARDS,
                codec.data_shards(),
                codec.parity_shards()
            )));
        }
        Ok(Self { codec })
    }

    /// Shard codec backed by the native GF(2^8) implementation
    pub fn native() -> Result<Self> {
        Self::new(Arc::new(SystematicCodec::new(DATA_SHARDS, PARITY_SHARDS)?))
    }

    /// Encode an arbitrary payload into 7 equal-length shards.
    #[instrument(skip(self, payload), fields(payload_len = payload.len()))]
    pub fn encode_bytes(&self, payload: &[u8]) -> Result<Vec<Vec<u8>>> {
        let payload_len = u32::try_from(payload.len()).map_err(|_| {
            Error::EncodeFailure(format!("payload of {} bytes is too large", payload.len()))
        })?;

        let shard_len = shard_len_for(payload.len());
        let mut buffer = Vec::with_capacity(shard_len * DATA_SHARDS);
        buffer.extend_from_slice(&payload_len.to_be_bytes());
        buffer.extend_from_slice(payload);
        buffer.resize(shard_len * DATA_SHARDS, 0);

        let mut shards: Vec<Vec<u8>> = buffer.chunks(shard_len).map(|c| c.to_vec()).collect();
        let parity = self.codec.generate_parity(&shards)?;
        shards.extend(parity);

        debug!(
            "Encoded {} bytes into {} shards of {} bytes each",
            payload.len(),
            shards.len(),
            shard_len
        );

        Ok(shards)
    }

    /// Reassemble the payload from a 7-slot shard array, reconstructing
    /// absent slots when needed.
    #[instrument(skip(self, shards))]
    pub fn decode_bytes(&self, shards: &[Option<Vec<u8>>]) -> Result<Vec<u8>> {
        if shards.len() != TOTAL_SHARDS {
            return Err(Error::InvalidEcConfig(format!(
                "Expected {} shards, got {}",
                TOTAL_SHARDS,
                shards.len()
            )));
        }

        let available = shards.iter().filter(|s| s.is_some()).count();
        if available < DATA_SHARDS {
            return Err(Error::InsufficientShards {
                available,
                required: DATA_SHARDS,
            });
        }
        let shard_len = uniform_shard_len(
            shards
                .iter()
                .enumerate()
                .filter_map(|(i, s)| s.as_deref().map(|s| (i, s))),
        )?
        .unwrap_or(0);

        let mut working = shards.to_vec();
        if available < TOTAL_SHARDS {
            self.codec.reconstruct(&mut working)?;
        }

        let mut buffer = Vec::with_capacity(shard_len * DATA_SHARDS);
        for shard in working.iter().take(DATA_SHARDS) {
            let shard = shard
                .as_deref()
                .ok_or_else(|| Error::Reconstruction("data shard missing after reconstruction".into()))?;
            buffer.extend_from_slice(shard);
        }

        if buffer.len() < LENGTH_PREFIX_BYTES {
            return Err(Error::Decode(format!(
                "{} bytes cannot hold the length header",
                buffer.len()
            )));
        }
        let mut header = [0u8; LENGTH_PREFIX_BYTES];
        header.copy_from_slice(&buffer[..LENGTH_PREFIX_BYTES]);
        let payload_len = u32::from_be_bytes(header) as usize;

        let end = LENGTH_PREFIX_BYTES + payload_len;
        if end > buffer.len() {
            return Err(Error::Decode(format!(
                "length header says {} bytes but only {} are available",
                payload_len,
                buffer.len() - LENGTH_PREFIX_BYTES
            )));
        }

        buffer.truncate(end);
        buffer.drain(..LENGTH_PREFIX_BYTES);
        Ok(buffer)
    }

    /// Serialize and shard a record.
    pub fn encode(&self, record: &Record) -> Result<Vec<Bytes>> {
        let payload = record.to_bytes()?;
        Ok(self
            .encode_bytes(&payload)?
            .into_iter()
            .map(Bytes::from)
            .collect())
    }

    /// Rebuild a record from whatever shards are present.
    pub fn decode(&self, shards: &[Option<Bytes>]) -> Result<Record> {
        let owned: Vec<Option<Vec<u8>>> = shards
            .iter()
            .map(|s| s.as_ref().map(|b| b.to_vec()))
            .collect();
        let payload = self.decode_bytes(&owned)?;
        Record::from_bytes(&payload)
    }
}

// =============================================================================
// Tests
// =============================================================================
