//! Reed-Solomon Codec Adapter
//!
//! Implements the `ErasureCodec` port using the reed-solomon-erasure library.
//! The library builds the same Vandermonde-derived systematic matrix over
//! polynomial 0x11D as [`SystematicCodec`](crate::ec::SystematicCodec), so
//! shards are interchangeable between the two.

use reed_solomon_erasure::galois_8::ReedSolomon;

use crate::domain::ports::ErasureCodec;
use crate::ec::codec::uniform_shard_len;
use crate::error::{Error, Result};

/// Reed-Solomon based erasure coding adapter.
pub struct ReedSolomonCodecAdapter {
    rs: ReedSolomon,
    data_shards: usize,
    parity_shards: usize,
}

impl std::fmt::Debug for ReedSolomonCodecAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReedSolomonCodecAdapter")
            .field("data_shards", &self.data_shards)
            .field("parity_shards", &self.parity_shards)
            .finish()
    }
}

impl ReedSolomonCodecAdapter {
    /// Create a new Reed-Solomon codec adapter.
    ///
    /// # Arguments
    /// * `data_shards` - Number of data shards (k)
    /// * `parity_shards` - Number of parity shards (m)
    pub fn new(data_shards: usize, parity_shards: usize) -> Result<Self> {
        let rs = ReedSolomon::new(data_shards, parity_shards).map_err(|e| {
            Error::InvalidEcConfig(format!("Failed to create Reed-Solomon codec: {:?}", e))
        })?;

        Ok(Self {
            rs,
            data_shards,
            parity_shards,
        })
    }
}

impl ErasureCodec for ReedSolomonCodecAdapter {
    fn data_shards(&self) -> usize {
        self.data_shards
    }

    fn parity_shards(&self) -> usize {
        self.parity_shards
    }

    fn generate_parity(&self, data: &[Vec<u8>]) -> Result<Vec<Vec<u8>>> {
        if data.len() != self.data_shards {
            return Err(Error::InvalidEcConfig(format!(
                "Expected {} data shards, got {}",
                self.data_shards,
                data.len()
            )));
        }
        let shard_len =
            uniform_shard_len(data.iter().map(Vec::as_slice).enumerate())?.unwrap_or(0);

        let mut parity = vec![vec![0u8; shard_len]; self.parity_shards];
        self.rs
            .encode_sep(data, &mut parity)
            .map_err(|e| Error::InvalidEcConfig(format!("Reed-Solomon encoding failed: {:?}", e)))?;
        Ok(parity)
    }

    fn reconstruct(&self, shards: &mut [Option<Vec<u8>>]) -> Result<()> {
        if shards.len() != self.total_shards() {
            return Err(Error::InvalidEcConfig(format!(
                "Expected {} shards, got {}",
                self.total_shards(),
                shards.len()
            )));
        }

        let available = shards.iter().filter(|s| s.is_some()).count();
        if available < self.data_shards {
            return Err(Error::InsufficientShards {
                available,
                required: self.data_shards,
            });
        }
        uniform_shard_len(
            shards
                .iter()
                .enumerate()
                .filter_map(|(i, s)| s.as_deref().map(|s| (i, s))),
        )?;

        self.rs
            .reconstruct(shards)
            .map_err(|e| Error::Reconstruction(format!("Reed-Solomon reconstruction failed: {:?}", e)))
    }
}
