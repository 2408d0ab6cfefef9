//! Systematic Reed-Solomon Codec
//!
//! Native GF(2^8) implementation of the [`ErasureCodec`] port.
//!
//! The coding matrix is a `total x data` Vandermonde matrix multiplied by
//! the inverse of its own top square, so the top rows become the identity
//! and data shards pass through unchanged. The remaining rows generate
//! parity. Reconstruction inverts the rows of whichever shards survived.

use std::sync::Arc;

use dashmap::DashMap;
use tracing::{debug, error, instrument};

use crate::domain::ports::ErasureCodec;
use crate::ec::galois;
use crate::ec::matrix::Matrix;
use crate::error::{Error, Result};

/// Native systematic Reed-Solomon codec over GF(2^8)
pub struct SystematicCodec {
    /// Number of data shards (k)
    data_shards: usize,
    /// Number of parity shards (m)
    parity_shards: usize,
    /// Full `(k + m) x k` encoding matrix; top `k` rows are the identity
    matrix: Matrix,
    /// Inverted decode matrices keyed by the surviving rows they were built from
    inversion_cache: DashMap<Vec<usize>, Arc<Matrix>>,
}

impl std::fmt::Debug for SystematicCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SystematicCodec")
            .field("data_shards", &self.data_shards)
            .field("parity_shards", &self.parity_shards)
            .field("cached_inversions", &self.inversion_cache.len())
            .finish()
    }
}

impl SystematicCodec {
    /// Create a codec for `data_shards + parity_shards`.
    ///
    /// # Errors
    ///
    /// `InvalidEcConfig` if either count is zero or the total exceeds the
    /// 256 distinct evaluation points GF(2^8) offers.
    pub fn new(data_shards: usize, parity_shards: usize) -> Result<Self> {
        if data_shards == 0 {
            return Err(Error::InvalidEcConfig(
                "data_shards must be greater than 0".to_string(),
            ));
        }
        if parity_shards == 0 {
            return Err(Error::InvalidEcConfig(
                "parity_shards must be greater than 0".to_string(),
            ));
        }
        let total = data_shards + parity_shards;
        if total > 256 {
            return Err(Error::InvalidEcConfig(format!(
                "total shards (k + m) must be <= 256 for GF(2^8), got {}",
                total
            )));
        }

        let vandermonde = Matrix::vandermonde(total, data_shards);
        let top = vandermonde.submatrix(0, 0, data_shards, data_shards);
        let matrix = vandermonde.multiply(&top.invert()?)?;

        Ok(Self {
            data_shards,
            parity_shards,
            matrix,
            inversion_cache: DashMap::new(),
        })
    }

    /// The full encoding matrix
    pub fn encode_matrix(&self) -> &Matrix {
        &self.matrix
    }

    /// Number of distinct survivor sets whose inverse is cached
    pub fn cached_inversions(&self) -> usize {
        self.inversion_cache.len()
    }

    fn decode_matrix(&self, rows: &[usize]) -> Result<Arc<Matrix>> {
        if let Some(cached) = self.inversion_cache.get(rows) {
            return Ok(Arc::clone(cached.value()));
        }

        let inverted = self.matrix.select_rows(rows).invert().map_err(|e| {
            error!("Decode matrix for rows {:?} is not invertible: {}", rows, e);
            Error::SingularMatrix {
                rows: rows.to_vec(),
            }
        })?;
        let inverted = Arc::new(inverted);
        self.inversion_cache
            .insert(rows.to_vec(), Arc::clone(&inverted));
        Ok(inverted)
    }

    fn parity_row(&self, parity_index: usize, data: &[&[u8]], shard_len: usize) -> Vec<u8> {
        let row = self.data_shards + parity_index;
        let mut out = vec![0u8; shard_len];
        for (c, shard) in data.iter().enumerate() {
            galois::mul_slice_xor(self.matrix.get(row, c), shard, &mut out);
        }
        out
    }
}

/// Checks that every present shard has the same length and returns it.
pub(crate) fn uniform_shard_len<'a, I>(shards: I) -> Result<Option<usize>>
where
    I: IntoIterator<Item = (usize, &'a [u8])>,
{
    let mut expected: Option<usize> = None;
    for (index, shard) in shards {
        match expected {
            None => expected = Some(shard.len()),
            Some(len) if len != shard.len() => {
                return Err(Error::ShardSizeMismatch {
                    index,
                    expected: len,
                    actual: shard.len(),
                });
            }
            Some(_) => {}
        }
    }
    Ok(expected)
}

impl ErasureCodec for SystematicCodec {
    fn data_shards(&self) -> usize {
        self.data_shards
    }

    fn parity_shards(&self) -> usize {
        self.parity_shards
    }

    #[instrument(skip(self, data), fields(data_shards = data.len()))]
    fn generate_parity(&self, data: &[Vec<u8>]) -> Result<Vec<Vec<u8>>> {
        if data.len() != self.data_shards {
            return Err(Error::InvalidEcConfig(format!(
                "Expected {} data shards, got {}",
                self.data_shards,
                data.len()
            )));
        }

        let shard_len =
            uniform_shard_len(data.iter().enumerate().map(|(i, s)| (i, s.as_slice())))?
                .unwrap_or(0);
        let refs: Vec<&[u8]> = data.iter().map(|s| s.as_slice()).collect();

        Ok((0..self.parity_shards)
            .map(|p| self.parity_row(p, &refs, shard_len))
            .collect())
    }

    #[instrument(skip(self, shards))]
    fn reconstruct(&self, shards: &mut [Option<Vec<u8>>]) -> Result<()> {
        let total = self.total_shards();
        if shards.len() != total {
            return Err(Error::InvalidEcConfig(format!(
                "Expected {} shards, got {}",
                total,
                shards.len()
            )));
        }

        let present: Vec<usize> = (0..total).filter(|&i| shards[i].is_some()).collect();
        if present.len() < self.data_shards {
            return Err(Error::InsufficientShards {
                available: present.len(),
                required: self.data_shards,
            });
        }
        let shard_len = uniform_shard_len(
            shards
                .iter()
                .enumerate()
                .filter_map(|(i, s)| s.as_deref().map(|s| (i, s))),
        )?
        .unwrap_or(0);

        if present.len() == total {
            return Ok(());
        }

        // Recover missing data shards from the first k survivors
        let missing_data: Vec<usize> = (0..self.data_shards)
            .filter(|&i| shards[i].is_none())
            .collect();
        if !missing_data.is_empty() {
            let rows = &present[..self.data_shards];
            let decode = self.decode_matrix(rows)?;

            let mut recovered = Vec::with_capacity(missing_data.len());
            for &i in &missing_data {
                let mut out = vec![0u8; shard_len];
                for (j, &r) in rows.iter().enumerate() {
                    if let Some(input) = shards[r].as_deref() {
                        galois::mul_slice_xor(decode.get(i, j), input, &mut out);
                    }
                }
                recovered.push(out);
            }
            for (i, shard) in missing_data.iter().zip(recovered) {
                shards[*i] = Some(shard);
            }
        }

        // Regenerate missing parity from the now-complete data
        let missing_parity: Vec<usize> = (self.data_shards..total)
            .filter(|&i| shards[i].is_none())
            .collect();
        if !missing_parity.is_empty() {
            let regenerated: Vec<Vec<u8>> = {
                let data: Vec<&[u8]> = shards[..self.data_shards]
                    .iter()
                    .map(|s| s.as_deref().unwrap_or(&[]))
                    .collect();
                missing_parity
                    .iter()
                    .map(|&i| self.parity_row(i - self.data_shards, &data, shard_len))
                    .collect()
            };
            for (i, shard) in missing_parity.iter().zip(regenerated) {
                shards[*i] = Some(shard);
            }
        }

        debug!(
            "Reconstructed {} data and {} parity shards from {}/{} available",
            missing_data.len(),
            missing_parity.len(),
            present.len(),
            total
        );

        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn sample_data(shard_len: usize) -> Vec<Vec<u8>> {
        (0..4)
            .map(|i| (0..shard_len).map(|b| (b * 7 + i * 31) as u8).collect())
            .collect()
    }

    fn full_shards(codec: &SystematicCodec, data: &[Vec<u8>]) -> Vec<Option<Vec<u8>>> {
        let parity = codec.generate_parity(data).unwrap();
        data.iter().cloned().chain(parity).map(Some).collect()
    }

    #[test]
    fn test_codec_creation() {
        let codec = SystematicCodec::new(4, 3).unwrap();
        assert_eq!(codec.data_shards(), 4);
        assert_eq!(codec.parity_shards(), 3);
        assert_eq!(codec.total_shards(), 7);
    }

    #[test]
    fn test_invalid_configuration() {
        assert_matches!(SystematicCodec::new(0, 3), Err(Error::InvalidEcConfig(_)));
        assert_matches!(SystematicCodec::new(4, 0), Err(Error::InvalidEcConfig(_)));
        assert_matches!(SystematicCodec::new(200, 100), Err(Error::InvalidEcConfig(_)));
    }

    #[test]
    fn test_matrix_is_systematic() {
        let codec = SystematicCodec::new(4, 3).unwrap();
        let top = codec.encode_matrix().submatrix(0, 0, 4, 4);
        assert_eq!(top, Matrix::identity(4));
    }

    #[test]
    fn test_parity_deterministic() {
        let codec = SystematicCodec::new(4, 3).unwrap();
        let data = sample_data(64);
        let a = codec.generate_parity(&data).unwrap();
        let b = codec.generate_parity(&data).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 3);
        assert!(a.iter().all(|p| p.len() == 64));
    }

    #[test]
    fn test_generate_parity_rejects_ragged_data() {
        let codec = SystematicCodec::new(4, 3).unwrap();
        let mut data = sample_data(16);
        data[2].push(0);
        assert_matches!(
            codec.generate_parity(&data),
            Err(Error::ShardSizeMismatch { index: 2, expected: 16, actual: 17 })
        );
    }

    #[test]
    fn test_generate_parity_wrong_count() {
        let codec = SystematicCodec::new(4, 3).unwrap();
        let data = sample_data(8)[..3].to_vec();
        assert_matches!(codec.generate_parity(&data), Err(Error::InvalidEcConfig(_)));
    }

    #[test]
    fn test_reconstruct_every_three_shard_loss() {
        let codec = SystematicCodec::new(4, 3).unwrap();
        let data = sample_data(33);
        let original = full_shards(&codec, &data);

        for a in 0..7 {
            for b in (a + 1)..7 {
                for c in (b + 1)..7 {
                    let mut shards = original.clone();
                    shards[a] = None;
                    shards[b] = None;
                    shards[c] = None;
                    codec.reconstruct(&mut shards).unwrap();
                    assert_eq!(shards, original, "lost {},{},{}", a, b, c);
                }
            }
        }
    }

    #[test]
    fn test_reconstruct_parity_only() {
        let codec = SystematicCodec::new(4, 3).unwrap();
        let original = full_shards(&codec, &sample_data(10));
        let mut shards = original.clone();
        shards[4] = None;
        shards[6] = None;
        codec.reconstruct(&mut shards).unwrap();
        assert_eq!(shards, original);
        // no inversion needed when data shards survive
        assert_eq!(codec.cached_inversions(), 0);
    }

    #[test]
    fn test_reconstruct_insufficient() {
        let codec = SystematicCodec::new(4, 3).unwrap();
        let mut shards = full_shards(&codec, &sample_data(10));
        for s in shards.iter_mut().take(4) {
            *s = None;
        }
        assert_matches!(
            codec.reconstruct(&mut shards),
            Err(Error::InsufficientShards { available: 3, required: 4 })
        );
    }

    #[test]
    fn test_reconstruct_size_mismatch() {
        let codec = SystematicCodec::new(4, 3).unwrap();
        let mut shards = full_shards(&codec, &sample_data(10));
        shards[0] = None;
        shards[5] = Some(vec![0u8; 11]);
        assert_matches!(
            codec.reconstruct(&mut shards),
            Err(Error::ShardSizeMismatch { index: 5, .. })
        );
    }

    #[test]
    fn test_inversion_cache_reused() {
        let codec = SystematicCodec::new(4, 3).unwrap();
        let original = full_shards(&codec, &sample_data(12));

        for _ in 0..3 {
            let mut shards = original.clone();
            shards[1] = None;
            codec.reconstruct(&mut shards).unwrap();
            assert_eq!(shards, original);
        }
        assert_eq!(codec.cached_inversions(), 1);
    }
}
