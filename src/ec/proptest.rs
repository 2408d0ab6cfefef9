//! Property-Based Tests for Record Sharding
//!
//! Uses proptest to verify the shard codec across generated records and
//! every possible survivor set.
//!
//! # Test Properties
//!
//! 1. **Roundtrip Correctness**: decode(encode(r), all present) = r
//! 2. **Any 4 of 7**: every survivor set of size >= 4 reconstructs r
//! 3. **Erasure Limit**: fewer than 4 survivors is always `InsufficientShards`
//! 4. **Determinism**: encoding twice yields byte-identical shards

#![cfg(test)]

use std::sync::Arc;

use bytes::Bytes;
use proptest::prelude::*;

use super::codec::SystematicCodec;
use super::shard_codec::{shard_len_for, ShardCodec, TOTAL_SHARDS};
use crate::adapters::ReedSolomonCodecAdapter;
use crate::domain::ports::ErasureCodec;
use crate::domain::record::Record;
use crate::error::Error;

// =============================================================================
// Property Strategies
// =============================================================================

/// Finite readings only; JSON has no representation for NaN or infinity.
fn reading_strategy() -> impl Strategy<Value = f64> {
    prop_oneof![
        -1.0e6f64..1.0e6f64,
        -1.0f64..1.0f64,
        Just(0.0f64),
    ]
}

fn record_strategy() -> impl Strategy<Value = Record> {
    (
        "[a-zA-Z0-9-]{1,40}",
        reading_strategy(),
        reading_strategy(),
        reading_strategy(),
        0u64..1_000_000,
        prop::option::of("[ -~]{0,64}"),
    )
        .prop_map(
            |(id, seismic_activity, temperature_c, radiation_level, modification_count, name)| {
                Record {
                    id,
                    seismic_activity,
                    temperature_c,
                    radiation_level,
                    modification_count,
                    name,
                }
            },
        )
}

/// Bitmask over the 7 shard slots; bit i set means slot i survives.
fn survivor_mask_strategy() -> impl Strategy<Value = u8> {
    0u8..(1 << TOTAL_SHARDS)
}

fn apply_mask(shards: &[Bytes], mask: u8) -> Vec<Option<Bytes>> {
    shards
        .iter()
        .enumerate()
        .map(|(i, s)| if mask & (1 << i) != 0 { Some(s.clone()) } else { None })
        .collect()
}

// =============================================================================
// Roundtrip Properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Property: Encoding then decoding without any losses returns the original record.
    #[test]
    fn prop_roundtrip_no_loss(record in record_strategy()) {
        let codec = ShardCodec::native()?;
        let shards = codec.encode(&record)?;
        prop_assert_eq!(shards.len(), TOTAL_SHARDS);

        let recovered = codec.decode(&apply_mask(&shards, 0x7F))?;
        prop_assert_eq!(recovered, record);
    }

    /// Property: Every survivor set decides the outcome by its size alone.
    #[test]
    fn prop_any_survivor_set(
        record in record_strategy(),
        mask in survivor_mask_strategy(),
    ) {
        let codec = ShardCodec::native()?;
        let shards = codec.encode(&record)?;
        let slots = apply_mask(&shards, mask);
        let survivors = mask.count_ones() as usize;

        match codec.decode(&slots) {
            Ok(recovered) => {
                prop_assert!(survivors >= 4, "decoded from only {} shards", survivors);
                prop_assert_eq!(recovered, record);
            }
            Err(Error::InsufficientShards { available, required }) => {
                prop_assert!(survivors < 4);
                prop_assert_eq!(available, survivors);
                prop_assert_eq!(required, 4);
            }
            Err(other) => {
                prop_assert!(false, "unexpected error {:?} for mask {:07b}", other, mask);
            }
        }
    }

    /// Property: Shards are uniform and sized from the serialized payload.
    #[test]
    fn prop_shard_size(record in record_strategy()) {
        let codec = ShardCodec::native()?;
        let payload_len = record.to_bytes()?.len();
        let shards = codec.encode(&record)?;
        let expected = shard_len_for(payload_len);
        for shard in &shards {
            prop_assert_eq!(shard.len(), expected);
        }
    }
}

// =============================================================================
// Determinism Properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(30))]

    /// Property: Encoding is deterministic.
    #[test]
    fn prop_encoding_deterministic(record in record_strategy()) {
        let codec = ShardCodec::native()?;
        let shards1 = codec.encode(&record)?;
        let shards2 = codec.encode(&record)?;
        prop_assert_eq!(shards1, shards2, "Encoding should be deterministic");
    }

    /// Property: The native codec and the reed-solomon-erasure adapter agree
    /// byte for byte, so shards written by one decode with the other.
    #[test]
    fn prop_native_matches_reference(
        data in prop::collection::vec(prop::collection::vec(any::<u8>(), 32), 4),
    ) {
        let native = SystematicCodec::new(4, 3)?;
        let reference = ReedSolomonCodecAdapter::new(4, 3)?;
        prop_assert_eq!(native.generate_parity(&data)?, reference.generate_parity(&data)?);
    }

    /// Property: Payload bytes survive any three losses through either codec.
    #[test]
    fn prop_cross_codec_decode(
        payload in prop::collection::vec(any::<u8>(), 0..2000),
        lost in prop::sample::subsequence((0..TOTAL_SHARDS).collect::<Vec<_>>(), 3),
    ) {
        let native = ShardCodec::native()?;
        let reference = ShardCodec::new(Arc::new(ReedSolomonCodecAdapter::new(4, 3)?))?;

        let mut slots: Vec<Option<Vec<u8>>> =
            native.encode_bytes(&payload)?.into_iter().map(Some).collect();
        for &i in &lost {
            slots[i] = None;
        }

        prop_assert_eq!(reference.decode_bytes(&slots)?, payload);
    }
}
