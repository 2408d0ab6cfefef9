//! EC Integration Tests
//!
//! End-to-end tests for record sharding through the public API.

use std::sync::Arc;

use bytes::Bytes;
use ecvault::adapters::ReedSolomonCodecAdapter;
use ecvault::ec::{shard_len_for, ShardCodec, SystematicCodec, TOTAL_SHARDS};
use ecvault::{CodecKind, Error, Record};

fn sensor_record() -> Record {
    Record::new("loc-1", 1.2, 20.5, 0.003)
}

fn as_slots(shards: &[Bytes]) -> Vec<Option<Bytes>> {
    shards.iter().cloned().map(Some).collect()
}

// =============================================================================
// Record Pipeline Tests
// =============================================================================

#[test]
fn test_encode_decode_full_pipeline() {
    let codec = ShardCodec::native().expect("Failed to create codec");
    let record = sensor_record();
    let payload_len = record.to_bytes().expect("Failed to serialize").len();

    let shards = codec.encode(&record).expect("Failed to encode");
    assert_eq!(shards.len(), TOTAL_SHARDS);

    // every shard has the same length L
    let shard_len = shard_len_for(payload_len);
    assert!(shards.iter().all(|s| s.len() == shard_len));

    let recovered = codec.decode(&as_slots(&shards)).expect("Failed to decode");
    assert_eq!(recovered, record);
    assert_eq!(recovered.modification_count, 0);
}

#[test]
fn test_decode_with_two_shards_lost() {
    let codec = ShardCodec::native().expect("Failed to create codec");
    let record = sensor_record();

    let mut slots = as_slots(&codec.encode(&record).expect("Failed to encode"));
    slots[2] = None;
    slots[5] = None;

    let recovered = codec.decode(&slots).expect("Failed to decode with loss");
    assert_eq!(recovered, record);
}

#[test]
fn test_decode_without_any_data_shard_fails() {
    let codec = ShardCodec::native().expect("Failed to create codec");

    let mut slots = as_slots(&codec.encode(&sensor_record()).expect("Failed to encode"));
    for slot in slots.iter_mut().take(4) {
        *slot = None;
    }

    let result = codec.decode(&slots);
    assert!(matches!(
        result,
        Err(Error::InsufficientShards {
            available: 3,
            required: 4
        })
    ));
}

#[test]
fn test_decode_from_parity_and_one_data_shard() {
    let codec = ShardCodec::native().expect("Failed to create codec");
    let record = sensor_record().with_name("north ridge");

    let mut slots = as_slots(&codec.encode(&record).expect("Failed to encode"));
    slots[0] = None;
    slots[1] = None;
    slots[3] = None;

    assert_eq!(codec.decode(&slots).expect("Failed to decode"), record);
}

// =============================================================================
// Codec Interoperability Tests
// =============================================================================

#[test]
fn test_codecs_produce_identical_shards() {
    let native = CodecKind::Native.build().expect("Failed to build native codec");
    let reference = CodecKind::ReedSolomon
        .build()
        .expect("Failed to build reed-solomon codec");
    let record = sensor_record();

    assert_eq!(
        native.encode(&record).expect("native encode"),
        reference.encode(&record).expect("reference encode")
    );
}

#[test]
fn test_shards_decode_with_other_codec() {
    let native = ShardCodec::new(Arc::new(
        SystematicCodec::new(4, 3).expect("Failed to create native codec"),
    ))
    .expect("Failed to wrap native codec");
    let reference = ShardCodec::new(Arc::new(
        ReedSolomonCodecAdapter::new(4, 3).expect("Failed to create adapter"),
    ))
    .expect("Failed to wrap adapter");

    let record = Record::new("loc-77", -3.25, 101.0, 42.0);
    let mut slots = as_slots(&native.encode(&record).expect("Failed to encode"));
    slots[1] = None;
    slots[4] = None;
    slots[6] = None;

    assert_eq!(reference.decode(&slots).expect("Failed to decode"), record);
}

#[test]
fn test_large_record() {
    let codec = ShardCodec::native().expect("Failed to create codec");
    let record = sensor_record().with_name("x".repeat(64 * 1024));

    let mut slots = as_slots(&codec.encode(&record).expect("Failed to encode"));
    slots[0] = None;
    slots[6] = None;

    assert_eq!(codec.decode(&slots).expect("Failed to decode"), record);
}

#[test]
fn test_inconsistent_shard_lengths_rejected() {
    let codec = ShardCodec::native().expect("Failed to create codec");
    let first = codec.encode(&sensor_record()).expect("Failed to encode");
    let longer = codec
        .encode(&sensor_record().with_name("a much longer name than before"))
        .expect("Failed to encode");

    // one shard from a different version of the record
    let mut slots = as_slots(&first);
    slots[3] = Some(longer[3].clone());

    assert!(matches!(
        codec.decode(&slots),
        Err(Error::ShardSizeMismatch { .. })
    ));
}
