//! Property-based tests (fuzzing) for codec resilience.
//!
//! Uses proptest to generate random/malformed payloads and verify the
//! codec never panics, only returns clean errors, and that every
//! loader-producible value survives an encode/decode round-trip.
//!
//! Run with: `cargo test --test proptest_fuzz`

use proptest::prelude::*;
use serde_json::Value;

use tiercache::codec;

// =============================================================================
// Strategies for generating test data
// =============================================================================

/// Generate arbitrary JSON values (the shape of loader results)
fn arbitrary_json_strategy() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(|n| Value::Number(n.into())),
        ".*".prop_map(Value::String),
    ];

    leaf.prop_recursive(
        4,   // depth
        64,  // max nodes
        10,  // items per collection
        |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..10)
                    .prop_map(Value::Array),
                prop::collection::hash_map(".*", inner, 0..10)
                    .prop_map(|m| Value::Object(m.into_iter().collect())),
            ]
        },
    )
}

// =============================================================================
// Decode Fuzz Tests
// =============================================================================

proptest! {
    /// Decode should never panic on arbitrary bytes
    #[test]
    fn fuzz_decode_random_bytes(bytes in prop::collection::vec(any::<u8>(), 0..10000)) {
        // Should never panic, only return Err (or Ok if the bytes happen
        // to be valid JSON)
        let result: Result<Value, _> = codec::decode(&bytes);
        let _ = result;

        // The marker check must also hold for arbitrary input
        let _ = codec::is_null_marker(&bytes);
        let _ = codec::is_compressed(&bytes);
    }

    /// Bytes that carry the gzip magic but garbage after it go through the
    /// decompression path without panicking
    #[test]
    fn fuzz_decode_fake_gzip_framing(tail in prop::collection::vec(any::<u8>(), 0..1000)) {
        let mut bytes = vec![0x1f, 0x8b];
        bytes.extend(tail);

        prop_assert!(codec::is_compressed(&bytes));
        // Truncated/garbage streams error cleanly, never panic
        let result: Result<Value, _> = codec::decode(&bytes);
        let _ = result;
    }

    /// A valid payload with injected corruption should fail gracefully
    #[test]
    fn fuzz_corrupted_payload(
        value in arbitrary_json_strategy(),
        compress in any::<bool>(),
        corruption in prop::collection::vec(any::<u8>(), 1..50),
        position in 0usize..10000,
    ) {
        let encoded = codec::encode(&value, compress, 0).unwrap();
        prop_assume!(!encoded.is_empty());

        let mut corrupted = encoded.clone();
        let pos = position % corrupted.len();

        // Inject corruption
        for (i, b) in corruption.iter().enumerate() {
            let idx = (pos + i) % corrupted.len();
            corrupted[idx] ^= b; // XOR to corrupt
        }

        // Should never panic; XOR with zero bytes may leave the payload
        // intact, so Ok is also acceptable
        let result: Result<Value, _> = codec::decode(&corrupted);
        let _ = result;
    }
}

// =============================================================================
// Round-Trip Invariant Tests
// =============================================================================

proptest! {
    /// decode(encode(v)) == v for every loader-producible value
    #[test]
    fn prop_roundtrip_uncompressed(value in arbitrary_json_strategy()) {
        let encoded = codec::encode(&value, false, 1024).unwrap();
        let decoded: Value = codec::decode(&encoded).unwrap();
        prop_assert_eq!(decoded, value);
    }

    /// The round-trip also holds through the gzip framing
    #[test]
    fn prop_roundtrip_compressed(value in arbitrary_json_strategy()) {
        // Threshold zero forces framing for every payload
        let encoded = codec::encode(&value, true, 0).unwrap();
        prop_assert!(codec::is_compressed(&encoded));

        let decoded: Value = codec::decode(&encoded).unwrap();
        prop_assert_eq!(decoded, value);
    }

    /// Encode never emits the reserved null marker, whatever the value
    #[test]
    fn prop_encode_disjoint_from_null_marker(
        value in arbitrary_json_strategy(),
        compress in any::<bool>(),
        threshold in 0usize..4096,
    ) {
        let encoded = codec::encode(&value, compress, threshold).unwrap();
        prop_assert!(!codec::is_null_marker(&encoded));
    }

    /// The compression threshold is honored exactly
    #[test]
    fn prop_threshold_gates_framing(value in arbitrary_json_strategy()) {
        let plain = codec::encode(&value, false, 0).unwrap();

        // Threshold just past the payload: stays plain
        let at_most = codec::encode(&value, true, plain.len() + 1).unwrap();
        prop_assert!(!codec::is_compressed(&at_most));

        // Threshold at the payload length: framed
        let at_least = codec::encode(&value, true, plain.len()).unwrap();
        prop_assert!(codec::is_compressed(&at_least));
    }
}
