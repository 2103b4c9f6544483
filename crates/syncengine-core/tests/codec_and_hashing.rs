// crates/syncengine-core/tests/codec_and_hashing.rs
// ============================================================================
// Integration tests: canonical codec and content-addressed hashing.
// ============================================================================

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only output and panic-based assertions are permitted."
)]

use std::collections::BTreeMap;

use proptest::prelude::*;
use syncengine_core::Value;
use syncengine_core::codec;
use syncengine_core::hashing;

fn arb_value() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::Int),
        ".*".prop_map(Value::String),
    ];
    leaf.prop_recursive(4, 64, 8, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
            prop::collection::btree_map("[a-z]{1,6}", inner, 0..4).prop_map(Value::Object),
        ]
    })
}

proptest! {
    #[test]
    fn round_trip_preserves_any_value(value in arb_value()) {
        let bytes = codec::encode(&value).unwrap();
        let decoded = codec::decode(&bytes).unwrap();
        prop_assert_eq!(value, decoded);
    }

    #[test]
    fn encoding_is_deterministic(value in arb_value()) {
        let first = codec::encode(&value).unwrap();
        let second = codec::encode(&value).unwrap();
        prop_assert_eq!(first, second);
    }
}

#[test]
fn binding_hash_is_independent_of_object_construction_order() {
    let mut a = BTreeMap::new();
    a.insert("cart_id".to_string(), Value::String("c1".to_string()));
    a.insert("item_id".to_string(), Value::String("A".to_string()));
    let mut b = BTreeMap::new();
    b.insert("item_id".to_string(), Value::String("A".to_string()));
    b.insert("cart_id".to_string(), Value::String("c1".to_string()));

    let hash_a = hashing::domain_hash(hashing::BINDING_DOMAIN, &Value::Object(a)).unwrap();
    let hash_b = hashing::domain_hash(hashing::BINDING_DOMAIN, &Value::Object(b)).unwrap();
    assert_eq!(hash_a, hash_b);
}

#[test]
fn nested_float_is_rejected_even_deep_in_a_tree() {
    let bytes = br#"{"a":[1,2,{"b":3.5}]}"#;
    let err = codec::decode(bytes).unwrap_err();
    assert!(matches!(err, syncengine_core::CodecError::FloatForbidden));
}
