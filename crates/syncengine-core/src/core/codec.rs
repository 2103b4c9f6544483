// crates/syncengine-core/src/core/codec.rs
// ============================================================================
// Module: Canonical Codec
// Description: RFC 8785 canonical JSON encode/decode for IR values.
// Purpose: Guarantee that identical logical values always produce identical
//          bytes, and that floating-point values never survive a round trip.
// Dependencies: crate::core::value, serde, serde_jcs, serde_json
// ============================================================================

//! ## Overview
//! Canonicalization is the bedrock of idempotency: [`crate::core::hashing`]
//! hashes the bytes this module produces, and two logically equal values must
//! always canonicalize to the same bytes regardless of how they were built
//! (map insertion order, float-vs-int literal spelling, and so on). Decoding
//! rejects any JSON number containing `.`, `e`, or `E` with
//! [`CodecError::FloatForbidden`] rather than silently truncating it into an
//! integer.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Number;
use thiserror::Error;

use crate::core::value::Value;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised while canonically encoding or decoding IR values.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The input contained a JSON number with a fractional or exponent part.
    #[error("floating-point values are forbidden in the IR value universe")]
    FloatForbidden,
    /// The input contained an integer outside the signed 64-bit range.
    #[error("integer literal out of signed 64-bit range")]
    IntegerOutOfRange,
    /// The input bytes were not valid JSON.
    #[error("invalid json: {0}")]
    InvalidJson(String),
    /// Serialization of a value to canonical JSON failed.
    #[error("failed to canonicalize json: {0}")]
    Canonicalization(String),
}

// ============================================================================
// SECTION: Encode
// ============================================================================

/// Encodes a value as RFC 8785 canonical JSON bytes.
///
/// Object keys are sorted lexicographically by UTF-16 code unit, there is no
/// insignificant whitespace, and integers are emitted without an exponent.
///
/// # Errors
///
/// Returns [`CodecError::Canonicalization`] if the value cannot be
/// serialized (this should not happen for well-formed [`Value`] trees).
pub fn encode(value: &Value) -> Result<Vec<u8>, CodecError> {
    encode_serializable(value)
}

/// Encodes any serializable value as RFC 8785 canonical JSON bytes.
///
/// This is the generic counterpart of [`encode`] for internal bookkeeping
/// structs (schema fingerprints, test golden vectors) that are not
/// themselves [`Value`] trees. It must never be used to encode persisted
/// domain rows — those go through [`encode`] so the float-rejection
/// invariant is enforced on the IR boundary, not merely on this helper.
///
/// # Errors
///
/// Returns [`CodecError::Canonicalization`] if serialization fails.
pub fn encode_serializable<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, CodecError> {
    serde_jcs::to_vec(value).map_err(|err| CodecError::Canonicalization(err.to_string()))
}

// ============================================================================
// SECTION: Decode
// ============================================================================

/// Decodes RFC 8785-compatible JSON bytes into a value.
///
/// Integers are parsed with arbitrary-precision-safe handling (never routed
/// through `f64`) so values beyond 2^53 survive the round trip intact. Any
/// JSON number written with a `.`, `e`, or `E` fails with
/// [`CodecError::FloatForbidden`], even if its value happens to be integral
/// (e.g. `1.0`).
///
/// # Errors
///
/// Returns [`CodecError::InvalidJson`] on malformed input,
/// [`CodecError::FloatForbidden`] on any float literal, and
/// [`CodecError::IntegerOutOfRange`] on integers outside `i64`.
pub fn decode(bytes: &[u8]) -> Result<Value, CodecError> {
    let raw: serde_json::Value =
        serde_json::from_slice(bytes).map_err(|err| CodecError::InvalidJson(err.to_string()))?;
    from_json(raw)
}

/// Converts a `serde_json::Value` into an IR [`Value`], rejecting floats.
fn from_json(raw: serde_json::Value) -> Result<Value, CodecError> {
    match raw {
        serde_json::Value::Null => Ok(Value::Null),
        serde_json::Value::Bool(flag) => Ok(Value::Bool(flag)),
        serde_json::Value::Number(number) => Ok(Value::Int(decode_int(&number)?)),
        serde_json::Value::String(text) => Ok(Value::String(text)),
        serde_json::Value::Array(items) => {
            let mut decoded = Vec::with_capacity(items.len());
            for item in items {
                decoded.push(from_json(item)?);
            }
            Ok(Value::Array(decoded))
        }
        serde_json::Value::Object(fields) => {
            let mut decoded = BTreeMap::new();
            for (key, value) in fields {
                decoded.insert(key, from_json(value)?);
            }
            Ok(Value::Object(decoded))
        }
    }
}

/// Decodes a JSON number as a signed 64-bit integer, rejecting any float.
fn decode_int(number: &Number) -> Result<i64, CodecError> {
    if let Some(value) = number.as_i64() {
        return Ok(value);
    }
    if let Some(value) = number.as_u64() {
        return i64::try_from(value).map_err(|_| CodecError::IntegerOutOfRange);
    }
    Err(CodecError::FloatForbidden)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic, reason = "Test-only panic-based assertions are permitted.")]
    use super::*;

    #[test]
    fn float_literal_is_rejected() {
        let err = decode(b"1.0").unwrap_err();
        assert!(matches!(err, CodecError::FloatForbidden));
    }

    #[test]
    fn exponent_literal_is_rejected() {
        let err = decode(b"1e3").unwrap_err();
        assert!(matches!(err, CodecError::FloatForbidden));
    }

    #[test]
    fn large_integer_round_trips_beyond_2_53() {
        let value = decode(b"9007199254740993").unwrap();
        assert_eq!(value, Value::Int(9_007_199_254_740_993));
    }

    #[test]
    fn key_order_does_not_affect_encoding() {
        let mut a = BTreeMap::new();
        a.insert("b".to_string(), Value::Int(2));
        a.insert("a".to_string(), Value::Int(1));
        let mut b = BTreeMap::new();
        b.insert("a".to_string(), Value::Int(1));
        b.insert("b".to_string(), Value::Int(2));
        let encoded_a = encode(&Value::Object(a)).unwrap();
        let encoded_b = encode(&Value::Object(b)).unwrap();
        assert_eq!(encoded_a, encoded_b);
        assert_eq!(encoded_a, br#"{"a":1,"b":2}"#);
    }

    #[test]
    fn round_trip_preserves_value() {
        let mut fields = BTreeMap::new();
        fields.insert("ok".to_string(), Value::Bool(true));
        fields.insert("items".to_string(), Value::Array(vec![Value::Int(1), Value::Null]));
        let original = Value::Object(fields);
        let bytes = encode(&original).unwrap();
        let decoded = decode(&bytes).unwrap();
        assert_eq!(original, decoded);
    }
}
