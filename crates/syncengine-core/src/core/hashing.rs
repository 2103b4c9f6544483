// crates/syncengine-core/src/core/hashing.rs
// ============================================================================
// Module: Content-Addressed Hashing
// Description: SHA-256 domain-separated identifiers for invocations,
//              completions, and bindings.
// Purpose: Make identical logical inputs hash identically, the bedrock of
//          write idempotency.
// Dependencies: crate::core::{codec, value}, serde, sha2
// ============================================================================

//! ## Overview
//! Every content-addressed identifier in the engine is a hex-encoded SHA-256
//! digest over a domain-separated canonical encoding of its inputs. The
//! domain tag is prepended to the canonical JSON bytes before hashing, so an
//! invocation and a completion that happen to canonicalize to the same JSON
//! bytes never collide on identifier.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Serialize;
use sha2::Digest;
use sha2::Sha256;
use thiserror::Error;

use crate::core::codec;
use crate::core::codec::CodecError;
use crate::core::value::Value;

// ============================================================================
// SECTION: Domain Separation Tags
// ============================================================================

/// Domain tag for invocation identifier hashing.
pub const INVOCATION_DOMAIN: &str = "syncengine/invocation/v1";
/// Domain tag for completion identifier hashing.
pub const COMPLETION_DOMAIN: &str = "syncengine/completion/v1";
/// Domain tag for binding hash hashing.
pub const BINDING_DOMAIN: &str = "syncengine/binding/v1";

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised while computing content hashes.
#[derive(Debug, Error)]
pub enum HashError {
    /// Canonical encoding of the hash input failed.
    #[error("failed to canonicalize hash input: {0}")]
    Canonicalization(#[from] CodecError),
}

// ============================================================================
// SECTION: Hashing
// ============================================================================

/// Computes a domain-separated SHA-256 digest over a canonical IR value,
/// returned as a lowercase hex string.
///
/// # Errors
///
/// Returns [`HashError`] if the value cannot be canonically encoded.
pub fn domain_hash(domain: &str, value: &Value) -> Result<String, HashError> {
    let canonical = codec::encode(value)?;
    let mut hasher = Sha256::new();
    hasher.update(domain.as_bytes());
    hasher.update(b"\0");
    hasher.update(&canonical);
    Ok(hex_encode(&hasher.finalize()))
}

/// Computes the canonical hash of any serializable value, for internal
/// bookkeeping (schema fingerprints, golden test vectors) that is not a
/// persisted [`Value`] tree. Never use this to derive a persisted domain
/// identifier — use [`domain_hash`] over an explicit [`Value`] instead, so
/// float rejection happens on the IR boundary rather than this helper.
///
/// # Errors
///
/// Returns [`HashError`] if the value cannot be serialized.
pub fn hash_canonical_json<T: Serialize + ?Sized>(value: &T) -> Result<String, HashError> {
    let canonical = codec::encode_serializable(value).map_err(HashError::Canonicalization)?;
    let mut hasher = Sha256::new();
    hasher.update(&canonical);
    Ok(hex_encode(&hasher.finalize()))
}

/// Encodes bytes as a lowercase hex string.
fn hex_encode(bytes: &[u8]) -> String {
    const HEX: &[u8; 16] = b"0123456789abcdef";
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        out.push(HEX[(byte >> 4) as usize] as char);
        out.push(HEX[(byte & 0x0f) as usize] as char);
    }
    out
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic, reason = "Test-only panic-based assertions are permitted.")]
    use std::collections::BTreeMap;

    use super::*;

    fn obj(pairs: &[(&str, Value)]) -> Value {
        let mut map = BTreeMap::new();
        for (key, value) in pairs {
            map.insert((*key).to_string(), value.clone());
        }
        Value::Object(map)
    }

    #[test]
    fn identical_logical_inputs_hash_identically() {
        let a = obj(&[("x", Value::Int(1)), ("y", Value::Int(2))]);
        let b = obj(&[("y", Value::Int(2)), ("x", Value::Int(1))]);
        assert_eq!(
            domain_hash(BINDING_DOMAIN, &a).unwrap(),
            domain_hash(BINDING_DOMAIN, &b).unwrap()
        );
    }

    #[test]
    fn different_domains_never_collide_on_same_value() {
        let value = obj(&[("x", Value::Int(1))]);
        let invocation = domain_hash(INVOCATION_DOMAIN, &value).unwrap();
        let completion = domain_hash(COMPLETION_DOMAIN, &value).unwrap();
        assert_ne!(invocation, completion);
    }

    #[test]
    fn distinct_values_hash_with_overwhelming_probability_distinctly() {
        let a = obj(&[("x", Value::Int(1))]);
        let b = obj(&[("x", Value::Int(2))]);
        assert_ne!(domain_hash(BINDING_DOMAIN, &a).unwrap(), domain_hash(BINDING_DOMAIN, &b).unwrap());
    }
}
