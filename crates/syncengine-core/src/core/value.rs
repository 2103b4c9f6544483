// crates/syncengine-core/src/core/value.rs
// ============================================================================
// Module: IR Value Universe
// Description: Closed tagged union of values persisted and passed through the
//              engine (Null, Bool, Int, String, Array, Object).
// Purpose: Give every persisted row, binding, and arg template one shared,
//          float-free value representation.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! The engine never works with an open-world "any JSON" value. Everything
//! that crosses a boundary — invocation args, completion results, where-bound
//! variables, security contexts — is a [`Value`]: a closed union with no
//! floating-point variant. Floats are rejected at construction and at decode
//! time (see [`crate::core::codec`]), never merely discouraged.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

// ============================================================================
// SECTION: Value
// ============================================================================

/// The IR value universe.
///
/// # Invariants
/// - No floating-point variant exists; every path that could introduce one
///   (decode, builder functions) returns [`ValueError::FloatForbidden`] instead.
/// - `Object` key order carries no meaning; equality compares contents only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// The absence of a value.
    Null,
    /// A boolean.
    Bool(bool),
    /// A signed 64-bit integer.
    Int(i64),
    /// A UTF-8 string.
    String(String),
    /// An ordered sequence of values.
    Array(Vec<Value>),
    /// A mapping from string keys to values. Key order is not significant.
    Object(BTreeMap<String, Value>),
}

impl Value {
    /// Returns this value's object fields, or `None` if this is not an object.
    #[must_use]
    pub fn as_object(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Self::Object(fields) => Some(fields),
            _ => None,
        }
    }

    /// Returns this value as a string slice, or `None` if this is not a string.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(value) => Some(value.as_str()),
            _ => None,
        }
    }

    /// Returns this value as an `i64`, or `None` if this is not an integer.
    #[must_use]
    pub const fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(value) => Some(*value),
            _ => None,
        }
    }

    /// Returns this value as a `bool`, or `None` if this is not a boolean.
    #[must_use]
    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(value) => Some(*value),
            _ => None,
        }
    }

    /// Looks up a field on an object value.
    ///
    /// Returns `None` both when the value is not an object and when the
    /// field is absent; callers that must distinguish "not an object" from
    /// "missing field" should match on [`Value::as_object`] directly.
    #[must_use]
    pub fn get_field(&self, field: &str) -> Option<&Value> {
        self.as_object().and_then(|fields| fields.get(field))
    }

    /// Builds an empty object value.
    #[must_use]
    pub fn empty_object() -> Self {
        Self::Object(BTreeMap::new())
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised while constructing or inspecting IR values.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValueError {
    /// A floating-point value was encountered where the IR forbids one.
    #[error("floating-point values are forbidden in the IR value universe")]
    FloatForbidden,
    /// A value outside the closed IR universe was encountered.
    #[error("value of type {0} is not representable in the IR value universe")]
    UnsupportedType(&'static str),
    /// A required field was missing from an object value.
    #[error("missing required field: {0}")]
    MissingRequiredField(String),
}
