// crates/syncengine-core/src/core/model.rs
// ============================================================================
// Module: Core Entities
// Description: Invocation, Completion, SyncFiring, ProvenanceEdge and their
//              identifiers.
// Purpose: Define the durable records the store persists and the engine
//          passes between components.
// Dependencies: crate::core::value, serde
// ============================================================================

//! ## Overview
//! These are the four entities that flow through the causality chain
//! `completion → firing → invocation`. Invocations and completions are
//! content-addressed (their `id` is a hash of their logical contents, see
//! [`crate::core::hashing`]); firings and provenance edges use surrogate
//! integer ids assigned by the store.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use crate::core::value::Value;

// ============================================================================
// SECTION: Opaque Identifiers
// ============================================================================

/// Content-addressed invocation identifier (hex-encoded SHA-256).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InvocationId(String);

impl InvocationId {
    /// Wraps a raw hex digest as an invocation identifier.
    #[must_use]
    pub fn new(digest: impl Into<String>) -> Self {
        Self(digest.into())
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for InvocationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Content-addressed completion identifier (hex-encoded SHA-256).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CompletionId(String);

impl CompletionId {
    /// Wraps a raw hex digest as a completion identifier.
    #[must_use]
    pub fn new(digest: impl Into<String>) -> Self {
        Self(digest.into())
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CompletionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Content-addressed fingerprint of a binding map (the per-binding
/// idempotency key).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BindingHash(String);

impl BindingHash {
    /// Wraps a raw hex digest as a binding hash.
    #[must_use]
    pub fn new(digest: impl Into<String>) -> Self {
        Self(digest.into())
    }

    /// Returns the hash as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BindingHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Correlation identifier for a causal chain of invocations and completions
/// originating from one external request.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FlowToken(String);

impl FlowToken {
    /// Wraps a raw string as a flow token. Opaque: no validation or
    /// normalization is applied by this type.
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Returns the token as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FlowToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Identifier of a sync rule, stable across registration.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SyncId(String);

impl SyncId {
    /// Wraps a raw string as a sync identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SyncId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Named variant of an action's terminal outcome (e.g. `Success`,
/// `InsufficientStock`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OutputCase(String);

impl OutputCase {
    /// Wraps a raw string as an output case name.
    #[must_use]
    pub fn new(case: impl Into<String>) -> Self {
        Self(case.into())
    }

    /// Returns the case name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OutputCase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Dotted `Concept.action` reference.
///
/// # Invariants
/// - Matches `^[A-Z][A-Za-z0-9]*\.[a-z][A-Za-z0-9]*$`; construction through
///   [`ActionRef::parse`] enforces this, though [`ActionRef::new`] (used for
///   already-validated or trusted internal values) does not re-check it.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActionRef(String);

impl ActionRef {
    /// Wraps a string as an action reference without validation.
    #[must_use]
    pub fn new(reference: impl Into<String>) -> Self {
        Self(reference.into())
    }

    /// Parses and validates an action reference against
    /// `^[A-Z][A-Za-z0-9]*\.[a-z][A-Za-z0-9]*$`.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::InvalidActionRef`] if the string does not match
    /// the required shape.
    pub fn parse(reference: impl Into<String>) -> Result<Self, ModelError> {
        let reference = reference.into();
        if is_valid_action_ref(&reference) {
            Ok(Self(reference))
        } else {
            Err(ModelError::InvalidActionRef(reference))
        }
    }

    /// Returns the reference as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the `Concept` portion of the reference.
    #[must_use]
    pub fn concept(&self) -> &str {
        self.0.split_once('.').map_or(self.0.as_str(), |(concept, _)| concept)
    }

    /// Returns the `action` portion of the reference.
    #[must_use]
    pub fn action(&self) -> &str {
        self.0.split_once('.').map_or("", |(_, action)| action)
    }
}

impl fmt::Display for ActionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Validates the `^[A-Z][A-Za-z0-9]*\.[a-z][A-Za-z0-9]*$` shape without
/// depending on a regex crate.
fn is_valid_action_ref(reference: &str) -> bool {
    let Some((concept, action)) = reference.split_once('.') else {
        return false;
    };
    let concept_ok = concept.as_bytes().first().is_some_and(u8::is_ascii_uppercase)
        && concept.bytes().all(|byte| byte.is_ascii_alphanumeric());
    let action_ok = action.as_bytes().first().is_some_and(u8::is_ascii_lowercase)
        && action.bytes().all(|byte| byte.is_ascii_alphanumeric());
    concept_ok && action_ok
}

// ============================================================================
// SECTION: Event Type
// ============================================================================

/// The kind of event a when-clause matches against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    /// Matches against a completion (the only type the engine loop wires up).
    Completed,
    /// Matches against an invocation. Accepted by the matcher and extractor
    /// as a recognized extension point; the engine's completion handler does
    /// not execute it today.
    Invoked,
}

// ============================================================================
// SECTION: Invocation
// ============================================================================

/// An intent to execute `action_uri`.
///
/// # Invariants
/// - Never mutated after creation; destroyed only by operator-initiated
///   truncation.
/// - `args` is always an `Object` value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invocation {
    /// Content-addressed identifier.
    pub id: InvocationId,
    /// Correlation identifier for the causal chain this invocation belongs to.
    pub flow_token: FlowToken,
    /// The `Concept.action` reference this invocation targets.
    pub action_uri: ActionRef,
    /// Named arguments, always an `Object` value.
    pub args: Value,
    /// Logical clock value stamped at creation.
    pub seq: u64,
    /// Opaque security context, inherited verbatim down a flow.
    pub security_context: Value,
    /// Opaque spec fingerprint stamped by the (out-of-scope) spec compiler.
    pub spec_hash: String,
    /// Engine version that created this invocation.
    pub engine_version: String,
    /// IR version that created this invocation.
    pub ir_version: String,
}

// ============================================================================
// SECTION: Completion
// ============================================================================

/// The terminal outcome of an invocation.
///
/// # Invariants
/// - At most one completion exists per invocation (enforced by the store's
///   uniqueness constraint on `invocation_id`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Completion {
    /// Content-addressed identifier.
    pub id: CompletionId,
    /// The invocation this completion terminates.
    pub invocation_id: InvocationId,
    /// Named output variant (e.g. `"Success"` or an error variant).
    pub output_case: OutputCase,
    /// Result fields, always an `Object` value.
    pub result: Value,
    /// Logical clock value stamped at creation.
    pub seq: u64,
    /// Opaque security context.
    pub security_context: Value,
}

// ============================================================================
// SECTION: Sync Firing
// ============================================================================

/// A record that a sync rule fired for a specific completion and binding.
///
/// # Invariants
/// - `(completion_id, sync_id, binding_hash)` is unique — the binding-level
///   idempotency key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncFiring {
    /// Surrogate identifier assigned by the store.
    pub id: i64,
    /// The completion that triggered this firing.
    pub completion_id: CompletionId,
    /// The sync rule that fired.
    pub sync_id: SyncId,
    /// Fingerprint of the binding set this firing used.
    pub binding_hash: BindingHash,
    /// Logical clock value stamped at creation.
    pub seq: u64,
}

// ============================================================================
// SECTION: Provenance Edge
// ============================================================================

/// A back-link from a firing to the invocation it produced.
///
/// # Invariants
/// - `sync_firing_id` is unique — one invocation per firing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvenanceEdge {
    /// Surrogate identifier assigned by the store.
    pub id: i64,
    /// The firing that produced this edge.
    pub sync_firing_id: i64,
    /// The invocation the firing produced.
    pub invocation_id: InvocationId,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised while constructing core entities.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ModelError {
    /// An action reference did not match
    /// `^[A-Z][A-Za-z0-9]*\.[a-z][A-Za-z0-9]*$`.
    #[error("invalid action reference: {0}")]
    InvalidActionRef(String),
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic, reason = "Test-only panic-based assertions are permitted.")]
    use super::*;

    #[test]
    fn action_ref_parse_accepts_valid_shape() {
        let action_ref = ActionRef::parse("Order.create").unwrap();
        assert_eq!(action_ref.concept(), "Order");
        assert_eq!(action_ref.action(), "create");
    }

    #[test]
    fn action_ref_parse_rejects_lowercase_concept() {
        assert!(ActionRef::parse("order.create").is_err());
    }

    #[test]
    fn action_ref_parse_rejects_uppercase_action() {
        assert!(ActionRef::parse("Order.Create").is_err());
    }

    #[test]
    fn action_ref_parse_rejects_missing_dot() {
        assert!(ActionRef::parse("OrderCreate").is_err());
    }
}
