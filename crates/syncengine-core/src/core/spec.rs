// crates/syncengine-core/src/core/spec.rs
// ============================================================================
// Module: Rule Specifications
// Description: Read-only entities supplied externally: ConceptSpec and
//              SyncRule, and their nested when/where/then clauses.
// Purpose: Give the matcher, where-executor and then-executor a shared,
//          validated representation of the declarative rules they evaluate.
// Dependencies: crate::core::{model, value}, serde
// ============================================================================

//! ## Overview
//! Concepts and sync rules are compiled elsewhere and handed to the engine as
//! data; this module only models that data and validates the handful of
//! invariants the engine itself depends on (scope/event-type closure, unique
//! sync ids are checked at registration, not here).

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use crate::core::model::ActionRef;
use crate::core::model::EventType;
use crate::core::model::OutputCase;
use crate::core::model::SyncId;
use crate::core::value::Value;

// ============================================================================
// SECTION: Concept Spec
// ============================================================================

/// One named argument of an action signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArgSpec {
    /// Argument name.
    pub name: String,
    /// Declared IR type name (`"Int"`, `"String"`, ...), informational only;
    /// not enforced by the runtime described here.
    pub ir_type: String,
}

/// One named terminal outcome an action may produce.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputCaseSpec {
    /// Case name (e.g. `"Success"`).
    pub name: OutputCase,
    /// Field names this case's result object carries.
    pub fields: Vec<String>,
}

/// One action signature on a [`ConceptSpec`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionSpec {
    /// Action name, unqualified (no `Concept.` prefix).
    pub name: String,
    /// Named arguments this action accepts.
    pub args: Vec<ArgSpec>,
    /// Permission names the caller must hold.
    pub requires: Vec<String>,
    /// Possible terminal outcomes.
    pub output_cases: Vec<OutputCaseSpec>,
}

/// A named, stateful service with typed actions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConceptSpec {
    /// Concept name, matching the uppercase-leading component of an
    /// [`ActionRef`].
    pub name: String,
    /// Free-text description of intent.
    pub purpose: String,
    /// State schemas, keyed by table name, each a list of column names.
    pub state_schemas: BTreeMap<String, Vec<String>>,
    /// Action signatures this concept exposes.
    pub actions: Vec<ActionSpec>,
    /// Free-text operational notes.
    pub operational_principles: Vec<String>,
}

// ============================================================================
// SECTION: Sync Rule
// ============================================================================

/// How a where-clause's query is scoped to a flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScopeMode {
    /// Safe-by-default: augments the query with `flow_token == current`.
    Flow,
    /// No additional filter; may read other flows' rows.
    Global,
    /// Augments the query with `<key> == when_bindings[key]`.
    Keyed,
}

/// A sync rule's scope declaration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scope {
    /// The scoping mode.
    pub mode: ScopeMode,
    /// The binding name used as the scope key. Required when `mode` is
    /// [`ScopeMode::Keyed`]; validated at registration, not here.
    pub key: Option<String>,
}

impl Scope {
    /// The implicit default scope: [`ScopeMode::Flow`] with no key.
    #[must_use]
    pub const fn flow_default() -> Self {
        Self { mode: ScopeMode::Flow, key: None }
    }
}

/// The `when` clause of a sync rule: what triggers evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WhenClause {
    /// The action reference this clause triggers on.
    pub action_ref: ActionRef,
    /// The event kind this clause matches.
    pub event_type: EventType,
    /// If present, the completion's output case must equal this value. An
    /// absent filter matches every output case.
    pub output_case: Option<OutputCase>,
    /// Maps local binding name to the field read from the matched record.
    pub bindings: BTreeMap<String, String>,
}

/// The `where` clause of a sync rule: an optional fan-out query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WhereClause {
    /// Name of the state table queried.
    pub source_table: String,
    /// Raw filter expression text, parsed by `syncengine-filter`. `None`
    /// means "no filter beyond scope".
    pub filter: Option<String>,
    /// Maps local binding name to the column read from each matched row.
    pub bindings: BTreeMap<String, String>,
}

/// The `then` clause of a sync rule: the invocation to produce per binding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThenClause {
    /// The action reference invoked.
    pub action_ref: ActionRef,
    /// Argument templates. A template value equal to (or prefixed with)
    /// `bound.` is resolved from the merged bindings at execution time; any
    /// other value is taken as a literal string.
    pub args: BTreeMap<String, String>,
}

/// A complete `when`/optional-`where`/`then` rule.
///
/// # Invariants
/// - Declaration order (the order these are registered in) is the
///   evaluation order for every completion; the engine never reorders them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncRule {
    /// Stable identifier, unique among the syncs registered together.
    pub id: SyncId,
    /// Scoping for the where-clause query, if any.
    pub scope: Scope,
    /// Trigger condition.
    pub when: WhenClause,
    /// Optional fan-out query.
    pub then_where: Option<WhereClause>,
    /// Invocation to produce per binding.
    pub then: ThenClause,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised while validating a rule specification.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SpecError {
    /// Two or more sync rules shared the same [`SyncId`] at registration.
    #[error("duplicate sync id: {0}")]
    DuplicateSyncId(String),
    /// A sync rule's scope mode was not one of the recognized variants.
    #[error("invalid scope for sync {sync_id}: {detail}")]
    InvalidScope {
        /// The offending sync's id.
        sync_id: String,
        /// What was wrong with the scope.
        detail: String,
    },
    /// A sync rule's when-clause named an unrecognized event type.
    #[error("invalid event type for sync {0}")]
    InvalidEventType(String),
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic, reason = "Test-only panic-based assertions are permitted.")]
    use super::*;

    #[test]
    fn scope_default_is_flow_with_no_key() {
        let scope = Scope::flow_default();
        assert_eq!(scope.mode, ScopeMode::Flow);
        assert_eq!(scope.key, None);
    }

    #[test]
    fn when_clause_round_trips_through_canonical_json() {
        let clause = WhenClause {
            action_ref: ActionRef::parse("Order.create").unwrap(),
            event_type: EventType::Completed,
            output_case: Some(OutputCase::new("Success")),
            bindings: BTreeMap::from([("order_id".to_string(), "id".to_string())]),
        };
        let bytes = serde_json::to_vec(&clause).unwrap();
        let decoded: WhenClause = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(clause, decoded);
    }
}
