// crates/syncengine-core/src/runtime/matcher.rs
// ============================================================================
// Module: Matcher and Binding Extractor
// Description: Decide whether a completion (or invocation) matches a
//              when-clause, and extract variable bindings from it.
// Purpose: The first stage of completion processing, shared by every sync
//          rule evaluated in the engine loop.
// Dependencies: crate::core::{model, spec, value}
// ============================================================================

//! ## Overview
//! [`match_when`] is a pure predicate; [`extract_bindings`] is all-or-nothing
//! — any missing field aborts the whole extraction rather than binding a
//! partial map. The `"invoked"` side of the extractor is wired up here, even
//! though the engine loop does not call it for any event it currently
//! processes.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use thiserror::Error;

use crate::core::model::Completion;
use crate::core::model::EventType;
use crate::core::model::Invocation;
use crate::core::spec::WhenClause;
use crate::core::value::Value;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised while matching or extracting bindings.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MatchError {
    /// A binding referenced a field absent from the source record.
    #[error("missing field {field} required for binding {binding}")]
    MissingField {
        /// The local binding name that could not be populated.
        binding: String,
        /// The field name looked up on the source record.
        field: String,
    },
    /// [`extract_bindings`] was called with a when-clause whose event type
    /// has no extractor wired up for the record kind given.
    #[error("event type {0:?} has no extractor for this record kind")]
    UnsupportedEventType(EventType),
}

// ============================================================================
// SECTION: Matching
// ============================================================================

/// Returns whether `when` matches a completed invocation.
///
/// Holds exactly when `when.action_ref` equals the invocation's
/// `action_uri`, `when.event_type` is [`EventType::Completed`], and
/// `when.output_case` is absent or equals the completion's output case. An
/// absent output-case filter is the universal match used for audit-style
/// syncs that fire on every outcome.
#[must_use]
pub fn match_when(when: &WhenClause, invocation: &Invocation, completion: &Completion) -> bool {
    when.event_type == EventType::Completed
        && when.action_ref == invocation.action_uri
        && when.output_case.as_ref().is_none_or(|case| *case == completion.output_case)
}

/// Returns whether `when` matches an invocation event directly (the
/// `"invoked"` event type).
#[must_use]
pub fn match_when_invoked(when: &WhenClause, invocation: &Invocation) -> bool {
    when.event_type == EventType::Invoked && when.action_ref == invocation.action_uri
}

// ============================================================================
// SECTION: Binding Extraction
// ============================================================================

/// Extracts variable bindings from a completion's result object per
/// `when.bindings` (`var_name -> field_name`).
///
/// # Errors
///
/// Returns [`MatchError::MissingField`] for the first binding whose field is
/// absent from `completion.result` — extraction is all-or-nothing.
pub fn extract_bindings(
    when: &WhenClause,
    completion: &Completion,
) -> Result<BTreeMap<String, Value>, MatchError> {
    extract_fields(&when.bindings, &completion.result)
}

/// Extracts variable bindings from an invocation's args object per
/// `when.bindings` (`var_name -> field_name`). The `"invoked"` counterpart of
/// [`extract_bindings`].
///
/// # Errors
///
/// Returns [`MatchError::MissingField`] for the first binding whose field is
/// absent from `invocation.args`.
pub fn extract_bindings_from_invocation(
    when: &WhenClause,
    invocation: &Invocation,
) -> Result<BTreeMap<String, Value>, MatchError> {
    extract_fields(&when.bindings, &invocation.args)
}

/// Shared all-or-nothing field lookup used by both extractor entry points.
fn extract_fields(
    bindings: &BTreeMap<String, String>,
    source: &Value,
) -> Result<BTreeMap<String, Value>, MatchError> {
    let mut resolved = BTreeMap::new();
    for (binding, field) in bindings {
        let value = source.get_field(field).ok_or_else(|| MatchError::MissingField {
            binding: binding.clone(),
            field: field.clone(),
        })?;
        resolved.insert(binding.clone(), value.clone());
    }
    Ok(resolved)
}
