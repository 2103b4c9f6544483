// crates/syncengine-runtime/src/error.rs
// ============================================================================
// Module: Engine Errors
// Description: The unified error type every runtime stage reports through.
// Purpose: Let the engine loop log a structured, per-event error without
//          each stage inventing its own wrapper.
// Dependencies: syncengine_core, syncengine_filter, thiserror
// ============================================================================

use syncengine_core::BindingHash;
use syncengine_core::FlowToken;
use syncengine_core::HashError;
use syncengine_core::MatchError;
use syncengine_core::SpecError;
use syncengine_core::StoreError;
use syncengine_core::SyncId;
use syncengine_filter::FilterError;
use thiserror::Error;

use crate::quota::QuotaExceeded;

/// Errors raised while evaluating a completion against the registered sync
/// rules, or while registering those rules.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A binding set that had already fired for this `(flow, sync)` pair
    /// fired again — evaluation of the remaining bindings for this sync is
    /// abandoned.
    #[error("cycle detected in flow {flow} for sync {sync_id} (binding {binding_hash})")]
    CycleDetected {
        /// The flow the cycle was detected in.
        flow: FlowToken,
        /// The sync rule that would have re-fired.
        sync_id: SyncId,
        /// The binding set that repeated.
        binding_hash: BindingHash,
    },
    /// The flow exceeded its step quota; evaluation of every remaining sync
    /// for this completion is abandoned.
    #[error(transparent)]
    StepsExceeded(#[from] QuotaExceeded),
    /// A then-clause argument template referenced a binding the where stage
    /// never produced.
    #[error("binding {var:?} referenced by {expr:?} was not produced by this sync's when/where clauses")]
    MissingBinding {
        /// The binding name that was referenced.
        var: String,
        /// The template text it was referenced from.
        expr: String,
    },
    /// A `Keyed` scope's key was absent from the when-clause's bindings.
    #[error("scope key {scope_key:?} was not produced by the when clause")]
    KeyMissing {
        /// The configured scope key.
        scope_key: String,
    },
    /// A where-clause filter referenced a binding the when clause never
    /// produced.
    #[error("filter referenced unbound variable {0:?}")]
    UnboundFilterVariable(String),
    /// Registering a set of sync rules failed validation.
    #[error(transparent)]
    Spec(#[from] SpecError),
    /// Matching or binding extraction failed.
    #[error(transparent)]
    Match(#[from] MatchError),
    /// Parsing a where-clause's filter text failed.
    #[error(transparent)]
    Filter(#[from] FilterError),
    /// Hashing a binding set or invocation identity failed.
    #[error(transparent)]
    Hash(#[from] HashError),
    /// The durable store reported a failure.
    #[error(transparent)]
    Store(#[from] StoreError),
}
