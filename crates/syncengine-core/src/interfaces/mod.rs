// crates/syncengine-core/src/interfaces/mod.rs
// ============================================================================
// Module: Interfaces
// Description: Backend-agnostic store contract the runtime consumes.
// Purpose: Let the runtime depend on a trait object rather than a concrete
//          backend, so the SQLite-backed implementation lives in its own
//          crate.
// Dependencies: crate::core
// ============================================================================

//! ## Overview
//! `Store` and `StateStore` are the interfaces this crate defines. `Store`
//! covers the four append-only causality tables (invocations, completions,
//! sync firings, provenance edges); `StateStore` covers the concept state
//! tables a where-clause's source collection names (e.g. `CartItem`), which
//! are written by the (out-of-scope) action executors and read by the
//! where-executor. Both are named here; the concrete implementation is a
//! separate crate so this one stays free of any particular database
//! dependency.

// ============================================================================
// SECTION: Imports
// ============================================================================

use thiserror::Error;

use crate::core::model::BindingHash;
use crate::core::model::Completion;
use crate::core::model::CompletionId;
use crate::core::model::FlowToken;
use crate::core::model::Invocation;
use crate::core::model::InvocationId;
use crate::core::model::ProvenanceEdge;
use crate::core::model::SyncFiring;
use crate::core::model::SyncId;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Structured errors the store surfaces to callers.
#[derive(Debug, Error)]
pub enum StoreError {
    /// An underlying I/O operation failed.
    #[error("store io error: {0}")]
    Io(String),
    /// The backing database reported an error not covered by a more
    /// specific variant.
    #[error("store backend error: {0}")]
    Db(String),
    /// Persisted data failed to deserialize into an IR value or model type.
    #[error("store corruption: {0}")]
    Corrupt(String),
    /// The store's schema version did not match what this build expects.
    #[error("schema version mismatch: found {found}, expected {expected}")]
    VersionMismatch {
        /// Version recorded in the store.
        found: i64,
        /// Version this build requires.
        expected: i64,
    },
    /// A write referenced a parent row that does not exist.
    #[error("foreign key violation on {table}.{column}")]
    FkViolation {
        /// Table the violated foreign key belongs to.
        table: String,
        /// Column the violated foreign key belongs to.
        column: String,
    },
    /// A value could not be canonically encoded (typically a float).
    #[error("failed to marshal value: {0}")]
    MarshalError(String),
    /// A requested row did not exist.
    #[error("not found in {table}: {id}")]
    NotFound {
        /// Table that was queried.
        table: String,
        /// Identifier that was looked up.
        id: String,
    },
    /// A value exceeded a configured size limit.
    #[error("{field} exceeds size limit of {limit} bytes")]
    TooLarge {
        /// Field that was too large.
        field: String,
        /// The configured limit, in bytes.
        limit: usize,
    },
    /// The store's writer queue is at capacity and rejected the request.
    #[error("store writer overloaded")]
    Overloaded,
}

// ============================================================================
// SECTION: Store
// ============================================================================

/// The durable event log and causality store.
///
/// Every read method orders its results by `seq ASC, id ASC` so that
/// identical inputs yield byte-identical output sequences across runs,
/// processes, and restarts.
pub trait Store: Send + Sync {
    /// Inserts `invocation`. A conflict on `id` is a silent no-op —
    /// idempotent by construction.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on any infrastructural failure.
    fn write_invocation(&self, invocation: &Invocation) -> Result<(), StoreError>;

    /// Inserts `completion`. A conflict on any unique key (including a
    /// second completion for the same invocation) is a silent no-op that
    /// preserves replay determinism.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on any infrastructural failure.
    fn write_completion(&self, completion: &Completion) -> Result<(), StoreError>;

    /// The crash-atomic primitive: writes `firing` and, only if it was newly
    /// inserted, `invocation` and its provenance edge, all in one
    /// transaction. Returns the firing's id and whether it was newly
    /// inserted.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on any infrastructural failure.
    fn write_sync_firing_atomic(
        &self,
        firing: &SyncFiring,
        invocation: &Invocation,
    ) -> Result<(i64, bool), StoreError>;

    /// Reports whether a firing already exists for this idempotency key.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on any infrastructural failure.
    fn has_firing(
        &self,
        completion_id: &CompletionId,
        sync_id: &SyncId,
        binding_hash: &BindingHash,
    ) -> Result<bool, StoreError>;

    /// Fetches a single invocation by id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] on a miss, or [`StoreError`] on any
    /// infrastructural failure.
    fn read_invocation(&self, id: &InvocationId) -> Result<Invocation, StoreError>;

    /// Fetches a single completion by id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] on a miss, or [`StoreError`] on any
    /// infrastructural failure.
    fn read_completion(&self, id: &CompletionId) -> Result<Completion, StoreError>;

    /// Fetches every invocation and completion belonging to `flow`, each in
    /// `seq ASC, id ASC` order.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on any infrastructural failure.
    fn read_flow(
        &self,
        flow: &FlowToken,
    ) -> Result<(Vec<Invocation>, Vec<Completion>), StoreError>;

    /// Fetches every firing produced by `completion_id`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on any infrastructural failure.
    fn read_sync_firings_for_completion(
        &self,
        completion_id: &CompletionId,
    ) -> Result<Vec<SyncFiring>, StoreError>;

    /// Back-traces from an invocation to the firing and completion that
    /// produced it, ordered by firing `seq` then edge `id`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on any infrastructural failure.
    fn read_provenance(
        &self,
        invocation_id: &InvocationId,
    ) -> Result<Vec<ProvenanceEdge>, StoreError>;

    /// Forward-traces from a completion to every invocation its firings
    /// produced.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on any infrastructural failure.
    fn read_triggered(&self, completion_id: &CompletionId) -> Result<Vec<Invocation>, StoreError>;

    /// Returns the highest `seq` ever written to the store, or `0` if empty.
    /// Used to resume the logical clock above the stored maximum after
    /// recovery.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on any infrastructural failure.
    fn get_last_seq(&self) -> Result<u64, StoreError>;

    /// Returns the highest `seq` written for `flow`, or `0` if the flow has
    /// no rows.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on any infrastructural failure.
    fn get_last_seq_for_flow(&self, flow: &FlowToken) -> Result<u64, StoreError>;

    /// Returns invocations in `flow` that have no completion yet, in
    /// deterministic order.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on any infrastructural failure.
    fn get_pending_invocations(&self, flow: &FlowToken) -> Result<Vec<Invocation>, StoreError>;

    /// Returns firings that have no provenance edge — a sign of partial
    /// commit under a non-atomic write path. Must be empty for any store
    /// written exclusively through [`Store::write_sync_firing_atomic`].
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on any infrastructural failure.
    fn find_orphaned_sync_firings(&self) -> Result<Vec<SyncFiring>, StoreError>;

    /// Returns the flow tokens of every flow with a pending invocation or an
    /// orphaned firing.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on any infrastructural failure.
    fn find_incomplete_flows(&self) -> Result<Vec<FlowToken>, StoreError>;
}

// ============================================================================
// SECTION: State Store
// ============================================================================

/// One row of a concept state table (e.g. `CartItem`), as the where-executor
/// sees it: the flow it belongs to, plus its declared fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateRow {
    /// Surrogate row identifier, used only for deterministic tie-breaking.
    pub id: i64,
    /// The flow this row belongs to; `scope.mode == flow` filters on this.
    pub flow_token: FlowToken,
    /// The row's declared columns, always an `Object` value.
    pub fields: crate::core::value::Value,
}

/// Read/write access to concept state tables.
///
/// Unlike [`Store`], this is not a fixed schema: `table` names whichever
/// collection a `ConceptSpec`'s `state_schemas` declares (e.g. `CartItem`),
/// and `fields` carries that table's declared columns as an IR object. The
/// where-executor is the only consumer that reads through this trait;
/// action executors are the only writers, and both are external to the core.
pub trait StateStore: Send + Sync {
    /// Inserts one row into `table`, returning its surrogate id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on any infrastructural failure.
    fn write_state_row(
        &self,
        table: &str,
        flow: &FlowToken,
        fields: crate::core::value::Value,
    ) -> Result<i64, StoreError>;

    /// Reads every row of `table`, ordered by insertion (`id ASC`) so
    /// fan-out order is deterministic.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on any infrastructural failure.
    fn read_state_rows(&self, table: &str) -> Result<Vec<StateRow>, StoreError>;
}
