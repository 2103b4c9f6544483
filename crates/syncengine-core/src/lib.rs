// crates/syncengine-core/src/lib.rs
// ============================================================================
// Module: Sync Engine Core Library
// Description: Public API surface for the reactive sync engine's core.
// Purpose: Expose the IR value universe, canonical codec, hasher, logical
//          clock, data model, rule specifications, the matcher/extractor,
//          and the store interface.
// Dependencies: crate::{core, interfaces, runtime}
// ============================================================================

//! ## Overview
//! This crate is the shared foundation every other crate in the workspace
//! depends on: the closed IR value universe, RFC 8785 canonical
//! encode/decode, content-addressed hashing, a logical clock, the core data
//! model (invocations, completions, firings, provenance edges), the rule
//! specifications sync rules are built from, the when-clause matcher and
//! binding extractor, and the `Store` trait the durable backend implements.
//! It contains no I/O and no concrete storage backend.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod core;
pub mod interfaces;
pub mod runtime;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use core::ActionRef;
pub use core::ActionSpec;
pub use core::ArgSpec;
pub use core::BindingHash;
pub use core::CodecError;
pub use core::Completion;
pub use core::CompletionId;
pub use core::ConceptSpec;
pub use core::EventType;
pub use core::FlowToken;
pub use core::HashError;
pub use core::Invocation;
pub use core::InvocationId;
pub use core::LogicalClock;
pub use core::ModelError;
pub use core::OutputCase;
pub use core::OutputCaseSpec;
pub use core::ProvenanceEdge;
pub use core::Scope;
pub use core::ScopeMode;
pub use core::SpecError;
pub use core::SyncFiring;
pub use core::SyncId;
pub use core::SyncRule;
pub use core::ThenClause;
pub use core::Value;
pub use core::ValueError;
pub use core::WhenClause;
pub use core::WhereClause;
pub use core::codec;
pub use core::hashing;
pub use interfaces::StateRow;
pub use interfaces::StateStore;
pub use interfaces::Store;
pub use interfaces::StoreError;
pub use runtime::MatchError;
pub use runtime::extract_bindings;
pub use runtime::extract_bindings_from_invocation;
pub use runtime::match_when;
pub use runtime::match_when_invoked;
