// crates/syncengine-core/src/core/mod.rs
// ============================================================================
// Module: Core
// Description: Value universe, canonical codec, hasher, logical clock, data
//              model, and rule specifications.
// ============================================================================

pub mod clock;
pub mod codec;
pub mod hashing;
pub mod model;
pub mod spec;
pub mod value;

pub use clock::LogicalClock;
pub use codec::CodecError;
pub use hashing::HashError;
pub use model::ActionRef;
pub use model::BindingHash;
pub use model::Completion;
pub use model::CompletionId;
pub use model::EventType;
pub use model::FlowToken;
pub use model::Invocation;
pub use model::InvocationId;
pub use model::ModelError;
pub use model::OutputCase;
pub use model::ProvenanceEdge;
pub use model::SyncFiring;
pub use model::SyncId;
pub use spec::ActionSpec;
pub use spec::ArgSpec;
pub use spec::ConceptSpec;
pub use spec::OutputCaseSpec;
pub use spec::Scope;
pub use spec::ScopeMode;
pub use spec::SpecError;
pub use spec::SyncRule;
pub use spec::ThenClause;
pub use spec::WhenClause;
pub use spec::WhereClause;
pub use value::Value;
pub use value::ValueError;
