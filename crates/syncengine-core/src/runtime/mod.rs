// crates/syncengine-core/src/runtime/mod.rs
// ============================================================================
// Module: Runtime
// Description: The matcher/extractor stage shared by the engine loop.
// ============================================================================

pub mod matcher;

pub use matcher::MatchError;
pub use matcher::extract_bindings;
pub use matcher::extract_bindings_from_invocation;
pub use matcher::match_when;
pub use matcher::match_when_invoked;
