// crates/syncengine-runtime/src/flow.rs
// ============================================================================
// Module: Flow Token Generator
// Description: Production UUIDv7 generator and a deterministic test double.
// Purpose: Let the engine mint fresh flow tokens (`NewFlow`) without baking a
//          particular scheme into the engine loop itself.
// Dependencies: std::sync::atomic, syncengine_core, uuid
// ============================================================================

//! ## Overview
//! [`Uuidv7FlowTokenGenerator`] is what a real deployment uses: UUIDv7 tokens
//! sort roughly by creation time, which is convenient for operator tooling
//! even though the engine itself never relies on that ordering.
//! [`FixedSequenceFlowTokenGenerator`] produces `f-0`, `f-1`, ... so tests can
//! assert on exact flow tokens instead of matching a UUID pattern.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use syncengine_core::FlowToken;
use uuid::Uuid;

// ============================================================================
// SECTION: Trait
// ============================================================================

/// Mints fresh, unique flow tokens.
pub trait FlowTokenGenerator: Send + Sync {
    /// Returns a new flow token, distinct from any previously returned by
    /// this generator.
    fn new_flow(&self) -> FlowToken;
}

// ============================================================================
// SECTION: UUIDv7 Generator
// ============================================================================

/// Production flow token generator: a fresh UUIDv7 per call.
#[derive(Debug, Clone, Copy, Default)]
pub struct Uuidv7FlowTokenGenerator;

impl FlowTokenGenerator for Uuidv7FlowTokenGenerator {
    fn new_flow(&self) -> FlowToken {
        FlowToken::new(Uuid::now_v7().to_string())
    }
}

// ============================================================================
// SECTION: Deterministic Test Generator
// ============================================================================

/// Deterministic flow token generator for tests: `{prefix}-0`, `{prefix}-1`,
/// and so on.
pub struct FixedSequenceFlowTokenGenerator {
    /// Prefix prepended to each generated token.
    prefix: String,
    /// Next sequence number to emit.
    next: AtomicU64,
}

impl FixedSequenceFlowTokenGenerator {
    /// Creates a generator that emits `{prefix}-0`, `{prefix}-1`, ...
    #[must_use]
    pub fn new(prefix: impl Into<String>) -> Self {
        Self { prefix: prefix.into(), next: AtomicU64::new(0) }
    }
}

impl FlowTokenGenerator for FixedSequenceFlowTokenGenerator {
    fn new_flow(&self) -> FlowToken {
        let index = self.next.fetch_add(1, Ordering::SeqCst);
        FlowToken::new(format!("{}-{index}", self.prefix))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_sequence_generator_is_deterministic() {
        let generator = FixedSequenceFlowTokenGenerator::new("f");
        assert_eq!(generator.new_flow(), FlowToken::new("f-0"));
        assert_eq!(generator.new_flow(), FlowToken::new("f-1"));
    }

    #[test]
    fn uuidv7_generator_produces_distinct_tokens() {
        let generator = Uuidv7FlowTokenGenerator;
        assert_ne!(generator.new_flow(), generator.new_flow());
    }
}
