// crates/syncengine-runtime/src/quota.rs
// ============================================================================
// Module: Quota Enforcer
// Description: Per-flow step counter that terminates runaway flows.
// Purpose: Bound the work a single flow can generate, independent of the
//          cycle detector (which only catches exact binding repeats).
// Dependencies: std::collections, std::sync, syncengine_core
// ============================================================================

//! ## Overview
//! [`QuotaEnforcer::check`] is called once per completion processed, not once
//! per firing: a completion that fans out into many bindings still counts as
//! a single step. The default limit is
//! [`DEFAULT_MAX_STEPS_PER_FLOW`] steps, matching the ceiling a
//! non-cyclical but unbounded fan-out chain could otherwise run past.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::PoisonError;

use syncengine_core::FlowToken;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default per-flow step ceiling.
pub const DEFAULT_MAX_STEPS_PER_FLOW: usize = 1000;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Raised when a flow exceeds its step quota.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("flow {flow} exceeded its quota of {limit} steps (at step {steps})")]
pub struct QuotaExceeded {
    /// The flow that was terminated.
    pub flow: FlowToken,
    /// The step count reached when the limit was hit.
    pub steps: usize,
    /// The configured limit.
    pub limit: usize,
}

// ============================================================================
// SECTION: Quota Enforcer
// ============================================================================

/// Tracks a step counter per flow and rejects further steps past
/// `max_steps`.
pub struct QuotaEnforcer {
    /// The per-flow step ceiling.
    max_steps: usize,
    /// Steps taken so far, by flow.
    counts: Mutex<HashMap<FlowToken, usize>>,
}

impl QuotaEnforcer {
    /// Creates an enforcer with the given per-flow step ceiling.
    #[must_use]
    pub fn new(max_steps: usize) -> Self {
        Self { max_steps, counts: Mutex::new(HashMap::new()) }
    }

    /// Increments `flow`'s step counter and returns the new count, or
    /// [`QuotaExceeded`] if it now exceeds the configured limit.
    ///
    /// # Errors
    ///
    /// Returns [`QuotaExceeded`] once `flow`'s count passes `max_steps`.
    pub fn check(&self, flow: &FlowToken) -> Result<usize, QuotaExceeded> {
        let mut counts = lock(&self.counts);
        let count = counts.entry(flow.clone()).or_insert(0);
        *count += 1;
        let steps = *count;
        if steps > self.max_steps {
            return Err(QuotaExceeded { flow: flow.clone(), steps, limit: self.max_steps });
        }
        Ok(steps)
    }

    /// Current step count for `flow`, or `0` if it has taken none.
    #[must_use]
    pub fn count_for(&self, flow: &FlowToken) -> usize {
        lock(&self.counts).get(flow).copied().unwrap_or(0)
    }

    /// Number of distinct flows with a nonzero step count.
    #[must_use]
    pub fn tracked_flows(&self) -> usize {
        lock(&self.counts).len()
    }

    /// Drops `flow`'s step counter entirely, freeing its quota.
    pub fn cleanup_flow(&self, flow: &FlowToken) {
        lock(&self.counts).remove(flow);
    }
}

/// Locks `mutex`, recovering from poisoning rather than panicking.
fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
