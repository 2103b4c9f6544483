// crates/syncengine-runtime/src/cycle.rs
// ============================================================================
// Module: Cycle Detector
// Description: Per-flow in-memory history of fired (sync, binding) pairs.
// Purpose: Stop a sync rule from re-triggering itself within the same flow
//          forever, without needing a durable cycle store.
// Dependencies: std::collections, std::sync, syncengine_core
// ============================================================================

//! ## Overview
//! History is kept per [`FlowToken`] and never persisted: it exists only for
//! the lifetime of one engine process. A fresh engine recovering from a
//! crash starts with empty history, which is why the then-executor only
//! records a binding after its firing was newly inserted into the store —
//! replaying an already-committed firing must not re-seed a cycle record
//! that never gated anything the first time.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::Mutex;
use std::sync::PoisonError;

use syncengine_core::BindingHash;
use syncengine_core::FlowToken;
use syncengine_core::SyncId;

// ============================================================================
// SECTION: Cycle Detector
// ============================================================================

/// The fired-history key: a sync rule paired with the binding set it fired
/// on.
type HistoryKey = (SyncId, BindingHash);

/// Tracks, per flow, which `(sync_id, binding_hash)` pairs have already
/// fired.
pub struct CycleDetector {
    /// Per-flow fired-history sets.
    history: Mutex<HashMap<FlowToken, HashSet<HistoryKey>>>,
}

impl CycleDetector {
    /// Creates an empty detector.
    #[must_use]
    pub fn new() -> Self {
        Self { history: Mutex::new(HashMap::new()) }
    }

    /// Returns whether `(sync_id, binding_hash)` has already fired in `flow`.
    #[must_use]
    pub fn would_cycle(&self, flow: &FlowToken, sync_id: &SyncId, binding_hash: &BindingHash) -> bool {
        let history = lock(&self.history);
        history
            .get(flow)
            .is_some_and(|seen| seen.contains(&(sync_id.clone(), binding_hash.clone())))
    }

    /// Records that `(sync_id, binding_hash)` has fired in `flow`.
    pub fn record(&self, flow: &FlowToken, sync_id: &SyncId, binding_hash: &BindingHash) {
        let mut history = lock(&self.history);
        history.entry(flow.clone()).or_default().insert((sync_id.clone(), binding_hash.clone()));
    }

    /// Clears the fired history for `flow`, used after an operator-initiated
    /// `CleanupFlow` or an explicit history reset.
    pub fn clear(&self, flow: &FlowToken) {
        lock(&self.history).remove(flow);
    }

    /// Number of distinct `(sync_id, binding_hash)` pairs recorded for
    /// `flow`.
    #[must_use]
    pub fn flow_history_size(&self, flow: &FlowToken) -> usize {
        lock(&self.history).get(flow).map_or(0, HashSet::len)
    }

    /// Number of flows with any recorded history.
    #[must_use]
    pub fn history_size(&self) -> usize {
        lock(&self.history).len()
    }
}

impl Default for CycleDetector {
    fn default() -> Self {
        Self::new()
    }
}

/// Locks `mutex`, recovering from poisoning rather than panicking.
fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(sync: &str, hash: &str) -> (SyncId, BindingHash) {
        (SyncId::new(sync), BindingHash::new(hash))
    }

    #[test]
    fn unrecorded_binding_does_not_cycle() {
        let detector = CycleDetector::new();
        let flow = FlowToken::new("f1");
        let (sync, hash) = key("s1", "h1");
        assert!(!detector.would_cycle(&flow, &sync, &hash));
    }

    #[test]
    fn recorded_binding_cycles_in_the_same_flow_only() {
        let detector = CycleDetector::new();
        let flow_a = FlowToken::new("f1");
        let flow_b = FlowToken::new("f2");
        let (sync, hash) = key("s1", "h1");
        detector.record(&flow_a, &sync, &hash);

        assert!(detector.would_cycle(&flow_a, &sync, &hash));
        assert!(!detector.would_cycle(&flow_b, &sync, &hash));
    }

    #[test]
    fn clear_removes_history_for_that_flow() {
        let detector = CycleDetector::new();
        let flow = FlowToken::new("f1");
        let (sync, hash) = key("s1", "h1");
        detector.record(&flow, &sync, &hash);
        detector.clear(&flow);
        assert!(!detector.would_cycle(&flow, &sync, &hash));
        assert_eq!(detector.flow_history_size(&flow), 0);
    }

    #[test]
    fn history_size_counts_distinct_flows() {
        let detector = CycleDetector::new();
        detector.record(&FlowToken::new("f1"), &SyncId::new("s1"), &BindingHash::new("h1"));
        detector.record(&FlowToken::new("f2"), &SyncId::new("s1"), &BindingHash::new("h1"));
        assert_eq!(detector.history_size(), 2);
    }
}
