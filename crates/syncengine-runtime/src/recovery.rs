// crates/syncengine-runtime/src/recovery.rs
// ============================================================================
// Module: Recovery & Replay
// Description: Reconstruct per-flow state from the durable store and replay
//              a flow's event history in deterministic order.
// Purpose: Let a freshly started engine find incomplete flows after a crash
//          and re-drive exactly the events that were never fully processed.
// Dependencies: syncengine_core
// ============================================================================

//! ## Overview
//! None of this reads from in-memory state: every function here is a pure
//! projection of what [`Store`] already persisted, which is what makes
//! replay safe to run against a store the current engine process has never
//! seen events from. [`replay_sequence`] interleaves invocations and
//! completions by `(seq, kind, id)` — at equal `seq`, an invocation always
//! sorts before the completion it produced, since nothing in a correct flow
//! can complete before it began.

// ============================================================================
// SECTION: Imports
// ============================================================================

use syncengine_core::Completion;
use syncengine_core::FlowToken;
use syncengine_core::Invocation;
use syncengine_core::OutputCase;
use syncengine_core::Store;
use syncengine_core::StoreError;

// ============================================================================
// SECTION: Flow State
// ============================================================================

/// A point-in-time snapshot of one flow's durable history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowState {
    /// The flow this snapshot describes.
    pub flow_token: FlowToken,
    /// Every invocation recorded for this flow, in `seq ASC, id ASC` order.
    pub invocations: Vec<Invocation>,
    /// Every completion recorded for this flow, in `seq ASC, id ASC` order.
    pub completions: Vec<Completion>,
    /// Invocations in this flow with no completion yet.
    pub pending_invocations: usize,
    /// Firings (across the whole store) attributable to this flow that have
    /// no provenance edge — a sign of a non-atomic write that was
    /// interrupted mid-commit.
    pub orphaned_firings: usize,
    /// The highest `seq` recorded anywhere in this flow, or `0` if empty.
    pub last_seq: u64,
    /// The output case of the most recently completed invocation, if any.
    pub terminal_output_case: Option<OutputCase>,
}

impl FlowState {
    /// A flow is complete once every invocation it has produced has a
    /// completion and no firing in it was left orphaned by a crash, and it
    /// has recorded at least one invocation.
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        !self.invocations.is_empty() && self.pending_invocations == 0 && self.orphaned_firings == 0
    }
}

// ============================================================================
// SECTION: Loading
// ============================================================================

/// Loads the current [`FlowState`] for `flow` from `store`.
///
/// # Errors
///
/// Returns [`StoreError`] on any infrastructural failure.
pub fn load_flow_state(store: &dyn Store, flow: &FlowToken) -> Result<FlowState, StoreError> {
    let (invocations, completions) = store.read_flow(flow)?;
    let pending_invocations = store.get_pending_invocations(flow)?.len();
    let last_seq = store.get_last_seq_for_flow(flow)?;
    let orphaned_firings = count_orphaned_firings_for_flow(store, flow)?;
    let terminal_output_case = completions.last().map(|completion| completion.output_case.clone());

    Ok(FlowState {
        flow_token: flow.clone(),
        invocations,
        completions,
        pending_invocations,
        orphaned_firings,
        last_seq,
        terminal_output_case,
    })
}

/// Finds every flow the store considers incomplete (a pending invocation or
/// an orphaned firing) and loads its full [`FlowState`].
///
/// # Errors
///
/// Returns [`StoreError`] on any infrastructural failure.
pub fn find_incomplete_flows(store: &dyn Store) -> Result<Vec<FlowState>, StoreError> {
    store.find_incomplete_flows()?.iter().map(|flow| load_flow_state(store, flow)).collect()
}

/// Counts firings without a provenance edge whose completion belongs to
/// `flow` (i.e. whose completion's invocation has `flow_token == flow`).
fn count_orphaned_firings_for_flow(store: &dyn Store, flow: &FlowToken) -> Result<usize, StoreError> {
    let mut count = 0;
    for firing in store.find_orphaned_sync_firings()? {
        let completion = store.read_completion(&firing.completion_id)?;
        let invocation = store.read_invocation(&completion.invocation_id)?;
        if &invocation.flow_token == flow {
            count += 1;
        }
    }
    Ok(count)
}

// ============================================================================
// SECTION: Replay
// ============================================================================

/// One entry of a flow's replayed event sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplayEvent {
    /// A previously recorded invocation.
    Invocation(Invocation),
    /// A previously recorded completion.
    Completion(Completion),
}

/// Returns every invocation and completion recorded for `flow`, merged into
/// one deterministic sequence: ordered by `seq`, with invocations sorting
/// before completions at equal `seq`, and by id within a kind.
///
/// # Errors
///
/// Returns [`StoreError`] on any infrastructural failure.
pub fn replay_sequence(store: &dyn Store, flow: &FlowToken) -> Result<Vec<ReplayEvent>, StoreError> {
    let (invocations, completions) = store.read_flow(flow)?;

    let mut entries: Vec<(u64, u8, String, ReplayEvent)> = Vec::with_capacity(invocations.len() + completions.len());
    for invocation in invocations {
        let sort_id = invocation.id.as_str().to_string();
        entries.push((invocation.seq, 0, sort_id, ReplayEvent::Invocation(invocation)));
    }
    for completion in completions {
        let sort_id = completion.id.as_str().to_string();
        entries.push((completion.seq, 1, sort_id, ReplayEvent::Completion(completion)));
    }
    entries.sort_by(|left, right| {
        (left.0, left.1, &left.2).cmp(&(right.0, right.1, &right.2))
    });

    Ok(entries.into_iter().map(|(_seq, _kind, _id, event)| event).collect())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic, reason = "Test-only panic-based assertions are permitted.")]
    use std::sync::Mutex;

    use syncengine_core::ActionRef;
    use syncengine_core::BindingHash;
    use syncengine_core::CompletionId;
    use syncengine_core::InvocationId;
    use syncengine_core::ProvenanceEdge;
    use syncengine_core::SyncFiring;
    use syncengine_core::SyncId;
    use syncengine_core::Value;

    use super::*;

    #[derive(Default)]
    struct FakeStore {
        invocations: Mutex<Vec<Invocation>>,
        completions: Mutex<Vec<Completion>>,
        orphaned: Mutex<Vec<SyncFiring>>,
    }

    impl Store for FakeStore {
        fn write_invocation(&self, invocation: &Invocation) -> Result<(), StoreError> {
            self.invocations.lock().unwrap_or_else(|poison| poison.into_inner()).push(invocation.clone());
            Ok(())
        }
        fn write_completion(&self, completion: &Completion) -> Result<(), StoreError> {
            self.completions.lock().unwrap_or_else(|poison| poison.into_inner()).push(completion.clone());
            Ok(())
        }
        fn write_sync_firing_atomic(
            &self,
            _firing: &SyncFiring,
            _invocation: &Invocation,
        ) -> Result<(i64, bool), StoreError> {
            Ok((0, true))
        }
        fn has_firing(
            &self,
            _completion_id: &CompletionId,
            _sync_id: &SyncId,
            _binding_hash: &BindingHash,
        ) -> Result<bool, StoreError> {
            Ok(false)
        }
        fn read_invocation(&self, id: &InvocationId) -> Result<Invocation, StoreError> {
            self.invocations
                .lock()
                .unwrap_or_else(|poison| poison.into_inner())
                .iter()
                .find(|invocation| &invocation.id == id)
                .cloned()
                .ok_or_else(|| StoreError::NotFound { table: "invocations".to_string(), id: id.as_str().to_string() })
        }
        fn read_completion(&self, id: &CompletionId) -> Result<Completion, StoreError> {
            self.completions
                .lock()
                .unwrap_or_else(|poison| poison.into_inner())
                .iter()
                .find(|completion| &completion.id == id)
                .cloned()
                .ok_or_else(|| StoreError::NotFound { table: "completions".to_string(), id: id.as_str().to_string() })
        }
        fn read_flow(&self, flow: &FlowToken) -> Result<(Vec<Invocation>, Vec<Completion>), StoreError> {
            let invocations: Vec<Invocation> = self
                .invocations
                .lock()
                .unwrap_or_else(|poison| poison.into_inner())
                .iter()
                .filter(|invocation| &invocation.flow_token == flow)
                .cloned()
                .collect();
            let invocation_ids: std::collections::HashSet<InvocationId> =
                invocations.iter().map(|invocation| invocation.id.clone()).collect();
            let completions: Vec<Completion> = self
                .completions
                .lock()
                .unwrap_or_else(|poison| poison.into_inner())
                .iter()
                .filter(|completion| invocation_ids.contains(&completion.invocation_id))
                .cloned()
                .collect();
            Ok((invocations, completions))
        }
        fn read_sync_firings_for_completion(
            &self,
            _completion_id: &CompletionId,
        ) -> Result<Vec<SyncFiring>, StoreError> {
            Ok(Vec::new())
        }
        fn read_provenance(&self, _invocation_id: &InvocationId) -> Result<Vec<ProvenanceEdge>, StoreError> {
            Ok(Vec::new())
        }
        fn read_triggered(&self, _completion_id: &CompletionId) -> Result<Vec<Invocation>, StoreError> {
            Ok(Vec::new())
        }
        fn get_last_seq(&self) -> Result<u64, StoreError> {
            Ok(0)
        }
        fn get_last_seq_for_flow(&self, flow: &FlowToken) -> Result<u64, StoreError> {
            let (invocations, completions) = self.read_flow(flow)?;
            Ok(invocations
                .iter()
                .map(|invocation| invocation.seq)
                .chain(completions.iter().map(|completion| completion.seq))
                .max()
                .unwrap_or(0))
        }
        fn get_pending_invocations(&self, flow: &FlowToken) -> Result<Vec<Invocation>, StoreError> {
            let (invocations, completions) = self.read_flow(flow)?;
            let completed: std::collections::HashSet<InvocationId> =
                completions.iter().map(|completion| completion.invocation_id.clone()).collect();
            Ok(invocations.into_iter().filter(|invocation| !completed.contains(&invocation.id)).collect())
        }
        fn find_orphaned_sync_firings(&self) -> Result<Vec<SyncFiring>, StoreError> {
            Ok(self.orphaned.lock().unwrap_or_else(|poison| poison.into_inner()).clone())
        }
        fn find_incomplete_flows(&self) -> Result<Vec<FlowToken>, StoreError> {
            let mut flows: Vec<FlowToken> = self
                .invocations
                .lock()
                .unwrap_or_else(|poison| poison.into_inner())
                .iter()
                .map(|invocation| invocation.flow_token.clone())
                .collect();
            flows.sort();
            flows.dedup();

            let mut incomplete = Vec::new();
            for flow in flows {
                if !self.get_pending_invocations(&flow)?.is_empty() {
                    incomplete.push(flow);
                }
            }
            Ok(incomplete)
        }
    }

    fn invocation(id: &str, flow: &str, seq: u64) -> Invocation {
        Invocation {
            id: InvocationId::new(id),
            flow_token: FlowToken::new(flow),
            action_uri: ActionRef::parse("Order.create").unwrap(),
            args: Value::empty_object(),
            seq,
            security_context: Value::Null,
            spec_hash: "h".to_string(),
            engine_version: "0.1.0".to_string(),
            ir_version: "1".to_string(),
        }
    }

    fn completion(id: &str, invocation_id: &str, seq: u64) -> Completion {
        Completion {
            id: CompletionId::new(id),
            invocation_id: InvocationId::new(invocation_id),
            output_case: OutputCase::new("Success"),
            result: Value::empty_object(),
            seq,
            security_context: Value::Null,
        }
    }

    #[test]
    fn replay_sequence_orders_invocation_before_completion_at_equal_seq() {
        let store = FakeStore::default();
        store.write_invocation(&invocation("inv-1", "f1", 5)).unwrap();
        store.write_completion(&completion("comp-1", "inv-1", 5)).unwrap();

        let sequence = replay_sequence(&store, &FlowToken::new("f1")).unwrap();
        assert_eq!(sequence.len(), 2);
        assert!(matches!(sequence[0], ReplayEvent::Invocation(_)));
        assert!(matches!(sequence[1], ReplayEvent::Completion(_)));
    }

    #[test]
    fn flow_state_is_incomplete_with_a_pending_invocation() {
        let store = FakeStore::default();
        store.write_invocation(&invocation("inv-1", "f1", 1)).unwrap();
        let state = load_flow_state(&store, &FlowToken::new("f1")).unwrap();
        assert!(!state.is_complete());
        assert_eq!(state.pending_invocations, 1);
    }

    #[test]
    fn flow_state_is_complete_once_every_invocation_has_a_completion() {
        let store = FakeStore::default();
        store.write_invocation(&invocation("inv-1", "f1", 1)).unwrap();
        store.write_completion(&completion("comp-1", "inv-1", 2)).unwrap();
        let state = load_flow_state(&store, &FlowToken::new("f1")).unwrap();
        assert!(state.is_complete());
        assert_eq!(state.terminal_output_case, Some(OutputCase::new("Success")));
    }
}
