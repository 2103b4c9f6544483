// crates/syncengine-runtime/src/then_exec.rs
// ============================================================================
// Module: Then Executor
// Description: Produce and atomically write one invocation per binding set.
// Purpose: The terminal stage of sync evaluation: resolve argument
//          templates, enforce the cycle gate, and hand the produced
//          invocation to the event queue.
// Dependencies: syncengine_core, crate::{cycle, error, queue}
// ============================================================================

//! ## Overview
//! Two distinct checks guard each binding, in order. First,
//! [`Store::has_firing`] asks whether *this exact completion* already
//! produced this binding's firing — true after a crash replays the same
//! completion event a second time. That case is a silent no-op: the
//! invocation was already enqueued the first time, so skip both the cycle
//! record and the enqueue rather than re-driving the action. Only once that
//! persisted check comes back empty does the in-memory cycle detector run,
//! catching the distinct case of a *new* completion landing on a binding this
//! live flow has already fired — a genuine self-triggering loop rather than a
//! replay. Cycle recording itself happens strictly *after* a firing's write
//! is confirmed newly inserted, never before.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use syncengine_core::Completion;
use syncengine_core::FlowToken;
use syncengine_core::Invocation;
use syncengine_core::InvocationId;
use syncengine_core::Store;
use syncengine_core::SyncFiring;
use syncengine_core::SyncId;
use syncengine_core::ThenClause;
use syncengine_core::Value;
use syncengine_core::hashing;

use crate::cycle::CycleDetector;
use crate::error::EngineError;
use crate::queue::Event;
use crate::queue::EventQueue;

// ============================================================================
// SECTION: Execution Context
// ============================================================================

/// The shared state and identity stamps the then-executor needs, bundled so
/// call sites don't thread seven parameters through [`execute_then`].
pub struct ThenContext<'a> {
    /// The durable store, written through for each produced firing.
    pub store: &'a dyn Store,
    /// The logical clock, advanced once per produced invocation and once per
    /// firing.
    pub clock: &'a syncengine_core::LogicalClock,
    /// The cycle detector, consulted and updated per binding.
    pub cycle: &'a CycleDetector,
    /// The event queue newly produced invocations are enqueued to.
    pub queue: &'a EventQueue,
    /// Opaque spec fingerprint stamped onto every produced invocation.
    pub spec_hash: &'a str,
    /// Engine version stamped onto every produced invocation.
    pub engine_version: &'a str,
    /// IR version stamped onto every produced invocation.
    pub ir_version: &'a str,
}

// ============================================================================
// SECTION: Execution
// ============================================================================

/// Executes `then` once per entry of `bindings_list`, writing a crash-atomic
/// firing and enqueueing the produced invocation for each one newly
/// inserted. Returns the number of bindings that produced a new firing.
///
/// # Errors
///
/// Returns [`EngineError::CycleDetected`] and aborts the remaining bindings
/// as soon as one binding set has already fired for `(flow, sync_id)` under a
/// *different* completion than `triggering_completion`. Returns
/// [`EngineError::MissingBinding`] if an argument template references a
/// binding absent from its binding set, or [`EngineError::Hash`] /
/// [`EngineError::Store`] on a lower-level failure.
pub fn execute_then(
    ctx: &ThenContext<'_>,
    sync_id: &SyncId,
    then: &ThenClause,
    flow: &FlowToken,
    triggering_completion: &Completion,
    bindings_list: &[BTreeMap<String, Value>],
) -> Result<usize, EngineError> {
    let mut produced = 0_usize;

    for bindings in bindings_list {
        let binding_hash_digest = hashing::domain_hash(hashing::BINDING_DOMAIN, &Value::Object(bindings.clone()))?;
        let binding_hash = syncengine_core::BindingHash::new(binding_hash_digest);

        if ctx.store.has_firing(&triggering_completion.id, sync_id, &binding_hash)? {
            continue;
        }

        if ctx.cycle.would_cycle(flow, sync_id, &binding_hash) {
            return Err(EngineError::CycleDetected {
                flow: flow.clone(),
                sync_id: sync_id.clone(),
                binding_hash,
            });
        }

        let args = resolve_args(&then.args, bindings)?;
        let invocation_seq = ctx.clock.next();
        let firing_seq = ctx.clock.next();

        let hash_input = invocation_hash_input(flow, &then.action_ref, &args, invocation_seq);
        let invocation_digest = hashing::domain_hash(hashing::INVOCATION_DOMAIN, &hash_input)?;

        let invocation = Invocation {
            id: InvocationId::new(invocation_digest),
            flow_token: flow.clone(),
            action_uri: then.action_ref.clone(),
            args,
            seq: invocation_seq,
            security_context: triggering_completion.security_context.clone(),
            spec_hash: ctx.spec_hash.to_string(),
            engine_version: ctx.engine_version.to_string(),
            ir_version: ctx.ir_version.to_string(),
        };

        let firing = SyncFiring {
            id: 0,
            completion_id: triggering_completion.id.clone(),
            sync_id: sync_id.clone(),
            binding_hash: binding_hash.clone(),
            seq: firing_seq,
        };

        let (_firing_id, inserted) = ctx.store.write_sync_firing_atomic(&firing, &invocation)?;
        if inserted {
            ctx.cycle.record(flow, sync_id, &binding_hash);
            ctx.queue.enqueue(Event::Invocation(invocation));
            produced += 1;
        }
    }

    Ok(produced)
}

/// Resolves each argument template: `bound.<name>` (optionally wrapped in
/// `${...}`) resolves from `bindings`; anything else is taken as a literal
/// string.
fn resolve_args(
    args_template: &BTreeMap<String, String>,
    bindings: &BTreeMap<String, Value>,
) -> Result<Value, EngineError> {
    let mut resolved = BTreeMap::new();
    for (key, template) in args_template {
        let value = match bound_variable_name(template) {
            Some(var) => bindings
                .get(var)
                .cloned()
                .ok_or_else(|| EngineError::MissingBinding { var: var.to_string(), expr: template.clone() })?,
            None => Value::String(template.clone()),
        };
        resolved.insert(key.clone(), value);
    }
    Ok(Value::Object(resolved))
}

/// Extracts the binding name out of `bound.<name>` or `${bound.<name>}`,
/// or `None` if `template` is not a binding reference.
fn bound_variable_name(template: &str) -> Option<&str> {
    if let Some(inner) = template.strip_prefix("${").and_then(|rest| rest.strip_suffix('}')) {
        return inner.strip_prefix("bound.");
    }
    template.strip_prefix("bound.")
}

/// Builds the canonical hash input for an invocation identifier:
/// `{flow_token, action_uri, args, seq}`.
fn invocation_hash_input(
    flow: &FlowToken,
    action_ref: &syncengine_core::ActionRef,
    args: &Value,
    seq: u64,
) -> Value {
    let mut fields = BTreeMap::new();
    fields.insert("flow_token".to_string(), Value::String(flow.as_str().to_string()));
    fields.insert("action_uri".to_string(), Value::String(action_ref.as_str().to_string()));
    fields.insert("args".to_string(), args.clone());
    fields.insert("seq".to_string(), Value::Int(i64::try_from(seq).unwrap_or(i64::MAX)));
    Value::Object(fields)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic, reason = "Test-only panic-based assertions are permitted.")]
    use std::sync::Mutex;

    use syncengine_core::ActionRef;
    use syncengine_core::CompletionId;
    use syncengine_core::InvocationId as CoreInvocationId;
    use syncengine_core::LogicalClock;
    use syncengine_core::OutputCase;
    use syncengine_core::ProvenanceEdge;
    use syncengine_core::StoreError;

    use super::*;

    #[derive(Default)]
    struct FakeStore {
        firings: Mutex<Vec<(SyncFiring, Invocation)>>,
    }

    impl Store for FakeStore {
        fn write_invocation(&self, _invocation: &Invocation) -> Result<(), StoreError> {
            Ok(())
        }
        fn write_completion(&self, _completion: &Completion) -> Result<(), StoreError> {
            Ok(())
        }
        fn write_sync_firing_atomic(
            &self,
            firing: &SyncFiring,
            invocation: &Invocation,
        ) -> Result<(i64, bool), StoreError> {
            let mut firings = self.firings.lock().unwrap_or_else(|poison| poison.into_inner());
            let existing = firings.iter().position(|(existing_firing, _)| {
                existing_firing.completion_id == firing.completion_id
                    && existing_firing.sync_id == firing.sync_id
                    && existing_firing.binding_hash == firing.binding_hash
            });
            if let Some(index) = existing {
                return Ok((i64::try_from(index).unwrap_or(0), false));
            }
            firings.push((firing.clone(), invocation.clone()));
            Ok((i64::try_from(firings.len()).unwrap_or(0) - 1, true))
        }
        fn has_firing(
            &self,
            completion_id: &CompletionId,
            sync_id: &SyncId,
            binding_hash: &syncengine_core::BindingHash,
        ) -> Result<bool, StoreError> {
            let firings = self.firings.lock().unwrap_or_else(|poison| poison.into_inner());
            Ok(firings.iter().any(|(firing, _)| {
                &firing.completion_id == completion_id
                    && &firing.sync_id == sync_id
                    && &firing.binding_hash == binding_hash
            }))
        }
        fn read_invocation(&self, _id: &CoreInvocationId) -> Result<Invocation, StoreError> {
            Err(StoreError::NotFound { table: "invocations".to_string(), id: "?".to_string() })
        }
        fn read_completion(&self, _id: &CompletionId) -> Result<Completion, StoreError> {
            Err(StoreError::NotFound { table: "completions".to_string(), id: "?".to_string() })
        }
        fn read_flow(&self, _flow: &FlowToken) -> Result<(Vec<Invocation>, Vec<Completion>), StoreError> {
            Ok((Vec::new(), Vec::new()))
        }
        fn read_sync_firings_for_completion(
            &self,
            _completion_id: &CompletionId,
        ) -> Result<Vec<SyncFiring>, StoreError> {
            Ok(Vec::new())
        }
        fn read_provenance(&self, _invocation_id: &CoreInvocationId) -> Result<Vec<ProvenanceEdge>, StoreError> {
            Ok(Vec::new())
        }
        fn read_triggered(&self, _completion_id: &CompletionId) -> Result<Vec<Invocation>, StoreError> {
            Ok(Vec::new())
        }
        fn get_last_seq(&self) -> Result<u64, StoreError> {
            Ok(0)
        }
        fn get_last_seq_for_flow(&self, _flow: &FlowToken) -> Result<u64, StoreError> {
            Ok(0)
        }
        fn get_pending_invocations(&self, _flow: &FlowToken) -> Result<Vec<Invocation>, StoreError> {
            Ok(Vec::new())
        }
        fn find_orphaned_sync_firings(&self) -> Result<Vec<SyncFiring>, StoreError> {
            Ok(Vec::new())
        }
        fn find_incomplete_flows(&self) -> Result<Vec<FlowToken>, StoreError> {
            Ok(Vec::new())
        }
    }

    fn completion() -> Completion {
        Completion {
            id: CompletionId::new("comp-1"),
            invocation_id: CoreInvocationId::new("inv-0"),
            output_case: OutputCase::new("Success"),
            result: Value::empty_object(),
            seq: 2,
            security_context: Value::Null,
        }
    }

    fn then_clause() -> ThenClause {
        ThenClause {
            action_ref: ActionRef::parse("Ledger.record").unwrap(),
            args: BTreeMap::from([("order_id".to_string(), "bound.order_id".to_string())]),
        }
    }

    #[test]
    fn each_binding_produces_one_enqueued_invocation() {
        let store = FakeStore::default();
        let clock = LogicalClock::new(0);
        let cycle = CycleDetector::new();
        let queue = EventQueue::new();
        let ctx = ThenContext {
            store: &store,
            clock: &clock,
            cycle: &cycle,
            queue: &queue,
            spec_hash: "spec-1",
            engine_version: "0.1.0",
            ir_version: "1",
        };
        let bindings = vec![BTreeMap::from([(
            "order_id".to_string(),
            Value::String("o-1".to_string()),
        )])];

        let produced =
            execute_then(&ctx, &SyncId::new("s1"), &then_clause(), &FlowToken::new("f1"), &completion(), &bindings)
                .unwrap();

        assert_eq!(produced, 1);
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn a_different_completion_hitting_the_same_binding_detects_a_cycle() {
        let store = FakeStore::default();
        let clock = LogicalClock::new(0);
        let cycle = CycleDetector::new();
        let queue = EventQueue::new();
        let ctx = ThenContext {
            store: &store,
            clock: &clock,
            cycle: &cycle,
            queue: &queue,
            spec_hash: "spec-1",
            engine_version: "0.1.0",
            ir_version: "1",
        };
        let bindings = vec![BTreeMap::from([(
            "order_id".to_string(),
            Value::String("o-1".to_string()),
        )])];
        let flow = FlowToken::new("f1");
        let sync_id = SyncId::new("s1");
        let second_completion = Completion { id: CompletionId::new("comp-2"), ..completion() };

        execute_then(&ctx, &sync_id, &then_clause(), &flow, &completion(), &bindings).unwrap();
        let err = execute_then(&ctx, &sync_id, &then_clause(), &flow, &second_completion, &bindings).unwrap_err();
        assert!(matches!(err, EngineError::CycleDetected { .. }));
    }

    #[test]
    fn replaying_the_same_completion_is_a_silent_no_op() {
        let store = FakeStore::default();
        let clock = LogicalClock::new(0);
        let cycle = CycleDetector::new();
        let queue = EventQueue::new();
        let ctx = ThenContext {
            store: &store,
            clock: &clock,
            cycle: &cycle,
            queue: &queue,
            spec_hash: "spec-1",
            engine_version: "0.1.0",
            ir_version: "1",
        };
        let bindings = vec![BTreeMap::from([(
            "order_id".to_string(),
            Value::String("o-1".to_string()),
        )])];
        let flow = FlowToken::new("f1");
        let sync_id = SyncId::new("s1");
        let completion = completion();

        let first = execute_then(&ctx, &sync_id, &then_clause(), &flow, &completion, &bindings).unwrap();
        assert_eq!(first, 1);

        let replayed = execute_then(&ctx, &sync_id, &then_clause(), &flow, &completion, &bindings).unwrap();
        assert_eq!(replayed, 0);
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn missing_binding_is_reported() {
        let store = FakeStore::default();
        let clock = LogicalClock::new(0);
        let cycle = CycleDetector::new();
        let queue = EventQueue::new();
        let ctx = ThenContext {
            store: &store,
            clock: &clock,
            cycle: &cycle,
            queue: &queue,
            spec_hash: "spec-1",
            engine_version: "0.1.0",
            ir_version: "1",
        };
        let bindings = vec![BTreeMap::new()];
        let err = execute_then(
            &ctx,
            &SyncId::new("s1"),
            &then_clause(),
            &FlowToken::new("f1"),
            &completion(),
            &bindings,
        )
        .unwrap_err();
        assert!(matches!(err, EngineError::MissingBinding { .. }));
    }
}
