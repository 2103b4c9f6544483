// crates/syncengine-runtime/src/engine.rs
// ============================================================================
// Module: Engine
// Description: Registration, the single-consumer event loop, and the
//              external library surface (Enqueue, NewFlow, Run, Stop).
// Purpose: Tie the matcher, where-executor, then-executor, cycle detector,
//          and quota enforcer into one deterministic completion pipeline.
// Dependencies: syncengine_core, crate::{cycle, error, flow, queue, quota,
//               then_exec, where_exec}
// ============================================================================

//! ## Overview
//! [`Engine::run`] drains the queue in a tight loop, parking on
//! [`EventQueue::wait`] between bursts, until [`Engine::stop`] closes the
//! queue and the last pending event has been processed. Each dequeued event
//! produces one [`EventOutcome`]; a failure in one sync rule's evaluation
//! never aborts evaluation of the sync rules registered after it — the
//! engine logs the error onto that event's outcome and continues, except for
//! [`syncengine_core::StoreError`]-level completion/quota failures, which
//! abort the whole completion's evaluation since nothing downstream of a
//! failed write or a spent quota can be trusted.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::RwLock;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::time::Duration;

use syncengine_core::Completion;
use syncengine_core::FlowToken;
use syncengine_core::Invocation;
use syncengine_core::LogicalClock;
use syncengine_core::SpecError;
use syncengine_core::Store;
use syncengine_core::StateStore;
use syncengine_core::SyncId;
use syncengine_core::SyncRule;
use syncengine_core::match_when;

use crate::cycle::CycleDetector;
use crate::error::EngineError;
use crate::flow::FlowTokenGenerator;
use crate::quota::QuotaEnforcer;
use crate::queue::Event;
use crate::queue::EventQueue;
use crate::then_exec::ThenContext;
use crate::then_exec::execute_then;
use crate::where_exec::execute_where;

// ============================================================================
// SECTION: Combined Store Trait
// ============================================================================

/// A backend that serves both the causality log and concept state tables —
/// everything the engine needs from durable storage. Implemented for any
/// type implementing both [`Store`] and [`StateStore`], so a single
/// `Arc<dyn EngineStore>` is enough to construct an [`Engine`].
pub trait EngineStore: Store + StateStore {}

impl<T: Store + StateStore> EngineStore for T {}

// ============================================================================
// SECTION: Configuration
// ============================================================================

/// Tunable engine parameters, set once at construction.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Per-flow step ceiling; see [`crate::quota`].
    pub max_steps_per_flow: usize,
    /// The logical clock's starting value; recovery callers pass the
    /// store's recorded maximum `seq` here.
    pub clock_start: u64,
}

impl EngineConfig {
    /// Sets [`EngineConfig::max_steps_per_flow`].
    #[must_use]
    pub const fn with_max_steps(mut self, max_steps_per_flow: usize) -> Self {
        self.max_steps_per_flow = max_steps_per_flow;
        self
    }

    /// Sets [`EngineConfig::clock_start`].
    #[must_use]
    pub const fn with_clock_start(mut self, clock_start: u64) -> Self {
        self.clock_start = clock_start;
        self
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self { max_steps_per_flow: crate::quota::DEFAULT_MAX_STEPS_PER_FLOW, clock_start: 0 }
    }
}

// ============================================================================
// SECTION: Event Outcome
// ============================================================================

/// The structured result of processing one dequeued event, returned from
/// [`Engine::run`] for the caller to log or assert against.
#[derive(Debug)]
pub struct EventOutcome {
    /// `"invocation"` or `"completion"`, naming which kind of event this was.
    pub kind: &'static str,
    /// The flow the event belongs to, when known.
    pub flow: Option<FlowToken>,
    /// The event's logical clock value.
    pub seq: u64,
    /// Number of new invocations produced while evaluating this event.
    pub firings: usize,
    /// Every error encountered while processing this event; the loop
    /// continues past each one rather than aborting the whole event.
    pub errors: Vec<EngineError>,
}

impl EventOutcome {
    /// Whether this event's evaluation hit at least one error.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

// ============================================================================
// SECTION: Engine
// ============================================================================

/// The reactive sync engine: registered rules, durable store, and the
/// runtime state (clock, cycle history, quota counters, event queue) that
/// drives completion processing.
pub struct Engine {
    /// Combined causality-log and concept-state backend.
    store: Arc<dyn EngineStore>,
    /// Mints flow tokens for [`Engine::new_flow`].
    flow_gen: Box<dyn FlowTokenGenerator>,
    /// Registered sync rules, in registration (and evaluation) order.
    syncs: RwLock<Vec<SyncRule>>,
    /// The event queue the engine loop drains.
    queue: EventQueue,
    /// The logical clock, shared by invocation and firing seq stamps.
    clock: LogicalClock,
    /// Per-flow fired-binding history.
    cycle: CycleDetector,
    /// Per-flow step counters.
    quota: QuotaEnforcer,
    /// Opaque spec fingerprint stamped onto every produced invocation.
    spec_hash: String,
    /// Engine version stamped onto every produced invocation.
    engine_version: String,
    /// IR version stamped onto every produced invocation.
    ir_version: String,
}

impl Engine {
    /// Creates an engine over `store`, configured by `config`. `spec_hash` is
    /// an opaque fingerprint of the compiled spec this engine was built
    /// from, stamped verbatim onto every invocation it produces.
    pub fn new(
        store: Arc<dyn EngineStore>,
        flow_gen: Box<dyn FlowTokenGenerator>,
        config: &EngineConfig,
        spec_hash: impl Into<String>,
    ) -> Self {
        Self {
            store,
            flow_gen,
            syncs: RwLock::new(Vec::new()),
            queue: EventQueue::new(),
            clock: LogicalClock::new(config.clock_start),
            cycle: CycleDetector::new(),
            quota: QuotaEnforcer::new(config.max_steps_per_flow),
            spec_hash: spec_hash.into(),
            engine_version: env!("CARGO_PKG_VERSION").to_string(),
            ir_version: "1".to_string(),
        }
    }

    // ------------------------------------------------------------------
    // Registration
    // ------------------------------------------------------------------

    /// Replaces the registered sync rules with `syncs`, validating that
    /// every [`SyncId`] is unique and every `Keyed` scope names a key.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Spec`] on the first validation failure; the
    /// previously registered rules are left untouched.
    pub fn register_syncs(&self, syncs: Vec<SyncRule>) -> Result<(), EngineError> {
        validate_syncs(&syncs)?;
        let mut guard = self.syncs.write().unwrap_or_else(std::sync::PoisonError::into_inner);
        *guard = syncs;
        Ok(())
    }

    /// Returns a snapshot of the currently registered sync rules, in
    /// evaluation order.
    #[must_use]
    pub fn syncs(&self) -> Vec<SyncRule> {
        self.syncs.read().unwrap_or_else(std::sync::PoisonError::into_inner).clone()
    }

    // ------------------------------------------------------------------
    // Library Surface
    // ------------------------------------------------------------------

    /// Enqueues an event for processing. Returns `false` if the engine has
    /// been stopped.
    pub fn enqueue(&self, event: Event) -> bool {
        self.queue.enqueue(event)
    }

    /// Mints a fresh flow token.
    #[must_use]
    pub fn new_flow(&self) -> FlowToken {
        self.flow_gen.new_flow()
    }

    /// Closes the event queue. [`Engine::run`] drains any remaining events
    /// and then returns. Idempotent.
    pub fn stop(&self) {
        self.queue.close();
    }

    /// Drains the event queue until it is closed and empty, or `cancel` is
    /// set. Returns the [`EventOutcome`] of every event processed.
    pub fn run(&self, cancel: &AtomicBool) -> Vec<EventOutcome> {
        let mut outcomes = Vec::new();
        loop {
            while let Some(event) = self.queue.try_dequeue() {
                outcomes.push(self.process_event(event));
            }
            if cancel.load(Ordering::Relaxed) || self.queue.is_closed() {
                break;
            }
            self.queue.wait(Duration::from_millis(100));
        }
        outcomes
    }

    // ------------------------------------------------------------------
    // Introspection
    // ------------------------------------------------------------------

    /// The logical clock's current value.
    #[must_use]
    pub fn clock(&self) -> u64 {
        self.clock.current()
    }

    /// Number of events currently queued.
    #[must_use]
    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    /// Number of flows with a nonzero quota step count.
    #[must_use]
    pub fn quota_count(&self) -> usize {
        self.quota.tracked_flows()
    }

    /// Current quota step count for `flow`.
    #[must_use]
    pub fn quota_for(&self, flow: &FlowToken) -> usize {
        self.quota.count_for(flow)
    }

    /// Drops `flow`'s quota counter and cycle history, freeing both for
    /// reuse (e.g. by an operator retrying a flow token).
    pub fn cleanup_flow(&self, flow: &FlowToken) {
        self.quota.cleanup_flow(flow);
        self.cycle.clear(flow);
    }

    /// Clears only `flow`'s cycle history, leaving its quota counter intact.
    pub fn clear_flow_cycle_history(&self, flow: &FlowToken) {
        self.cycle.clear(flow);
    }

    // ------------------------------------------------------------------
    // Event Processing
    // ------------------------------------------------------------------

    /// Dispatches one dequeued event to its handler.
    fn process_event(&self, event: Event) -> EventOutcome {
        match event {
            Event::Invocation(invocation) => self.process_invocation(&invocation),
            Event::Completion(completion) => self.process_completion(&completion),
        }
    }

    /// Persists a produced invocation. The engine does not evaluate
    /// when-clauses of type `Invoked` today; this stage only durably records
    /// the invocation so [`Store::read_invocation`] can resolve it once its
    /// completion arrives.
    fn process_invocation(&self, invocation: &Invocation) -> EventOutcome {
        let mut errors = Vec::new();
        if let Err(err) = self.store.write_invocation(invocation) {
            errors.push(EngineError::Store(err));
        }
        EventOutcome {
            kind: "invocation",
            flow: Some(invocation.flow_token.clone()),
            seq: invocation.seq,
            firings: 0,
            errors,
        }
    }

    /// Writes `completion`, checks the flow's quota, then evaluates every
    /// registered sync rule against it in registration order.
    fn process_completion(&self, completion: &Completion) -> EventOutcome {
        let mut errors = Vec::new();

        if let Err(err) = self.store.write_completion(completion) {
            errors.push(EngineError::Store(err));
            return EventOutcome { kind: "completion", flow: None, seq: completion.seq, firings: 0, errors };
        }

        let invocation = match self.store.read_invocation(&completion.invocation_id) {
            Ok(invocation) => invocation,
            Err(err) => {
                errors.push(EngineError::Store(err));
                return EventOutcome { kind: "completion", flow: None, seq: completion.seq, firings: 0, errors };
            }
        };
        let flow = invocation.flow_token.clone();

        if let Err(err) = self.quota.check(&flow) {
            errors.push(EngineError::StepsExceeded(err));
            return EventOutcome {
                kind: "completion",
                flow: Some(flow),
                seq: completion.seq,
                firings: 0,
                errors,
            };
        }

        let syncs = self.syncs.read().unwrap_or_else(std::sync::PoisonError::into_inner).clone();
        let mut total_firings = 0_usize;

        for sync in &syncs {
            if !match_when(&sync.when, &invocation, completion) {
                continue;
            }
            match self.evaluate_sync(sync, &flow, completion) {
                Ok(firings) => total_firings += firings,
                Err(err) => errors.push(err),
            }
        }

        EventOutcome { kind: "completion", flow: Some(flow), seq: completion.seq, firings: total_firings, errors }
    }

    /// Runs one matched sync rule's when-binding extraction, where fan-out,
    /// and then-execution.
    fn evaluate_sync(
        &self,
        sync: &SyncRule,
        flow: &FlowToken,
        completion: &Completion,
    ) -> Result<usize, EngineError> {
        let when_bindings = syncengine_core::extract_bindings(&sync.when, completion)?;
        let binding_list = execute_where(
            self.store.as_ref(),
            sync.then_where.as_ref(),
            &sync.scope,
            flow,
            &when_bindings,
        )?;

        let ctx = ThenContext {
            store: self.store.as_ref(),
            clock: &self.clock,
            cycle: &self.cycle,
            queue: &self.queue,
            spec_hash: &self.spec_hash,
            engine_version: &self.engine_version,
            ir_version: &self.ir_version,
        };
        execute_then(&ctx, &sync.id, &sync.then, flow, completion, &binding_list)
    }
}

/// Validates sync ids are unique and `Keyed` scopes name a key.
fn validate_syncs(syncs: &[SyncRule]) -> Result<(), SpecError> {
    let mut seen: BTreeMap<&SyncId, ()> = BTreeMap::new();
    for sync in syncs {
        if seen.insert(&sync.id, ()).is_some() {
            return Err(SpecError::DuplicateSyncId(sync.id.as_str().to_string()));
        }
        if matches!(sync.scope.mode, syncengine_core::ScopeMode::Keyed) && sync.scope.key.is_none() {
            return Err(SpecError::InvalidScope {
                sync_id: sync.id.as_str().to_string(),
                detail: "keyed scope requires a key".to_string(),
            });
        }
    }
    Ok(())
}
