// crates/syncengine-runtime/src/lib.rs
// ============================================================================
// Module: Sync Engine Runtime Library
// Description: Public API surface for the reactive engine loop.
// Purpose: Expose the Engine, its event queue, flow-token generation, cycle
//          and quota enforcement, the where/then executors, and crash
//          recovery, wired against any backend implementing
//          syncengine_core::{Store, StateStore}.
// Dependencies: crate::{cycle, engine, error, flow, queue, quota, recovery,
//               then_exec, where_exec}
// ============================================================================

//! ## Overview
//! This crate turns the matcher and data model exposed by
//! [`syncengine_core`] into a runnable engine: a single-consumer
//! [`EventQueue`], a per-flow [`CycleDetector`] and [`QuotaEnforcer`], the
//! where-clause fan-out and then-clause firing stages, and [`Engine`] itself,
//! which ties them together into the dequeue-match-fire loop. [`recovery`]
//! is a pure projection over [`syncengine_core::Store`] and does not depend
//! on any other module here, so it can run against a store no live engine
//! has touched.

// ============================================================================
// SECTION: Modules
// ============================================================================

mod cycle;
mod engine;
mod error;
mod flow;
mod queue;
mod quota;
pub mod recovery;
mod then_exec;
mod where_exec;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use cycle::CycleDetector;
pub use engine::Engine;
pub use engine::EngineConfig;
pub use engine::EngineStore;
pub use engine::EventOutcome;
pub use error::EngineError;
pub use flow::FixedSequenceFlowTokenGenerator;
pub use flow::FlowTokenGenerator;
pub use flow::Uuidv7FlowTokenGenerator;
pub use queue::Event;
pub use queue::EventQueue;
pub use quota::DEFAULT_MAX_STEPS_PER_FLOW;
pub use quota::QuotaEnforcer;
pub use quota::QuotaExceeded;
pub use recovery::FlowState;
pub use recovery::ReplayEvent;
pub use recovery::find_incomplete_flows;
pub use recovery::load_flow_state;
pub use recovery::replay_sequence;
