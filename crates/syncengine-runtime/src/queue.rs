// crates/syncengine-runtime/src/queue.rs
// ============================================================================
// Module: Event Queue
// Description: The single-consumer queue the engine loop drains.
// Purpose: Decouple ingestion (Enqueue, called from any thread) from the
//          engine loop's single-consumer drain (TryDequeue / Wait).
// Dependencies: std::sync, syncengine_core
// ============================================================================

//! ## Overview
//! There is no blocking `Dequeue`. The engine loop calls [`EventQueue::try_dequeue`]
//! in a tight drain, then [`EventQueue::wait`] to park until something new
//! arrives or the queue is closed. This is the non-blocking
//! `TryDequeue`-plus-`Wait` shape the recovery design settled on; a
//! fresh engine re-processing old events never blocks on an empty channel
//! that nothing will ever write to again.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::VecDeque;
use std::sync::Condvar;
use std::sync::Mutex;
use std::sync::PoisonError;
use std::time::Duration;

use syncengine_core::Completion;
use syncengine_core::Invocation;

// ============================================================================
// SECTION: Event
// ============================================================================

/// One item flowing through the queue: a freshly written invocation or an
/// arrived completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// A newly produced invocation, ready to be dispatched to its executor.
    Invocation(Invocation),
    /// A completion arriving for processing by the engine loop.
    Completion(Completion),
}

// ============================================================================
// SECTION: Queue
// ============================================================================

/// Mutex-guarded queue state.
struct QueueState {
    /// Pending events, in arrival order.
    items: VecDeque<Event>,
    /// Set by [`EventQueue::close`]; once true, [`EventQueue::enqueue`]
    /// rejects further items and [`EventQueue::wait`] returns immediately.
    closed: bool,
}

/// A single-consumer FIFO queue of [`Event`]s.
pub struct EventQueue {
    /// Queue contents, guarded by a mutex since producers may be concurrent.
    state: Mutex<QueueState>,
    /// Signals the one consumer when an item arrives or the queue closes.
    condvar: Condvar,
}

impl EventQueue {
    /// Creates an empty, open queue.
    #[must_use]
    pub fn new() -> Self {
        Self { state: Mutex::new(QueueState { items: VecDeque::new(), closed: false }), condvar: Condvar::new() }
    }

    /// Pushes `event` onto the queue and wakes a waiting consumer.
    ///
    /// Returns `false` without enqueueing anything if the queue has been
    /// closed.
    pub fn enqueue(&self, event: Event) -> bool {
        let mut state = lock(&self.state);
        if state.closed {
            return false;
        }
        state.items.push_back(event);
        self.condvar.notify_one();
        true
    }

    /// Pops the oldest pending event, or `None` if the queue is empty.
    /// Never blocks.
    pub fn try_dequeue(&self) -> Option<Event> {
        lock(&self.state).items.pop_front()
    }

    /// Blocks the calling thread until an event is available, the queue is
    /// closed, or `timeout` elapses — whichever comes first.
    ///
    /// Returns `true` if the wake was due to a state change (new item or
    /// close) rather than a bare timeout; callers should re-run
    /// [`EventQueue::try_dequeue`] regardless of the return value, since a
    /// timeout is simply a cue to re-check cancellation.
    pub fn wait(&self, timeout: Duration) -> bool {
        let state = lock(&self.state);
        if !state.items.is_empty() || state.closed {
            return true;
        }
        let (_guard, wait_result) =
            self.condvar.wait_timeout(state, timeout).unwrap_or_else(PoisonError::into_inner);
        !wait_result.timed_out()
    }

    /// Number of events currently queued.
    #[must_use]
    pub fn len(&self) -> usize {
        lock(&self.state).items.len()
    }

    /// Whether the queue currently has no pending events.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Closes the queue: further [`EventQueue::enqueue`] calls are rejected
    /// and any thread parked in [`EventQueue::wait`] is woken. Idempotent.
    pub fn close(&self) {
        let mut state = lock(&self.state);
        state.closed = true;
        self.condvar.notify_all();
    }

    /// Whether [`EventQueue::close`] has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        lock(&self.state).closed
    }
}

impl Default for EventQueue {
    fn default() -> Self {
        Self::new()
    }
}

/// Locks `mutex`, recovering the guard from a poisoned lock rather than
/// panicking — a panic on one producer thread should not wedge every other
/// caller of the queue.
fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
