// crates/syncengine-core/src/core/clock.rs
// ============================================================================
// Module: Logical Clock
// Description: Thread-safe monotonic integer sequence generator.
// Purpose: Stamp every event with a strictly increasing seq, resumable from
//          a stored maximum after recovery.
// Dependencies: std::sync::atomic
// ============================================================================

//! ## Overview
//! The engine never reads wall-clock time to order events; it stamps every
//! invocation and completion with a value from this clock instead. A single
//! clock instance is owned by the engine loop, but the primitive itself is
//! safe for any caller — concurrent [`LogicalClock::next`] calls are
//! linearizable.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

// ============================================================================
// SECTION: Logical Clock
// ============================================================================

/// A monotonically increasing 64-bit logical clock.
#[derive(Debug)]
pub struct LogicalClock {
    /// Current counter value; the next call to [`LogicalClock::next`] returns
    /// this plus one.
    current: AtomicU64,
}

impl LogicalClock {
    /// Creates a clock starting at `start`. After recovery, callers should
    /// pass the stored maximum `seq` so new events never collide with
    /// historical ones.
    #[must_use]
    pub const fn new(start: u64) -> Self {
        Self { current: AtomicU64::new(start) }
    }

    /// Atomically increments the clock and returns the new value.
    pub fn next(&self) -> u64 {
        self.current.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Reads the current value without incrementing it.
    #[must_use]
    pub fn current(&self) -> u64 {
        self.current.load(Ordering::SeqCst)
    }
}

impl Default for LogicalClock {
    fn default() -> Self {
        Self::new(0)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use super::*;

    #[test]
    fn next_is_strictly_increasing() {
        let clock = LogicalClock::new(0);
        assert_eq!(clock.next(), 1);
        assert_eq!(clock.next(), 2);
        assert_eq!(clock.current(), 2);
    }

    #[test]
    fn resumes_above_stored_maximum() {
        let clock = LogicalClock::new(41);
        assert_eq!(clock.next(), 42);
    }

    #[test]
    fn concurrent_next_calls_are_linearizable() {
        let clock = Arc::new(LogicalClock::new(0));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let clock = Arc::clone(&clock);
                thread::spawn(move || (0..100).map(|_| clock.next()).collect::<Vec<_>>())
            })
            .collect();
        let mut all: Vec<u64> =
            handles.into_iter().flat_map(|handle| handle.join().unwrap_or_default()).collect();
        all.sort_unstable();
        let expected: Vec<u64> = (1..=800).collect();
        assert_eq!(all, expected);
    }
}
