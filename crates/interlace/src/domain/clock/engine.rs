//! Virtual Clock Engine
//!
//! # Overview
//!
//! A monotonically non-decreasing logical time plus a priority queue of
//! pending timers. The clock is entirely passive: it never advances on its
//! own, only when the scheduler finds the ready set empty and asks for the
//! earliest deadline. Ties in deadline fire in insertion order.

use std::collections::BinaryHeap;
use std::time::Duration;

use tracing::trace;

use super::types::{TimerEntry, TimerPayload, TimerSeq, VirtualTimeNs};

/// The virtual clock: `now` and the timer min-heap.
#[derive(Debug, Default)]
pub struct VirtualClock {
    now_ns: VirtualTimeNs,
    queue: BinaryHeap<TimerEntry>,
    next_seq: TimerSeq,
}

impl VirtualClock {
    /// Create a clock at logical time zero with no timers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current logical time in nanoseconds since run start.
    #[inline(always)]
    pub fn now_ns(&self) -> VirtualTimeNs {
        self.now_ns
    }

    /// Current logical time as a `Duration` since run start.
    #[inline]
    pub fn now(&self) -> Duration {
        Duration::from_nanos(self.now_ns)
    }

    /// Convert a user-supplied delay into an absolute deadline.
    ///
    /// Saturates at `u64::MAX` nanoseconds; a run that far into virtual
    /// time trips the logical budget long before the saturation matters.
    pub fn deadline_after(&self, delay: Duration) -> VirtualTimeNs {
        let delay_ns = u64::try_from(delay.as_nanos()).unwrap_or(u64::MAX);
        self.now_ns.saturating_add(delay_ns)
    }

    /// Register a timer. Deadlines in the past are a scheduler bug.
    pub fn schedule(&mut self, deadline_ns: VirtualTimeNs, payload: TimerPayload) {
        debug_assert!(
            deadline_ns >= self.now_ns,
            "timer scheduled in the past: {deadline_ns} < {}",
            self.now_ns
        );
        let seq = self.next_seq;
        self.next_seq += 1;
        trace!(deadline_ns, seq, payload = ?payload, "timer registered");
        self.queue.push(TimerEntry {
            deadline_ns,
            seq,
            payload,
        });
    }

    /// Returns `true` if at least one timer is pending.
    #[inline]
    pub fn has_timers(&self) -> bool {
        !self.queue.is_empty()
    }

    /// Number of pending timers.
    #[inline]
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Earliest pending deadline, if any.
    pub fn next_deadline(&self) -> Option<VirtualTimeNs> {
        self.queue.peek().map(|e| e.deadline_ns)
    }

    /// Advance `now` to `deadline_ns`.
    ///
    /// Time monotonicity is an invariant, not a policy: the scheduler only
    /// ever advances to the earliest pending deadline.
    pub fn advance_to(&mut self, deadline_ns: VirtualTimeNs) {
        assert!(
            deadline_ns >= self.now_ns,
            "virtual time moved backward: {deadline_ns} < {}",
            self.now_ns
        );
        if deadline_ns > self.now_ns {
            trace!(from = self.now_ns, to = deadline_ns, "clock advanced");
        }
        self.now_ns = deadline_ns;
    }

    /// Remove and return every timer due at or before the current time,
    /// in `(deadline, insertion seq)` order.
    pub fn pop_due(&mut self) -> Vec<TimerEntry> {
        let mut due = Vec::new();
        while let Some(next) = self.queue.peek() {
            if next.deadline_ns > self.now_ns {
                break;
            }
            due.push(self.queue.pop().expect("peeked entry exists"));
        }
        due
    }

    /// Drop all pending timers (end-of-run teardown).
    pub fn clear(&mut self) {
        self.queue.clear();
    }
}
