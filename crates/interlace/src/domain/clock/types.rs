//! Virtual Clock Types
//!
//! The engine measures time as a logical duration from run start; nothing
//! here ever consults the wall clock.

use std::cmp::Ordering;
use std::fmt;

use crate::domain::sync::channel::AfterSlot;
use crate::domain::task::TaskId;

/// Virtual time in nanoseconds since run start.
pub type VirtualTimeNs = u64;

/// Insertion sequence number for timers.
///
/// Strictly increasing per clock; breaks deadline ties so that timers fire
/// in the order they were registered.
pub type TimerSeq = u64;

/// What a timer does when it fires.
pub enum TimerPayload {
    /// Wake a task parked by `sleep`.
    WakeTask(TaskId),
    /// Deliver the firing instant through an `after` channel.
    Deliver(AfterSlot),
}

impl fmt::Debug for TimerPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimerPayload::WakeTask(id) => write!(f, "WakeTask({id})"),
            TimerPayload::Deliver(_) => write!(f, "Deliver(after)"),
        }
    }
}

/// A pending timer in the clock's priority queue.
///
/// Ordering is by `(deadline_ns, seq)` with `Ord` reversed so that a
/// `BinaryHeap` acts as a min-heap: earliest deadline first, insertion
/// order within a deadline.
#[derive(Debug)]
pub struct TimerEntry {
    /// When this timer fires (virtual time).
    pub deadline_ns: VirtualTimeNs,
    /// Insertion sequence, the deterministic tie-break.
    pub seq: TimerSeq,
    /// What to do at firing time.
    pub payload: TimerPayload,
}

impl PartialEq for TimerEntry {
    fn eq(&self, other: &Self) -> bool {
        self.deadline_ns == other.deadline_ns && self.seq == other.seq
    }
}

impl Eq for TimerEntry {}

impl PartialOrd for TimerEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TimerEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed: earlier deadline is "greater" so BinaryHeap pops it
        // first; same deadline resolves to lower insertion seq.
        match other.deadline_ns.cmp(&self.deadline_ns) {
            Ordering::Equal => other.seq.cmp(&self.seq),
            ord => ord,
        }
    }
}
