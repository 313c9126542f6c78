//! Virtual Time and Timers
//!
//! Logical time is a single non-negative duration from run start plus a
//! min-heap of pending timers keyed by `(deadline, insertion seq)`. The
//! clock advances only when the scheduler has no runnable task, and jumps
//! directly to the earliest deadline; it never consults the host clock.

mod engine;
mod types;

pub use engine::VirtualClock;
pub use types::{TimerEntry, TimerPayload, TimerSeq, VirtualTimeNs};
