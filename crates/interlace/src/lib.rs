//! Interlace - Deterministic Concurrency Testing Engine
//!
//! # Overview
//!
//! `interlace` lets a test author write concurrent programs against a
//! small set of synchronization primitives (task spawn, mutex, rwlock,
//! condition variable, channel, sleep, timer) and execute them under a
//! **seed-driven scheduler** that produces the same global interleaving
//! every time a seed is reused.
//!
//! All logical tasks are multiplexed onto a single executor thread. At
//! every scheduling point the next task is a pure function of a seeded
//! PRNG and the set of runnable tasks; sleep and timer operations advance
//! a virtual clock instead of the wall clock; and when no task can make
//! progress the engine reports a deadlock with every parked task and the
//! resource it is parked on.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────┐
//! │       Scheduler          │ ← seed in, verdict out
//! │  ┌────────────────────┐  │
//! │  │       Core         │  │ ← ready set, turn loop
//! │  │  ┌──────────────┐  │  │
//! │  │  │ TaskRegistry │  │  │ ← continuations, lifecycle
//! │  │  ├──────────────┤  │  │
//! │  │  │ VirtualClock │  │  │ ← logical time, timers
//! │  │  ├──────────────┤  │  │
//! │  │  │ ChoiceStream │  │  │ ← PRNG or trace replay
//! │  │  └──────────────┘  │  │
//! │  └────────────────────┘  │
//! │   Mutex RwLock Cond Chan │ ← park/wake state machines
//! └──────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```rust
//! use interlace::Scheduler;
//! use std::cell::Cell;
//! use std::rc::Rc;
//!
//! let sched = Scheduler::new(42);
//! let mutex = sched.mutex();
//! let counter = Rc::new(Cell::new(0u32));
//!
//! for _ in 0..10 {
//!     let mutex = mutex.clone();
//!     let counter = counter.clone();
//!     sched.spawn(move |_ctx| async move {
//!         mutex.lock().await;
//!         counter.set(counter.get() + 1);
//!         mutex.unlock();
//!     });
//! }
//!
//! sched.wait().unwrap_done();
//! assert_eq!(counter.get(), 10);
//! ```
//!
//! # Determinism Contract
//!
//! For a fixed seed and user program, two runs produce the same verdict,
//! the same task-resume order, the same wait-list membership at every
//! step, and byte-identical choice traces - across platforms. No wall
//! clock call influences any decision; the seeded PRNG (or a recorded
//! trace during replay) is the only source of nondeterminism.
//!
//! # Threading
//!
//! The engine is deliberately single-threaded: the public API must only be
//! called on the thread driving [`Scheduler::wait`]. There is no
//! preemption and no parallel execution of user tasks; a task runs
//! uninterrupted between suspension points.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod domain;
pub mod infrastructure;

pub use domain::{
    Channel, ChoiceDomain, ChoiceRecord, Cond, DeadlockReport, Mutex, ParkReason, ParkedTask,
    ReplayMismatch, ResourceId, RwLock, Scheduler, SchedulerBuilder, SchedulerConfig, TaskContext,
    TaskId, TaskState, Trace, Verdict, MISUSE_TAG, TRACE_VERSION,
};
pub use infrastructure::{read_trace, write_trace, TraceFileError};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_defined() {
        assert!(!VERSION.is_empty());
    }
}
