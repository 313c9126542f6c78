//! Domain Layer - The Engine Proper
//!
//! # Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Domain Layer                            │
//! ├─────────────────────────────────────────────────────────────┤
//! │                                                             │
//! │  sched                         sync                         │
//! │  ├─ Scheduler (run loop)       ├─ Mutex / RwLock            │
//! │  ├─ Core (shared context)      ├─ Cond                      │
//! │  └─ Verdict / budgets          └─ Channel<T>                │
//! │         │                            │                      │
//! │         │   park / wake / choices    │                      │
//! │         ▼                            ▼                      │
//! │  task                          clock            trace       │
//! │  ├─ TaskRegistry               ├─ VirtualClock  ├─ Trace    │
//! │  └─ TaskContext                └─ TimerEntry    └─ replay   │
//! │                                                             │
//! │                        rng                                  │
//! │                        └─ Xoshiro256StarStar                │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! The scheduler, registry, clock, and primitives share one
//! executor-thread-only context object; the PRNG (or a recorded trace) is
//! the sole source of nondeterminism.

pub mod clock;
pub mod rng;
pub mod sched;
pub mod sync;
pub mod task;
pub mod trace;

pub use sched::{
    DeadlockReport, ParkedTask, Scheduler, SchedulerBuilder, SchedulerConfig, Verdict,
    MISUSE_TAG,
};
pub use sync::{Channel, Cond, Mutex, RwLock};
pub use task::{ParkReason, ResourceId, TaskContext, TaskId, TaskState};
pub use trace::{ChoiceDomain, ChoiceRecord, ReplayMismatch, Trace, TRACE_VERSION};
