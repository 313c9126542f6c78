//! Scheduler Core
//!
//! The run loop that serializes all tasks: at every turn it picks one
//! runnable task through the seeded PRNG (or the trace during replay),
//! resumes it to its next suspension point, advances the virtual clock
//! when nothing is runnable, and declares deadlock when no progress is
//! possible. Step and logical-time budgets bound every run.

pub(crate) mod core;
mod engine;
pub(crate) mod types;

pub use engine::{Scheduler, SchedulerBuilder};
pub use types::{
    DeadlockReport, ParkedTask, SchedulerConfig, Verdict, DEFAULT_MAX_LOGICAL, DEFAULT_MAX_STEPS,
    MISUSE_TAG,
};
