//! Scheduler Types - Configuration, Verdicts, Reports
//!
//! # Design Notes
//!
//! Errors here fall into the four disjoint kinds the engine distinguishes:
//! misuse (a protocol violation, surfaced by panicking the offending task
//! with a stable tag), progress failure (deadlock), budget exhaustion
//! (step or logical-time timeout), and replay failure (trace mismatch).
//! All of them converge into a single `Verdict` returned by `wait`.

use std::fmt;
use std::time::Duration;

use crate::domain::task::{ParkReason, ResourceId, TaskId};
use crate::domain::trace::ReplayMismatch;

/// Stable prefix carried by every protocol-violation panic.
///
/// Primitive misuse (unlock of an unlocked mutex, send on a closed channel,
/// ...) panics the offending task with a message starting with this tag,
/// which the executor converts into a `Verdict::Panic`. The tag is part of
/// the engine's contract: drivers may match on it.
pub const MISUSE_TAG: &str = "misuse:";

/// Panic the offending task with the stable misuse tag.
///
/// The panic unwinds to the executor's poll boundary, where it becomes a
/// `Verdict::Panic`. Invoked outside a task (on the driver), it aborts the
/// run with the same diagnostic.
#[cold]
pub(crate) fn misuse(message: &str) -> ! {
    panic!("{MISUSE_TAG} {message}")
}

/// Default cap on scheduling turns per run.
pub const DEFAULT_MAX_STEPS: u64 = 10_000_000;

/// Default cap on virtual time per run.
pub const DEFAULT_MAX_LOGICAL: Duration = Duration::from_secs(60);

/// Scheduler configuration.
///
/// Built through [`SchedulerBuilder`](crate::SchedulerBuilder); every knob
/// has a documented default so `Scheduler::new(seed)` is all most tests
/// need.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Seed for the engine's PRNG; the sole source of nondeterminism.
    pub seed: u64,
    /// Maximum number of scheduling turns before `TimeoutSteps`.
    pub max_steps: u64,
    /// Maximum virtual time before `TimeoutLogical`.
    pub max_logical: Duration,
    /// Inject PRNG-driven spurious condvar wakeups (recorded in the trace).
    pub spurious: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            max_steps: DEFAULT_MAX_STEPS,
            max_logical: DEFAULT_MAX_LOGICAL,
            spurious: false,
        }
    }
}

/// One parked task in a deadlock report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParkedTask {
    /// The task that cannot make progress.
    pub task: TaskId,
    /// The resource it is parked on; `None` for a cancellation wait.
    pub resource: Option<ResourceId>,
    /// What it was trying to do.
    pub reason: ParkReason,
}

impl fmt::Display for ParkedTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.resource {
            Some(r) => write!(f, "{} {} on {}", self.task, self.reason, r),
            None => write!(f, "{} {}", self.task, self.reason),
        }
    }
}

/// Global quiescence with tasks still parked: nothing can ever run again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeadlockReport {
    /// Every parked task with the resource it is parked on.
    pub parked: Vec<ParkedTask>,
}

impl fmt::Display for DeadlockReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "deadlock: ")?;
        for (i, p) in self.parked.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{p}")?;
        }
        Ok(())
    }
}

/// Outcome of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// Quiescent termination: every task finished, nothing parked.
    Done,
    /// No task runnable, no timers pending, parked tasks remain.
    Deadlock(DeadlockReport),
    /// The turn budget was exhausted.
    ///
    /// The budget is checked between turns, when no task is running, so
    /// the verdict names only the cap that was hit.
    TimeoutSteps {
        /// The configured cap that was hit.
        limit: u64,
    },
    /// The virtual-time budget was exhausted.
    TimeoutLogical {
        /// The configured cap that was hit.
        limit: Duration,
        /// The deadline the clock would have advanced to.
        next_deadline: Duration,
    },
    /// A task panicked (user panic or primitive misuse).
    Panic {
        /// The offending task.
        task: TaskId,
        /// The panic payload, stringified. Misuse panics start with
        /// [`MISUSE_TAG`].
        message: String,
    },
    /// Replay diverged from the recorded trace.
    TraceMismatch(ReplayMismatch),
}

impl Verdict {
    /// Returns `true` for quiescent termination.
    pub fn is_done(&self) -> bool {
        matches!(self, Verdict::Done)
    }

    /// Returns `true` for a deadlock verdict.
    pub fn is_deadlock(&self) -> bool {
        matches!(self, Verdict::Deadlock(_))
    }

    /// Returns `true` for either timeout verdict.
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            Verdict::TimeoutSteps { .. } | Verdict::TimeoutLogical { .. }
        )
    }

    /// Assert quiescent termination, re-raising a task panic verbatim.
    ///
    /// # Panics
    ///
    /// Panics with the task's message for `Panic`, and with a description
    /// of the verdict otherwise.
    pub fn unwrap_done(self) {
        match self {
            Verdict::Done => {}
            Verdict::Panic { task, message } => {
                panic!("{task} panicked: {message}")
            }
            other => panic!("run did not finish cleanly: {other}"),
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Done => write!(f, "done"),
            Verdict::Deadlock(report) => write!(f, "{report}"),
            Verdict::TimeoutSteps { limit } => {
                write!(f, "step budget exhausted ({limit} turns)")
            }
            Verdict::TimeoutLogical {
                limit,
                next_deadline,
            } => write!(
                f,
                "logical-time budget exhausted ({limit:?} cap, next deadline {next_deadline:?})"
            ),
            Verdict::Panic { task, message } => write!(f, "{task} panicked: {message}"),
            Verdict::TraceMismatch(m) => write!(f, "{m}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SchedulerConfig::default();
        assert_eq!(config.max_steps, DEFAULT_MAX_STEPS);
        assert_eq!(config.max_logical, DEFAULT_MAX_LOGICAL);
        assert!(!config.spurious);
    }

    #[test]
    fn test_verdict_predicates() {
        assert!(Verdict::Done.is_done());
        assert!(Verdict::TimeoutSteps { limit: 10 }.is_timeout());
        assert!(Verdict::Deadlock(DeadlockReport { parked: vec![] }).is_deadlock());
    }

    #[test]
    fn test_deadlock_display_lists_parked_tasks() {
        let report = DeadlockReport {
            parked: vec![
                ParkedTask {
                    task: TaskId::new(0),
                    resource: Some(ResourceId::new(1)),
                    reason: ParkReason::MutexLock,
                },
                ParkedTask {
                    task: TaskId::new(1),
                    resource: Some(ResourceId::new(0)),
                    reason: ParkReason::MutexLock,
                },
            ],
        };
        let s = format!("{report}");
        assert!(s.contains("Task(0) mutex-lock on Resource(1)"));
        assert!(s.contains("Task(1) mutex-lock on Resource(0)"));
    }

    #[test]
    #[should_panic(expected = "boom")]
    fn test_unwrap_done_reraises_panic_message() {
        Verdict::Panic {
            task: TaskId::new(0),
            message: "boom".into(),
        }
        .unwrap_done();
    }
}
