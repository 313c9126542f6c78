//! Scheduler - Public Surface and Executor Loop
//!
//! # Overview
//!
//! The `Scheduler` is the driver-facing object: construct it from a seed
//! (or a recorded trace), spawn the root tasks, then `wait` for the run to
//! reach a verdict. One turn of the executor loop asks the core for a
//! decision, polls the chosen task to its next suspension point outside
//! any core borrow, and folds the poll result back into the registry.
//!
//! # Panic Boundary
//!
//! User code is polled under `catch_unwind`; a panicking task (including a
//! primitive-misuse panic) terminates the run with `Verdict::Panic`
//! carrying the offending task and the stringified payload.

use std::cell::RefCell;
use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::rc::Rc;
use std::task::{Context, Poll, Waker};
use std::time::Duration;

use tracing::debug;

use crate::domain::sync::channel::{after_channel, Channel};
use crate::domain::sync::{Cond, Mutex, RwLock};
use crate::domain::task::context::spawn_on;
use crate::domain::task::{TaskContext, TaskId};
use crate::domain::trace::{ChoiceStream, Trace};

use super::core::{Core, CoreHandle, TurnDecision};
use super::types::{SchedulerConfig, Verdict};

/// Builder for a [`Scheduler`].
///
/// # Example
///
/// ```rust
/// use std::time::Duration;
/// use interlace::Scheduler;
///
/// let sched = Scheduler::builder()
///     .seed(42)
///     .max_steps(1_000)
///     .max_logical(Duration::from_secs(5))
///     .build();
/// assert_eq!(sched.seed(), 42);
/// ```
#[derive(Default)]
pub struct SchedulerBuilder {
    config: SchedulerConfig,
    replay: Option<Trace>,
}

impl SchedulerBuilder {
    /// Start from the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the PRNG seed.
    pub fn seed(mut self, seed: u64) -> Self {
        self.config.seed = seed;
        self
    }

    /// Cap the number of scheduling turns.
    pub fn max_steps(mut self, max_steps: u64) -> Self {
        self.config.max_steps = max_steps;
        self
    }

    /// Cap the virtual time a run may reach.
    pub fn max_logical(mut self, max_logical: Duration) -> Self {
        self.config.max_logical = max_logical;
        self
    }

    /// Enable PRNG-driven spurious condvar wakeups.
    pub fn spurious(mut self, spurious: bool) -> Self {
        self.config.spurious = spurious;
        self
    }

    /// Replay a recorded trace instead of drawing fresh choices.
    ///
    /// The seed is taken from the trace. The trace stores only the choice
    /// sequence, so the other knobs (budgets, `spurious`) must match the
    /// recording configuration; a disagreement surfaces as a
    /// `TraceMismatch` verdict, never as silent divergence.
    pub fn replay(mut self, trace: Trace) -> Self {
        self.config.seed = trace.seed;
        self.replay = Some(trace);
        self
    }

    /// Construct the scheduler.
    pub fn build(self) -> Scheduler {
        let choices = match self.replay {
            Some(trace) => ChoiceStream::replay(trace),
            None => ChoiceStream::record(self.config.seed),
        };
        Scheduler {
            core: Rc::new(RefCell::new(Core::new(self.config, choices))),
        }
    }
}

/// The deterministic scheduler.
///
/// All user tasks are multiplexed onto the thread that calls [`wait`];
/// every nondeterministic choice flows through the seeded PRNG (or the
/// trace during replay). The public API must only be used from that one
/// thread.
///
/// # Example
///
/// ```rust
/// use interlace::Scheduler;
///
/// let sched = Scheduler::new(7);
/// let counter = std::rc::Rc::new(std::cell::Cell::new(0));
/// for _ in 0..4 {
///     let counter = counter.clone();
///     sched.spawn(move |_ctx| async move {
///         counter.set(counter.get() + 1);
///     });
/// }
/// assert!(sched.wait().is_done());
/// assert_eq!(counter.get(), 4);
/// ```
pub struct Scheduler {
    core: CoreHandle,
}

impl Scheduler {
    /// Create a scheduler with the given seed and default budgets.
    pub fn new(seed: u64) -> Self {
        Self::builder().seed(seed).build()
    }

    /// Start building a scheduler.
    pub fn builder() -> SchedulerBuilder {
        SchedulerBuilder::new()
    }

    /// Create a scheduler that replays a recorded trace.
    pub fn from_trace(trace: Trace) -> Self {
        Self::builder().replay(trace).build()
    }

    /// The seed this run is (or was) driven by.
    pub fn seed(&self) -> u64 {
        self.core.borrow().config.seed
    }

    /// Current virtual time since run start.
    pub fn now(&self) -> Duration {
        self.core.borrow().now()
    }

    /// Scheduling turns taken so far.
    pub fn steps(&self) -> u64 {
        self.core.borrow().steps
    }

    /// The run's choice trace: everything recorded so far in record mode,
    /// or the trace being replayed.
    pub fn trace(&self) -> Trace {
        self.core.borrow().choices.snapshot()
    }

    /// Register a new task; returns its identifier.
    ///
    /// Tasks spawned before `wait` form the root set; tasks may spawn
    /// further tasks through their [`TaskContext`].
    pub fn spawn<F, Fut>(&self, f: F) -> TaskId
    where
        F: FnOnce(TaskContext) -> Fut,
        Fut: Future<Output = ()> + 'static,
    {
        spawn_on(&self.core, f)
    }

    /// Raise `task`'s cancellation flag, waking it if it awaits
    /// [`done`](TaskContext::done).
    pub fn cancel(&self, task: TaskId) {
        self.core.borrow_mut().cancel(task);
    }

    /// Drive the run to its verdict.
    ///
    /// Re-invoking after completion is a no-op returning the prior verdict.
    pub fn wait(&self) -> Verdict {
        if let Some(verdict) = self.core.borrow().finished.clone() {
            return verdict;
        }
        let verdict = self.run();
        let mut core = self.core.borrow_mut();
        debug!(verdict = %verdict, steps = core.steps, "run finished");
        core.finished = Some(verdict.clone());
        core.teardown();
        verdict
    }

    fn run(&self) -> Verdict {
        loop {
            let decision = self.core.borrow_mut().next_turn();
            let task = match decision {
                TurnDecision::Finished(verdict) => return verdict,
                TurnDecision::Poll(task) => task,
            };

            let mut future = self
                .core
                .borrow_mut()
                .registry
                .take_future(task)
                .expect("ready task has no continuation");

            // Poll outside any core borrow so the task's primitive calls
            // can re-enter the engine.
            let poll = catch_unwind(AssertUnwindSafe(|| {
                let mut cx = Context::from_waker(Waker::noop());
                future.as_mut().poll(&mut cx)
            }));

            let mut core = self.core.borrow_mut();
            core.current = None;
            match poll {
                Ok(Poll::Ready(())) => core.registry.finish(task),
                Ok(Poll::Pending) => {
                    if core.registry.is_running(task) {
                        // Pending without parking: the task awaited a
                        // future the engine does not know how to wake.
                        core.registry.mark_panicked(task);
                        return Verdict::Panic {
                            task,
                            message: format!(
                                "{} task suspended outside an engine primitive",
                                super::types::MISUSE_TAG
                            ),
                        };
                    }
                    core.registry.store_future(task, future);
                }
                Err(payload) => {
                    core.registry.mark_panicked(task);
                    return Verdict::Panic {
                        task,
                        message: panic_message(payload.as_ref()),
                    };
                }
            }
        }
    }

    /// Create a mutex.
    pub fn mutex(&self) -> Mutex {
        Mutex::register(&self.core)
    }

    /// Create a reader/writer lock.
    pub fn rwlock(&self) -> RwLock {
        RwLock::register(&self.core)
    }

    /// Create a condition variable bound to `mutex`.
    pub fn cond(&self, mutex: &Mutex) -> Cond {
        Cond::register(&self.core, mutex)
    }

    /// Create a channel with the given capacity (0 = rendezvous).
    pub fn channel<T>(&self, capacity: usize) -> Channel<T> {
        Channel::register(&self.core, Some(capacity))
    }

    /// Create a channel that never parks senders.
    pub fn unbounded<T>(&self) -> Channel<T> {
        Channel::register(&self.core, None)
    }

    /// A single-use receiver that produces the firing instant (`now + d`)
    /// when the virtual clock reaches it.
    pub fn after(&self, d: Duration) -> Channel<Duration> {
        after_channel(&self.core, d)
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        // Continuations hold handles back to the core; clearing them here
        // keeps an unrun (or abandoned) scheduler from leaking its cycle.
        self.core.borrow_mut().teardown();
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
