//! Engine Core - Shared State Behind Every Handle
//!
//! # Overview
//!
//! The scheduler, registry, clock, choice stream, and primitives form a
//! cycle: primitives call into the scheduler to park and wake tasks, and
//! the scheduler resumes tasks that call primitives. The `Core` is the
//! shared, executor-thread-only context object that closes that cycle.
//! Handles (`Scheduler`, `TaskContext`, every primitive) hold an
//! `Rc<RefCell<Core>>`; no synchronization is needed because only one
//! thread ever enters the engine.
//!
//! # Borrow Discipline
//!
//! The executor releases its borrow of the core before polling a task, so
//! primitives invoked from user code can take a fresh mutable borrow. Core
//! methods never call back into user code.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use tracing::{debug, trace};

use crate::domain::clock::{TimerEntry, TimerPayload, VirtualClock, VirtualTimeNs};
use crate::domain::sync::cond::CondWaiter;
use crate::domain::task::{ParkReason, ResourceId, TaskId, TaskRegistry, TaskState};
use crate::domain::trace::{ChoiceDomain, ChoiceStream, ReplayMismatch};

use super::types::{misuse, DeadlockReport, ParkedTask, SchedulerConfig, Verdict};

/// Shared handle to the engine core.
pub(crate) type CoreHandle = Rc<RefCell<Core>>;

/// A condvar waiter eligible for a spurious wakeup.
struct SpuriousCandidate {
    task: TaskId,
    waiter: Rc<CondWaiter>,
}

/// What the executor should do next.
pub(crate) enum TurnDecision {
    /// Resume this task to its next suspension point.
    Poll(TaskId),
    /// The run is over.
    Finished(Verdict),
}

/// All engine state reachable from the executor thread.
pub(crate) struct Core {
    pub(crate) config: SchedulerConfig,
    pub(crate) choices: ChoiceStream,
    pub(crate) clock: VirtualClock,
    pub(crate) registry: TaskRegistry,
    /// The ready set, in deterministic order: spawns and wakes append.
    ready: Vec<TaskId>,
    /// The task currently being resumed, if any.
    pub(crate) current: Option<TaskId>,
    /// Scheduling turns taken so far.
    pub(crate) steps: u64,
    next_resource: u64,
    /// Condvar waiters eligible for spurious wakeup, in park order.
    spurious_waiters: Vec<SpuriousCandidate>,
    /// Cached verdict once the run has ended.
    pub(crate) finished: Option<Verdict>,
}

impl Core {
    pub(crate) fn new(config: SchedulerConfig, choices: ChoiceStream) -> Self {
        Self {
            config,
            choices,
            clock: VirtualClock::new(),
            registry: TaskRegistry::new(),
            ready: Vec::new(),
            current: None,
            steps: 0,
            next_resource: 0,
            spurious_waiters: Vec::new(),
            finished: None,
        }
    }

    /// Assign the next resource identifier (deterministic creation order).
    pub(crate) fn alloc_resource_id(&mut self) -> ResourceId {
        let id = ResourceId::new(self.next_resource);
        self.next_resource += 1;
        id
    }

    /// The task currently being resumed.
    ///
    /// Primitive operations are only legal from inside a task; calling one
    /// from the driver is a protocol violation.
    pub(crate) fn running_task(&self) -> TaskId {
        match self.current {
            Some(id) => id,
            None => misuse("primitive operation outside a running task"),
        }
    }

    /// Allocate a task slot in `Ready` state and enqueue it.
    ///
    /// The continuation is attached by the caller once the task's context
    /// exists; no poll can happen in between because the executor is not
    /// inside a turn while spawning.
    pub(crate) fn spawn_slot(&mut self) -> TaskId {
        let id = self.registry.create();
        self.ready.push(id);
        debug!(task = %id, "spawned");
        id
    }

    /// Move a parked task back into the ready set (at the tail).
    pub(crate) fn make_ready(&mut self, task: TaskId) {
        trace!(task = %task, "ready");
        self.registry.set_ready(task);
        self.ready.push(task);
    }

    /// Park the running task on a resource wait list.
    pub(crate) fn park_current_on_resource(
        &mut self,
        resource: Option<ResourceId>,
        reason: ParkReason,
    ) {
        let task = self.current.expect("park outside a turn");
        trace!(task = %task, reason = %reason, "parked on resource");
        self.registry.park_on_resource(task, resource, reason);
    }

    /// Park the running task until the clock reaches `deadline_ns`, and
    /// register the timer that will wake it.
    pub(crate) fn park_current_on_timer(&mut self, deadline_ns: VirtualTimeNs) {
        let task = self.current.expect("park outside a turn");
        trace!(task = %task, deadline_ns, "parked on timer");
        self.registry.park_on_timer(task, deadline_ns);
        self.clock.schedule(deadline_ns, TimerPayload::WakeTask(task));
    }

    /// Move the running task straight back to the ready-set tail
    /// (voluntary yield, or `sleep(0)`).
    pub(crate) fn requeue_current(&mut self) {
        let task = self.current.expect("yield outside a turn");
        trace!(task = %task, "yielded");
        self.registry.set_ready(task);
        self.ready.push(task);
    }

    /// Current virtual time.
    pub(crate) fn now(&self) -> Duration {
        self.clock.now()
    }

    /// Register a condvar waiter as a spurious-wakeup candidate.
    pub(crate) fn register_cond_waiter(&mut self, task: TaskId, waiter: Rc<CondWaiter>) {
        self.spurious_waiters.push(SpuriousCandidate { task, waiter });
    }

    /// Remove a condvar waiter from the spurious-wakeup candidates.
    pub(crate) fn unregister_cond_waiter(&mut self, task: TaskId) {
        self.spurious_waiters.retain(|c| c.task != task);
    }

    /// Raise a task's cancellation flag; wakes it if it is parked on the
    /// cancellation signal.
    pub(crate) fn cancel(&mut self, task: TaskId) {
        self.registry.cancel_flag(task).set(true);
        if matches!(
            self.registry.state(task),
            TaskState::ParkedOnResource {
                reason: ParkReason::Cancelled,
                ..
            }
        ) {
            self.make_ready(task);
        }
    }

    /// Decide what happens next: pick a runnable task, advance the clock,
    /// or end the run.
    pub(crate) fn next_turn(&mut self) -> TurnDecision {
        if let Err(m) = self.maybe_spurious_wake() {
            return TurnDecision::Finished(Verdict::TraceMismatch(m));
        }
        loop {
            if !self.ready.is_empty() {
                if self.steps >= self.config.max_steps {
                    debug!(limit = self.config.max_steps, "step budget exhausted");
                    return TurnDecision::Finished(Verdict::TimeoutSteps {
                        limit: self.config.max_steps,
                    });
                }
                let n = self.ready.len() as u64;
                let picked = match self.choices.pick(ChoiceDomain::TurnPick, n) {
                    Ok(i) => i as usize,
                    Err(m) => return TurnDecision::Finished(Verdict::TraceMismatch(m)),
                };
                let task = self.ready.remove(picked);
                self.steps += 1;
                self.registry.set_running(task);
                self.current = Some(task);
                trace!(step = self.steps, task = %task, of = n, picked, "turn");
                return TurnDecision::Poll(task);
            }

            if let Some(deadline) = self.clock.next_deadline() {
                let limit_ns =
                    u64::try_from(self.config.max_logical.as_nanos()).unwrap_or(u64::MAX);
                if deadline > limit_ns {
                    debug!(deadline, limit_ns, "logical-time budget exhausted");
                    return TurnDecision::Finished(Verdict::TimeoutLogical {
                        limit: self.config.max_logical,
                        next_deadline: Duration::from_nanos(deadline),
                    });
                }
                self.clock.advance_to(deadline);
                for entry in self.clock.pop_due() {
                    self.fire(entry);
                }
                continue;
            }

            let parked = self.registry.parked();
            if !parked.is_empty() {
                let report = DeadlockReport {
                    parked: parked
                        .into_iter()
                        .map(|(task, state)| match state {
                            TaskState::ParkedOnResource { resource, reason } => ParkedTask {
                                task,
                                resource,
                                reason,
                            },
                            // Timer parks imply a pending timer, which the
                            // branch above would have consumed.
                            other => unreachable!("{task} parked without a waker: {other}"),
                        })
                        .collect(),
                };
                debug!(%report, "no runnable task and no timers");
                return TurnDecision::Finished(Verdict::Deadlock(report));
            }

            return TurnDecision::Finished(Verdict::Done);
        }
    }

    /// PRNG-driven spurious wakeup: at most one waiter per turn, both the
    /// coin and the waiter pick recorded in the trace.
    fn maybe_spurious_wake(&mut self) -> Result<(), ReplayMismatch> {
        if !self.config.spurious || self.spurious_waiters.is_empty() {
            return Ok(());
        }
        if self.choices.pick(ChoiceDomain::SpuriousCoin, 2)? == 0 {
            return Ok(());
        }
        let n = self.spurious_waiters.len() as u64;
        let idx = self.choices.pick(ChoiceDomain::WaiterPick, n)? as usize;
        let candidate = self.spurious_waiters.remove(idx);
        candidate.waiter.mark_spurious();
        debug!(task = %candidate.task, "spurious wakeup injected");
        self.make_ready(candidate.task);
        Ok(())
    }

    fn fire(&mut self, entry: TimerEntry) {
        match entry.payload {
            TimerPayload::WakeTask(task) => {
                debug_assert!(matches!(
                    self.registry.state(task),
                    TaskState::ParkedOnTimer { .. }
                ));
                self.make_ready(task);
            }
            TimerPayload::Deliver(slot) => slot.fire(self),
        }
    }

    /// Drop continuations, timers, and wait bookkeeping at end of run.
    ///
    /// Continuations capture handles pointing back at this core; clearing
    /// them here breaks the reference cycles so a finished scheduler frees
    /// its memory when dropped.
    pub(crate) fn teardown(&mut self) {
        self.current = None;
        self.ready.clear();
        self.spurious_waiters.clear();
        self.clock.clear();
        self.registry.clear_futures();
    }
}
