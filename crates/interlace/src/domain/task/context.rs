//! Task Context - The Handle User Code Runs Against
//!
//! Every spawned closure receives a `TaskContext`: its identity plus the
//! full primitive surface (yield, sleep, timers, spawning, cancellation,
//! and constructors for mutexes, rwlocks, condvars, and channels). The
//! context is a cheap clone of the engine handle and may be moved freely
//! between tasks; operations act on whichever task is running when they
//! are awaited.

use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll};
use std::time::Duration;

use crate::domain::sched::core::CoreHandle;
use crate::domain::sync::channel::{after_channel, Channel};
use crate::domain::sync::{Cond, Mutex, RwLock};

use super::registry::TaskFuture;
use super::types::{ParkReason, TaskId};

/// Spawn a task on the given core: allocate the id, build the context,
/// then run the user closure to obtain the continuation.
///
/// The closure runs outside any core borrow, so it may itself construct
/// primitives (but a primitive *operation* still requires a running task).
pub(crate) fn spawn_on<F, Fut>(core: &CoreHandle, f: F) -> TaskId
where
    F: FnOnce(TaskContext) -> Fut,
    Fut: Future<Output = ()> + 'static,
{
    let id = core.borrow_mut().spawn_slot();
    let ctx = TaskContext {
        core: Rc::clone(core),
        id,
    };
    let future: TaskFuture = Box::pin(f(ctx));
    core.borrow_mut().registry.attach(id, future);
    id
}

/// Control handle passed to every spawned task.
#[derive(Clone)]
pub struct TaskContext {
    core: CoreHandle,
    id: TaskId,
}

impl TaskContext {
    /// This task's identifier.
    pub fn id(&self) -> TaskId {
        self.id
    }

    /// Voluntarily suspend; the task returns to the ready-set tail and the
    /// scheduler picks the next turn.
    pub fn yield_now(&self) -> YieldNow {
        YieldNow {
            core: Rc::clone(&self.core),
            yielded: false,
        }
    }

    /// Wait for this task's cancellation signal.
    ///
    /// Resolves once [`cancel`](Self::cancel) (or
    /// [`Scheduler::cancel`](crate::Scheduler::cancel)) has been called for
    /// the awaiting task. The wait parks the task, so a never-cancelled
    /// `done` participates in deadlock detection like any other park.
    pub fn done(&self) -> DoneWait {
        DoneWait {
            core: Rc::clone(&self.core),
        }
    }

    /// Returns `true` once this task has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        let core = self.core.borrow();
        core.registry.cancel_flag(self.id).get()
    }

    /// Raise `task`'s cancellation flag, waking it if it awaits `done`.
    pub fn cancel(&self, task: TaskId) {
        self.core.borrow_mut().cancel(task);
    }

    /// Spawn a new task. Legal from inside a running task; the child is
    /// appended to the ready-set tail.
    pub fn spawn<F, Fut>(&self, f: F) -> TaskId
    where
        F: FnOnce(TaskContext) -> Fut,
        Fut: Future<Output = ()> + 'static,
    {
        spawn_on(&self.core, f)
    }

    /// Current virtual time since run start.
    pub fn now(&self) -> Duration {
        self.core.borrow().now()
    }

    /// Park the awaiting task until the virtual clock advances by `d`.
    ///
    /// `sleep(Duration::ZERO)` yields without advancing the clock.
    pub fn sleep(&self, d: Duration) -> Sleep {
        Sleep {
            core: Rc::clone(&self.core),
            delay: d,
            phase: SleepPhase::Init,
        }
    }

    /// A single-use receiver that produces the firing instant (`now + d`)
    /// when the virtual clock reaches it.
    pub fn after(&self, d: Duration) -> Channel<Duration> {
        after_channel(&self.core, d)
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
}

/// Future returned by [`TaskContext::yield_now`].
pub struct YieldNow {
    core: CoreHandle,
    yielded: bool,
}

impl Future for YieldNow {
    type Output = ();

    fn poll(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<()> {
        let this = self.get_mut();
        if this.yielded {
            return Poll::Ready(());
        }
        this.yielded = true;
        let mut core = this.core.borrow_mut();
        core.running_task();
        core.requeue_current();
        Poll::Pending
    }
}

enum SleepPhase {
    Init,
    Waiting,
}

/// Future returned by [`TaskContext::sleep`].
pub struct Sleep {
    core: CoreHandle,
    delay: Duration,
    phase: SleepPhase,
}

impl Future for Sleep {
    type Output = ();

    fn poll(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<()> {
        let this = self.get_mut();
        match this.phase {
            SleepPhase::Init => {
                let mut core = this.core.borrow_mut();
                core.running_task();
                if this.delay.is_zero() {
                    core.requeue_current();
                } else {
                    let deadline = core.clock.deadline_after(this.delay);
                    core.park_current_on_timer(deadline);
                }
                this.phase = SleepPhase::Waiting;
                Poll::Pending
            }
            SleepPhase::Waiting => Poll::Ready(()),
        }
    }
}

/// Future returned by [`TaskContext::done`].
pub struct DoneWait {
    core: CoreHandle,
}

impl Future for DoneWait {
    type Output = ();

    fn poll(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<()> {
        let mut core = self.core.borrow_mut();
        let me = core.running_task();
        if core.registry.cancel_flag(me).get() {
            Poll::Ready(())
        } else {
            core.park_current_on_resource(None, ParkReason::Cancelled);
            Poll::Pending
        }
    }
}
