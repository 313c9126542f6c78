//! Deterministic Condition Variable
//!
//! # Overview
//!
//! Bound to a [`Mutex`] at construction. `wait` atomically releases the
//! bound lock and parks the caller at the tail of the wait list; a woken
//! waiter re-acquires the lock through the normal lock path, queueing
//! behind current contenders like any other locker. `signal` wakes the
//! head waiter, `broadcast` drains the list in order.
//!
//! # Spurious Wakeups
//!
//! When the scheduler is configured with spurious wakeups, any parked
//! waiter may be moved to ready by a PRNG-driven choice at a scheduling
//! turn (coin and waiter pick both recorded in the trace). A spuriously
//! woken waiter still re-acquires the lock before `wait` returns, so the
//! canonical `while !predicate { wait }` loop is all callers ever need.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll};

use crate::domain::sched::core::CoreHandle;
use crate::domain::sched::types::misuse;
use crate::domain::task::{ParkReason, ResourceId, TaskId};

use super::mutex::{Lock, Mutex};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WaitState {
    Parked,
    Signaled,
    Spurious,
}

/// A parked condvar waiter, shared between the wait list, the waiting
/// future, and the scheduler's spurious-wakeup candidates.
///
/// Spurious wakeups mark the entry rather than removing it from the wait
/// list; `signal`/`broadcast` skip non-parked entries lazily.
pub(crate) struct CondWaiter {
    task: TaskId,
    state: Cell<WaitState>,
}

impl CondWaiter {
    fn new(task: TaskId) -> Self {
        Self {
            task,
            state: Cell::new(WaitState::Parked),
        }
    }

    /// Consume a spurious wakeup (scheduler side).
    pub(crate) fn mark_spurious(&self) {
        debug_assert_eq!(self.state.get(), WaitState::Parked);
        self.state.set(WaitState::Spurious);
    }

    /// Signal this waiter; returns `false` if it was already woken.
    fn signal(&self) -> bool {
        if self.state.get() == WaitState::Parked {
            self.state.set(WaitState::Signaled);
            true
        } else {
            false
        }
    }

    fn is_parked(&self) -> bool {
        self.state.get() == WaitState::Parked
    }
}

struct CondState {
    waiters: VecDeque<Rc<CondWaiter>>,
}

/// A deterministic condition variable bound to a [`Mutex`].
///
/// Create one through [`Scheduler::cond`](crate::Scheduler::cond) or
/// [`TaskContext::cond`](crate::TaskContext::cond).
#[derive(Clone)]
pub struct Cond {
    core: CoreHandle,
    id: ResourceId,
    mutex: Mutex,
    state: Rc<RefCell<CondState>>,
}

impl Cond {
    pub(crate) fn register(core: &CoreHandle, mutex: &Mutex) -> Self {
        let id = core.borrow_mut().alloc_resource_id();
        Self {
            core: Rc::clone(core),
            id,
            mutex: mutex.clone(),
            state: Rc::new(RefCell::new(CondState {
                waiters: VecDeque::new(),
            })),
        }
    }

    /// This condition variable's resource identifier.
    pub fn id(&self) -> ResourceId {
        self.id
    }

    /// Atomically release the bound lock and park until woken.
    ///
    /// The caller must hold the bound lock (misuse otherwise). On return
    /// the lock is held again; because wakeups may be spurious, callers
    /// re-check their predicate in a loop.
    pub fn wait(&self) -> CondWait {
        CondWait {
            cond: self.clone(),
            phase: WaitPhase::Init,
        }
    }

    /// Wake the head waiter, if any.
    ///
    /// The woken task still competes to re-acquire the bound lock.
    pub fn signal(&self) {
        let mut core = self.core.borrow_mut();
        let mut st = self.state.borrow_mut();
        while let Some(waiter) = st.waiters.pop_front() {
            if waiter.signal() {
                core.unregister_cond_waiter(waiter.task);
                core.make_ready(waiter.task);
                break;
            }
            // Entry was spuriously woken earlier; drop it and keep looking.
        }
    }

    /// Wake every waiter, preserving their order.
    pub fn broadcast(&self) {
        let mut core = self.core.borrow_mut();
        let mut st = self.state.borrow_mut();
        while let Some(waiter) = st.waiters.pop_front() {
            if waiter.signal() {
                core.unregister_cond_waiter(waiter.task);
                core.make_ready(waiter.task);
            }
        }
    }

    /// Number of tasks currently parked on this condition variable.
    pub fn waiter_count(&self) -> usize {
        self.state
            .borrow()
            .waiters
            .iter()
            .filter(|w| w.is_parked())
            .count()
    }
}

enum WaitPhase {
    Init,
    Parked(Rc<CondWaiter>),
    Relock(Lock),
}

/// Future returned by [`Cond::wait`].
pub struct CondWait {
    cond: Cond,
    phase: WaitPhase,
}

impl Future for CondWait {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        let this = self.get_mut();
        loop {
            match &mut this.phase {
                WaitPhase::Init => {
                    let mut core = this.cond.core.borrow_mut();
                    let me = core.running_task();
                    if !this.cond.mutex.is_held_by(me) {
                        misuse("condition wait without holding the lock");
                    }
                    let waiter = Rc::new(CondWaiter::new(me));
                    this.cond
                        .state
                        .borrow_mut()
                        .waiters
                        .push_back(Rc::clone(&waiter));
                    core.register_cond_waiter(me, Rc::clone(&waiter));
                    // Release and park under the same core borrow: no turn
                    // can interleave between the two.
                    this.cond.mutex.release(&mut core, me);
                    core.park_current_on_resource(Some(this.cond.id), ParkReason::CondWait);
                    this.phase = WaitPhase::Parked(waiter);
                    return Poll::Pending;
                }
                WaitPhase::Parked(waiter) => {
                    // Woken by signal, broadcast, or a spurious choice;
                    // either way the lock must be re-acquired.
                    debug_assert!(!waiter.is_parked());
                    this.phase = WaitPhase::Relock(this.cond.mutex.lock());
                }
                WaitPhase::Relock(lock) => return Pin::new(lock).poll(cx),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    use crate::Scheduler;

    #[test]
    fn test_signal_without_waiters_is_a_noop() {
        let sched = Scheduler::new(0);
        let mutex = sched.mutex();
        let cond = sched.cond(&mutex);
        sched.spawn(move |_ctx| async move {
            cond.signal();
            cond.broadcast();
        });
        sched.wait().unwrap_done();
    }

    #[test]
    fn test_broadcast_wakes_every_waiter() {
        for seed in 0..10 {
            let sched = Scheduler::new(seed);
            let mutex = sched.mutex();
            let cond = sched.cond(&mutex);
            let go = Rc::new(Cell::new(false));
            let parked = Rc::new(Cell::new(0usize));
            let woken = Rc::new(RefCell::new(Vec::new()));

            for id in 0..3 {
                let (mutex, cond) = (mutex.clone(), cond.clone());
                let (go, parked, woken) = (go.clone(), parked.clone(), woken.clone());
                sched.spawn(move |_ctx| async move {
                    mutex.lock().await;
                    while !go.get() {
                        parked.set(parked.get() + 1);
                        cond.wait().await;
                    }
                    woken.borrow_mut().push(id);
                    mutex.unlock();
                });
            }
            {
                let (mutex, cond) = (mutex.clone(), cond.clone());
                let (go, parked) = (go.clone(), parked.clone());
                sched.spawn(move |ctx| async move {
                    while parked.get() < 3 {
                        ctx.yield_now().await;
                    }
                    mutex.lock().await;
                    go.set(true);
                    cond.broadcast();
                    mutex.unlock();
                });
            }

            sched.wait().unwrap_done();
            let mut woken = woken.borrow().clone();
            woken.sort_unstable();
            assert_eq!(woken, vec![0, 1, 2], "seed {seed}");
        }
    }

    #[test]
    fn test_waiter_count_tracks_parked_entries() {
        let sched = Scheduler::new(3);
        let mutex = sched.mutex();
        let cond = sched.cond(&mutex);
        let outer = cond.clone();
        {
            let (mutex, cond) = (mutex.clone(), cond.clone());
            sched.spawn(move |ctx| async move {
                let waiter_mutex = mutex.clone();
                let waiter_cond = cond.clone();
                ctx.spawn(move |_ctx| async move {
                    waiter_mutex.lock().await;
                    waiter_cond.wait().await;
                    waiter_mutex.unlock();
                });
                while cond.waiter_count() == 0 {
                    ctx.yield_now().await;
                }
                mutex.lock().await;
                cond.signal();
                mutex.unlock();
            });
        }
        sched.wait().unwrap_done();
        assert_eq!(outer.waiter_count(), 0);
    }
}
