//! Deterministic Mutex
//!
//! # Overview
//!
//! A mutual-exclusion lock whose blocking behavior is a scheduling event:
//! a contended `lock` parks the task at the tail of a FIFO wait list, and
//! `unlock` hands ownership directly to the head waiter. Direct handoff
//! means a woken waiter never races anyone for the lock - it already owns
//! it when it resumes.
//!
//! # Misuse
//!
//! Unlocking an unlocked mutex, unlocking from a non-owner, and reentrant
//! locking all panic the offending task with the stable `misuse:` tag.
//!
//! # Cancellation
//!
//! Lock acquisition is non-cancellable: a parked locker wakes only through
//! ownership handoff.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll};

use crate::domain::sched::core::{Core, CoreHandle};
use crate::domain::sched::types::misuse;
use crate::domain::task::{ParkReason, ResourceId, TaskId};

struct MutexWaiter {
    task: TaskId,
    /// Set when ownership is handed to this waiter.
    granted: Rc<Cell<bool>>,
}

pub(crate) struct MutexState {
    owner: Option<TaskId>,
    waiters: VecDeque<MutexWaiter>,
}

/// A deterministic mutual-exclusion lock.
///
/// Handles are cheap clones sharing one lock; create one through
/// [`Scheduler::mutex`](crate::Scheduler::mutex) or
/// [`TaskContext::mutex`](crate::TaskContext::mutex).
#[derive(Clone)]
pub struct Mutex {
    core: CoreHandle,
    id: ResourceId,
    state: Rc<RefCell<MutexState>>,
}

impl Mutex {
    pub(crate) fn register(core: &CoreHandle) -> Self {
        let id = core.borrow_mut().alloc_resource_id();
        Self {
            core: Rc::clone(core),
            id,
            state: Rc::new(RefCell::new(MutexState {
                owner: None,
                waiters: VecDeque::new(),
            })),
        }
    }

    /// This lock's resource identifier.
    pub fn id(&self) -> ResourceId {
        self.id
    }

    /// Acquire the lock, parking until it is available.
    ///
    /// Waiters acquire in FIFO order. Locking a mutex the caller already
    /// owns is misuse.
    pub fn lock(&self) -> Lock {
        Lock {
            mutex: self.clone(),
            phase: LockPhase::Init,
        }
    }

    /// Acquire the lock iff it is free; never parks.
    pub fn try_lock(&self) -> bool {
        let core = self.core.borrow();
        let me = core.running_task();
        let mut st = self.state.borrow_mut();
        if st.owner.is_none() {
            st.owner = Some(me);
            true
        } else {
            false
        }
    }

    /// Release the lock.
    ///
    /// If waiters are parked, ownership passes directly to the head waiter
    /// and it becomes ready; otherwise the lock is left free.
    pub fn unlock(&self) {
        let mut core = self.core.borrow_mut();
        let me = core.running_task();
        self.release(&mut core, me);
    }

    /// Returns `true` if the lock is currently held.
    pub fn is_locked(&self) -> bool {
        self.state.borrow().owner.is_some()
    }

    /// Verify `task` owns the lock (condvar `wait` precondition).
    pub(crate) fn is_held_by(&self, task: TaskId) -> bool {
        self.state.borrow().owner == Some(task)
    }

    /// Release on behalf of `me`, who must own the lock.
    ///
    /// Shared with the condition variable, which atomically releases the
    /// bound lock while parking its caller.
    pub(crate) fn release(&self, core: &mut Core, me: TaskId) {
        let mut st = self.state.borrow_mut();
        match st.owner {
            None => misuse("unlock of unlocked mutex"),
            Some(owner) if owner != me => misuse("unlock of mutex held by another task"),
            Some(_) => {
                if let Some(next) = st.waiters.pop_front() {
                    st.owner = Some(next.task);
                    next.granted.set(true);
                    core.make_ready(next.task);
                } else {
                    st.owner = None;
                }
            }
        }
    }
}

enum LockPhase {
    Init,
    Waiting(Rc<Cell<bool>>),
}

/// Future returned by [`Mutex::lock`].
pub struct Lock {
    mutex: Mutex,
    phase: LockPhase,
}

impl Future for Lock {
    type Output = ();

    fn poll(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<()> {
        let this = self.get_mut();
        match &this.phase {
            LockPhase::Init => {
                let mut core = this.mutex.core.borrow_mut();
                let me = core.running_task();
                let mut st = this.mutex.state.borrow_mut();
                match st.owner {
                    Some(owner) if owner == me => misuse("reentrant mutex lock"),
                    Some(_) => {
                        let granted = Rc::new(Cell::new(false));
                        st.waiters.push_back(MutexWaiter {
                            task: me,
                            granted: Rc::clone(&granted),
                        });
                        drop(st);
                        core.park_current_on_resource(
                            Some(this.mutex.id),
                            ParkReason::MutexLock,
                        );
                        this.phase = LockPhase::Waiting(granted);
                        Poll::Pending
                    }
                    None => {
                        st.owner = Some(me);
                        Poll::Ready(())
                    }
                }
            }
            LockPhase::Waiting(granted) => {
                // The engine polls a parked locker only after handoff.
                debug_assert!(granted.get());
                Poll::Ready(())
            }
        }
    }
}
