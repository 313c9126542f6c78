//! Deterministic Reader/Writer Lock
//!
//! # Overview
//!
//! Shared/exclusive locking with a **write-preference** policy: a reader
//! may not enter while a writer is parked, so a steady stream of readers
//! cannot starve a writer. The policy is an invariant of the engine, not a
//! runtime toggle - it is what makes rwlock schedules deterministic and
//! starvation-free.
//!
//! # Handoff Rules
//!
//! - `write_unlock`: head write waiter (if any) receives ownership
//!   directly; otherwise every parked reader becomes ready and holds a
//!   read lock.
//! - `read_unlock` dropping the last reader: head write waiter (if any)
//!   receives ownership directly.
//!
//! # Cancellation
//!
//! Acquisition is non-cancellable, as for [`Mutex`](super::mutex::Mutex).

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll};

use crate::domain::sched::core::CoreHandle;
use crate::domain::sched::types::misuse;
use crate::domain::task::{ParkReason, ResourceId, TaskId};

struct RwWaiter {
    task: TaskId,
    granted: Rc<Cell<bool>>,
}

struct RwState {
    /// Tasks currently holding a read lock (duplicates allowed; a task
    /// that read-locks twice must read-unlock twice).
    readers: Vec<TaskId>,
    writer: Option<TaskId>,
    read_waiters: VecDeque<RwWaiter>,
    write_waiters: VecDeque<RwWaiter>,
}

/// A deterministic reader/writer lock with write preference.
///
/// Handles are cheap clones sharing one lock; create one through
/// [`Scheduler::rwlock`](crate::Scheduler::rwlock) or
/// [`TaskContext::rwlock`](crate::TaskContext::rwlock).
#[derive(Clone)]
pub struct RwLock {
    core: CoreHandle,
    id: ResourceId,
    state: Rc<RefCell<RwState>>,
}

impl RwLock {
    pub(crate) fn register(core: &CoreHandle) -> Self {
        let id = core.borrow_mut().alloc_resource_id();
        Self {
            core: Rc::clone(core),
            id,
            state: Rc::new(RefCell::new(RwState {
                readers: Vec::new(),
                writer: None,
                read_waiters: VecDeque::new(),
                write_waiters: VecDeque::new(),
            })),
        }
    }

    /// This lock's resource identifier.
    pub fn id(&self) -> ResourceId {
        self.id
    }

    /// Acquire a shared (read) lock.
    ///
    /// Parks if a writer holds the lock *or any writer is parked* - the
    /// write-preference gate.
    pub fn read(&self) -> ReadLock {
        ReadLock {
            lock: self.clone(),
            phase: Phase::Init,
        }
    }

    /// Acquire the exclusive (write) lock.
    ///
    /// Parks while any reader or writer holds the lock.
    pub fn write(&self) -> WriteLock {
        WriteLock {
            lock: self.clone(),
            phase: Phase::Init,
        }
    }

    /// Release a shared lock held by the calling task.
    ///
    /// Dropping the last reader hands ownership to the head write waiter,
    /// if any. Releasing without holding a read lock is misuse.
    pub fn read_unlock(&self) {
        let mut core = self.core.borrow_mut();
        let me = core.running_task();
        let mut st = self.state.borrow_mut();
        let Some(pos) = st.readers.iter().position(|&t| t == me) else {
            misuse("read unlock without holding a read lock")
        };
        st.readers.swap_remove(pos);
        if st.readers.is_empty() {
            if let Some(next) = st.write_waiters.pop_front() {
                st.writer = Some(next.task);
                next.granted.set(true);
                core.make_ready(next.task);
            }
        }
    }

    /// Release the exclusive lock held by the calling task.
    ///
    /// Hands to the head write waiter if one exists; otherwise admits every
    /// parked reader, preserving their order. Releasing a lock the caller
    /// does not hold is misuse.
    pub fn write_unlock(&self) {
        let mut core = self.core.borrow_mut();
        let me = core.running_task();
        let mut st = self.state.borrow_mut();
        match st.writer {
            None => misuse("write unlock of unlocked rwlock"),
            Some(owner) if owner != me => misuse("write unlock of rwlock held by another task"),
            Some(_) => {
                if let Some(next) = st.write_waiters.pop_front() {
                    st.writer = Some(next.task);
                    next.granted.set(true);
                    core.make_ready(next.task);
                } else {
                    st.writer = None;
                    while let Some(reader) = st.read_waiters.pop_front() {
                        st.readers.push(reader.task);
                        reader.granted.set(true);
                        core.make_ready(reader.task);
                    }
                }
            }
        }
    }

    /// Number of read locks currently held.
    pub fn reader_count(&self) -> usize {
        self.state.borrow().readers.len()
    }
}

enum Phase {
    Init,
    Waiting(Rc<Cell<bool>>),
}

/// Future returned by [`RwLock::read`].
pub struct ReadLock {
    lock: RwLock,
    phase: Phase,
}

impl Future for ReadLock {
    type Output = ();

    fn poll(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<()> {
        let this = self.get_mut();
        match &this.phase {
            Phase::Init => {
                let mut core = this.lock.core.borrow_mut();
                let me = core.running_task();
                let mut st = this.lock.state.borrow_mut();
                if st.writer.is_none() && st.write_waiters.is_empty() {
                    st.readers.push(me);
                    Poll::Ready(())
                } else {
                    let granted = Rc::new(Cell::new(false));
                    st.read_waiters.push_back(RwWaiter {
                        task: me,
                        granted: Rc::clone(&granted),
                    });
                    drop(st);
                    core.park_current_on_resource(Some(this.lock.id), ParkReason::ReadLock);
                    this.phase = Phase::Waiting(granted);
                    Poll::Pending
                }
            }
            Phase::Waiting(granted) => {
                debug_assert!(granted.get());
                Poll::Ready(())
            }
        }
    }
}

/// Future returned by [`RwLock::write`].
pub struct WriteLock {
    lock: RwLock,
    phase: Phase,
}

impl Future for WriteLock {
    type Output = ();

    fn poll(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<()> {
        let this = self.get_mut();
        match &this.phase {
            Phase::Init => {
                let mut core = this.lock.core.borrow_mut();
                let me = core.running_task();
                let mut st = this.lock.state.borrow_mut();
                if st.writer.is_none() && st.readers.is_empty() {
                    st.writer = Some(me);
                    Poll::Ready(())
                } else {
                    let granted = Rc::new(Cell::new(false));
                    st.write_waiters.push_back(RwWaiter {
                        task: me,
                        granted: Rc::clone(&granted),
                    });
                    drop(st);
                    core.park_current_on_resource(Some(this.lock.id), ParkReason::WriteLock);
                    this.phase = Phase::Waiting(granted);
                    Poll::Pending
                }
            }
            Phase::Waiting(granted) => {
                debug_assert!(granted.get());
                Poll::Ready(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::rc::Rc;

    use crate::{Scheduler, Verdict, MISUSE_TAG};

    #[test]
    fn test_readers_share_the_lock() {
        for seed in 0..10 {
            let sched = Scheduler::new(seed);
            let lock = sched.rwlock();
            let holding = Rc::new(Cell::new(0usize));

            for _ in 0..3 {
                let lock = lock.clone();
                let holding = holding.clone();
                sched.spawn(move |ctx| async move {
                    lock.read().await;
                    holding.set(holding.get() + 1);
                    while holding.get() < 3 {
                        ctx.yield_now().await;
                    }
                    // All three readers hold the lock at this point.
                    assert_eq!(lock.reader_count(), 3);
                    lock.read_unlock();
                });
            }

            sched.wait().unwrap_done();
            assert_eq!(lock.reader_count(), 0, "seed {seed}");
        }
    }

    #[test]
    fn test_writer_excludes_readers() {
        for seed in 0..10 {
            let sched = Scheduler::new(seed);
            let lock = sched.rwlock();
            let in_writer = Rc::new(Cell::new(false));

            {
                let lock = lock.clone();
                let in_writer = in_writer.clone();
                sched.spawn(move |ctx| async move {
                    lock.write().await;
                    in_writer.set(true);
                    ctx.yield_now().await;
                    in_writer.set(false);
                    lock.write_unlock();
                });
            }
            {
                let lock = lock.clone();
                let in_writer = in_writer.clone();
                sched.spawn(move |_ctx| async move {
                    lock.read().await;
                    assert!(!in_writer.get());
                    lock.read_unlock();
                });
            }

            sched.wait().unwrap_done();
        }
    }

    #[test]
    fn test_read_unlock_without_lock_is_misuse() {
        let sched = Scheduler::new(2);
        let lock = sched.rwlock();
        sched.spawn(move |_ctx| async move {
            lock.read_unlock();
        });

        let Verdict::Panic { message, .. } = sched.wait() else {
            panic!("expected panic verdict");
        };
        assert!(message.starts_with(MISUSE_TAG), "{message}");
    }

    #[test]
    fn test_write_unlock_by_non_owner_is_misuse() {
        let sched = Scheduler::builder().seed(2).max_steps(10_000).build();
        let lock = sched.rwlock();
        let held = Rc::new(Cell::new(false));
        {
            let lock = lock.clone();
            let held = held.clone();
            sched.spawn(move |ctx| async move {
                lock.write().await;
                held.set(true);
                loop {
                    ctx.yield_now().await;
                }
            });
        }
        {
            let lock = lock.clone();
            let held = held.clone();
            sched.spawn(move |ctx| async move {
                while !held.get() {
                    ctx.yield_now().await;
                }
                lock.write_unlock();
            });
        }

        let Verdict::Panic { message, .. } = sched.wait() else {
            panic!("expected panic verdict");
        };
        assert!(message.contains("held by another task"), "{message}");
    }
}
