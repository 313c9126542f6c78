//! Deterministic Channel
//!
//! # Overview
//!
//! A typed, optionally buffered rendezvous. Capacity 0 is a pure
//! rendezvous (send parks unless a receiver is parked, and vice versa);
//! bounded capacities buffer FIFO; `unbounded` never parks a sender.
//! Value transfer is direct wherever possible: a sender hands to the head
//! parked receiver, a receiver draining a full buffer pulls the head
//! parked sender's value into the vacated slot.
//!
//! # Closing
//!
//! `close` wakes every parked receiver in FIFO order with `None`. Sending
//! on a closed channel, closing twice, and closing while senders are
//! parked are all misuse.
//!
//! # `after` Timers
//!
//! [`after`](crate::TaskContext::after) returns a capacity-1 channel whose
//! value is delivered by the virtual clock when the deadline fires, through
//! this same machinery - so timer receivers park and wake like any other
//! channel user.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll};
use std::time::Duration;

use crate::domain::clock::TimerPayload;
use crate::domain::sched::core::{Core, CoreHandle};
use crate::domain::sched::types::misuse;
use crate::domain::task::{ParkReason, ResourceId, TaskId};

enum RecvSlot<T> {
    Waiting,
    Delivered(Option<T>),
}

struct SendWaiter<T> {
    task: TaskId,
    /// Taken when the value is transferred.
    value: Option<T>,
}

struct RecvWaiter<T> {
    task: TaskId,
    slot: Rc<RefCell<RecvSlot<T>>>,
}

struct ChanState<T> {
    /// `None` means unbounded.
    capacity: Option<usize>,
    buffer: VecDeque<T>,
    closed: bool,
    send_waiters: VecDeque<SendWaiter<T>>,
    recv_waiters: VecDeque<RecvWaiter<T>>,
}

impl<T> ChanState<T> {
    fn has_room(&self) -> bool {
        match self.capacity {
            None => true,
            Some(cap) => self.buffer.len() < cap,
        }
    }
}

/// A deterministic typed channel.
///
/// Handles are cheap clones sharing one channel; create one through
/// [`Scheduler::channel`](crate::Scheduler::channel),
/// [`Scheduler::unbounded`](crate::Scheduler::unbounded), or their
/// [`TaskContext`](crate::TaskContext) equivalents.
pub struct Channel<T> {
    core: CoreHandle,
    id: ResourceId,
    state: Rc<RefCell<ChanState<T>>>,
}

// Manual impl: a handle clone must not require `T: Clone`.
impl<T> Clone for Channel<T> {
    fn clone(&self) -> Self {
        Self {
            core: Rc::clone(&self.core),
            id: self.id,
            state: Rc::clone(&self.state),
        }
    }
}

impl<T> Channel<T> {
    pub(crate) fn register(core: &CoreHandle, capacity: Option<usize>) -> Self {
        let id = core.borrow_mut().alloc_resource_id();
        Self {
            core: Rc::clone(core),
            id,
            state: Rc::new(RefCell::new(ChanState {
                capacity,
                buffer: VecDeque::new(),
                closed: false,
                send_waiters: VecDeque::new(),
                recv_waiters: VecDeque::new(),
            })),
        }
    }

    /// This channel's resource identifier.
    pub fn id(&self) -> ResourceId {
        self.id
    }

    /// Send a value, parking until a receiver or buffer slot is available.
    ///
    /// Sending on a closed channel is misuse.
    pub fn send(&self, value: T) -> Send<T> {
        Send {
            chan: self.clone(),
            value: Some(value),
            phase: SendPhase::Init,
        }
    }

    /// Receive a value, parking until one is available.
    ///
    /// Returns `None` once the channel is closed and drained.
    pub fn recv(&self) -> Recv<T> {
        Recv {
            chan: self.clone(),
            phase: RecvPhase::Init,
        }
    }

    /// Send without parking; returns `true` on success.
    ///
    /// Sending on a closed channel is misuse, as for `send`.
    pub fn try_send(&self, value: T) -> bool {
        let mut core = self.core.borrow_mut();
        let mut st = self.state.borrow_mut();
        if st.closed {
            misuse("send on closed channel");
        }
        if let Some(receiver) = st.recv_waiters.pop_front() {
            *receiver.slot.borrow_mut() = RecvSlot::Delivered(Some(value));
            core.make_ready(receiver.task);
            true
        } else if st.has_room() {
            st.buffer.push_back(value);
            true
        } else {
            false
        }
    }

    /// Receive without parking; `None` when nothing is available (empty
    /// and open, or closed and drained).
    pub fn try_recv(&self) -> Option<T> {
        let mut core = self.core.borrow_mut();
        let mut st = self.state.borrow_mut();
        pop_value(&mut core, &mut st)
    }

    /// Close the channel.
    ///
    /// Every parked receiver wakes with `None`, in FIFO order. Closing
    /// twice or closing while senders are parked is misuse.
    pub fn close(&self) {
        let mut core = self.core.borrow_mut();
        let mut st = self.state.borrow_mut();
        if st.closed {
            misuse("close of closed channel");
        }
        if !st.send_waiters.is_empty() {
            misuse("close of channel with parked senders");
        }
        st.closed = true;
        while let Some(receiver) = st.recv_waiters.pop_front() {
            *receiver.slot.borrow_mut() = RecvSlot::Delivered(None);
            core.make_ready(receiver.task);
        }
    }

    /// Returns `true` once the channel has been closed.
    pub fn is_closed(&self) -> bool {
        self.state.borrow().closed
    }

    /// Number of buffered values.
    pub fn len(&self) -> usize {
        self.state.borrow().buffer.len()
    }

    /// Returns `true` if no values are buffered.
    pub fn is_empty(&self) -> bool {
        self.state.borrow().buffer.is_empty()
    }
}

/// Pop the next receivable value, backfilling from parked senders.
fn pop_value<T>(core: &mut Core, st: &mut ChanState<T>) -> Option<T> {
    if let Some(value) = st.buffer.pop_front() {
        // A parked sender's value moves into the vacated buffer slot.
        if let Some(mut sender) = st.send_waiters.pop_front() {
            let v = sender.value.take().expect("parked sender carries a value");
            st.buffer.push_back(v);
            core.make_ready(sender.task);
        }
        Some(value)
    } else if let Some(mut sender) = st.send_waiters.pop_front() {
        // Rendezvous: take the parked sender's value directly.
        let v = sender.value.take().expect("parked sender carries a value");
        core.make_ready(sender.task);
        Some(v)
    } else {
        None
    }
}

enum SendPhase {
    Init,
    Waiting,
}

/// Future returned by [`Channel::send`].
pub struct Send<T> {
    chan: Channel<T>,
    value: Option<T>,
    phase: SendPhase,
}

// No structural pinning: the future holds only handles and the value.
impl<T> Unpin for Send<T> {}

impl<T> Future for Send<T> {
    type Output = ();

    fn poll(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<()> {
        let this = self.get_mut();
        match this.phase {
            SendPhase::Init => {
                let mut core = this.chan.core.borrow_mut();
                let me = core.running_task();
                let mut st = this.chan.state.borrow_mut();
                if st.closed {
                    misuse("send on closed channel");
                }
                let value = this.value.take().expect("send polled after completion");
                if let Some(receiver) = st.recv_waiters.pop_front() {
                    *receiver.slot.borrow_mut() = RecvSlot::Delivered(Some(value));
                    core.make_ready(receiver.task);
                    Poll::Ready(())
                } else if st.has_room() {
                    st.buffer.push_back(value);
                    Poll::Ready(())
                } else {
                    st.send_waiters.push_back(SendWaiter {
                        task: me,
                        value: Some(value),
                    });
                    drop(st);
                    core.park_current_on_resource(Some(this.chan.id), ParkReason::Send);
                    this.phase = SendPhase::Waiting;
                    Poll::Pending
                }
            }
            // The engine polls a parked sender only after its value was
            // taken by a receiver.
            SendPhase::Waiting => Poll::Ready(()),
        }
    }
}

enum RecvPhase<T> {
    Init,
    Waiting(Rc<RefCell<RecvSlot<T>>>),
}

/// Future returned by [`Channel::recv`].
pub struct Recv<T> {
    chan: Channel<T>,
    phase: RecvPhase<T>,
}

// No structural pinning: the future holds only handles.
impl<T> Unpin for Recv<T> {}

impl<T> Future for Recv<T> {
    type Output = Option<T>;

    fn poll(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Option<T>> {
        let this = self.get_mut();
        match &this.phase {
            RecvPhase::Init => {
                let mut core = this.chan.core.borrow_mut();
                let me = core.running_task();
                let mut st = this.chan.state.borrow_mut();
                if let Some(value) = pop_value(&mut core, &mut st) {
                    return Poll::Ready(Some(value));
                }
                if st.closed {
                    return Poll::Ready(None);
                }
                let slot = Rc::new(RefCell::new(RecvSlot::Waiting));
                st.recv_waiters.push_back(RecvWaiter {
                    task: me,
                    slot: Rc::clone(&slot),
                });
                drop(st);
                core.park_current_on_resource(Some(this.chan.id), ParkReason::Recv);
                this.phase = RecvPhase::Waiting(slot);
                Poll::Pending
            }
            RecvPhase::Waiting(slot) => {
                match std::mem::replace(&mut *slot.borrow_mut(), RecvSlot::Waiting) {
                    RecvSlot::Delivered(value) => Poll::Ready(value),
                    RecvSlot::Waiting => {
                        unreachable!("parked receiver polled before delivery")
                    }
                }
            }
        }
    }
}

/// Delivery endpoint a timer uses to complete an `after` channel.
///
/// Constructed only by [`after_channel`]; fires at most once.
pub struct AfterSlot(Rc<RefCell<ChanState<Duration>>>);

impl AfterSlot {
    /// Deliver the firing instant (the current virtual time).
    pub(crate) fn fire(&self, core: &mut Core) {
        let now = core.now();
        let mut st = self.0.borrow_mut();
        if let Some(receiver) = st.recv_waiters.pop_front() {
            *receiver.slot.borrow_mut() = RecvSlot::Delivered(Some(now));
            core.make_ready(receiver.task);
        } else {
            st.buffer.push_back(now);
        }
    }
}

/// Create the single-use receiver behind `after(d)`: a capacity-1 channel
/// fed by a virtual-clock timer at `now + d`.
pub(crate) fn after_channel(core: &CoreHandle, delay: Duration) -> Channel<Duration> {
    let chan = Channel::register(core, Some(1));
    let mut core_mut = core.borrow_mut();
    let deadline = core_mut.clock.deadline_after(delay);
    core_mut
        .clock
        .schedule(deadline, TimerPayload::Deliver(AfterSlot(Rc::clone(&chan.state))));
    chan
}
