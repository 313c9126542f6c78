//! Synchronization Primitives
//!
//! Mutex, reader/writer lock, condition variable, and channel. Each is a
//! thin state machine over FIFO wait lists whose blocking and wake
//! operations plug into the scheduler core: parking is a state transition
//! plus a wait-list append, waking is a deterministic transfer back into
//! the ready set. None of them ever blocks the executor thread.

pub mod channel;
pub mod cond;
pub mod mutex;
pub mod rwlock;

pub use channel::{Channel, Recv, Send};
pub use cond::{Cond, CondWait};
pub use mutex::{Lock, Mutex};
pub use rwlock::{ReadLock, RwLock, WriteLock};
