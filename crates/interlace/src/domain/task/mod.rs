//! Tasks - Registry, Identifiers, and the Task Context
//!
//! A task is a cooperatively scheduled logical thread: a boxed future the
//! executor resumes one suspension point at a time. The registry owns all
//! of them and tracks lifecycle state; the context is the handle user code
//! receives for yielding, sleeping, spawning, and building primitives.

pub mod context;
mod registry;
mod types;

pub use context::TaskContext;
pub use registry::{TaskFuture, TaskRegistry};
pub use types::{ParkReason, ResourceId, TaskId, TaskState};
