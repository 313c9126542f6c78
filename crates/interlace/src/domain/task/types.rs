//! Task Types - Identifiers and Lifecycle States
//!
//! # Design Philosophy
//!
//! These types are designed to be:
//! - **Zero-cost**: Newtype wrappers compile to bare integers
//! - **Type-safe**: A `TaskId` cannot be confused with a `ResourceId`
//! - **Explicit**: The lifecycle enum carries the park back-reference, so a
//!   task's state and its wait-list membership cannot drift apart

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::clock::VirtualTimeNs;

/// Task identifier.
///
/// Assigned at spawn from a per-scheduler monotonic counter and never
/// reused. Identifier ordering equals spawn order, which is deterministic
/// under a fixed seed.
///
/// # Example
///
/// ```rust
/// use interlace::TaskId;
///
/// let first = TaskId::new(0);
/// let second = TaskId::new(1);
/// assert!(first < second);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaskId(pub u64);

impl TaskId {
    /// Create a new TaskId.
    #[inline(always)]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Get the raw numeric ID.
    #[inline(always)]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Get the ID as a registry index.
    #[inline(always)]
    pub(crate) const fn as_index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Task({})", self.0)
    }
}

/// Resource identifier.
///
/// Every primitive (mutex, rwlock, condition variable, channel) is assigned
/// a per-scheduler monotonic identifier at construction. Creation order is
/// deterministic under a fixed seed, which stabilizes trace records and
/// deadlock reports across runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceId(pub u64);

impl ResourceId {
    /// Create a new ResourceId.
    #[inline(always)]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Get the raw numeric ID.
    #[inline(always)]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Resource({})", self.0)
    }
}

/// Why a task is parked on a resource.
///
/// Wait-list entries carry the reason so deadlock reports can say what each
/// parked task was trying to do, not just where it was parked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParkReason {
    /// Waiting to acquire a mutex.
    MutexLock,
    /// Waiting to acquire a read lock.
    ReadLock,
    /// Waiting to acquire a write lock.
    WriteLock,
    /// Waiting on a condition variable.
    CondWait,
    /// Waiting to send on a full (or rendezvous) channel.
    Send,
    /// Waiting to receive on an empty channel.
    Recv,
    /// Waiting for the task's cancellation signal.
    Cancelled,
}

impl fmt::Display for ParkReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ParkReason::MutexLock => "mutex-lock",
            ParkReason::ReadLock => "read-lock",
            ParkReason::WriteLock => "write-lock",
            ParkReason::CondWait => "cond-wait",
            ParkReason::Send => "send",
            ParkReason::Recv => "recv",
            ParkReason::Cancelled => "cancel-wait",
        };
        f.write_str(s)
    }
}

/// Lifecycle state of a task.
///
/// # State Transitions
///
/// ```text
/// Ready ──────> Running ──────> Done
///   ↑              │  └───────> Panicked
///   │              ├──> ParkedOnResource ──┐
///   │              └──> ParkedOnTimer ─────┤
///   └──────────────────────────────────────┘  (unpark)
/// ```
///
/// At most one task is `Running` at any instant. A task is on a resource's
/// wait list iff its state is `ParkedOnResource` for that resource; the
/// back-reference here is what lets the scheduler diagnose deadlocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    /// Eligible to be picked at the next scheduling turn.
    Ready,
    /// Currently being resumed by the executor.
    Running,
    /// Parked on a resource's wait list.
    ///
    /// `resource` is `None` only for the cancellation wait, which has no
    /// resource of its own.
    ParkedOnResource {
        /// The resource that will wake this task.
        resource: Option<ResourceId>,
        /// What the task was trying to do when it parked.
        reason: ParkReason,
    },
    /// Parked until the virtual clock reaches a deadline.
    ParkedOnTimer {
        /// Logical wake-up time in nanoseconds from run start.
        deadline_ns: VirtualTimeNs,
    },
    /// Finished normally.
    Done,
    /// Terminated by a panic (user panic or protocol misuse).
    Panicked,
}

impl TaskState {
    /// Check if the task is eligible to run.
    #[inline(always)]
    pub const fn is_ready(&self) -> bool {
        matches!(self, TaskState::Ready)
    }

    /// Check if the task is currently being resumed.
    #[inline(always)]
    pub const fn is_running(&self) -> bool {
        matches!(self, TaskState::Running)
    }

    /// Check if the task is parked (on a resource or a timer).
    #[inline(always)]
    pub const fn is_parked(&self) -> bool {
        matches!(
            self,
            TaskState::ParkedOnResource { .. } | TaskState::ParkedOnTimer { .. }
        )
    }

    /// Check if the task has terminated (normally or by panic).
    #[inline(always)]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, TaskState::Done | TaskState::Panicked)
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskState::Ready => write!(f, "READY"),
            TaskState::Running => write!(f, "RUNNING"),
            TaskState::ParkedOnResource { resource, reason } => match resource {
                Some(r) => write!(f, "PARKED({reason} on {r})"),
                None => write!(f, "PARKED({reason})"),
            },
            TaskState::ParkedOnTimer { deadline_ns } => {
                write!(f, "PARKED(timer @{deadline_ns}ns)")
            }
            TaskState::Done => write!(f, "DONE"),
            TaskState::Panicked => write!(f, "PANICKED"),
        }
    }
}
