//! Task Registry - Ownership and Lifecycle Tracking
//!
//! # Overview
//!
//! The registry owns every logical task: its suspended continuation (a
//! boxed future), its lifecycle state, and its cancellation flag. Ids are
//! allocated monotonically and double as indices into the backing vector,
//! so lookups are O(1) and the registry never forgets a task until the run
//! is torn down.

use std::cell::Cell;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;

use crate::domain::clock::VirtualTimeNs;

use super::types::{ParkReason, ResourceId, TaskId, TaskState};

/// A task's suspended continuation.
///
/// Tasks never leave the executor thread, so the future need not be `Send`.
pub type TaskFuture = Pin<Box<dyn Future<Output = ()>>>;

/// One task owned by the registry.
struct TaskCell {
    state: TaskState,
    /// `None` while the task is being polled (the executor takes the future
    /// out so no registry borrow is held across user code) and after the
    /// task terminates.
    future: Option<TaskFuture>,
    cancelled: Rc<Cell<bool>>,
}

/// Owns all tasks and assigns identifiers.
#[derive(Default)]
pub struct TaskRegistry {
    tasks: Vec<TaskCell>,
}

impl TaskRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate the next task id in `Ready` state, without a continuation.
    ///
    /// The continuation is attached separately so the task's context (which
    /// needs the id) can be constructed before the user closure runs.
    pub fn create(&mut self) -> TaskId {
        let id = TaskId::new(self.tasks.len() as u64);
        self.tasks.push(TaskCell {
            state: TaskState::Ready,
            future: None,
            cancelled: Rc::new(Cell::new(false)),
        });
        id
    }

    /// Attach the continuation produced by the user closure.
    pub fn attach(&mut self, id: TaskId, future: TaskFuture) {
        let cell = self.cell_mut(id);
        debug_assert!(cell.future.is_none(), "continuation attached twice");
        cell.future = Some(future);
    }

    /// Number of tasks ever spawned.
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Returns `true` if no task was ever spawned.
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Current state of a task.
    pub fn state(&self, id: TaskId) -> TaskState {
        self.cell(id).state
    }

    /// Returns `true` if the task is currently `Running`.
    pub fn is_running(&self, id: TaskId) -> bool {
        self.cell(id).state.is_running()
    }

    /// The task's cancellation flag.
    pub fn cancel_flag(&self, id: TaskId) -> Rc<Cell<bool>> {
        Rc::clone(&self.cell(id).cancelled)
    }

    /// Transition a task to `Running` (picked by the scheduler).
    pub fn set_running(&mut self, id: TaskId) {
        let cell = self.cell_mut(id);
        debug_assert!(cell.state.is_ready(), "only Ready tasks can run");
        cell.state = TaskState::Running;
    }

    /// Transition a task back to `Ready` (unparked or voluntarily yielded).
    pub fn set_ready(&mut self, id: TaskId) {
        let cell = self.cell_mut(id);
        debug_assert!(
            !cell.state.is_terminal(),
            "terminal task cannot become ready"
        );
        cell.state = TaskState::Ready;
    }

    /// Park the task on a resource wait list.
    pub fn park_on_resource(&mut self, id: TaskId, resource: Option<ResourceId>, reason: ParkReason) {
        let cell = self.cell_mut(id);
        debug_assert!(cell.state.is_running(), "only the running task can park");
        cell.state = TaskState::ParkedOnResource { resource, reason };
    }

    /// Park the task until the clock reaches `deadline_ns`.
    pub fn park_on_timer(&mut self, id: TaskId, deadline_ns: VirtualTimeNs) {
        let cell = self.cell_mut(id);
        debug_assert!(cell.state.is_running(), "only the running task can park");
        cell.state = TaskState::ParkedOnTimer { deadline_ns };
    }

    /// Mark the task finished; its continuation is gone.
    pub fn finish(&mut self, id: TaskId) {
        let cell = self.cell_mut(id);
        cell.state = TaskState::Done;
        cell.future = None;
    }

    /// Mark the task panicked; its continuation is gone.
    pub fn mark_panicked(&mut self, id: TaskId) {
        let cell = self.cell_mut(id);
        cell.state = TaskState::Panicked;
        cell.future = None;
    }

    /// Take the continuation out for polling.
    pub fn take_future(&mut self, id: TaskId) -> Option<TaskFuture> {
        self.cell_mut(id).future.take()
    }

    /// Put the continuation back after a `Pending` poll.
    pub fn store_future(&mut self, id: TaskId, future: TaskFuture) {
        let cell = self.cell_mut(id);
        debug_assert!(cell.future.is_none());
        cell.future = Some(future);
    }

    /// Every task currently parked, with its park target.
    ///
    /// This is the raw material of a deadlock report: when the scheduler
    /// finds nothing runnable and no timers, this set is exactly the tasks
    /// that can never make progress.
    pub fn parked(&self) -> Vec<(TaskId, TaskState)> {
        self.tasks
            .iter()
            .enumerate()
            .filter(|(_, cell)| cell.state.is_parked())
            .map(|(i, cell)| (TaskId::new(i as u64), cell.state))
            .collect()
    }

    /// Returns `true` if any task is parked on a resource or timer.
    pub fn any_parked(&self) -> bool {
        self.tasks.iter().any(|c| c.state.is_parked())
    }

    /// Drop every stored continuation.
    ///
    /// Continuations capture context handles that point back at the engine
    /// core, so this is what breaks the reference cycles at end of run.
    pub fn clear_futures(&mut self) {
        for cell in &mut self.tasks {
            cell.future = None;
        }
    }

    fn cell(&self, id: TaskId) -> &TaskCell {
        &self.tasks[id.as_index()]
    }

    fn cell_mut(&mut self, id: TaskId) -> &mut TaskCell {
        &mut self.tasks[id.as_index()]
    }
}
