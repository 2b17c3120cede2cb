use crate::error::{Result, TaskError};
use crate::group::behavior::{AggregateErrors, GroupBehavior};
use crate::group::handle::{GroupCore, GroupHandle, GroupWork};
use crate::task::Task;
use std::sync::Arc;

/// A task composed of child tasks.
///
/// The group runs its children on a private scheduler and finishes only
/// after every child, and every task a child produced, has finished. Its
/// errors are the aggregate of its children's.
///
/// ```rust,no_run
/// use tasklane::{Scheduler, Task, TaskGroup};
///
/// # async fn run() -> anyhow::Result<()> {
/// let group = TaskGroup::new("fetch", [Task::noop("a"), Task::noop("b")]);
/// let scheduler = Scheduler::default();
/// scheduler.add(group.task().clone())?;
/// assert!(group.task().wait().await.is_success());
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct TaskGroup {
    task: Task,
    handle: GroupHandle,
}

impl TaskGroup {
    pub fn new(name: impl Into<String>, children: impl IntoIterator<Item = Task>) -> Self {
        Self::with_behavior(name, children, AggregateErrors)
    }

    /// Create a group whose child events are handled by `behavior`
    pub fn with_behavior(
        name: impl Into<String>,
        children: impl IntoIterator<Item = Task>,
        behavior: impl GroupBehavior,
    ) -> Self {
        Self::with_behavior_arc(name, children, Arc::new(behavior))
    }

    pub(crate) fn with_behavior_arc(
        name: impl Into<String>,
        children: impl IntoIterator<Item = Task>,
        behavior: Arc<dyn GroupBehavior>,
    ) -> Self {
        let name = name.into();
        let core = GroupCore::new(&name, behavior);
        let task = Task::new(
            name,
            GroupWork {
                core: Arc::clone(&core),
            },
        );
        core.bind(&task);
        let handle = GroupHandle { core };
        for child in children {
            // Never sealed before the group has been submitted.
            let _ = handle.add_child(child);
        }
        Self { task, handle }
    }

    pub fn task(&self) -> &Task {
        &self.task
    }

    pub fn handle(&self) -> &GroupHandle {
        &self.handle
    }

    pub fn add_child(&self, task: Task) -> Result<()> {
        self.handle.add_child(task)
    }

    pub fn add_children(&self, tasks: impl IntoIterator<Item = Task>) -> Result<()> {
        self.handle.add_children(tasks)
    }

    /// Call `hook` after each child finishes
    pub fn on_child_finished(&self, hook: impl Fn(&Task, &[TaskError]) + Send + Sync + 'static) {
        self.handle.core.add_child_hook(Arc::new(hook));
    }

    pub fn aggregate_errors(&self) -> Vec<TaskError> {
        self.handle.aggregate_errors()
    }

    pub fn children(&self) -> Vec<Task> {
        self.handle.children()
    }
}

impl From<TaskGroup> for Task {
    fn from(group: TaskGroup) -> Self {
        group.task
    }
}

impl std::fmt::Debug for TaskGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskGroup")
            .field("task", &self.task)
            .field("children", &self.children().len())
            .finish()
    }
}
