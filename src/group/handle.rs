use crate::config::SchedulerConfig;
use crate::error::{EngineError, Result, TaskError};
use crate::group::behavior::GroupBehavior;
use crate::scheduler::{Scheduler, SchedulerDelegate};
use crate::sync::lock;
use crate::task::{Task, TaskContext, TaskId, TaskState, WeakTask, Work};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock, Weak};
use tracing::{debug, error, warn};

pub(crate) type ChildHook = Arc<dyn Fn(&Task, &[TaskError]) + Send + Sync>;

#[derive(Default)]
struct Records {
    children: Vec<Task>,
    child_errors: HashMap<TaskId, Vec<TaskError>>,
    own_errors: Vec<TaskError>,
}

impl Records {
    fn record_child(&mut self, task: &Task) {
        if !self.children.iter().any(|child| child.id() == task.id()) {
            self.children.push(task.clone());
        }
    }
}

/// State shared by a group task, its work body and its internal scheduler
pub(crate) struct GroupCore {
    this: Weak<GroupCore>,
    scheduler: Scheduler,
    sentinel: Task,
    /// Children added before the group started executing
    pending: Mutex<Option<Vec<Task>>>,
    records: Mutex<Records>,
    behavior: Arc<dyn GroupBehavior>,
    child_hooks: Mutex<Vec<ChildHook>>,
    group: OnceLock<WeakTask>,
}

impl GroupCore {
    pub(crate) fn new(name: &str, behavior: Arc<dyn GroupBehavior>) -> Arc<Self> {
        let scheduler = Scheduler::new(SchedulerConfig::named(name).suspended());
        let sentinel = Task::noop(format!("Finishing {}", name));
        let core = Arc::new_cyclic(|this| GroupCore {
            this: this.clone(),
            scheduler,
            sentinel,
            pending: Mutex::new(Some(Vec::new())),
            records: Mutex::new(Records::default()),
            behavior,
            child_hooks: Mutex::new(Vec::new()),
            group: OnceLock::new(),
        });
        core.scheduler.set_delegate(&core);
        core
    }

    pub(crate) fn bind(&self, group: &Task) {
        let _ = self.group.set(group.downgrade());
    }

    pub(crate) fn add_child_hook(&self, hook: ChildHook) {
        lock(&self.child_hooks).push(hook);
    }

    fn handle(&self) -> Option<GroupHandle> {
        self.this.upgrade().map(|core| GroupHandle { core })
    }

    fn group_id(&self) -> TaskId {
        self.group
            .get()
            .map(WeakTask::id)
            .unwrap_or_else(|| self.sentinel.id())
    }

    fn is_sentinel(&self, task: &Task) -> bool {
        task.id() == self.sentinel.id()
    }
}

impl SchedulerDelegate for GroupCore {
    fn will_add(&self, _scheduler: &Scheduler, task: &Task) {
        if self.is_sentinel(task) {
            return;
        }
        lock(&self.records).record_child(task);
        if self.sentinel.state() > TaskState::Pending {
            warn!(
                group = %self.group_id(),
                task = %task.id(),
                "Child added after the group started finishing"
            );
        }
        if let Err(e) = self.sentinel.add_dependency(task) {
            error!(group = %self.group_id(), task = %task.id(), "Could not track child: {}", e);
        }
    }

    fn will_finish(&self, _scheduler: &Scheduler, task: &Task, errors: &[TaskError]) {
        if self.is_sentinel(task) {
            return;
        }
        if let Some(handle) = self.handle() {
            self.behavior.child_will_finish(&handle, task, errors);
        }
    }

    fn did_finish(&self, _scheduler: &Scheduler, task: &Task, errors: &[TaskError]) {
        if self.is_sentinel(task) {
            return;
        }
        let hooks = lock(&self.child_hooks).clone();
        for hook in hooks {
            hook(task, errors);
        }
    }
}

/// Handle to a running or not-yet-started group, passed to
/// [`GroupBehavior`] hooks.
#[derive(Clone)]
pub struct GroupHandle {
    pub(crate) core: Arc<GroupCore>,
}

impl GroupHandle {
    /// The group task, while it is alive
    pub fn task(&self) -> Option<Task> {
        self.core.group.get().and_then(WeakTask::upgrade)
    }

    /// The group's internal scheduler
    pub fn scheduler(&self) -> &Scheduler {
        &self.core.scheduler
    }

    /// Add a child.
    ///
    /// Before the group executes the child is queued; afterwards it is
    /// submitted straight away. Fails once the group has started finishing.
    pub fn add_child(&self, task: Task) -> Result<()> {
        {
            let mut pending = lock(&self.core.pending);
            if let Some(queued) = pending.as_mut() {
                lock(&self.core.records).record_child(&task);
                queued.push(task);
                return Ok(());
            }
        }
        if self.core.sentinel.state() > TaskState::Pending {
            return Err(EngineError::GroupSealed(self.core.group_id()));
        }
        self.core.scheduler.add(task)
    }

    pub fn add_children(&self, tasks: impl IntoIterator<Item = Task>) -> Result<()> {
        for task in tasks {
            self.add_child(task)?;
        }
        Ok(())
    }

    /// Record an error against the group itself
    pub fn aggregate_error(&self, error: TaskError) {
        lock(&self.core.records).own_errors.push(error);
    }

    /// Record errors reported by `child`
    pub fn aggregate_child_errors(&self, child: &Task, errors: Vec<TaskError>) {
        if errors.is_empty() {
            return;
        }
        lock(&self.core.records)
            .child_errors
            .entry(child.id())
            .or_default()
            .extend(errors);
    }

    /// Aggregate in child registration order, followed by the group's own
    /// errors
    pub fn aggregate_errors(&self) -> Vec<TaskError> {
        let records = lock(&self.core.records);
        records
            .children
            .iter()
            .filter_map(|child| records.child_errors.get(&child.id()))
            .flatten()
            .chain(records.own_errors.iter())
            .cloned()
            .collect()
    }

    /// Children in registration order
    pub fn children(&self) -> Vec<Task> {
        lock(&self.core.records).children.clone()
    }
}

/// Work body of a group task
pub(crate) struct GroupWork {
    pub(crate) core: Arc<GroupCore>,
}

#[async_trait]
impl Work for GroupWork {
    async fn execute(&self, ctx: TaskContext) {
        let core = &self.core;
        let handle = GroupHandle {
            core: Arc::clone(core),
        };
        core.scheduler.set_exclusivity(ctx.exclusivity());

        core.behavior.will_execute(&handle);

        let initial = lock(&core.pending).take().unwrap_or_default();
        debug!(group = %ctx.task().id(), "Starting {} children", initial.len());
        for child in initial {
            if let Err(e) = core.scheduler.add(child) {
                error!(group = %ctx.task().id(), "Could not add child: {}", e);
                handle.aggregate_error(TaskError::execution(e));
            }
        }

        core.scheduler.set_suspended(false);
        if let Err(e) = core.scheduler.add(core.sentinel.clone()) {
            error!(group = %ctx.task().id(), "Could not add finishing task: {}", e);
            ctx.finish(vec![TaskError::execution(e)]);
            return;
        }

        core.sentinel.wait().await;
        core.scheduler.set_suspended(true);

        ctx.finish(handle.aggregate_errors());
    }

    fn on_cancel(&self, task: &Task) {
        debug!(group = %task.id(), "Cancelling children");
        let queued = lock(&self.core.pending).clone().unwrap_or_default();
        for child in queued {
            child.cancel();
        }
        for child in self.core.scheduler.tasks() {
            if !self.core.is_sentinel(&child) {
                child.cancel();
            }
        }
    }
}
