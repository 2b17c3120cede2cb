use crate::config::SchedulerConfig;
use crate::error::{EngineError, Result, TaskError};
use crate::exclusivity::ExclusivityController;
use crate::scheduler::delegate::SchedulerDelegate;
use crate::scheduler::driver;
use crate::sync::{read, write};
use crate::task::{DependencyKind, Task, TaskId, TaskObserver, TaskState};
use dashmap::DashMap;
use std::collections::HashSet;
use std::sync::{Arc, OnceLock, RwLock, Weak};
use tokio::runtime::Handle;
use tokio::sync::{Semaphore, watch};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Holds submitted tasks and drives each one through its lifecycle.
///
/// Every accepted task gets its own driver future on the tokio runtime that
/// was current when the scheduler accepted its first task. Clones share the
/// same queue.
#[derive(Clone)]
pub struct Scheduler {
    shared: Arc<SchedulerShared>,
}

struct SchedulerShared {
    id: Uuid,
    name: String,
    tasks: DashMap<TaskId, Task>,
    suspended: watch::Sender<bool>,
    limiter: Option<Arc<Semaphore>>,
    exclusivity: RwLock<Arc<ExclusivityController>>,
    delegate: RwLock<Option<Weak<dyn SchedulerDelegate>>>,
    runtime: OnceLock<Handle>,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new(SchedulerConfig::default())
    }
}

impl Scheduler {
    pub fn new(config: SchedulerConfig) -> Self {
        Self::with_exclusivity(config, Arc::new(ExclusivityController::new()))
    }

    /// Create a scheduler sharing an existing exclusivity controller
    pub fn with_exclusivity(
        config: SchedulerConfig,
        exclusivity: Arc<ExclusivityController>,
    ) -> Self {
        let (suspended, _) = watch::channel(config.start_suspended);
        let limiter = config
            .max_concurrent_tasks
            .map(|limit| Arc::new(Semaphore::new(limit.clamp(1, Semaphore::MAX_PERMITS))));
        Self {
            shared: Arc::new(SchedulerShared {
                id: Uuid::new_v4(),
                name: config.name,
                tasks: DashMap::new(),
                suspended,
                limiter,
                exclusivity: RwLock::new(exclusivity),
                delegate: RwLock::new(None),
                runtime: OnceLock::new(),
            }),
        }
    }

    pub fn id(&self) -> Uuid {
        self.shared.id
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    pub fn exclusivity(&self) -> Arc<ExclusivityController> {
        Arc::clone(&read(&self.shared.exclusivity))
    }

    /// Replace the exclusivity controller used for tasks added from now on
    pub fn set_exclusivity(&self, exclusivity: Arc<ExclusivityController>) {
        *write(&self.shared.exclusivity) = exclusivity;
    }

    /// Register a delegate. Only a weak reference is kept.
    pub fn set_delegate<D: SchedulerDelegate>(&self, delegate: &Arc<D>) {
        let weak: Weak<D> = Arc::downgrade(delegate);
        let weak: Weak<dyn SchedulerDelegate> = weak;
        *write(&self.shared.delegate) = Some(weak);
    }

    pub fn clear_delegate(&self) {
        *write(&self.shared.delegate) = None;
    }

    fn delegate(&self) -> Option<Arc<dyn SchedulerDelegate>> {
        read(&self.shared.delegate).as_ref().and_then(Weak::upgrade)
    }

    pub(crate) fn limiter(&self) -> Option<Arc<Semaphore>> {
        self.shared.limiter.clone()
    }

    fn runtime(&self, task: TaskId) -> Result<Handle> {
        if let Some(handle) = self.shared.runtime.get() {
            return Ok(handle.clone());
        }
        let handle = Handle::try_current().map_err(|_| EngineError::NoRuntime(task))?;
        Ok(self.shared.runtime.get_or_init(|| handle).clone())
    }

    /// Submit a task.
    ///
    /// Claims the task, registers its mutual-exclusion categories, submits
    /// the prerequisite tasks its guards declare, then starts driving it.
    /// Nothing is registered unless the claim succeeds.
    pub fn add(&self, task: Task) -> Result<()> {
        let handle = self.runtime(task.id())?;
        task.will_enqueue()?;

        task.add_observer(QueueObserver {
            scheduler: Arc::downgrade(&self.shared),
        })?;

        let guards = task.guards();

        let exclusivity = self.exclusivity();
        let mut seen = HashSet::new();
        for category in guards.iter().filter_map(|guard| guard.category()) {
            if seen.insert(category) {
                exclusivity.register(&task, category);
            }
        }

        let mut upstream = task.dependencies();
        upstream.extend(
            task.all_dependencies()
                .into_iter()
                .filter(|(_, kind)| *kind == DependencyKind::Exclusive)
                .map(|(dependency, _)| dependency),
        );
        for guard in &guards {
            let Some(prerequisite) = guard.dependency(&task) else {
                continue;
            };
            if let Err(error) = self.add_prerequisite(&task, &prerequisite, &upstream) {
                warn!(
                    scheduler = %self.name(),
                    task = %task.id(),
                    "Could not submit prerequisite {}: {}",
                    prerequisite.name(),
                    error
                );
            }
        }

        self.shared.tasks.insert(task.id(), task.clone());
        debug!(
            scheduler = %self.name(),
            task = %task.id(),
            "Enqueued {}",
            task.name()
        );

        if let Some(delegate) = self.delegate() {
            delegate.will_add(self, &task);
        }

        handle.spawn(driver::drive(self.clone(), task));
        Ok(())
    }

    fn add_prerequisite(&self, task: &Task, prerequisite: &Task, upstream: &[Task]) -> Result<()> {
        if prerequisite.state() == TaskState::Initialized {
            prerequisite.add_dependencies(upstream)?;
        }
        task.add_dependency_of_kind(prerequisite, DependencyKind::Guard)?;
        match self.add(prerequisite.clone()) {
            // Submitted elsewhere; the dependency edge is all we need.
            Err(EngineError::AlreadyEnqueued(_)) => Ok(()),
            result => result,
        }
    }

    /// Submit several tasks in order, stopping at the first error
    pub fn add_all(&self, tasks: impl IntoIterator<Item = Task>) -> Result<()> {
        for task in tasks {
            self.add(task)?;
        }
        Ok(())
    }

    /// Hold or release tasks that have not started yet
    pub fn set_suspended(&self, suspended: bool) {
        let previous = self.shared.suspended.send_replace(suspended);
        if previous != suspended {
            info!(
                scheduler = %self.name(),
                "{}",
                if suspended { "Suspended" } else { "Resumed" }
            );
        }
    }

    pub fn is_suspended(&self) -> bool {
        *self.shared.suspended.borrow()
    }

    pub(crate) async fn resumed(&self) {
        let mut rx = self.shared.suspended.subscribe();
        let _ = rx.wait_for(|suspended| !*suspended).await;
    }

    /// Cancel every task still on the scheduler
    pub fn cancel_all(&self) {
        let tasks = self.tasks();
        debug!(scheduler = %self.name(), "Cancelling {} task(s)", tasks.len());
        for task in tasks {
            task.cancel();
        }
    }

    /// Snapshot of unfinished tasks
    pub fn tasks(&self) -> Vec<Task> {
        self.shared
            .tasks
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }

    pub fn task_count(&self) -> usize {
        self.shared.tasks.len()
    }

    /// Wait until every task on the scheduler, including ones added while
    /// waiting, has finished
    pub async fn wait_until_idle(&self) {
        loop {
            let tasks = self.tasks();
            if tasks.is_empty() {
                return;
            }
            for task in tasks {
                task.wait().await;
            }
        }
    }

    fn did_produce(&self, producer: &Task, produced: &Task) {
        if let Some(delegate) = self.delegate() {
            delegate.will_produce(self, producer, produced);
        }
        if let Err(error) = self.add(produced.clone()) {
            warn!(
                scheduler = %self.name(),
                task = %producer.id(),
                "Could not add produced task {}: {}",
                produced.name(),
                error
            );
        }
    }

    fn will_finish(&self, task: &Task, errors: &[TaskError]) {
        if let Some(delegate) = self.delegate() {
            delegate.will_finish(self, task, errors);
        }
    }

    fn did_finish(&self, task: &Task, errors: &[TaskError]) {
        self.shared.tasks.remove(&task.id());
        if let Some(delegate) = self.delegate() {
            delegate.did_finish(self, task, errors);
        }
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("id", &self.shared.id)
            .field("name", &self.shared.name)
            .field("tasks", &self.shared.tasks.len())
            .field("suspended", &self.is_suspended())
            .finish()
    }
}

/// Links a task back to the scheduler it was added to
struct QueueObserver {
    scheduler: Weak<SchedulerShared>,
}

impl QueueObserver {
    fn scheduler(&self) -> Option<Scheduler> {
        self.scheduler
            .upgrade()
            .map(|shared| Scheduler { shared })
    }
}

impl TaskObserver for QueueObserver {
    fn did_produce(&self, task: &Task, produced: &Task) {
        if let Some(scheduler) = self.scheduler() {
            scheduler.did_produce(task, produced);
        }
    }

    fn will_finish(&self, task: &Task, errors: &[TaskError]) {
        if let Some(scheduler) = self.scheduler() {
            scheduler.will_finish(task, errors);
        }
    }

    fn did_finish(&self, task: &Task, errors: &[TaskError]) {
        if let Some(scheduler) = self.scheduler() {
            scheduler.did_finish(task, errors);
        }
    }
}
