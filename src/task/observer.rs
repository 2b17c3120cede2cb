use crate::error::TaskError;
use crate::task::handle::Task;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Listener for task lifecycle events.
///
/// Every callback is invoked without any engine lock held, so observers may
/// freely add, produce or cancel other tasks.
#[allow(unused_variables)]
pub trait TaskObserver: Send + Sync + 'static {
    /// The observer was added to `task`
    fn did_attach(&self, task: &Task) {}

    /// The work body is about to run
    fn did_start(&self, task: &Task) {}

    /// The task was cancelled for the first time
    fn did_cancel(&self, task: &Task) {}

    /// The task emitted `produced` while executing
    fn did_produce(&self, task: &Task, produced: &Task) {}

    /// The task entered `Finishing` with its final error list
    fn will_finish(&self, task: &Task, errors: &[TaskError]) {}

    /// The task reached `Finished`
    fn did_finish(&self, task: &Task, errors: &[TaskError]) {}
}

type TaskHook = Box<dyn Fn(&Task) + Send + Sync>;
type ProduceHook = Box<dyn Fn(&Task, &Task) + Send + Sync>;
type FinishHook = Box<dyn Fn(&Task, &[TaskError]) + Send + Sync>;

/// Observer assembled from closures
#[derive(Default)]
pub struct BlockObserver {
    on_start: Option<TaskHook>,
    on_cancel: Option<TaskHook>,
    on_produce: Option<ProduceHook>,
    on_will_finish: Option<FinishHook>,
    on_finish: Option<FinishHook>,
}

impl BlockObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_start(mut self, hook: impl Fn(&Task) + Send + Sync + 'static) -> Self {
        self.on_start = Some(Box::new(hook));
        self
    }

    pub fn on_cancel(mut self, hook: impl Fn(&Task) + Send + Sync + 'static) -> Self {
        self.on_cancel = Some(Box::new(hook));
        self
    }

    pub fn on_produce(mut self, hook: impl Fn(&Task, &Task) + Send + Sync + 'static) -> Self {
        self.on_produce = Some(Box::new(hook));
        self
    }

    pub fn on_will_finish(
        mut self,
        hook: impl Fn(&Task, &[TaskError]) + Send + Sync + 'static,
    ) -> Self {
        self.on_will_finish = Some(Box::new(hook));
        self
    }

    pub fn on_finish(mut self, hook: impl Fn(&Task, &[TaskError]) + Send + Sync + 'static) -> Self {
        self.on_finish = Some(Box::new(hook));
        self
    }
}

impl TaskObserver for BlockObserver {
    fn did_start(&self, task: &Task) {
        if let Some(hook) = &self.on_start {
            hook(task);
        }
    }

    fn did_cancel(&self, task: &Task) {
        if let Some(hook) = &self.on_cancel {
            hook(task);
        }
    }

    fn did_produce(&self, task: &Task, produced: &Task) {
        if let Some(hook) = &self.on_produce {
            hook(task, produced);
        }
    }

    fn will_finish(&self, task: &Task, errors: &[TaskError]) {
        if let Some(hook) = &self.on_will_finish {
            hook(task, errors);
        }
    }

    fn did_finish(&self, task: &Task, errors: &[TaskError]) {
        if let Some(hook) = &self.on_finish {
            hook(task, errors);
        }
    }
}

/// Emits one tracing event per lifecycle callback
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingObserver;

impl TaskObserver for LoggingObserver {
    fn did_attach(&self, task: &Task) {
        debug!(task = %task.id(), name = %task.name(), "Observer attached");
    }

    fn did_start(&self, task: &Task) {
        info!(task = %task.id(), name = %task.name(), "Task started");
    }

    fn did_cancel(&self, task: &Task) {
        warn!(task = %task.id(), name = %task.name(), "Task cancelled");
    }

    fn did_produce(&self, task: &Task, produced: &Task) {
        info!(
            task = %task.id(),
            name = %task.name(),
            produced = %produced.id(),
            "Task produced {}",
            produced.name()
        );
    }

    fn did_finish(&self, task: &Task, errors: &[TaskError]) {
        if errors.is_empty() {
            info!(task = %task.id(), name = %task.name(), "Task finished");
        } else {
            warn!(
                task = %task.id(),
                name = %task.name(),
                error_count = errors.len(),
                "Task finished with errors: {:?}",
                errors
            );
        }
    }
}

/// Cancels a task with [`TaskError::TimedOut`] if it is still unfinished
/// `timeout` after it started executing.
#[derive(Debug, Clone, Copy)]
pub struct TimeoutObserver {
    timeout: Duration,
}

impl TimeoutObserver {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl TaskObserver for TimeoutObserver {
    fn did_start(&self, task: &Task) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            warn!(task = %task.id(), "No runtime available, timeout not armed");
            return;
        };
        let timeout = self.timeout;
        let weak = task.downgrade();
        handle.spawn(async move {
            tokio::time::sleep(timeout).await;
            if let Some(task) = weak.upgrade()
                && !task.is_finished()
            {
                warn!(task = %task.id(), name = %task.name(), "Timed out after {:?}", timeout);
                task.cancel_with_error(Some(TaskError::TimedOut(timeout)));
            }
        });
    }
}
