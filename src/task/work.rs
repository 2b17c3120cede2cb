use crate::error::{EngineError, TaskError};
use crate::exclusivity::ExclusivityController;
use crate::scheduler::Scheduler;
use crate::task::handle::Task;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// The body of a task.
///
/// `execute` is called at most once, after dependencies have finished and
/// every guard has passed. The body must eventually call
/// [`TaskContext::finish`] exactly once, directly or from some later
/// completion path; returning from `execute` does not finish the task.
#[async_trait]
pub trait Work: Send + Sync + 'static {
    async fn execute(&self, ctx: TaskContext);

    /// Called synchronously the first time the task is cancelled
    fn on_cancel(&self, _task: &Task) {}
}

/// What a running work body can reach
#[derive(Clone)]
pub struct TaskContext {
    task: Task,
    scheduler: Scheduler,
}

impl TaskContext {
    pub(crate) fn new(task: Task, scheduler: Scheduler) -> Self {
        Self { task, scheduler }
    }

    pub fn task(&self) -> &Task {
        &self.task
    }

    /// The scheduler executing this task
    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn exclusivity(&self) -> Arc<ExclusivityController> {
        self.scheduler.exclusivity()
    }

    pub fn is_cancelled(&self) -> bool {
        self.task.is_cancelled()
    }

    /// Resolves once the task is cancelled
    pub async fn cancelled(&self) {
        self.task.cancelled().await
    }

    /// Emit a new task onto the executing scheduler
    pub fn produce(&self, task: Task) -> Result<(), EngineError> {
        self.task.produce(task)
    }

    pub fn finish(&self, errors: Vec<TaskError>) {
        self.task.finish(errors)
    }

    pub fn finish_with(&self, result: Result<(), TaskError>) {
        self.task.finish(result.err().into_iter().collect())
    }
}

/// Work body backed by an async closure. The task is finished with the
/// closure's result.
pub struct FnWork<F> {
    body: F,
}

impl<F> FnWork<F> {
    pub fn new(body: F) -> Self {
        Self { body }
    }
}

#[async_trait]
impl<F, Fut> Work for FnWork<F>
where
    F: Fn(TaskContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), TaskError>> + Send + 'static,
{
    async fn execute(&self, ctx: TaskContext) {
        let result = (self.body)(ctx.clone()).await;
        ctx.finish_with(result);
    }
}

/// Finishes immediately
pub struct NoOpWork;

#[async_trait]
impl Work for NoOpWork {
    async fn execute(&self, ctx: TaskContext) {
        ctx.finish(Vec::new());
    }
}

/// How long a [`DelayWork`] waits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delay {
    By(Duration),
    Until(DateTime<Utc>),
}

impl Delay {
    /// Time left to wait, zero once the delay has passed
    pub fn remaining(&self) -> Duration {
        match self {
            Delay::By(duration) => *duration,
            Delay::Until(at) => at
                .signed_duration_since(Utc::now())
                .to_std()
                .unwrap_or(Duration::ZERO),
        }
    }
}

/// Sleeps, then finishes. Cancellation cuts the sleep short.
pub struct DelayWork {
    delay: Delay,
}

impl DelayWork {
    pub fn new(delay: Delay) -> Self {
        Self { delay }
    }
}

#[async_trait]
impl Work for DelayWork {
    async fn execute(&self, ctx: TaskContext) {
        let remaining = self.delay.remaining();
        if !remaining.is_zero() {
            tokio::select! {
                _ = tokio::time::sleep(remaining) => {}
                _ = ctx.cancelled() => {
                    debug!(task = %ctx.task().id(), "Delay cut short by cancellation");
                }
            }
        }
        ctx.finish(Vec::new());
    }
}
