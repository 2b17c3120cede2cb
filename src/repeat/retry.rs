use crate::config::RetryConfig;
use crate::error::{Result, TaskError};
use crate::group::TaskGroup;
use crate::repeat::backoff::WaitStrategy;
use crate::repeat::engine::{Policy, RepeatCore, RetryFailureInfo, RetryHandler};
use crate::repeat::payload::{Payload, payloads};
use crate::task::Task;
use std::sync::Arc;

/// Retries a task until an attempt succeeds.
///
/// After every failed attempt the handler receives the failure and the
/// payload the iterator suggests next, and returns the payload to run or
/// `None` to give up. Errors of intermediate attempts are dropped; when the
/// retry gives up it finishes with the last attempt's errors.
#[derive(Clone)]
pub struct RetryTask {
    group: TaskGroup,
    core: Arc<RepeatCore>,
}

impl RetryTask {
    pub fn new<I, H>(
        name: impl Into<String>,
        max: Option<usize>,
        payloads: I,
        handler: H,
    ) -> Result<Self>
    where
        I: IntoIterator<Item = Payload>,
        I::IntoIter: Send + 'static,
        H: Fn(&RetryFailureInfo, Payload) -> Option<Payload> + Send + Sync + 'static,
    {
        let name = name.into();
        let handler: RetryHandler = Arc::new(handler);
        let core = RepeatCore::new(
            &name,
            max,
            Box::new(payloads.into_iter()),
            Policy::Retry(handler),
        )?;
        let group = TaskGroup::with_behavior_arc(name, std::iter::empty(), core.clone());
        Ok(Self { group, core })
    }

    /// Retry tasks from `factory` up to `max` attempts, always accepting
    /// the suggested payload
    pub fn upto<F>(name: impl Into<String>, max: usize, wait: WaitStrategy, factory: F) -> Result<Self>
    where
        F: FnMut() -> Option<Task> + Send + 'static,
    {
        Self::new(name, Some(max), payloads(factory, wait), |_, suggested| {
            Some(suggested)
        })
    }

    /// Retry using the attempt limit and wait strategy from `config`
    pub fn from_config<F>(name: impl Into<String>, config: &RetryConfig, factory: F) -> Result<Self>
    where
        F: FnMut() -> Option<Task> + Send + 'static,
    {
        Self::new(
            name,
            config.max_attempts,
            payloads(factory, config.wait.clone()),
            |_, suggested| Some(suggested),
        )
    }

    /// Retry with [`RetryConfig::default`]
    pub fn with_defaults<F>(name: impl Into<String>, factory: F) -> Result<Self>
    where
        F: FnMut() -> Option<Task> + Send + 'static,
    {
        Self::from_config(name, &RetryConfig::default(), factory)
    }

    pub fn task(&self) -> &Task {
        self.group.task()
    }

    pub fn group(&self) -> &TaskGroup {
        &self.group
    }

    /// Attempts scheduled so far, starting at 1
    pub fn count(&self) -> usize {
        self.core.count()
    }

    /// The latest attempt
    pub fn current(&self) -> Task {
        self.core.current()
    }

    pub fn add_configure(&self, configure: impl Fn(&Task) + Send + Sync + 'static) {
        self.core.add_configure(Arc::new(configure));
    }

    pub fn aggregate_errors(&self) -> Vec<TaskError> {
        self.group.aggregate_errors()
    }
}

impl From<RetryTask> for Task {
    fn from(retry: RetryTask) -> Self {
        retry.group.into()
    }
}
