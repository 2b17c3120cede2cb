use crate::error::{Result, TaskError};
use crate::group::TaskGroup;
use crate::repeat::backoff::WaitStrategy;
use crate::repeat::engine::{Policy, RepeatCore};
use crate::repeat::payload::{Payload, payloads};
use crate::task::Task;
use std::sync::Arc;

/// Runs a sequence of tasks one after another, regardless of their outcome.
///
/// The next task is pulled from the payload iterator as the current one
/// finishes, until the iterator is exhausted or `max` tasks have run. The
/// repeat task finishes with every child's errors.
#[derive(Clone)]
pub struct RepeatTask {
    group: TaskGroup,
    core: Arc<RepeatCore>,
}

impl RepeatTask {
    /// Fails with [`EngineError::EmptyIterator`](crate::EngineError::EmptyIterator)
    /// if `payloads` yields nothing.
    pub fn new<I>(name: impl Into<String>, max: Option<usize>, payloads: I) -> Result<Self>
    where
        I: IntoIterator<Item = Payload>,
        I::IntoIter: Send + 'static,
    {
        let name = name.into();
        let core = RepeatCore::new(&name, max, Box::new(payloads.into_iter()), Policy::Repeat)?;
        let group = TaskGroup::with_behavior_arc(name, std::iter::empty(), core.clone());
        Ok(Self { group, core })
    }

    /// Repeat tasks built by `factory`, waiting according to `wait` between
    /// them
    pub fn from_fn<F>(
        name: impl Into<String>,
        max: Option<usize>,
        wait: WaitStrategy,
        factory: F,
    ) -> Result<Self>
    where
        F: FnMut() -> Option<Task> + Send + 'static,
    {
        Self::new(name, max, payloads(factory, wait))
    }

    pub fn task(&self) -> &Task {
        self.group.task()
    }

    pub fn group(&self) -> &TaskGroup {
        &self.group
    }

    /// Number of tasks scheduled so far, starting at 1
    pub fn count(&self) -> usize {
        self.core.count()
    }

    /// Most recently scheduled task
    pub fn current(&self) -> Task {
        self.core.current()
    }

    /// Append a step applied to every task scheduled from now on, after the
    /// steps appended before it
    pub fn add_configure(&self, configure: impl Fn(&Task) + Send + Sync + 'static) {
        self.core.add_configure(Arc::new(configure));
    }

    pub fn aggregate_errors(&self) -> Vec<TaskError> {
        self.group.aggregate_errors()
    }
}

impl From<RepeatTask> for Task {
    fn from(repeat: RepeatTask) -> Self {
        repeat.group.into()
    }
}
