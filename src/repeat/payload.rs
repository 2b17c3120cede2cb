use crate::repeat::backoff::WaitStrategy;
use crate::task::{Delay, Task};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Step applied to a task before it is submitted
pub type Configure = Arc<dyn Fn(&Task) + Send + Sync>;

/// One iteration of a repetition: the next task, an optional wait before it
/// and an optional configuration step.
#[derive(Clone)]
pub struct Payload {
    pub task: Task,
    pub delay: Option<Delay>,
    pub configure: Option<Configure>,
}

impl Payload {
    pub fn new(task: Task) -> Self {
        Self {
            task,
            delay: None,
            configure: None,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(Delay::By(delay));
        self
    }

    pub fn with_delay_until(mut self, delay: Delay) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn with_configure(mut self, configure: impl Fn(&Task) + Send + Sync + 'static) -> Self {
        self.configure = Some(Arc::new(configure));
        self
    }
}

impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Payload")
            .field("task", &self.task)
            .field("delay", &self.delay)
            .field("configure", &self.configure.is_some())
            .finish()
    }
}

/// Pair tasks from `factory` with delays from `wait`.
///
/// The sequence ends when the factory returns `None`.
pub fn payloads<F>(factory: F, wait: WaitStrategy) -> impl Iterator<Item = Payload> + Send + 'static
where
    F: FnMut() -> Option<Task> + Send + 'static,
{
    std::iter::from_fn(factory)
        .zip(wait)
        .map(|(task, delay)| Payload::new(task).with_delay(delay))
}
