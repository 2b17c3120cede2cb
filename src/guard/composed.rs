//! Wrappers that change how an inner guard's outcome is reported.

use crate::error::TaskError;
use crate::guard::types::{Guard, GuardOutcome};
use crate::task::Task;
use async_trait::async_trait;

/// Inverts the inner guard
pub struct Negated<G> {
    name: String,
    inner: G,
}

impl<G: Guard> Negated<G> {
    pub fn new(inner: G) -> Self {
        Self {
            name: format!("Not<{}>", inner.name()),
            inner,
        }
    }
}

#[async_trait]
impl<G: Guard> Guard for Negated<G> {
    fn name(&self) -> &str {
        &self.name
    }

    fn category(&self) -> Option<&str> {
        self.inner.category()
    }

    fn dependency(&self, task: &Task) -> Option<Task> {
        self.inner.dependency(task)
    }

    async fn evaluate(&self, task: &Task) -> GuardOutcome {
        match self.inner.evaluate(task).await {
            GuardOutcome::Satisfied => {
                GuardOutcome::Failed(TaskError::Negated(self.inner.name().to_string()))
            }
            GuardOutcome::Failed(_) | GuardOutcome::Ignored => GuardOutcome::Satisfied,
        }
    }
}

/// Turns a failure of the inner guard into a silent cancellation
pub struct Ignored<G> {
    name: String,
    inner: G,
}

impl<G: Guard> Ignored<G> {
    pub fn new(inner: G) -> Self {
        Self {
            name: format!("Ignored<{}>", inner.name()),
            inner,
        }
    }
}

#[async_trait]
impl<G: Guard> Guard for Ignored<G> {
    fn name(&self) -> &str {
        &self.name
    }

    fn category(&self) -> Option<&str> {
        self.inner.category()
    }

    fn dependency(&self, task: &Task) -> Option<Task> {
        self.inner.dependency(task)
    }

    async fn evaluate(&self, task: &Task) -> GuardOutcome {
        match self.inner.evaluate(task).await {
            GuardOutcome::Failed(_) => GuardOutcome::Ignored,
            outcome => outcome,
        }
    }
}

/// Evaluates the inner guard without its auxiliary dependency
pub struct Silent<G> {
    name: String,
    inner: G,
}

impl<G: Guard> Silent<G> {
    pub fn new(inner: G) -> Self {
        Self {
            name: format!("Silent<{}>", inner.name()),
            inner,
        }
    }
}

#[async_trait]
impl<G: Guard> Guard for Silent<G> {
    fn name(&self) -> &str {
        &self.name
    }

    fn category(&self) -> Option<&str> {
        self.inner.category()
    }

    async fn evaluate(&self, task: &Task) -> GuardOutcome {
        self.inner.evaluate(task).await
    }
}
