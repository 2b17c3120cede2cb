use crate::error::TaskError;
use crate::task::Task;
use async_trait::async_trait;

/// Result of evaluating a single guard
#[derive(Debug, Clone)]
pub enum GuardOutcome {
    /// The guard is met
    Satisfied,
    /// The guard failed but asked for the task to be dropped silently
    Ignored,
    /// The guard is not met
    Failed(TaskError),
}

impl GuardOutcome {
    pub fn is_satisfied(&self) -> bool {
        matches!(self, GuardOutcome::Satisfied)
    }

    /// Build an outcome from a boolean, failing with `error` on `false`
    pub fn from_bool(satisfied: bool, error: impl FnOnce() -> TaskError) -> Self {
        if satisfied {
            GuardOutcome::Satisfied
        } else {
            GuardOutcome::Failed(error())
        }
    }
}

/// A named pre-condition attached to a task.
///
/// Guards run after every dependency of the task has finished. A guard may
/// ask for an auxiliary prerequisite task through [`Guard::dependency`]; the
/// scheduler submits it alongside the owning task and makes the owner wait
/// for it.
#[async_trait]
pub trait Guard: Send + Sync + 'static {
    /// Diagnostic name
    fn name(&self) -> &str;

    /// Mutual-exclusion category, if any
    fn category(&self) -> Option<&str> {
        None
    }

    /// Prerequisite task to run before evaluation. Called once, when the
    /// owning task is submitted.
    fn dependency(&self, _task: &Task) -> Option<Task> {
        None
    }

    async fn evaluate(&self, task: &Task) -> GuardOutcome;
}
