use crate::error::TaskError;
use crate::guard::types::{Guard, GuardOutcome};
use crate::task::Task;
use async_trait::async_trait;
use tracing::debug;

/// Guard backed by a synchronous closure.
///
/// `Ok(false)` fails with [`TaskError::BlockGuardFailed`]; an `Err` is
/// recorded as returned.
pub struct BlockGuard<F> {
    name: String,
    block: F,
}

impl<F> BlockGuard<F>
where
    F: Fn() -> Result<bool, TaskError> + Send + Sync + 'static,
{
    pub fn new(name: impl Into<String>, block: F) -> Self {
        Self {
            name: name.into(),
            block,
        }
    }
}

#[async_trait]
impl<F> Guard for BlockGuard<F>
where
    F: Fn() -> Result<bool, TaskError> + Send + Sync + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn evaluate(&self, _task: &Task) -> GuardOutcome {
        match (self.block)() {
            Ok(true) => GuardOutcome::Satisfied,
            Ok(false) => GuardOutcome::Failed(TaskError::BlockGuardFailed(self.name.clone())),
            Err(error) => GuardOutcome::Failed(error),
        }
    }
}

/// Always satisfied
#[derive(Debug, Clone, Copy, Default)]
pub struct TrueGuard;

#[async_trait]
impl Guard for TrueGuard {
    fn name(&self) -> &str {
        "True"
    }

    async fn evaluate(&self, _task: &Task) -> GuardOutcome {
        GuardOutcome::Satisfied
    }
}

/// Always fails
#[derive(Debug, Clone, Copy, Default)]
pub struct FalseGuard;

#[async_trait]
impl Guard for FalseGuard {
    fn name(&self) -> &str {
        "False"
    }

    async fn evaluate(&self, _task: &Task) -> GuardOutcome {
        GuardOutcome::Failed(TaskError::guard("False", "always fails"))
    }
}

/// Fails if any direct dependency was cancelled or failed.
///
/// Cancelled dependencies are reported in preference to failed ones.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoFailedDependencies;

#[async_trait]
impl Guard for NoFailedDependencies {
    fn name(&self) -> &str {
        "No Failed Dependencies"
    }

    async fn evaluate(&self, task: &Task) -> GuardOutcome {
        let dependencies = task.dependencies();
        if dependencies.iter().any(Task::is_cancelled) {
            debug!(task = %task.id(), "Found cancelled dependencies");
            return GuardOutcome::Failed(TaskError::CancelledDependencies);
        }
        if dependencies.iter().any(Task::has_failed) {
            debug!(task = %task.id(), "Found failed dependencies");
            return GuardOutcome::Failed(TaskError::FailedDependencies);
        }
        GuardOutcome::Satisfied
    }
}

/// Serializes every task carrying the same category.
///
/// Never fails; the scheduler registers the category with its
/// [`ExclusivityController`](crate::exclusivity::ExclusivityController).
#[derive(Debug, Clone)]
pub struct MutuallyExclusive {
    name: String,
    category: String,
}

impl MutuallyExclusive {
    pub fn new(category: impl Into<String>) -> Self {
        let category = category.into();
        Self {
            name: format!("MutuallyExclusive<{}>", category),
            category,
        }
    }

    /// Use a type's name as the category
    pub fn of<T: ?Sized>() -> Self {
        Self::new(std::any::type_name::<T>())
    }
}

#[async_trait]
impl Guard for MutuallyExclusive {
    fn name(&self) -> &str {
        &self.name
    }

    fn category(&self) -> Option<&str> {
        Some(&self.category)
    }

    async fn evaluate(&self, _task: &Task) -> GuardOutcome {
        GuardOutcome::Satisfied
    }
}
