//! Error types for the orchestration engine.
//!
//! Two families live here. [`TaskError`] is *data*: it is appended to a
//! task's error list by guards, work bodies and groups, and is never thrown
//! across task boundaries. [`EngineError`] is returned from API calls that
//! are used incorrectly, such as mutating a task after it started executing.

use crate::task::{TaskId, TaskState};
use std::sync::Arc;
use std::time::Duration;

/// An error recorded against a task.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TaskError {
    /// A named guard was not met.
    #[error("guard '{guard}' failed: {reason}")]
    GuardFailed { guard: String, reason: String },

    /// A negated guard found its inner guard satisfied.
    #[error("negated guard '{0}' was satisfied")]
    Negated(String),

    /// A block guard returned `false`.
    #[error("block guard '{0}' returned false")]
    BlockGuardFailed(String),

    /// At least one dependency finished cancelled.
    #[error("one or more dependencies were cancelled")]
    CancelledDependencies,

    /// At least one dependency finished with errors.
    #[error("one or more dependencies failed")]
    FailedDependencies,

    /// A dependency finished without producing the value this task requires.
    #[error("requirement not satisfied")]
    RequirementNotSatisfied,

    /// The task did not finish within its allotted time.
    #[error("timed out after {0:?}")]
    TimedOut(Duration),

    /// A capability is not available on this host.
    #[error("capability '{0}' is unavailable")]
    CapabilityUnavailable(String),

    /// A capability is available but its authorization does not meet the requirement.
    #[error("capability '{0}' is not authorized")]
    CapabilityUnauthorized(String),

    /// The work body reported a failure.
    #[error("execution failed: {0}")]
    Execution(String),

    /// Any other error raised inside a work body.
    #[error(transparent)]
    Other(Arc<anyhow::Error>),
}

impl TaskError {
    /// Build an execution failure from anything printable.
    pub fn execution(message: impl std::fmt::Display) -> Self {
        TaskError::Execution(message.to_string())
    }

    /// Build a guard failure.
    pub fn guard(guard: impl Into<String>, reason: impl Into<String>) -> Self {
        TaskError::GuardFailed {
            guard: guard.into(),
            reason: reason.into(),
        }
    }

    /// Whether this error originated from guard evaluation.
    pub fn is_guard_failure(&self) -> bool {
        matches!(
            self,
            TaskError::GuardFailed { .. }
                | TaskError::Negated(_)
                | TaskError::BlockGuardFailed(_)
                | TaskError::CancelledDependencies
                | TaskError::FailedDependencies
                | TaskError::CapabilityUnavailable(_)
                | TaskError::CapabilityUnauthorized(_)
        )
    }
}

impl From<anyhow::Error> for TaskError {
    fn from(error: anyhow::Error) -> Self {
        TaskError::Other(Arc::new(error))
    }
}

impl From<EngineError> for TaskError {
    fn from(error: EngineError) -> Self {
        TaskError::Execution(error.to_string())
    }
}

/// Misuse of the engine API.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The task has already been submitted to a scheduler.
    #[error("task {0} has already been enqueued")]
    AlreadyEnqueued(TaskId),

    /// The operation needs a task that has been submitted to a scheduler.
    #[error("task {0} has not been enqueued")]
    NotEnqueued(TaskId),

    /// Guards, dependencies and observers are frozen once execution begins.
    #[error("task {task} can no longer be modified in state {state:?}")]
    Immutable { task: TaskId, state: TaskState },

    /// The group's sentinel has started finishing; no more children may be added.
    #[error("group {0} no longer accepts children")]
    GroupSealed(TaskId),

    /// A repetition iterator produced no initial payload.
    #[error("repetition iterator yielded no initial payload")]
    EmptyIterator,

    /// No tokio runtime is available to drive submitted tasks.
    #[error("no tokio runtime available to drive task {0}")]
    NoRuntime(TaskId),

    /// Configuration could not be loaded or saved.
    #[error("configuration error: {0}")]
    Config(String),

    /// The global tracing subscriber could not be installed.
    #[error("logging error: {0}")]
    Logging(String),
}

/// Convenience result type for engine API calls.
pub type Result<T> = std::result::Result<T, EngineError>;
