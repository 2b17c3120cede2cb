use crate::error::TaskError;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for tasks
pub type TaskId = Uuid;

/// Lifecycle state of a task.
///
/// States only ever move forward. The happy path visits every state in
/// declaration order; a cancelled task may jump from `Initialized`,
/// `Pending` or `Ready` straight to `Finishing`.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TaskState {
    /// Created but not yet submitted to a scheduler
    Initialized,
    /// Submitted, waiting for dependencies to finish
    Pending,
    /// Dependencies finished, guards are running
    EvaluatingGuards,
    /// Guards resolved, waiting for an execution slot
    Ready,
    /// Work body is running
    Executing,
    /// `finish` was called, observers are being notified
    Finishing,
    /// Terminal
    Finished,
}

impl TaskState {
    /// Check whether `self -> next` is a legal transition.
    pub fn can_transition_to(self, next: TaskState, cancelled: bool) -> bool {
        use TaskState::*;
        match (self, next) {
            (Initialized, Pending)
            | (Pending, EvaluatingGuards)
            | (EvaluatingGuards, Ready)
            | (Ready, Executing)
            | (Executing, Finishing)
            | (Finishing, Finished) => true,
            (Initialized, Finishing) | (Pending, Finishing) | (Ready, Finishing) => cancelled,
            _ => false,
        }
    }

    /// Whether the task has begun or passed execution.
    pub fn has_started(self) -> bool {
        self >= TaskState::Executing
    }

    /// Whether this is the terminal state.
    pub fn is_terminal(self) -> bool {
        self == TaskState::Finished
    }
}

/// How a task relates to one of its dependencies
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum DependencyKind {
    /// Added explicitly by the caller
    Direct,
    /// Auxiliary prerequisite declared by one of the task's guards
    Guard,
    /// Previous task in one of the task's mutual-exclusion categories
    Exclusive,
}

/// Terminal outcome of a task.
///
/// Cancellation is reported separately from failure, so a caller can always
/// tell the four terminal shapes apart.
#[derive(Clone, Debug)]
pub enum TaskOutcome {
    /// Finished without errors and without being cancelled
    Succeeded,
    /// Finished with errors
    Failed(Vec<TaskError>),
    /// Cancelled, no errors recorded
    Cancelled,
    /// Cancelled with errors, typically from failed guards
    CancelledWithErrors(Vec<TaskError>),
}

impl TaskOutcome {
    pub(crate) fn from_parts(cancelled: bool, errors: Vec<TaskError>) -> Self {
        match (cancelled, errors.is_empty()) {
            (false, true) => TaskOutcome::Succeeded,
            (false, false) => TaskOutcome::Failed(errors),
            (true, true) => TaskOutcome::Cancelled,
            (true, false) => TaskOutcome::CancelledWithErrors(errors),
        }
    }

    /// Check if the task succeeded
    pub fn is_success(&self) -> bool {
        matches!(self, TaskOutcome::Succeeded)
    }

    /// Check if the task was cancelled, with or without errors
    pub fn is_cancelled(&self) -> bool {
        matches!(
            self,
            TaskOutcome::Cancelled | TaskOutcome::CancelledWithErrors(_)
        )
    }

    /// Check if the task failed without being cancelled
    pub fn is_failed(&self) -> bool {
        matches!(self, TaskOutcome::Failed(_))
    }

    /// Errors recorded against the task
    pub fn errors(&self) -> &[TaskError] {
        match self {
            TaskOutcome::Failed(errors) | TaskOutcome::CancelledWithErrors(errors) => errors,
            TaskOutcome::Succeeded | TaskOutcome::Cancelled => &[],
        }
    }
}
