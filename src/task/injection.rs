//! Passing results between tasks.
//!
//! An injection runs after a dependency has finished and before the
//! dependent evaluates its guards, so the dependent's work body can rely on
//! whatever the injection stored.

use crate::error::{Result, TaskError};
use crate::sync::lock;
use crate::task::Task;
use std::fmt;
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Callback run with `(dependent, dependency, dependency errors)`
pub(crate) type Injection = Arc<dyn Fn(&Task, &Task, &[TaskError]) + Send + Sync>;

/// A value that may not have been produced yet
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PendingValue<T> {
    /// Not produced yet
    Pending,
    /// Finished without a value
    Void,
    Ready(T),
}

impl<T> Default for PendingValue<T> {
    fn default() -> Self {
        PendingValue::Pending
    }
}

impl<T> PendingValue<T> {
    pub fn value(&self) -> Option<&T> {
        match self {
            PendingValue::Ready(value) => Some(value),
            _ => None,
        }
    }

    pub fn into_value(self) -> Option<T> {
        match self {
            PendingValue::Ready(value) => Some(value),
            _ => None,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, PendingValue::Pending)
    }
}

/// Shared cell a task writes its result to, or reads its requirement from.
///
/// Clones refer to the same cell.
pub struct ResultSlot<T> {
    value: Arc<Mutex<PendingValue<T>>>,
}

impl<T> ResultSlot<T> {
    pub fn new() -> Self {
        Self {
            value: Arc::new(Mutex::new(PendingValue::Pending)),
        }
    }

    /// Store a produced value
    pub fn ready(&self, value: T) {
        *lock(&self.value) = PendingValue::Ready(value);
    }

    /// Mark the slot as finished without a value
    pub fn void(&self) {
        *lock(&self.value) = PendingValue::Void;
    }

    pub fn is_pending(&self) -> bool {
        lock(&self.value).is_pending()
    }

    /// Take the value out, leaving the slot pending
    pub fn take(&self) -> PendingValue<T> {
        std::mem::take(&mut *lock(&self.value))
    }
}

impl<T: Clone> ResultSlot<T> {
    pub fn get(&self) -> PendingValue<T> {
        lock(&self.value).clone()
    }

    pub fn value(&self) -> Option<T> {
        lock(&self.value).value().cloned()
    }
}

impl<T> Clone for ResultSlot<T> {
    fn clone(&self) -> Self {
        Self {
            value: Arc::clone(&self.value),
        }
    }
}

impl<T> Default for ResultSlot<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: fmt::Debug> fmt::Debug for ResultSlot<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ResultSlot").field(&*lock(&self.value)).finish()
    }
}

impl Task {
    /// Run `block` once `dependency` has finished, before this task
    /// evaluates its guards.
    ///
    /// `dependency` becomes a dependency of this task. If it finishes
    /// cancelled, `block` is skipped and this task is cancelled with
    /// [`TaskError::CancelledDependencies`].
    pub fn inject<F>(&self, dependency: &Task, block: F) -> Result<()>
    where
        F: Fn(&Task, &Task, &[TaskError]) + Send + Sync + 'static,
    {
        self.add_injection(dependency, Arc::new(block))
    }

    /// Copy `result` into `requirement` once `dependency` has finished
    pub fn inject_result<T>(
        &self,
        dependency: &Task,
        result: &ResultSlot<T>,
        requirement: &ResultSlot<T>,
    ) -> Result<()>
    where
        T: Clone + Send + 'static,
    {
        self.inject_result_via(dependency, result, requirement, Ok)
    }

    /// Convert `result` with `via` and store it in `requirement` once
    /// `dependency` has finished.
    ///
    /// This task is cancelled instead when the dependency failed, left
    /// `result` without a value, or `via` returned an error.
    pub fn inject_result_via<D, R, F>(
        &self,
        dependency: &Task,
        result: &ResultSlot<D>,
        requirement: &ResultSlot<R>,
        via: F,
    ) -> Result<()>
    where
        D: Clone + Send + 'static,
        R: Send + 'static,
        F: Fn(D) -> std::result::Result<R, TaskError> + Send + Sync + 'static,
    {
        let result = result.clone();
        let requirement = requirement.clone();
        self.inject(dependency, move |task, _dependency, errors| {
            if !errors.is_empty() {
                task.cancel_with_error(Some(TaskError::FailedDependencies));
                return;
            }
            let Some(value) = result.value() else {
                task.cancel_with_error(Some(TaskError::RequirementNotSatisfied));
                return;
            };
            match via(value) {
                Ok(value) => requirement.ready(value),
                Err(error) => task.cancel_with_error(Some(error)),
            }
        })
    }

    /// Run every injection whose dependency has finished. Stops at the first
    /// cancelled dependency.
    pub(crate) fn run_injections(&self) {
        for (dependency, injection) in self.injections() {
            if dependency.is_cancelled() {
                debug!(
                    task = %self.id(),
                    dependency = %dependency.id(),
                    "Injecting dependency was cancelled"
                );
                self.cancel_with_error(Some(TaskError::CancelledDependencies));
                return;
            }
            injection(self, &dependency, &dependency.errors());
        }
    }
}
