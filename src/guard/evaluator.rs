use crate::error::TaskError;
use crate::guard::types::{Guard, GuardOutcome};
use crate::task::Task;
use futures::future::join_all;
use std::sync::Arc;
use tracing::{debug, warn};

/// Reduced result of running every guard of a task
#[derive(Debug, Clone, Default)]
pub struct GuardEvaluation {
    /// Failures in guard-declaration order
    pub errors: Vec<TaskError>,
    /// At least one suppressed guard failed
    pub ignored: bool,
}

impl GuardEvaluation {
    /// Every guard reported `Satisfied`
    pub fn is_satisfied(&self) -> bool {
        self.errors.is_empty() && !self.ignored
    }
}

/// Runs a task's guards and folds their outcomes
pub struct GuardEvaluator;

impl GuardEvaluator {
    /// Evaluate `guards` concurrently against `task`
    pub async fn evaluate(task: &Task, guards: &[Arc<dyn Guard>]) -> GuardEvaluation {
        let outcomes = join_all(guards.iter().map(|guard| guard.evaluate(task))).await;

        let mut evaluation = GuardEvaluation::default();
        for (guard, outcome) in guards.iter().zip(outcomes) {
            match outcome {
                GuardOutcome::Satisfied => {}
                GuardOutcome::Ignored => {
                    debug!(task = %task.id(), guard = guard.name(), "Guard failed silently");
                    evaluation.ignored = true;
                }
                GuardOutcome::Failed(error) => {
                    debug!(task = %task.id(), guard = guard.name(), "Guard failed: {}", error);
                    evaluation.errors.push(error);
                }
            }
        }
        evaluation
    }

    /// Evaluate the task's own guards, apply the result and move it to
    /// `Ready`. Failures cancel the task with their errors; a suppressed
    /// failure cancels it without any.
    pub(crate) async fn run(task: &Task) {
        let guards = task.guards();
        if !guards.is_empty() {
            let evaluation = Self::evaluate(task, &guards).await;
            if !evaluation.errors.is_empty() {
                warn!(
                    task = %task.id(),
                    name = %task.name(),
                    "{} guard(s) failed",
                    evaluation.errors.len()
                );
                task.cancel_with_errors(evaluation.errors);
            } else if evaluation.ignored {
                task.cancel();
            }
        }
        task.did_evaluate_guards();
    }
}
