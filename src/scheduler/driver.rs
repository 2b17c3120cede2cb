//! Per-task driver: waits for dependencies, runs result injections,
//! evaluates guards, acquires an execution slot and runs the work body.

use crate::error::TaskError;
use crate::guard::GuardEvaluator;
use crate::scheduler::Scheduler;
use crate::task::{Task, TaskContext, TaskState};
use futures::FutureExt;
use futures::future::join_all;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use tracing::{error, trace};

pub(crate) async fn drive(scheduler: Scheduler, task: Task) {
    scheduler.resumed().await;

    if !await_dependencies(&task).await {
        task.finish(Vec::new());
        return;
    }

    task.run_injections();
    if task.is_cancelled() {
        task.did_evaluate_guards();
        task.finish(Vec::new());
        return;
    }

    GuardEvaluator::run(&task).await;
    if task.is_cancelled() {
        task.finish(Vec::new());
        return;
    }

    let permit = match scheduler.limiter() {
        Some(limiter) => tokio::select! {
            permit = limiter.acquire_owned() => permit.ok(),
            _ = task.cancelled() => {
                task.finish(Vec::new());
                return;
            }
        },
        None => None,
    };

    if task.is_cancelled() {
        task.finish(Vec::new());
        return;
    }

    if !task.errors().is_empty() {
        if task.begin_execution(false) {
            task.finish(Vec::new());
        }
        return;
    }

    if !task.begin_execution(true) {
        return;
    }

    let ctx = TaskContext::new(task.clone(), scheduler.clone());
    let work = task.work();
    if let Err(panic) = AssertUnwindSafe(work.execute(ctx)).catch_unwind().await {
        let message = panic_message(panic.as_ref());
        error!(task = %task.id(), name = %task.name(), "Work body panicked: {}", message);
        task.finish(vec![TaskError::execution(format!("work body panicked: {}", message))]);
    }

    // The slot stays taken until the body actually finishes, which may be
    // after `execute` returned.
    if let Some(permit) = permit {
        task.wait().await;
        drop(permit);
    }
}

/// Wait until every dependency has settled and move the task to
/// `EvaluatingGuards`. Returns `false` if the task was cancelled first.
async fn await_dependencies(task: &Task) -> bool {
    loop {
        if task.is_cancelled() {
            return false;
        }

        let dependencies = task.all_dependencies();
        let total = dependencies.len();
        let unfinished: Vec<Task> = dependencies
            .into_iter()
            .map(|(dependency, _)| dependency)
            .filter(|dependency| !dependency.is_settled())
            .collect();

        if unfinished.is_empty() {
            if task.try_begin_guard_evaluation(total) {
                return true;
            }
            if task.state() != TaskState::Pending {
                error!(
                    task = %task.id(),
                    "Driver found task in unexpected state {:?}",
                    task.state()
                );
                return false;
            }
            // New dependencies arrived while checking; look again.
            continue;
        }

        trace!(task = %task.id(), "Waiting for {} dependencies", unfinished.len());
        tokio::select! {
            _ = join_all(unfinished.iter().map(|dependency| dependency.wait())) => {}
            _ = task.cancelled() => {}
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
