//! Behaviour shared by [`RepeatTask`](super::RepeatTask) and
//! [`RetryTask`](super::RetryTask): a group that pulls its next child from a
//! payload iterator whenever the current child finishes.

use crate::error::{EngineError, Result, TaskError};
use crate::group::{GroupBehavior, GroupHandle};
use crate::repeat::payload::{Configure, Payload};
use crate::sync::lock;
use crate::task::{DelayWork, Task};
use std::fmt;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

/// Context handed to a retry handler after an attempt failed
#[derive(Clone)]
pub struct RetryFailureInfo {
    /// The attempt that failed
    pub task: Task,
    /// Its errors
    pub errors: Vec<TaskError>,
    /// Attempts made so far, including the failed one
    pub count: usize,
    /// The retrying group; extra tasks may be added through it
    pub group: GroupHandle,
}

impl fmt::Debug for RetryFailureInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryFailureInfo")
            .field("task", &self.task)
            .field("errors", &self.errors)
            .field("count", &self.count)
            .finish()
    }
}

/// Decides what to do after a failed attempt. Receives the payload the
/// iterator suggests; returning `None` gives up.
pub type RetryHandler = Arc<dyn Fn(&RetryFailureInfo, Payload) -> Option<Payload> + Send + Sync>;

pub(crate) type PayloadIter = Box<dyn Iterator<Item = Payload> + Send>;

pub(crate) enum Policy {
    /// Run the whole sequence regardless of outcome
    Repeat,
    /// Stop at the first success
    Retry(RetryHandler),
}

struct RepeatState {
    iterator: PayloadIter,
    first: Option<Payload>,
    current: Task,
    count: usize,
    configure: Vec<Configure>,
}

pub(crate) struct RepeatCore {
    name: String,
    max: Option<usize>,
    policy: Policy,
    state: Mutex<RepeatState>,
}

impl RepeatCore {
    pub(crate) fn new(
        name: &str,
        max: Option<usize>,
        mut iterator: PayloadIter,
        policy: Policy,
    ) -> Result<Arc<Self>> {
        let first = iterator.next().ok_or(EngineError::EmptyIterator)?;
        Ok(Arc::new(Self {
            name: name.to_string(),
            max,
            policy,
            state: Mutex::new(RepeatState {
                iterator,
                current: first.task.clone(),
                first: Some(first),
                count: 1,
                configure: Vec::new(),
            }),
        }))
    }

    pub(crate) fn count(&self) -> usize {
        lock(&self.state).count
    }

    pub(crate) fn current(&self) -> Task {
        lock(&self.state).current.clone()
    }

    pub(crate) fn add_configure(&self, configure: Configure) {
        lock(&self.state).configure.push(configure);
    }

    fn is_current(&self, task: &Task) -> bool {
        lock(&self.state).current.id() == task.id()
    }

    fn configure(&self, payload: &Payload) {
        let chain = lock(&self.state).configure.clone();
        for configure in &chain {
            configure(&payload.task);
        }
        if let Some(configure) = &payload.configure {
            configure(&payload.task);
        }
    }

    /// Pull the next payload, let the retry handler adjust it and add it to
    /// the group. Returns whether another attempt was scheduled.
    fn schedule_next(&self, group: &GroupHandle, failure: Option<&RetryFailureInfo>) -> bool {
        if group.task().is_some_and(|task| task.is_cancelled()) {
            return false;
        }

        let suggested = {
            let mut state = lock(&self.state);
            if self.max.is_some_and(|max| state.count >= max) {
                debug!(name = %self.name, count = state.count, "Reached maximum count");
                return false;
            }
            state.iterator.next()
        };
        let Some(suggested) = suggested else {
            return false;
        };

        let payload = match (&self.policy, failure) {
            (Policy::Retry(handler), Some(info)) => match handler(info, suggested) {
                Some(payload) => payload,
                None => {
                    info!(name = %self.name, "Retry handler gave up");
                    return false;
                }
            },
            _ => suggested,
        };

        self.configure(&payload);

        let count = {
            let mut state = lock(&self.state);
            state.count += 1;
            state.current = payload.task.clone();
            state.count
        };
        debug!(name = %self.name, count, "Adding {}", payload.task.name());

        if let Some(delay) = payload.delay {
            let wait = Task::new(format!("Delay before {}", payload.task.name()), DelayWork::new(delay));
            if let Err(e) = payload.task.add_dependency(&wait) {
                warn!(name = %self.name, "Could not delay next attempt: {}", e);
            }
            if let Err(e) = group.add_child(wait) {
                warn!(name = %self.name, "Could not add delay: {}", e);
            }
        }
        if let Err(e) = group.add_child(payload.task) {
            warn!(name = %self.name, "Could not add next attempt: {}", e);
            return false;
        }
        true
    }
}

impl GroupBehavior for RepeatCore {
    fn will_execute(&self, group: &GroupHandle) {
        let Some(first) = lock(&self.state).first.take() else {
            return;
        };
        self.configure(&first);
        if let Err(e) = group.add_child(first.task) {
            warn!(name = %self.name, "Could not add first attempt: {}", e);
        }
    }

    fn child_will_finish(&self, group: &GroupHandle, child: &Task, errors: &[TaskError]) {
        match &self.policy {
            Policy::Repeat => {
                if self.is_current(child) {
                    self.schedule_next(group, None);
                }
                group.aggregate_child_errors(child, errors.to_vec());
            }
            Policy::Retry(_) => {
                // Delays and produced tasks neither trigger a retry nor count
                // towards the result.
                if !self.is_current(child) || errors.is_empty() {
                    return;
                }
                let info = RetryFailureInfo {
                    task: child.clone(),
                    errors: errors.to_vec(),
                    count: self.count(),
                    group: group.clone(),
                };
                let retrying = self.schedule_next(group, Some(&info));
                info!(
                    name = %self.name,
                    attempt = info.count,
                    "{} recovery from {} error(s)",
                    if retrying { "Will attempt" } else { "Will not attempt" },
                    errors.len()
                );
                if !retrying {
                    group.aggregate_child_errors(child, errors.to_vec());
                }
            }
        }
    }
}
