use crate::error::TaskError;
use crate::sync::lock;
use crate::task::handle::Task;
use crate::task::observer::TaskObserver;
use crate::task::types::TaskId;
use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};

/// Timing record for a single task
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskProfile {
    pub task_id: TaskId,
    pub name: String,
    pub attached_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub produced: Vec<TaskId>,
    pub error_count: usize,
}

impl TaskProfile {
    fn new(task: &Task) -> Self {
        Self {
            task_id: task.id(),
            name: task.name().to_string(),
            attached_at: Utc::now(),
            started_at: None,
            cancelled_at: None,
            finished_at: None,
            produced: Vec::new(),
            error_count: 0,
        }
    }

    /// Time spent between start and finish, if the body ran
    pub fn execution_time(&self) -> Option<chrono::Duration> {
        Some(self.finished_at? - self.started_at?)
    }

    /// Time between attaching the profiler and the task finishing
    pub fn total_time(&self) -> Option<chrono::Duration> {
        self.finished_at.map(|finished| finished - self.attached_at)
    }
}

/// Observer that records a [`TaskProfile`].
///
/// Clones share the same record, so keep one clone to read the profile after
/// attaching the other to a task.
#[derive(Debug, Clone, Default)]
pub struct ProfilingObserver {
    profile: Arc<Mutex<Option<TaskProfile>>>,
}

impl ProfilingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the record, `None` until attached
    pub fn profile(&self) -> Option<TaskProfile> {
        lock(&self.profile).clone()
    }

    pub fn to_json(&self) -> anyhow::Result<String> {
        let profile = self.profile().context("Profiler was never attached to a task")?;
        serde_json::to_string_pretty(&profile).context("Failed to serialize task profile")
    }

    fn update(&self, f: impl FnOnce(&mut TaskProfile)) {
        if let Some(profile) = lock(&self.profile).as_mut() {
            f(profile);
        }
    }
}

impl TaskObserver for ProfilingObserver {
    fn did_attach(&self, task: &Task) {
        *lock(&self.profile) = Some(TaskProfile::new(task));
    }

    fn did_start(&self, _task: &Task) {
        self.update(|profile| profile.started_at = Some(Utc::now()));
    }

    fn did_cancel(&self, _task: &Task) {
        self.update(|profile| profile.cancelled_at = Some(Utc::now()));
    }

    fn did_produce(&self, _task: &Task, produced: &Task) {
        self.update(|profile| profile.produced.push(produced.id()));
    }

    fn did_finish(&self, _task: &Task, errors: &[TaskError]) {
        self.update(|profile| {
            profile.finished_at = Some(Utc::now());
            profile.error_count = errors.len();
        });
    }
}
