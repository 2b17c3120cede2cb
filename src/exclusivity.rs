//! Category-based mutual exclusion.
//!
//! Tasks sharing a category are chained into a FIFO: each newly registered
//! task depends on the previous tail of its category. Unrelated categories
//! never block one another.

use crate::error::TaskError;
use crate::sync::lock;
use crate::task::{DependencyKind, Task, TaskObserver, WeakTask};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};
use tracing::{debug, trace};

/// Tracks the most recently registered task of every category
#[derive(Debug, Default)]
pub struct ExclusivityController {
    tails: Mutex<HashMap<String, Task>>,
}

impl ExclusivityController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `task` the tail of `category`.
    ///
    /// Returns the previous tail when `task` was chained behind it. The task
    /// is removed from the category once it finishes, unless a later task has
    /// taken its place. A task that has already started executing is not
    /// registered.
    pub fn register(self: &Arc<Self>, task: &Task, category: &str) -> Option<Task> {
        let deregister = Deregister {
            controller: Arc::downgrade(self),
            category: category.to_string(),
        };
        if let Err(error) = task.add_observer(deregister) {
            debug!(category, task = %task.id(), "Could not register task: {}", error);
            return None;
        }

        let previous = {
            let mut tails = lock(&self.tails);
            tails.insert(category.to_string(), task.clone())
        };

        let predecessor = previous.filter(|prev| prev.id() != task.id() && !prev.is_finished());
        if let Some(prev) = &predecessor {
            debug!(
                category,
                task = %task.id(),
                after = %prev.id(),
                "Chaining behind {}",
                prev.name()
            );
            if let Err(error) = task.add_dependency_of_kind(prev, DependencyKind::Exclusive) {
                debug!(category, task = %task.id(), "Could not chain task: {}", error);
            }
        } else {
            trace!(category, task = %task.id(), "Category was free");
        }

        predecessor
    }

    /// Clear `category` if `task` is still its tail
    pub fn deregister(&self, task: &WeakTask, category: &str) {
        let mut tails = lock(&self.tails);
        if tails
            .get(category)
            .is_some_and(|tail| tail.id() == task.id())
        {
            trace!(category, task = %task.id(), "Category released");
            tails.remove(category);
        }
    }

    /// Current tail of `category`
    pub fn tail(&self, category: &str) -> Option<Task> {
        lock(&self.tails).get(category).cloned()
    }

    /// Categories with a registered tail
    pub fn categories(&self) -> Vec<String> {
        lock(&self.tails).keys().cloned().collect()
    }
}

struct Deregister {
    controller: Weak<ExclusivityController>,
    category: String,
}

impl TaskObserver for Deregister {
    fn did_finish(&self, task: &Task, _errors: &[TaskError]) {
        if let Some(controller) = self.controller.upgrade() {
            controller.deregister(&task.downgrade(), &self.category);
        }
    }
}
