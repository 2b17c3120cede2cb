use crate::error::{EngineError, Result, TaskError};
use crate::guard::Guard;
use crate::sync::lock;
use crate::task::injection::Injection;
use crate::task::observer::TaskObserver;
use crate::task::types::*;
use crate::task::work::{Delay, DelayWork, FnWork, NoOpWork, TaskContext, Work};
use chrono::{DateTime, Utc};
use std::fmt;
use std::future::Future;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, trace, warn};
use uuid::Uuid;

/// Handle to a schedulable unit of work.
///
/// `Task` is a cheap, clonable handle; every clone refers to the same state
/// machine, error list, guard list, observer list and dependency set. All
/// mutable state sits behind a single per-task lock which is never held
/// while observers, guards or the work body run.
#[derive(Clone)]
pub struct Task {
    shared: Arc<TaskShared>,
}

/// Non-owning reference to a [`Task`].
#[derive(Clone)]
pub struct WeakTask {
    id: TaskId,
    shared: Weak<TaskShared>,
}

struct TaskShared {
    id: TaskId,
    name: String,
    work: Arc<dyn Work>,
    inner: Mutex<TaskInner>,
    // Published after observers have run, so waiters never overtake them.
    state_tx: watch::Sender<TaskState>,
    cancel_tx: watch::Sender<bool>,
}

struct TaskInner {
    state: TaskState,
    cancelled: bool,
    finish_called: bool,
    errors: Vec<TaskError>,
    guards: Vec<Arc<dyn Guard>>,
    observers: Vec<Arc<dyn TaskObserver>>,
    dependencies: Vec<(Task, DependencyKind)>,
    injections: Vec<(Task, Injection)>,
}

impl Task {
    /// Create a new task running the given work body
    pub fn new(name: impl Into<String>, work: impl Work) -> Self {
        Self::with_work(name, Arc::new(work))
    }

    pub(crate) fn with_work(name: impl Into<String>, work: Arc<dyn Work>) -> Self {
        let (state_tx, _) = watch::channel(TaskState::Initialized);
        let (cancel_tx, _) = watch::channel(false);
        Self {
            shared: Arc::new(TaskShared {
                id: Uuid::new_v4(),
                name: name.into(),
                work,
                inner: Mutex::new(TaskInner {
                    state: TaskState::Initialized,
                    cancelled: false,
                    finish_called: false,
                    errors: Vec::new(),
                    guards: Vec::new(),
                    observers: Vec::new(),
                    dependencies: Vec::new(),
                    injections: Vec::new(),
                }),
                state_tx,
                cancel_tx,
            }),
        }
    }

    /// Create a task from an async closure.
    ///
    /// The task finishes with the closure's error, if any, as soon as the
    /// returned future completes.
    pub fn from_fn<F, Fut>(name: impl Into<String>, body: F) -> Self
    where
        F: Fn(TaskContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<(), TaskError>> + Send + 'static,
    {
        Self::new(name, FnWork::new(body))
    }

    /// Create a task which does nothing but finish
    pub fn noop(name: impl Into<String>) -> Self {
        Self::new(name, NoOpWork)
    }

    /// Create a task which finishes after `duration`
    pub fn delay(duration: Duration) -> Self {
        Self::new(
            format!("Delay for {:?}", duration),
            DelayWork::new(Delay::By(duration)),
        )
    }

    /// Create a task which finishes once `at` has passed
    pub fn delay_until(at: DateTime<Utc>) -> Self {
        Self::new(
            format!("Delay until {}", at.to_rfc3339()),
            DelayWork::new(Delay::Until(at)),
        )
    }

    pub fn id(&self) -> TaskId {
        self.shared.id
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    pub fn downgrade(&self) -> WeakTask {
        WeakTask {
            id: self.shared.id,
            shared: Arc::downgrade(&self.shared),
        }
    }

    pub(crate) fn work(&self) -> Arc<dyn Work> {
        Arc::clone(&self.shared.work)
    }

    // ------------------------------------------------------------------
    // Derived state
    // ------------------------------------------------------------------

    /// Current lifecycle state
    pub fn state(&self) -> TaskState {
        lock(&self.shared.inner).state
    }

    pub fn is_cancelled(&self) -> bool {
        lock(&self.shared.inner).cancelled
    }

    pub fn is_executing(&self) -> bool {
        self.state() == TaskState::Executing
    }

    pub fn is_finished(&self) -> bool {
        self.state() == TaskState::Finished
    }

    /// Whether the task may proceed past its current gate.
    ///
    /// Before guards resolve only a cancelled task is ready; once `Ready`
    /// the task stays ready.
    pub fn is_ready(&self) -> bool {
        let inner = lock(&self.shared.inner);
        match inner.state {
            TaskState::Initialized | TaskState::Pending | TaskState::EvaluatingGuards => {
                inner.cancelled
            }
            TaskState::Ready => true,
            _ => false,
        }
    }

    /// Errors accumulated so far
    pub fn errors(&self) -> Vec<TaskError> {
        lock(&self.shared.inner).errors.clone()
    }

    /// A task has failed when it carries errors and was not cancelled
    pub fn has_failed(&self) -> bool {
        let inner = lock(&self.shared.inner);
        !inner.cancelled && !inner.errors.is_empty()
    }

    /// Terminal outcome, once the task has finished
    pub fn outcome(&self) -> Option<TaskOutcome> {
        let inner = lock(&self.shared.inner);
        (inner.state == TaskState::Finished)
            .then(|| TaskOutcome::from_parts(inner.cancelled, inner.errors.clone()))
    }

    fn settled_outcome(&self) -> TaskOutcome {
        let inner = lock(&self.shared.inner);
        TaskOutcome::from_parts(inner.cancelled, inner.errors.clone())
    }

    /// Whether `Finished` has been published to waiters.
    ///
    /// This lags `is_finished` by the duration of the did-finish observers.
    pub(crate) fn is_settled(&self) -> bool {
        *self.shared.state_tx.borrow() == TaskState::Finished
    }

    /// Subscribe to published state changes
    pub fn subscribe(&self) -> watch::Receiver<TaskState> {
        self.shared.state_tx.subscribe()
    }

    /// Wait until the task has finished and return its outcome
    pub async fn wait(&self) -> TaskOutcome {
        let mut rx = self.shared.state_tx.subscribe();
        let _ = rx.wait_for(|state| *state == TaskState::Finished).await;
        self.settled_outcome()
    }

    /// Resolves once the task has been cancelled
    pub async fn cancelled(&self) {
        let mut rx = self.shared.cancel_tx.subscribe();
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }

    // ------------------------------------------------------------------
    // Dependencies, guards and observers
    // ------------------------------------------------------------------

    fn ensure_mutable(&self, inner: &TaskInner) -> Result<()> {
        if inner.state.has_started() {
            return Err(EngineError::Immutable {
                task: self.shared.id,
                state: inner.state,
            });
        }
        Ok(())
    }

    /// Make this task wait for `dependency` to finish
    pub fn add_dependency(&self, dependency: &Task) -> Result<()> {
        self.add_dependency_of_kind(dependency, DependencyKind::Direct)
    }

    pub fn add_dependencies<'a>(
        &self,
        dependencies: impl IntoIterator<Item = &'a Task>,
    ) -> Result<()> {
        for dependency in dependencies {
            self.add_dependency(dependency)?;
        }
        Ok(())
    }

    pub(crate) fn add_dependency_of_kind(
        &self,
        dependency: &Task,
        kind: DependencyKind,
    ) -> Result<()> {
        if dependency.id() == self.id() {
            warn!(task = %self.id(), "Ignoring attempt to depend on itself");
            return Ok(());
        }
        let mut inner = lock(&self.shared.inner);
        self.ensure_mutable(&inner)?;
        if inner
            .dependencies
            .iter()
            .any(|(existing, _)| existing.id() == dependency.id())
        {
            return Ok(());
        }
        trace!(task = %self.id(), dependency = %dependency.id(), ?kind, "Added dependency");
        inner.dependencies.push((dependency.clone(), kind));
        Ok(())
    }

    /// Dependencies added explicitly by the caller
    pub fn dependencies(&self) -> Vec<Task> {
        lock(&self.shared.inner)
            .dependencies
            .iter()
            .filter(|(_, kind)| *kind == DependencyKind::Direct)
            .map(|(task, _)| task.clone())
            .collect()
    }

    /// Every dependency gating this task, including guard prerequisites
    /// and mutual-exclusion predecessors
    pub fn all_dependencies(&self) -> Vec<(Task, DependencyKind)> {
        lock(&self.shared.inner).dependencies.clone()
    }

    /// Record `injection` to run once `dependency` has finished.
    ///
    /// The dependency is added alongside. Injections are only accepted
    /// until the task starts evaluating its guards.
    pub(crate) fn add_injection(&self, dependency: &Task, injection: Injection) -> Result<()> {
        if dependency.id() == self.id() {
            warn!(task = %self.id(), "Ignoring attempt to inject from itself");
            return Ok(());
        }
        let mut inner = lock(&self.shared.inner);
        if inner.state > TaskState::Pending {
            return Err(EngineError::Immutable {
                task: self.shared.id,
                state: inner.state,
            });
        }
        if !inner
            .dependencies
            .iter()
            .any(|(existing, _)| existing.id() == dependency.id())
        {
            inner
                .dependencies
                .push((dependency.clone(), DependencyKind::Direct));
        }
        trace!(task = %self.id(), dependency = %dependency.id(), "Added injection");
        inner.injections.push((dependency.clone(), injection));
        Ok(())
    }

    pub(crate) fn injections(&self) -> Vec<(Task, Injection)> {
        lock(&self.shared.inner).injections.clone()
    }

    /// Attach a guard; it is evaluated once all dependencies have finished
    pub fn add_guard(&self, guard: impl Guard) -> Result<()> {
        self.add_guard_arc(Arc::new(guard))
    }

    pub fn add_guard_arc(&self, guard: Arc<dyn Guard>) -> Result<()> {
        let mut inner = lock(&self.shared.inner);
        self.ensure_mutable(&inner)?;
        inner.guards.push(guard);
        Ok(())
    }

    pub fn guards(&self) -> Vec<Arc<dyn Guard>> {
        lock(&self.shared.inner).guards.clone()
    }

    /// Attach a lifecycle observer
    pub fn add_observer(&self, observer: impl TaskObserver) -> Result<()> {
        self.add_observer_arc(Arc::new(observer))
    }

    pub fn add_observer_arc(&self, observer: Arc<dyn TaskObserver>) -> Result<()> {
        {
            let mut inner = lock(&self.shared.inner);
            self.ensure_mutable(&inner)?;
            inner.observers.push(Arc::clone(&observer));
        }
        observer.did_attach(self);
        Ok(())
    }

    fn observers(&self) -> Vec<Arc<dyn TaskObserver>> {
        lock(&self.shared.inner).observers.clone()
    }

    // ------------------------------------------------------------------
    // State machine
    // ------------------------------------------------------------------

    fn try_transition(&self, next: TaskState) -> std::result::Result<TaskState, TaskState> {
        let from = {
            let mut inner = lock(&self.shared.inner);
            let from = inner.state;
            if !from.can_transition_to(next, inner.cancelled) {
                return Err(from);
            }
            inner.state = next;
            from
        };
        trace!(task = %self.id(), name = %self.name(), "{:?} -> {:?}", from, next);
        self.shared.state_tx.send_replace(next);
        Ok(from)
    }

    fn transition(&self, next: TaskState) -> bool {
        match self.try_transition(next) {
            Ok(_) => true,
            Err(from) => {
                error!(
                    task = %self.id(),
                    name = %self.name(),
                    "Illegal state transition {:?} -> {:?}",
                    from,
                    next
                );
                false
            }
        }
    }

    /// Move `Initialized -> Pending` on submission to a scheduler
    pub(crate) fn will_enqueue(&self) -> Result<()> {
        self.try_transition(TaskState::Pending)
            .map(|_| ())
            .map_err(|_| EngineError::AlreadyEnqueued(self.id()))
    }

    /// Move `Pending -> EvaluatingGuards` if the dependency set still has the
    /// size the caller observed fully finished. Dependencies only grow, so an
    /// unchanged count means an unchanged set.
    pub(crate) fn try_begin_guard_evaluation(&self, finished_dependencies: usize) -> bool {
        {
            let mut inner = lock(&self.shared.inner);
            if inner.state != TaskState::Pending
                || inner.dependencies.len() != finished_dependencies
            {
                return false;
            }
            inner.state = TaskState::EvaluatingGuards;
        }
        trace!(task = %self.id(), name = %self.name(), "Pending -> EvaluatingGuards");
        self.shared.state_tx.send_replace(TaskState::EvaluatingGuards);
        true
    }

    pub(crate) fn did_evaluate_guards(&self) -> bool {
        self.transition(TaskState::Ready)
    }

    /// Move `Ready -> Executing` and notify did-start observers
    pub(crate) fn begin_execution(&self, notify: bool) -> bool {
        if !self.transition(TaskState::Executing) {
            return false;
        }
        if notify {
            debug!(task = %self.id(), name = %self.name(), "Will execute");
            for observer in self.observers() {
                observer.did_start(self);
            }
        }
        true
    }

    /// Emit a new task while this one is running.
    ///
    /// Observers, including the owning scheduler, are told synchronously; the
    /// scheduler submits the produced task to itself.
    pub fn produce(&self, task: Task) -> Result<()> {
        match self.state() {
            TaskState::Initialized => return Err(EngineError::NotEnqueued(self.id())),
            state @ TaskState::Finished => {
                return Err(EngineError::Immutable {
                    task: self.id(),
                    state,
                });
            }
            _ => {}
        }
        debug!(task = %self.id(), produced = %task.id(), "Did produce {}", task.name());
        for observer in self.observers() {
            observer.did_produce(self, &task);
        }
        Ok(())
    }

    /// Cancel without recording an error
    pub fn cancel(&self) {
        self.cancel_with_errors(Vec::new());
    }

    pub fn cancel_with_error(&self, error: Option<TaskError>) {
        self.cancel_with_errors(error.into_iter().collect());
    }

    /// Record `errors` and set the cancelled flag.
    ///
    /// Cancellation is cooperative: a task that has not started will skip its
    /// work body, a running one keeps running until it finishes itself.
    pub fn cancel_with_errors(&self, errors: Vec<TaskError>) {
        let first = {
            let mut inner = lock(&self.shared.inner);
            if inner.finish_called {
                return;
            }
            if !errors.is_empty() {
                warn!(task = %self.id(), name = %self.name(), "Did cancel with errors: {:?}", errors);
                inner.errors.extend(errors);
            }
            let first = !inner.cancelled;
            inner.cancelled = true;
            first
        };
        if !first {
            return;
        }
        debug!(task = %self.id(), name = %self.name(), "Did cancel");
        self.shared.work.on_cancel(self);
        self.shared.cancel_tx.send_replace(true);
        for observer in self.observers() {
            observer.did_cancel(self);
        }
    }

    /// Finish the task, merging `errors` into those already recorded.
    ///
    /// Only the first call has any effect.
    pub fn finish(&self, errors: Vec<TaskError>) {
        let (final_errors, observers) = {
            let mut inner = lock(&self.shared.inner);
            if inner.finish_called {
                trace!(task = %self.shared.id, "Ignoring repeated finish");
                return;
            }
            if !inner
                .state
                .can_transition_to(TaskState::Finishing, inner.cancelled)
            {
                error!(
                    task = %self.shared.id,
                    name = %self.shared.name,
                    "Cannot finish from state {:?}",
                    inner.state
                );
                return;
            }
            inner.finish_called = true;
            inner.state = TaskState::Finishing;
            inner.errors.extend(errors);
            (inner.errors.clone(), inner.observers.clone())
        };
        self.shared.state_tx.send_replace(TaskState::Finishing);

        if final_errors.is_empty() {
            debug!(task = %self.id(), name = %self.name(), "Will finish with no errors");
        } else {
            warn!(
                task = %self.id(),
                name = %self.name(),
                "Will finish with {} errors",
                final_errors.len()
            );
        }

        for observer in &observers {
            observer.will_finish(self, &final_errors);
        }

        lock(&self.shared.inner).state = TaskState::Finished;

        for observer in &observers {
            observer.did_finish(self, &final_errors);
        }
        self.shared.state_tx.send_replace(TaskState::Finished);
    }

    /// Convenience for finishing with at most one error
    pub fn finish_with_error(&self, error: Option<TaskError>) {
        self.finish(error.into_iter().collect());
    }
}

impl PartialEq for Task {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

impl Eq for Task {}

impl Hash for Task {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id().hash(state);
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id())
            .field("name", &self.name())
            .field("state", &self.state())
            .finish()
    }
}

impl WeakTask {
    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn upgrade(&self) -> Option<Task> {
        self.shared.upgrade().map(|shared| Task { shared })
    }
}

impl fmt::Debug for WeakTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("WeakTask").field(&self.id).finish()
    }
}
