//! Guards and tasks built on external capability providers.
//!
//! A capability (a contacts store, a location service, ...) is opaque to the
//! engine. All it needs is to know whether the capability exists, what its
//! authorization status is, and how to ask for authorization.

use crate::error::TaskError;
use crate::guard::builtin::MutuallyExclusive;
use crate::guard::types::{Guard, GuardOutcome};
use crate::sync::lock;
use crate::task::{Task, TaskContext, Work};
use async_trait::async_trait;
use std::fmt;
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Authorization status reported by a capability
pub trait AuthorizationStatus: Clone + fmt::Debug + Send + Sync + 'static {
    type Requirement: Clone + fmt::Debug + Send + Sync + 'static;

    /// Whether this status satisfies `requirement`
    fn meets(&self, requirement: Option<&Self::Requirement>) -> bool;
}

/// Status for capabilities that need no authorization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct VoidStatus;

impl AuthorizationStatus for VoidStatus {
    type Requirement = ();

    fn meets(&self, _requirement: Option<&()>) -> bool {
        true
    }
}

/// Boundary to an external capability provider
#[async_trait]
pub trait Capability: Send + Sync + 'static {
    type Status: AuthorizationStatus;

    fn name(&self) -> &str;

    /// Authorization level a task needs; `None` accepts any status
    fn requirement(&self) -> Option<<Self::Status as AuthorizationStatus>::Requirement> {
        None
    }

    fn is_available(&self) -> bool;

    async fn check_status(&self) -> Self::Status;

    async fn request_authorization(&self);
}

fn authorization_category(name: &str) -> String {
    format!("authorize:{}", name)
}

struct AuthorizeWork<C> {
    capability: Arc<C>,
}

#[async_trait]
impl<C: Capability> Work for AuthorizeWork<C> {
    async fn execute(&self, ctx: TaskContext) {
        if self.capability.is_available() {
            self.capability.request_authorization().await;
        } else {
            debug!(capability = self.capability.name(), "Not available, skipping authorization");
        }
        ctx.finish(Vec::new());
    }
}

/// Task that requests authorization for `capability`.
///
/// Authorization requests for the same capability never overlap.
pub fn authorize_capability<C: Capability>(capability: Arc<C>) -> Task {
    let name = capability.name().to_string();
    let task = Task::new(format!("Authorize {}", name), AuthorizeWork { capability });
    // A fresh task always accepts guards.
    let _ = task.add_guard(MutuallyExclusive::new(authorization_category(&name)));
    task
}

type StatusSlot<S> = Arc<Mutex<Option<(bool, S)>>>;

struct StatusWork<C: Capability> {
    capability: Arc<C>,
    result: StatusSlot<C::Status>,
}

#[async_trait]
impl<C: Capability> Work for StatusWork<C> {
    async fn execute(&self, ctx: TaskContext) {
        let available = self.capability.is_available();
        let status = self.capability.check_status().await;
        *lock(&self.result) = Some((available, status));
        ctx.finish(Vec::new());
    }
}

/// Task reporting whether a capability is available and its current status
pub struct GetAuthorizationStatus<C: Capability> {
    task: Task,
    result: StatusSlot<C::Status>,
}

impl<C: Capability> GetAuthorizationStatus<C> {
    pub fn new(capability: Arc<C>) -> Self {
        let result: StatusSlot<C::Status> = Arc::new(Mutex::new(None));
        let name = format!("Get Authorization Status for {}", capability.name());
        let task = Task::new(
            name,
            StatusWork {
                capability,
                result: Arc::clone(&result),
            },
        );
        Self { task, result }
    }

    pub fn task(&self) -> &Task {
        &self.task
    }

    /// `(available, status)` once the task has run
    pub fn result(&self) -> Option<(bool, C::Status)> {
        lock(&self.result).clone()
    }
}

/// Fails unless the capability is available
pub struct CapabilityAvailable<C> {
    name: String,
    capability: Arc<C>,
}

impl<C: Capability> CapabilityAvailable<C> {
    pub fn new(capability: Arc<C>) -> Self {
        Self {
            name: format!("Capability<{}>", capability.name()),
            capability,
        }
    }
}

#[async_trait]
impl<C: Capability> Guard for CapabilityAvailable<C> {
    fn name(&self) -> &str {
        &self.name
    }

    async fn evaluate(&self, _task: &Task) -> GuardOutcome {
        GuardOutcome::from_bool(self.capability.is_available(), || {
            TaskError::CapabilityUnavailable(self.capability.name().to_string())
        })
    }
}

/// Requests authorization before the owning task runs, then fails unless the
/// resulting status meets the capability's requirement.
pub struct AuthorizedFor<C> {
    name: String,
    category: Option<String>,
    capability: Arc<C>,
}

impl<C: Capability> AuthorizedFor<C> {
    pub fn new(capability: Arc<C>) -> Self {
        Self {
            name: format!("Authorized for {}", capability.name()),
            category: None,
            capability,
        }
    }

    /// Also serialize the owning task against other authorized tasks for
    /// this capability
    pub fn exclusive(mut self) -> Self {
        self.category = Some(format!("authorized:{}", self.capability.name()));
        self
    }
}

#[async_trait]
impl<C: Capability> Guard for AuthorizedFor<C> {
    fn name(&self) -> &str {
        &self.name
    }

    fn category(&self) -> Option<&str> {
        self.category.as_deref()
    }

    fn dependency(&self, _task: &Task) -> Option<Task> {
        Some(authorize_capability(Arc::clone(&self.capability)))
    }

    async fn evaluate(&self, _task: &Task) -> GuardOutcome {
        let name = self.capability.name();
        if !self.capability.is_available() {
            return GuardOutcome::Failed(TaskError::CapabilityUnavailable(name.to_string()));
        }
        let status = self.capability.check_status().await;
        let requirement = self.capability.requirement();
        GuardOutcome::from_bool(status.meets(requirement.as_ref()), || {
            TaskError::CapabilityUnauthorized(name.to_string())
        })
    }
}
