//! # Tasklane
//!
//! A cooperative task-orchestration engine. Units of asynchronous work
//! ("tasks") are composed with declarative pre-conditions, inter-task
//! dependencies, grouping, category-based mutual exclusion and automatic
//! retry/repeat policies.
//!
//! ## Architecture Overview
//!
//! - **[`task`]**: the task handle, its state machine, work bodies and observers
//! - **[`guard`]**: pre-conditions evaluated once a task's dependencies finish
//! - **[`exclusivity`]**: FIFO serialization of tasks sharing a category
//! - **[`scheduler`]**: the queue that drives tasks through their lifecycle
//! - **[`group`]**: tasks composed of child tasks
//! - **[`repeat`]**: repeat and retry built on groups
//!
//! A task moves through
//! `Initialized -> Pending -> EvaluatingGuards -> Ready -> Executing -> Finishing -> Finished`.
//! Cancellation is cooperative: it stops tasks that have not started and is
//! visible to running work bodies, which decide when to finish.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use tasklane::{NoFailedDependencies, Scheduler, Task, TaskError};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let scheduler = Scheduler::default();
//!
//!     let fetch = Task::from_fn("fetch", |_ctx| async { Ok(()) });
//!     let parse = Task::from_fn("parse", |_ctx| async {
//!         Err(TaskError::execution("malformed input"))
//!     });
//!     parse.add_dependency(&fetch)?;
//!     parse.add_guard(NoFailedDependencies)?;
//!
//!     scheduler.add_all([fetch, parse.clone()])?;
//!     let outcome = parse.wait().await;
//!     println!("parse finished: {:?}", outcome);
//!     Ok(())
//! }
//! ```

/// Error types.
///
/// [`TaskError`] values are data recorded against tasks; [`EngineError`] is
/// returned when the API is used incorrectly.
pub mod error;

/// Engine configuration with TOML persistence.
pub mod config;

/// Tracing subscriber initialisation.
pub mod logging;

/// Task handle, lifecycle state machine, work bodies and observers.
pub mod task;

/// Guards (pre-conditions) and their evaluation.
///
/// Includes composable wrappers and guards built on external capabilities.
pub mod guard;

/// Category-based mutual exclusion.
pub mod exclusivity;

/// The scheduler queue and its delegate protocol.
pub mod scheduler;

/// Tasks composed of child tasks.
pub mod group;

/// Repetition and retry with backoff.
pub mod repeat;

mod sync;

pub use config::{EngineConfig, LoggingConfig, RetryConfig, SchedulerConfig};
pub use error::{EngineError, Result, TaskError};
pub use exclusivity::ExclusivityController;
pub use group::{GroupBehavior, GroupHandle, TaskGroup};
pub use guard::{
    AuthorizedFor, BlockGuard, Capability, CapabilityAvailable, FalseGuard, Guard,
    GuardEvaluator, GuardOutcome, Ignored, MutuallyExclusive, Negated, NoFailedDependencies,
    Silent, TrueGuard,
};
pub use repeat::{Payload, RepeatTask, RetryFailureInfo, RetryTask, WaitStrategy};
pub use scheduler::{Scheduler, SchedulerDelegate};
pub use task::{
    BlockObserver, LoggingObserver, PendingValue, ProfilingObserver, ResultSlot, Task,
    TaskContext, TaskId, TaskObserver, TaskOutcome, TaskState, TimeoutObserver, Work,
};
