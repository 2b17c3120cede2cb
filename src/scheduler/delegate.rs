use crate::error::TaskError;
use crate::scheduler::Scheduler;
use crate::task::Task;

/// Receives lifecycle notifications for every task on a scheduler.
///
/// Called synchronously and without any scheduler lock held.
#[allow(unused_variables)]
pub trait SchedulerDelegate: Send + Sync + 'static {
    /// `task` is about to be driven by `scheduler`
    fn will_add(&self, scheduler: &Scheduler, task: &Task) {}

    /// `producer` emitted `produced`; it is added right after this returns
    fn will_produce(&self, scheduler: &Scheduler, producer: &Task, produced: &Task) {}

    fn will_finish(&self, scheduler: &Scheduler, task: &Task, errors: &[TaskError]) {}

    fn did_finish(&self, scheduler: &Scheduler, task: &Task, errors: &[TaskError]) {}
}
