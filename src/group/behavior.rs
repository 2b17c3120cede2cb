use crate::error::TaskError;
use crate::group::handle::GroupHandle;
use crate::task::Task;

/// Hooks that specialise a group.
///
/// Both hooks run synchronously on the path of the triggering event. A child
/// added from `child_will_finish` is guaranteed to be waited for by the group.
#[allow(unused_variables)]
pub trait GroupBehavior: Send + Sync + 'static {
    /// The group is about to submit its initial children
    fn will_execute(&self, group: &GroupHandle) {}

    /// A child other than the sentinel is finishing with `errors`.
    ///
    /// The default merges the child's errors into the group aggregate.
    fn child_will_finish(&self, group: &GroupHandle, child: &Task, errors: &[TaskError]) {
        group.aggregate_child_errors(child, errors.to_vec());
    }
}

/// Aggregates every child's errors and does nothing else
#[derive(Debug, Default, Clone, Copy)]
pub struct AggregateErrors;

impl GroupBehavior for AggregateErrors {}
