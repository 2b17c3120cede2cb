pub mod behavior;
pub mod handle;
pub mod task_group;

#[cfg(test)]
mod tests;

pub use behavior::*;
pub use handle::GroupHandle;
pub use task_group::*;
