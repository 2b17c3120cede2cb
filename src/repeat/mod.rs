pub mod backoff;
pub mod engine;
pub mod payload;
pub mod repeat_task;
pub mod retry;


pub use backoff::*;
pub use engine::{RetryFailureInfo, RetryHandler};
pub use payload::*;
pub use repeat_task::*;
pub use retry::*;
