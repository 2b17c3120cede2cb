pub mod handle;
pub mod injection;
pub mod observer;
pub mod profiler;
pub mod types;
pub mod work;

#[cfg(test)]
mod tests;

pub use handle::*;
pub use injection::*;
pub use observer::*;
pub use profiler::*;
pub use types::*;
pub use work::*;
