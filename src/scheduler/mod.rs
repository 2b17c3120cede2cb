pub mod delegate;
mod driver;
pub mod queue;


pub use delegate::*;
pub use queue::*;
