pub mod builtin;
pub mod capability;
pub mod composed;
pub mod evaluator;
pub mod types;


pub use builtin::*;
pub use capability::*;
pub use composed::*;
pub use evaluator::*;
pub use types::*;
