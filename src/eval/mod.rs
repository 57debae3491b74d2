//! Expression evaluation: node kinds, compiled tasks, and the numeric
//! contract they share.

pub mod numeric;
mod node;
mod task;
mod usage;

pub use node::*;
pub use numeric::is_truthy;
pub use task::EvalTask;
pub use usage::*;
