//! Map-element data model.

mod element;
mod set;

pub use element::*;
pub use set::*;
