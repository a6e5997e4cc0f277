//! Core data model shared by planner, adapters and storage.

mod record;
mod task;
mod window;

pub use record::*;
pub use task::*;
pub use window::*;
