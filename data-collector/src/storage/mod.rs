//! Storage layer for metric observations
//!
//! `MetricStore` is the seam between the engine and persistence; the
//! Postgres repository is the production implementation and the in-memory
//! store mirrors its natural-key semantics for tests.

mod memory;
mod migrations;
mod repository;
mod traits;

pub use memory::*;
pub use migrations::*;
pub use repository::*;
pub use traits::*;
