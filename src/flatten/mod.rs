//! Document flattening
//!
//! Turns each extracted Form 990 document into one [`FlatRecord`] (leaf
//! values keyed by dot-joined element path) and then into one CSV row via
//! the fixed column schema in [`columns`]. [`FlattenEngine`] runs this over
//! whole directories with a bounded worker pool.

pub mod columns;
mod engine;
mod record;

pub use columns::{HEADER, build_row};
pub use engine::FlattenEngine;
pub use record::{FlatRecord, PATH_SEPARATOR, flatten_document, flatten_reader};
