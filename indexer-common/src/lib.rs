//! Common functionality for the metrics indexer.
#![warn(missing_docs)]

#[macro_use]
mod macros;

pub mod time;

pub use crate::time::*;
