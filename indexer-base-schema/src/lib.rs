//! Basic types for the metrics indexer's schema used across multiple crates.
#![warn(missing_docs)]

pub mod metrics;
pub mod organization;
pub mod project;
