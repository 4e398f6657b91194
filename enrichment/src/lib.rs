//! Lakewatch enrichment: stateless transformations that reconcile schemas across
//! monitoring sources and backfill slowly-changing values with as-of semantics.
//!
//! Every operation takes datafusion `DataFrame` values and returns new ones; nothing is
//! executed until the caller collects or writes the resulting plan.

// crate-specific lint exceptions:
#![allow(clippy::missing_errors_doc)]

/// Forward fill of slowly-changing columns from lookup sources
pub mod as_of;
/// Access to a RecordBatch's columns and column handles bound to a schema
pub mod dfext;
/// Error taxonomy
pub mod error;
/// Resource metrics derived from cluster state-change events
pub mod node_metrics;
/// Union, pruning and reordering of dataset columns
pub mod schema_tools;
/// Conversion between epoch values, text timestamps and typed time values
pub mod time;

pub use error::{Error, Result};
