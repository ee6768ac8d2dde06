//! Observability Module
//!
//! Counters for the worker pools and the fetch engine, rendered as a status table
//! that the binary logs on an interval.

mod common;
mod pipeline_tracker;

pub use pipeline_tracker::{PipelineStats, PipelineTracker, Pool, PoolStats};
