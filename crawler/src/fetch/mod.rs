//! Batch Fetch Engine
//!
//! Turns a list of message ids into parsed records.
//!
//! ## Rounds
//!
//! 1. Partition the pending ids into windows of `window_size`
//! 2. Run one batch call per window, at most `max_workers` at a time
//! 3. Failed ids become the next round's pending list
//!
//! Rounds run strictly one after another. The run stops when the failed ids fit in
//! one window or the optional round cap is reached, so a few ids may stay unresolved.
//!
//! Each window call sleeps `jitter + round * throttle_coefficient` seconds first.

mod discovery;
mod engine;
mod windows;

pub use discovery::discover_ids;
pub use engine::{FetchEngine, FetchOutcome, ProgressSink};
pub use windows::partition;
