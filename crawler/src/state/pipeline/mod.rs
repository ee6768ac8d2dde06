//! Worker Pipeline
//!
//! Three bounded queues, each served by a fixed pool of pollers:
//!
//! 1. `fetch` - [`FetchJob`]: fetch and parse a chunk of message ids
//! 2. `graph` - [`GraphJob`]: build the interaction graph for a date range
//! 3. `persistence` - [`PersistenceJob`]: insert row batches
//!
//! Fetch and graph jobs feed the persistence queue, which reports their progress once
//! the rows are stored. A failed fetch or graph job is logged and its poller moves on;
//! a failed persistence job stops its poller.
//!
//! ## Usage
//!
//! ```rust,ignore
//! let pipeline = Pipeline::new(store, tracker, cfg.workers.clone(), cfg.mediator.clone());
//! pipeline.start();
//!
//! // To shutdown gracefully
//! pipeline.shutdown();
//! ```

mod jobs;
mod orchestrator;
mod poller;
pub mod queues;

pub use jobs::{DateRange, FetchJob, GraphJob, Job, JobContext, PendingReport, PersistenceJob};
pub use orchestrator::Pipeline;
pub use poller::PollerExit;
