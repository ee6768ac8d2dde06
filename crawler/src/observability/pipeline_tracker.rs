//! Pipeline Tracker
//!
//! Counters shared by the fetch engine and the worker pools. Cloning is cheap and
//! every clone reports into the same counters.

use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use strum::{AsRefStr, EnumIter, IntoEnumIterator};

use super::common::{format_elapsed_secs, format_table_with_title};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, AsRefStr, EnumIter)]
#[strum(serialize_all = "lowercase")]
pub enum Pool {
    Fetch,
    Graph,
    Persistence,
}

impl Pool {
    fn index(self) -> usize {
        self as usize
    }
}

#[derive(Debug, Default)]
struct PoolCounters {
    live_workers: AtomicUsize,
    completed: AtomicU64,
    failed: AtomicU64,
}

#[derive(Debug)]
struct Counters {
    started_at: Instant,
    fetched: AtomicU64,
    requeued: AtomicU64,
    persisted: AtomicU64,
    pools: [PoolCounters; 3],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PoolStats {
    pub live_workers: usize,
    pub completed: u64,
    pub failed: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineStats {
    pub elapsed_secs: u64,
    pub fetched: u64,
    pub requeued: u64,
    pub persisted: u64,
    pub fetch: PoolStats,
    pub graph: PoolStats,
    pub persistence: PoolStats,
}

impl fmt::Display for PipelineStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "fetched={} requeued={} persisted={} elapsed={}",
            self.fetched,
            self.requeued,
            self.persisted,
            format_elapsed_secs(self.elapsed_secs)
        )
    }
}

#[derive(Debug, Clone)]
pub struct PipelineTracker {
    counters: Arc<Counters>,
}

impl Default for PipelineTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineTracker {
    pub fn new() -> Self {
        Self {
            counters: Arc::new(Counters {
                started_at: Instant::now(),
                fetched: AtomicU64::new(0),
                requeued: AtomicU64::new(0),
                persisted: AtomicU64::new(0),
                pools: Default::default(),
            }),
        }
    }

    fn pool(&self, pool: Pool) -> &PoolCounters {
        &self.counters.pools[pool.index()]
    }

    pub fn increment_fetched(&self, count: u64) {
        self.counters.fetched.fetch_add(count, Ordering::Relaxed);
    }

    pub fn increment_requeued(&self, count: u64) {
        self.counters.requeued.fetch_add(count, Ordering::Relaxed);
    }

    pub fn increment_persisted(&self, count: u64) {
        self.counters.persisted.fetch_add(count, Ordering::Relaxed);
    }

    pub fn job_completed(&self, pool: Pool) {
        self.pool(pool).completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn job_failed(&self, pool: Pool) {
        self.pool(pool).failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn worker_started(&self, pool: Pool) {
        self.pool(pool).live_workers.fetch_add(1, Ordering::Relaxed);
    }

    pub fn worker_stopped(&self, pool: Pool) {
        let _ = self.pool(pool).live_workers.fetch_update(
            Ordering::Relaxed,
            Ordering::Relaxed,
            |n| Some(n.saturating_sub(1)),
        );
    }

    pub fn live_workers(&self, pool: Pool) -> usize {
        self.pool(pool).live_workers.load(Ordering::Relaxed)
    }

    fn pool_stats(&self, pool: Pool) -> PoolStats {
        let counters = self.pool(pool);
        PoolStats {
            live_workers: counters.live_workers.load(Ordering::Relaxed),
            completed: counters.completed.load(Ordering::Relaxed),
            failed: counters.failed.load(Ordering::Relaxed),
        }
    }

    pub fn get_stats(&self) -> PipelineStats {
        PipelineStats {
            elapsed_secs: self.counters.started_at.elapsed().as_secs(),
            fetched: self.counters.fetched.load(Ordering::Relaxed),
            requeued: self.counters.requeued.load(Ordering::Relaxed),
            persisted: self.counters.persisted.load(Ordering::Relaxed),
            fetch: self.pool_stats(Pool::Fetch),
            graph: self.pool_stats(Pool::Graph),
            persistence: self.pool_stats(Pool::Persistence),
        }
    }

    /// Per-pool table titled with the running totals
    pub fn get_status_table(&self) -> String {
        let stats = self.get_stats();
        let rows: Vec<Vec<String>> = Pool::iter()
            .map(|pool| {
                let s = self.pool_stats(pool);
                vec![
                    pool.as_ref().to_string(),
                    s.live_workers.to_string(),
                    s.completed.to_string(),
                    s.failed.to_string(),
                ]
            })
            .collect();

        format_table_with_title(
            &format!("Pipeline ({})", stats),
            &["Pool", "Live", "Completed", "Failed"],
            &rows,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_counters() {
        let tracker = PipelineTracker::new();
        let other = tracker.clone();
        other.increment_fetched(10);
        tracker.increment_requeued(2);
        other.job_completed(Pool::Graph);
        tracker.job_failed(Pool::Persistence);

        let stats = tracker.get_stats();
        assert_eq!(stats.fetched, 10);
        assert_eq!(stats.requeued, 2);
        assert_eq!(stats.graph.completed, 1);
        assert_eq!(stats.persistence.failed, 1);
        assert_eq!(stats.fetch, PoolStats::default());
    }

    #[test]
    fn test_live_workers_never_underflow() {
        let tracker = PipelineTracker::new();
        tracker.worker_started(Pool::Fetch);
        tracker.worker_stopped(Pool::Fetch);
        tracker.worker_stopped(Pool::Fetch);
        assert_eq!(tracker.live_workers(Pool::Fetch), 0);
    }

    #[test]
    fn test_status_table_lists_pools() {
        let tracker = PipelineTracker::new();
        tracker.worker_started(Pool::Persistence);
        let table = tracker.get_status_table();
        assert!(table.contains("| fetch "));
        assert!(table.contains("| persistence | 1 "));
    }
}
