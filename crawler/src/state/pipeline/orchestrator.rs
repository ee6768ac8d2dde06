//! Pipeline Orchestrator
//!
//! Spawns the fetch, graph and persistence pools and exposes the submission surface.

use std::sync::{Arc, Mutex, PoisonError};

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::{
    crawler_config::{MediatorSettings, WorkerSettings},
    error::AppResult,
    observability::{PipelineStats, PipelineTracker},
    store::Store,
};

use super::{
    jobs::{FetchJob, GraphJob, Job, JobContext, PersistenceJob},
    poller::{JobPoller, PollerExit},
    queues::{JobQueue, PipelineQueues},
};

pub struct Pipeline {
    ctx: JobContext,
    settings: WorkerSettings,
    shutdown: CancellationToken,
    handles: Mutex<Vec<JoinHandle<PollerExit>>>,
}

impl Pipeline {
    pub fn new(
        store: Arc<dyn Store>,
        tracker: PipelineTracker,
        settings: WorkerSettings,
        mediator: MediatorSettings,
    ) -> Self {
        let queues = Arc::new(PipelineQueues::new(settings.queue_capacity));
        Self {
            ctx: JobContext {
                store,
                queues,
                tracker,
                mediator,
            },
            settings,
            shutdown: CancellationToken::new(),
            handles: Mutex::new(Vec::new()),
        }
    }

    fn spawn_pool<J: Job>(&self, queue: &JobQueue<J>, size: usize) {
        let mut handles = self.handles.lock().unwrap_or_else(PoisonError::into_inner);
        for i in 0..size {
            let poller = JobPoller::new(
                format!("{}-poller-{}", queue.name(), i),
                queue.receiver(),
                self.ctx.clone(),
                self.settings.idle_sleep(),
                self.settings.cooldown(),
            );
            let shutdown = self.shutdown.clone();
            handles.push(tokio::spawn(poller.run(shutdown)));
        }
    }

    /// Spawn every pool and return immediately
    pub fn start(&self) {
        let queues = self.ctx.queues.clone();
        self.spawn_pool(&queues.fetch, self.settings.fetch_workers);
        self.spawn_pool(&queues.graph, self.settings.graph_workers);
        self.spawn_pool(&queues.persistence, self.settings.persistence_workers);
        tracing::info!(
            "Pipeline started: {} fetch, {} graph, {} persistence pollers",
            self.settings.fetch_workers,
            self.settings.graph_workers,
            self.settings.persistence_workers
        );
    }

    /// Signal every poller to stop after its current job
    pub fn shutdown(&self) {
        tracing::info!("Shutting down pipeline...");
        self.shutdown.cancel();
    }

    /// Wait for every spawned poller to exit
    pub async fn join(&self) -> Vec<PollerExit> {
        let handles = std::mem::take(
            &mut *self.handles.lock().unwrap_or_else(PoisonError::into_inner),
        );
        let mut exits = Vec::with_capacity(handles.len());
        for handle in handles {
            match handle.await {
                Ok(exit) => exits.push(exit),
                Err(e) => tracing::error!("Poller task panicked: {:?}", e),
            }
        }
        exits
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub async fn submit_fetch_job(&self, job: FetchJob) -> AppResult<()> {
        self.ctx.queues.fetch.submit(job).await
    }

    pub async fn submit_graph_job(&self, job: GraphJob) -> AppResult<()> {
        self.ctx.queues.graph.submit(job).await
    }

    pub async fn submit_persistence_job(&self, job: PersistenceJob) -> AppResult<()> {
        self.ctx.queues.persistence.submit(job).await
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.ctx.store
    }

    pub fn mediator_settings(&self) -> &MediatorSettings {
        &self.ctx.mediator
    }

    pub fn tracker(&self) -> &PipelineTracker {
        &self.ctx.tracker
    }

    pub fn get_stats(&self) -> PipelineStats {
        self.ctx.tracker.get_stats()
    }

    pub fn get_status_table(&self) -> String {
        self.ctx.tracker.get_status_table()
    }
}
