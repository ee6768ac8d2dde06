//! Job Poller
//!
//! Long-running member of a worker pool. Pops one job at a time from its queue,
//! sleeps when the queue is empty, and cools down after every job. A fatal job
//! error stops this member only; the rest of the pool keeps polling.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use super::jobs::{Job, JobContext};

/// Why a poller stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollerExit {
    Shutdown,
    QueueClosed,
    Failed,
}

pub struct JobPoller<J: Job> {
    name: String,
    receiver: Arc<Mutex<mpsc::Receiver<J>>>,
    ctx: JobContext,
    idle_sleep: Duration,
    cooldown: Duration,
}

impl<J: Job> JobPoller<J> {
    pub fn new(
        name: String,
        receiver: Arc<Mutex<mpsc::Receiver<J>>>,
        ctx: JobContext,
        idle_sleep: Duration,
        cooldown: Duration,
    ) -> Self {
        Self {
            name,
            receiver,
            ctx,
            idle_sleep,
            cooldown,
        }
    }

    /// Sleep unless shutdown comes first; returns false on shutdown
    async fn pause(&self, duration: Duration, shutdown: &CancellationToken) -> bool {
        tokio::select! {
            _ = shutdown.cancelled() => false,
            _ = sleep(duration) => true,
        }
    }

    async fn next_job(&self) -> Result<J, mpsc::error::TryRecvError> {
        self.receiver.lock().await.try_recv()
    }

    pub async fn run(self, shutdown: CancellationToken) -> PollerExit {
        let tracker = self.ctx.tracker.clone();
        tracker.worker_started(J::POOL);
        tracing::info!("{} started", self.name);

        let exit = loop {
            if shutdown.is_cancelled() {
                break PollerExit::Shutdown;
            }

            let job = match self.next_job().await {
                Ok(job) => job,
                Err(mpsc::error::TryRecvError::Empty) => {
                    if !self.pause(self.idle_sleep, &shutdown).await {
                        break PollerExit::Shutdown;
                    }
                    continue;
                }
                Err(mpsc::error::TryRecvError::Disconnected) => break PollerExit::QueueClosed,
            };

            let description = job.describe();
            tracing::debug!("{} running {}", self.name, description);
            match job.run(&self.ctx).await {
                Ok(()) => tracker.job_completed(J::POOL),
                Err(e) if e.is_fatal() => {
                    tracker.job_failed(J::POOL);
                    tracing::error!("{} stopping after {} failed: {}", self.name, description, e);
                    break PollerExit::Failed;
                }
                Err(e) => {
                    tracker.job_failed(J::POOL);
                    tracing::warn!("{} job {} failed: {}", self.name, description, e);
                }
            }

            if !self.pause(self.cooldown, &shutdown).await {
                break PollerExit::Shutdown;
            }
        };

        tracker.worker_stopped(J::POOL);
        tracing::info!("{} stopped ({:?})", self.name, exit);
        exit
    }
}
