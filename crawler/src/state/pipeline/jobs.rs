//! Pipeline Jobs
//!
//! - [`FetchJob`]: fetch and parse a chunk of ids, queue their rows for persistence
//! - [`GraphJob`]: load participant clusters for a date range, build the graph, queue its rows
//! - [`PersistenceJob`]: insert row batches under a `PERSIST` task
//!
//! A fetch or graph job with a progress handle reports through its persistence job,
//! so the count lands only once the rows are stored. Failures at any stage report
//! zero items along with the error.

use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use uuid::Uuid;

use crate::{
    crawler_config::MediatorSettings,
    error::{AppError, AppResult},
    fetch::{FetchEngine, ProgressSink},
    graph::{build_graph, group_by_message, ClusterMember},
    observability::{PipelineTracker, Pool},
    state::mediator::{ProgressHandle, TaskMediator},
    store::{
        rows::{from_row, graph_batches, record_batches, ClusterMemberRow},
        Query, RowBatch, Store, TaskKind,
    },
};

use super::queues::PipelineQueues;

/// Shared arguments every poller of a pool hands to its jobs
#[derive(Clone)]
pub struct JobContext {
    pub store: Arc<dyn Store>,
    pub queues: Arc<PipelineQueues>,
    pub tracker: PipelineTracker,
    pub mediator: MediatorSettings,
}

#[async_trait]
pub trait Job: Send + 'static {
    const POOL: Pool;

    fn describe(&self) -> String;

    async fn run(self, ctx: &JobContext) -> AppResult<()>;
}

pub struct FetchJob {
    pub engine: FetchEngine,
    pub ids: Vec<String>,
    pub window_size: usize,
    pub max_workers: usize,
    pub owner: Uuid,
    pub progress: Option<ProgressHandle>,
}

#[async_trait]
impl Job for FetchJob {
    const POOL: Pool = Pool::Fetch;

    fn describe(&self) -> String {
        format!(
            "fetch {} ids for {} ({})",
            self.ids.len(),
            self.owner,
            self.engine.instance_id()
        )
    }

    async fn run(self, ctx: &JobContext) -> AppResult<()> {
        let subtask_id = self.engine.instance_id().to_string();
        let result = self.queue_rows(&subtask_id, ctx).await;
        if let (Err(e), Some(progress)) = (&result, &self.progress) {
            report_failure(progress, &subtask_id, e).await;
        }
        result
    }
}

impl FetchJob {
    async fn queue_rows(&self, subtask_id: &str, ctx: &JobContext) -> AppResult<()> {
        let outcome = self
            .engine
            .fetch(&self.ids, self.window_size, self.max_workers)
            .await?;

        if !outcome.unresolved.is_empty() {
            tracing::warn!(
                "[{}] {} ids unresolved after {} rounds",
                subtask_id,
                outcome.unresolved.len(),
                outcome.rounds
            );
        }
        if outcome.records.is_empty() {
            if let Some(progress) = &self.progress {
                progress.report(subtask_id, 0).await;
            }
            return Ok(());
        }

        let batches = record_batches(&outcome.records, self.owner, Utc::now())
            .map_err(AppError::Internal)?;
        ctx.queues
            .persistence
            .submit(PersistenceJob {
                owner: self.owner,
                batches,
                progress: self.progress.clone().map(|handle| PendingReport {
                    handle,
                    subtask_id: subtask_id.to_string(),
                    count: outcome.records.len(),
                }),
            })
            .await
    }
}

/// Count owed to a task once a persistence job stores its rows
#[derive(Debug, Clone)]
pub struct PendingReport {
    pub handle: ProgressHandle,
    pub subtask_id: String,
    pub count: usize,
}

async fn report_failure(progress: &ProgressHandle, subtask_id: &str, error: &AppError) {
    progress.record_error(subtask_id, error).await;
    progress.report(subtask_id, 0).await;
}

/// Inclusive date window of messages considered for a graph build
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl Default for DateRange {
    /// 1900-01-01 up to now
    fn default() -> Self {
        Self {
            start: Utc
                .with_ymd_and_hms(1900, 1, 1, 0, 0, 0)
                .single()
                .unwrap_or(DateTime::<Utc>::MIN_UTC),
            end: Utc::now(),
        }
    }
}

pub struct GraphJob {
    pub owner: Uuid,
    pub range: DateRange,
    pub progress: Option<ProgressHandle>,
}

impl GraphJob {
    fn subtask_id(&self) -> String {
        format!("graph-{}", self.owner)
    }

    async fn build(&self, ctx: &JobContext) -> AppResult<()> {
        let query = Query::ClusterMembers {
            owner: self.owner,
            start: self.range.start,
            end: self.range.end,
        };
        let rows = ctx
            .store
            .fetch_all(&query)
            .await
            .context("Failed to load cluster members")
            .map_err(AppError::Graph)?;
        let members = rows
            .into_iter()
            .map(|row| from_row::<ClusterMemberRow>(row).map(ClusterMember::from))
            .collect::<anyhow::Result<Vec<_>>>()
            .map_err(AppError::Graph)?;

        let clusters = group_by_message(members);
        tracing::info!(
            "Building graph for {} from {} clusters",
            self.owner,
            clusters.len()
        );
        let graph = build_graph(clusters.iter().map(Vec::as_slice), self.owner);
        if graph.nodes.is_empty() {
            if let Some(progress) = &self.progress {
                progress.report(&self.subtask_id(), 0).await;
            }
            return Ok(());
        }

        let batches = graph_batches(&graph, self.owner).map_err(AppError::Graph)?;
        ctx.queues
            .persistence
            .submit(PersistenceJob {
                owner: self.owner,
                batches,
                progress: self.progress.clone().map(|handle| PendingReport {
                    handle,
                    subtask_id: self.subtask_id(),
                    count: graph.edges.len(),
                }),
            })
            .await
    }
}

#[async_trait]
impl Job for GraphJob {
    const POOL: Pool = Pool::Graph;

    fn describe(&self) -> String {
        format!(
            "graph for {} ({} .. {})",
            self.owner, self.range.start, self.range.end
        )
    }

    async fn run(self, ctx: &JobContext) -> AppResult<()> {
        let result = self.build(ctx).await;
        if let (Err(e), Some(progress)) = (&result, &self.progress) {
            report_failure(progress, &self.subtask_id(), e).await;
        }
        result
    }
}

pub struct PersistenceJob {
    pub owner: Uuid,
    pub batches: Vec<RowBatch>,
    pub progress: Option<PendingReport>,
}

#[async_trait]
impl Job for PersistenceJob {
    const POOL: Pool = Pool::Persistence;

    fn describe(&self) -> String {
        let tables: Vec<String> = self
            .batches
            .iter()
            .map(|b| format!("{}:{}", b.table, b.len()))
            .collect();
        format!("persist [{}] for {}", tables.join(", "), self.owner)
    }

    async fn run(self, ctx: &JobContext) -> AppResult<()> {
        let PersistenceJob {
            owner,
            batches,
            progress,
        } = self;
        let result = persist(owner, batches, ctx).await;
        if let Some(pending) = progress {
            match &result {
                Ok(()) => pending.handle.report(&pending.subtask_id, pending.count).await,
                Err(e) => report_failure(&pending.handle, &pending.subtask_id, e).await,
            }
        }
        result
    }
}

async fn persist(owner: Uuid, batches: Vec<RowBatch>, ctx: &JobContext) -> AppResult<()> {
    let mediator = TaskMediator::start(
        ctx.store.clone(),
        owner,
        TaskKind::Persist,
        ctx.mediator.clone(),
    )
    .await
    .map_err(AppError::Persistence)?;

    for batch in batches {
        if batch.is_empty() {
            continue;
        }
        let table = batch.table;
        match ctx.store.insert_rows(table, batch.rows).await {
            Ok(inserted) => {
                tracing::debug!("Inserted {} rows into {}", inserted, table);
                ctx.tracker.increment_persisted(inserted);
            }
            Err(e) => {
                let e = e.context(format!("Failed to insert into {}", table));
                mediator.record_error(format!("{:#}", e)).await;
                if let Err(finalize_err) = mediator.finalize().await {
                    tracing::error!("{:?}", finalize_err);
                }
                return Err(AppError::Persistence(e));
            }
        }
    }

    mediator.finalize().await.map_err(AppError::Persistence)?;
    Ok(())
}
