use anyhow::Context;
use uuid::Uuid;

use crate::{
    crawler_config::{DiscoverySettings, FinalWindow},
    error::{AppError, AppResult},
    fetch::{discover_ids, partition, FetchEngine},
    state::{
        mediator::TaskMediator,
        pipeline::{FetchJob, Pipeline},
    },
    store::{
        rows::{from_row, MessageRow},
        Query, Store, TaskKind, TaskRecord,
    },
};

/// Most recently fetched message id stored for `owner`
pub async fn latest_message_id(store: &dyn Store, owner: Uuid) -> anyhow::Result<Option<String>> {
    let row = store
        .fetch_one(&Query::LatestMessageForOwner { owner })
        .await
        .context("Failed to look up latest message")?;
    Ok(row
        .map(from_row::<MessageRow>)
        .transpose()?
        .map(|m| m.message_id))
}

#[derive(Debug, Clone)]
pub struct FetchTask {
    pub owner: Uuid,
    pub window_size: usize,
    pub max_workers: usize,
    /// Wait for every chunk and finalize the task before returning
    pub track: bool,
}

#[derive(Debug, Clone)]
pub struct FetchTaskSummary {
    pub task_id: Uuid,
    pub discovered: usize,
    pub chunks: usize,
    /// Records reported by the chunks, when tracked
    pub fetched: usize,
    pub record: Option<TaskRecord>,
}

/// Discover new message ids for the owner and queue one fetch job per chunk.
///
/// The task record is finalized on every path once started; an error before all
/// chunks are queued is recorded on the task and then returned.
pub async fn run_fetch_task(
    pipeline: &Pipeline,
    engine: &FetchEngine,
    discovery: &DiscoverySettings,
    task: FetchTask,
) -> AppResult<FetchTaskSummary> {
    let mediator = TaskMediator::start(
        pipeline.store().clone(),
        task.owner,
        TaskKind::Fetch,
        pipeline.mediator_settings().clone(),
    )
    .await
    .map_err(AppError::Persistence)?;

    let (discovered, chunks) =
        match queue_chunks(pipeline, engine, discovery, &task, &mediator).await {
            Ok(queued) => queued,
            Err(e) => {
                mediator.record_error(&e).await;
                if let Err(finalize_err) = mediator.finalize().await {
                    tracing::error!("{:?}", finalize_err);
                }
                return Err(e);
            }
        };

    let mut summary = FetchTaskSummary {
        task_id: mediator.task_id(),
        discovered,
        chunks,
        fetched: 0,
        record: None,
    };
    if !task.track {
        return Ok(summary);
    }

    mediator.wait_for_reports(chunks).await;
    summary.fetched = mediator.progress().total();
    summary.record = Some(mediator.finalize().await.map_err(AppError::Persistence)?);
    Ok(summary)
}

/// Returns the discovered count and the number of chunks queued
async fn queue_chunks(
    pipeline: &Pipeline,
    engine: &FetchEngine,
    discovery: &DiscoverySettings,
    task: &FetchTask,
    mediator: &TaskMediator,
) -> AppResult<(usize, usize)> {
    let boundary = latest_message_id(pipeline.store().as_ref(), task.owner).await?;
    let (ids, discovered) = discover_ids(
        engine.api().as_ref(),
        boundary.as_deref(),
        discovery.query_limit,
        discovery.page_size,
    )
    .await
    .map_err(AppError::Fetch)?;
    tracing::info!(
        "Discovered {} new messages for {} (boundary {:?})",
        discovered,
        task.owner,
        boundary
    );

    let chunks: Vec<Vec<String>> = partition(&ids, discovery.chunk_size, FinalWindow::Inclusive)
        .into_iter()
        .filter(|chunk| !chunk.is_empty())
        .collect();
    let progress = mediator.progress();
    for chunk in &chunks {
        let job = FetchJob {
            engine: engine.clone_instance(Uuid::new_v4().to_string()),
            ids: chunk.clone(),
            window_size: task.window_size,
            max_workers: task.max_workers,
            owner: task.owner,
            progress: Some(progress.clone()),
        };
        pipeline.submit_fetch_job(job).await?;
    }
    Ok((discovered, chunks.len()))
}
