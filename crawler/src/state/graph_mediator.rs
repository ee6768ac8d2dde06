use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    state::{
        mediator::TaskMediator,
        pipeline::{DateRange, GraphJob, Pipeline},
    },
    store::{TaskKind, TaskRecord},
};

/// Queue a graph build for the owner's messages in `range` and wait for it
pub async fn run_graph_task(
    pipeline: &Pipeline,
    owner: Uuid,
    range: DateRange,
) -> AppResult<TaskRecord> {
    let mediator = TaskMediator::start(
        pipeline.store().clone(),
        owner,
        TaskKind::Graph,
        pipeline.mediator_settings().clone(),
    )
    .await
    .map_err(AppError::Persistence)?;

    let job = GraphJob {
        owner,
        range,
        progress: Some(mediator.progress()),
    };
    if let Err(e) = pipeline.submit_graph_job(job).await {
        mediator.record_error(&e).await;
        mediator.finalize().await.map_err(AppError::Persistence)?;
        return Err(e);
    }

    mediator.wait_for_reports(1).await;
    let edges = mediator.progress().total();
    let record = mediator.finalize().await.map_err(AppError::Persistence)?;
    tracing::info!("Graph task {} produced {} edges", record.id, edges);
    Ok(record)
}
