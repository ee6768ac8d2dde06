#![allow(dead_code)]

mod crawler_config;
mod email;
mod error;
mod fetch;
mod graph;
mod observability;
mod parser;
mod state;
mod store;
mod testing;

use std::{env, sync::Arc, time::Duration};

use anyhow::Context;
use chrono::{DateTime, Utc};
use mimalloc::MiMalloc;
use sea_orm::{ConnectOptions, Database};
use tokio::signal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use crate::{
    crawler_config::cfg,
    email::{GmailClient, MailApi},
    fetch::FetchEngine,
    observability::PipelineTracker,
    parser::RecordParser,
    state::{
        fetch_mediator::{run_fetch_task, FetchTask},
        graph_mediator::run_graph_task,
        pipeline::{DateRange, Pipeline},
    },
    store::{SeaOrmStore, Store},
};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

pub type HttpClient = reqwest::Client;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::Layer::default().with_ansi(false))
        .init();

    tracing::info!("{}", *cfg);

    let db_url = env::var("DATABASE_URL").context("DATABASE_URL is not set in .env file")?;
    let mut db_options = ConnectOptions::new(db_url);
    db_options.sqlx_logging(false);
    let conn = Database::connect(db_options)
        .await
        .context("Database connection failed")?;
    let store = SeaOrmStore::new(conn);
    store.migrate().await?;
    let store: Arc<dyn Store> = Arc::new(store);

    let access_token = env::var("GMAIL_ACCESS_TOKEN").context("GMAIL_ACCESS_TOKEN is not set")?;
    let owner: Uuid = env::var("CRAWL_OWNER_ID")
        .context("CRAWL_OWNER_ID is not set")?
        .parse()
        .context("CRAWL_OWNER_ID is not a uuid")?;
    let range = date_range_from_env()?;

    let http_client = reqwest::ClientBuilder::new().use_rustls_tls().build()?;
    let api: Arc<dyn MailApi> = Arc::new(GmailClient::new(http_client, access_token, &cfg.gmail));

    let tracker = PipelineTracker::new();
    let engine = FetchEngine::new(
        api,
        Arc::new(RecordParser::english()),
        cfg.fetch.clone(),
        tracker.clone(),
    );
    let pipeline = Arc::new(Pipeline::new(
        store,
        tracker,
        cfg.workers.clone(),
        cfg.mediator.clone(),
    ));
    pipeline.start();

    {
        let pipeline = pipeline.clone();
        tokio::spawn(async move {
            let task = FetchTask {
                owner,
                window_size: cfg.fetch.window_size,
                max_workers: cfg.fetch.max_workers,
                // Returns once every chunk's rows are stored
                track: true,
            };
            match run_fetch_task(&pipeline, &engine, &cfg.discovery, task).await {
                Ok(summary) => tracing::info!(
                    "Fetch task {} done: {} discovered, {} fetched in {} chunks",
                    summary.task_id,
                    summary.discovered,
                    summary.fetched,
                    summary.chunks
                ),
                Err(e) => tracing::error!("Fetch task failed: {}", e),
            }

            match run_graph_task(&pipeline, owner, range).await {
                Ok(record) => tracing::info!(
                    "Graph task {} done, success: {}",
                    record.id,
                    record.success
                ),
                Err(e) => tracing::error!("Graph task failed: {}", e),
            }
        });
    }

    let status_interval = Duration::from_secs(cfg.workers.status_log_interval_secs.max(1));
    let status_pipeline = pipeline.clone();
    let status_shutdown = pipeline.shutdown_token();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(status_interval);
        loop {
            tokio::select! {
                _ = status_shutdown.cancelled() => break,
                _ = interval.tick() => {
                    tracing::info!("\n{}", status_pipeline.get_status_table());
                }
            }
        }
    });

    signal::ctrl_c()
        .await
        .context("failed to install Ctrl+C handler")?;
    pipeline.shutdown();
    let exits = pipeline.join().await;
    tracing::info!(
        "{} pollers stopped, final stats: {}",
        exits.len(),
        pipeline.get_stats()
    );

    Ok(())
}

/// `CRAWL_START` / `CRAWL_END` as RFC 3339, each defaulting to the full range
fn date_range_from_env() -> anyhow::Result<DateRange> {
    let parse = |name: &str| -> anyhow::Result<Option<DateTime<Utc>>> {
        match env::var(name) {
            Ok(value) if !value.trim().is_empty() => {
                let date = DateTime::parse_from_rfc3339(value.trim())
                    .with_context(|| format!("{} is not an RFC 3339 date", name))?;
                Ok(Some(date.with_timezone(&Utc)))
            }
            _ => Ok(None),
        }
    };

    let mut range = DateRange::default();
    if let Some(start) = parse("CRAWL_START")? {
        range.start = start;
    }
    if let Some(end) = parse("CRAWL_END")? {
        range.end = end;
    }
    anyhow::ensure!(range.start <= range.end, "CRAWL_START is after CRAWL_END");
    Ok(range)
}
