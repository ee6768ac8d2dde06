//! Task Mediator
//!
//! Owns the [`TaskRecord`] of one long-running task and the progress log its
//! subtasks report into. Subtasks report through a [`ProgressHandle`]; the mediator
//! finalizes the record once they are done.

use std::fmt::Display;
use std::sync::{Arc, Mutex, PoisonError, TryLockError};
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use chrono::Utc;
use tokio::time::sleep;
use uuid::Uuid;

use crate::{
    crawler_config::MediatorSettings,
    fetch::ProgressSink,
    store::{
        rows::from_row, Query, RowBatch, Store, Table, TaskKind, TaskRecord, TaskUpdate,
    },
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubtaskReport {
    pub subtask_id: String,
    pub count: usize,
}

#[derive(Debug)]
enum Entry {
    Report(SubtaskReport),
    Error(String),
}

#[derive(Debug, Default)]
struct ProgressLog {
    reports: Vec<SubtaskReport>,
    errors: Vec<String>,
}

impl ProgressLog {
    fn append(&mut self, entry: Entry) {
        match entry {
            Entry::Report(report) => self.reports.push(report),
            Entry::Error(error) => self.errors.push(error),
        }
    }
}

/// Shared progress callback handed to subtasks
#[derive(Debug, Clone)]
pub struct ProgressHandle {
    task_id: Uuid,
    log: Arc<Mutex<ProgressLog>>,
    settings: MediatorSettings,
}

impl ProgressHandle {
    fn new(task_id: Uuid, settings: MediatorSettings) -> Self {
        Self {
            task_id,
            log: Arc::new(Mutex::new(ProgressLog::default())),
            settings,
        }
    }

    pub fn task_id(&self) -> Uuid {
        self.task_id
    }

    /// Hands the entry back when the lock is held elsewhere
    fn try_append(&self, entry: Entry) -> Result<(), Entry> {
        match self.log.try_lock() {
            Ok(mut log) => {
                log.append(entry);
                Ok(())
            }
            Err(TryLockError::Poisoned(poisoned)) => {
                poisoned.into_inner().append(entry);
                Ok(())
            }
            Err(TryLockError::WouldBlock) => Err(entry),
        }
    }

    /// Retries with a sleep while the log is held, never parks the runtime thread
    async fn append(&self, entry: Entry) {
        let mut entry = entry;
        let mut attempt: u32 = 0;
        loop {
            match self.try_append(entry) {
                Ok(()) => return,
                Err(returned) => {
                    entry = returned;
                    attempt = attempt.wrapping_add(1);
                    if attempt % self.settings.lock_max_attempts.max(1) == 0 {
                        tracing::debug!(
                            "Progress log of task {} still busy after {} attempts",
                            self.task_id,
                            attempt
                        );
                    } else {
                        tracing::trace!("Progress log busy (attempt {}), backing off", attempt);
                    }
                    sleep(Duration::from_millis(self.settings.lock_backoff_ms)).await;
                }
            }
        }
    }

    fn snapshot<R>(&self, f: impl FnOnce(&mut ProgressLog) -> R) -> R {
        let mut log = self.log.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut log)
    }

    pub async fn record_error(&self, subtask_id: &str, error: impl Display) {
        self.append(Entry::Error(format!("[{}] {}", subtask_id, error)))
            .await;
    }

    pub fn reports(&self) -> Vec<SubtaskReport> {
        self.snapshot(|log| log.reports.clone())
    }

    pub fn reported(&self) -> usize {
        self.snapshot(|log| log.reports.len())
    }

    /// Sum of reported item counts
    pub fn total(&self) -> usize {
        self.snapshot(|log| log.reports.iter().map(|r| r.count).sum())
    }

    pub fn errors(&self) -> Vec<String> {
        self.snapshot(|log| log.errors.clone())
    }
}

#[async_trait]
impl ProgressSink for ProgressHandle {
    async fn report(&self, subtask_id: &str, count: usize) {
        tracing::debug!(
            "Task {} subtask {} reported {} items",
            self.task_id,
            subtask_id,
            count
        );
        self.append(Entry::Report(SubtaskReport {
            subtask_id: subtask_id.to_string(),
            count,
        }))
        .await;
    }
}

pub struct TaskMediator {
    store: Arc<dyn Store>,
    task: TaskRecord,
    progress: ProgressHandle,
}

impl TaskMediator {
    /// Write a fresh, unfinished task record
    pub async fn start(
        store: Arc<dyn Store>,
        owner: Uuid,
        kind: TaskKind,
        settings: MediatorSettings,
    ) -> anyhow::Result<Self> {
        let task = TaskRecord {
            id: Uuid::new_v4(),
            owner,
            kind,
            time_start: Utc::now(),
            time_finished: None,
            success: false,
            error: String::new(),
        };
        let batch = RowBatch::new(Table::Tasks, std::slice::from_ref(&task))?;
        store
            .insert_rows(batch.table, batch.rows)
            .await
            .with_context(|| format!("Failed to start {} task", kind))?;

        tracing::info!("Started {} task {} for {}", kind, task.id, owner);
        let progress = ProgressHandle::new(task.id, settings);
        Ok(Self {
            store,
            task,
            progress,
        })
    }

    pub fn task_id(&self) -> Uuid {
        self.task.id
    }

    pub fn progress(&self) -> ProgressHandle {
        self.progress.clone()
    }

    pub async fn record_error(&self, error: impl Display) {
        self.progress
            .record_error(&self.task.kind.to_string(), error)
            .await;
    }

    /// Wait until `expected` subtasks have reported
    pub async fn wait_for_reports(&self, expected: usize) {
        let poll = Duration::from_millis(self.progress.settings.completion_poll_ms);
        loop {
            let reported = self.progress.reported();
            if reported >= expected {
                return;
            }
            tracing::debug!(
                "Task {} waiting on subtasks: {}/{} reported",
                self.task.id,
                reported,
                expected
            );
            sleep(poll).await;
        }
    }

    /// Write finish time, success and the joined error text
    pub async fn finalize(mut self) -> anyhow::Result<TaskRecord> {
        let errors = self.progress.errors();
        let update = TaskUpdate {
            time_finished: Utc::now(),
            success: errors.is_empty(),
            error: errors.join(", "),
        };
        self.store
            .update_task_record(self.task.id, update.clone())
            .await
            .with_context(|| format!("Failed to finalize task {}", self.task.id))?;

        self.task.time_finished = Some(update.time_finished);
        self.task.success = update.success;
        self.task.error = update.error;

        if self.task.success {
            tracing::info!(
                "{} task {} finished, {} items",
                self.task.kind,
                self.task.id,
                self.progress.total()
            );
        } else {
            tracing::warn!(
                "{} task {} finished with errors: {}",
                self.task.kind,
                self.task.id,
                self.task.error
            );
        }
        Ok(self.task)
    }
}

/// Current state of a task, for callers polling on it
pub async fn task_status(store: &dyn Store, task_id: Uuid) -> anyhow::Result<Option<TaskRecord>> {
    store
        .fetch_one(&Query::TaskById { task_id })
        .await?
        .map(from_row)
        .transpose()
}
