use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use rand::Rng;
use tokio::time::sleep;

use crate::{
    crawler_config::FetchSettings,
    email::{BatchItem, MailApi, RawMessage},
    error::{AppError, AppResult},
    observability::PipelineTracker,
    parser::{MessageRecord, RecordParser},
};

use super::windows::partition;

/// Receives the number of records an engine instance produced
#[async_trait]
pub trait ProgressSink: Send + Sync {
    async fn report(&self, subtask_id: &str, count: usize);
}

/// Result of one engine run
#[derive(Debug, Default)]
pub struct FetchOutcome {
    pub records: Vec<MessageRecord>,
    /// Ids still failing when the run stopped, plus ids left out of a window
    pub unresolved: Vec<String>,
    pub rounds: u32,
}

#[derive(Debug, Default)]
struct WindowOutcome {
    records: Vec<MessageRecord>,
    failed: Vec<String>,
}

/// Fetches ids in windows, one batch call per window, retrying failed ids in rounds
#[derive(Clone)]
pub struct FetchEngine {
    instance_id: String,
    api: Arc<dyn MailApi>,
    parser: Arc<RecordParser>,
    settings: FetchSettings,
    tracker: PipelineTracker,
    progress: Option<Arc<dyn ProgressSink>>,
}

impl FetchEngine {
    pub fn new(
        api: Arc<dyn MailApi>,
        parser: Arc<RecordParser>,
        settings: FetchSettings,
        tracker: PipelineTracker,
    ) -> Self {
        Self {
            instance_id: "primary".to_string(),
            api,
            parser,
            settings,
            tracker,
            progress: None,
        }
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    pub fn settings(&self) -> &FetchSettings {
        &self.settings
    }

    pub fn api(&self) -> &Arc<dyn MailApi> {
        &self.api
    }

    pub fn tracker(&self) -> &PipelineTracker {
        &self.tracker
    }

    /// Copy of this engine with its own id and no progress sink
    pub fn clone_instance(&self, instance_id: impl Into<String>) -> Self {
        Self {
            instance_id: instance_id.into(),
            progress: None,
            ..self.clone()
        }
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressSink>) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn with_max_rounds(mut self, max_rounds: Option<u32>) -> Self {
        self.settings.max_rounds = max_rounds;
        self
    }

    /// Fetch and parse `ids`.
    ///
    /// Round one always runs. Later rounds run only while the failed ids fill more
    /// than one window and the round cap (if any) is not exceeded.
    pub async fn fetch(
        &self,
        ids: &[String],
        window_size: usize,
        max_workers: usize,
    ) -> AppResult<FetchOutcome> {
        let mut outcome = FetchOutcome::default();
        let mut pending = ids.to_vec();

        while !pending.is_empty() {
            let round = outcome.rounds + 1;
            let windows = partition(&pending, window_size, self.settings.final_window);

            if round > 1 && windows.len() <= 1 {
                tracing::info!(
                    "[{}] {} window(s) left after round {}, stopping with {} unresolved",
                    self.instance_id,
                    windows.len(),
                    outcome.rounds,
                    pending.len()
                );
                break;
            }
            if let Some(cap) = self.settings.max_rounds {
                if round > cap {
                    tracing::warn!(
                        "[{}] round cap {} reached with {} unresolved",
                        self.instance_id,
                        cap,
                        pending.len()
                    );
                    break;
                }
            }

            let windowed: usize = windows.iter().map(Vec::len).sum();
            if windowed < pending.len() {
                tracing::warn!(
                    "[{}] {} id(s) left out of round {} windows",
                    self.instance_id,
                    pending.len() - windowed,
                    round
                );
                outcome.unresolved.extend_from_slice(&pending[windowed..]);
            }

            outcome.rounds = round;
            tracing::debug!(
                "[{}] round {}: {} ids in {} windows",
                self.instance_id,
                round,
                windowed,
                windows.len()
            );

            let results = stream::iter(windows.into_iter().filter(|w| !w.is_empty()))
                .map(|window| self.run_window(window, round))
                .buffer_unordered(max_workers.max(1))
                .collect::<Vec<_>>()
                .await;

            pending = Vec::new();
            for result in results {
                let window = result?;
                outcome.records.extend(window.records);
                pending.extend(window.failed);
            }
        }

        outcome.unresolved.extend(pending);

        if let Some(progress) = &self.progress {
            progress
                .report(&self.instance_id, outcome.records.len())
                .await;
        }

        Ok(outcome)
    }

    fn backoff(&self, round: u32) -> Duration {
        let FetchSettings {
            jitter_min_secs,
            jitter_max_secs,
            throttle_coefficient,
            ..
        } = self.settings;
        let jitter = if jitter_max_secs > jitter_min_secs {
            rand::thread_rng().gen_range(jitter_min_secs..=jitter_max_secs)
        } else {
            jitter_min_secs
        };
        Duration::from_secs_f64((jitter + round as f64 * throttle_coefficient).max(0.0))
    }

    async fn run_window(&self, window: Vec<String>, round: u32) -> AppResult<WindowOutcome> {
        sleep(self.backoff(round)).await;

        let items = match self.api.batch_get(&window).await {
            Ok(items) => items,
            Err(e) => {
                tracing::warn!(
                    "[{}] batch call for {} ids failed, requeueing: {:?}",
                    self.instance_id,
                    window.len(),
                    e
                );
                self.tracker.increment_requeued(window.len() as u64);
                return Ok(WindowOutcome {
                    records: Vec::new(),
                    failed: window,
                });
            }
        };

        let mut answered = HashSet::new();
        let mut messages: Vec<RawMessage> = Vec::new();
        let mut failed = Vec::new();
        for item in items {
            match item {
                BatchItem::Success(message) => {
                    answered.insert(message.id.clone());
                    messages.push(message);
                }
                BatchItem::Error { message_id, error } => {
                    tracing::debug!(
                        "[{}] message {} failed ({}), requeueing",
                        self.instance_id,
                        message_id,
                        error.error.code
                    );
                    answered.insert(message_id.clone());
                    failed.push(message_id);
                }
            }
        }
        failed.extend(window.into_iter().filter(|id| !answered.contains(id)));

        let parser = self.parser.clone();
        let records = tokio::task::spawn_blocking(move || {
            messages
                .iter()
                .map(|message| parser.parse(message))
                .collect::<Result<Vec<_>, _>>()
        })
        .await
        .map_err(|e| AppError::Internal(e.into()))??;

        self.tracker.increment_fetched(records.len() as u64);
        self.tracker.increment_requeued(failed.len() as u64);

        Ok(WindowOutcome { records, failed })
    }
}
