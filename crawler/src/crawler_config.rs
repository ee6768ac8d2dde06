use config::Config;
use lazy_static::lazy_static;
use serde::Deserialize;
use std::{env, path::Path, time::Duration};

/// How the last window of a partition is cut
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FinalWindow {
    /// The remainder window holds every leftover id
    #[default]
    Inclusive,
    /// The remainder window stops one short of the end, and an empty remainder
    /// window is still emitted when the ids divide evenly
    ExcludeLast,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FetchSettings {
    pub window_size: usize,
    pub max_workers: usize,
    /// Seconds added to the backoff per round
    pub throttle_coefficient: f64,
    pub jitter_min_secs: f64,
    pub jitter_max_secs: f64,
    /// `None` retries until at most one window is left
    #[serde(default)]
    pub max_rounds: Option<u32>,
    #[serde(default)]
    pub final_window: FinalWindow,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            window_size: 15,
            max_workers: 4,
            throttle_coefficient: 0.7,
            jitter_min_secs: 0.0001,
            jitter_max_secs: 0.3,
            max_rounds: None,
            final_window: FinalWindow::Inclusive,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DiscoverySettings {
    pub chunk_size: usize,
    pub query_limit: usize,
    pub page_size: u32,
}

impl Default for DiscoverySettings {
    fn default() -> Self {
        Self {
            chunk_size: 500,
            query_limit: 2500,
            page_size: 500,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct WorkerSettings {
    pub fetch_workers: usize,
    pub graph_workers: usize,
    pub persistence_workers: usize,
    pub queue_capacity: usize,
    pub idle_sleep_ms: u64,
    pub cooldown_ms: u64,
    pub status_log_interval_secs: u64,
}

impl WorkerSettings {
    pub fn idle_sleep(&self) -> Duration {
        Duration::from_millis(self.idle_sleep_ms)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            fetch_workers: 4,
            graph_workers: 2,
            persistence_workers: 2,
            queue_capacity: 64,
            idle_sleep_ms: 5000,
            cooldown_ms: 3000,
            status_log_interval_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MediatorSettings {
    pub lock_backoff_ms: u64,
    pub lock_max_attempts: u32,
    pub completion_poll_ms: u64,
}

impl Default for MediatorSettings {
    fn default() -> Self {
        Self {
            lock_backoff_ms: 50,
            lock_max_attempts: 60,
            completion_poll_ms: 3000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct GmailSettings {
    pub quota_per_second: usize,
    pub batch_endpoint: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CrawlerConfig {
    pub fetch: FetchSettings,
    pub discovery: DiscoverySettings,
    pub workers: WorkerSettings,
    pub mediator: MediatorSettings,
    pub gmail: GmailSettings,
}

impl CrawlerConfig {
    pub fn from_file(path: &str) -> Result<Self, config::ConfigError> {
        Config::builder()
            .add_source(config::File::with_name(path))
            .add_source(config::Environment::with_prefix("CRAWLER").separator("__"))
            .build()?
            .try_deserialize()
    }
}

impl std::fmt::Display for CrawlerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Crawler Config:\nFetch: {:?}\n\nDiscovery: {:?}\n\nWorkers: {:?}\n\nMediator: {:?}\n\nGmail: {:?}",
            self.fetch, self.discovery, self.workers, self.mediator, self.gmail
        )
    }
}

pub fn config_root() -> String {
    env::var("APP_DIR").unwrap_or_else(|_| {
        let dir =
            env::var("CARGO_MANIFEST_DIR").expect("CARGO_MANIFEST_DIR or APP_DIR is required");
        let dir = Path::new(&dir)
            .parent()
            .expect("Failed to get parent dir")
            .display()
            .to_string();
        format!("{}/config", dir)
    })
}

lazy_static! {
    pub static ref cfg: CrawlerConfig = {
        let root = config_root();
        CrawlerConfig::from_file(&format!("{root}/config.toml")).expect("config.toml is invalid")
    };
}
