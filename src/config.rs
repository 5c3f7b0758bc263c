use std::path::PathBuf;
use std::time::Duration;

use tracing::{trace, warn};

use crate::model::MonitoringFrequency;

/// Errors raised while loading or validating configuration; all of them are fatal at startup
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read configuration file: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid configuration file provided: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid value for {key}: {value}")]
    InvalidEnv { key: &'static str, value: String },

    #[error("probe worker count must be at least 1 (got {0})")]
    NoWorkers(usize),

    #[error("{0} must be greater than zero")]
    Zero(&'static str),

    #[error("at least one monitoring frequency must be configured")]
    NoFrequencies,
}

/// Storage backend configuration
#[derive(Debug, Clone, PartialEq, serde::Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum StorageConfig {
    /// In-memory storage (no persistence)
    #[serde(rename = "none")]
    None,

    /// SQLite database (default for most deployments)
    Sqlite {
        /// Path to the SQLite database file
        #[serde(default = "default_sqlite_path")]
        path: PathBuf,
    },
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig::Sqlite {
            path: default_sqlite_path(),
        }
    }
}

fn default_sqlite_path() -> PathBuf {
    PathBuf::from("./watchdog.db")
}

/// Pending-work queue configuration
#[derive(Debug, Clone, PartialEq, serde::Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum QueueConfig {
    /// Process-local queue, only useful when the CLI and the monitor share a process
    Memory,

    Redis {
        #[serde(default = "default_redis_url")]
        url: String,
    },
}

impl Default for QueueConfig {
    fn default() -> Self {
        QueueConfig::Redis {
            url: default_redis_url(),
        }
    }
}

fn default_redis_url() -> String {
    String::from("redis://127.0.0.1:6379/0")
}

/// Where up/down notifications go
#[derive(Debug, Clone, Default, PartialEq, serde::Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NotifierConfig {
    /// Only write notifications to the log
    #[default]
    Log,
    Webhook {
        url: String,
    },
    Discord {
        url: String,
        user_id: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize)]
pub struct ProbeConfig {
    /// Per-request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Probe workers per frequency
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Maximum number of target ids handed to a worker at once
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Capacity (in chunks) of each frequency's distribution queue
    #[serde(default = "default_distribution_capacity")]
    pub distribution_capacity: usize,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            workers: default_workers(),
            chunk_size: default_chunk_size(),
            distribution_capacity: default_distribution_capacity(),
        }
    }
}

impl ProbeConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize)]
pub struct AggregatorConfig {
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    #[serde(default = "default_flush_interval_secs")]
    pub flush_interval_secs: u64,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            flush_interval_secs: default_flush_interval_secs(),
        }
    }
}

impl AggregatorConfig {
    pub fn flush_interval(&self) -> Duration {
        Duration::from_secs(self.flush_interval_secs)
    }
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize)]
pub struct EventBusConfig {
    /// Upper bound on event handlers running at the same time
    #[serde(default = "default_max_concurrent_handlers")]
    pub max_concurrent_handlers: usize,

    /// Upper bound on handler tasks alive at once, running or waiting
    ///
    /// Deliveries beyond it are dropped and counted.
    #[serde(default = "default_max_pending_handlers")]
    pub max_pending_handlers: usize,
}

impl Default for EventBusConfig {
    fn default() -> Self {
        Self {
            max_concurrent_handlers: default_max_concurrent_handlers(),
            max_pending_handlers: default_max_pending_handlers(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize)]
pub struct Config {
    #[serde(default = "default_frequencies")]
    pub frequencies: Vec<MonitoringFrequency>,

    #[serde(default)]
    pub probe: ProbeConfig,

    #[serde(default)]
    pub aggregator: AggregatorConfig,

    #[serde(default)]
    pub event_bus: EventBusConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub queue: QueueConfig,

    #[serde(default)]
    pub notifier: NotifierConfig,
}

fn default_frequencies() -> Vec<MonitoringFrequency> {
    MonitoringFrequency::ALL.to_vec()
}

fn default_timeout_secs() -> u64 {
    5
}

fn default_workers() -> usize {
    4
}

fn default_chunk_size() -> usize {
    50
}

fn default_distribution_capacity() -> usize {
    8
}

fn default_batch_size() -> usize {
    100
}

fn default_flush_interval_secs() -> u64 {
    5
}

fn default_max_concurrent_handlers() -> usize {
    32
}

fn default_max_pending_handlers() -> usize {
    1024
}

impl Default for Config {
    fn default() -> Self {
        Self {
            frequencies: default_frequencies(),
            probe: ProbeConfig::default(),
            aggregator: AggregatorConfig::default(),
            event_bus: EventBusConfig::default(),
            storage: StorageConfig::default(),
            queue: QueueConfig::default(),
            notifier: NotifierConfig::default(),
        }
    }
}

impl Config {
    /// Apply `WATCHDOG_*` environment overrides on top of file values
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(timeout) = env_parse("WATCHDOG_PROBE_TIMEOUT")? {
            self.probe.timeout_secs = timeout;
        }
        if let Some(workers) = env_parse("WATCHDOG_PROBE_WORKERS")? {
            self.probe.workers = workers;
        }
        if let Some(chunk_size) = env_parse("WATCHDOG_CHUNK_SIZE")? {
            self.probe.chunk_size = chunk_size;
        }
        if let Some(batch_size) = env_parse("WATCHDOG_BATCH_SIZE")? {
            self.aggregator.batch_size = batch_size;
        }
        if let Some(flush) = env_parse("WATCHDOG_FLUSH_INTERVAL")? {
            self.aggregator.flush_interval_secs = flush;
        }
        if let Ok(url) = std::env::var("WATCHDOG_REDIS_URL") {
            self.queue = QueueConfig::Redis { url };
        }
        if let Ok(path) = std::env::var("WATCHDOG_DATABASE") {
            self.storage = StorageConfig::Sqlite {
                path: PathBuf::from(path),
            };
        }
        Ok(())
    }

    /// Reject values the pipeline cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.frequencies.is_empty() {
            return Err(ConfigError::NoFrequencies);
        }
        if self.probe.workers < 1 {
            return Err(ConfigError::NoWorkers(self.probe.workers));
        }
        if self.probe.chunk_size == 0 {
            return Err(ConfigError::Zero("probe.chunk_size"));
        }
        if self.probe.distribution_capacity == 0 {
            return Err(ConfigError::Zero("probe.distribution_capacity"));
        }
        if self.probe.timeout_secs == 0 {
            return Err(ConfigError::Zero("probe.timeout_secs"));
        }
        if self.aggregator.batch_size == 0 {
            return Err(ConfigError::Zero("aggregator.batch_size"));
        }
        if self.aggregator.flush_interval_secs == 0 {
            return Err(ConfigError::Zero("aggregator.flush_interval_secs"));
        }
        if self.event_bus.max_concurrent_handlers == 0 {
            return Err(ConfigError::Zero("event_bus.max_concurrent_handlers"));
        }
        if self.event_bus.max_pending_handlers == 0 {
            return Err(ConfigError::Zero("event_bus.max_pending_handlers"));
        }
        Ok(())
    }
}

fn env_parse<T: std::str::FromStr>(key: &'static str) -> Result<Option<T>, ConfigError> {
    match std::env::var(key) {
        Ok(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidEnv { key, value }),
        Err(std::env::VarError::NotPresent) => Ok(None),
        Err(std::env::VarError::NotUnicode(_)) => {
            warn!("ignoring non-unicode value for {key}");
            Ok(None)
        }
    }
}

pub fn read_config_file(path: &str) -> Result<Config, ConfigError> {
    let file_content = std::fs::read_to_string(path)?;
    parse_config(&file_content)
}

pub fn parse_config(content: &str) -> Result<Config, ConfigError> {
    serde_json::from_str::<Config>(content)
        .map_err(ConfigError::from)
        .inspect(|config| trace!("loaded config: {config:?}"))
}
