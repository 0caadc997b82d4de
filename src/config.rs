//! Client Configuration & Validation
//!
//! All knobs for a client live here and are validated once, at
//! construction. Violations are fatal [`ConfigError`]s; nothing is checked
//! lazily at stream time.

use std::path::PathBuf;
use std::time::Duration;

use chrono::NaiveDate;

use crate::heartbeat::HeartbeatConfig;
use crate::provider::Provider;
use crate::reconnect::ReconnectConfig;

/// Default bounded-queue capacity for equities feeds.
pub const DEFAULT_EQUITIES_QUEUE_SIZE: usize = 10_000;
/// Default bounded-queue capacity for options feeds, sized for the
/// firehose.
pub const DEFAULT_OPTIONS_QUEUE_SIZE: usize = 500_000;

/// Minimum worker threads for options feeds.
pub const OPTIONS_WORKER_FLOOR: usize = 4;
/// Minimum worker threads for equities feeds.
pub const EQUITIES_WORKER_FLOOR: usize = 2;

/// Default replay REST endpoint template. Placeholders: `{subsource}`,
/// `{date}`, `{api_key}`.
pub const DEFAULT_REPLAY_URL_TEMPLATE: &str =
    "https://api-v2.intrinio.com/securities/replay?subsource={subsource}&date={date}&api_key={api_key}";

/// Log verbosity hint. The crate logs through `tracing`; callers map this
/// onto their subscriber filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogLevel {
    /// Informational.
    #[default]
    Info,
    /// Verbose per-frame logging.
    Debug,
}

/// Configuration error raised at client construction.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The API key is empty.
    #[error("an API key is required")]
    MissingApiKey,

    /// Too few worker threads for the selected feed.
    #[error("provider {provider} requires at least {required} worker threads, got {requested}")]
    TooFewThreads {
        /// Provider name.
        provider: &'static str,
        /// Enforced floor.
        required: usize,
        /// Configured value.
        requested: usize,
    },

    /// `Manual` provider without an IP address.
    #[error("provider MANUAL requires manual_ip_address")]
    MissingManualIp,

    /// CSV output requested without a path.
    #[error("write_to_csv requires csv_file_path")]
    MissingCsvPath,

    /// Queue capacity of zero.
    #[error("max_queue_size must be greater than zero")]
    ZeroQueueSize,
}

/// Replay-mode options. Present on [`Config::replay`] to run the client
/// against historical capture files instead of the live socket.
#[derive(Debug, Clone)]
pub struct ReplayConfig {
    /// Trading date to replay.
    pub date: NaiveDate,
    /// Pace emission to the recorded wall-clock gaps instead of emitting
    /// as fast as the workers drain.
    pub with_simulated_delay: bool,
    /// Delete downloaded capture files after the replay completes.
    pub delete_file_when_done: bool,
    /// Dump every decoded event to a CSV file.
    pub write_to_csv: bool,
    /// Target path for the CSV dump.
    pub csv_file_path: Option<PathBuf>,
    /// REST endpoint template returning the presigned capture-file URL.
    /// Placeholders: `{subsource}`, `{date}`, `{api_key}`.
    pub url_template: String,
    /// Replay these already-downloaded capture files instead of fetching.
    /// Mainly useful for re-running a day without re-downloading.
    pub local_files: Vec<PathBuf>,
}

impl ReplayConfig {
    /// Replay config for a date with all toggles off.
    #[must_use]
    pub fn new(date: NaiveDate) -> Self {
        Self {
            date,
            with_simulated_delay: false,
            delete_file_when_done: false,
            write_to_csv: false,
            csv_file_path: None,
            url_template: DEFAULT_REPLAY_URL_TEMPLATE.to_string(),
            local_files: Vec::new(),
        }
    }
}

/// Full client configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Vendor API key.
    pub api_key: String,
    /// Feed to connect to.
    pub provider: Provider,
    /// Request the delayed variant of the feed.
    pub delayed: bool,
    /// Decoder worker count. Floors: 4 for options, 2 for equities.
    pub num_threads: usize,
    /// Channels to join at startup.
    pub symbols: Vec<String>,
    /// Log verbosity hint.
    pub log_level: LogLevel,
    /// Endpoint IP for the `Manual` provider, e.g. `10.0.0.5:8000`.
    pub manual_ip_address: Option<String>,
    /// Bounded queue capacity override.
    pub max_queue_size: Option<usize>,
    /// Deliver raw frames to `on_raw` instead of decoding.
    pub bypass_parsing: bool,
    /// Force debug-level verbosity.
    pub debug: bool,
    /// Heartbeat cadence.
    pub heartbeat: HeartbeatConfig,
    /// Reconnect backoff tuning.
    pub reconnect: ReconnectConfig,
    /// Replay mode; `None` streams live.
    pub replay: Option<ReplayConfig>,
}

impl Config {
    /// Configuration with defaults for everything but the key and provider.
    #[must_use]
    pub fn new(api_key: impl Into<String>, provider: Provider) -> Self {
        Self {
            api_key: api_key.into(),
            provider,
            delayed: false,
            num_threads: 4,
            symbols: Vec::new(),
            log_level: LogLevel::default(),
            manual_ip_address: None,
            max_queue_size: None,
            bypass_parsing: false,
            debug: false,
            heartbeat: HeartbeatConfig::default(),
            reconnect: ReconnectConfig::default(),
            replay: None,
        }
    }

    /// Enforced worker-thread floor for the selected provider.
    #[must_use]
    pub const fn worker_floor(&self) -> usize {
        if self.provider.is_options() {
            OPTIONS_WORKER_FLOOR
        } else {
            EQUITIES_WORKER_FLOOR
        }
    }

    /// Queue capacity after applying the per-feed default.
    #[must_use]
    pub fn effective_queue_size(&self) -> usize {
        self.max_queue_size.unwrap_or(if self.provider.is_options() {
            DEFAULT_OPTIONS_QUEUE_SIZE
        } else {
            DEFAULT_EQUITIES_QUEUE_SIZE
        })
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError`] found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api_key.is_empty() {
            return Err(ConfigError::MissingApiKey);
        }

        let floor = self.worker_floor();
        if self.num_threads < floor {
            return Err(ConfigError::TooFewThreads {
                provider: self.provider.as_str(),
                required: floor,
                requested: self.num_threads,
            });
        }

        if self.provider == Provider::Manual
            && self
                .manual_ip_address
                .as_ref()
                .is_none_or(String::is_empty)
        {
            return Err(ConfigError::MissingManualIp);
        }

        if self.max_queue_size == Some(0) {
            return Err(ConfigError::ZeroQueueSize);
        }

        if let Some(replay) = &self.replay
            && replay.write_to_csv
            && replay.csv_file_path.is_none()
        {
            return Err(ConfigError::MissingCsvPath);
        }

        Ok(())
    }
}
