//! Configuration for the pressure monitor.

use crate::core::{AnomalyRetention, DEFAULT_HISTORY_CAPACITY};
use crate::source::{SourceConfig, SubjectId};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration for the monitor.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Base URL of the telemetry source
    pub source_base_url: String,

    /// Subjects polled every round, in polling order
    pub subject_ids: Vec<SubjectId>,

    /// IDs probed when listing subjects for a selector
    pub directory_ids: Vec<SubjectId>,

    /// Pause between the end of one round and the start of the next
    #[serde(with = "duration_serde")]
    pub poll_interval: Duration,

    /// Per-request timeout against the telemetry source
    #[serde(with = "duration_serde")]
    pub fetch_timeout: Duration,

    /// Upper bound on simultaneous fetches within a round (1 = sequential)
    pub max_concurrent_fetches: usize,

    /// Records kept per subject in the history buffer
    pub history_capacity: usize,

    /// Retention of the anomaly log
    pub anomaly_retention: AnomalyRetention,

    /// IANA name of the reference timezone for capture timestamps
    pub timezone: String,

    /// Path for store checkpoints and ingest stats
    pub data_path: PathBuf,

    /// Whether to restore and checkpoint the stores on disk
    pub persist: bool,

    /// Checkpoint the stores every this many rounds (0 = only on shutdown)
    pub checkpoint_every_rounds: u64,

    /// Port of the read API (0 for random)
    pub server_port: u16,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("pressure-monitor");

        Self {
            source_base_url: "http://tesla.iem.pw.edu.pl:9080".to_string(),
            subject_ids: (1..=6).collect(),
            directory_ids: (1..=7).collect(),
            poll_interval: Duration::from_secs(1),
            fetch_timeout: Duration::from_secs(5),
            max_concurrent_fetches: 1,
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            anomaly_retention: AnomalyRetention::Unbounded,
            timezone: "Europe/Warsaw".to_string(),
            data_path: data_dir,
            persist: true,
            checkpoint_every_rounds: 60,
            server_port: 8050,
        }
    }
}

impl Config {
    /// Load configuration from the default location.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::config_path())
    }

    /// Load configuration from a specific file, falling back to defaults
    /// when it does not exist.
    pub fn load_from(config_path: &std::path::Path) -> Result<Self, ConfigError> {
        if config_path.exists() {
            let content = std::fs::read_to_string(config_path)
                .map_err(|e| ConfigError::IoError(e.to_string()))?;
            let config: Config = serde_json::from_str(&content)
                .map_err(|e| ConfigError::ParseError(e.to_string()))?;
            config.validate()?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::config_path())
    }

    /// Save configuration to a specific file.
    pub fn save_to(&self, config_path: &std::path::Path) -> Result<(), ConfigError> {
        // Ensure parent directory exists
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::IoError(e.to_string()))?;
        }

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        std::fs::write(config_path, content).map_err(|e| ConfigError::IoError(e.to_string()))?;

        Ok(())
    }

    /// Get the path to the configuration file.
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("pressure-monitor")
            .join("config.json")
    }

    /// Check values that serde cannot.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.tz()?;
        if self.history_capacity == 0 {
            return Err(ConfigError::Invalid(
                "history_capacity must be at least 1".to_string(),
            ));
        }
        if self.anomaly_retention == AnomalyRetention::MaxEntries(0) {
            return Err(ConfigError::Invalid(
                "anomaly_retention limit must be at least 1".to_string(),
            ));
        }
        if self.fetch_timeout.is_zero() {
            return Err(ConfigError::Invalid(
                "fetch_timeout must be at least 1 second".to_string(),
            ));
        }
        if self.max_concurrent_fetches == 0 {
            return Err(ConfigError::Invalid(
                "max_concurrent_fetches must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// The reference timezone.
    pub fn tz(&self) -> Result<Tz, ConfigError> {
        self.timezone
            .parse::<Tz>()
            .map_err(|_| ConfigError::InvalidTimezone(self.timezone.clone()))
    }

    /// Telemetry source settings.
    pub fn source(&self) -> SourceConfig {
        SourceConfig::new(self.source_base_url.clone(), self.fetch_timeout)
    }

    /// File holding the persisted ingest counters.
    pub fn stats_path(&self) -> PathBuf {
        self.data_path.join("ingest_stats.json")
    }

    /// Directory holding the store checkpoint files.
    pub fn store_path(&self) -> PathBuf {
        self.data_path.join("store")
    }

    /// Ensure all required directories exist.
    pub fn ensure_directories(&self) -> Result<(), ConfigError> {
        std::fs::create_dir_all(self.store_path())
            .map_err(|e| ConfigError::IoError(e.to_string()))?;
        Ok(())
    }
}

/// Parse a comma-separated list of subject IDs, e.g. `1,2,5`.
pub fn parse_subject_list(s: &str) -> Result<Vec<SubjectId>, ConfigError> {
    s.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| {
            part.parse::<SubjectId>()
                .map_err(|e| ConfigError::Invalid(format!("bad subject id '{part}': {e}")))
        })
        .collect()
}

/// Configuration errors.
#[derive(Debug)]
pub enum ConfigError {
    IoError(String),
    ParseError(String),
    SerializeError(String),
    InvalidTimezone(String),
    Invalid(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError(e) => write!(f, "IO error: {e}"),
            ConfigError::ParseError(e) => write!(f, "Parse error: {e}"),
            ConfigError::SerializeError(e) => write!(f, "Serialize error: {e}"),
            ConfigError::InvalidTimezone(tz) => write!(f, "Unknown timezone: {tz}"),
            ConfigError::Invalid(e) => write!(f, "Invalid configuration: {e}"),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Serde support for Duration.
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
