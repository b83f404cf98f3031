//! Ingest counters.
//!
//! Tracks what the poller has done (rounds, fetch outcomes, stored records)
//! with lock-free counters so readers never block it. Counters can resume
//! from `ingest_stats.json`, which makes them cumulative across restarts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Cumulative counters as stored in `ingest_stats.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedCounters {
    pub rounds_completed: u64,
    pub fetches_succeeded: u64,
    pub fetches_failed: u64,
    #[serde(default)]
    pub malformed_snapshots: u64,
    pub anomalies_stored: u64,
    pub last_updated: DateTime<Utc>,
}

/// Read a saved counters file without attaching it to live stats.
pub fn read_counters(path: &Path) -> io::Result<PersistedCounters> {
    let content = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

/// Live ingest counters shared by the poller, the read API and the CLI.
#[derive(Debug)]
pub struct IngestStats {
    rounds_completed: AtomicU64,
    fetches_succeeded: AtomicU64,
    /// Every failed fetch, malformed or not
    fetches_failed: AtomicU64,
    malformed_snapshots: AtomicU64,
    anomalies_stored: AtomicU64,
    started_at: DateTime<Utc>,
    persist_path: Option<PathBuf>,
}

impl IngestStats {
    /// Counters starting at zero, kept in memory only.
    pub fn new() -> Self {
        Self::resume(None, None)
    }

    /// Counters that continue from `path` (if it exists) and save back to it.
    pub fn with_persistence(path: PathBuf) -> Self {
        let previous = match read_counters(&path) {
            Ok(counters) => Some(counters),
            Err(e) if e.kind() == io::ErrorKind::NotFound => None,
            Err(e) => {
                tracing::warn!("Could not load previous ingest stats from {path:?}: {e}");
                None
            }
        };
        Self::resume(previous.as_ref(), Some(path))
    }

    fn resume(previous: Option<&PersistedCounters>, persist_path: Option<PathBuf>) -> Self {
        let start = |field: fn(&PersistedCounters) -> u64| {
            AtomicU64::new(previous.map(field).unwrap_or(0))
        };
        Self {
            rounds_completed: start(|c| c.rounds_completed),
            fetches_succeeded: start(|c| c.fetches_succeeded),
            fetches_failed: start(|c| c.fetches_failed),
            malformed_snapshots: start(|c| c.malformed_snapshots),
            anomalies_stored: start(|c| c.anomalies_stored),
            started_at: Utc::now(),
            persist_path,
        }
    }

    pub fn record_round(&self) {
        self.rounds_completed.fetch_add(1, Ordering::Relaxed);
    }

    /// A snapshot was stored; `anomaly` if it also went to the anomaly log.
    pub fn record_stored(&self, anomaly: bool) {
        self.fetches_succeeded.fetch_add(1, Ordering::Relaxed);
        if anomaly {
            self.anomalies_stored.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_failure(&self, malformed: bool) {
        self.fetches_failed.fetch_add(1, Ordering::Relaxed);
        if malformed {
            self.malformed_snapshots.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Current counter values, stamped now.
    pub fn counters(&self) -> PersistedCounters {
        PersistedCounters {
            rounds_completed: self.rounds_completed.load(Ordering::Relaxed),
            fetches_succeeded: self.fetches_succeeded.load(Ordering::Relaxed),
            fetches_failed: self.fetches_failed.load(Ordering::Relaxed),
            malformed_snapshots: self.malformed_snapshots.load(Ordering::Relaxed),
            anomalies_stored: self.anomalies_stored.load(Ordering::Relaxed),
            last_updated: Utc::now(),
        }
    }

    /// Counters plus process uptime, as served by `/stats`.
    pub fn snapshot(&self) -> IngestSnapshot {
        let counters = self.counters();
        IngestSnapshot {
            rounds_completed: counters.rounds_completed,
            fetches_succeeded: counters.fetches_succeeded,
            fetches_failed: counters.fetches_failed,
            malformed_snapshots: counters.malformed_snapshots,
            anomalies_stored: counters.anomalies_stored,
            started_at: self.started_at,
            uptime_secs: (counters.last_updated - self.started_at)
                .num_seconds()
                .max(0) as u64,
        }
    }

    pub fn summary(&self) -> String {
        let stats = self.snapshot();
        format!(
            "Ingest Statistics:\n\
             - Rounds completed: {}\n\
             - Snapshots stored: {}\n\
             - Fetches failed: {} ({} malformed)\n\
             - Anomaly records: {}\n\
             - Uptime: {} seconds",
            stats.rounds_completed,
            stats.fetches_succeeded,
            stats.fetches_failed,
            stats.malformed_snapshots,
            stats.anomalies_stored,
            stats.uptime_secs
        )
    }

    /// Write the counters to the persistence file, if one is attached.
    pub fn save(&self) -> io::Result<()> {
        let Some(path) = &self.persist_path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(&self.counters())?;
        std::fs::write(path, json)
    }
}

impl Default for IngestStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time view of the counters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestSnapshot {
    pub rounds_completed: u64,
    pub fetches_succeeded: u64,
    pub fetches_failed: u64,
    pub malformed_snapshots: u64,
    pub anomalies_stored: u64,
    pub started_at: DateTime<Utc>,
    pub uptime_secs: u64,
}

pub type SharedIngestStats = Arc<IngestStats>;

pub fn create_shared_stats() -> SharedIngestStats {
    Arc::new(IngestStats::new())
}

pub fn create_shared_stats_with_persistence(path: PathBuf) -> SharedIngestStats {
    Arc::new(IngestStats::with_persistence(path))
}
