//! Per-subject history buffer and anomaly log.
//!
//! Each subject owns two record logs behind their own `RwLock`. The poller
//! is the only writer; an append (and any eviction it causes) happens under
//! a single write guard, so readers see the log either before or after it.

use crate::core::record::PersistedRecord;
use crate::source::SubjectId;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Default number of records kept per subject (about ten minutes at 1 Hz).
pub const DEFAULT_HISTORY_CAPACITY: usize = 610;

/// Which of a subject's two logs to address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    History,
    Anomaly,
}

impl StoreKind {
    pub const ALL: [StoreKind; 2] = [StoreKind::History, StoreKind::Anomaly];

    pub fn as_str(&self) -> &'static str {
        match self {
            StoreKind::History => "history",
            StoreKind::Anomaly => "anomaly",
        }
    }
}

impl fmt::Display for StoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StoreKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "history" => Ok(StoreKind::History),
            "anomaly" | "anomalies" => Ok(StoreKind::Anomaly),
            other => Err(format!(
                "unknown store '{other}' (expected history or anomaly)"
            )),
        }
    }
}

/// How long anomaly records are kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "policy", content = "limit")]
pub enum AnomalyRetention {
    /// Never evict; the log is a permanent audit trail
    #[default]
    Unbounded,
    /// Keep only the newest `n` anomaly records
    MaxEntries(usize),
}

impl AnomalyRetention {
    fn capacity(&self) -> Option<usize> {
        match self {
            AnomalyRetention::Unbounded => None,
            AnomalyRetention::MaxEntries(n) => Some((*n).max(1)),
        }
    }
}

/// Store error types.
#[derive(Debug)]
pub enum StoreError {
    /// Backing file could not be read or written
    Io(String),
    /// Persisted record could not be parsed
    Parse(String),
    /// Record offered to the anomaly log has no flagged reading
    NotAnomalous(SubjectId),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Io(e) => write!(f, "Store IO error: {e}"),
            StoreError::Parse(e) => write!(f, "Store parse error: {e}"),
            StoreError::NotAnomalous(id) => {
                write!(f, "Record for subject {id} has no anomalous reading")
            }
        }
    }
}

impl std::error::Error for StoreError {}

/// Insertion-ordered record log with optional drop-oldest capacity.
#[derive(Debug)]
struct RecordLog {
    records: VecDeque<PersistedRecord>,
    capacity: Option<usize>,
}

impl RecordLog {
    fn new(capacity: Option<usize>) -> Self {
        Self {
            records: VecDeque::new(),
            capacity,
        }
    }

    fn push(&mut self, record: PersistedRecord) {
        self.records.push_back(record);
        if let Some(cap) = self.capacity {
            while self.records.len() > cap {
                self.records.pop_front();
            }
        }
    }
}

/// Both logs of one subject.
#[derive(Debug)]
struct SubjectLogs {
    history: RwLock<RecordLog>,
    anomalies: RwLock<RecordLog>,
}

impl SubjectLogs {
    fn log(&self, kind: StoreKind) -> &RwLock<RecordLog> {
        match kind {
            StoreKind::History => &self.history,
            StoreKind::Anomaly => &self.anomalies,
        }
    }
}

/// What an ingest did with a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestOutcome {
    pub subject_id: SubjectId,
    /// The record was also appended to the anomaly log
    pub anomaly: bool,
}

/// Concurrent store of every subject's history and anomaly logs.
#[derive(Debug)]
pub struct TelemetryStore {
    subjects: RwLock<HashMap<SubjectId, Arc<SubjectLogs>>>,
    history_capacity: usize,
    anomaly_retention: AnomalyRetention,
}

impl TelemetryStore {
    /// Create an empty store.
    ///
    /// Each log keeps at least its newest record, so a capacity or anomaly
    /// limit of 0 is treated as 1.
    pub fn new(history_capacity: usize, anomaly_retention: AnomalyRetention) -> Self {
        Self {
            subjects: RwLock::new(HashMap::new()),
            history_capacity: history_capacity.max(1),
            anomaly_retention,
        }
    }

    pub fn history_capacity(&self) -> usize {
        self.history_capacity
    }

    pub fn anomaly_retention(&self) -> AnomalyRetention {
        self.anomaly_retention
    }

    /// Store a freshly normalized record: always into history, and into the
    /// anomaly log when the source flagged any reading.
    pub fn ingest(&self, record: PersistedRecord) -> IngestOutcome {
        let subject_id = record.subject_id();
        let anomaly = record.has_anomaly();
        let logs = self.logs_or_create(subject_id);

        if anomaly {
            write_guard(&logs.history).push(record.clone());
            write_guard(&logs.anomalies).push(record);
        } else {
            write_guard(&logs.history).push(record);
        }

        IngestOutcome {
            subject_id,
            anomaly,
        }
    }

    /// Append to one log. The anomaly log only accepts flagged records.
    pub fn append(&self, kind: StoreKind, record: PersistedRecord) -> Result<(), StoreError> {
        if kind == StoreKind::Anomaly && !record.has_anomaly() {
            return Err(StoreError::NotAnomalous(record.subject_id()));
        }
        let logs = self.logs_or_create(record.subject_id());
        write_guard(logs.log(kind)).push(record);
        Ok(())
    }

    /// Copy of a log's contents, oldest first. Empty for unknown subjects.
    pub fn read_all(&self, subject_id: SubjectId, kind: StoreKind) -> Vec<PersistedRecord> {
        self.logs(subject_id)
            .map(|logs| read_guard(logs.log(kind)).records.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Most recently appended record of a log.
    pub fn read_latest(&self, subject_id: SubjectId, kind: StoreKind) -> Option<PersistedRecord> {
        self.logs(subject_id)
            .and_then(|logs| read_guard(logs.log(kind)).records.back().cloned())
    }

    /// Current number of records in a log.
    pub fn len(&self, subject_id: SubjectId, kind: StoreKind) -> usize {
        self.logs(subject_id)
            .map(|logs| read_guard(logs.log(kind)).records.len())
            .unwrap_or(0)
    }

    /// Whether no subject has been written yet.
    pub fn is_empty(&self) -> bool {
        read_guard(&self.subjects).is_empty()
    }

    /// Subjects that have at least been written once, ascending.
    pub fn subjects(&self) -> Vec<SubjectId> {
        let mut ids: Vec<SubjectId> = read_guard(&self.subjects).keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    fn logs(&self, subject_id: SubjectId) -> Option<Arc<SubjectLogs>> {
        read_guard(&self.subjects).get(&subject_id).cloned()
    }

    fn logs_or_create(&self, subject_id: SubjectId) -> Arc<SubjectLogs> {
        if let Some(logs) = self.logs(subject_id) {
            return logs;
        }
        write_guard(&self.subjects)
            .entry(subject_id)
            .or_insert_with(|| {
                Arc::new(SubjectLogs {
                    history: RwLock::new(RecordLog::new(Some(self.history_capacity))),
                    anomalies: RwLock::new(RecordLog::new(self.anomaly_retention.capacity())),
                })
            })
            .clone()
    }
}

impl Default for TelemetryStore {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY, AnomalyRetention::Unbounded)
    }
}

// A panicking reader cannot leave a log half-written, so poisoned locks are
// still safe to use.
fn read_guard<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write_guard<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

/// Thread-safe shared store.
pub type SharedStore = Arc<TelemetryStore>;
