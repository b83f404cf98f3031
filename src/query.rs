//! Read API for dashboard consumers.
//!
//! Everything here is a read against the stores; nothing blocks on the
//! poller or the network except `list_subjects` and `subject_profile`, which
//! ask the telemetry source directly. Reads of unknown subjects return empty
//! results rather than errors so a view always has something to render.

use crate::core::{
    filter_window, flatten_to_series, PersistedRecord, SeriesPoint, SharedStore, StoreKind,
    Timestamper,
};
use crate::source::{SensorName, SnapshotSource, SubjectId, SubjectProfile, MAX_SENSOR_VALUE};
use chrono::{DateTime, Duration, FixedOffset};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// One sensor of the latest snapshot, for the live pressure display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LivePoint {
    pub id: u32,
    pub name: SensorName,
    pub value: u16,
}

/// One table row: capture time plus one column per sensor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableRow {
    pub timestamp: DateTime<FixedOffset>,
    #[serde(rename = "L0")]
    pub l0: u16,
    #[serde(rename = "L1")]
    pub l1: u16,
    #[serde(rename = "L2")]
    pub l2: u16,
    #[serde(rename = "R0")]
    pub r0: u16,
    #[serde(rename = "R1")]
    pub r1: u16,
    #[serde(rename = "R2")]
    pub r2: u16,
}

impl TableRow {
    pub fn from_record(record: &PersistedRecord) -> Self {
        let mut values = [0u16; 6];
        for reading in &record.snapshot.sensors {
            values[reading.name.index()] = reading.value;
        }
        let [l0, l1, l2, r0, r1, r2] = values;
        Self {
            timestamp: record.timestamp,
            l0,
            l1,
            l2,
            r0,
            r1,
            r2,
        }
    }

    /// Value of one sensor column.
    pub fn value(&self, name: SensorName) -> u16 {
        match name {
            SensorName::L0 => self.l0,
            SensorName::L1 => self.l1,
            SensorName::L2 => self.l2,
            SensorName::R0 => self.r0,
            SensorName::R1 => self.r1,
            SensorName::R2 => self.r2,
        }
    }
}

/// Entry of the subject selector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectEntry {
    pub id: SubjectId,
    pub display_name: String,
}

/// A consumer's own "refresh paused" switch.
///
/// Each view owns one and passes it into the gated reads; the store has no
/// notion of pausing.
#[derive(Debug, Default)]
pub struct RefreshGate {
    paused: AtomicBool,
}

impl RefreshGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Relaxed)
    }

    pub fn set_paused(&self, paused: bool) {
        self.paused.store(paused, Ordering::Relaxed);
    }

    /// Flip the switch and return the new paused state.
    pub fn toggle(&self) -> bool {
        !self.paused.fetch_xor(true, Ordering::Relaxed)
    }
}

/// Result of a gated read.
#[derive(Debug, Clone, PartialEq)]
pub enum Refresh<T> {
    /// Fresh data
    Updated(T),
    /// The consumer is paused; keep showing what it has
    Unchanged,
}

impl<T> Refresh<T> {
    pub fn updated(self) -> Option<T> {
        match self {
            Refresh::Updated(value) => Some(value),
            Refresh::Unchanged => None,
        }
    }
}

/// Query front-end over the shared store.
#[derive(Clone)]
pub struct TelemetryQuery {
    store: SharedStore,
    timestamper: Arc<Timestamper>,
}

impl TelemetryQuery {
    pub fn new(store: SharedStore, timestamper: Arc<Timestamper>) -> Self {
        Self { store, timestamper }
    }

    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    /// Current instant in the reference zone.
    pub fn now(&self) -> DateTime<FixedOffset> {
        self.timestamper.now()
    }

    /// Sensors of the most recent snapshot, or empty if none yet.
    pub fn get_latest(&self, subject_id: SubjectId) -> Vec<LivePoint> {
        self.store
            .read_latest(subject_id, StoreKind::History)
            .map(|record| {
                record
                    .snapshot
                    .sensors
                    .iter()
                    .map(|s| LivePoint {
                        id: s.id,
                        name: s.name,
                        value: s.value,
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Records of one log within `duration` of now.
    pub fn window_records(
        &self,
        subject_id: SubjectId,
        kind: StoreKind,
        duration: Duration,
    ) -> Vec<PersistedRecord> {
        self.window_records_at(subject_id, kind, duration, &self.now())
    }

    /// Records within `duration` of an explicit `now`.
    pub fn window_records_at(
        &self,
        subject_id: SubjectId,
        kind: StoreKind,
        duration: Duration,
        now: &DateTime<FixedOffset>,
    ) -> Vec<PersistedRecord> {
        filter_window(self.store.read_all(subject_id, kind), duration, now)
    }

    /// Per-sensor time series of the history within `duration` of now.
    pub fn get_window(&self, subject_id: SubjectId, duration: Duration) -> Vec<SeriesPoint> {
        self.get_window_at(subject_id, StoreKind::History, duration, &self.now())
    }

    /// Per-sensor time series of one log within `duration` of `now`.
    pub fn get_window_at(
        &self,
        subject_id: SubjectId,
        kind: StoreKind,
        duration: Duration,
        now: &DateTime<FixedOffset>,
    ) -> Vec<SeriesPoint> {
        flatten_to_series(&self.window_records_at(subject_id, kind, duration, now))
    }

    /// Capture times of anomalies within `duration` of now, for chart markers.
    pub fn anomaly_markers(
        &self,
        subject_id: SubjectId,
        duration: Duration,
    ) -> Vec<DateTime<FixedOffset>> {
        self.anomaly_markers_at(subject_id, duration, &self.now())
    }

    pub fn anomaly_markers_at(
        &self,
        subject_id: SubjectId,
        duration: Duration,
        now: &DateTime<FixedOffset>,
    ) -> Vec<DateTime<FixedOffset>> {
        self.window_records_at(subject_id, StoreKind::Anomaly, duration, now)
            .into_iter()
            .map(|r| r.timestamp)
            .collect()
    }

    /// All rows of one log, newest first.
    pub fn get_table_rows(&self, subject_id: SubjectId, kind: StoreKind) -> Vec<TableRow> {
        let mut rows: Vec<TableRow> = self
            .store
            .read_all(subject_id, kind)
            .iter()
            .rev()
            .map(TableRow::from_record)
            .collect();
        // Stable: equal timestamps stay newest-arrival first.
        rows.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        rows
    }

    /// The newest history row, for consumers that prepend incrementally.
    pub fn get_latest_row(&self, subject_id: SubjectId) -> Option<TableRow> {
        self.store
            .read_latest(subject_id, StoreKind::History)
            .map(|r| TableRow::from_record(&r))
    }

    /// `get_table_rows` unless the consumer has paused refreshing.
    pub fn refresh_table_rows(
        &self,
        subject_id: SubjectId,
        kind: StoreKind,
        gate: &RefreshGate,
    ) -> Refresh<Vec<TableRow>> {
        if gate.is_paused() {
            return Refresh::Unchanged;
        }
        Refresh::Updated(self.get_table_rows(subject_id, kind))
    }

    /// `get_latest_row` unless the consumer has paused refreshing.
    pub fn refresh_latest_row(
        &self,
        subject_id: SubjectId,
        gate: &RefreshGate,
    ) -> Refresh<Option<TableRow>> {
        if gate.is_paused() {
            return Refresh::Unchanged;
        }
        Refresh::Updated(self.get_latest_row(subject_id))
    }
}

/// Probe the source for each ID and list the ones that answer.
pub async fn list_subjects<S>(source: &S, ids: &[SubjectId]) -> Vec<SubjectEntry>
where
    S: SnapshotSource + ?Sized,
{
    let mut entries = Vec::new();
    for &id in ids {
        match source.fetch_profile(id).await {
            Ok(profile) => entries.push(SubjectEntry {
                id,
                display_name: profile.display_name(),
            }),
            Err(e) => tracing::debug!("Subject {id} not listed: {e}"),
        }
    }
    entries
}

/// Person details of one subject, if the source knows them.
pub async fn subject_profile<S>(source: &S, id: SubjectId) -> Option<SubjectProfile>
where
    S: SnapshotSource + ?Sized,
{
    match source.fetch_profile(id).await {
        Ok(profile) => Some(profile),
        Err(e) => {
            tracing::warn!("Failed to load details of subject {id}: {e}");
            None
        }
    }
}

/// Cell shade for a pressure value: green at 0 through red at the maximum.
pub fn value_color(value: u16) -> String {
    let max = f64::from(MAX_SENSOR_VALUE);
    let ratio = f64::from(value.min(MAX_SENSOR_VALUE)) / max;
    let hue = (1.0 - ratio) * 120.0;
    format!("hsl({hue}, 100%, 50%)")
}
