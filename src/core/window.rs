//! Time-window queries over the record logs.
//!
//! A window is the closed interval `[now - duration, now]`. The duration is
//! always chosen by the caller; when it exceeds what the history buffer still
//! holds, the result is simply shorter.

use crate::core::record::PersistedRecord;
use crate::core::store::{StoreKind, TelemetryStore};
use crate::source::{SensorName, SubjectId};
use chrono::{DateTime, Duration, FixedOffset};
use serde::{Deserialize, Serialize};

/// Lookback lengths used by the dashboard views.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowPreset {
    /// Live sensor chart
    TwoMinutes,
    FiveMinutes,
    /// Whole history buffer at 1 Hz
    TenMinutes,
}

impl WindowPreset {
    pub fn duration(&self) -> Duration {
        match self {
            WindowPreset::TwoMinutes => Duration::minutes(2),
            WindowPreset::FiveMinutes => Duration::minutes(5),
            WindowPreset::TenMinutes => Duration::minutes(10),
        }
    }
}

/// Whether `timestamp` lies in `[now - duration, now]`.
pub fn in_window(
    timestamp: &DateTime<FixedOffset>,
    duration: Duration,
    now: &DateTime<FixedOffset>,
) -> bool {
    let start = *now - duration;
    *timestamp >= start && timestamp <= now
}

/// Keep the records inside the window, preserving their order.
pub fn filter_window<I>(
    records: I,
    duration: Duration,
    now: &DateTime<FixedOffset>,
) -> Vec<PersistedRecord>
where
    I: IntoIterator<Item = PersistedRecord>,
{
    records
        .into_iter()
        .filter(|r| in_window(&r.timestamp, duration, now))
        .collect()
}

/// Records of one subject's log captured within `duration` before `now`.
pub fn window(
    store: &TelemetryStore,
    subject_id: SubjectId,
    kind: StoreKind,
    duration: Duration,
    now: &DateTime<FixedOffset>,
) -> Vec<PersistedRecord> {
    filter_window(store.read_all(subject_id, kind), duration, now)
}

/// One sensor value at one instant, ready for a line chart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeriesPoint {
    pub timestamp: DateTime<FixedOffset>,
    pub sensor: SensorName,
    pub value: u16,
}

/// Explode each record into one point per sensor, in record then sensor order.
pub fn flatten_to_series(records: &[PersistedRecord]) -> Vec<SeriesPoint> {
    records
        .iter()
        .flat_map(|record| {
            record.snapshot.sensors.iter().map(move |s| SeriesPoint {
                timestamp: record.timestamp,
                sensor: s.name,
                value: s.value,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::record::test_support::record_at;

    #[test]
    fn test_window_keeps_recent_records() {
        let store = TelemetryStore::default();
        let t = 1_000;
        store.ingest(record_at(1, t - 180, false));
        store.ingest(record_at(1, t - 60, false));
        store.ingest(record_at(1, t - 10, false));

        let now = record_at(1, t, false).timestamp;
        let result = window(&store, 1, StoreKind::History, Duration::seconds(120), &now);

        assert_eq!(
            result,
            vec![record_at(1, t - 60, false), record_at(1, t - 10, false)]
        );
    }

    #[test]
    fn test_window_bounds_are_inclusive() {
        let now = record_at(1, 500, false).timestamp;
        let records = vec![
            record_at(1, 379, false),
            record_at(1, 380, false),
            record_at(1, 500, false),
            record_at(1, 501, false),
        ];
        let result = filter_window(records, Duration::seconds(120), &now);
        assert_eq!(
            result,
            vec![record_at(1, 380, false), record_at(1, 500, false)]
        );
    }

    #[test]
    fn test_window_is_ordered_subsequence_of_read_all() {
        let store = TelemetryStore::default();
        for secs in 0..900 {
            store.ingest(record_at(2, secs, secs % 11 == 0));
        }
        let now = record_at(2, 899, false).timestamp;
        let all = store.read_all(2, StoreKind::History);

        for preset in [
            WindowPreset::TwoMinutes,
            WindowPreset::FiveMinutes,
            WindowPreset::TenMinutes,
        ] {
            let result = window(&store, 2, StoreKind::History, preset.duration(), &now);
            let expected: Vec<_> = all
                .iter()
                .filter(|r| in_window(&r.timestamp, preset.duration(), &now))
                .cloned()
                .collect();
            assert_eq!(result, expected);
        }
    }

    #[test]
    fn test_window_longer_than_retention_is_truncated() {
        let store = TelemetryStore::default();
        for secs in 0..1_000 {
            store.ingest(record_at(3, secs, false));
        }
        let now = record_at(3, 999, false).timestamp;
        let result = window(&store, 3, StoreKind::History, Duration::hours(1), &now);
        assert_eq!(result.len(), 610);
    }

    #[test]
    fn test_window_over_anomaly_log() {
        let store = TelemetryStore::default();
        store.ingest(record_at(1, 0, true));
        store.ingest(record_at(1, 200, true));
        store.ingest(record_at(1, 290, false));

        let now = record_at(1, 300, false).timestamp;
        let result = window(&store, 1, StoreKind::Anomaly, Duration::minutes(2), &now);
        assert_eq!(result, vec![record_at(1, 200, true)]);
    }

    #[test]
    fn test_flatten_to_series() {
        let records = vec![record_at(1, 5, false), record_at(1, 6, true)];
        let series = flatten_to_series(&records);

        assert_eq!(series.len(), 12);
        assert_eq!(series[0].sensor, SensorName::L0);
        assert_eq!(series[0].value, 5);
        assert_eq!(series[5].sensor, SensorName::R2);
        assert_eq!(series[6].timestamp, records[1].timestamp);
        assert_eq!(series[11].value, 6);
    }
}
