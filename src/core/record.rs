//! Timestamped records, the unit of storage.
//!
//! A fetched `Snapshot` is paired with its capture instant, expressed in the
//! deployment's reference timezone. The zone is resolved once here; every
//! later comparison works on the stored offset-qualified instant.

use crate::source::{Snapshot, SubjectId};
use chrono::{DateTime, FixedOffset, TimeZone, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::sync::{Mutex, PoisonError};

/// Default reference timezone of the deployment.
pub const DEFAULT_TIMEZONE: Tz = chrono_tz::Europe::Warsaw;

/// A snapshot with its capture time. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedRecord {
    /// Capture instant with the reference zone's offset at that instant
    pub timestamp: DateTime<FixedOffset>,
    /// The sampled readings
    #[serde(rename = "data")]
    pub snapshot: Snapshot,
}

impl PersistedRecord {
    pub fn new(timestamp: DateTime<FixedOffset>, snapshot: Snapshot) -> Self {
        Self {
            timestamp,
            snapshot,
        }
    }

    pub fn subject_id(&self) -> SubjectId {
        self.snapshot.subject_id
    }

    pub fn has_anomaly(&self) -> bool {
        self.snapshot.has_anomaly()
    }
}

/// Source of the current instant.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Convert a UTC instant into the reference zone, keeping only the offset.
pub fn zoned(instant: DateTime<Utc>, tz: &Tz) -> DateTime<FixedOffset> {
    tz.from_utc_datetime(&instant.naive_utc()).fixed_offset()
}

/// Stamps snapshots with the current time in a fixed timezone.
///
/// Successive stamps never go backwards, even if the wall clock does.
pub struct Timestamper {
    tz: Tz,
    clock: Box<dyn Clock>,
    last: Mutex<Option<DateTime<Utc>>>,
}

impl Timestamper {
    /// Create a timestamper reading the system clock.
    pub fn new(tz: Tz) -> Self {
        Self::with_clock(tz, SystemClock)
    }

    /// Create a timestamper with a custom clock.
    pub fn with_clock(tz: Tz, clock: impl Clock + 'static) -> Self {
        Self {
            tz,
            clock: Box::new(clock),
            last: Mutex::new(None),
        }
    }

    pub fn timezone(&self) -> Tz {
        self.tz
    }

    /// The current instant in the reference zone.
    pub fn now(&self) -> DateTime<FixedOffset> {
        zoned(self.clock.now(), &self.tz)
    }

    /// Pair a snapshot with its capture time.
    pub fn normalize(&self, snapshot: Snapshot) -> PersistedRecord {
        let now = self.clock.now();
        let stamped = {
            let mut last = self.last.lock().unwrap_or_else(PoisonError::into_inner);
            let stamped = match *last {
                Some(prev) if prev > now => prev,
                _ => now,
            };
            *last = Some(stamped);
            stamped
        };

        PersistedRecord::new(zoned(stamped, &self.tz), snapshot)
    }
}

impl Default for Timestamper {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEZONE)
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;

    #[test]
    fn test_zoned_uses_warsaw_offset() {
        // 1 March is winter time (UTC+1), 1 July is summer time (UTC+2).
        let winter = zoned(base_time(), &DEFAULT_TIMEZONE);
        assert_eq!(winter.offset().local_minus_utc(), 3600);

        let summer = zoned(
            Utc.with_ymd_and_hms(2024, 7, 1, 12, 0, 0).unwrap(),
            &DEFAULT_TIMEZONE,
        );
        assert_eq!(summer.offset().local_minus_utc(), 7200);
        assert_eq!(summer.with_timezone(&Utc).timestamp(), 1_719_835_200);
    }

    #[test]
    fn test_normalize_never_goes_backwards() {
        let clock = ManualClock::new(base_time());
        let stamper = Timestamper::with_clock(DEFAULT_TIMEZONE, clock.clone());

        let first = stamper.normalize(snapshot(1, 10, false));
        clock.set(base_time() - chrono::Duration::seconds(5));
        let second = stamper.normalize(snapshot(1, 20, false));

        assert!(second.timestamp >= first.timestamp);
        assert_eq!(second.snapshot.sensors[0].value, 20);
    }

    #[test]
    fn test_record_serialization_round_trip() {
        let record = record_at(3, 42, true);
        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains("\"timestamp\""));
        assert!(json.contains("\"data\""));

        let decoded: PersistedRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, record);
        assert_eq!(decoded.timestamp.offset(), record.timestamp.offset());
        assert_eq!(decoded.snapshot.sensors, record.snapshot.sensors);
    }
}
