//! Snapshot types for the telemetry source.
//!
//! The wire types mirror the `/v2/monitor/{id}` payload one to one. The
//! domain types (`SensorReading`, `Snapshot`) are only produced after the
//! payload has been checked for the expected six-sensor shape.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Small integer identifying a monitored person.
pub type SubjectId = u32;

/// Number of pressure sensors in one snapshot (three per foot).
pub const SENSOR_COUNT: usize = 6;

/// Upper bound of a pressure reading as reported by the source.
pub const MAX_SENSOR_VALUE: u16 = 1100;

/// Position of a pressure sensor on the left or right foot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SensorName {
    L0,
    L1,
    L2,
    R0,
    R1,
    R2,
}

impl SensorName {
    /// All sensor names in table column order.
    pub const ALL: [SensorName; SENSOR_COUNT] = [
        SensorName::L0,
        SensorName::L1,
        SensorName::L2,
        SensorName::R0,
        SensorName::R1,
        SensorName::R2,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SensorName::L0 => "L0",
            SensorName::L1 => "L1",
            SensorName::L2 => "L2",
            SensorName::R0 => "R0",
            SensorName::R1 => "R1",
            SensorName::R2 => "R2",
        }
    }

    /// Column index of this sensor in `ALL`.
    pub fn index(&self) -> usize {
        *self as usize
    }
}

impl fmt::Display for SensorName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SensorName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SensorName::ALL
            .iter()
            .copied()
            .find(|name| name.as_str() == s)
            .ok_or_else(|| format!("unknown sensor name '{s}'"))
    }
}

/// One pressure sensor sample.
///
/// `anomaly` is whatever the source said; it is never derived locally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SensorReading {
    pub id: u32,
    pub name: SensorName,
    pub value: u16,
    pub anomaly: bool,
}

/// All six readings of one subject at one instant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub subject_id: SubjectId,
    pub sensors: [SensorReading; SENSOR_COUNT],
}

impl Snapshot {
    /// Build a snapshot from a decoded trace, enforcing the expected shape.
    ///
    /// The trace must hold exactly six readings, one per sensor name, with
    /// values in `0..=1100`. Source order is preserved.
    pub fn from_trace(subject_id: SubjectId, trace: WireTrace) -> Result<Self, ShapeError> {
        if trace.sensors.len() != SENSOR_COUNT {
            return Err(ShapeError::SensorCount(trace.sensors.len()));
        }

        let mut seen = [false; SENSOR_COUNT];
        let mut readings = Vec::with_capacity(SENSOR_COUNT);
        for wire in trace.sensors {
            let name: SensorName = wire.name.parse().map_err(ShapeError::UnknownSensor)?;
            if std::mem::replace(&mut seen[name.index()], true) {
                return Err(ShapeError::DuplicateSensor(name));
            }
            let value = u16::try_from(wire.value)
                .ok()
                .filter(|v| *v <= MAX_SENSOR_VALUE)
                .ok_or(ShapeError::ValueOutOfRange {
                    sensor: name,
                    value: wire.value,
                })?;
            readings.push(SensorReading {
                id: wire.id,
                name,
                value,
                anomaly: wire.anomaly,
            });
        }

        let sensors = <[SensorReading; SENSOR_COUNT]>::try_from(readings)
            .map_err(|v| ShapeError::SensorCount(v.len()))?;

        Ok(Self {
            subject_id,
            sensors,
        })
    }

    /// Whether the source flagged at least one reading.
    pub fn has_anomaly(&self) -> bool {
        self.sensors.iter().any(|s| s.anomaly)
    }

    /// Look up a reading by sensor name.
    pub fn reading(&self, name: SensorName) -> Option<&SensorReading> {
        self.sensors.iter().find(|s| s.name == name)
    }
}

/// Reasons a decoded payload does not have the six-sensor shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShapeError {
    SensorCount(usize),
    UnknownSensor(String),
    DuplicateSensor(SensorName),
    ValueOutOfRange { sensor: SensorName, value: i64 },
}

impl fmt::Display for ShapeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShapeError::SensorCount(n) => {
                write!(f, "expected {SENSOR_COUNT} sensors, got {n}")
            }
            ShapeError::UnknownSensor(e) => write!(f, "{e}"),
            ShapeError::DuplicateSensor(name) => write!(f, "sensor {name} reported twice"),
            ShapeError::ValueOutOfRange { sensor, value } => {
                write!(
                    f,
                    "sensor {sensor} value {value} outside 0..={MAX_SENSOR_VALUE}"
                )
            }
        }
    }
}

impl std::error::Error for ShapeError {}

// ============================================================================
// Wire format of GET /v2/monitor/{id}
// ============================================================================

/// Full monitor response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorResponse {
    pub firstname: String,
    pub lastname: String,
    #[serde(default)]
    pub birthdate: Option<String>,
    #[serde(default)]
    pub disabled: bool,
    pub trace: WireTrace,
}

/// The `trace` object holding the sensor array.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireTrace {
    pub sensors: Vec<WireSensor>,
}

/// One sensor as sent by the source, before range and name checks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireSensor {
    pub id: u32,
    pub name: String,
    pub value: i64,
    #[serde(default)]
    pub anomaly: bool,
}

/// Person details shown next to the charts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectProfile {
    pub id: SubjectId,
    pub firstname: String,
    pub lastname: String,
    pub birthdate: Option<String>,
    pub disabled: bool,
}

impl SubjectProfile {
    pub fn from_response(id: SubjectId, response: &MonitorResponse) -> Self {
        Self {
            id,
            firstname: response.firstname.clone(),
            lastname: response.lastname.clone(),
            birthdate: response.birthdate.clone(),
            disabled: response.disabled,
        }
    }

    /// `firstname lastname`, as used in the subject selector.
    pub fn display_name(&self) -> String {
        format!("{} {}", self.firstname, self.lastname)
    }
}
