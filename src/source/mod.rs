//! Telemetry source access.
//!
//! This module provides:
//! - The snapshot and wire types of the `/v2/monitor` endpoint
//! - The `SnapshotSource` seam and its HTTP implementation

pub mod fetcher;
pub mod types;

// Re-export commonly used types
pub use fetcher::{FetchError, HttpSource, SnapshotSource, SourceConfig};
pub use types::{
    MonitorResponse, SensorName, SensorReading, ShapeError, Snapshot, SubjectId, SubjectProfile,
    MAX_SENSOR_VALUE, SENSOR_COUNT,
};
