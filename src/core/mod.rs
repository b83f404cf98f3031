//! Core ingestion storage for the pressure monitor.
//!
//! This module contains:
//! - Timestamped records and the timestamper that builds them
//! - The per-subject history buffer and anomaly log
//! - Time-window queries and series flattening

pub mod record;
pub mod store;
pub mod window;

// Re-export commonly used types
pub use record::{zoned, Clock, PersistedRecord, SystemClock, Timestamper, DEFAULT_TIMEZONE};
pub use store::{
    AnomalyRetention, IngestOutcome, SharedStore, StoreError, StoreKind, TelemetryStore,
    DEFAULT_HISTORY_CAPACITY,
};
pub use window::{filter_window, flatten_to_series, in_window, window, SeriesPoint, WindowPreset};
