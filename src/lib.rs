//! Pressure Monitor - foot-pressure telemetry ingestion and storage.
//!
//! This library polls a telemetry source for each monitored subject, keeps a
//! bounded recent history plus an anomaly log per subject, and answers
//! time-windowed queries for charts, tables and live displays.
//!
//! # Guarantees
//!
//! - **Bounded history**: each subject keeps at most `history_capacity`
//!   records (610 by default); the oldest is dropped first
//! - **Source-flagged anomalies**: a record enters the anomaly log if and only
//!   if the source flagged one of its readings
//! - **Atomic appends**: readers observe a log before or after an append,
//!   never in between
//! - **Resilient polling**: a failing subject is skipped for one round; the
//!   poller itself never stops on source errors
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                       Pressure Monitor                        │
//! ├──────────────────────────────────────────────────────────────┤
//! │  ┌─────────────┐   ┌─────────────┐   ┌────────────────────┐  │
//! │  │   Source    │──▶│ Timestamper │──▶│  TelemetryStore    │  │
//! │  │  (HTTP GET) │   │ (zoned time)│   │ history │ anomalies│  │
//! │  └─────────────┘   └─────────────┘   └────────────────────┘  │
//! │         ▲                                     │              │
//! │         │ every round                         ▼              │
//! │  ┌─────────────┐                     ┌────────────────────┐  │
//! │  │   Poller    │                     │  TelemetryQuery    │  │
//! │  │ (1s cadence)│                     │ (windows, tables)  │  │
//! │  └─────────────┘                     └────────────────────┘  │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use pressure_monitor::{
//!     core::{TelemetryStore, Timestamper},
//!     poller::{Poller, PollerConfig},
//!     source::{HttpSource, SourceConfig},
//!     stats::create_shared_stats,
//! };
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let source = HttpSource::new(SourceConfig::new(
//!     "http://localhost:9080",
//!     Duration::from_secs(5),
//! ))?;
//! let store = Arc::new(TelemetryStore::default());
//! let poller = Poller::new(
//!     Arc::new(source),
//!     store.clone(),
//!     Arc::new(Timestamper::default()),
//!     create_shared_stats(),
//!     PollerConfig::default(),
//! );
//! let (_handle, _shutdown) = poller.spawn();
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod core;
pub mod persist;
pub mod poller;
pub mod query;
pub mod source;
pub mod stats;

#[cfg(feature = "server")]
pub mod server;

// Re-export key types at crate root for convenience
pub use config::Config;
pub use core::{
    flatten_to_series, window, AnomalyRetention, PersistedRecord, SeriesPoint, StoreKind,
    TelemetryStore, Timestamper,
};
pub use poller::{Poller, PollerConfig, RoundReport};
pub use query::{RefreshGate, TableRow, TelemetryQuery};
pub use source::{FetchError, HttpSource, SensorName, Snapshot, SnapshotSource, SubjectId};
pub use stats::{IngestStats, SharedIngestStats};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
