//! Ingest statistics for the pressure monitor.
//!
//! This module tracks what the poller has ingested so operators can check
//! on a running instance without reading the stores.

pub mod ingest;

// Re-export commonly used types
pub use ingest::{
    create_shared_stats, create_shared_stats_with_persistence, read_counters, IngestSnapshot,
    IngestStats, PersistedCounters, SharedIngestStats,
};
