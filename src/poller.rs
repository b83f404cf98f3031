//! Background ingestion loop.
//!
//! Each round fetches every configured subject once, stamps the snapshot and
//! stores it. A failing subject is logged and skipped; the round always runs
//! to the end. The next round starts `poll_interval` after the previous one
//! finished, so a slow source stretches the cadence instead of piling up.

use crate::core::{IngestOutcome, SharedStore, Timestamper};
use crate::persist::StoreFiles;
use crate::source::{FetchError, SnapshotSource, SubjectId};
use crate::stats::SharedIngestStats;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, Semaphore};
use tokio::task::JoinSet;

/// Poller settings.
#[derive(Debug, Clone)]
pub struct PollerConfig {
    /// Subjects in polling order
    pub subject_ids: Vec<SubjectId>,
    /// Pause between rounds
    pub poll_interval: Duration,
    /// Simultaneous fetches within one round
    pub max_concurrent_fetches: usize,
    /// Checkpoint the stores every this many rounds (0 = only on shutdown)
    pub checkpoint_every_rounds: u64,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            subject_ids: (1..=6).collect(),
            poll_interval: Duration::from_secs(1),
            max_concurrent_fetches: 1,
            checkpoint_every_rounds: 0,
        }
    }
}

/// What happened during one round.
#[derive(Debug, Default)]
pub struct RoundReport {
    /// Subjects whose snapshot was stored, with the anomaly flag
    pub stored: Vec<IngestOutcome>,
    /// Subjects skipped this round
    pub failed: Vec<(SubjectId, FetchError)>,
}

impl RoundReport {
    pub fn stored_ids(&self) -> Vec<SubjectId> {
        self.stored.iter().map(|o| o.subject_id).collect()
    }

    pub fn failed_ids(&self) -> Vec<SubjectId> {
        self.failed.iter().map(|(id, _)| *id).collect()
    }

    fn sort(&mut self) {
        self.stored.sort_by_key(|o| o.subject_id);
        self.failed.sort_by_key(|(id, _)| *id);
    }
}

/// State shared with the per-subject fetch tasks.
struct Ingestor<S: ?Sized> {
    source: Arc<S>,
    store: SharedStore,
    timestamper: Arc<Timestamper>,
    stats: SharedIngestStats,
}

impl<S: SnapshotSource + ?Sized> Ingestor<S> {
    async fn ingest_subject(&self, subject_id: SubjectId) -> Result<IngestOutcome, FetchError> {
        match self.source.fetch(subject_id).await {
            Ok(snapshot) => {
                let record = self.timestamper.normalize(snapshot);
                let outcome = self.store.ingest(record);
                self.stats.record_stored(outcome.anomaly);
                Ok(outcome)
            }
            Err(e) => {
                self.stats.record_failure(e.is_malformed());
                Err(e)
            }
        }
    }
}

/// Drives ingestion for every subject on a fixed cadence.
pub struct Poller<S: ?Sized> {
    ingestor: Arc<Ingestor<S>>,
    config: PollerConfig,
    checkpoint: Option<StoreFiles>,
}

impl<S: SnapshotSource + ?Sized + 'static> Poller<S> {
    /// Create a new poller writing into `store`.
    pub fn new(
        source: Arc<S>,
        store: SharedStore,
        timestamper: Arc<Timestamper>,
        stats: SharedIngestStats,
        config: PollerConfig,
    ) -> Self {
        Self {
            ingestor: Arc::new(Ingestor {
                source,
                store,
                timestamper,
                stats,
            }),
            config,
            checkpoint: None,
        }
    }

    /// Checkpoint the stores to these files periodically and on shutdown.
    pub fn with_checkpoint(mut self, files: StoreFiles) -> Self {
        self.checkpoint = Some(files);
        self
    }

    /// Run one round over all subjects.
    pub async fn run_round(&self) -> RoundReport {
        let mut report = RoundReport::default();

        if self.config.max_concurrent_fetches <= 1 {
            for &subject_id in &self.config.subject_ids {
                match self.ingestor.ingest_subject(subject_id).await {
                    Ok(outcome) => report.stored.push(outcome),
                    Err(e) => report.failed.push((subject_id, e)),
                }
            }
        } else {
            // Each subject appears once per round, so concurrent fetches
            // cannot reorder writes into the same subject's logs.
            let permits = Arc::new(Semaphore::new(self.config.max_concurrent_fetches));
            let mut tasks = JoinSet::new();
            for &subject_id in &self.config.subject_ids {
                let ingestor = self.ingestor.clone();
                let permits = permits.clone();
                tasks.spawn(async move {
                    let _permit = permits.acquire_owned().await.ok();
                    (subject_id, ingestor.ingest_subject(subject_id).await)
                });
            }
            while let Some(joined) = tasks.join_next().await {
                match joined {
                    Ok((_, Ok(outcome))) => report.stored.push(outcome),
                    Ok((subject_id, Err(e))) => report.failed.push((subject_id, e)),
                    Err(e) => tracing::error!("Fetch task failed: {e}"),
                }
            }
            report.sort();
        }

        for (subject_id, e) in &report.failed {
            tracing::warn!("Skipping subject {subject_id} this round: {e}");
        }
        self.ingestor.stats.record_round();
        tracing::debug!(
            "Round complete: {} stored, {} failed",
            report.stored.len(),
            report.failed.len()
        );

        report
    }

    /// Poll until `shutdown` receives `()`.
    ///
    /// Dropping the sender without sending leaves the poller running for
    /// the life of the runtime. A round in progress is always finished
    /// before stopping.
    pub async fn run(self, mut shutdown: oneshot::Receiver<()>) {
        tracing::info!(
            "Poller started for subjects {:?} every {:?}",
            self.config.subject_ids,
            self.config.poll_interval
        );

        let mut rounds: u64 = 0;
        let mut detached = false;
        loop {
            self.run_round().await;
            rounds += 1;

            if self.config.checkpoint_every_rounds > 0
                && rounds % self.config.checkpoint_every_rounds == 0
            {
                self.checkpoint().await;
            }

            tokio::select! {
                _ = tokio::time::sleep(self.config.poll_interval) => {}
                signal = &mut shutdown, if !detached => match signal {
                    Ok(()) => {
                        tracing::info!("Poller shutdown signal received");
                        break;
                    }
                    Err(_) => {
                        tracing::debug!("Shutdown handle dropped; polling until process exit");
                        detached = true;
                    }
                },
            }
        }

        self.checkpoint().await;
        tracing::info!("Poller stopped after {rounds} rounds");
    }

    /// Spawn `run` on the current runtime.
    pub fn spawn(self) -> (tokio::task::JoinHandle<()>, oneshot::Sender<()>) {
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let handle = tokio::spawn(self.run(shutdown_rx));
        (handle, shutdown_tx)
    }

    async fn checkpoint(&self) {
        let Some(files) = self.checkpoint.clone() else {
            return;
        };
        let store = self.ingestor.store.clone();
        let stats = self.ingestor.stats.clone();

        let result = tokio::task::spawn_blocking(move || {
            let written = files.save(&store)?;
            if let Err(e) = stats.save() {
                tracing::warn!("Could not save ingest stats: {e}");
            }
            Ok::<_, crate::core::StoreError>(written)
        })
        .await;

        match result {
            Ok(Ok(written)) => tracing::info!("Checkpointed {written} records"),
            Ok(Err(e)) => tracing::warn!("Checkpoint failed: {e}"),
            Err(e) => tracing::error!("Checkpoint task failed: {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::record::test_support::snapshot;
    use crate::core::{StoreKind, TelemetryStore};
    use crate::source::{Snapshot, SubjectProfile};
    use crate::stats::create_shared_stats;
    use async_trait::async_trait;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Source that fails for some subjects and flags anomalies for others.
    struct ScriptedSource {
        failing: HashSet<SubjectId>,
        anomalous: HashSet<SubjectId>,
        calls: AtomicU32,
    }

    impl ScriptedSource {
        fn new(failing: &[SubjectId], anomalous: &[SubjectId]) -> Self {
            Self {
                failing: failing.iter().copied().collect(),
                anomalous: anomalous.iter().copied().collect(),
                calls: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl SnapshotSource for ScriptedSource {
        async fn fetch(&self, subject_id: SubjectId) -> Result<Snapshot, FetchError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if self.failing.contains(&subject_id) {
                return Err(FetchError::Network("connection refused".to_string()));
            }
            Ok(snapshot(
                subject_id,
                (n % 1100) as u16,
                self.anomalous.contains(&subject_id),
            ))
        }

        async fn fetch_profile(
            &self,
            subject_id: SubjectId,
        ) -> Result<SubjectProfile, FetchError> {
            Err(FetchError::Status {
                status: 404,
                message: format!("no profile for {subject_id}"),
            })
        }
    }

    fn poller(
        source: ScriptedSource,
        config: PollerConfig,
    ) -> (Poller<ScriptedSource>, SharedStore, SharedIngestStats) {
        let store = Arc::new(TelemetryStore::default());
        let stats = create_shared_stats();
        let poller = Poller::new(
            Arc::new(source),
            store.clone(),
            Arc::new(Timestamper::default()),
            stats.clone(),
            config,
        );
        (poller, store, stats)
    }

    #[tokio::test]
    async fn test_failing_subject_does_not_abort_round() {
        let (poller, store, stats) =
            poller(ScriptedSource::new(&[3], &[]), PollerConfig::default());

        let report = poller.run_round().await;

        assert_eq!(report.stored_ids(), vec![1, 2, 4, 5, 6]);
        assert_eq!(report.failed_ids(), vec![3]);
        assert_eq!(store.len(3, StoreKind::History), 0);
        for id in [1, 2, 4, 5, 6] {
            assert_eq!(store.len(id, StoreKind::History), 1);
        }

        let counters = stats.snapshot();
        assert_eq!(counters.fetches_succeeded, 5);
        assert_eq!(counters.fetches_failed, 1);
        assert_eq!(counters.rounds_completed, 1);
    }

    #[tokio::test]
    async fn test_anomalies_routed_to_anomaly_log() {
        let (poller, store, stats) =
            poller(ScriptedSource::new(&[], &[2]), PollerConfig::default());

        poller.run_round().await;
        poller.run_round().await;

        assert_eq!(store.len(2, StoreKind::Anomaly), 2);
        assert_eq!(store.len(2, StoreKind::History), 2);
        assert_eq!(store.len(1, StoreKind::Anomaly), 0);
        assert_eq!(stats.snapshot().anomalies_stored, 2);
    }

    #[tokio::test]
    async fn test_concurrent_round_matches_sequential() {
        let config = PollerConfig {
            max_concurrent_fetches: 3,
            ..PollerConfig::default()
        };
        let (poller, store, _) = poller(ScriptedSource::new(&[5], &[1]), config);

        let report = poller.run_round().await;

        assert_eq!(report.stored_ids(), vec![1, 2, 3, 4, 6]);
        assert_eq!(report.failed_ids(), vec![5]);
        assert_eq!(store.len(1, StoreKind::Anomaly), 1);
        assert_eq!(store.len(5, StoreKind::History), 0);
    }

    #[tokio::test]
    async fn test_history_timestamps_increase_across_rounds() {
        let config = PollerConfig {
            subject_ids: vec![1],
            ..PollerConfig::default()
        };
        let (poller, store, _) = poller(ScriptedSource::new(&[], &[]), config);

        for _ in 0..5 {
            poller.run_round().await;
        }

        let all = store.read_all(1, StoreKind::History);
        assert_eq!(all.len(), 5);
        assert!(all.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown_and_checkpoints() {
        let dir = tempfile::tempdir().unwrap();
        let files = StoreFiles::new(dir.path());
        let config = PollerConfig {
            subject_ids: vec![1, 2],
            poll_interval: Duration::from_millis(10),
            ..PollerConfig::default()
        };
        let (poller, store, stats) = poller(ScriptedSource::new(&[], &[]), config);
        let (handle, shutdown) = poller.with_checkpoint(files.clone()).spawn();

        tokio::time::sleep(Duration::from_millis(100)).await;
        let _ = shutdown.send(());
        handle.await.unwrap();

        assert!(stats.snapshot().rounds_completed >= 1);
        assert!(files.path(1, StoreKind::History).exists());

        let restored = TelemetryStore::default();
        files.load(&restored).unwrap();
        assert_eq!(
            restored.read_all(1, StoreKind::History),
            store.read_all(1, StoreKind::History)
        );
    }

    #[tokio::test]
    async fn test_dropped_shutdown_handle_keeps_polling() {
        let config = PollerConfig {
            subject_ids: vec![1],
            poll_interval: Duration::from_millis(10),
            ..PollerConfig::default()
        };
        let (poller, store, _) = poller(ScriptedSource::new(&[], &[]), config);
        let (handle, shutdown) = poller.spawn();
        drop(shutdown);

        tokio::time::sleep(Duration::from_millis(200)).await;

        assert!(!handle.is_finished());
        assert!(store.len(1, StoreKind::History) > 2);
        handle.abort();
    }
}
