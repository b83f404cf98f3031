//! Integration tests for the HTTP source and the poller against a fake endpoint

#[cfg(feature = "server")]
mod common;

#[cfg(feature = "server")]
mod source_tests {
    use super::common::{Behavior, FakeSource};
    use pressure_monitor::core::{StoreKind, TelemetryStore, Timestamper};
    use pressure_monitor::poller::{Poller, PollerConfig};
    use pressure_monitor::query::list_subjects;
    use pressure_monitor::source::{
        FetchError, HttpSource, SensorName, SnapshotSource, SourceConfig,
    };
    use pressure_monitor::stats::create_shared_stats;
    use std::sync::Arc;
    use std::time::Duration;

    fn http_source(base_url: &str) -> HttpSource {
        HttpSource::new(SourceConfig::new(base_url, Duration::from_secs(2)))
            .expect("Failed to build source")
    }

    #[tokio::test]
    async fn test_fetch_healthy_snapshot() {
        let fake = FakeSource::new();
        fake.set(1, Behavior::healthy(420, true));
        let source = http_source(&fake.spawn().await);

        let snapshot = source.fetch(1).await.expect("fetch should succeed");
        assert_eq!(snapshot.subject_id, 1);
        assert_eq!(snapshot.sensors.len(), 6);
        assert_eq!(snapshot.sensors[0].name, SensorName::L0);
        assert!(snapshot.sensors.iter().all(|s| s.value == 420));
        assert!(snapshot.has_anomaly());
    }

    #[tokio::test]
    async fn test_fetch_failures_are_values() {
        let fake = FakeSource::new();
        fake.set(2, Behavior::Status(503));
        fake.set(3, Behavior::Malformed);
        let source = http_source(&fake.spawn().await);

        match source.fetch(2).await {
            Err(FetchError::Status { status, .. }) => assert_eq!(status, 503),
            other => panic!("expected status error, got {other:?}"),
        }
        assert!(matches!(source.fetch(3).await, Err(FetchError::Malformed(_))));
        assert!(matches!(
            source.fetch(99).await,
            Err(FetchError::Status { status: 404, .. })
        ));
    }

    #[tokio::test]
    async fn test_round_skips_only_failing_subject() {
        let fake = FakeSource::new();
        for id in [1, 2, 4, 5, 6] {
            fake.set(id, Behavior::healthy(100, id == 6));
        }
        fake.set(3, Behavior::Status(500));
        let source = Arc::new(http_source(&fake.spawn().await));

        let store = Arc::new(TelemetryStore::default());
        let stats = create_shared_stats();
        let poller = Poller::new(
            source,
            store.clone(),
            Arc::new(Timestamper::default()),
            stats.clone(),
            PollerConfig::default(),
        );

        let report = poller.run_round().await;
        assert_eq!(report.stored_ids(), vec![1, 2, 4, 5, 6]);
        assert_eq!(report.failed_ids(), vec![3]);
        assert_eq!(store.len(3, StoreKind::History), 0);
        assert_eq!(store.len(6, StoreKind::Anomaly), 1);
        assert_eq!(store.len(1, StoreKind::Anomaly), 0);

        // Subject 3 recovers on the next round without any retry logic.
        fake.set(3, Behavior::healthy(7, false));
        let report = poller.run_round().await;
        assert!(report.failed.is_empty());
        assert_eq!(store.len(3, StoreKind::History), 1);
        assert_eq!(store.len(1, StoreKind::History), 2);
        assert_eq!(stats.snapshot().rounds_completed, 2);
    }

    #[tokio::test]
    async fn test_list_subjects_composes_names() {
        let fake = FakeSource::new();
        fake.set(1, Behavior::healthy(0, false));
        fake.set(3, Behavior::healthy(0, false));
        let source = http_source(&fake.spawn().await);

        let entries = list_subjects(&source, &[1, 2, 3]).await;
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].id, 1);
        assert_eq!(entries[0].display_name, "First1 Last1");
        assert_eq!(entries[1].display_name, "First3 Last3");

        let profile = source.fetch_profile(3).await.unwrap();
        assert_eq!(profile.birthdate.as_deref(), Some("1990"));
        assert!(!profile.disabled);
    }
}
