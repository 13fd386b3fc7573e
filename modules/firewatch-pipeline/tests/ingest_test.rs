//! Ingestion runs against in-memory collaborators: feed → filter → store → cache.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{SubsecRound, TimeZone, Utc};

use firewatch_common::{FeedRecord, FilterPolicy};
use firewatch_pipeline::testing::{
    fire_event, offset_north, record, record_at, subscriber, MemorySnapshotStore, MockFeed,
    MockStore, MockTransport, ATHENS, THESSALONIKI, TEST_ACQ_DATE,
};
use firewatch_pipeline::{
    EventCache, IngestionPipeline, NotificationFanout, PipelineError, SharedCache,
};

struct Harness {
    feed: Arc<MockFeed>,
    store: Arc<MockStore>,
    snapshots: Arc<MemorySnapshotStore>,
    cache: SharedCache,
    pipeline: IngestionPipeline,
}

impl Harness {
    fn new(records: Vec<FeedRecord>, policy: FilterPolicy) -> Self {
        Self::with_parts(
            MockFeed::returning(records),
            MockStore::new(),
            MemorySnapshotStore::new(),
            policy,
        )
    }

    fn with_parts(
        feed: MockFeed,
        store: MockStore,
        snapshots: MemorySnapshotStore,
        policy: FilterPolicy,
    ) -> Self {
        let feed = Arc::new(feed);
        let store = Arc::new(store);
        let snapshots = Arc::new(snapshots);
        let cache = EventCache::load(Box::new(snapshots.clone()))
            .unwrap()
            .into_shared();
        let pipeline = IngestionPipeline::new(feed.clone(), store.clone(), cache.clone(), policy);
        Self {
            feed,
            store,
            snapshots,
            cache,
            pipeline,
        }
    }

    async fn cache_ids(&self) -> HashSet<uuid::Uuid> {
        self.cache.lock().await.ids()
    }
}

#[tokio::test]
async fn pair_fifty_meters_apart_is_persisted() {
    let h = Harness::new(
        vec![
            record_at(ATHENS, TEST_ACQ_DATE),
            record_at(offset_north(ATHENS, 50.0), TEST_ACQ_DATE),
        ],
        FilterPolicy::corroborated(),
    );

    let stats = h.pipeline.run().await.unwrap();

    assert_eq!(stats.fetched, 2);
    assert_eq!(stats.persisted, 2);
    assert_eq!(h.store.event_ids().len(), 2);
    assert_eq!(h.cache_ids().await, h.store.event_ids());
    assert_eq!(h.snapshots.stored_ids(), h.store.event_ids());
    assert_eq!(h.snapshots.writes(), 1);
}

#[tokio::test]
async fn isolated_record_is_rejected() {
    let h = Harness::new(
        vec![record_at(ATHENS, TEST_ACQ_DATE)],
        FilterPolicy::corroborated(),
    );

    let stats = h.pipeline.run().await.unwrap();

    assert_eq!(stats.persisted, 0);
    assert_eq!(stats.filter.isolated, 1);
    assert_eq!(h.store.insert_calls(), 0, "empty batch must not reach the store");
    assert!(h.cache_ids().await.is_empty());
    assert_eq!(h.snapshots.writes(), 0);
}

#[tokio::test]
async fn isolated_record_is_kept_without_corroboration() {
    let h = Harness::new(
        vec![record_at(ATHENS, TEST_ACQ_DATE)],
        FilterPolicy::dedup_only(),
    );

    let stats = h.pipeline.run().await.unwrap();
    assert_eq!(stats.persisted, 1);
}

#[tokio::test]
async fn snapshot_loaded_event_dedups_and_still_corroborates() {
    let existing = fire_event(ATHENS.lat, ATHENS.lng);
    let h = Harness::with_parts(
        MockFeed::returning(vec![
            record_at(offset_north(ATHENS, 50.0), TEST_ACQ_DATE),
            record_at(offset_north(ATHENS, 120.0), TEST_ACQ_DATE),
        ]),
        MockStore::new().with_event(existing.clone()),
        MemorySnapshotStore::with_events(vec![existing.clone()]),
        FilterPolicy::corroborated(),
    );

    let stats = h.pipeline.run().await.unwrap();

    // 50m is inside the dedup radius; 120m is novel and corroborated by it.
    assert_eq!(stats.filter.duplicates, 1);
    assert_eq!(stats.persisted, 1);
    let ids = h.cache_ids().await;
    assert_eq!(ids.len(), 2);
    assert!(ids.contains(&existing.id));
    assert_eq!(ids, h.store.event_ids());
}

#[tokio::test]
async fn novelty_is_measured_against_the_dedup_radius() {
    let existing = fire_event(ATHENS.lat, ATHENS.lng);
    let policy = FilterPolicy {
        dedup_radius_m: 100.0,
        proximity_radius_m: None,
    };
    let h = Harness::with_parts(
        MockFeed::returning(vec![
            record_at(offset_north(ATHENS, 99.5), TEST_ACQ_DATE),
            record_at(offset_north(ATHENS, 100.5), TEST_ACQ_DATE),
        ]),
        MockStore::new().with_event(existing.clone()),
        MemorySnapshotStore::with_events(vec![existing]),
        policy,
    );

    let stats = h.pipeline.run().await.unwrap();

    assert_eq!(stats.filter.duplicates, 1);
    assert_eq!(stats.persisted, 1);
    let stored = h.store.events();
    let new_lat = stored
        .iter()
        .map(|e| e.detection.latitude)
        .fold(f64::MIN, f64::max);
    assert!((new_lat - offset_north(ATHENS, 100.5).lat).abs() < 1e-9);
}

#[tokio::test]
async fn second_run_over_same_records_persists_nothing() {
    let records = vec![
        record_at(ATHENS, TEST_ACQ_DATE),
        record_at(offset_north(ATHENS, 300.0), TEST_ACQ_DATE),
        record_at(THESSALONIKI, TEST_ACQ_DATE),
        record_at(offset_north(THESSALONIKI, 2_000.0), TEST_ACQ_DATE),
    ];
    let h = Harness::new(records, FilterPolicy::corroborated());

    let first = h.pipeline.run().await.unwrap();
    assert_eq!(first.persisted, 4);

    let second = h.pipeline.run().await.unwrap();
    assert_eq!(second.persisted, 0);
    assert_eq!(second.filter.duplicates, 4);
    assert_eq!(h.store.event_ids().len(), 4);
    assert_eq!(h.store.insert_calls(), 1);
}

#[tokio::test]
async fn fetch_failure_persists_nothing() {
    let h = Harness::with_parts(
        MockFeed::failing("connection reset"),
        MockStore::new(),
        MemorySnapshotStore::new(),
        FilterPolicy::corroborated(),
    );

    let err = h.pipeline.run().await.unwrap_err();

    assert!(matches!(err, PipelineError::Fetch(_)));
    assert_eq!(h.feed.calls(), 1);
    assert_eq!(h.store.insert_calls(), 0);
    assert!(h.cache_ids().await.is_empty());
    assert_eq!(h.snapshots.writes(), 0);
}

#[tokio::test]
async fn store_failure_leaves_cache_untouched() {
    let h = Harness::new(
        vec![
            record_at(ATHENS, TEST_ACQ_DATE),
            record_at(offset_north(ATHENS, 500.0), TEST_ACQ_DATE),
        ],
        FilterPolicy::corroborated(),
    );
    h.store.set_fail_inserts(true);

    let err = h.pipeline.run().await.unwrap_err();

    assert!(matches!(err, PipelineError::Store(_)));
    assert!(h.store.event_ids().is_empty());
    assert!(h.cache_ids().await.is_empty());
    assert_eq!(h.snapshots.writes(), 0);

    // Next run retries the same batch.
    h.store.set_fail_inserts(false);
    let stats = h.pipeline.run().await.unwrap();
    assert_eq!(stats.persisted, 2);
    assert_eq!(h.cache_ids().await, h.store.event_ids());
}

#[tokio::test]
async fn unparseable_records_are_skipped_and_counted() {
    let mut bad_lat = record_at(ATHENS, TEST_ACQ_DATE);
    bad_lat.insert("latitude".to_string(), "not-a-number".to_string());
    let mut missing_date = record_at(ATHENS, TEST_ACQ_DATE);
    missing_date.remove("acq_date");

    let h = Harness::new(
        vec![
            bad_lat,
            missing_date,
            record(95.0, 23.0, TEST_ACQ_DATE),
            record_at(ATHENS, TEST_ACQ_DATE),
            record_at(offset_north(ATHENS, 400.0), TEST_ACQ_DATE),
        ],
        FilterPolicy::corroborated(),
    );

    let stats = h.pipeline.run().await.unwrap();

    assert_eq!(stats.fetched, 5);
    assert_eq!(stats.unparseable, 3);
    assert_eq!(stats.filter.candidates, 2);
    assert_eq!(stats.persisted, 2);
}

#[tokio::test]
async fn snapshot_failure_after_commit_keeps_cache_in_sync_with_store() {
    let h = Harness::new(
        vec![
            record_at(ATHENS, TEST_ACQ_DATE),
            record_at(offset_north(ATHENS, 500.0), TEST_ACQ_DATE),
        ],
        FilterPolicy::corroborated(),
    );
    h.snapshots.set_fail_writes(true);

    let stats = h.pipeline.run().await.unwrap();

    assert!(stats.snapshot_failed);
    assert_eq!(stats.persisted, 2);
    assert_eq!(h.cache_ids().await, h.store.event_ids());
}

#[tokio::test]
async fn persisted_events_carry_the_run_timestamp_and_feed_attributes() {
    let h = Harness::new(
        vec![
            record_at(ATHENS, TEST_ACQ_DATE),
            record_at(offset_north(ATHENS, 500.0), TEST_ACQ_DATE),
        ],
        FilterPolicy::corroborated(),
    );
    let now = Utc.with_ymd_and_hms(2024, 8, 11, 14, 30, 0).unwrap()
        + chrono::Duration::nanoseconds(123_456_789);

    h.pipeline.run_at(now).await.unwrap();

    let cache = h.cache.lock().await;
    for event in h.store.events() {
        assert_eq!(event.recorded_at, now.trunc_subsecs(6));
        assert_eq!(event.detection.attributes["confidence"], "n");
        assert_eq!(cache.get(&event.id), Some(&event));
    }
}

#[tokio::test]
async fn persisted_events_alert_nearby_subscribers() {
    let store = MockStore::new()
        .with_subscriber(subscriber("near", offset_north(ATHENS, 5_000.0), "tok-near"))
        .with_subscriber(subscriber("far", THESSALONIKI, "tok-far"));
    let h = Harness::with_parts(
        MockFeed::returning(vec![
            record_at(ATHENS, TEST_ACQ_DATE),
            record_at(offset_north(ATHENS, 500.0), TEST_ACQ_DATE),
        ]),
        store,
        MemorySnapshotStore::new(),
        FilterPolicy::corroborated(),
    );
    let transport = Arc::new(MockTransport::new());
    let fanout = NotificationFanout::new(h.store.clone(), transport.clone());
    let pipeline = IngestionPipeline::new(
        h.feed.clone(),
        h.store.clone(),
        h.cache.clone(),
        FilterPolicy::corroborated(),
    )
    .with_fanout(Arc::new(fanout));

    let stats = pipeline.run().await.unwrap();

    assert_eq!(stats.persisted, 2);
    assert_eq!(stats.notifications.sent, 2, "one alert per persisted event");
    assert_eq!(transport.sent_tokens(), vec!["tok-near", "tok-near"]);
}

#[tokio::test]
async fn subscriber_scan_failure_does_not_fail_the_run() {
    let h = Harness::new(
        vec![
            record_at(ATHENS, TEST_ACQ_DATE),
            record_at(offset_north(ATHENS, 500.0), TEST_ACQ_DATE),
        ],
        FilterPolicy::corroborated(),
    );
    h.store.set_fail_subscribers(true);
    let transport = Arc::new(MockTransport::new());
    let pipeline = IngestionPipeline::new(
        h.feed.clone(),
        h.store.clone(),
        h.cache.clone(),
        FilterPolicy::corroborated(),
    )
    .with_fanout(Arc::new(NotificationFanout::new(
        h.store.clone(),
        transport.clone(),
    )));

    let stats = pipeline.run().await.unwrap();

    assert_eq!(stats.persisted, 2);
    assert_eq!(stats.notifications.sent, 0);
    assert!(transport.sent_tokens().is_empty());
}
