// Test mocks for the fire pipeline.
//
// One mock per trait boundary:
// - MockFeed (FeedClient): fixed records or a fixed failure
// - MockStore (DurableStore + SubscriberStore): stateful in-memory table
// - MockTransport (PushTransport): records sends, scripted token failures
// - MemorySnapshotStore (SnapshotStore): in-memory snapshot with fault toggles
//
// Plus helpers for building records, detections and events near Athens.

use std::collections::{HashMap, HashSet};
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, SubsecRound, Utc};
use uuid::Uuid;

use firewatch_common::{
    CacheError, DeliveryError, Detection, EventId, ExpiryCutoff, FeedRecord, FetchError,
    FireEvent, GeoPoint, StoreError, Subscriber, ACQ_DATE_FIELD, EARTH_RADIUS_M, LATITUDE_FIELD,
    LONGITUDE_FIELD,
};

use crate::notify::Alert;
use crate::traits::{DurableStore, FeedClient, PushTransport, SnapshotStore, SubscriberStore};

// ---------------------------------------------------------------------------
// Test constants
// ---------------------------------------------------------------------------

pub const TEST_ACQ_DATE: &str = "2024-08-11";

/// Athens, GR.
pub const ATHENS: GeoPoint = GeoPoint::new(37.9838, 23.7275);
/// Thessaloniki, GR. ~300km from Athens.
pub const THESSALONIKI: GeoPoint = GeoPoint::new(40.6401, 22.9444);

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Move a point due north by `meters` on the haversine sphere.
pub fn offset_north(point: GeoPoint, meters: f64) -> GeoPoint {
    GeoPoint::new(point.lat + (meters / EARTH_RADIUS_M).to_degrees(), point.lng)
}

fn parse_date(date: &str) -> NaiveDate {
    NaiveDate::parse_from_str(date, "%Y-%m-%d").expect("test date must be YYYY-MM-DD")
}

/// A raw feed row with the three required columns plus a confidence column.
pub fn record(lat: f64, lng: f64, acq_date: &str) -> FeedRecord {
    FeedRecord::from([
        (LATITUDE_FIELD.to_string(), lat.to_string()),
        (LONGITUDE_FIELD.to_string(), lng.to_string()),
        (ACQ_DATE_FIELD.to_string(), acq_date.to_string()),
        ("confidence".to_string(), "n".to_string()),
    ])
}

pub fn record_at(point: GeoPoint, acq_date: &str) -> FeedRecord {
    record(point.lat, point.lng, acq_date)
}

pub fn detection(lat: f64, lng: f64, acq_date: &str) -> Detection {
    Detection {
        latitude: lat,
        longitude: lng,
        acq_date: parse_date(acq_date),
        attributes: Default::default(),
    }
}

/// A persisted event with a fresh id, recorded now.
pub fn fire_event(lat: f64, lng: f64) -> FireEvent {
    fire_event_recorded(lat, lng, Utc::now().trunc_subsecs(6))
}

pub fn fire_event_recorded(lat: f64, lng: f64, recorded_at: DateTime<Utc>) -> FireEvent {
    FireEvent::new(Uuid::new_v4(), detection(lat, lng, TEST_ACQ_DATE), recorded_at)
}

pub fn subscriber(id: &str, location: GeoPoint, token: &str) -> Subscriber {
    Subscriber {
        id: id.to_string(),
        location: Some(location),
        push_token: Some(token.to_string()),
    }
}

// ---------------------------------------------------------------------------
// MockFeed
// ---------------------------------------------------------------------------

/// Returns the same records (or the same failure) on every call.
pub struct MockFeed {
    records: Mutex<Vec<FeedRecord>>,
    failure: Option<String>,
    calls: AtomicU32,
}

impl MockFeed {
    pub fn returning(records: Vec<FeedRecord>) -> Self {
        Self {
            records: Mutex::new(records),
            failure: None,
            calls: AtomicU32::new(0),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            records: Mutex::new(Vec::new()),
            failure: Some(message.to_string()),
            calls: AtomicU32::new(0),
        }
    }

    /// Swap the records served by later calls.
    pub fn set_records(&self, records: Vec<FeedRecord>) {
        *self.records.lock().unwrap() = records;
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FeedClient for MockFeed {
    async fn fetch_records(&self) -> Result<Vec<FeedRecord>, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.failure {
            Some(message) => Err(FetchError::Network(message.clone())),
            None => Ok(self.records.lock().unwrap().clone()),
        }
    }
}

// ---------------------------------------------------------------------------
// MockStore
// ---------------------------------------------------------------------------

/// In-memory event table and subscriber list.
pub struct MockStore {
    events: Mutex<HashMap<EventId, FireEvent>>,
    subscribers: Mutex<Vec<Subscriber>>,
    cleared_tokens: Mutex<Vec<String>>,
    fail_inserts: AtomicBool,
    fail_deletes: AtomicBool,
    fail_subscribers: AtomicBool,
    insert_calls: AtomicU32,
    delete_calls: AtomicU32,
}

impl MockStore {
    pub fn new() -> Self {
        Self {
            events: Mutex::new(HashMap::new()),
            subscribers: Mutex::new(Vec::new()),
            cleared_tokens: Mutex::new(Vec::new()),
            fail_inserts: AtomicBool::new(false),
            fail_deletes: AtomicBool::new(false),
            fail_subscribers: AtomicBool::new(false),
            insert_calls: AtomicU32::new(0),
            delete_calls: AtomicU32::new(0),
        }
    }

    pub fn with_event(self, event: FireEvent) -> Self {
        self.events.lock().unwrap().insert(event.id, event);
        self
    }

    pub fn with_subscriber(self, subscriber: Subscriber) -> Self {
        self.subscribers.lock().unwrap().push(subscriber);
        self
    }

    pub fn set_fail_inserts(&self, fail: bool) {
        self.fail_inserts.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_subscribers(&self, fail: bool) {
        self.fail_subscribers.store(fail, Ordering::SeqCst);
    }

    pub fn event_ids(&self) -> HashSet<EventId> {
        self.events.lock().unwrap().keys().copied().collect()
    }

    pub fn events(&self) -> Vec<FireEvent> {
        self.events.lock().unwrap().values().cloned().collect()
    }

    pub fn subscriber(&self, id: &str) -> Option<Subscriber> {
        self.subscribers
            .lock()
            .unwrap()
            .iter()
            .find(|s| s.id == id)
            .cloned()
    }

    pub fn cleared_tokens(&self) -> Vec<String> {
        self.cleared_tokens.lock().unwrap().clone()
    }

    pub fn insert_calls(&self) -> u32 {
        self.insert_calls.load(Ordering::SeqCst)
    }

    pub fn delete_calls(&self) -> u32 {
        self.delete_calls.load(Ordering::SeqCst)
    }
}

impl Default for MockStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DurableStore for MockStore {
    async fn scan_all(&self) -> Result<Vec<FireEvent>, StoreError> {
        Ok(self.events())
    }

    async fn insert_batch(
        &self,
        detections: &[Detection],
        recorded_at: DateTime<Utc>,
    ) -> Result<Vec<EventId>, StoreError> {
        self.insert_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_inserts.load(Ordering::SeqCst) {
            return Err(StoreError::Database("insert rejected".to_string()));
        }

        let mut events = self.events.lock().unwrap();
        let ids = detections
            .iter()
            .map(|d| {
                let event = FireEvent::new(Uuid::new_v4(), d.clone(), recorded_at);
                let id = event.id;
                events.insert(id, event);
                id
            })
            .collect();
        Ok(ids)
    }

    async fn delete_expired(&self, cutoff: &ExpiryCutoff) -> Result<Vec<EventId>, StoreError> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(StoreError::Database("delete rejected".to_string()));
        }

        let mut events = self.events.lock().unwrap();
        let expired: Vec<EventId> = events
            .values()
            .filter(|e| cutoff.is_expired(e))
            .map(|e| e.id)
            .collect();
        for id in &expired {
            events.remove(id);
        }
        Ok(expired)
    }
}

#[async_trait]
impl SubscriberStore for MockStore {
    async fn subscribers(&self) -> Result<Vec<Subscriber>, StoreError> {
        if self.fail_subscribers.load(Ordering::SeqCst) {
            return Err(StoreError::Database("subscribers unavailable".to_string()));
        }
        Ok(self.subscribers.lock().unwrap().clone())
    }

    async fn clear_subscriber_token(&self, subscriber_id: &str) -> Result<(), StoreError> {
        let mut subscribers = self.subscribers.lock().unwrap();
        if let Some(sub) = subscribers.iter_mut().find(|s| s.id == subscriber_id) {
            if let Some(token) = sub.push_token.take() {
                self.cleared_tokens.lock().unwrap().push(token);
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MockTransport
// ---------------------------------------------------------------------------

/// Records every send. Tokens can be scripted as invalid or failing, and each
/// send sleeps briefly so overlapping sends are observable.
pub struct MockTransport {
    sent: Mutex<Vec<(String, Alert)>>,
    invalid_tokens: HashSet<String>,
    failing_tokens: HashSet<String>,
    send_delay: Duration,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            invalid_tokens: HashSet::new(),
            failing_tokens: HashSet::new(),
            send_delay: Duration::from_millis(5),
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn invalid_token(mut self, token: &str) -> Self {
        self.invalid_tokens.insert(token.to_string());
        self
    }

    pub fn failing_token(mut self, token: &str) -> Self {
        self.failing_tokens.insert(token.to_string());
        self
    }

    pub fn with_send_delay(mut self, delay: Duration) -> Self {
        self.send_delay = delay;
        self
    }

    /// Tokens that were delivered successfully.
    pub fn sent_tokens(&self) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|(t, _)| t.clone())
            .collect()
    }

    pub fn sent(&self) -> Vec<(String, Alert)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PushTransport for MockTransport {
    async fn send(&self, token: &str, alert: &Alert) -> Result<(), DeliveryError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.send_delay).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.invalid_tokens.contains(token) {
            return Err(DeliveryError::InvalidToken);
        }
        if self.failing_tokens.contains(token) {
            return Err(DeliveryError::Other("service unavailable".to_string()));
        }
        self.sent
            .lock()
            .unwrap()
            .push((token.to_string(), alert.clone()));
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MemorySnapshotStore
// ---------------------------------------------------------------------------

/// Snapshot held in memory. Counts writes; reads and writes can be made to fail.
pub struct MemorySnapshotStore {
    entries: Mutex<Option<Vec<(EventId, FireEvent)>>>,
    writes: AtomicUsize,
    corrupt: AtomicBool,
    fail_writes: AtomicBool,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(None),
            writes: AtomicUsize::new(0),
            corrupt: AtomicBool::new(false),
            fail_writes: AtomicBool::new(false),
        }
    }

    /// Seed a snapshot as if a previous process had written it.
    pub fn with_events(events: Vec<FireEvent>) -> Self {
        let store = Self::new();
        *store.entries.lock().unwrap() = Some(events.into_iter().map(|e| (e.id, e)).collect());
        store
    }

    /// Successful writes so far.
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn stored_ids(&self) -> HashSet<EventId> {
        self.entries
            .lock()
            .unwrap()
            .iter()
            .flatten()
            .map(|(id, _)| *id)
            .collect()
    }

    pub fn set_corrupt(&self, corrupt: bool) {
        self.corrupt.store(corrupt, Ordering::SeqCst);
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn path() -> PathBuf {
        PathBuf::from("memory://snapshot")
    }
}

impl Default for MemorySnapshotStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SnapshotStore for MemorySnapshotStore {
    fn read_snapshot(&self) -> Result<Option<Vec<(EventId, FireEvent)>>, CacheError> {
        if self.corrupt.load(Ordering::SeqCst) {
            return Err(CacheError::Corrupt {
                path: Self::path(),
                reason: "truncated document".to_string(),
            });
        }
        Ok(self.entries.lock().unwrap().clone())
    }

    fn write_snapshot(&self, entries: &[(EventId, &FireEvent)]) -> Result<(), CacheError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(CacheError::Io {
                path: Self::path(),
                source: io::Error::new(io::ErrorKind::Other, "disk full"),
            });
        }
        let owned = entries.iter().map(|(id, e)| (*id, (*e).clone())).collect();
        *self.entries.lock().unwrap() = Some(owned);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
