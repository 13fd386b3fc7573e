// Trait abstractions for the pipeline's collaborators.
//
// FeedClient wraps the FIRMS client, DurableStore and SubscriberStore wrap the
// Postgres FireStore, PushTransport wraps FCM, SnapshotStore wraps the cache
// file. The mocks in `testing` implement the same seams, so the pipeline is
// tested without network, database, or disk.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use fcm_client::{FcmClient, FcmError, PushMessage};
use firewatch_common::{
    CacheError, DeliveryError, Detection, EventId, ExpiryCutoff, FeedRecord, FetchError,
    FireEvent, StoreError, Subscriber,
};
use firewatch_store::FireStore;
use firms_client::{CountryQuery, FirmsClient, FirmsError};

use crate::notify::Alert;

// ---------------------------------------------------------------------------
// FeedClient
// ---------------------------------------------------------------------------

#[async_trait]
pub trait FeedClient: Send + Sync {
    /// Pull the current batch of raw detection records.
    async fn fetch_records(&self) -> Result<Vec<FeedRecord>, FetchError>;
}

/// FIRMS country feed bound to one query.
pub struct FirmsFeed {
    client: FirmsClient,
    query: CountryQuery,
}

impl FirmsFeed {
    pub fn new(client: FirmsClient, query: CountryQuery) -> Self {
        Self { client, query }
    }
}

#[async_trait]
impl FeedClient for FirmsFeed {
    async fn fetch_records(&self) -> Result<Vec<FeedRecord>, FetchError> {
        self.client
            .country_detections(&self.query)
            .await
            .map_err(|e| match e {
                FirmsError::Network(msg) => FetchError::Network(msg),
                FirmsError::Api { status, message } => FetchError::Status { status, message },
                FirmsError::Parse(msg) => FetchError::Parse(msg),
            })
    }
}

// ---------------------------------------------------------------------------
// DurableStore / SubscriberStore
// ---------------------------------------------------------------------------

#[async_trait]
pub trait DurableStore: Send + Sync {
    /// Every persisted event.
    async fn scan_all(&self) -> Result<Vec<FireEvent>, StoreError>;

    /// Atomically persist a batch. Returns assigned ids in input order.
    async fn insert_batch(
        &self,
        detections: &[Detection],
        recorded_at: DateTime<Utc>,
    ) -> Result<Vec<EventId>, StoreError>;

    /// Atomically delete every event strictly older than the cutoff.
    /// Returns the deleted ids.
    async fn delete_expired(&self, cutoff: &ExpiryCutoff) -> Result<Vec<EventId>, StoreError>;
}

#[async_trait]
pub trait SubscriberStore: Send + Sync {
    async fn subscribers(&self) -> Result<Vec<Subscriber>, StoreError>;

    /// Forget a delivery token the transport reported as invalid.
    async fn clear_subscriber_token(&self, subscriber_id: &str) -> Result<(), StoreError>;
}

#[async_trait]
impl DurableStore for FireStore {
    async fn scan_all(&self) -> Result<Vec<FireEvent>, StoreError> {
        self.scan_all().await
    }

    async fn insert_batch(
        &self,
        detections: &[Detection],
        recorded_at: DateTime<Utc>,
    ) -> Result<Vec<EventId>, StoreError> {
        self.insert_batch(detections, recorded_at).await
    }

    async fn delete_expired(&self, cutoff: &ExpiryCutoff) -> Result<Vec<EventId>, StoreError> {
        self.delete_expired(cutoff).await
    }
}

#[async_trait]
impl SubscriberStore for FireStore {
    async fn subscribers(&self) -> Result<Vec<Subscriber>, StoreError> {
        self.subscribers().await
    }

    async fn clear_subscriber_token(&self, subscriber_id: &str) -> Result<(), StoreError> {
        self.clear_subscriber_token(subscriber_id).await
    }
}

// ---------------------------------------------------------------------------
// PushTransport
// ---------------------------------------------------------------------------

#[async_trait]
pub trait PushTransport: Send + Sync {
    /// Send one alert to one device. Best effort, no retries.
    async fn send(&self, token: &str, alert: &Alert) -> Result<(), DeliveryError>;
}

#[async_trait]
impl PushTransport for FcmClient {
    async fn send(&self, token: &str, alert: &Alert) -> Result<(), DeliveryError> {
        let message = PushMessage {
            token: token.to_string(),
            title: alert.title.clone(),
            body: alert.body.clone(),
            data: alert.data.clone(),
        };
        match FcmClient::send(self, &message).await {
            Ok(_) => Ok(()),
            Err(FcmError::InvalidToken { .. }) => Err(DeliveryError::InvalidToken),
            Err(e) => Err(DeliveryError::Other(e.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// SnapshotStore
// ---------------------------------------------------------------------------

/// Where the event cache is persisted between process restarts.
pub trait SnapshotStore: Send + Sync {
    /// `Ok(None)` when no snapshot has been written yet.
    fn read_snapshot(&self) -> Result<Option<Vec<(EventId, FireEvent)>>, CacheError>;

    /// Replace the previous snapshot with `entries`.
    fn write_snapshot(&self, entries: &[(EventId, &FireEvent)]) -> Result<(), CacheError>;
}

/// Lets tests keep a handle on the store the cache owns.
impl<S: SnapshotStore + ?Sized> SnapshotStore for Arc<S> {
    fn read_snapshot(&self) -> Result<Option<Vec<(EventId, FireEvent)>>, CacheError> {
        (**self).read_snapshot()
    }

    fn write_snapshot(&self, entries: &[(EventId, &FireEvent)]) -> Result<(), CacheError> {
        (**self).write_snapshot(entries)
    }
}
