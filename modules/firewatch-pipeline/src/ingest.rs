//! One ingestion run: fetch → parse → filter → commit → apply → notify.
//!
//! The cache lock is held from filtering until the committed batch is applied,
//! so a concurrent retention sweep cannot interleave. The cache is only touched
//! after the durable batch commit succeeds.

use std::sync::Arc;

use chrono::{DateTime, SubsecRound, Utc};
use tracing::{info, warn};

use firewatch_common::{Detection, FilterPolicy, FireEvent, StoreError};

use crate::cache::{CacheUpdate, SharedCache};
use crate::error::PipelineError;
use crate::notify::NotificationFanout;
use crate::spatial_filter::filter_batch;
use crate::stats::IngestStats;
use crate::traits::{DurableStore, FeedClient};

pub struct IngestionPipeline {
    feed: Arc<dyn FeedClient>,
    store: Arc<dyn DurableStore>,
    cache: SharedCache,
    policy: FilterPolicy,
    fanout: Option<Arc<NotificationFanout>>,
}

impl IngestionPipeline {
    pub fn new(
        feed: Arc<dyn FeedClient>,
        store: Arc<dyn DurableStore>,
        cache: SharedCache,
        policy: FilterPolicy,
    ) -> Self {
        Self {
            feed,
            store,
            cache,
            policy,
            fanout: None,
        }
    }

    /// Alert nearby subscribers for every persisted event.
    pub fn with_fanout(mut self, fanout: Arc<NotificationFanout>) -> Self {
        self.fanout = Some(fanout);
        self
    }

    pub async fn run(&self) -> Result<IngestStats, PipelineError> {
        self.run_at(Utc::now()).await
    }

    /// Run with an explicit persistence timestamp.
    pub async fn run_at(&self, now: DateTime<Utc>) -> Result<IngestStats, PipelineError> {
        let mut stats = IngestStats::default();

        // --- Fetch ---
        let records = self.feed.fetch_records().await?;
        stats.fetched = records.len() as u32;

        // --- Parse ---
        let mut detections = Vec::with_capacity(records.len());
        for record in &records {
            match Detection::from_record(record) {
                Ok(d) => detections.push(d),
                Err(e) => {
                    stats.unparseable += 1;
                    warn!(error = %e, "Skipping unparseable feed record");
                }
            }
        }

        // Postgres keeps microseconds; match it so cache and store agree.
        let recorded_at = now.trunc_subsecs(6);

        let persisted = {
            let mut cache = self.cache.lock().await;

            // --- Filter ---
            let existing = cache.points();
            let (survivors, filter_stats) = filter_batch(detections, &existing, &self.policy);
            stats.filter = filter_stats;

            if survivors.is_empty() {
                info!(
                    fetched = stats.fetched,
                    cached = existing.len(),
                    "No new fire events. {stats}"
                );
                return Ok(stats);
            }

            // --- Commit ---
            let ids = self.store.insert_batch(&survivors, recorded_at).await?;
            if ids.len() != survivors.len() {
                return Err(StoreError::BatchMismatch {
                    expected: survivors.len(),
                    returned: ids.len(),
                }
                .into());
            }

            let events: Vec<FireEvent> = ids
                .into_iter()
                .zip(survivors)
                .map(|(id, detection)| FireEvent::new(id, detection, recorded_at))
                .collect();
            stats.persisted = events.len() as u32;

            // --- Apply ---
            if let Err(e) = cache.apply(CacheUpdate::Inserted(events.clone())) {
                stats.snapshot_failed = true;
                warn!(error = %e, "Cache updated but snapshot write failed");
            }

            events
        };

        // --- Notify ---
        if let Some(fanout) = &self.fanout {
            for event in &persisted {
                match fanout.notify(event).await {
                    Ok(fanout_stats) => stats.notifications.absorb(&fanout_stats),
                    Err(e) => warn!(event_id = %event.id, error = %e, "Subscriber scan failed, skipping alerts"),
                }
            }
        }

        info!("Fire events stored. {stats}");
        Ok(stats)
    }
}
