use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use firewatch_common::{EventId, RetentionPolicy};

use crate::cache::{CacheUpdate, SharedCache};
use crate::error::PipelineError;
use crate::stats::SweepStats;
use crate::traits::DurableStore;

/// Deletes expired events from the store and the cache together.
pub struct RetentionSweeper {
    store: Arc<dyn DurableStore>,
    cache: SharedCache,
    policy: RetentionPolicy,
}

impl RetentionSweeper {
    pub fn new(store: Arc<dyn DurableStore>, cache: SharedCache, policy: RetentionPolicy) -> Self {
        Self {
            store,
            cache,
            policy,
        }
    }

    pub async fn run(&self) -> Result<SweepStats, PipelineError> {
        self.run_at(Utc::now()).await
    }

    /// Sweep as if the current time were `now`.
    ///
    /// The store delete is atomic. Once it commits, the deleted ids and any
    /// cached event already past the same cutoff leave the cache in one
    /// snapshot write. A failed delete leaves the cache untouched.
    pub async fn run_at(&self, now: DateTime<Utc>) -> Result<SweepStats, PipelineError> {
        let cutoff = self.policy.cutoff(now);
        let mut stats = SweepStats {
            cutoff: Some(cutoff),
            ..Default::default()
        };

        let mut cache = self.cache.lock().await;
        let deleted = self.store.delete_expired(&cutoff).await?;
        stats.deleted = deleted.len() as u32;

        // Anything cached past the cutoff is gone from the store now too.
        let mut evict: HashSet<EventId> = deleted.into_iter().collect();
        evict.extend(
            cache
                .values()
                .filter(|e| cutoff.is_expired(e))
                .map(|e| e.id),
        );
        evict.retain(|id| cache.contains(id));

        if evict.is_empty() {
            info!(%cutoff, deleted = stats.deleted, "No cached fire events expired");
            return Ok(stats);
        }

        stats.evicted_from_cache = evict.len() as u32;
        if let Err(e) = cache.apply(CacheUpdate::Evicted(evict.into_iter().collect())) {
            stats.snapshot_failed = true;
            warn!(error = %e, "Cache evicted but snapshot write failed");
        }

        info!("Expired fire events removed. {stats}");
        Ok(stats)
    }
}
