//! In-memory mirror of the durable fire-event set.
//!
//! Every mutation is followed by a snapshot write so a restart resumes from
//! (at worst) a slightly stale cache instead of an empty one. Mutations only
//! ever describe writes the durable store has already committed; see
//! [`CacheUpdate`].

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info};

use firewatch_common::{CacheError, EventId, FireEvent, GeoPoint};

use crate::traits::SnapshotStore;

/// The cache shared by ingestion and retention. Holding the lock makes a
/// job's cache mutation and snapshot write one critical section.
pub type SharedCache = Arc<Mutex<EventCache>>;

/// A committed durable-store change, ready to be applied to the cache.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheUpdate {
    Inserted(Vec<FireEvent>),
    Evicted(Vec<EventId>),
}

pub struct EventCache {
    events: HashMap<EventId, FireEvent>,
    snapshots: Box<dyn SnapshotStore>,
}

impl EventCache {
    /// Load the persisted snapshot. A missing snapshot starts empty; an
    /// unreadable one is an error, never a silent reset.
    pub fn load(snapshots: Box<dyn SnapshotStore>) -> Result<Self, CacheError> {
        let events: HashMap<EventId, FireEvent> = match snapshots.read_snapshot()? {
            Some(entries) => {
                info!(events = entries.len(), "Cache loaded from snapshot");
                entries.into_iter().collect()
            }
            None => {
                info!("No cache snapshot found, starting empty");
                HashMap::new()
            }
        };
        Ok(Self { events, snapshots })
    }

    pub fn into_shared(self) -> SharedCache {
        Arc::new(Mutex::new(self))
    }

    /// Replace the whole cache with a full store scan, then snapshot.
    pub fn refresh_from_store(&mut self, events: Vec<FireEvent>) -> Result<(), CacheError> {
        let before = self.events.len();
        self.events = events.into_iter().map(|e| (e.id, e)).collect();
        info!(before, after = self.events.len(), "Cache refreshed from store");
        self.persist_snapshot()
    }

    pub fn values(&self) -> impl Iterator<Item = &FireEvent> {
        self.events.values()
    }

    /// Coordinates of every cached event, the "existing" side of the filter.
    pub fn points(&self) -> Vec<GeoPoint> {
        self.events.values().map(FireEvent::point).collect()
    }

    pub fn get(&self, id: &EventId) -> Option<&FireEvent> {
        self.events.get(id)
    }

    pub fn contains(&self, id: &EventId) -> bool {
        self.events.contains_key(id)
    }

    pub fn ids(&self) -> HashSet<EventId> {
        self.events.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Insert or replace one event, then snapshot.
    pub fn upsert(&mut self, event: FireEvent) -> Result<(), CacheError> {
        self.events.insert(event.id, event);
        self.persist_snapshot()
    }

    /// Remove one event, then snapshot.
    pub fn remove(&mut self, id: &EventId) -> Result<Option<FireEvent>, CacheError> {
        let removed = self.events.remove(id);
        self.persist_snapshot()?;
        Ok(removed)
    }

    /// Apply a committed store change with a single snapshot write.
    ///
    /// The in-memory change is kept even if the snapshot write fails: memory
    /// mirrors the committed store, and the next successful write catches the
    /// file up.
    pub fn apply(&mut self, update: CacheUpdate) -> Result<(), CacheError> {
        match update {
            CacheUpdate::Inserted(events) => {
                debug!(count = events.len(), "Applying inserts to cache");
                self.events.extend(events.into_iter().map(|e| (e.id, e)));
            }
            CacheUpdate::Evicted(ids) => {
                debug!(count = ids.len(), "Applying evictions to cache");
                for id in &ids {
                    self.events.remove(id);
                }
            }
        }
        self.persist_snapshot()
    }

    /// Write the full key/value set, replacing the previous snapshot.
    pub fn persist_snapshot(&self) -> Result<(), CacheError> {
        let mut entries: Vec<(EventId, &FireEvent)> =
            self.events.iter().map(|(id, e)| (*id, e)).collect();
        entries.sort_by(|a, b| a.1.recorded_at.cmp(&b.1.recorded_at).then(a.0.cmp(&b.0)));
        self.snapshots.write_snapshot(&entries)?;
        debug!(events = entries.len(), "Cache snapshot saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::testing::{fire_event, MemorySnapshotStore};

    fn cache_with(snapshots: &Arc<MemorySnapshotStore>) -> EventCache {
        EventCache::load(Box::new(snapshots.clone())).unwrap()
    }

    #[test]
    fn load_without_snapshot_starts_empty() {
        let snapshots = Arc::new(MemorySnapshotStore::new());
        let cache = cache_with(&snapshots);
        assert!(cache.is_empty());
        assert_eq!(snapshots.writes(), 0);
    }

    #[test]
    fn load_restores_previous_snapshot() {
        let snapshots = Arc::new(MemorySnapshotStore::new());
        let event = fire_event(38.0, 23.0);
        {
            let mut cache = cache_with(&snapshots);
            cache.upsert(event.clone()).unwrap();
        }
        let cache = cache_with(&snapshots);
        assert_eq!(cache.get(&event.id), Some(&event));
    }

    #[test]
    fn corrupt_snapshot_fails_load() {
        let snapshots = Arc::new(MemorySnapshotStore::new());
        snapshots.set_corrupt(true);
        assert!(matches!(
            EventCache::load(Box::new(snapshots.clone())),
            Err(CacheError::Corrupt { .. })
        ));
    }

    #[test]
    fn every_mutation_is_snapshotted() {
        let snapshots = Arc::new(MemorySnapshotStore::new());
        let mut cache = cache_with(&snapshots);
        let a = fire_event(38.0, 23.0);
        let b = fire_event(39.0, 22.0);

        cache.upsert(a.clone()).unwrap();
        cache.upsert(b.clone()).unwrap();
        assert_eq!(snapshots.writes(), 2);
        assert_eq!(snapshots.stored_ids(), cache.ids());

        assert_eq!(cache.remove(&a.id).unwrap(), Some(a));
        assert_eq!(snapshots.writes(), 3);
        assert_eq!(snapshots.stored_ids(), HashSet::from([b.id]));
    }

    #[test]
    fn refresh_replaces_contents() {
        let snapshots = Arc::new(MemorySnapshotStore::new());
        let mut cache = cache_with(&snapshots);
        let stale = fire_event(38.0, 23.0);
        cache.upsert(stale.clone()).unwrap();

        let fresh = vec![fire_event(40.0, 22.0), fire_event(41.0, 24.0)];
        cache.refresh_from_store(fresh.clone()).unwrap();

        assert!(!cache.contains(&stale.id));
        assert_eq!(cache.len(), 2);
        assert_eq!(snapshots.stored_ids(), cache.ids());
    }

    #[test]
    fn apply_writes_one_snapshot_per_batch() {
        let snapshots = Arc::new(MemorySnapshotStore::new());
        let mut cache = cache_with(&snapshots);
        let events: Vec<_> = (0..5).map(|i| fire_event(38.0 + i as f64, 23.0)).collect();
        let ids: Vec<_> = events.iter().map(|e| e.id).collect();

        cache.apply(CacheUpdate::Inserted(events)).unwrap();
        assert_eq!(cache.len(), 5);
        assert_eq!(snapshots.writes(), 1);

        cache.apply(CacheUpdate::Evicted(ids[..3].to_vec())).unwrap();
        assert_eq!(cache.len(), 2);
        assert_eq!(snapshots.writes(), 2);
    }

    #[test]
    fn failed_snapshot_keeps_memory_change() {
        let snapshots = Arc::new(MemorySnapshotStore::new());
        let mut cache = cache_with(&snapshots);
        snapshots.set_fail_writes(true);

        let event = fire_event(38.0, 23.0);
        assert!(cache.apply(CacheUpdate::Inserted(vec![event.clone()])).is_err());
        assert!(cache.contains(&event.id));

        snapshots.set_fail_writes(false);
        cache.persist_snapshot().unwrap();
        assert_eq!(snapshots.stored_ids(), HashSet::from([event.id]));
    }
}
