//! File-backed cache snapshot.
//!
//! The snapshot is a versioned JSON document holding `[id, event]` pairs. It
//! is rewritten whole on every save: serialized into a temp file in the same
//! directory, then renamed over the previous snapshot, so a crash mid-write
//! leaves the old snapshot intact.

use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use firewatch_common::{CacheError, EventId, FireEvent};

use crate::traits::SnapshotStore;

pub const SNAPSHOT_VERSION: u32 = 1;

#[derive(Serialize)]
struct SnapshotOut<'a> {
    version: u32,
    entries: &'a [(EventId, &'a FireEvent)],
}

#[derive(Deserialize)]
struct SnapshotIn {
    entries: Vec<(EventId, FireEvent)>,
}

#[derive(Deserialize)]
struct VersionProbe {
    version: u32,
}

pub struct FileSnapshotStore {
    path: PathBuf,
}

impl FileSnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_err(&self, source: std::io::Error) -> CacheError {
        CacheError::Io {
            path: self.path.clone(),
            source,
        }
    }

    fn corrupt(&self, reason: impl Into<String>) -> CacheError {
        CacheError::Corrupt {
            path: self.path.clone(),
            reason: reason.into(),
        }
    }
}

impl SnapshotStore for FileSnapshotStore {
    fn read_snapshot(&self) -> Result<Option<Vec<(EventId, FireEvent)>>, CacheError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(self.io_err(e)),
        };

        let probe: VersionProbe = serde_json::from_str(&content)
            .map_err(|e| self.corrupt(format!("unreadable header: {e}")))?;
        if probe.version != SNAPSHOT_VERSION {
            return Err(CacheError::UnsupportedVersion {
                path: self.path.clone(),
                found: probe.version,
                expected: SNAPSHOT_VERSION,
            });
        }

        let snapshot: SnapshotIn = serde_json::from_str(&content)
            .map_err(|e| self.corrupt(format!("unreadable entries: {e}")))?;

        if let Some((id, event)) = snapshot.entries.iter().find(|(id, ev)| *id != ev.id) {
            return Err(self.corrupt(format!(
                "entry key {id} does not match event id {}",
                event.id
            )));
        }

        Ok(Some(snapshot.entries))
    }

    fn write_snapshot(&self, entries: &[(EventId, &FireEvent)]) -> Result<(), CacheError> {
        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir).map_err(|e| self.io_err(e))?;

        let tmp = NamedTempFile::new_in(&dir).map_err(|e| self.io_err(e))?;
        {
            let mut writer = BufWriter::new(tmp.as_file());
            serde_json::to_writer(
                &mut writer,
                &SnapshotOut {
                    version: SNAPSHOT_VERSION,
                    entries,
                },
            )
            .map_err(|e| self.io_err(e.into()))?;
            writer.flush().map_err(|e| self.io_err(e))?;
        }
        tmp.as_file().sync_all().map_err(|e| self.io_err(e))?;
        tmp.persist(&self.path).map_err(|e| self.io_err(e.error))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use chrono::{NaiveDate, Utc};
    use firewatch_common::Detection;
    use uuid::Uuid;

    use super::*;

    fn event(lat: f64) -> FireEvent {
        FireEvent::new(
            Uuid::new_v4(),
            Detection {
                latitude: lat,
                longitude: 23.0,
                acq_date: NaiveDate::from_ymd_opt(2024, 8, 11).unwrap(),
                attributes: BTreeMap::from([("frp".to_string(), "7.49".to_string())]),
            },
            Utc::now(),
        )
    }

    #[test]
    fn missing_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSnapshotStore::new(dir.path().join("cache.json"));
        assert!(store.read_snapshot().unwrap().is_none());
    }

    #[test]
    fn write_then_read_preserves_entries() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSnapshotStore::new(dir.path().join("nested/cache.json"));
        let a = event(38.0);
        let b = event(39.0);

        store.write_snapshot(&[(a.id, &a), (b.id, &b)]).unwrap();
        let loaded = store.read_snapshot().unwrap().unwrap();
        assert_eq!(loaded, vec![(a.id, a.clone()), (b.id, b)]);

        // Overwrite, not append
        store.write_snapshot(&[(a.id, &a)]).unwrap();
        assert_eq!(store.read_snapshot().unwrap().unwrap().len(), 1);
    }

    #[test]
    fn garbage_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");
        fs::write(&path, "{not json").unwrap();
        let err = FileSnapshotStore::new(&path).read_snapshot().unwrap_err();
        assert!(matches!(err, CacheError::Corrupt { .. }), "got {err:?}");
    }

    #[test]
    fn legacy_unversioned_array_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");
        fs::write(&path, r#"[["abc", {"latitude": "38.0"}]]"#).unwrap();
        let err = FileSnapshotStore::new(&path).read_snapshot().unwrap_err();
        assert!(matches!(err, CacheError::Corrupt { .. }));
    }

    #[test]
    fn future_version_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");
        fs::write(&path, r#"{"version": 2, "entries": []}"#).unwrap();
        let err = FileSnapshotStore::new(&path).read_snapshot().unwrap_err();
        assert!(matches!(
            err,
            CacheError::UnsupportedVersion { found: 2, expected: 1, .. }
        ));
    }

    #[test]
    fn mismatched_key_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSnapshotStore::new(dir.path().join("cache.json"));
        let a = event(38.0);
        store.write_snapshot(&[(Uuid::new_v4(), &a)]).unwrap();
        assert!(matches!(
            store.read_snapshot().unwrap_err(),
            CacheError::Corrupt { .. }
        ));
    }
}
