use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{FusedKeyword, Snapshot, Topic};

/// On-disk form of a [`Snapshot`]. Deliberately a separate, smaller type: the
/// raw-index is large and reconstructable from a fresh aggregation run, so
/// it is not persisted. Missing fields on read default to empty, so the
/// format can grow new optional fields without a version bump.
#[derive(Serialize, Deserialize, Default)]
pub struct PersistedSnapshot {
    #[serde(default)]
    pub hot_keywords: Vec<FusedKeyword>,
    #[serde(default)]
    pub topics: Vec<Topic>,
    pub last_update: Option<DateTime<Utc>>,
    // bookmark lookups aren't part of the HTTP surface this service exposes;
    // the field stays in the on-disk format so a file written by a version
    // that does support them round-trips without loss.
    #[serde(default)]
    pub bookmarks: Vec<String>,
}

impl From<&Snapshot> for PersistedSnapshot {
    fn from(s: &Snapshot) -> Self {
        PersistedSnapshot {
            hot_keywords: s.hot_keywords.clone(),
            topics: s.topics.clone(),
            last_update: Some(s.timestamp),
            bookmarks: Vec::new(),
        }
    }
}

/// Writes the snapshot cache file with write-then-rename for atomicity, so a
/// crash mid-write never leaves a truncated file behind.
pub fn save(path: &Path, snapshot: &Snapshot) -> std::io::Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }
    let persisted = PersistedSnapshot::from(snapshot);
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, serde_json::to_vec_pretty(&persisted)?)?;
    std::fs::rename(&tmp, path)
}

/// Loads the snapshot cache file, returning `None` if it is absent or
/// unparsable rather than failing startup.
pub fn load(path: &Path) -> Option<PersistedSnapshot> {
    let bytes = std::fs::read(path).ok()?;
    match serde_json::from_slice(&bytes) {
        Ok(snapshot) => Some(snapshot),
        Err(err) => {
            tracing::warn!(?err, path = %path.display(), "failed to parse persisted snapshot, ignoring");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_disk() {
        let dir = std::env::temp_dir().join("trendwatch-persistence-test");
        let path = dir.join("snapshot.json");
        let snapshot = Snapshot::empty();

        save(&path, &snapshot).unwrap();
        let loaded = load(&path).unwrap();

        assert_eq!(loaded.last_update, Some(snapshot.timestamp));
        assert!(loaded.hot_keywords.is_empty());
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn missing_file_loads_as_none() {
        let path = std::env::temp_dir().join("trendwatch-persistence-test-missing.json");
        let _ = std::fs::remove_file(&path);
        assert!(load(&path).is_none());
    }
}
