use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use super::CacheBackend;

#[derive(Serialize, Deserialize)]
struct Record {
    value: serde_json::Value,
    expires_at: DateTime<Utc>,
    created_at: DateTime<Utc>,
    last_accessed: DateTime<Utc>,
}

/// On-disk cache backend: one file per key, named by a stable hash of the key
/// string, holding a JSON-encoded [`Record`]. Writes go through a temp file
/// plus rename for atomicity, matching the persistence format's write
/// discipline. Guarded by a single mutex since file cache traffic is adapter
/// traffic, not request-hot-path traffic.
pub struct FileCache {
    dir: PathBuf,
    lock: Mutex<()>,
}

impl FileCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        if let Err(err) = std::fs::create_dir_all(&dir) {
            tracing::warn!(?err, dir = %dir.display(), "failed to create cache directory");
        }
        Self {
            dir,
            lock: Mutex::new(()),
        }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{:032x}.json", stable_hash(key)))
    }

    fn read_record(path: &Path) -> Option<Record> {
        let bytes = std::fs::read(path).ok()?;
        match serde_json::from_slice::<Record>(&bytes) {
            Ok(record) => Some(record),
            Err(err) => {
                tracing::warn!(?err, path = %path.display(), "corrupt cache file, removing");
                let _ = std::fs::remove_file(path);
                None
            }
        }
    }

    fn write_record(path: &Path, record: &Record) -> std::io::Result<()> {
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_vec(record)?)?;
        std::fs::rename(&tmp, path)
    }
}

/// 128-bit FNV-1a, enough to make filename collisions practically impossible
/// without pulling in a hashing crate just for this.
fn stable_hash(key: &str) -> u128 {
    let mut hash: u128 = 0x6c62272e07bb014262b821756295c58d;
    const PRIME: u128 = 0x0000000001000000000000000000013b;
    for byte in key.as_bytes() {
        hash ^= *byte as u128;
        hash = hash.wrapping_mul(PRIME);
    }
    hash
}

#[async_trait]
impl CacheBackend for FileCache {
    async fn get_raw(&self, key: &str) -> Option<serde_json::Value> {
        let _guard = self.lock.lock().await;
        let path = self.path_for(key);
        let record = Self::read_record(&path)?;
        if record.expires_at < Utc::now() {
            let _ = std::fs::remove_file(&path);
            return None;
        }
        let mut record = record;
        record.last_accessed = Utc::now();
        let _ = Self::write_record(&path, &record);
        Some(record.value)
    }

    async fn set_raw(&self, key: &str, value: serde_json::Value, ttl: Duration) {
        let _guard = self.lock.lock().await;
        let path = self.path_for(key);
        let now = Utc::now();
        let record = Record {
            value,
            expires_at: now + chrono::Duration::from_std(ttl).unwrap_or_default(),
            created_at: now,
            last_accessed: now,
        };
        if let Err(err) = Self::write_record(&path, &record) {
            tracing::warn!(?err, path = %path.display(), "failed to write cache file");
        }
    }

    async fn delete(&self, key: &str) {
        let _guard = self.lock.lock().await;
        let _ = std::fs::remove_file(self.path_for(key));
    }

    async fn clear(&self) {
        let _guard = self.lock.lock().await;
        if let Ok(entries) = std::fs::read_dir(&self.dir) {
            for entry in entries.flatten() {
                let _ = std::fs::remove_file(entry.path());
            }
        }
    }

    async fn cleanup(&self) -> usize {
        let _guard = self.lock.lock().await;
        let mut removed = 0;
        let Ok(entries) = std::fs::read_dir(&self.dir) else {
            return 0;
        };
        let now = Utc::now();
        for entry in entries.flatten() {
            let path = entry.path();
            if let Some(record) = Self::read_record(&path)
                && record.expires_at < now
            {
                let _ = std::fs::remove_file(&path);
                removed += 1;
            }
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_then_get_round_trips() {
        let dir = std::env::temp_dir().join(format!("trendwatch-cache-test-{}", stable_hash("a")));
        let cache = FileCache::new(&dir);
        cache
            .set_raw("a", serde_json::json!({"v": 1}), Duration::from_secs(5))
            .await;
        assert_eq!(cache.get_raw("a").await, Some(serde_json::json!({"v": 1})));
        cache.clear().await;
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn expired_entry_reads_as_absent_and_is_swept() {
        let dir = std::env::temp_dir().join(format!("trendwatch-cache-test-{}", stable_hash("b")));
        let cache = FileCache::new(&dir);
        cache
            .set_raw("b", serde_json::json!(1), Duration::from_millis(1))
            .await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(cache.get_raw("b").await, None);
        let _ = std::fs::remove_dir_all(&dir);
    }
}
