use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use retainer::Cache;
use tokio::sync::Mutex;
use tokio::time::Instant;

use super::CacheBackend;

/// In-process memory cache backed by `retainer::Cache`, with a spawned
/// background `monitor` task doing the periodic expiry sweep instead of a
/// hand-rolled interval loop. A side table of expiry instants is kept
/// alongside it purely so `cleanup()` can report how many entries it removed
/// -- `retainer`'s monitor sweeps silently and exposes no count.
pub struct MemoryCache {
    inner: Arc<Cache<String, serde_json::Value>>,
    expires_at: Mutex<HashMap<String, Instant>>,
    _monitor: tokio::task::JoinHandle<()>,
}

impl MemoryCache {
    pub fn new() -> Self {
        let inner = Arc::new(Cache::new());
        let monitor_handle = inner.clone();
        let monitor = tokio::spawn(async move {
            monitor_handle.monitor(4, 0.25, Duration::from_secs(10)).await;
        });
        Self {
            inner,
            expires_at: Mutex::new(HashMap::new()),
            _monitor: monitor,
        }
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CacheBackend for MemoryCache {
    async fn get_raw(&self, key: &str) -> Option<serde_json::Value> {
        self.inner.get(&key.to_string()).await.map(|guard| guard.clone())
    }

    async fn set_raw(&self, key: &str, value: serde_json::Value, ttl: Duration) {
        self.inner.insert(key.to_string(), value, ttl).await;
        self.expires_at.lock().await.insert(key.to_string(), Instant::now() + ttl);
    }

    async fn delete(&self, key: &str) {
        self.inner.remove(&key.to_string()).await;
        self.expires_at.lock().await.remove(key);
    }

    async fn clear(&self) {
        self.inner.clear().await;
        self.expires_at.lock().await.clear();
    }

    async fn cleanup(&self) -> usize {
        let now = Instant::now();
        let mut expires_at = self.expires_at.lock().await;
        let expired: Vec<String> = expires_at
            .iter()
            .filter(|(_, at)| **at <= now)
            .map(|(k, _)| k.clone())
            .collect();
        for key in &expired {
            self.inner.remove(key).await;
            expires_at.remove(key);
        }
        expired.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_then_get_round_trips() {
        let cache = MemoryCache::new();
        cache
            .set_raw("k", serde_json::json!({"v": 1}), Duration::from_secs(5))
            .await;
        let got = cache.get_raw("k").await;
        assert_eq!(got, Some(serde_json::json!({"v": 1})));
    }

    #[tokio::test]
    async fn missing_key_is_absent() {
        let cache = MemoryCache::new();
        assert_eq!(cache.get_raw("missing").await, None);
    }

    #[tokio::test]
    async fn delete_removes_entry() {
        let cache = MemoryCache::new();
        cache
            .set_raw("k", serde_json::json!(1), Duration::from_secs(5))
            .await;
        cache.delete("k").await;
        assert_eq!(cache.get_raw("k").await, None);
    }

    #[tokio::test]
    async fn cleanup_reports_and_removes_expired_entries() {
        let cache = MemoryCache::new();
        cache
            .set_raw("expired", serde_json::json!(1), Duration::from_millis(1))
            .await;
        cache
            .set_raw("fresh", serde_json::json!(2), Duration::from_secs(60))
            .await;
        tokio::time::sleep(Duration::from_millis(20)).await;

        let removed = cache.cleanup().await;
        assert_eq!(removed, 1);
        assert_eq!(cache.get_raw("fresh").await, Some(serde_json::json!(2)));
    }
}
