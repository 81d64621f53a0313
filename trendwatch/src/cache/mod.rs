mod file;
mod memory;

pub use file::FileCache;
pub use memory::MemoryCache;

use std::time::Duration;

use async_trait::async_trait;
use serde::{Serialize, de::DeserializeOwned};

use crate::error::AdapterError;

/// Uniform get/set/delete/cleanup contract shared by the memory and file cache
/// backends. `retainer::Cache` backs the memory variant directly; the file
/// variant hand-rolls the same TTL bookkeeping against one file per key.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    async fn get_raw(&self, key: &str) -> Option<serde_json::Value>;
    async fn set_raw(&self, key: &str, value: serde_json::Value, ttl: Duration);
    async fn delete(&self, key: &str);
    async fn clear(&self);
    /// Sweeps expired entries eagerly, returning how many were removed.
    /// Both backends also sweep themselves on a background interval; this is
    /// for tests and for the CLI's explicit maintenance path.
    async fn cleanup(&self) -> usize;
}

/// Wraps a fallible, cacheable computation behind the given backend. The key
/// is the caller-supplied namespace plus a stable fingerprint of the
/// arguments -- callers build that fingerprint with [`fingerprint`].
pub async fn cached<T, F>(
    backend: &dyn CacheBackend,
    key: &str,
    ttl: Duration,
    compute: F,
) -> Result<T, AdapterError>
where
    T: Serialize + DeserializeOwned,
    F: std::future::Future<Output = Result<T, AdapterError>>,
{
    if let Some(raw) = backend.get_raw(key).await {
        match serde_json::from_value::<T>(raw) {
            Ok(value) => return Ok(value),
            Err(err) => {
                tracing::warn!(key, ?err, "cached value failed to deserialize, recomputing");
            }
        }
    }

    let value = compute.await?;
    let encoded = serde_json::to_value(&value)
        .map_err(|err| AdapterError::Cache(format!("failed to encode cache value: {err}")))?;
    backend.set_raw(key, encoded, ttl).await;
    Ok(value)
}

/// Stable, order-independent fingerprint of a namespace plus a set of
/// primitive argument strings, used as a cache key. Non-primitive arguments
/// should be pre-formatted by the caller (e.g. a sorted, joined list).
pub fn fingerprint(namespace: &str, args: &[&str]) -> String {
    use std::fmt::Write;
    let mut out = String::from(namespace);
    for a in args {
        let _ = write!(out, "|{a}");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_is_deterministic_and_namespaced() {
        let a = fingerprint("adapters::video::fetch", &["KR", "20"]);
        let b = fingerprint("adapters::video::fetch", &["KR", "20"]);
        let c = fingerprint("adapters::portal::fetch", &["KR", "20"]);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
