pub mod news;
pub mod portal;
pub mod public_trends;
pub mod video;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::cache::CacheBackend;
use crate::config::Config;
use crate::error::AdapterError;
use crate::http::{Fetcher, RobotsGate};
use crate::model::RawTrend;

/// Stand-in for a real headless-browser rendering capability, which this
/// service doesn't implement. Adapters that would need JS-rendered pages
/// hold a reference to this trait; production wiring would back it with a
/// browser-automation client, tests inject a deterministic fake.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn render_and_extract(
        &self,
        url: &str,
        selectors: &[(&str, &str)],
    ) -> Result<Vec<std::collections::HashMap<String, String>>, AdapterError>;
}

/// A `PageFetcher` that always reports the capability is unavailable. Wired
/// in by default since no real browser-automation integration is in scope;
/// adapters that depend on it degrade to an empty result.
pub struct UnavailablePageFetcher;

#[async_trait]
impl PageFetcher for UnavailablePageFetcher {
    async fn render_and_extract(
        &self,
        _url: &str,
        _selectors: &[(&str, &str)],
    ) -> Result<Vec<std::collections::HashMap<String, String>>, AdapterError> {
        Err(AdapterError::Api {
            api_name: "page_fetcher".into(),
            endpoint: _url.to_string(),
            code: "unavailable".into(),
        })
    }
}

/// Shared capabilities every adapter call is handed. Cheap to clone (all
/// fields are reference-counted or `Copy`).
#[derive(Clone)]
pub struct FetchContext {
    pub http: Fetcher,
    pub cache: Arc<dyn CacheBackend>,
    pub cache_ttl: Duration,
    pub robots: Arc<RobotsGate>,
    pub page_fetcher: Arc<dyn PageFetcher>,
    pub config: Arc<Config>,
}

/// Uniform capability every source family implements, regardless of whether
/// the transport underneath is a JSON API, an RSS feed, or HTML scraping.
#[async_trait]
pub trait Adapter: Send + Sync {
    /// Stable identity used in logs and in the aggregator's deterministic
    /// adapter ordering.
    fn name(&self) -> &'static str;

    async fn fetch(&self, ctx: &FetchContext, limit: usize) -> Result<Vec<RawTrend>, AdapterError>;
}

/// Deduplicates a single adapter's own output by normalized keyword, keeping
/// the entry with the best (lowest) rank, or the first-seen one when neither
/// carries a rank. Adapters call this before returning so the aggregator
/// never has to special-case within-source duplicates.
pub fn dedup_by_best_rank(items: Vec<RawTrend>) -> Vec<RawTrend> {
    use crate::model::NormalizedKey;
    use std::collections::HashMap;

    let mut best: HashMap<NormalizedKey, RawTrend> = HashMap::new();
    let mut order: Vec<NormalizedKey> = Vec::new();

    for item in items {
        let key = NormalizedKey::new(&item.keyword);
        match best.get(&key) {
            None => {
                order.push(key.clone());
                best.insert(key, item);
            }
            Some(existing) => {
                let replace = match (item.rank, existing.rank) {
                    (Some(new_rank), Some(old_rank)) => new_rank < old_rank,
                    (Some(_), None) => true,
                    _ => false,
                };
                if replace {
                    best.insert(key, item);
                }
            }
        }
    }

    order.into_iter().filter_map(|k| best.remove(&k)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Source;

    #[test]
    fn dedup_keeps_best_rank() {
        let items = vec![
            RawTrend::new("ai", Source::PortalN).with_rank(3),
            RawTrend::new("AI", Source::PortalN).with_rank(1),
            RawTrend::new("ev", Source::PortalN).with_rank(2),
        ];
        let out = dedup_by_best_rank(items);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].rank, Some(1));
        assert_eq!(out[1].keyword, "ev");
    }
}
