use async_trait::async_trait;
use serde::Deserialize;

use crate::cache::{cached, fingerprint};
use crate::error::AdapterError;
use crate::model::{RawTrend, Source};

use super::{Adapter, FetchContext};

/// Daily RSS feed of a public "trending searches" source.
pub struct PublicTrendsRssAdapter {
    pub feed_url: String,
}

#[async_trait]
impl Adapter for PublicTrendsRssAdapter {
    fn name(&self) -> &'static str {
        "public_trends_rss"
    }

    async fn fetch(&self, ctx: &FetchContext, limit: usize) -> Result<Vec<RawTrend>, AdapterError> {
        let key = fingerprint(
            "adapters::public_trends::rss",
            &[&self.feed_url, &limit.to_string()],
        );
        let http = ctx.http.clone();
        let feed_url = self.feed_url.clone();

        cached(ctx.cache.as_ref(), &key, ctx.cache_ttl, async move {
            let bytes = http.get_bytes(&feed_url).await?;
            let feed = feed_rs::parser::parse(&bytes.0[..])
                .map_err(|e| AdapterError::parsing("public_trends", "feed", e.to_string()))?;

            let items = feed
                .entries
                .into_iter()
                .take(limit)
                .enumerate()
                .filter_map(|(idx, entry)| {
                    let title = entry.title.map(|t| t.content)?;
                    let url = entry.links.first().map(|l| l.href.clone());
                    let mut trend = RawTrend::new(title, Source::PublicTrends)
                        .with_score((100_i64 - 5 * idx as i64).max(0) as u64);
                    if let Some(url) = url {
                        trend = trend.with_url(url);
                    }
                    Some(trend)
                })
                .collect();

            Ok(super::dedup_by_best_rank(items))
        })
        .await
    }
}

/// Optional realtime listing sub-mode, scored with the same `21 - rank`
/// curve the portal-search sources use.
pub struct PublicTrendsRealtimeAdapter {
    pub endpoint_url: String,
}

#[derive(Deserialize)]
struct RealtimeItem {
    query: String,
}

#[async_trait]
impl Adapter for PublicTrendsRealtimeAdapter {
    fn name(&self) -> &'static str {
        "public_trends_realtime"
    }

    async fn fetch(&self, ctx: &FetchContext, limit: usize) -> Result<Vec<RawTrend>, AdapterError> {
        let key = fingerprint(
            "adapters::public_trends::realtime",
            &[&self.endpoint_url, &limit.to_string()],
        );
        let http = ctx.http.clone();
        let endpoint_url = self.endpoint_url.clone();

        cached(ctx.cache.as_ref(), &key, ctx.cache_ttl, async move {
            let items: Vec<RealtimeItem> = http.get_json(&endpoint_url).await?;
            let items = items
                .into_iter()
                .take(limit)
                .enumerate()
                .map(|(idx, item)| {
                    let rank = (idx + 1) as u32;
                    RawTrend::new(item.query, Source::PublicTrends)
                        .with_rank(rank)
                        .with_score((21_i64 - rank as i64).max(1) as u64)
                })
                .collect();
            Ok(super::dedup_by_best_rank(items))
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    #[test]
    fn rss_score_curve_decreases_by_five_per_position() {
        let scores: Vec<i64> = (0..3).map(|idx| (100 - 5 * idx).max(0)).collect();
        assert_eq!(scores, vec![100, 95, 90]);
    }

    #[test]
    fn realtime_score_floors_at_one() {
        let score = |rank: i64| (21 - rank).max(1);
        assert_eq!(score(20), 1);
        assert_eq!(score(25), 1);
        assert_eq!(score(1), 20);
    }
}
