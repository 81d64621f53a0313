use async_trait::async_trait;
use serde::Deserialize;

use crate::cache::{cached, fingerprint};
use crate::error::AdapterError;
use crate::model::{RawTrend, Source};

use super::{Adapter, FetchContext};

/// Most-popular video listing for a region, scored by view count. Disabled
/// entirely (an empty result, not an error) when no credential is configured,
/// matching the collector-initialization pattern where an unavailable source
/// is recorded as absent rather than surfaced as a failure.
pub struct VideoAdapter {
    pub region: String,
}

#[derive(Deserialize)]
struct ListResponse {
    items: Vec<VideoItem>,
}

#[derive(Deserialize)]
struct VideoItem {
    id: String,
    title: String,
    channel: String,
    view_count: u64,
    description: Option<String>,
    thumbnail: Option<String>,
    published_at: Option<String>,
}

#[async_trait]
impl Adapter for VideoAdapter {
    fn name(&self) -> &'static str {
        "video"
    }

    async fn fetch(&self, ctx: &FetchContext, limit: usize) -> Result<Vec<RawTrend>, AdapterError> {
        let Some(api_key) = ctx.config.video_api_key.as_deref() else {
            tracing::debug!("video adapter disabled: no credential configured");
            return Ok(Vec::new());
        };

        let key = fingerprint("adapters::video::fetch", &[&self.region, &limit.to_string()]);
        let region = self.region.clone();
        let http = ctx.http.clone();

        cached(ctx.cache.as_ref(), &key, ctx.cache_ttl, async move {
            let url = format!(
                "https://videoplatform.example.com/v1/most_popular?region={region}&limit={limit}&key={api_key}"
            );
            let resp: ListResponse = http.get_json(&url).await.map_err(|err| {
                tracing::warn!(?err, "video adapter fetch failed");
                err
            })?;

            let items = resp
                .items
                .into_iter()
                .map(|item| {
                    let mut trend = RawTrend::new(item.title, Source::Video)
                        .with_score(item.view_count / 10_000)
                        .with_url(format!("https://videoplatform.example.com/watch?v={}", item.id))
                        .with_metadata("channel", item.channel)
                        .with_metadata("views", item.view_count);
                    if let Some(d) = item.description {
                        trend = trend.with_metadata("description", d);
                    }
                    if let Some(t) = item.thumbnail {
                        trend = trend.with_metadata("thumbnail", t);
                    }
                    if let Some(p) = item.published_at {
                        trend = trend.with_metadata("published_at", p);
                    }
                    trend
                })
                .collect();

            Ok(super::dedup_by_best_rank(items))
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn score_is_view_count_divided_by_10k() {
        let item = VideoItem {
            id: "x".into(),
            title: "t".into(),
            channel: "c".into(),
            view_count: 1_234_567,
            description: None,
            thumbnail: None,
            published_at: None,
        };
        assert_eq!(item.view_count / 10_000, 123);
    }
}
