use async_trait::async_trait;
use scraper::{Html, Selector};

use crate::cache::{cached, fingerprint};
use crate::error::AdapterError;
use crate::model::{RawTrend, Source};

use super::{Adapter, FetchContext};

const RSS_MAX_AGE_DAYS: i64 = 30;

/// News feed adapter, RSS sub-mode: a wire-news RSS feed, scored by position
/// with a steeper falloff than the ranking-page sub-mode below.
pub struct NewsRssAdapter {
    pub feed_url: String,
}

#[async_trait]
impl Adapter for NewsRssAdapter {
    fn name(&self) -> &'static str {
        "news_rss"
    }

    async fn fetch(&self, ctx: &FetchContext, limit: usize) -> Result<Vec<RawTrend>, AdapterError> {
        let key = fingerprint("adapters::news_rss::fetch", &[&self.feed_url, &limit.to_string()]);
        let http = ctx.http.clone();
        let feed_url = self.feed_url.clone();

        cached(ctx.cache.as_ref(), &key, ctx.cache_ttl, async move {
            let bytes = http.get_bytes(&feed_url).await?;
            let feed = feed_rs::parser::parse(&bytes.0[..])
                .map_err(|e| AdapterError::parsing("news_rss", "feed", e.to_string()))?;

            let cutoff = chrono::Utc::now() - chrono::Duration::days(RSS_MAX_AGE_DAYS);

            let items = feed
                .entries
                .into_iter()
                .filter(|entry| {
                    entry
                        .published
                        .map(|published| published >= cutoff)
                        .unwrap_or(true)
                })
                .take(limit)
                .enumerate()
                .filter_map(|(idx, entry)| {
                    let title = entry.title.map(|t| t.content)?;
                    let url = entry.links.first().map(|l| l.href.clone());
                    let mut trend = RawTrend::new(title, Source::NewsRss)
                        .with_score((80_i64 - 2 * idx as i64).max(0) as u64);
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

/// News feed adapter, ranking-HTML sub-mode: a news portal's own "most read"
/// page, scraped with a documented CSS selector contract.
pub struct NewsPortalAdapter {
    pub source: Source,
    pub url: String,
    pub item_selector: String,
    pub title_selector: String,
    pub link_selector: String,
}

#[async_trait]
impl Adapter for NewsPortalAdapter {
    fn name(&self) -> &'static str {
        self.source.as_str()
    }

    async fn fetch(&self, ctx: &FetchContext, limit: usize) -> Result<Vec<RawTrend>, AdapterError> {
        let key = fingerprint(
            "adapters::news_portal::fetch",
            &[self.source.as_str(), &limit.to_string()],
        );
        let http = ctx.http.clone();
        let robots = ctx.robots.clone();
        let url = self.url.clone();
        let item_selector = self.item_selector.clone();
        let title_selector = self.title_selector.clone();
        let link_selector = self.link_selector.clone();
        let source = self.source;

        cached(ctx.cache.as_ref(), &key, ctx.cache_ttl, async move {
            let parsed = url::Url::parse(&url)
                .map_err(|e| AdapterError::parsing(source.as_str(), "url", e.to_string()))?;
            robots.check_and_wait(&http, &parsed).await?;

            let body = http.get_text(&url).await?;
            let items = extract_ranking_page(
                &body,
                &item_selector,
                &title_selector,
                &link_selector,
                source,
                limit,
            );
            Ok(super::dedup_by_best_rank(items))
        })
        .await
    }
}

/// News feed adapter, portal keyword-search sub-mode: queries a news portal's
/// own search API under a credential pair and trusts the provider's own
/// result ordering rather than re-scoring. Degrades to an empty result when
/// no credential is configured, matching the collector-initialization
/// pattern used elsewhere for optional sources.
pub struct NewsPortalSearchAdapter {
    pub source: Source,
    pub endpoint_url: String,
    pub query: String,
}

#[derive(serde::Deserialize)]
struct SearchResponse {
    results: Vec<SearchItem>,
}

#[derive(serde::Deserialize)]
struct SearchItem {
    title: String,
    url: Option<String>,
}

#[async_trait]
impl Adapter for NewsPortalSearchAdapter {
    fn name(&self) -> &'static str {
        self.source.as_str()
    }

    async fn fetch(&self, ctx: &FetchContext, limit: usize) -> Result<Vec<RawTrend>, AdapterError> {
        let (Some(api_id), Some(api_secret)) = (
            ctx.config.portal_api_id.as_deref(),
            ctx.config.portal_api_secret.as_deref(),
        ) else {
            tracing::debug!("news portal search adapter disabled: no credential configured");
            return Ok(Vec::new());
        };

        let key = fingerprint(
            "adapters::news_portal_search::fetch",
            &[self.source.as_str(), &self.query, &limit.to_string()],
        );
        let http = ctx.http.clone();
        let endpoint_url = self.endpoint_url.clone();
        let query = self.query.clone();
        let source = self.source;
        let api_id = api_id.to_string();
        let api_secret = api_secret.to_string();

        cached(ctx.cache.as_ref(), &key, ctx.cache_ttl, async move {
            let url =
                format!("{endpoint_url}?query={query}&client_id={api_id}&client_secret={api_secret}&display={limit}");
            let resp: SearchResponse = http.get_json(&url).await?;

            let items = resp
                .results
                .into_iter()
                .take(limit)
                .enumerate()
                .filter_map(|(idx, item)| {
                    let title = item.title.trim().to_string();
                    if title.is_empty() {
                        return None;
                    }
                    let mut trend = RawTrend::new(title, source).with_rank((idx + 1) as u32);
                    if let Some(url) = item.url {
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

fn extract_ranking_page(
    html: &str,
    item_selector: &str,
    title_selector: &str,
    link_selector: &str,
    source: Source,
    limit: usize,
) -> Vec<RawTrend> {
    let document = Html::parse_document(html);
    let (Ok(item_sel), Ok(title_sel), Ok(link_sel)) = (
        Selector::parse(item_selector),
        Selector::parse(title_selector),
        Selector::parse(link_selector),
    ) else {
        return Vec::new();
    };

    document
        .select(&item_sel)
        .take(limit)
        .enumerate()
        .filter_map(|(idx, row)| {
            let title: String = row.select(&title_sel).next()?.text().collect::<String>();
            let title = title.trim();
            if title.is_empty() {
                return None;
            }
            let link = row.select(&link_sel).next().and_then(|el| el.value().attr("href"));
            let mut trend = RawTrend::new(title, source).with_rank((idx + 1) as u32);
            if let Some(link) = link {
                trend = trend.with_url(link);
            }
            Some(trend)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rss_score_curve_decreases_by_two_per_position() {
        let scores: Vec<i64> = (0..5).map(|idx| (80 - 2 * idx).max(0)).collect();
        assert_eq!(scores, vec![80, 78, 76, 74, 72]);
    }

    #[test]
    fn extracts_ranking_page_rows() {
        let html = r#"
            <div class="row"><a class="title" href="/a">Big Story</a></div>
            <div class="row"><a class="title" href="/b">Other Story</a></div>
        "#;
        let out = extract_ranking_page(html, "div.row", "a.title", "a.title", Source::NewsPortalN, 10);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].keyword, "Big Story");
        assert_eq!(out[0].url.as_deref(), Some("/a"));
    }
}
