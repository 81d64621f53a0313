use async_trait::async_trait;
use scraper::{Html, Selector};
use serde::Deserialize;

use crate::cache::{cached, fingerprint};
use crate::error::AdapterError;
use crate::model::{RawTrend, Source};

use super::{Adapter, FetchContext};

/// Either strategy a portal may expose its ranked keyword list through. JSON
/// is preferred when available; otherwise the adapter scrapes a documented
/// CSS selector contract out of the ranking page's HTML.
pub enum Strategy {
    Json { url: String },
    Html {
        url: String,
        item_selector: String,
        keyword_selector: String,
    },
}

/// One ranked-keyword portal source. `score` for portal items is computed by
/// the aggregator from `rank`, not set here -- this adapter only reports
/// position.
pub struct PortalAdapter {
    pub source: Source,
    pub strategy: Strategy,
}

#[derive(Deserialize)]
struct JsonRankItem {
    keyword: String,
    #[serde(default)]
    delta: Option<i64>,
}

#[async_trait]
impl Adapter for PortalAdapter {
    fn name(&self) -> &'static str {
        self.source.as_str()
    }

    async fn fetch(&self, ctx: &FetchContext, limit: usize) -> Result<Vec<RawTrend>, AdapterError> {
        let key = fingerprint(
            "adapters::portal::fetch",
            &[self.source.as_str(), &limit.to_string()],
        );
        let source = self.source;
        let http = ctx.http.clone();
        let robots = ctx.robots.clone();

        match &self.strategy {
            Strategy::Json { url } => {
                let url = url.clone();
                cached(ctx.cache.as_ref(), &key, ctx.cache_ttl, async move {
                    let items: Vec<JsonRankItem> = http.get_json(&url).await?;
                    let raw = items
                        .into_iter()
                        .take(limit)
                        .enumerate()
                        .map(|(idx, item)| {
                            let mut trend = RawTrend::new(item.keyword, source).with_rank((idx + 1) as u32);
                            if let Some(delta) = item.delta {
                                trend = trend.with_metadata("delta", delta);
                            }
                            trend
                        })
                        .collect();
                    Ok(super::dedup_by_best_rank(raw))
                })
                .await
            }
            Strategy::Html {
                url,
                item_selector,
                keyword_selector,
            } => {
                let url = url.clone();
                let item_selector = item_selector.clone();
                let keyword_selector = keyword_selector.clone();
                cached(ctx.cache.as_ref(), &key, ctx.cache_ttl, async move {
                    let parsed = url::Url::parse(&url)
                        .map_err(|e| AdapterError::parsing(source.as_str(), "url", e.to_string()))?;
                    robots.check_and_wait(&http, &parsed).await?;

                    let body = http.get_text(&url).await?;
                    let raw = extract_ranked_keywords(&body, &item_selector, &keyword_selector, source, limit);
                    Ok(super::dedup_by_best_rank(raw))
                })
                .await
            }
        }
    }
}

/// Parses a ranking page's HTML with the documented selector contract:
/// `item_selector` scopes each ranked row, `keyword_selector` (relative to
/// the row) extracts the keyword text. A selector that fails to parse, or a
/// page with no matching rows, yields an empty list rather than an error --
/// mirroring `scraper`-based extraction's graceful-empty-vec convention.
fn extract_ranked_keywords(
    html: &str,
    item_selector: &str,
    keyword_selector: &str,
    source: Source,
    limit: usize,
) -> Vec<RawTrend> {
    let document = Html::parse_document(html);
    let Ok(item_sel) = Selector::parse(item_selector) else {
        return Vec::new();
    };
    let Ok(keyword_sel) = Selector::parse(keyword_selector) else {
        return Vec::new();
    };

    document
        .select(&item_sel)
        .take(limit)
        .enumerate()
        .filter_map(|(idx, row)| {
            let text: String = row.select(&keyword_sel).next()?.text().collect::<String>();
            let text = text.trim();
            if text.is_empty() {
                return None;
            }
            Some(RawTrend::new(text, source).with_rank((idx + 1) as u32))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_ranked_rows_from_html() {
        let html = r#"
            <ol>
                <li class="rank"><span class="kw">AI Agents</span></li>
                <li class="rank"><span class="kw">Electric Vehicles</span></li>
            </ol>
        "#;
        let out = extract_ranked_keywords(html, "li.rank", "span.kw", Source::PortalN, 10);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].keyword, "AI Agents");
        assert_eq!(out[0].rank, Some(1));
        assert_eq!(out[1].rank, Some(2));
    }

    #[test]
    fn invalid_selector_yields_empty_not_error() {
        let out = extract_ranked_keywords("<div></div>", "[[[", "x", Source::PortalN, 10);
        assert!(out.is_empty());
    }
}
