use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use futures::stream::StreamExt;

use crate::adapters::{Adapter, FetchContext};
use crate::error::AdapterError;
use crate::model::{FusedKeyword, NormalizedKey, RawTrend, Source};

/// Result of one aggregation run: every raw record seen, the fused ranking,
/// and an index from normalized keyword back to its raw records so the query
/// facade can answer keyword-detail lookups.
pub struct AggregationResult {
    pub all_raw: Vec<RawTrend>,
    pub ranked: Vec<FusedKeyword>,
    pub raw_index: HashMap<NormalizedKey, Vec<RawTrend>>,
}

pub struct Aggregator {
    adapters: Vec<Arc<dyn Adapter>>,
    max_retries: u32,
    retry_delay: Duration,
    adapter_timeout: Duration,
    aggregation_timeout: Duration,
    top_cap: usize,
}

impl Aggregator {
    pub fn new(
        adapters: Vec<Arc<dyn Adapter>>,
        max_retries: u32,
        retry_delay: Duration,
        adapter_timeout: Duration,
        aggregation_timeout: Duration,
        top_cap: usize,
    ) -> Self {
        Self {
            adapters,
            max_retries,
            retry_delay,
            adapter_timeout,
            aggregation_timeout,
            top_cap,
        }
    }

    /// Drives every adapter concurrently with bounded retries and a hard
    /// per-adapter deadline, fuses the results, and returns the ranked
    /// output. Never fails outright unless every adapter failed. The whole
    /// run is additionally bounded by `aggregation_timeout`: adapters still
    /// in flight once it elapses are dropped and contribute nothing, rather
    /// than the run waiting out their individual retry budgets.
    pub async fn collect(&self, ctx: &FetchContext, per_source_limit: usize) -> AggregationResult {
        let concurrency = self.adapters.len().max(1);
        let total_adapters = self.adapters.len();

        let results: Vec<(usize, Vec<RawTrend>)> = futures::stream::iter(self.adapters.iter().cloned().enumerate())
            .map(|(idx, adapter): (usize, Arc<dyn Adapter>)| {
                let ctx = ctx.clone();
                let max_retries = self.max_retries;
                let retry_delay = self.retry_delay;
                let timeout = self.adapter_timeout;
                fetch_one(idx, adapter, ctx, per_source_limit, max_retries, retry_delay, timeout)
            })
            .buffer_unordered(concurrency)
            .take_until(tokio::time::sleep(self.aggregation_timeout))
            .collect()
            .await;

        if results.len() < total_adapters {
            tracing::warn!(
                completed = results.len(),
                total = total_adapters,
                "aggregation deadline reached, discarding partial results from still-running adapters"
            );
        }

        // restore deterministic adapter order regardless of which future
        // completed first -- required so first-seen canonical forms are
        // stable across runs when inputs are equal.
        let mut ordered = results;
        ordered.sort_by_key(|(idx, _)| *idx);

        let all_adapters_failed = ordered.iter().all(|(_, items)| items.is_empty()) && !self.adapters.is_empty();
        if all_adapters_failed {
            tracing::error!("all sources failed in this aggregation run");
        }

        let all_raw: Vec<RawTrend> = ordered.into_iter().flat_map(|(_, items)| items).collect();

        let (ranked, raw_index) = fuse(&all_raw, self.top_cap);

        AggregationResult {
            all_raw,
            ranked,
            raw_index,
        }
    }

    /// Alternate fusion used for the "combined portal" projection: only
    /// sources flagged `is_portal()` contribute, each scored `max(21-rank,1)`,
    /// and a keyword must appear in at least `min_sources` of them.
    pub fn combined_portal_projection(all_raw: &[RawTrend], min_sources: usize, top_cap: usize) -> Vec<FusedKeyword> {
        let now = chrono::Utc::now();
        let mut order: Vec<NormalizedKey> = Vec::new();
        let mut accum: HashMap<NormalizedKey, (String, HashSet<Source>, u64, HashMap<Source, u32>, Vec<String>)> =
            HashMap::new();

        for raw in all_raw.iter().filter(|r| r.source.is_portal()) {
            let Some(rank) = raw.rank else { continue };
            let key = NormalizedKey::new(&raw.keyword);
            let contribution = (21_i64 - rank as i64).max(1) as u64;

            let entry = accum.entry(key.clone()).or_insert_with(|| {
                order.push(key.clone());
                (raw.keyword.clone(), HashSet::new(), 0, HashMap::new(), Vec::new())
            });
            entry.1.insert(raw.source);
            entry.2 += contribution;
            entry.3.entry(raw.source).or_insert(rank);
            if let Some(url) = &raw.url
                && !entry.4.contains(url)
            {
                entry.4.push(url.clone());
            }
        }

        let mut fused: Vec<(usize, FusedKeyword)> = order
            .into_iter()
            .filter_map(|key| accum.remove(&key).map(|v| (key, v)))
            .filter(|(_, (_, sources, _, _, _))| sources.len() >= min_sources)
            .enumerate()
            .map(|(seen_order, (_, (display, sources, score, per_source_rank, urls)))| {
                (
                    seen_order,
                    FusedKeyword {
                        keyword: display,
                        sources,
                        score,
                        rank: 0,
                        per_source_rank,
                        urls,
                        timestamp: now,
                    },
                )
            })
            .collect();

        fused.sort_by(|(a_order, a), (b_order, b)| {
            (b.score * b.sources.len() as u64)
                .cmp(&(a.score * a.sources.len() as u64))
                .then(a_order.cmp(b_order))
        });

        fused
            .into_iter()
            .take(top_cap)
            .enumerate()
            .map(|(idx, (_, mut fk))| {
                fk.rank = (idx + 1) as u32;
                fk
            })
            .collect()
    }
}

async fn fetch_one(
    idx: usize,
    adapter: Arc<dyn Adapter>,
    ctx: FetchContext,
    per_source_limit: usize,
    max_retries: u32,
    retry_delay: Duration,
    timeout: Duration,
) -> (usize, Vec<RawTrend>) {
    let items = fetch_with_retry(adapter.as_ref(), &ctx, per_source_limit, max_retries, retry_delay, timeout).await;
    (idx, items)
}

async fn fetch_with_retry(
    adapter: &dyn Adapter,
    ctx: &FetchContext,
    limit: usize,
    max_retries: u32,
    retry_delay: Duration,
    timeout: Duration,
) -> Vec<RawTrend> {
    for attempt in 0..=max_retries {
        let call = tokio::time::timeout(timeout, adapter.fetch(ctx, limit));
        match call.await {
            Ok(Ok(items)) => return items,
            Ok(Err(err)) => match err.severity() {
                tracing::Level::WARN => {
                    tracing::warn!(adapter = adapter.name(), attempt, ?err, "adapter fetch failed")
                }
                _ => tracing::error!(adapter = adapter.name(), attempt, ?err, "adapter fetch failed"),
            },
            Err(_) => {
                tracing::warn!(adapter = adapter.name(), attempt, "adapter fetch timed out");
            }
        }
        if attempt < max_retries {
            tokio::time::sleep(retry_delay.mul_f64(2f64.powi(attempt as i32))).await;
        }
    }
    tracing::warn!(adapter = adapter.name(), "adapter exhausted retries, returning empty result");
    Vec::new()
}

/// The core fusion algorithm: dedup across sources by normalized keyword,
/// sum per-source score contributions (defaulting to 50 when absent), sort
/// by `score * |sources|` descending with a stable first-seen tie-break, and
/// assign 1-based ranks after truncating to `top_cap`.
fn fuse(all_raw: &[RawTrend], top_cap: usize) -> (Vec<FusedKeyword>, HashMap<NormalizedKey, Vec<RawTrend>>) {
    let now = chrono::Utc::now();
    let mut order: Vec<NormalizedKey> = Vec::new();
    let mut accum: HashMap<NormalizedKey, (String, HashSet<Source>, u64, HashMap<Source, u32>, Vec<String>)> =
        HashMap::new();
    let mut raw_index: HashMap<NormalizedKey, Vec<RawTrend>> = HashMap::new();

    for raw in all_raw {
        let key = NormalizedKey::new(&raw.keyword);

        let entry = accum.entry(key.clone()).or_insert_with(|| {
            order.push(key.clone());
            (raw.keyword.clone(), HashSet::new(), 0, HashMap::new(), Vec::new())
        });
        entry.1.insert(raw.source);
        entry.2 += raw.score.unwrap_or(50);
        if let Some(rank) = raw.rank {
            entry.3.entry(raw.source).or_insert(rank);
        }
        if let Some(url) = &raw.url
            && !entry.4.contains(url)
        {
            entry.4.push(url.clone());
        }

        raw_index.entry(key).or_default().push(raw.clone());
    }

    let mut fused: Vec<(usize, FusedKeyword)> = order
        .into_iter()
        .enumerate()
        .filter_map(|(seen_order, key)| {
            accum.remove(&key).map(|(display, sources, score, per_source_rank, urls)| {
                (
                    seen_order,
                    FusedKeyword {
                        keyword: display,
                        sources,
                        score,
                        rank: 0,
                        per_source_rank: per_source_rank.into_iter().filter(|(_, r)| *r != 0).collect(),
                        urls,
                        timestamp: now,
                    },
                )
            })
        })
        .collect();

    fused.sort_by(|(a_order, a), (b_order, b)| {
        (b.score * b.sources.len() as u64)
            .cmp(&(a.score * a.sources.len() as u64))
            .then(a_order.cmp(b_order))
    });

    let ranked = fused
        .into_iter()
        .take(top_cap)
        .enumerate()
        .map(|(idx, (_, mut fk))| {
            fk.rank = (idx + 1) as u32;
            fk
        })
        .collect();

    (ranked, raw_index)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trend(kw: &str, source: Source, score: Option<u64>, rank: Option<u32>) -> RawTrend {
        let mut t = RawTrend::new(kw, source);
        t.score = score;
        t.rank = rank;
        t
    }

    #[test]
    fn two_sources_one_overlapping_keyword() {
        let raw = vec![
            trend("AI", Source::PortalN, Some(50), Some(1)),
            trend("ai", Source::PortalD, Some(30), Some(2)),
            trend("ev", Source::PortalD, Some(40), Some(1)),
        ];
        let (ranked, index) = fuse(&raw, 100);
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].keyword, "AI");
        assert_eq!(ranked[0].score, 80);
        assert_eq!(ranked[0].sources.len(), 2);
        assert_eq!(ranked[0].rank, 1);
        assert_eq!(ranked[1].keyword, "ev");
        assert_eq!(ranked[1].rank, 2);
        assert_eq!(index.get(&NormalizedKey::new("ai")).map(|v| v.len()), Some(2));
    }

    #[test]
    fn scoreless_item_contributes_fifty() {
        let raw = vec![trend("btc", Source::PortalN, None, None)];
        let (ranked, _) = fuse(&raw, 100);
        assert_eq!(ranked[0].score, 50);
    }

    #[test]
    fn ranking_is_stable_and_deterministic_for_equal_inputs() {
        let raw = vec![
            trend("a", Source::PortalN, Some(10), None),
            trend("b", Source::PortalN, Some(10), None),
        ];
        let (first, _) = fuse(&raw, 100);
        let (second, _) = fuse(&raw, 100);
        let first_order: Vec<_> = first.iter().map(|f| f.keyword.clone()).collect();
        let second_order: Vec<_> = second.iter().map(|f| f.keyword.clone()).collect();
        assert_eq!(first_order, second_order);
        assert_eq!(first_order, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn truncates_to_top_cap_with_contiguous_ranks() {
        let raw: Vec<RawTrend> = (0..5)
            .map(|i| trend(&format!("kw{i}"), Source::PortalN, Some(10 - i as u64), None))
            .collect();
        let (ranked, _) = fuse(&raw, 3);
        assert_eq!(ranked.len(), 3);
        assert_eq!(ranked.iter().map(|f| f.rank).collect::<Vec<_>>(), vec![1, 2, 3]);
    }

    #[test]
    fn empty_input_yields_empty_output() {
        let (ranked, index) = fuse(&[], 100);
        assert!(ranked.is_empty());
        assert!(index.is_empty());
    }
}
