use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::aggregator::Aggregator;
use crate::controller::{ControllerState, RefreshController};
use crate::model::{FusedKeyword, NormalizedKey, Snapshot, Topic};

#[derive(serde::Serialize)]
pub struct KeywordDetails {
    pub keyword: String,
    pub urls: Vec<String>,
    pub sources: Vec<String>,
    pub total_score: u64,
    pub metadata: serde_json::Value,
    pub related_count: usize,
}

#[derive(serde::Serialize)]
pub struct Status {
    pub is_collecting: bool,
    pub last_update: Option<DateTime<Utc>>,
    pub total_keywords: usize,
    pub total_topics: usize,
    pub api_key_configured: bool,
}

/// Read-only accessor over the controller's current snapshot. Never
/// triggers a refresh itself -- that's a distinct operation on the
/// controller.
pub struct QueryFacade {
    controller: Arc<RefreshController>,
    llm_configured: bool,
}

impl QueryFacade {
    pub fn new(controller: Arc<RefreshController>, llm_configured: bool) -> Self {
        Self {
            controller,
            llm_configured,
        }
    }

    pub fn hot_keywords(&self, n: usize) -> (Vec<FusedKeyword>, DateTime<Utc>, usize) {
        let snapshot = self.controller.snapshot();
        (
            snapshot.hot_keywords.iter().take(n).cloned().collect(),
            snapshot.timestamp,
            snapshot.hot_keywords.len(),
        )
    }

    pub fn topics(&self, n: usize) -> (Vec<Topic>, DateTime<Utc>, usize) {
        let snapshot = self.controller.snapshot();
        (
            snapshot.topics.iter().take(n).cloned().collect(),
            snapshot.timestamp,
            snapshot.topics.len(),
        )
    }

    pub fn topic(&self, id: &str) -> Option<Topic> {
        let snapshot = self.controller.snapshot();
        snapshot.topics.iter().find(|t| t.id == id).cloned()
    }

    pub fn keyword_details(&self, keyword: &str) -> Option<KeywordDetails> {
        let snapshot = self.controller.snapshot();
        let key = NormalizedKey::new(keyword);
        let raw = snapshot.raw_index.get(&key)?;
        if raw.is_empty() {
            return None;
        }

        let mut urls = Vec::new();
        let mut sources = std::collections::HashSet::new();
        let mut total_score = 0u64;
        let mut metadata = serde_json::Map::new();

        for item in raw {
            if let Some(url) = &item.url
                && !urls.contains(url)
            {
                urls.push(url.clone());
            }
            sources.insert(item.source.as_str());
            total_score += item.score.unwrap_or(50);
            for (k, v) in &item.metadata {
                metadata.entry(k.clone()).or_insert_with(|| v.clone());
            }
        }

        Some(KeywordDetails {
            keyword: raw[0].keyword.clone(),
            urls,
            sources: sources.into_iter().map(str::to_string).collect(),
            total_score,
            metadata: serde_json::Value::Object(metadata),
            related_count: raw.len(),
        })
    }

    pub async fn status(&self) -> Status {
        let snapshot = self.controller.snapshot();
        let state = self.controller.state().await;
        Status {
            is_collecting: state == ControllerState::Refreshing,
            last_update: if snapshot.hot_keywords.is_empty() && snapshot.topics.is_empty() {
                None
            } else {
                Some(snapshot.timestamp)
            },
            total_keywords: snapshot.hot_keywords.len(),
            total_topics: snapshot.topics.len(),
            api_key_configured: self.llm_configured,
        }
    }

    /// Projects the current snapshot's raw records through the alternate
    /// "combined portal" fusion, rather than the primary multi-source one.
    pub fn combined_portal(&self, min_sources: usize, top_cap: usize) -> Vec<FusedKeyword> {
        let snapshot: Arc<Snapshot> = self.controller.snapshot();
        let all_raw: Vec<_> = snapshot.raw_index.values().flatten().cloned().collect();
        Aggregator::combined_portal_projection(&all_raw, min_sources, top_cap)
    }

    pub fn controller(&self) -> &Arc<RefreshController> {
        &self.controller
    }
}
