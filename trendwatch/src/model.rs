use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identity of one of the external source families a [`RawTrend`] can come from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    Video,
    PortalN,
    PortalD,
    NewsRss,
    NewsPortalN,
    NewsPortalD,
    PublicTrends,
}

impl Source {
    pub fn as_str(&self) -> &'static str {
        match self {
            Source::Video => "video",
            Source::PortalN => "portal_n",
            Source::PortalD => "portal_d",
            Source::NewsRss => "news_rss",
            Source::NewsPortalN => "news_portal_n",
            Source::NewsPortalD => "news_portal_d",
            Source::PublicTrends => "public_trends",
        }
    }

    pub fn is_portal(&self) -> bool {
        matches!(self, Source::PortalN | Source::PortalD)
    }
}

impl std::fmt::Display for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Open metadata bag carried on a [`RawTrend`]. Kept as a thin wrapper over
/// `serde_json::Value` rather than a hand-rolled enum, since adapters only ever
/// need to stash and later re-serialize a handful of upstream fields.
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// One observation from one source, before fusion.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RawTrend {
    pub keyword: String,
    pub source: Source,
    pub score: Option<u64>,
    pub url: Option<String>,
    pub rank: Option<u32>,
    #[serde(default)]
    pub metadata: Metadata,
    pub collected_at: DateTime<Utc>,
}

impl RawTrend {
    pub fn new(keyword: impl Into<String>, source: Source) -> Self {
        Self {
            keyword: keyword.into(),
            source,
            score: None,
            url: None,
            rank: None,
            metadata: Metadata::new(),
            collected_at: Utc::now(),
        }
    }

    pub fn with_score(mut self, score: u64) -> Self {
        self.score = Some(score);
        self
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn with_rank(mut self, rank: u32) -> Self {
        // an adapter-reported rank of 0 means "no rank", not "best rank"
        self.rank = if rank == 0 { None } else { Some(rank) };
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// Case-folded, whitespace-collapsed form of a keyword, used only for equality
/// and indexing. Never used for display.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NormalizedKey(pub String);

impl NormalizedKey {
    pub fn new(raw: &str) -> Self {
        let mut out = String::with_capacity(raw.len());
        let mut last_was_space = false;
        for ch in raw.trim().chars() {
            if ch.is_whitespace() {
                if !last_was_space {
                    out.push(' ');
                }
                last_was_space = true;
            } else {
                out.extend(ch.to_lowercase());
                last_was_space = false;
            }
        }
        NormalizedKey(out)
    }
}

/// One entry in the ranked fusion output.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FusedKeyword {
    pub keyword: String,
    pub sources: HashSet<Source>,
    pub score: u64,
    pub rank: u32,
    #[serde(default)]
    pub per_source_rank: HashMap<Source, u32>,
    pub urls: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

/// Output of the topic clusterer for one cluster of keywords.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Topic {
    pub id: String,
    pub topic: String,
    pub keywords: Vec<String>,
    #[serde(default)]
    pub hooks: Vec<String>,
    pub created_at: DateTime<Utc>,
}

/// The atomic unit the refresh controller publishes. Immutable once built:
/// updates replace the whole value, never mutate fields in place.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Snapshot {
    pub hot_keywords: Vec<FusedKeyword>,
    pub topics: Vec<Topic>,
    pub raw_index: HashMap<NormalizedKey, Vec<RawTrend>>,
    pub timestamp: DateTime<Utc>,
}

impl Snapshot {
    pub fn empty() -> Self {
        Self {
            hot_keywords: Vec::new(),
            topics: Vec::new(),
            raw_index: HashMap::new(),
            timestamp: Utc::now(),
        }
    }

    /// Compact projection sent over the push stream and status endpoint.
    pub fn to_event(&self) -> TrendsUpdateEvent {
        TrendsUpdateEvent {
            hot_keywords: self.hot_keywords.iter().take(10).cloned().collect(),
            topics: self.topics.iter().take(5).cloned().collect(),
            timestamp: self.timestamp,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum PushEvent {
    Connected,
    TrendsUpdate(TrendsUpdateEvent),
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TrendsUpdateEvent {
    pub hot_keywords: Vec<FusedKeyword>,
    pub topics: Vec<Topic>,
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalized_key_folds_case_and_whitespace() {
        assert_eq!(NormalizedKey::new("  AI   Agents "), NormalizedKey::new("ai agents"));
        assert_eq!(NormalizedKey::new("AI"), NormalizedKey::new("ai"));
        assert_ne!(NormalizedKey::new("ai"), NormalizedKey::new("ai agents"));
    }

    #[test]
    fn zero_rank_is_no_rank() {
        let t = RawTrend::new("btc", Source::PortalN).with_rank(0);
        assert_eq!(t.rank, None);
    }
}
