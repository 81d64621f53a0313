use serde::Deserialize;

use crate::error::AdapterError;
use crate::model::Topic;

/// Talks to an OpenAI-compatible chat-completions endpoint over plain JSON
/// HTTP requests -- a narrow two-call contract, not a tool-using agent.
pub struct Clusterer {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: String,
}

/// Normalized cluster shape that every accepted upstream JSON variant folds
/// into.
#[derive(Debug, Clone, PartialEq)]
struct RawCluster {
    topic: String,
    keywords: Vec<String>,
}

impl Clusterer {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            api_key: api_key.into(),
        }
    }

    async fn chat(&self, prompt: &str) -> Result<String, AdapterError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = serde_json::json!({
            "model": "gpt-4o-mini",
            "messages": [{"role": "user", "content": prompt}],
            "response_format": {"type": "json_object"},
        });

        let resp = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| AdapterError::network(&url, e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            return Err(AdapterError::Api {
                api_name: "clusterer".into(),
                endpoint: url,
                code: status.as_u16().to_string(),
            });
        }

        let parsed: ChatResponse = resp
            .json()
            .await
            .map_err(|e| AdapterError::parsing("clusterer", "body", e.to_string()))?;

        parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| AdapterError::parsing("clusterer", "choices", "empty choices array"))
    }

    /// Clusters `keywords` into at most `min(5, keywords.len()/2)` topics, then
    /// fetches `hook_count` hooks per topic. Returns an empty list (warn, not
    /// error) on any upstream or parse failure -- clustering is never allowed
    /// to block a snapshot publish.
    pub async fn cluster(&self, keywords: &[String], hook_count: usize) -> Vec<Topic> {
        if keywords.len() < 5 {
            return Vec::new();
        }

        let n = (keywords.len() / 2).min(5).max(1);
        let prompt = format!(
            "Group these keywords into {n} topic clusters. Keywords: {}. \
             Respond as JSON: {{\"clusters\": [{{\"topic\": \"...\", \"keywords\": [...]}}]}}",
            keywords.join(", ")
        );

        let raw_clusters = match self.chat(&prompt).await {
            Ok(text) => parse_clusters(&text),
            Err(err) => {
                tracing::warn!(?err, "clusterer chat call failed, returning no topics");
                return Vec::new();
            }
        };

        let now = chrono::Utc::now();
        let mut topics = Vec::with_capacity(raw_clusters.len());
        for (idx, cluster) in raw_clusters.into_iter().enumerate() {
            let hooks = self.hooks_for(&cluster.topic, hook_count).await;
            topics.push(Topic {
                id: format!("topic_{}", idx + 1),
                topic: cluster.topic,
                keywords: cluster.keywords,
                hooks,
                created_at: now,
            });
        }
        topics
    }

    async fn hooks_for(&self, topic: &str, hook_count: usize) -> Vec<String> {
        let prompt = format!(
            "Write {hook_count} short marketing hook phrases for the topic \"{topic}\". \
             Respond as JSON: {{\"hooks\": [\"...\"]}}"
        );
        match self.chat(&prompt).await {
            Ok(text) => parse_hooks(&text, hook_count),
            Err(err) => {
                tracing::warn!(?err, topic, "hook generation failed, returning no hooks");
                Vec::new()
            }
        }
    }
}

/// Strips a ```json ... ``` fence if present, then parses.
fn strip_fence(text: &str) -> &str {
    let trimmed = text.trim();
    if let Some(rest) = trimmed.strip_prefix("```json") {
        rest.trim().trim_end_matches("```").trim()
    } else if let Some(rest) = trimmed.strip_prefix("```") {
        rest.trim().trim_end_matches("```").trim()
    } else {
        trimmed
    }
}

/// Accepts all three documented shapes: a bare array, `{"clusters": [...]}`,
/// or a flat `{topic: [keywords...]}` map, normalizing each to `RawCluster`.
fn parse_clusters(text: &str) -> Vec<RawCluster> {
    let cleaned = strip_fence(text);
    let Ok(value) = serde_json::from_str::<serde_json::Value>(cleaned) else {
        tracing::warn!("clusterer response was not valid JSON, returning no topics");
        return Vec::new();
    };

    #[derive(Deserialize)]
    struct ClusterShape {
        topic: String,
        #[serde(default)]
        keywords: Vec<String>,
    }

    if let Some(array) = value.as_array() {
        return array
            .iter()
            .filter_map(|v| serde_json::from_value::<ClusterShape>(v.clone()).ok())
            .map(|c| RawCluster {
                topic: c.topic,
                keywords: c.keywords,
            })
            .collect();
    }

    if let Some(clusters) = value.get("clusters").and_then(|v| v.as_array()) {
        return clusters
            .iter()
            .filter_map(|v| serde_json::from_value::<ClusterShape>(v.clone()).ok())
            .map(|c| RawCluster {
                topic: c.topic,
                keywords: c.keywords,
            })
            .collect();
    }

    if let Some(map) = value.as_object() {
        return map
            .iter()
            .filter_map(|(topic, keywords)| {
                let keywords: Vec<String> = serde_json::from_value(keywords.clone()).ok()?;
                Some(RawCluster {
                    topic: topic.clone(),
                    keywords,
                })
            })
            .collect();
    }

    Vec::new()
}

/// Accepts `{"hooks": [...]}`; falls back to splitting the raw text on
/// newlines when it isn't valid JSON at all.
fn parse_hooks(text: &str, hook_count: usize) -> Vec<String> {
    let cleaned = strip_fence(text);
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(cleaned)
        && let Some(hooks) = value.get("hooks").and_then(|v| v.as_array())
    {
        return hooks
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .take(hook_count)
            .collect();
    }

    cleaned
        .lines()
        .map(|line| line.trim_start_matches(['-', '*', '•']).trim())
        .filter(|line| !line.is_empty())
        .take(hook_count)
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bare_array_shape() {
        let text = r#"[{"topic":"AI","keywords":["llm","agent"]}]"#;
        let clusters = parse_clusters(text);
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].topic, "AI");
    }

    #[test]
    fn parses_clusters_wrapper_shape() {
        let text = r#"{"clusters":[{"topic":"EV","keywords":["battery"]}]}"#;
        let clusters = parse_clusters(text);
        assert_eq!(clusters[0].topic, "EV");
    }

    #[test]
    fn parses_flat_map_shape() {
        let text = r#"{"AI": ["llm", "agent"], "EV": ["battery"]}"#;
        let mut clusters = parse_clusters(text);
        clusters.sort_by(|a, b| a.topic.cmp(&b.topic));
        assert_eq!(clusters.len(), 2);
        assert_eq!(clusters[0].topic, "AI");
        assert_eq!(clusters[0].keywords, vec!["llm", "agent"]);
    }

    #[test]
    fn strips_fenced_code_block_before_parsing() {
        let text = "```json\n{\"clusters\": []}\n```";
        assert!(parse_clusters(text).is_empty());
    }

    #[test]
    fn hooks_falls_back_to_line_splitting_on_parse_failure() {
        let text = "Catch the wave\n- Ride the trend\n";
        let hooks = parse_hooks(text, 3);
        assert_eq!(hooks, vec!["Catch the wave", "Ride the trend"]);
    }

    #[test]
    fn malformed_json_yields_no_topics() {
        assert!(parse_clusters("not json at all").is_empty());
    }
}
