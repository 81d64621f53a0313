use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HistoryPoint {
    pub date: DateTime<Utc>,
    pub value: f64,
}

/// Stands in for a real historical time-series store, which this service
/// doesn't implement. Production wiring would back this with a real
/// database; the shipped implementation is a deterministic mock.
#[async_trait]
pub trait HistoryProvider: Send + Sync {
    async fn series(&self, keyword: &str, days: u32) -> Vec<HistoryPoint>;
}

/// Deterministic pseudo-random sine wave seeded from the keyword's bytes, so
/// the same keyword always produces the same-looking series without any
/// persisted state.
pub struct MockHistoryProvider;

#[async_trait]
impl HistoryProvider for MockHistoryProvider {
    async fn series(&self, keyword: &str, days: u32) -> Vec<HistoryPoint> {
        let seed = keyword.bytes().fold(7u64, |acc, b| acc.wrapping_mul(31).wrapping_add(b as u64));
        let mut state = seed | 1;
        let now = Utc::now();

        (0..days)
            .map(|offset| {
                // xorshift64 for a stable, dependency-free pseudo-random stream
                state ^= state << 13;
                state ^= state >> 7;
                state ^= state << 17;
                let noise = (state % 1000) as f64 / 1000.0;

                let day = days.saturating_sub(offset) as f64;
                let wave = (day / 7.0).sin() * 30.0 + 50.0;
                let value = (wave + noise * 10.0).max(0.0);

                HistoryPoint {
                    date: now - chrono::Duration::days(offset as i64),
                    value,
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn same_keyword_produces_same_series() {
        let provider = MockHistoryProvider;
        let a = provider.series("ai", 7).await;
        let b = provider.series("ai", 7).await;
        let a_values: Vec<f64> = a.iter().map(|p| p.value).collect();
        let b_values: Vec<f64> = b.iter().map(|p| p.value).collect();
        assert_eq!(a_values, b_values);
    }

    #[tokio::test]
    async fn different_keywords_diverge() {
        let provider = MockHistoryProvider;
        let a = provider.series("ai", 7).await;
        let b = provider.series("ev", 7).await;
        let a_values: Vec<f64> = a.iter().map(|p| p.value).collect();
        let b_values: Vec<f64> = b.iter().map(|p| p.value).collect();
        assert_ne!(a_values, b_values);
    }

    #[tokio::test]
    async fn series_length_matches_requested_days() {
        let provider = MockHistoryProvider;
        let series = provider.series("ai", 14).await;
        assert_eq!(series.len(), 14);
    }
}
