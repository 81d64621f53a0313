use std::collections::HashMap;
use std::time::Duration;

use robotxt::Robots;
use tokio::sync::Mutex;
use tokio::time::Instant;

use super::Fetcher;
use crate::error::AdapterError;

const ROBOTS_USER_AGENT: &str = "trendwatch-bot";
const DEFAULT_CRAWL_DELAY: Duration = Duration::from_secs(1);

/// Fetches, caches, and consults `robots.txt` for adapters that scrape HTML
/// instead of calling a JSON API. One instance is shared process-wide.
///
/// Per-host pacing lives here rather than in a standalone type: every caller
/// of `pace` already holds a `RobotsGate` (it's also the thing that knows the
/// host's declared crawl-delay), so splitting the two only adds an extra
/// object with no caller that would ever use one without the other.
pub struct RobotsGate {
    cache: Mutex<HashMap<String, Robots>>,
    next_allowed: Mutex<HashMap<String, Instant>>,
}

impl RobotsGate {
    pub fn new() -> Self {
        Self {
            cache: Mutex::new(HashMap::new()),
            next_allowed: Mutex::new(HashMap::new()),
        }
    }

    /// Blocks until `delay` has elapsed since the last paced call for `host`,
    /// then reserves the next slot. Distinct hosts never block each other.
    async fn pace(&self, host: &str, delay: Duration) {
        loop {
            let sleep_for = {
                let mut guard = self.next_allowed.lock().await;
                let now = Instant::now();
                match guard.get(host) {
                    Some(next) if *next > now => Some(*next - now),
                    _ => {
                        guard.insert(host.to_string(), now + delay);
                        None
                    }
                }
            };

            match sleep_for {
                Some(duration) => tokio::time::sleep(duration).await,
                None => break,
            }
        }
    }

    async fn robots_for(&self, fetcher: &Fetcher, url: &url::Url) -> Result<Robots, AdapterError> {
        let host = url
            .host_str()
            .ok_or_else(|| AdapterError::parsing("robots", "host", "missing host in url"))?
            .to_string();

        {
            let cache = self.cache.lock().await;
            if let Some(robots) = cache.get(&host) {
                return Ok(robots.clone());
            }
        }

        self.pace(&host, DEFAULT_CRAWL_DELAY).await;

        let base = url::Url::parse(&format!("{}://{}/", url.scheme(), host))
            .map_err(|e| AdapterError::parsing("robots", "base_url", e.to_string()))?;
        let robots_url = robotxt::create_url(&base)
            .map_err(|e| AdapterError::parsing("robots", "robots_url", e.to_string()))?;

        let body = fetcher.get_text(robots_url.as_str()).await.unwrap_or_default();
        let robots = if body.is_empty() {
            Robots::from_always(true, ROBOTS_USER_AGENT)
        } else {
            Robots::from_bytes(body.as_bytes(), ROBOTS_USER_AGENT)
        };

        let mut cache = self.cache.lock().await;
        cache.insert(host, robots.clone());
        Ok(robots)
    }

    /// Returns `Ok(())` if `url` may be crawled, having already paced the
    /// request against the host's declared (or default) crawl delay.
    /// Returns an error if robots.txt disallows it.
    pub async fn check_and_wait(&self, fetcher: &Fetcher, url: &url::Url) -> Result<(), AdapterError> {
        let domain = url
            .host_str()
            .ok_or_else(|| AdapterError::parsing("robots", "host", "missing host in url"))?;

        let robots = self.robots_for(fetcher, url).await?;
        if !robots.is_absolute_allowed(url) {
            return Err(AdapterError::Api {
                api_name: "robots.txt".into(),
                endpoint: url.to_string(),
                code: "disallowed".into(),
            });
        }

        self.pace(domain, robots.crawl_delay().unwrap_or(DEFAULT_CRAWL_DELAY)).await;
        Ok(())
    }
}

impl Default for RobotsGate {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn pace_delays_second_call_for_same_host() {
        let gate = RobotsGate::new();
        let start = Instant::now();
        gate.pace("example.com", Duration::from_millis(30)).await;
        gate.pace("example.com", Duration::from_millis(30)).await;
        assert!(start.elapsed() >= Duration::from_millis(25));
    }

    #[tokio::test]
    async fn pace_does_not_delay_distinct_hosts() {
        let gate = RobotsGate::new();
        let start = Instant::now();
        gate.pace("a.com", Duration::from_millis(500)).await;
        gate.pace("b.com", Duration::from_millis(500)).await;
        assert!(start.elapsed() < Duration::from_millis(100));
    }
}
