mod robots;

pub use robots::RobotsGate;

use std::time::Duration;

use rand::RngExt;

use crate::error::AdapterError;

const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Safari/605.1.15",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:125.0) Gecko/20100101 Firefox/125.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Mobile/15E148 Safari/604.1",
    "Mozilla/5.0 (iPhone; CPU iPhone OS 17_4 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Mobile/15E148 Safari/604.1",
];

/// Outbound HTTP client with retry, exponential backoff with jitter, and a
/// rotating browser identification header. One instance is shared across all
/// adapters; per-host pacing against a crawl-delay is [`RobotsGate`]'s job,
/// since adapters need to consult it before they even call `get`.
#[derive(Clone)]
pub struct Fetcher {
    client: reqwest::Client,
    max_retries: u32,
    base_delay: Duration,
}

pub const RETRYABLE_STATUSES: &[u16] = &[408, 429, 500, 502, 503, 504];

impl Fetcher {
    pub fn new(max_retries: u32, base_delay: Duration, proxy: Option<&str>) -> Result<Self, AdapterError> {
        let mut builder = reqwest::Client::builder().timeout(Duration::from_secs(10));
        if let Some(proxy_url) = proxy {
            let proxy = reqwest::Proxy::all(proxy_url)
                .map_err(|e| AdapterError::network(proxy_url, e.to_string()))?;
            builder = builder.proxy(proxy);
        }
        let client = builder
            .build()
            .map_err(|e| AdapterError::network("client", e.to_string()))?;
        Ok(Self {
            client,
            max_retries,
            base_delay,
        })
    }

    fn rotated_user_agent(attempt: u32) -> &'static str {
        USER_AGENTS[(attempt as usize) % USER_AGENTS.len()]
    }

    fn backoff(&self, attempt: u32) -> Duration {
        let exp = self.base_delay.mul_f64(2f64.powi(attempt as i32));
        let jitter = Duration::from_secs_f64(rand::rng().random_range(0.0..0.5));
        exp + jitter
    }

    /// Issues a single GET with retry and backoff. Returns the final response
    /// (which may still be a non-2xx status the caller must check) or a
    /// `NetworkError` once retries are exhausted on a transport failure.
    pub async fn get(&self, url: &str) -> Result<reqwest::Response, AdapterError> {
        let mut last_err: Option<String> = None;
        for attempt in 0..=self.max_retries {
            let result = self
                .client
                .get(url)
                .header("User-Agent", Self::rotated_user_agent(attempt))
                .send()
                .await;

            match result {
                Ok(resp) => {
                    let status = resp.status().as_u16();
                    if RETRYABLE_STATUSES.contains(&status) && attempt < self.max_retries {
                        last_err = Some(format!("retryable status {status}"));
                        tokio::time::sleep(self.backoff(attempt)).await;
                        continue;
                    }
                    return Ok(resp);
                }
                Err(err) => {
                    last_err = Some(err.to_string());
                    if attempt < self.max_retries {
                        tokio::time::sleep(self.backoff(attempt)).await;
                        continue;
                    }
                }
            }
        }
        Err(AdapterError::network(
            url,
            last_err.unwrap_or_else(|| "exhausted retries".into()),
        ))
    }

    pub async fn get_text(&self, url: &str) -> Result<String, AdapterError> {
        let resp = self.get(url).await?;
        if !resp.status().is_success() {
            return Err(AdapterError::network(url, format!("status {}", resp.status())));
        }
        resp.text()
            .await
            .map_err(|e| AdapterError::network(url, e.to_string()))
    }

    pub async fn get_bytes(&self, url: &str) -> Result<bytes_compat::Bytes, AdapterError> {
        let resp = self.get(url).await?;
        if !resp.status().is_success() {
            return Err(AdapterError::network(url, format!("status {}", resp.status())));
        }
        resp.bytes()
            .await
            .map(bytes_compat::Bytes)
            .map_err(|e| AdapterError::network(url, e.to_string()))
    }

    pub async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T, AdapterError> {
        let resp = self.get(url).await?;
        if !resp.status().is_success() {
            return Err(AdapterError::network(url, format!("status {}", resp.status())));
        }
        resp.json::<T>()
            .await
            .map_err(|e| AdapterError::parsing(url, "body", e.to_string()))
    }

    pub fn reqwest_client(&self) -> &reqwest::Client {
        &self.client
    }

    /// Bounded concurrent fan-out, preserving input order in the output.
    pub async fn get_many_text(&self, urls: &[String]) -> Vec<Result<String, AdapterError>> {
        use futures::stream::StreamExt;

        const MAX_CONCURRENT_FETCHES: usize = 4;

        futures::stream::iter(urls.iter().cloned().enumerate())
            .map(|(idx, url)| {
                let this = self.clone();
                async move { (idx, this.get_text(&url).await) }
            })
            .buffer_unordered(MAX_CONCURRENT_FETCHES)
            .collect::<Vec<_>>()
            .await
            .into_iter()
            .fold(
                std::iter::repeat_with(|| None).take(urls.len()).collect(),
                |mut acc: Vec<Option<Result<String, AdapterError>>>, (idx, res)| {
                    acc[idx] = Some(res);
                    acc
                },
            )
            .into_iter()
            .map(|o| o.expect("every index was populated exactly once"))
            .collect()
    }
}

/// Thin wrapper so call sites don't depend on `reqwest::Bytes`'s re-export
/// path directly; kept intentionally tiny.
pub mod bytes_compat {
    pub struct Bytes(pub bytes::Bytes);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_agent_rotates_through_the_pool() {
        let first = Fetcher::rotated_user_agent(0);
        let second = Fetcher::rotated_user_agent(1);
        assert_ne!(first, second);
        assert_eq!(Fetcher::rotated_user_agent(0), Fetcher::rotated_user_agent(USER_AGENTS.len() as u32));
    }
}
