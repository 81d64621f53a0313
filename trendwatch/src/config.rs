use std::time::Duration;

/// Layered configuration: environment variables override a TOML file on disk;
/// required values abort startup, optional ones fall back to a default and
/// log a warning.
#[derive(Clone, Debug)]
pub struct Config {
    pub refresh_interval: Duration,
    pub stale_threshold: Duration,
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub adapter_timeout: Duration,
    pub aggregation_timeout: Duration,
    pub top_cap: usize,
    pub hook_count: usize,
    pub min_sources: usize,

    pub video_api_key: Option<String>,
    pub llm_api_key: Option<String>,
    pub llm_base_url: String,
    pub portal_api_id: Option<String>,
    pub portal_api_secret: Option<String>,

    pub cache_dir: std::path::PathBuf,
    pub cache_memory_ttl: Duration,
    pub cache_file_ttl: Duration,

    pub http_proxy: Option<String>,
    pub bind_addr: String,
    pub snapshot_path: std::path::PathBuf,
    pub log_format: LogFormat,
    pub shutdown_grace: Duration,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

#[derive(Debug, Default, serde::Deserialize)]
struct FileOverrides {
    refresh_interval: Option<u64>,
    stale_threshold: Option<u64>,
    max_retries: Option<u32>,
    retry_delay: Option<f64>,
    adapter_timeout: Option<u64>,
    aggregation_timeout: Option<u64>,
    top_cap: Option<usize>,
    hook_count: Option<usize>,
    min_sources: Option<usize>,
    cache_dir: Option<String>,
    bind_addr: Option<String>,
    snapshot_path: Option<String>,
    log_format: Option<String>,
}

fn var(key: &str) -> Option<String> {
    match std::env::var(key) {
        Ok(val) => Some(val),
        Err(std::env::VarError::NotPresent) => None,
        Err(std::env::VarError::NotUnicode(_)) => {
            tracing::warn!("environment variable `{key}` is not valid unicode, ignoring");
            None
        }
    }
}

impl Config {
    /// Loads defaults, applies an optional TOML file at `path` (if it exists),
    /// then applies environment variable overrides on top.
    pub fn load(path: Option<&std::path::Path>) -> Result<Self, crate::error::AdapterError> {
        let overrides = match path {
            Some(p) if p.exists() => {
                let text = std::fs::read_to_string(p).map_err(|e| crate::error::AdapterError::Config {
                    key: format!("{}: {e}", p.display()),
                })?;
                toml_lite::parse(&text)
            }
            _ => FileOverrides::default(),
        };

        let mut cfg = Config {
            refresh_interval: Duration::from_secs(overrides.refresh_interval.unwrap_or(300)),
            stale_threshold: Duration::from_secs(overrides.stale_threshold.unwrap_or(3600)),
            max_retries: overrides.max_retries.unwrap_or(3),
            retry_delay: Duration::from_secs_f64(overrides.retry_delay.unwrap_or(1.0)),
            adapter_timeout: Duration::from_secs(overrides.adapter_timeout.unwrap_or(30)),
            aggregation_timeout: Duration::from_secs(overrides.aggregation_timeout.unwrap_or(120)),
            top_cap: overrides.top_cap.unwrap_or(100),
            hook_count: overrides.hook_count.unwrap_or(3),
            min_sources: overrides.min_sources.unwrap_or(2),
            video_api_key: None,
            llm_api_key: None,
            llm_base_url: "https://api.openai.com/v1".to_string(),
            portal_api_id: None,
            portal_api_secret: None,
            cache_dir: overrides
                .cache_dir
                .map(std::path::PathBuf::from)
                .unwrap_or_else(|| std::path::PathBuf::from(".cache")),
            cache_memory_ttl: Duration::from_secs(300),
            cache_file_ttl: Duration::from_secs(3600),
            http_proxy: None,
            bind_addr: overrides.bind_addr.unwrap_or_else(|| "127.0.0.1:8080".to_string()),
            snapshot_path: overrides
                .snapshot_path
                .map(std::path::PathBuf::from)
                .unwrap_or_else(|| std::path::PathBuf::from("snapshot.json")),
            log_format: match overrides.log_format.as_deref() {
                Some("json") => LogFormat::Json,
                _ => LogFormat::Pretty,
            },
            shutdown_grace: Duration::from_secs(10),
        };

        if let Some(v) = var("REFRESH_INTERVAL") {
            cfg.refresh_interval = Duration::from_secs(parse_or_warn(&v, "REFRESH_INTERVAL", 300));
        }
        if let Some(v) = var("STALE_THRESHOLD") {
            cfg.stale_threshold = Duration::from_secs(parse_or_warn(&v, "STALE_THRESHOLD", 3600));
        }
        if let Some(v) = var("MAX_RETRIES") {
            cfg.max_retries = parse_or_warn(&v, "MAX_RETRIES", 3);
        }
        if let Some(v) = var("RETRY_DELAY") {
            cfg.retry_delay = Duration::from_secs_f64(parse_or_warn(&v, "RETRY_DELAY", 1.0));
        }
        if let Some(v) = var("ADAPTER_TIMEOUT") {
            cfg.adapter_timeout = Duration::from_secs(parse_or_warn(&v, "ADAPTER_TIMEOUT", 30));
        }
        if let Some(v) = var("AGGREGATION_TIMEOUT") {
            cfg.aggregation_timeout = Duration::from_secs(parse_or_warn(&v, "AGGREGATION_TIMEOUT", 120));
        }
        if let Some(v) = var("TOP_CAP") {
            cfg.top_cap = parse_or_warn(&v, "TOP_CAP", 100);
        }
        if let Some(v) = var("HOOK_COUNT") {
            cfg.hook_count = parse_or_warn(&v, "HOOK_COUNT", 3);
        }
        if let Some(v) = var("MIN_SOURCES") {
            cfg.min_sources = parse_or_warn(&v, "MIN_SOURCES", 2);
        }
        if let Some(v) = var("BIND_ADDR") {
            cfg.bind_addr = v;
        }
        if let Some(v) = var("CACHE_DIR") {
            cfg.cache_dir = std::path::PathBuf::from(v);
        }
        if let Some(v) = var("SNAPSHOT_PATH") {
            cfg.snapshot_path = std::path::PathBuf::from(v);
        }
        if let Some(v) = var("LOG_FORMAT") {
            cfg.log_format = if v == "json" { LogFormat::Json } else { LogFormat::Pretty };
        }
        if let Some(v) = var("HTTP_PROXY") {
            cfg.http_proxy = Some(v);
        }

        cfg.video_api_key = var("VIDEO_API_KEY");
        cfg.llm_api_key = var("LLM_API_KEY");
        if let Some(v) = var("LLM_BASE_URL") {
            cfg.llm_base_url = v;
        }

        match (var("PORTAL_API_ID"), var("PORTAL_API_SECRET")) {
            (Some(id), Some(secret)) => {
                cfg.portal_api_id = Some(id);
                cfg.portal_api_secret = Some(secret);
            }
            (None, None) => {}
            (id, secret) => {
                tracing::error!(
                    "PORTAL_API_ID and PORTAL_API_SECRET must both be set or both unset, got id={:?} secret_present={}",
                    id,
                    secret.is_some()
                );
                return Err(crate::error::AdapterError::Config {
                    key: "PORTAL_API_ID/PORTAL_API_SECRET".into(),
                });
            }
        }

        Ok(cfg)
    }
}

fn parse_or_warn<T: std::str::FromStr>(raw: &str, key: &str, default: T) -> T {
    raw.parse().unwrap_or_else(|_| {
        tracing::warn!("could not parse environment variable `{key}` = `{raw}`, using default");
        default
    })
}

/// A minimal TOML-subset reader: flat `key = value` pairs only, enough for the
/// options table in the configuration file. Avoids pulling in a full TOML
/// dependency for a handful of scalar overrides.
mod toml_lite {
    use super::FileOverrides;

    pub fn parse(text: &str) -> FileOverrides {
        let mut out = FileOverrides::default();
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let key = key.trim();
            let value = value.trim().trim_matches('"');
            match key {
                "refresh_interval" => out.refresh_interval = value.parse().ok(),
                "stale_threshold" => out.stale_threshold = value.parse().ok(),
                "max_retries" => out.max_retries = value.parse().ok(),
                "retry_delay" => out.retry_delay = value.parse().ok(),
                "adapter_timeout" => out.adapter_timeout = value.parse().ok(),
                "aggregation_timeout" => out.aggregation_timeout = value.parse().ok(),
                "top_cap" => out.top_cap = value.parse().ok(),
                "hook_count" => out.hook_count = value.parse().ok(),
                "min_sources" => out.min_sources = value.parse().ok(),
                "cache_dir" => out.cache_dir = Some(value.to_string()),
                "bind_addr" => out.bind_addr = Some(value.to_string()),
                "snapshot_path" => out.snapshot_path = Some(value.to_string()),
                "log_format" => out.log_format = Some(value.to_string()),
                _ => {}
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toml_lite_parses_flat_scalars() {
        let o = toml_lite::parse("top_cap = 50\nbind_addr = \"0.0.0.0:9000\"\n# comment\n");
        assert_eq!(o.top_cap, Some(50));
        assert_eq!(o.bind_addr.as_deref(), Some("0.0.0.0:9000"));
    }
}
