use std::sync::Arc;

use crate::adapters::{Adapter, FetchContext, UnavailablePageFetcher};
use crate::adapters::{news, portal, public_trends, video};
use crate::aggregator::Aggregator;
use crate::cache::{CacheBackend, FileCache, MemoryCache};
use crate::clusterer::Clusterer;
use crate::config::Config;
use crate::controller::RefreshController;
use crate::facade::QueryFacade;
use crate::history::{HistoryProvider, MockHistoryProvider};
use crate::http::{Fetcher, RobotsGate};
use crate::model::Source;

/// Process-wide shared context. Cheap to clone: everything inside is
/// reference-counted, so it can be passed by value as `axum` router state
/// into handlers and spawned tasks.
#[derive(Clone)]
pub struct App {
    pub config: Arc<Config>,
    pub facade: Arc<QueryFacade>,
    pub history: Arc<dyn HistoryProvider>,
}

/// Builds every enabled source adapter from configuration, following the
/// collector-initialization pattern of trying each family and recording it
/// as simply absent (not an error) when its prerequisites aren't met.
fn build_adapters(config: &Config, enabled: &AdapterToggles) -> Vec<Arc<dyn Adapter>> {
    let mut adapters: Vec<Arc<dyn Adapter>> = Vec::new();

    if enabled.video {
        adapters.push(Arc::new(video::VideoAdapter {
            region: "US".to_string(),
        }));
    }

    if enabled.portal {
        adapters.push(Arc::new(portal::PortalAdapter {
            source: Source::PortalN,
            strategy: portal::Strategy::Json {
                url: "https://portal-n.example.com/api/realtime-search".to_string(),
            },
        }));
        adapters.push(Arc::new(portal::PortalAdapter {
            source: Source::PortalD,
            strategy: portal::Strategy::Html {
                url: "https://portal-d.example.com/ranking".to_string(),
                item_selector: "li.rank-item".to_string(),
                keyword_selector: "span.keyword".to_string(),
            },
        }));
    }

    if enabled.news {
        adapters.push(Arc::new(news::NewsRssAdapter {
            feed_url: "https://news.example.com/rss/rank.xml".to_string(),
        }));
        adapters.push(Arc::new(news::NewsPortalAdapter {
            source: Source::NewsPortalN,
            url: "https://news-portal-n.example.com/most-read".to_string(),
            item_selector: "div.article-row".to_string(),
            title_selector: "a.title".to_string(),
            link_selector: "a.title".to_string(),
        }));
        adapters.push(Arc::new(news::NewsPortalSearchAdapter {
            source: Source::NewsPortalD,
            endpoint_url: "https://news-portal-d.example.com/v1/search".to_string(),
            query: "trending".to_string(),
        }));
    }

    if enabled.public_trends {
        adapters.push(Arc::new(public_trends::PublicTrendsRssAdapter {
            feed_url: "https://trends.example.com/trendingsearches/daily/rss".to_string(),
        }));
        adapters.push(Arc::new(public_trends::PublicTrendsRealtimeAdapter {
            endpoint_url: "https://trends.example.com/trendingsearches/realtime".to_string(),
        }));
    }

    let _ = config; // adapters read credentials off ctx.config at fetch time, not construction time
    adapters
}

#[derive(Clone, Copy, Debug)]
pub struct AdapterToggles {
    pub video: bool,
    pub portal: bool,
    pub news: bool,
    pub public_trends: bool,
}

impl AdapterToggles {
    pub fn all() -> Self {
        Self {
            video: true,
            portal: true,
            news: true,
            public_trends: true,
        }
    }
}

impl App {
    pub async fn bootstrap(config: Config, toggles: AdapterToggles) -> Self {
        let config = Arc::new(config);

        let http = Fetcher::new(config.max_retries, config.retry_delay, config.http_proxy.as_deref())
            .expect("failed to build http client");

        let (cache, cache_ttl): (Arc<dyn CacheBackend>, _) = if config.cache_dir.as_os_str().is_empty() {
            (Arc::new(MemoryCache::new()), config.cache_memory_ttl)
        } else {
            (Arc::new(FileCache::new(config.cache_dir.clone())), config.cache_file_ttl)
        };

        let ctx = FetchContext {
            http,
            cache,
            cache_ttl,
            robots: Arc::new(RobotsGate::new()),
            page_fetcher: Arc::new(UnavailablePageFetcher),
            config: config.clone(),
        };

        let adapters = build_adapters(&config, &toggles);
        let aggregator = Aggregator::new(
            adapters,
            config.max_retries,
            config.retry_delay,
            config.adapter_timeout,
            config.aggregation_timeout,
            config.top_cap,
        );

        let clusterer = config
            .llm_api_key
            .as_ref()
            .map(|key| Clusterer::new(config.llm_base_url.clone(), key.clone()));
        let llm_configured = clusterer.is_some();

        let controller = Arc::new(RefreshController::new(
            aggregator,
            clusterer,
            ctx,
            config.hook_count,
            config.min_sources,
            config.top_cap,
            100,
            config.snapshot_path.clone(),
        ));

        Self {
            config,
            facade: Arc::new(QueryFacade::new(controller, llm_configured)),
            history: Arc::new(MockHistoryProvider),
        }
    }
}
