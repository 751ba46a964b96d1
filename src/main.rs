//! Holdings feed service: binary entrypoint.
//! Loads configuration, wires the HTTP collaborators into the pipeline and serves the
//! Axum router.

use std::sync::Arc;
use std::time::Duration;

use shuttle_axum::ShuttleAxum;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use holdings_feed::config::{AiConfig, PipelineConfig};
use holdings_feed::fetch::rss::HttpFeedClient;
use holdings_feed::fetch::search::HttpNewsSearch;
use holdings_feed::fetch::Fetcher;
use holdings_feed::metrics::Metrics;
use holdings_feed::quotes::HttpQuoteSource;
use holdings_feed::{llm, router, AppState, Pipeline, PipelineRunner};

/// Compact logs by default; `FEED_LOG_JSON=1` switches to JSON lines.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("holdings_feed=info,warn"));
    let json = std::env::var("FEED_LOG_JSON").is_ok_and(|v| v == "1");

    let registry = tracing_subscriber::registry().with(filter);
    // The runtime may already have installed a subscriber.
    let _ = if json {
        registry.with(fmt::layer().json()).try_init()
    } else {
        registry.with(fmt::layer().compact()).try_init()
    };
}

#[shuttle_runtime::main]
async fn axum() -> ShuttleAxum {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();
    init_tracing();

    let cfg = PipelineConfig::load_default()?;
    let ai = AiConfig::load_default()?;
    let timeout = Duration::from_millis(cfg.fetch.source_timeout_ms);

    let feeds = Arc::new(HttpFeedClient::new(timeout)?);
    let mut fetcher = Fetcher::new(feeds, cfg.feeds.clone(), cfg.fetch.clone());
    if cfg.search.enabled {
        let search = HttpNewsSearch::new(cfg.search.base_url.clone(), timeout)?;
        fetcher = fetcher.with_search(Arc::new(search), cfg.search.per_ticker_limit);
    }

    let quotes = if cfg.quotes.enabled {
        match HttpQuoteSource::new(cfg.quotes.base_url.clone(), timeout) {
            Ok(q) => Some(q),
            Err(e) => {
                tracing::warn!(error = %e, "quote client init failed; quotes disabled");
                None
            }
        }
    } else {
        None
    };

    let model = llm::build_client_from_config(&ai);
    tracing::info!(provider = model.provider_name(), feeds = cfg.feeds.len(), "pipeline configured");

    let mut pipeline = Pipeline::new(cfg, fetcher, model);
    if let Some(q) = quotes {
        pipeline = pipeline.with_quotes(Arc::new(q));
    }

    let mut state = AppState::new(Arc::new(PipelineRunner::new(Arc::new(pipeline))));
    match Metrics::init() {
        Ok(m) => state = state.with_metrics(m.handle),
        Err(e) => tracing::warn!(error = ?e, "metrics recorder not installed"),
    }

    Ok(router(state).into())
}
