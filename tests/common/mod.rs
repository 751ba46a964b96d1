// tests/common/mod.rs
//
// Shared fixtures: canned feeds, a canned news search and a pipeline wired to them.
#![allow(dead_code)]

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};

use holdings_feed::config::PipelineConfig;
use holdings_feed::fetch::rss::FixtureFeedClient;
use holdings_feed::fetch::search::StaticNewsSearch;
use holdings_feed::fetch::types::{ArticleSummary, FeedSpec};
use holdings_feed::fetch::Fetcher;
use holdings_feed::llm::DynLanguageModel;
use holdings_feed::model::SourceLayer;
use holdings_feed::Pipeline;

pub const WIRE_URL: &str = "https://wire.test/rss";
pub const AGG_URL: &str = "https://agg.test/rss";

pub const WIRE_XML: &str = include_str!("../fixtures/wire.xml");
pub const AGG_XML: &str = include_str!("../fixtures/aggregator.xml");

/// 2025-03-10T12:00:00Z, two hours after the newest fixture item.
pub fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 10, 12, 0, 0).unwrap()
}

/// Unix seconds `hours_ago` before [`now`], as the search API reports them.
pub fn ts_hours_ago(hours_ago: i64) -> String {
    (now().timestamp() - hours_ago * 3600).to_string()
}

pub fn feed_specs() -> Vec<FeedSpec> {
    vec![
        FeedSpec::new("Federal Reserve", WIRE_URL, SourceLayer::Wire),
        FeedSpec::new("CNBC", AGG_URL, SourceLayer::Aggregator),
    ]
}

pub fn fixture_feeds() -> FixtureFeedClient {
    FixtureFeedClient::new()
        .with(WIRE_URL, WIRE_XML)
        .with(AGG_URL, AGG_XML)
}

pub fn hit(title: &str, url: &str, publisher: &str, hours_ago: i64, related: &[&str]) -> ArticleSummary {
    ArticleSummary {
        title: title.to_string(),
        publisher: publisher.to_string(),
        url: url.to_string(),
        summary: None,
        published_at: ts_hours_ago(hours_ago),
        related_tickers: related.iter().map(|s| s.to_string()).collect(),
    }
}

pub fn apple_search() -> StaticNewsSearch {
    StaticNewsSearch::new().with(
        "AAPL",
        vec![hit(
            "Apple announces $110 billion buyback",
            "https://search.test/apple-buyback",
            "Reuters",
            1,
            &["AAPL"],
        )],
    )
}

/// Config with quotes unthrottled so tests don't sleep.
pub fn test_config() -> PipelineConfig {
    let mut cfg = PipelineConfig::default();
    cfg.feeds = feed_specs();
    cfg.quotes.delay_ms = 0;
    cfg
}

pub fn fetcher(cfg: &PipelineConfig, feeds: FixtureFeedClient, search: Option<StaticNewsSearch>) -> Fetcher {
    let f = Fetcher::new(Arc::new(feeds), cfg.feeds.clone(), cfg.fetch.clone());
    match search {
        Some(s) => f.with_search(Arc::new(s), cfg.search.per_ticker_limit),
        None => f,
    }
}

pub fn pipeline(llm: DynLanguageModel) -> Pipeline {
    let cfg = test_config();
    let f = fetcher(&cfg, fixture_feeds(), Some(apple_search()));
    Pipeline::new(cfg, f, llm).with_clock(now)
}
