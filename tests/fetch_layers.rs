// tests/fetch_layers.rs
//
// Fetcher behaviour over canned sources: holdings-first merge, cross-layer dedup,
// layer escalation only while short, reject reasons and the no-data condition.

mod common;

use std::collections::HashSet;

use holdings_feed::config::PipelineConfig;
use holdings_feed::fetch::normalize_url;
use holdings_feed::fetch::rss::FixtureFeedClient;
use holdings_feed::fetch::search::StaticNewsSearch;
use holdings_feed::model::{Holding, SourceLayer};
use holdings_feed::tickers::Gazetteer;
use holdings_feed::PipelineError;

use common::*;

fn macro_wire_xml() -> String {
    let items: String = (1..=5)
        .map(|i| {
            format!(
                "<item><title>Treasury yields move after auction {i}</title>\
                 <link>https://wire.test/yields-{i}</link>\
                 <pubDate>Mon, 10 Mar 2025 0{i}:00:00 GMT</pubDate></item>"
            )
        })
        .collect();
    format!("<?xml version=\"1.0\"?><rss version=\"2.0\"><channel><title>W</title>{items}</channel></rss>")
}

fn wire_only_config() -> PipelineConfig {
    let mut cfg = test_config();
    cfg.feeds.retain(|f| f.layer == SourceLayer::Wire);
    cfg
}

#[tokio::test]
async fn holdings_article_is_merged_ahead_of_wire_items() {
    let cfg = wire_only_config();
    let feeds = FixtureFeedClient::new().with(WIRE_URL, macro_wire_xml());
    let f = fetcher(&cfg, feeds, Some(apple_search()));
    let g = Gazetteer::default_seed();

    let out = f
        .fetch_all(&[Holding::new("AAPL", "Apple")], 60, &g, now())
        .await
        .expect("fetch");

    assert_eq!(out.articles.len(), 6);
    let first = &out.articles[0];
    assert!(first.is_holdings_news);
    assert_eq!(first.layer, SourceLayer::Wire);
    assert_eq!(first.ticker_candidates, vec!["AAPL".to_string()]);
    assert!(out.articles[1..].iter().all(|a| !a.is_holdings_news));
}

#[tokio::test]
async fn fixture_run_records_every_reject_reason() {
    let cfg = test_config();
    let f = fetcher(&cfg, fixture_feeds(), Some(apple_search()));
    let g = Gazetteer::default_seed();

    let out = f
        .fetch_all(&[Holding::new("AAPL", "Apple")], 60, &g, now())
        .await
        .expect("fetch");

    // 1 holdings + 3 wire + 5 aggregator
    assert_eq!(out.articles.len(), 9, "{:#?}", out.report.rejected);
    assert_eq!(out.report.rejected_with("deny:top_picks"), 1);
    assert_eq!(out.report.rejected_with("stale"), 1);
    assert_eq!(out.report.rejected_with("duplicate_url"), 1);
    assert_eq!(out.report.rejected_with("no_ticker_or_macro"), 1);
    assert_eq!(
        out.report.layers_fetched,
        vec![SourceLayer::Wire, SourceLayer::Aggregator]
    );

    // The stale Fed item survives on its macro keyword.
    assert!(out.articles.iter().any(|a| a.url.ends_with("/fed-officials")));
    assert!(out.articles.iter().all(|a| !a.url.ends_with("/walmart-drones")));

    let urls: HashSet<String> = out.articles.iter().map(|a| normalize_url(&a.url)).collect();
    assert_eq!(urls.len(), out.articles.len(), "duplicate normalized URL in output");
    let ids: HashSet<&str> = out.articles.iter().map(|a| a.id.as_str()).collect();
    assert_eq!(ids.len(), out.articles.len());
}

#[tokio::test]
async fn aggregator_is_skipped_once_the_limit_is_reached() {
    let cfg = test_config();
    let f = fetcher(&cfg, fixture_feeds(), Some(apple_search()));
    let g = Gazetteer::default_seed();

    let out = f
        .fetch_all(&[Holding::new("AAPL", "Apple")], 3, &g, now())
        .await
        .expect("fetch");

    assert_eq!(out.articles.len(), 3);
    assert!(out.articles[0].is_holdings_news);
    assert_eq!(out.report.layers_fetched, vec![SourceLayer::Wire]);
    assert_eq!(out.report.rejected_with("over_limit"), 1);
    assert!(out.articles.iter().all(|a| a.layer == SourceLayer::Wire));
}

#[tokio::test]
async fn holdings_order_follows_the_holdings_list() {
    let cfg = wire_only_config();
    let search = StaticNewsSearch::new()
        .with("MSFT", vec![hit("Microsoft reports cloud revenue jump", "https://s.test/msft", "Reuters", 2, &[])])
        .with("AAPL", vec![hit("Apple launches new iPad", "https://s.test/aapl", "Reuters", 1, &[])]);
    let f = fetcher(&cfg, FixtureFeedClient::new().with(WIRE_URL, macro_wire_xml()), Some(search));
    let g = Gazetteer::default_seed();

    let holdings = vec![Holding::new("MSFT", "Microsoft"), Holding::new("AAPL", "Apple")];
    let out = f.fetch_all(&holdings, 60, &g, now()).await.expect("fetch");

    assert_eq!(out.articles[0].url, "https://s.test/msft");
    assert_eq!(out.articles[1].url, "https://s.test/aapl");
}

#[tokio::test]
async fn holdings_hits_without_event_or_ticker_are_rejected() {
    let cfg = wire_only_config();
    let search = StaticNewsSearch::new().with(
        "AAPL",
        vec![
            hit("Should you buy Apple stock right now", "https://s.test/1", "Blog", 1, &[]),
            hit("Five gadgets we liked this week", "https://s.test/2", "Blog", 1, &[]),
            hit("", "", "Blog", 1, &[]),
        ],
    );
    let f = fetcher(&cfg, FixtureFeedClient::new().with(WIRE_URL, macro_wire_xml()), Some(search));
    let g = Gazetteer::default_seed();

    let out = f
        .fetch_all(&[Holding::new("AAPL", "Apple")], 60, &g, now())
        .await
        .expect("fetch");

    assert!(out.articles.iter().all(|a| !a.is_holdings_news));
    assert_eq!(out.report.rejected_with("deny:should_you_buy"), 1);
    assert_eq!(out.report.rejected_with("no_event_or_ticker_in_title"), 1);
    assert_eq!(out.report.rejected_with("missing_url"), 1);
}

#[tokio::test]
async fn one_failing_source_does_not_abort_the_fetch() {
    let cfg = test_config();
    // No wire fixture: that feed errors. Search fails too.
    let feeds = FixtureFeedClient::new().with(AGG_URL, AGG_XML);
    let f = fetcher(&cfg, feeds, Some(StaticNewsSearch::new().failing("AAPL")));
    let g = Gazetteer::default_seed();

    let out = f
        .fetch_all(&[Holding::new("AAPL", "Apple")], 60, &g, now())
        .await
        .expect("partial failure still yields data");

    assert!(!out.articles.is_empty());
    let failed: Vec<_> = out.report.sources.iter().filter(|s| !s.ok()).collect();
    assert_eq!(failed.len(), 2);
    assert!(out.report.any_source_ok());
}

#[tokio::test]
async fn every_source_failing_is_no_data() {
    let cfg = test_config();
    let f = fetcher(&cfg, FixtureFeedClient::new(), Some(StaticNewsSearch::new().failing("AAPL")));
    let g = Gazetteer::default_seed();

    let err = f
        .fetch_all(&[Holding::new("AAPL", "Apple")], 60, &g, now())
        .await
        .expect_err("nothing succeeded");
    assert!(matches!(err, PipelineError::NoData));
}

#[tokio::test]
async fn nothing_configured_is_no_data() {
    let mut cfg = test_config();
    cfg.feeds.clear();
    let f = fetcher(&cfg, FixtureFeedClient::new(), None);
    let g = Gazetteer::default_seed();

    let err = f.fetch_all(&[], 60, &g, now()).await.expect_err("no sources");
    assert_eq!(err.code(), "no_data");
}

#[tokio::test]
async fn empty_but_successful_sources_are_not_no_data() {
    let cfg = wire_only_config();
    let empty = "<?xml version=\"1.0\"?><rss version=\"2.0\"><channel><title>W</title></channel></rss>";
    let f = fetcher(&cfg, FixtureFeedClient::new().with(WIRE_URL, empty), None);
    let g = Gazetteer::default_seed();

    let out = f.fetch_all(&[], 60, &g, now()).await.expect("ran fine, found nothing");
    assert!(out.articles.is_empty());
}
