// src/fetch/types.rs
use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::model::SourceLayer;

/// One configured feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedSpec {
    pub name: String,
    pub url: String,
    pub layer: SourceLayer,
}

impl FeedSpec {
    pub fn new(name: impl Into<String>, url: impl Into<String>, layer: SourceLayer) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            layer,
        }
    }
}

/// A news-search hit for one ticker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArticleSummary {
    pub title: String,
    pub publisher: String,
    pub url: String,
    #[serde(default)]
    pub summary: Option<String>,
    /// Source format, unnormalized.
    pub published_at: String,
    #[serde(default)]
    pub related_tickers: Vec<String>,
}

/// A single RSS item.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FeedItem {
    pub title: String,
    #[serde(default)]
    pub link: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub content_html: Option<String>,
    #[serde(default)]
    pub pub_date: Option<String>,
}

#[async_trait::async_trait]
pub trait NewsSearch: Send + Sync {
    async fn search(&self, ticker: &str, limit: usize) -> Result<Vec<ArticleSummary>>;
    fn name(&self) -> &str;
}

#[async_trait::async_trait]
pub trait FeedClient: Send + Sync {
    async fn fetch_feed(&self, url: &str) -> Result<Vec<FeedItem>>;
}

/// Why an item was not admitted by the Fetcher.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    Deny(String),
    Stale,
    NoTickerOrMacro,
    NoEventOrTickerInTitle,
    DuplicateUrl,
    MissingUrl,
    OverLimit,
}

impl RejectReason {
    pub fn code(&self) -> String {
        match self {
            RejectReason::Deny(id) => format!("deny:{id}"),
            RejectReason::Stale => "stale".into(),
            RejectReason::NoTickerOrMacro => "no_ticker_or_macro".into(),
            RejectReason::NoEventOrTickerInTitle => "no_event_or_ticker_in_title".into(),
            RejectReason::DuplicateUrl => "duplicate_url".into(),
            RejectReason::MissingUrl => "missing_url".into(),
            RejectReason::OverLimit => "over_limit".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Rejection {
    pub source: String,
    /// Short hash of the item's URL (or title when the URL is missing).
    pub id: String,
    pub reason: String,
}

/// Outcome of one source call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceOutcome {
    pub source: String,
    /// "holdings" for news search, otherwise the feed layer.
    pub kind: String,
    /// Items returned by the source before filtering.
    pub returned: usize,
    pub admitted: usize,
    pub error: Option<String>,
}

impl SourceOutcome {
    pub fn ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Diagnostic record of one `fetch_all`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FetchReport {
    pub sources: Vec<SourceOutcome>,
    pub rejected: Vec<Rejection>,
    pub layers_fetched: Vec<SourceLayer>,
}

impl FetchReport {
    pub fn any_source_ok(&self) -> bool {
        self.sources.iter().any(SourceOutcome::ok)
    }

    pub fn rejected_with(&self, code: &str) -> usize {
        self.rejected.iter().filter(|r| r.reason == code).count()
    }
}
