// src/fetch/search.rs
//! Per-ticker news search clients.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

use crate::fetch::types::{ArticleSummary, NewsSearch};

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    news: Vec<SearchNews>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchNews {
    #[serde(default)]
    title: String,
    #[serde(default)]
    publisher: String,
    #[serde(default)]
    link: String,
    #[serde(default)]
    provider_publish_time: Option<i64>,
    #[serde(default)]
    related_tickers: Vec<String>,
}

/// Parse a search payload (`news[].{title,publisher,link,providerPublishTime,relatedTickers}`).
pub fn parse_search_response(body: &str) -> Result<Vec<ArticleSummary>> {
    let resp: SearchResponse = serde_json::from_str(body).context("parsing search json")?;
    Ok(resp
        .news
        .into_iter()
        .filter(|n| !n.title.trim().is_empty())
        .map(|n| ArticleSummary {
            title: n.title,
            publisher: n.publisher,
            url: n.link,
            summary: None,
            published_at: n
                .provider_publish_time
                .map(|t| t.to_string())
                .unwrap_or_default(),
            related_tickers: n.related_tickers,
        })
        .collect())
}

/// HTTP news search against a Yahoo-Finance-style search endpoint.
pub struct HttpNewsSearch {
    client: reqwest::Client,
    base_url: String,
}

impl HttpNewsSearch {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent("holdings-feed/0.1")
            .connect_timeout(Duration::from_secs(4))
            .timeout(timeout)
            .build()
            .context("building search http client")?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }
}

#[async_trait]
impl NewsSearch for HttpNewsSearch {
    async fn search(&self, ticker: &str, limit: usize) -> Result<Vec<ArticleSummary>> {
        let news_count = limit.to_string();
        let resp = self
            .client
            .get(&self.base_url)
            .query(&[
                ("q", ticker),
                ("newsCount", news_count.as_str()),
                ("quotesCount", "0"),
            ])
            .send()
            .await
            .with_context(|| format!("search http get {ticker}"))?
            .error_for_status()
            .with_context(|| format!("search http status {ticker}"))?;
        let body = resp.text().await.context("search http .text()")?;
        let mut items = parse_search_response(&body)?;
        items.truncate(limit);
        Ok(items)
    }

    fn name(&self) -> &str {
        "news-search"
    }
}

/// In-memory search: canned results per ticker; listed tickers can be made to fail.
#[derive(Debug, Default, Clone)]
pub struct StaticNewsSearch {
    results: HashMap<String, Vec<ArticleSummary>>,
    failing: Vec<String>,
}

impl StaticNewsSearch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, ticker: &str, items: Vec<ArticleSummary>) -> Self {
        self.results.insert(ticker.to_ascii_uppercase(), items);
        self
    }

    pub fn failing(mut self, ticker: &str) -> Self {
        self.failing.push(ticker.to_ascii_uppercase());
        self
    }
}

#[async_trait]
impl NewsSearch for StaticNewsSearch {
    async fn search(&self, ticker: &str, limit: usize) -> Result<Vec<ArticleSummary>> {
        let key = ticker.to_ascii_uppercase();
        if self.failing.contains(&key) {
            return Err(anyhow!("search unavailable for {key}"));
        }
        let mut v = self.results.get(&key).cloned().unwrap_or_default();
        v.truncate(limit);
        Ok(v)
    }

    fn name(&self) -> &str {
        "static-search"
    }
}
