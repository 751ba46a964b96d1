// src/fetch/rss.rs
//! RSS 2.0 feed clients: live HTTP and an in-memory fixture map.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use quick_xml::de::from_str;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

use crate::fetch::types::{FeedClient, FeedItem};

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}

#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(rename = "item", default)]
    item: Vec<Item>,
}

#[derive(Debug, Deserialize)]
struct Item {
    title: Option<String>,
    link: Option<String>,
    guid: Option<String>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
    description: Option<String>,
    #[serde(rename = "content:encoded")]
    content_encoded: Option<String>,
}

/// Parse an RSS 2.0 document. Items without a title are skipped.
pub fn parse_rss(xml: &str) -> Result<Vec<FeedItem>> {
    let xml_clean = scrub_html_entities_for_xml(xml);
    let rss: Rss = from_str(&xml_clean).context("parsing rss xml")?;

    let mut out = Vec::with_capacity(rss.channel.item.len());
    for it in rss.channel.item {
        let title = it.title.unwrap_or_default().trim().to_string();
        if title.is_empty() {
            continue;
        }
        // Some feeds only put the permalink in <guid>.
        let link = it
            .link
            .filter(|l| !l.trim().is_empty())
            .or_else(|| it.guid.filter(|g| g.trim_start().starts_with("http")));
        out.push(FeedItem {
            title,
            link: link.map(|l| l.trim().to_string()),
            description: it.description,
            content_html: it.content_encoded,
            pub_date: it.pub_date,
        });
    }
    Ok(out)
}

/// HTML entities that are legal in feeds but not in XML.
fn scrub_html_entities_for_xml(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&ndash;", "-")
        .replace("&mdash;", "-")
        .replace("&ldquo;", "\"")
        .replace("&rdquo;", "\"")
        .replace("&lsquo;", "'")
        .replace("&rsquo;", "'")
        .replace("&hellip;", "...")
}

pub struct HttpFeedClient {
    client: reqwest::Client,
}

impl HttpFeedClient {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent("holdings-feed/0.1")
            .connect_timeout(Duration::from_secs(4))
            .timeout(timeout)
            .build()
            .context("building feed http client")?;
        Ok(Self { client })
    }
}

#[async_trait]
impl FeedClient for HttpFeedClient {
    async fn fetch_feed(&self, url: &str) -> Result<Vec<FeedItem>> {
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| format!("feed http get {url}"))?
            .error_for_status()
            .with_context(|| format!("feed http status {url}"))?;
        let body = resp.text().await.context("feed http .text()")?;
        parse_rss(&body)
    }
}

/// Serves canned XML per URL; unknown URLs fail like an unreachable host.
#[derive(Debug, Default, Clone)]
pub struct FixtureFeedClient {
    docs: HashMap<String, String>,
}

impl FixtureFeedClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, url: impl Into<String>, xml: impl Into<String>) -> Self {
        self.docs.insert(url.into(), xml.into());
        self
    }
}

#[async_trait]
impl FeedClient for FixtureFeedClient {
    async fn fetch_feed(&self, url: &str) -> Result<Vec<FeedItem>> {
        let xml = self
            .docs
            .get(url)
            .ok_or_else(|| anyhow!("no fixture for {url}"))?;
        parse_rss(xml)
    }
}
