//! Price quotes for held tickers. Lookups against the quota-limited provider run one at a
//! time with a fixed pause between calls; any failure (429 included) degrades that
//! symbol to an "unavailable" snapshot.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::error::QuoteError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuoteSnapshot {
    pub symbol: String,
    pub price: Option<f64>,
    pub previous_close: Option<f64>,
    pub change_pct: Option<f64>,
    pub available: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl QuoteSnapshot {
    pub fn new(symbol: impl Into<String>, price: f64, previous_close: Option<f64>) -> Self {
        let change_pct = previous_close
            .filter(|p| *p > 0.0)
            .map(|p| (price - p) / p * 100.0);
        Self {
            symbol: symbol.into(),
            price: Some(price),
            previous_close,
            change_pct,
            available: true,
            note: None,
        }
    }

    pub fn unavailable(symbol: impl Into<String>, note: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            price: None,
            previous_close: None,
            change_pct: None,
            available: false,
            note: Some(note.into()),
        }
    }
}

#[async_trait]
pub trait QuoteSource: Send + Sync {
    async fn quote(&self, symbol: &str) -> Result<QuoteSnapshot, QuoteError>;
}

/// Look up `symbols` one after another, sleeping `delay` between calls.
pub async fn fetch_quotes_sequential(
    source: &dyn QuoteSource,
    symbols: &[String],
    delay: Duration,
) -> Vec<QuoteSnapshot> {
    let mut out = Vec::with_capacity(symbols.len());
    for (i, sym) in symbols.iter().enumerate() {
        if i > 0 && !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        match source.quote(sym).await {
            Ok(q) => out.push(q),
            Err(e @ QuoteError::RateLimited { .. }) => {
                tracing::warn!(target: "quotes", symbol = %sym, error = %e, "rate limited");
                out.push(QuoteSnapshot::unavailable(sym, "rate_limited"));
            }
            Err(e) => {
                tracing::warn!(target: "quotes", symbol = %sym, error = %e, "quote lookup failed");
                out.push(QuoteSnapshot::unavailable(sym, "error"));
            }
        }
    }
    out
}

#[derive(Debug, Deserialize)]
struct ChartEnvelope {
    chart: Chart,
}

#[derive(Debug, Deserialize)]
struct Chart {
    #[serde(default)]
    result: Option<Vec<ChartResult>>,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    meta: ChartMeta,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChartMeta {
    regular_market_price: Option<f64>,
    chart_previous_close: Option<f64>,
    previous_close: Option<f64>,
}

/// Parse a chart-endpoint payload (`chart.result[0].meta`).
pub fn parse_chart(symbol: &str, body: &str) -> Result<QuoteSnapshot, QuoteError> {
    let parse_err = |reason: String| QuoteError::Parse {
        symbol: symbol.to_string(),
        reason,
    };
    let env: ChartEnvelope = serde_json::from_str(body).map_err(|e| parse_err(e.to_string()))?;
    let meta = env
        .chart
        .result
        .and_then(|r| r.into_iter().next())
        .map(|r| r.meta)
        .ok_or_else(|| parse_err("empty result".into()))?;
    let price = meta
        .regular_market_price
        .ok_or_else(|| parse_err("missing regularMarketPrice".into()))?;
    Ok(QuoteSnapshot::new(
        symbol,
        price,
        meta.chart_previous_close.or(meta.previous_close),
    ))
}

pub struct HttpQuoteSource {
    client: reqwest::Client,
    base_url: String,
}

impl HttpQuoteSource {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, QuoteError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent("holdings-feed/0.1")
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }
}

#[async_trait]
impl QuoteSource for HttpQuoteSource {
    async fn quote(&self, symbol: &str) -> Result<QuoteSnapshot, QuoteError> {
        let url = format!("{}/{}", self.base_url.trim_end_matches('/'), symbol);
        let resp = self
            .client
            .get(&url)
            .query(&[("interval", "1d"), ("range", "1d")])
            .send()
            .await?;
        let status = resp.status();
        if status.as_u16() == 429 {
            return Err(QuoteError::RateLimited {
                symbol: symbol.to_string(),
            });
        }
        if !status.is_success() {
            return Err(QuoteError::Status {
                symbol: symbol.to_string(),
                status: status.as_u16(),
            });
        }
        let body = resp.text().await?;
        parse_chart(symbol, &body)
    }
}

#[derive(Debug, Clone)]
enum Canned {
    Price(f64, Option<f64>),
    RateLimited,
}

/// In-memory quotes for tests and offline runs. Records when each call happened.
#[derive(Default)]
pub struct StaticQuoteSource {
    canned: HashMap<String, Canned>,
    calls: Mutex<Vec<(String, Instant)>>,
}

impl StaticQuoteSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, symbol: &str, price: f64, previous_close: Option<f64>) -> Self {
        self.canned
            .insert(symbol.to_string(), Canned::Price(price, previous_close));
        self
    }

    pub fn rate_limited(mut self, symbol: &str) -> Self {
        self.canned.insert(symbol.to_string(), Canned::RateLimited);
        self
    }

    pub fn calls(&self) -> Vec<(String, Instant)> {
        self.calls.lock().map(|g| g.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl QuoteSource for StaticQuoteSource {
    async fn quote(&self, symbol: &str) -> Result<QuoteSnapshot, QuoteError> {
        if let Ok(mut g) = self.calls.lock() {
            g.push((symbol.to_string(), Instant::now()));
        }
        match self.canned.get(symbol) {
            Some(Canned::Price(p, prev)) => Ok(QuoteSnapshot::new(symbol, *p, *prev)),
            Some(Canned::RateLimited) => Err(QuoteError::RateLimited {
                symbol: symbol.to_string(),
            }),
            None => Err(QuoteError::Status {
                symbol: symbol.to_string(),
                status: 404,
            }),
        }
    }
}
