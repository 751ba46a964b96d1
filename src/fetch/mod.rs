// src/fetch/mod.rs
//! Fetcher: concurrent multi-source acquisition with holdings-first merge.
//!
//! Every source call runs as its own task inside a bounded `JoinSet` and returns its
//! own item list. Deduplication by normalized URL happens afterwards in a single
//! merge step, in priority order: holdings search, wire, aggregator, fallback.
//! Aggregator and fallback layers are only fetched while the merged list is short.

pub mod filter;
pub mod rss;
pub mod search;
pub mod types;

use chrono::{DateTime, Utc};
use metrics::{counter, histogram};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::config::FetchConfig;
use crate::error::PipelineError;
use crate::fetch::filter::HardFilter;
use crate::fetch::types::{
    ArticleSummary, FeedClient, FeedItem, FeedSpec, FetchReport, NewsSearch, RejectReason,
    Rejection, SourceOutcome,
};
use crate::model::{Holding, RawArticle, SourceLayer};
use crate::tickers::Gazetteer;

/// Case-insensitive, trimmed URL used for dedup and ids.
pub fn normalize_url(url: &str) -> String {
    url.trim().to_lowercase()
}

/// First 12 hex chars of SHA-256.
pub fn short_hash(text: &str) -> String {
    let digest = Sha256::digest(text.as_bytes());
    let mut out = String::with_capacity(12);
    for b in digest.iter().take(6) {
        use std::fmt::Write as _;
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

/// Result of one fetch.
#[derive(Debug, Clone, Default)]
pub struct FetchOutput {
    pub articles: Vec<RawArticle>,
    pub report: FetchReport,
}

/// What one source task produced before filtering.
struct SourceBatch<T> {
    order: usize,
    source: String,
    layer: Option<SourceLayer>,
    ticker: Option<String>,
    result: anyhow::Result<Vec<T>>,
}

/// Items admitted from one source, in source order, plus its report row.
struct Admitted {
    outcome: SourceOutcome,
    items: Vec<RawArticle>,
}

pub struct Fetcher {
    feeds: Arc<dyn FeedClient>,
    feed_specs: Vec<FeedSpec>,
    search: Option<Arc<dyn NewsSearch>>,
    per_ticker_limit: usize,
    cfg: FetchConfig,
}

impl Fetcher {
    pub fn new(feeds: Arc<dyn FeedClient>, feed_specs: Vec<FeedSpec>, cfg: FetchConfig) -> Self {
        Self {
            feeds,
            feed_specs,
            search: None,
            per_ticker_limit: 10,
            cfg,
        }
    }

    pub fn with_search(mut self, search: Arc<dyn NewsSearch>, per_ticker_limit: usize) -> Self {
        self.search = Some(search);
        self.per_ticker_limit = per_ticker_limit.max(1);
        self
    }

    fn timeout(&self) -> Duration {
        Duration::from_millis(self.cfg.source_timeout_ms)
    }

    /// `fetchAll(holdings, limit)`: deduplicated, priority-ordered, at most `limit` items.
    ///
    /// Fails with [`PipelineError::NoData`] only when no source call succeeded.
    pub async fn fetch_all(
        &self,
        holdings: &[Holding],
        limit: usize,
        gazetteer: &Gazetteer,
        now: DateTime<Utc>,
    ) -> Result<FetchOutput, PipelineError> {
        crate::metrics::ensure_described();
        let t0 = Instant::now();
        let filter = HardFilter::new(gazetteer, self.cfg.stale_hours, now);
        let semaphore = Arc::new(Semaphore::new(self.cfg.max_concurrency.max(1)));

        let mut report = FetchReport::default();
        let mut merged: Vec<RawArticle> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();

        // Holdings search and wire feeds are in flight together.
        let (holdings_batches, wire_batches) = tokio::join!(
            self.search_holdings(holdings, semaphore.clone()),
            self.fetch_layer(SourceLayer::Wire, semaphore.clone()),
        );

        let holdings_admitted = holdings_batches
            .into_iter()
            .map(|b| admit_search_batch(b, &filter))
            .collect();
        merge_into(&mut merged, &mut seen, &mut report, holdings_admitted);

        if self.has_layer(SourceLayer::Wire) {
            report.layers_fetched.push(SourceLayer::Wire);
        }
        let wire_admitted = wire_batches
            .into_iter()
            .map(|b| admit_feed_batch(b, &filter))
            .collect();
        merge_into(&mut merged, &mut seen, &mut report, wire_admitted);

        for layer in [SourceLayer::Aggregator, SourceLayer::Fallback] {
            if merged.len() >= limit || !self.has_layer(layer) {
                continue;
            }
            report.layers_fetched.push(layer);
            let batches = self.fetch_layer(layer, semaphore.clone()).await;
            let admitted = batches
                .into_iter()
                .map(|b| admit_feed_batch(b, &filter))
                .collect();
            merge_into(&mut merged, &mut seen, &mut report, admitted);
        }

        if merged.len() > limit {
            for a in merged.drain(limit..) {
                report.rejected.push(Rejection {
                    source: a.source,
                    id: a.id,
                    reason: RejectReason::OverLimit.code(),
                });
            }
        }

        for r in &report.rejected {
            counter!("feed_fetch_rejected_total", "reason" => reason_label(&r.reason)).increment(1);
        }
        counter!("feed_fetch_articles_total").increment(merged.len() as u64);
        histogram!("feed_fetch_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);

        if !report.any_source_ok() {
            tracing::warn!(
                target: "fetch",
                sources = report.sources.len(),
                "every source failed; no data"
            );
            return Err(PipelineError::NoData);
        }

        tracing::info!(
            target: "fetch",
            admitted = merged.len(),
            rejected = report.rejected.len(),
            sources = report.sources.len(),
            "fetch complete"
        );
        Ok(FetchOutput {
            articles: merged,
            report,
        })
    }

    fn has_layer(&self, layer: SourceLayer) -> bool {
        self.feed_specs.iter().any(|f| f.layer == layer)
    }

    /// One task per distinct held ticker.
    async fn search_holdings(
        &self,
        holdings: &[Holding],
        semaphore: Arc<Semaphore>,
    ) -> Vec<SourceBatch<ArticleSummary>> {
        let Some(search) = self.search.clone() else {
            return Vec::new();
        };

        let mut tickers: Vec<String> = Vec::new();
        for h in holdings {
            let t = h.symbol.trim().to_ascii_uppercase();
            if !t.is_empty() && !tickers.contains(&t) {
                tickers.push(t);
            }
        }

        let mut set = JoinSet::new();
        for (order, ticker) in tickers.into_iter().enumerate() {
            let search = search.clone();
            let sem = semaphore.clone();
            let timeout = self.timeout();
            let limit = self.per_ticker_limit;
            set.spawn(async move {
                let _permit = sem.acquire_owned().await;
                let result = match tokio::time::timeout(timeout, search.search(&ticker, limit)).await
                {
                    Ok(r) => r,
                    Err(_) => Err(anyhow::anyhow!(
                        "search timed out after {}ms",
                        timeout.as_millis()
                    )),
                };
                SourceBatch {
                    order,
                    source: search.name().to_string(),
                    layer: None,
                    ticker: Some(ticker),
                    result,
                }
            });
        }
        collect_batches(set).await
    }

    /// One task per feed of `layer`.
    async fn fetch_layer(
        &self,
        layer: SourceLayer,
        semaphore: Arc<Semaphore>,
    ) -> Vec<SourceBatch<FeedItem>> {
        let mut set = JoinSet::new();
        for (order, spec) in self
            .feed_specs
            .iter()
            .filter(|f| f.layer == layer)
            .cloned()
            .enumerate()
        {
            let client = self.feeds.clone();
            let sem = semaphore.clone();
            let timeout = self.timeout();
            set.spawn(async move {
                let _permit = sem.acquire_owned().await;
                let result = match tokio::time::timeout(timeout, client.fetch_feed(&spec.url)).await
                {
                    Ok(r) => r,
                    Err(_) => Err(anyhow::anyhow!(
                        "feed timed out after {}ms",
                        timeout.as_millis()
                    )),
                };
                SourceBatch {
                    order,
                    source: spec.name,
                    layer: Some(spec.layer),
                    ticker: None,
                    result,
                }
            });
        }
        collect_batches(set).await
    }
}

/// Drain a task group. Panicked tasks are logged and dropped; output is in issue order
/// so repeated runs over the same inputs merge identically.
async fn collect_batches<T: 'static>(mut set: JoinSet<SourceBatch<T>>) -> Vec<SourceBatch<T>> {
    let mut out = Vec::new();
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok(b) => out.push(b),
            Err(e) => {
                tracing::warn!(target: "fetch", error = ?e, "source task aborted");
                counter!("feed_source_errors_total", "kind" => "task").increment(1);
            }
        }
    }
    out.sort_by_key(|b| b.order);
    out
}

fn failed_outcome(source: &str, kind: &str, err: &anyhow::Error) -> SourceOutcome {
    tracing::warn!(target: "fetch", error = ?err, source, kind, "source error");
    counter!("feed_source_errors_total", "kind" => kind.to_string()).increment(1);
    SourceOutcome {
        source: source.to_string(),
        kind: kind.to_string(),
        returned: 0,
        admitted: 0,
        error: Some(format!("{err:#}")),
    }
}

fn reject(rejected: &mut Vec<Rejection>, source: &str, key: &str, reason: RejectReason) {
    rejected.push(Rejection {
        source: source.to_string(),
        id: short_hash(key),
        reason: reason.code(),
    });
}

fn admit_search_batch(batch: SourceBatch<ArticleSummary>, filter: &HardFilter<'_>) -> (Admitted, Vec<Rejection>) {
    let ticker = batch.ticker.unwrap_or_default();
    let label = format!("{}:{}", batch.source, ticker);
    let items = match batch.result {
        Ok(items) => items,
        Err(e) => {
            return (
                Admitted {
                    outcome: failed_outcome(&label, "holdings", &e),
                    items: Vec::new(),
                },
                Vec::new(),
            )
        }
    };

    let returned = items.len();
    let mut rejected = Vec::new();
    let mut out = Vec::new();
    for s in items {
        let source = if s.publisher.trim().is_empty() {
            batch.source.clone()
        } else {
            s.publisher.trim().to_string()
        };
        if s.url.trim().is_empty() {
            reject(&mut rejected, &source, &s.title, RejectReason::MissingUrl);
            continue;
        }
        if let Err(reason) = filter.check_holdings_item(&s.title, &ticker) {
            reject(&mut rejected, &source, &normalize_url(&s.url), reason);
            continue;
        }

        let mut candidates = vec![ticker.clone()];
        for t in &s.related_tickers {
            let t = t.trim().to_ascii_uppercase();
            if !t.is_empty() && !candidates.contains(&t) {
                candidates.push(t);
            }
        }

        out.push(RawArticle {
            id: short_hash(&normalize_url(&s.url)),
            source,
            layer: SourceLayer::Wire,
            title: s.title,
            description: s.summary,
            body_html: None,
            published_at: s.published_at,
            url: s.url.trim().to_string(),
            ticker_candidates: candidates,
            is_holdings_news: true,
        });
    }

    (
        Admitted {
            outcome: SourceOutcome {
                source: label,
                kind: "holdings".to_string(),
                returned,
                admitted: out.len(),
                error: None,
            },
            items: out,
        },
        rejected,
    )
}

fn admit_feed_batch(batch: SourceBatch<FeedItem>, filter: &HardFilter<'_>) -> (Admitted, Vec<Rejection>) {
    let layer = batch.layer.unwrap_or(SourceLayer::Fallback);
    let kind = layer_kind(layer);
    let items = match batch.result {
        Ok(items) => items,
        Err(e) => {
            return (
                Admitted {
                    outcome: failed_outcome(&batch.source, kind, &e),
                    items: Vec::new(),
                },
                Vec::new(),
            )
        }
    };

    let returned = items.len();
    let mut rejected = Vec::new();
    let mut out = Vec::new();
    for it in items {
        let Some(url) = it.link.as_deref().map(str::trim).filter(|u| !u.is_empty()) else {
            reject(&mut rejected, &batch.source, &it.title, RejectReason::MissingUrl);
            continue;
        };
        let description = it.description.clone().unwrap_or_default();
        let tickers = match filter.check_feed_item(&it.title, &description, it.pub_date.as_deref()) {
            Ok(t) => t,
            Err(reason) => {
                reject(&mut rejected, &batch.source, &normalize_url(url), reason);
                continue;
            }
        };
        out.push(RawArticle {
            id: short_hash(&normalize_url(url)),
            source: batch.source.clone(),
            layer,
            title: it.title,
            description: it.description,
            body_html: it.content_html,
            published_at: it.pub_date.unwrap_or_default(),
            url: url.to_string(),
            ticker_candidates: tickers,
            is_holdings_news: false,
        });
    }

    (
        Admitted {
            outcome: SourceOutcome {
                source: batch.source,
                kind: kind.to_string(),
                returned,
                admitted: out.len(),
                error: None,
            },
            items: out,
        },
        rejected,
    )
}

/// Single-writer merge: the only place the seen-URL set is touched.
fn merge_into(
    merged: &mut Vec<RawArticle>,
    seen: &mut HashSet<String>,
    report: &mut FetchReport,
    batches: Vec<(Admitted, Vec<Rejection>)>,
) {
    for (mut admitted, rejected) in batches {
        report.rejected.extend(rejected);
        let mut kept = 0usize;
        for a in admitted.items {
            if seen.insert(normalize_url(&a.url)) {
                merged.push(a);
                kept += 1;
            } else {
                report.rejected.push(Rejection {
                    source: a.source,
                    id: a.id,
                    reason: RejectReason::DuplicateUrl.code(),
                });
            }
        }
        admitted.outcome.admitted = kept;
        report.sources.push(admitted.outcome);
    }
}

fn layer_kind(layer: SourceLayer) -> &'static str {
    match layer {
        SourceLayer::Wire => "wire",
        SourceLayer::Aggregator => "aggregator",
        SourceLayer::Fallback => "fallback",
    }
}

/// Collapse `deny:<id>` into one label value to keep series cardinality bounded.
fn reason_label(code: &str) -> String {
    if code.starts_with("deny:") {
        "deny".to_string()
    } else {
        code.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_normalization_and_ids() {
        assert_eq!(normalize_url("  HTTPS://X.test/A  "), "https://x.test/a");
        let id = short_hash(&normalize_url("https://x.test/a"));
        assert_eq!(id.len(), 12);
        assert_eq!(id, short_hash("https://x.test/a"));
    }

    #[test]
    fn merge_drops_cross_batch_duplicates() {
        let mk = |url: &str, src: &str| RawArticle {
            id: short_hash(&normalize_url(url)),
            source: src.into(),
            layer: SourceLayer::Wire,
            title: "t".into(),
            description: None,
            body_html: None,
            published_at: String::new(),
            url: url.into(),
            ticker_candidates: vec![],
            is_holdings_news: false,
        };
        let outcome = |s: &str| SourceOutcome {
            source: s.into(),
            kind: "wire".into(),
            returned: 2,
            admitted: 2,
            error: None,
        };
        let mut merged = Vec::new();
        let mut seen = HashSet::new();
        let mut report = FetchReport::default();
        merge_into(
            &mut merged,
            &mut seen,
            &mut report,
            vec![
                (
                    Admitted {
                        outcome: outcome("a"),
                        items: vec![mk("https://x.test/1", "a"), mk("https://x.test/2", "a")],
                    },
                    vec![],
                ),
                (
                    Admitted {
                        outcome: outcome("b"),
                        items: vec![mk("HTTPS://X.TEST/1 ", "b"), mk("https://x.test/3", "b")],
                    },
                    vec![],
                ),
            ],
        );
        assert_eq!(merged.len(), 3);
        assert_eq!(report.rejected_with("duplicate_url"), 1);
        assert_eq!(report.sources[1].admitted, 1);
    }

    #[test]
    fn deny_reasons_share_a_label() {
        assert_eq!(reason_label("deny:top_picks"), "deny");
        assert_eq!(reason_label("stale"), "stale");
    }
}
