//! Orchestrator: fetch → clean → detect → budget → cluster → score → feed, then the
//! display model. Each run is an independent function of its request plus whatever the
//! sources return.

use chrono::{DateTime, Utc};
use metrics::{counter, gauge};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use crate::clean::Cleaner;
use crate::cluster::Clusterer;
use crate::config::PipelineConfig;
use crate::detect::EventDetector;
use crate::error::PipelineError;
use crate::feed::{FeedBuilder, SelectionDecision};
use crate::fetch::types::FetchReport;
use crate::fetch::Fetcher;
use crate::llm::DynLanguageModel;
use crate::model::{is_held, DetectedEvent, FeedTheme, Holding, RabbitMode, ThemeOrigin, UserEventScore};
use crate::quotes::{fetch_quotes_sequential, QuoteSnapshot, QuoteSource};
use crate::score::Scorer;
use crate::tickers::{CompanyEntry, Gazetteer};

/// `runPipeline(holdings, interests, mode, limit)`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineRequest {
    #[serde(default)]
    pub holdings: Vec<Holding>,
    #[serde(default)]
    pub interests: Vec<String>,
    #[serde(default)]
    pub mode: RabbitMode,
    /// Fetch limit; 0 means the configured default.
    #[serde(default)]
    pub limit: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceLink {
    pub title: String,
    pub source: String,
    pub url: String,
}

/// What the presentation layer renders for one theme.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThemeCard {
    pub title: String,
    pub hook: String,
    pub body: String,
    pub why_it_matters: String,
    pub tickers: Vec<String>,
    pub sources: Vec<SourceLink>,
    /// Snapshots for held tickers on this card.
    pub quotes: Vec<QuoteSnapshot>,
    pub origin: ThemeOrigin,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StageCounts {
    pub raw: usize,
    pub cleaned: usize,
    pub low_information: usize,
    pub events: usize,
    pub events_after_budget: usize,
    pub clusters: usize,
    pub selected: usize,
    pub themes: usize,
}

/// Read-only snapshots of intermediate state.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PipelineDebug {
    pub counts: StageCounts,
    pub fetch: FetchReport,
    pub scores: Vec<UserEventScore>,
    pub selection: Vec<SelectionDecision>,
    /// Raw ids cut by the mode's event budget.
    pub over_event_budget: Vec<String>,
    pub unassigned: Vec<String>,
    pub fallback_used: bool,
    pub fallback_reason: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PipelineOutput {
    pub themes: Vec<FeedTheme>,
    pub cards: Vec<ThemeCard>,
    pub debug: PipelineDebug,
}

type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

pub struct Pipeline {
    cfg: PipelineConfig,
    fetcher: Fetcher,
    feed: FeedBuilder,
    quotes: Option<Arc<dyn QuoteSource>>,
    gazetteer: Gazetteer,
    clock: Clock,
}

impl Pipeline {
    pub fn new(cfg: PipelineConfig, fetcher: Fetcher, llm: DynLanguageModel) -> Self {
        let mut gazetteer = Gazetteer::default_seed();
        gazetteer.extend(cfg.tickers.iter().cloned());
        let feed = FeedBuilder::new(llm, cfg.feed.clone(), cfg.modes.clone());
        Self {
            cfg,
            fetcher,
            feed,
            quotes: None,
            gazetteer,
            clock: Arc::new(Utc::now),
        }
    }

    pub fn with_quotes(mut self, quotes: Arc<dyn QuoteSource>) -> Self {
        self.quotes = Some(quotes);
        self
    }

    /// Replace the wall clock used by [`Pipeline::run`].
    pub fn with_clock(mut self, clock: impl Fn() -> DateTime<Utc> + Send + Sync + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.cfg
    }

    pub async fn run(&self, req: PipelineRequest) -> Result<PipelineOutput, PipelineError> {
        self.run_at(req, (self.clock)()).await
    }

    /// Same as [`Pipeline::run`] with an explicit clock.
    pub async fn run_at(
        &self,
        req: PipelineRequest,
        now: DateTime<Utc>,
    ) -> Result<PipelineOutput, PipelineError> {
        crate::metrics::ensure_described();
        let result = self.execute(req, now).await;
        let outcome = match &result {
            Ok(_) => "ok",
            Err(e) => e.code(),
        };
        counter!("feed_pipeline_runs_total", "outcome" => outcome).increment(1);
        if result.is_ok() {
            gauge!("feed_pipeline_last_run_ts").set(now.timestamp() as f64);
        }
        result
    }

    async fn execute(
        &self,
        req: PipelineRequest,
        now: DateTime<Utc>,
    ) -> Result<PipelineOutput, PipelineError> {
        let normalized: Vec<Holding> = req
            .holdings
            .iter()
            .map(|h| Holding {
                symbol: h.symbol.trim().to_uppercase(),
                ..h.clone()
            })
            .collect();
        let holdings = &normalized;
        let gazetteer = self.gazetteer_for(holdings);
        let budget = self.cfg.budget(req.mode);
        let mut diag = PipelineDebug::default();

        let fetched = self
            .fetcher
            .fetch_all(holdings, self.cfg.fetch_limit(req.limit), &gazetteer, now)
            .await?;
        diag.counts.raw = fetched.articles.len();
        diag.fetch = fetched.report;

        let cleaned = Cleaner::new(&gazetteer, &self.cfg.sources).clean_all(&fetched.articles, now);
        diag.counts.cleaned = cleaned.len();
        diag.counts.low_information = cleaned.iter().filter(|c| c.is_low_information).count();

        let events = EventDetector::new(&gazetteer).detect_all(&cleaned);
        diag.counts.events = events.len();

        let (events, dropped) = apply_event_budget(events, budget.event_budget, holdings);
        diag.counts.events_after_budget = events.len();
        diag.over_event_budget = dropped;

        let clusters = Clusterer::new(self.cfg.cluster.clone()).cluster(events);
        diag.counts.clusters = clusters.len();

        let scores = Scorer::new(self.cfg.scoring.clone(), &gazetteer)
            .with_interests(&req.interests)
            .score_all(&clusters, holdings, now);

        let built = self.feed.build(&clusters, &scores, holdings, req.mode).await;
        diag.counts.selected = built.selected_ids.len();
        diag.counts.themes = built.themes.len();
        diag.scores = scores;
        diag.selection = built.decisions;
        diag.unassigned = built.unassigned;
        diag.fallback_used = built.fallback_used;
        diag.fallback_reason = built.fallback_reason;

        let quotes = self.quotes_for(&built.themes, holdings).await;
        let cards = built
            .themes
            .iter()
            .map(|t| to_card(t, holdings, &quotes))
            .collect();

        tracing::info!(
            target: "pipeline",
            mode = req.mode.as_str(),
            raw = diag.counts.raw,
            events = diag.counts.events,
            clusters = diag.counts.clusters,
            selected = diag.counts.selected,
            themes = diag.counts.themes,
            fallback = diag.fallback_used,
            "pipeline run complete"
        );

        Ok(PipelineOutput {
            themes: built.themes,
            cards,
            debug: diag,
        })
    }

    /// Configured gazetteer plus any held symbol it doesn't know yet.
    fn gazetteer_for(&self, holdings: &[Holding]) -> Gazetteer {
        let mut g = self.gazetteer.clone();
        let extra: Vec<CompanyEntry> = holdings
            .iter()
            .filter(|h| !h.symbol.is_empty() && !g.contains(&h.symbol))
            .map(|h| CompanyEntry {
                symbol: h.symbol.clone(),
                name: if h.name.trim().is_empty() {
                    h.symbol.clone()
                } else {
                    h.name.trim().to_string()
                },
                aliases: Vec::new(),
                sector: None,
                context: Vec::new(),
            })
            .collect();
        g.extend(extra);
        g
    }

    async fn quotes_for(&self, themes: &[FeedTheme], holdings: &[Holding]) -> Vec<QuoteSnapshot> {
        let Some(source) = self.quotes.as_deref() else {
            return Vec::new();
        };
        if !self.cfg.quotes.enabled {
            return Vec::new();
        }
        let mut symbols: Vec<String> = Vec::new();
        for t in themes {
            for c in &t.clusters {
                for sym in c.all_tickers() {
                    if is_held(holdings, &sym) && !symbols.contains(&sym) {
                        symbols.push(sym);
                    }
                }
            }
        }
        if symbols.is_empty() {
            return Vec::new();
        }
        fetch_quotes_sequential(source, &symbols, Duration::from_millis(self.cfg.quotes.delay_ms)).await
    }
}

/// Keep at most `budget` events: holding-tied first, then by importance. Survivors keep
/// their input order. Returns the kept events and the raw ids of the rest.
pub fn apply_event_budget(
    events: Vec<DetectedEvent>,
    budget: usize,
    holdings: &[Holding],
) -> (Vec<DetectedEvent>, Vec<String>) {
    if events.len() <= budget {
        return (events, Vec::new());
    }
    let tied = |e: &DetectedEvent| {
        e.article.is_holdings_news || e.article.tickers.iter().any(|t| is_held(holdings, t))
    };

    let mut order: Vec<usize> = (0..events.len()).collect();
    order.sort_by(|&a, &b| {
        let (ea, eb) = (&events[a], &events[b]);
        tied(eb)
            .cmp(&tied(ea))
            .then_with(|| eb.importance.total_cmp(&ea.importance))
            .then_with(|| a.cmp(&b))
    });
    let keep: HashSet<usize> = order.into_iter().take(budget).collect();

    let mut kept = Vec::with_capacity(budget);
    let mut dropped = Vec::new();
    for (i, e) in events.into_iter().enumerate() {
        if keep.contains(&i) {
            kept.push(e);
        } else {
            dropped.push(e.article.raw_id);
        }
    }
    (kept, dropped)
}

fn to_card(theme: &FeedTheme, holdings: &[Holding], quotes: &[QuoteSnapshot]) -> ThemeCard {
    let mut tickers: Vec<String> = Vec::new();
    let mut sources: Vec<SourceLink> = Vec::new();
    for c in &theme.clusters {
        if let Some(t) = &c.dominant_ticker {
            if !tickers.contains(t) {
                tickers.push(t.clone());
            }
        }
        for t in c.all_tickers() {
            if !tickers.contains(&t) {
                tickers.push(t);
            }
        }
        let canonical = c.canonical();
        let ordered = std::iter::once(canonical).chain(c.members.iter().filter(|m| !std::ptr::eq(*m, canonical)));
        for m in ordered {
            if sources.iter().any(|s| s.url == m.article.url) {
                continue;
            }
            sources.push(SourceLink {
                title: m.article.title.clone(),
                source: m.article.source.clone(),
                url: m.article.url.clone(),
            });
        }
    }

    let card_quotes = quotes
        .iter()
        .filter(|q| tickers.contains(&q.symbol) && is_held(holdings, &q.symbol))
        .cloned()
        .collect();

    ThemeCard {
        title: theme.name.clone(),
        hook: theme.hook.clone(),
        body: theme.explanation.clone(),
        why_it_matters: theme.why_it_matters.clone(),
        tickers,
        sources,
        quotes: card_quotes,
        origin: theme.origin,
    }
}
