//! FeedBuilder: strict top-N selection, then theme grouping through the language model
//! with a deterministic one-theme-per-cluster fallback.

pub mod prompt;

use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::time::Duration;

use crate::config::{FeedConfig, ModesConfig};
use crate::error::LlmError;
use crate::llm::DynLanguageModel;
use crate::model::{is_held, EventCluster, FeedTheme, Holding, RabbitMode, ThemeOrigin, UserEventScore};
use crate::score::compare_scores;

pub use prompt::{build_prompt, parse_themes, reply_fits_prompt, ThemeDraft, SYSTEM_PROMPT};

/// `clamp(selected/2, 3, 4)`, never above the mode's cap or the number of clusters.
pub fn max_themes(selected: usize, mode_max: usize) -> usize {
    (selected / 2).clamp(3, 4).min(mode_max).min(selected)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SelectionDecision {
    pub cluster_id: String,
    pub accepted: bool,
    pub reason: String,
}

/// Stage-1 result: the chosen clusters in score order and why each candidate
/// was or wasn't taken.
#[derive(Debug, Clone, Default)]
pub struct Selection {
    pub selected: Vec<EventCluster>,
    pub decisions: Vec<SelectionDecision>,
}

/// Sort by score, drop non-qualifying clusters, then hard-cap at `limit` with no filler.
pub fn select(
    clusters: &[EventCluster],
    scores: &[UserEventScore],
    limit: usize,
    min_score: f32,
) -> Selection {
    let by_id: HashMap<&str, &EventCluster> = clusters.iter().map(|c| (c.id.as_str(), c)).collect();
    let mut ranked: Vec<&UserEventScore> = scores
        .iter()
        .filter(|s| by_id.contains_key(s.cluster_id.as_str()))
        .collect();
    ranked.sort_by(|a, b| compare_scores(a, b));

    let mut out = Selection::default();
    for s in ranked {
        let Some(&cluster) = by_id.get(s.cluster_id.as_str()) else {
            continue;
        };
        let reason = if s.total() < min_score {
            Some("below_min_score")
        } else if is_low_information(cluster) && s.breakdown.holdings_relevance < 1.0 {
            Some("low_information")
        } else if out.selected.len() >= limit {
            Some("over_limit")
        } else {
            None
        };

        out.decisions.push(SelectionDecision {
            cluster_id: s.cluster_id.clone(),
            accepted: reason.is_none(),
            reason: reason.unwrap_or("selected").to_string(),
        });
        if reason.is_none() {
            out.selected.push(cluster.clone());
        }
    }
    out
}

/// Every member carries the cleaner's low-information flag.
fn is_low_information(cluster: &EventCluster) -> bool {
    cluster.members.iter().all(|m| m.article.is_low_information)
}

/// Themes plus the diagnostics of how they were produced.
#[derive(Debug, Clone, Default)]
pub struct FeedBuild {
    pub themes: Vec<FeedTheme>,
    pub decisions: Vec<SelectionDecision>,
    pub selected_ids: Vec<String>,
    /// Selected clusters the model left out of every theme.
    pub unassigned: Vec<String>,
    pub fallback_used: bool,
    pub fallback_reason: Option<String>,
}

pub struct FeedBuilder {
    llm: DynLanguageModel,
    cfg: FeedConfig,
    modes: ModesConfig,
}

impl FeedBuilder {
    pub fn new(llm: DynLanguageModel, cfg: FeedConfig, modes: ModesConfig) -> Self {
        Self { llm, cfg, modes }
    }

    pub async fn build(
        &self,
        clusters: &[EventCluster],
        scores: &[UserEventScore],
        holdings: &[Holding],
        mode: RabbitMode,
    ) -> FeedBuild {
        let budget = self.modes.budget(mode);
        let selection = select(clusters, scores, budget.feed_limit, self.cfg.min_score);
        let selected_ids = selection.selected.iter().map(|c| c.id.clone()).collect();
        let mut out = FeedBuild {
            decisions: selection.decisions,
            selected_ids,
            ..Default::default()
        };

        let selected = selection.selected;
        if selected.is_empty() {
            tracing::info!(target: "feed", mode = mode.as_str(), "no qualifying clusters");
            return out;
        }

        let cap = max_themes(selected.len(), budget.feed_limit);
        match self.generate(&selected, holdings, cap).await {
            Ok(drafts) => {
                let (themes, unassigned) = assign(drafts, &selected);
                if !unassigned.is_empty() {
                    tracing::debug!(target: "feed", unassigned = unassigned.len(), "clusters left out of every theme");
                }
                out.themes = themes;
                out.unassigned = unassigned;
            }
            Err(reason) => {
                tracing::warn!(target: "feed", error = %reason, "theme generation failed; using fallback");
                metrics::counter!("feed_llm_fallback_total").increment(1);
                out.themes = fallback_themes(&selected, holdings);
                out.fallback_used = true;
                out.fallback_reason = Some(reason);
            }
        }

        tracing::info!(
            target: "feed",
            mode = mode.as_str(),
            selected = selected.len(),
            themes = out.themes.len(),
            fallback = out.fallback_used,
            "feed built"
        );
        out
    }

    /// Call the model under the configured timeout and validate the reply.
    async fn generate(
        &self,
        selected: &[EventCluster],
        holdings: &[Holding],
        cap: usize,
    ) -> Result<Vec<ThemeDraft>, String> {
        let prompt = build_prompt(selected, holdings, cap);
        let secs = self.cfg.llm_timeout_secs;
        let reply = match tokio::time::timeout(
            Duration::from_secs(secs),
            self.llm.complete(&prompt, SYSTEM_PROMPT),
        )
        .await
        {
            Ok(r) => r,
            Err(_) => Err(LlmError::Timeout { secs }),
        }
        .map_err(|e| e.to_string())?;

        parse_themes(&reply, selected.len(), cap).map_err(|e| e.to_string())
    }
}

/// Resolve 1-based indices to clusters. A cluster claimed by an earlier theme is
/// dropped from later ones; a theme left with nothing is dropped.
pub fn assign(drafts: Vec<ThemeDraft>, selected: &[EventCluster]) -> (Vec<FeedTheme>, Vec<String>) {
    let mut claimed: HashSet<usize> = HashSet::new();
    let mut themes = Vec::new();

    for d in drafts {
        let mut members = Vec::new();
        for idx in d.clusters {
            let Some(pos) = usize::try_from(idx).ok().and_then(|i| i.checked_sub(1)) else {
                continue;
            };
            if pos >= selected.len() || !claimed.insert(pos) {
                continue;
            }
            members.push(selected[pos].clone());
        }
        if members.is_empty() {
            continue;
        }
        themes.push(FeedTheme {
            name: d.name.trim().to_string(),
            clusters: members,
            hook: d.hook.trim().to_string(),
            explanation: d.explanation.trim().to_string(),
            why_it_matters: d.why_it_matters.trim().to_string(),
            origin: ThemeOrigin::Generated,
        });
    }

    let unassigned = selected
        .iter()
        .enumerate()
        .filter(|(i, _)| !claimed.contains(i))
        .map(|(_, c)| c.id.clone())
        .collect();
    (themes, unassigned)
}

/// One theme per selected cluster, built from the canonical article. Never fails.
pub fn fallback_themes(selected: &[EventCluster], holdings: &[Holding]) -> Vec<FeedTheme> {
    selected
        .iter()
        .map(|c| {
            let art = c.canonical_article();
            let label = c.event_type.label();
            let name = match &c.dominant_ticker {
                Some(t) => format!("{t} · {label}"),
                None => format!("Market · {label}"),
            };
            let explanation = if art.description.is_empty() {
                art.title.clone()
            } else {
                art.description.clone()
            };
            FeedTheme {
                name,
                clusters: vec![c.clone()],
                hook: art.title.clone(),
                explanation,
                why_it_matters: why_it_matters(c, holdings),
                origin: ThemeOrigin::Fallback,
            }
        })
        .collect()
}

fn why_it_matters(cluster: &EventCluster, holdings: &[Holding]) -> String {
    let kind = cluster.event_type.label().to_lowercase();
    match &cluster.dominant_ticker {
        Some(t) if is_held(holdings, t) => {
            format!("You hold {t}, and {kind} news like this can move the position.")
        }
        Some(t) => match cluster.all_tickers().into_iter().find(|x| is_held(holdings, x)) {
            Some(held) => format!("This {t} story also involves {held}, which you hold."),
            None => format!("{t} is not in your portfolio, but this ranked among today's most relevant stories for you."),
        },
        None => "Market-wide news like this can move every position in your portfolio.".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::StaticModel;
    use crate::model::{
        CleanedArticle, DetectedEvent, EventType, ScoreBreakdown, SourceCategory, SourceLayer,
    };
    use chrono::{TimeZone, Utc};
    use std::sync::Arc;

    fn cluster(id: &str, ticker: Option<&str>, low_info: bool) -> EventCluster {
        EventCluster {
            id: format!("cl-{id}"),
            members: vec![DetectedEvent {
                article: CleanedArticle {
                    raw_id: id.into(),
                    source: "S".into(),
                    layer: SourceLayer::Wire,
                    url: format!("https://x.test/{id}"),
                    title: format!("Title {id}"),
                    description: String::new(),
                    body: String::new(),
                    published_at: Utc.with_ymd_and_hms(2025, 3, 10, 8, 0, 0).unwrap(),
                    published_at_estimated: false,
                    tickers: ticker.map(|t| vec![t.to_string()]).unwrap_or_default(),
                    quality: 0.8,
                    is_low_information: low_info,
                    is_holdings_news: false,
                    category: SourceCategory::Wire,
                },
                event_type: EventType::Earnings,
                impact_labels: vec![],
                importance: 0.5,
                dominant_ticker: ticker.map(str::to_string),
                confidence: 0.5,
            }],
            canonical: 0,
            dominant_ticker: ticker.map(str::to_string),
            event_type: EventType::Earnings,
            similarities: vec![],
        }
    }

    fn score(id: &str, total: f32, holdings: f32) -> UserEventScore {
        UserEventScore {
            cluster_id: format!("cl-{id}"),
            breakdown: ScoreBreakdown {
                holdings_relevance: holdings,
                total,
                ..Default::default()
            },
        }
    }

    #[test]
    fn max_themes_bounds() {
        assert_eq!(max_themes(10, 8), 4);
        assert_eq!(max_themes(4, 4), 3);
        assert_eq!(max_themes(2, 6), 2);
        assert_eq!(max_themes(1, 6), 1);
        assert_eq!(max_themes(0, 6), 0);
        assert_eq!(max_themes(8, 2), 2);
    }

    #[test]
    fn selection_never_pads() {
        let clusters = vec![cluster("a", Some("AAPL"), false), cluster("b", None, false)];
        let scores = vec![score("a", 0.9, 1.0), score("b", 0.1, 0.5)];
        let sel = select(&clusters, &scores, 4, 0.2);
        assert_eq!(sel.selected.len(), 1);
        assert_eq!(sel.decisions[1].reason, "below_min_score");
    }

    #[test]
    fn low_information_needs_a_held_ticker() {
        let clusters = vec![cluster("a", Some("AAPL"), true), cluster("b", Some("MSFT"), true)];
        let scores = vec![score("a", 0.9, 1.0), score("b", 0.8, 0.8)];
        let sel = select(&clusters, &scores, 4, 0.2);
        let ids: Vec<_> = sel.selected.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["cl-a"]);
        assert_eq!(sel.decisions[1].reason, "low_information");
    }

    #[test]
    fn duplicate_index_stays_with_first_theme() {
        let selected = vec![cluster("a", None, false), cluster("b", None, false), cluster("c", None, false)];
        let draft = |name: &str, idx: Vec<i64>| ThemeDraft {
            name: name.into(),
            hook: "h".into(),
            explanation: "e".into(),
            why_it_matters: "w".into(),
            clusters: idx,
        };
        let (themes, unassigned) = assign(
            vec![draft("A", vec![1, 2]), draft("B", vec![2]), draft("C", vec![3])],
            &selected,
        );
        assert_eq!(themes.len(), 2);
        assert_eq!(themes[0].cluster_ids(), vec!["cl-a", "cl-b"]);
        assert_eq!(themes[1].name, "C");
        assert!(unassigned.is_empty());
    }

    #[test]
    fn fallback_copy_comes_from_canonical_article() {
        let holdings = vec![Holding::new("AAPL", "Apple")];
        let t = fallback_themes(&[cluster("a", Some("AAPL"), false), cluster("m", None, false)], &holdings);
        assert_eq!(t.len(), 2);
        assert_eq!(t[0].name, "AAPL · Earnings");
        assert_eq!(t[0].hook, "Title a");
        assert_eq!(t[0].explanation, "Title a");
        assert!(t[0].why_it_matters.contains("You hold AAPL"));
        assert_eq!(t[1].name, "Market · Earnings");
        assert!(t.iter().all(|x| x.origin == ThemeOrigin::Fallback));
    }

    #[tokio::test]
    async fn failing_model_falls_back() {
        let builder = FeedBuilder::new(
            Arc::new(StaticModel::failing("boom")),
            FeedConfig::default(),
            ModesConfig::default(),
        );
        let clusters = vec![cluster("a", Some("AAPL"), false), cluster("b", None, false)];
        let scores = vec![score("a", 0.9, 1.0), score("b", 0.5, 0.5)];
        let out = builder
            .build(&clusters, &scores, &[Holding::new("AAPL", "")], RabbitMode::Smart)
            .await;
        assert!(out.fallback_used);
        assert_eq!(out.themes.len(), 2);
    }

    #[tokio::test]
    async fn slow_model_times_out_into_fallback() {
        let cfg = FeedConfig {
            llm_timeout_secs: 1,
            ..Default::default()
        };
        let model = StaticModel::reply("[]").delayed(Duration::from_secs(5));
        let builder = FeedBuilder::new(Arc::new(model), cfg, ModesConfig::default());
        let clusters = vec![cluster("a", Some("AAPL"), false)];
        let out = builder
            .build(&clusters, &[score("a", 0.9, 1.0)], &[], RabbitMode::Focus)
            .await;
        assert!(out.fallback_used);
        assert!(out.fallback_reason.unwrap_or_default().contains("timed out"));
    }
}
