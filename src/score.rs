//! Scorer: deterministic per-user score for each cluster.
//!
//! `total = w_h·holdings + w_i·impact + w_t·event_type + w_r·recency`
//! (defaults 0.55 / 0.20 / 0.15 / 0.10). Legacy components are reported but never
//! enter `total`.

use chrono::{DateTime, Utc};
use std::cmp::Ordering;

use crate::config::ScoringConfig;
use crate::dates::age_hours;
use crate::detect::type_weight;
use crate::model::{
    is_held, EventCluster, Holding, LegacyComponents, ScoreBreakdown, UserEventScore,
};
use crate::tickers::Gazetteer;

pub const RELEVANCE_HELD: f32 = 1.0;
pub const RELEVANCE_MEMBER_HELD: f32 = 0.8;
pub const RELEVANCE_MACRO: f32 = 0.5;
pub const RELEVANCE_INTEREST: f32 = 0.4;
pub const RELEVANCE_SECTOR: f32 = 0.35;

pub struct Scorer<'a> {
    cfg: ScoringConfig,
    gazetteer: &'a Gazetteer,
    interests: Vec<String>,
}

impl<'a> Scorer<'a> {
    pub fn new(cfg: ScoringConfig, gazetteer: &'a Gazetteer) -> Self {
        Self {
            cfg,
            gazetteer,
            interests: Vec::new(),
        }
    }

    pub fn with_interests(mut self, interests: &[String]) -> Self {
        self.interests = interests
            .iter()
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty())
            .collect();
        self
    }

    pub fn score(&self, cluster: &EventCluster, holdings: &[Holding], now: DateTime<Utc>) -> UserEventScore {
        let holdings_relevance = self.holdings_relevance(cluster, holdings);
        let impact = impact_score(cluster);
        let event_type = type_weight(cluster.event_type);
        let recency = self.recency(cluster.latest_published(), now);

        let c = &self.cfg;
        let total = c.w_holdings * holdings_relevance
            + c.w_impact * impact
            + c.w_event_type * event_type
            + c.w_recency * recency;

        let canonical = cluster.canonical();
        UserEventScore {
            cluster_id: cluster.id.clone(),
            breakdown: ScoreBreakdown {
                holdings_relevance,
                impact,
                event_type,
                recency,
                total,
                legacy: LegacyComponents {
                    source_quality: canonical.article.quality,
                    detector_confidence: canonical.confidence,
                    corroboration: cluster.members.len() as f32,
                },
            },
        }
    }

    pub fn score_all(
        &self,
        clusters: &[EventCluster],
        holdings: &[Holding],
        now: DateTime<Utc>,
    ) -> Vec<UserEventScore> {
        clusters
            .iter()
            .map(|c| self.score(c, holdings, now))
            .collect()
    }

    /// Highest applicable tier.
    pub fn holdings_relevance(&self, cluster: &EventCluster, holdings: &[Holding]) -> f32 {
        if let Some(t) = &cluster.dominant_ticker {
            if is_held(holdings, t) {
                return RELEVANCE_HELD;
            }
        }

        let tickers = cluster.all_tickers();
        if tickers.iter().any(|t| is_held(holdings, t)) {
            return RELEVANCE_MEMBER_HELD;
        }

        let mut best = 0.0_f32;
        if cluster.dominant_ticker.is_none() {
            best = best.max(RELEVANCE_MACRO);
        }
        if self.matches_interest(cluster) {
            best = best.max(RELEVANCE_INTEREST);
        }
        if self.shares_sector(&tickers, holdings) {
            best = best.max(RELEVANCE_SECTOR);
        }
        best
    }

    fn matches_interest(&self, cluster: &EventCluster) -> bool {
        if self.interests.is_empty() {
            return false;
        }
        let sector = cluster
            .dominant_ticker
            .as_deref()
            .and_then(|t| self.gazetteer.sector(t))
            .map(str::to_lowercase);
        let type_names = [
            cluster.event_type.as_str().to_string(),
            cluster.event_type.label().to_lowercase(),
        ];
        let text = cluster
            .members
            .iter()
            .map(|m| m.article.headline_text())
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase();

        self.interests.iter().any(|i| {
            sector.as_deref() == Some(i.as_str())
                || type_names.iter().any(|n| n == i)
                || contains_word(&text, i)
        })
    }

    fn shares_sector(&self, tickers: &[String], holdings: &[Holding]) -> bool {
        let held_sectors: Vec<&str> = holdings
            .iter()
            .filter_map(|h| self.gazetteer.sector(&h.symbol))
            .collect();
        tickers
            .iter()
            .filter_map(|t| self.gazetteer.sector(t))
            .any(|s| held_sectors.contains(&s))
    }

    /// Exponential decay by half-life, zero past the horizon.
    pub fn recency(&self, published: DateTime<Utc>, now: DateTime<Utc>) -> f32 {
        let age = age_hours(published, now);
        if age > self.cfg.horizon_hours {
            return 0.0;
        }
        (-std::f64::consts::LN_2 * age / self.cfg.half_life_hours).exp() as f32
    }
}

/// `0.7·max_severity + 0.3·min(count,3)/3`.
pub fn impact_score(cluster: &EventCluster) -> f32 {
    let labels = cluster.impact_labels();
    let max_sev = labels.iter().map(|l| l.severity()).fold(0.0_f32, f32::max);
    let count = labels.len().min(3) as f32 / 3.0;
    0.7 * max_sev + 0.3 * count
}

/// Descending by total, then holdings-relevance, then impact; cluster id keeps it total.
pub fn compare_scores(a: &UserEventScore, b: &UserEventScore) -> Ordering {
    let (x, y) = (&a.breakdown, &b.breakdown);
    y.total
        .total_cmp(&x.total)
        .then_with(|| y.holdings_relevance.total_cmp(&x.holdings_relevance))
        .then_with(|| y.impact.total_cmp(&x.impact))
        .then_with(|| a.cluster_id.cmp(&b.cluster_id))
}

fn contains_word(hay: &str, needle: &str) -> bool {
    hay.match_indices(needle).any(|(pos, _)| {
        let before = hay[..pos].chars().next_back();
        let after = hay[pos + needle.len()..].chars().next();
        before.map_or(true, |c| !c.is_alphanumeric()) && after.map_or(true, |c| !c.is_alphanumeric())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{
        CleanedArticle, DetectedEvent, EventType, ImpactLabel, SourceCategory, SourceLayer,
    };
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 10, 12, 0, 0).unwrap()
    }

    fn cluster(id: &str, ticker: Option<&str>, tickers: &[&str], title: &str, age_h: i64) -> EventCluster {
        let ev = DetectedEvent {
            article: CleanedArticle {
                raw_id: id.into(),
                source: "S".into(),
                layer: SourceLayer::Wire,
                url: format!("https://x.test/{id}"),
                title: title.into(),
                description: String::new(),
                body: String::new(),
                published_at: now() - Duration::hours(age_h),
                published_at_estimated: false,
                tickers: tickers.iter().map(|s| s.to_string()).collect(),
                quality: 0.8,
                is_low_information: false,
                is_holdings_news: false,
                category: SourceCategory::Wire,
            },
            event_type: EventType::Earnings,
            impact_labels: vec![ImpactLabel::EarningsSurprise],
            importance: 0.9,
            dominant_ticker: ticker.map(str::to_string),
            confidence: 0.8,
        };
        EventCluster {
            id: format!("cl-{id}"),
            members: vec![ev],
            canonical: 0,
            dominant_ticker: ticker.map(str::to_string),
            event_type: EventType::Earnings,
            similarities: vec![],
        }
    }

    #[test]
    fn relevance_tiers() {
        let g = Gazetteer::default_seed();
        let s = Scorer::new(ScoringConfig::default(), &g).with_interests(&["Semiconductors".into()]);
        let holdings = vec![Holding::new("AAPL", "Apple")];

        assert_eq!(s.holdings_relevance(&cluster("a", Some("AAPL"), &["AAPL"], "x", 1), &holdings), 1.0);
        assert_eq!(
            s.holdings_relevance(&cluster("b", Some("MSFT"), &["MSFT", "AAPL"], "x", 1), &holdings),
            0.8
        );
        assert_eq!(s.holdings_relevance(&cluster("c", None, &[], "Fed", 1), &holdings), 0.5);
        assert_eq!(
            s.holdings_relevance(&cluster("d", Some("WMT"), &["WMT"], "Semiconductors rally", 1), &holdings),
            0.4
        );
        // NVDA shares AAPL's sector.
        assert_eq!(s.holdings_relevance(&cluster("e", Some("NVDA"), &["NVDA"], "x", 1), &holdings), 0.35);
        assert_eq!(s.holdings_relevance(&cluster("f", Some("XOM"), &["XOM"], "x", 1), &holdings), 0.0);
    }

    #[test]
    fn recency_decays_and_clips() {
        let g = Gazetteer::default_seed();
        let s = Scorer::new(ScoringConfig::default(), &g);
        assert!((s.recency(now(), now()) - 1.0).abs() < 1e-6);
        assert!((s.recency(now() - Duration::hours(12), now()) - 0.5).abs() < 1e-4);
        assert_eq!(s.recency(now() - Duration::hours(73), now()), 0.0);
    }

    #[test]
    fn total_is_weighted_sum_and_deterministic() {
        let g = Gazetteer::default_seed();
        let s = Scorer::new(ScoringConfig::default(), &g);
        let holdings = vec![Holding::new("AAPL", "Apple")];
        let c = cluster("a", Some("AAPL"), &["AAPL"], "x", 0);
        let a = s.score(&c, &holdings, now());
        let b = s.score(&c, &holdings, now());
        assert_eq!(a, b);
        let bd = a.breakdown;
        // impact = 0.7·0.9 + 0.3·(1/3)
        assert!((bd.impact - 0.73).abs() < 1e-5);
        let expected = 0.55 * 1.0 + 0.20 * bd.impact + 0.15 * 1.0 + 0.10 * 1.0;
        assert!((bd.total - expected).abs() < 1e-5);
        assert_eq!(bd.legacy.corroboration, 1.0);
    }

    #[test]
    fn ordering_breaks_ties_by_holdings_then_impact() {
        let mk = |id: &str, total: f32, h: f32, i: f32| UserEventScore {
            cluster_id: id.into(),
            breakdown: ScoreBreakdown {
                holdings_relevance: h,
                impact: i,
                total,
                ..Default::default()
            },
        };
        let mut v = vec![
            mk("cl-c", 0.5, 0.5, 0.9),
            mk("cl-b", 0.5, 0.8, 0.1),
            mk("cl-a", 0.7, 0.0, 0.0),
            mk("cl-d", 0.5, 0.5, 0.9),
        ];
        v.sort_by(compare_scores);
        let ids: Vec<_> = v.iter().map(|s| s.cluster_id.as_str()).collect();
        assert_eq!(ids, vec!["cl-a", "cl-b", "cl-c", "cl-d"]);
    }
}
