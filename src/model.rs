//! # Pipeline data model
//! Values passed between the six stages. Everything here is created by exactly one
//! stage and treated as immutable by every later stage.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A position supplied by the caller. Never mutated by the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Holding {
    pub symbol: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allocation_pct: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl Holding {
    pub fn new(symbol: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into().trim().to_ascii_uppercase(),
            name: name.into(),
            allocation_pct: None,
            note: None,
        }
    }

    pub fn allocation(mut self, pct: f64) -> Self {
        self.allocation_pct = Some(pct);
        self
    }
}

/// True if `symbol` is one of the user's holdings (case-insensitive).
pub fn is_held(holdings: &[Holding], symbol: &str) -> bool {
    holdings
        .iter()
        .any(|h| h.symbol.eq_ignore_ascii_case(symbol))
}

/// Coarseness preference that scales how many items survive each narrowing stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RabbitMode {
    Beginner,
    #[default]
    Smart,
    Focus,
}

impl RabbitMode {
    pub fn as_str(self) -> &'static str {
        match self {
            RabbitMode::Beginner => "beginner",
            RabbitMode::Smart => "smart",
            RabbitMode::Focus => "focus",
        }
    }
}

/// Priority rank of a source: 1 = mandatory wire, 2 = aggregator, 3 = fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceLayer {
    Wire,
    Aggregator,
    Fallback,
}

impl SourceLayer {
    pub fn rank(self) -> u8 {
        match self {
            SourceLayer::Wire => 1,
            SourceLayer::Aggregator => 2,
            SourceLayer::Fallback => 3,
        }
    }

    pub fn from_rank(rank: u8) -> Option<Self> {
        match rank {
            1 => Some(SourceLayer::Wire),
            2 => Some(SourceLayer::Aggregator),
            3 => Some(SourceLayer::Fallback),
            _ => None,
        }
    }
}

/// Coarse outlet classification carried on cleaned articles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceCategory {
    Wire,
    FinancialPress,
    Aggregator,
    Supplemental,
}

/// One ingested item, exactly as the Fetcher produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawArticle {
    /// Short SHA-256 prefix of the normalized URL.
    pub id: String,
    pub source: String,
    pub layer: SourceLayer,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body_html: Option<String>,
    /// Source format, unnormalized.
    pub published_at: String,
    pub url: String,
    #[serde(default)]
    pub ticker_candidates: Vec<String>,
    pub is_holdings_news: bool,
}

/// 1:1 derivative of a [`RawArticle`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CleanedArticle {
    pub raw_id: String,
    pub source: String,
    pub layer: SourceLayer,
    pub url: String,
    pub title: String,
    pub description: String,
    pub body: String,
    pub published_at: DateTime<Utc>,
    /// Set when the source timestamp could not be parsed and "now" was used.
    pub published_at_estimated: bool,
    /// Confirmed symbols, ordered by first mention.
    pub tickers: Vec<String>,
    pub quality: f32,
    pub is_low_information: bool,
    pub is_holdings_news: bool,
    pub category: SourceCategory,
}

impl CleanedArticle {
    /// Title + description, the text every heuristic after cleaning looks at.
    pub fn headline_text(&self) -> String {
        if self.description.is_empty() {
            self.title.clone()
        } else {
            format!("{} {}", self.title, self.description)
        }
    }
}

/// Closed set of event classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Earnings,
    Guidance,
    Regulation,
    MergerAcquisition,
    ProductLaunch,
    Macro,
    Other,
}

impl EventType {
    pub const ALL: [EventType; 7] = [
        EventType::Earnings,
        EventType::Guidance,
        EventType::Regulation,
        EventType::MergerAcquisition,
        EventType::ProductLaunch,
        EventType::Macro,
        EventType::Other,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            EventType::Earnings => "earnings",
            EventType::Guidance => "guidance",
            EventType::Regulation => "regulation",
            EventType::MergerAcquisition => "merger_acquisition",
            EventType::ProductLaunch => "product_launch",
            EventType::Macro => "macro",
            EventType::Other => "other",
        }
    }

    /// Human label for prompts and fallback copy.
    pub fn label(self) -> &'static str {
        match self {
            EventType::Earnings => "Earnings",
            EventType::Guidance => "Guidance",
            EventType::Regulation => "Regulation",
            EventType::MergerAcquisition => "M&A",
            EventType::ProductLaunch => "Product launch",
            EventType::Macro => "Macro",
            EventType::Other => "Company news",
        }
    }
}

/// Qualitative tag describing the nature of an event's impact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImpactLabel {
    EarningsSurprise,
    GuidanceChange,
    LegalRisk,
    Deal,
    RateSensitive,
    SupplyChain,
    LeadershipChange,
    Workforce,
    CapitalReturn,
    ProductCycle,
    Volatility,
}

impl ImpactLabel {
    /// Severity in [0,1]; higher means more likely to move a position.
    pub fn severity(self) -> f32 {
        match self {
            ImpactLabel::EarningsSurprise => 0.9,
            ImpactLabel::GuidanceChange => 0.85,
            ImpactLabel::Deal => 0.8,
            ImpactLabel::LegalRisk => 0.8,
            ImpactLabel::RateSensitive => 0.7,
            ImpactLabel::LeadershipChange => 0.6,
            ImpactLabel::SupplyChain => 0.6,
            ImpactLabel::Workforce => 0.55,
            ImpactLabel::Volatility => 0.5,
            ImpactLabel::CapitalReturn => 0.45,
            ImpactLabel::ProductCycle => 0.4,
        }
    }
}

/// Classification of one cleaned article.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedEvent {
    pub article: CleanedArticle,
    pub event_type: EventType,
    pub impact_labels: Vec<ImpactLabel>,
    pub importance: f32,
    /// `None` for market-wide events.
    pub dominant_ticker: Option<String>,
    pub confidence: f32,
}

impl DetectedEvent {
    pub fn id(&self) -> &str {
        &self.article.raw_id
    }
}

/// Similarity edge that justified putting two members in one cluster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairSimilarity {
    pub a: String,
    pub b: String,
    pub score: f32,
}

/// Near-duplicate events judged to describe the same real-world event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventCluster {
    pub id: String,
    /// Always at least one member.
    pub members: Vec<DetectedEvent>,
    /// Index into `members` of the highest-quality article.
    pub canonical: usize,
    pub dominant_ticker: Option<String>,
    pub event_type: EventType,
    pub similarities: Vec<PairSimilarity>,
}

impl EventCluster {
    pub fn canonical(&self) -> &DetectedEvent {
        &self.members[self.canonical]
    }

    pub fn canonical_article(&self) -> &CleanedArticle {
        &self.canonical().article
    }

    /// Every ticker mentioned by any member, deduplicated, first-seen order.
    pub fn all_tickers(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for m in &self.members {
            for t in &m.article.tickers {
                if !out.contains(t) {
                    out.push(t.clone());
                }
            }
        }
        out
    }

    /// Union of member impact labels, first-seen order.
    pub fn impact_labels(&self) -> Vec<ImpactLabel> {
        let mut out = Vec::new();
        for m in &self.members {
            for l in &m.impact_labels {
                if !out.contains(l) {
                    out.push(*l);
                }
            }
        }
        out
    }

    /// Most recent publish time among members.
    pub fn latest_published(&self) -> DateTime<Utc> {
        self.members
            .iter()
            .map(|m| m.article.published_at)
            .max()
            .unwrap_or_else(|| self.canonical_article().published_at)
    }
}

/// Components kept for diagnostics only; they do not enter `total`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct LegacyComponents {
    pub source_quality: f32,
    pub detector_confidence: f32,
    pub corroboration: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub holdings_relevance: f32,
    pub impact: f32,
    pub event_type: f32,
    pub recency: f32,
    pub total: f32,
    pub legacy: LegacyComponents,
}

/// Per-cluster, per-user score. Recomputed every run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserEventScore {
    pub cluster_id: String,
    pub breakdown: ScoreBreakdown,
}

impl UserEventScore {
    pub fn total(&self) -> f32 {
        self.breakdown.total
    }
}

/// How a theme's copy was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThemeOrigin {
    Generated,
    Fallback,
}

/// Final output unit consumed read-only by the presentation layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedTheme {
    pub name: String,
    pub clusters: Vec<EventCluster>,
    pub hook: String,
    pub explanation: String,
    pub why_it_matters: String,
    pub origin: ThemeOrigin,
}

impl FeedTheme {
    pub fn cluster_ids(&self) -> Vec<&str> {
        self.clusters.iter().map(|c| c.id.as_str()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn holding_symbol_is_normalized() {
        let h = Holding::new(" aapl ", "Apple");
        assert_eq!(h.symbol, "AAPL");
        assert!(is_held(&[h], "aapl"));
    }

    #[test]
    fn layer_rank_roundtrip() {
        for l in [SourceLayer::Wire, SourceLayer::Aggregator, SourceLayer::Fallback] {
            assert_eq!(SourceLayer::from_rank(l.rank()), Some(l));
        }
        assert_eq!(SourceLayer::from_rank(0), None);
    }

    #[test]
    fn rabbit_mode_serializes_lowercase() {
        let v = serde_json::to_value(RabbitMode::Focus).unwrap();
        assert_eq!(v, serde_json::json!("focus"));
        let m: RabbitMode = serde_json::from_str("\"beginner\"").unwrap();
        assert_eq!(m, RabbitMode::Beginner);
    }
}
