//! EventDetector: classifies a cleaned article into one event type with confidence,
//! impact labels, an importance score and a dominant ticker.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::lexicon;
use crate::model::{CleanedArticle, DetectedEvent, EventType, ImpactLabel};
use crate::tickers::Gazetteer;

/// Per-type keyword tables. Title hits count double.
const TYPE_KEYWORDS: &[(EventType, &[&str])] = &[
    (
        EventType::Earnings,
        &[
            "earnings", "quarterly results", "quarterly profit", "quarterly revenue", "eps",
            "beats estimates", "misses estimates", "beat estimates", "missed estimates",
            "revenue", "profit", "net income", "q1", "q2", "q3", "q4", "fiscal quarter",
        ],
    ),
    (
        EventType::Guidance,
        &[
            "guidance", "outlook", "forecast", "raises forecast", "cuts forecast",
            "full-year", "full year", "reaffirms", "expects", "sees revenue", "projection",
        ],
    ),
    (
        EventType::Regulation,
        &[
            "sec", "ftc", "doj", "antitrust", "regulator", "regulators", "lawsuit", "sued",
            "sues", "probe", "investigation", "fine", "fined", "settlement", "subpoena",
            "fda", "ruling", "court", "ban", "sanctions", "european commission",
        ],
    ),
    (
        EventType::MergerAcquisition,
        &[
            "acquire", "acquires", "acquired", "acquisition", "merger", "merge", "merges",
            "buyout", "takeover", "deal to buy", "to buy", "stake", "spin off", "spinoff",
        ],
    ),
    (
        EventType::ProductLaunch,
        &[
            "launch", "launches", "launched", "unveils", "unveiled", "introduces", "debuts",
            "rolls out", "new model", "release", "releases", "announces new",
        ],
    ),
];

/// Impact label patterns.
const IMPACT_KEYWORDS: &[(ImpactLabel, &[&str])] = &[
    (
        ImpactLabel::EarningsSurprise,
        &["beats", "beat", "misses", "missed", "tops estimates", "surprise", "record revenue", "record profit"],
    ),
    (
        ImpactLabel::GuidanceChange,
        &["raises forecast", "cuts forecast", "lowers guidance", "raises guidance", "cuts guidance", "withdraws guidance", "outlook"],
    ),
    (
        ImpactLabel::LegalRisk,
        &["lawsuit", "sued", "probe", "investigation", "antitrust", "fine", "fined", "subpoena", "settlement"],
    ),
    (
        ImpactLabel::Deal,
        &["acquire", "acquires", "acquisition", "merger", "buyout", "takeover", "stake", "deal"],
    ),
    (
        ImpactLabel::RateSensitive,
        &["interest rate", "interest rates", "rate cut", "rate hike", "yields", "fed", "federal reserve", "inflation"],
    ),
    (
        ImpactLabel::SupplyChain,
        &["supply chain", "shortage", "tariff", "tariffs", "export controls", "supplier"],
    ),
    (
        ImpactLabel::LeadershipChange,
        &["ceo", "cfo", "resigns", "steps down", "appoints", "names new", "successor"],
    ),
    (
        ImpactLabel::Workforce,
        &["layoffs", "lays off", "job cuts", "strike", "hiring freeze", "union"],
    ),
    (
        ImpactLabel::CapitalReturn,
        &["dividend", "buyback", "share repurchase", "stock split"],
    ),
    (
        ImpactLabel::ProductCycle,
        &["launch", "launches", "unveils", "new model", "recall", "recalls", "delays"],
    ),
    (
        ImpactLabel::Volatility,
        &["plunges", "plunge", "soars", "surges", "tumbles", "jumps", "slumps", "sell-off", "selloff", "rally"],
    ),
];

fn alternation(words: &[&str]) -> Regex {
    let alts = words
        .iter()
        .map(|w| regex::escape(w))
        .collect::<Vec<_>>()
        .join("|");
    Regex::new(&format!(r"(?i)\b(?:{alts})\b")).expect("detector regex")
}

static TYPE_RES: Lazy<Vec<(EventType, Regex)>> = Lazy::new(|| {
    TYPE_KEYWORDS
        .iter()
        .map(|(t, words)| (*t, alternation(words)))
        .collect()
});

static IMPACT_RES: Lazy<Vec<(ImpactLabel, Regex)>> = Lazy::new(|| {
    IMPACT_KEYWORDS
        .iter()
        .map(|(l, words)| (*l, alternation(words)))
        .collect()
});

/// Fixed event-type weight; also feeds the scorer.
pub fn type_weight(t: EventType) -> f32 {
    match t {
        EventType::Earnings | EventType::Regulation | EventType::MergerAcquisition => 1.0,
        EventType::Guidance => 0.8,
        EventType::Macro => 0.7,
        EventType::ProductLaunch => 0.6,
        EventType::Other => 0.3,
    }
}

fn distinct_hits(re: &Regex, text: &str) -> usize {
    let mut seen: Vec<String> = re
        .find_iter(text)
        .map(|m| m.as_str().to_lowercase())
        .collect();
    seen.sort();
    seen.dedup();
    seen.len()
}

pub struct EventDetector<'a> {
    gazetteer: &'a Gazetteer,
}

impl<'a> EventDetector<'a> {
    pub fn new(gazetteer: &'a Gazetteer) -> Self {
        Self { gazetteer }
    }

    pub fn detect(&self, article: &CleanedArticle) -> DetectedEvent {
        let title = article.title.as_str();
        let text = article.headline_text();

        let dominant_ticker = self.dominant_ticker(article);
        let (event_type, confidence) = classify(title, &text, dominant_ticker.is_some());
        let impact_labels = impact_labels(&text);

        let max_severity = impact_labels
            .iter()
            .map(|l| l.severity())
            .fold(0.0_f32, f32::max);
        let mut importance = 0.6 * type_weight(event_type) + 0.4 * max_severity;
        if article.is_low_information {
            importance *= 0.5;
        }

        tracing::trace!(
            target: "detect",
            id = %article.raw_id,
            event_type = event_type.as_str(),
            confidence,
            "classified"
        );

        DetectedEvent {
            article: article.clone(),
            event_type,
            impact_labels,
            importance: importance.clamp(0.0, 1.0),
            dominant_ticker,
            confidence,
        }
    }

    pub fn detect_all(&self, articles: &[CleanedArticle]) -> Vec<DetectedEvent> {
        articles.iter().map(|a| self.detect(a)).collect()
    }

    /// Frequency with a title bonus; ties go to the earlier-mentioned ticker.
    fn dominant_ticker(&self, article: &CleanedArticle) -> Option<String> {
        if article.tickers.is_empty() {
            return None;
        }
        let title_mentions = self.gazetteer.mentions(&article.title);
        let body_text = format!("{} {}", article.description, article.body);
        let body_mentions = self.gazetteer.mentions(&body_text);

        let mut best: Option<(&String, usize)> = None;
        for t in &article.tickers {
            let in_title = title_mentions
                .iter()
                .find(|m| &m.symbol == t)
                .map(|m| m.count)
                .unwrap_or(0);
            let in_body = body_mentions
                .iter()
                .find(|m| &m.symbol == t)
                .map(|m| m.count)
                .unwrap_or(0);
            let mut weight = in_title + in_body;
            if in_title > 0 {
                weight += 2;
            }
            // `tickers` is ordered by first mention, so strict `>` keeps the earliest on ties.
            if best.map_or(true, |(_, w)| weight > w) {
                best = Some((t, weight));
            }
        }
        best.map(|(t, _)| t.clone())
    }
}

/// Highest-scoring event type and its confidence.
fn classify(title: &str, text: &str, has_ticker: bool) -> (EventType, f32) {
    let mut best: Option<(EventType, usize, bool)> = None;
    for (t, re) in TYPE_RES.iter() {
        let title_hits = distinct_hits(re, title);
        let all_hits = distinct_hits(re, text);
        if all_hits == 0 {
            continue;
        }
        let score = all_hits + title_hits;
        let better = match best {
            None => true,
            Some((_, s, _)) => score > s,
        };
        if better {
            best = Some((*t, score, title_hits > 0));
        }
    }

    if !has_ticker && lexicon::has_macro_keyword(text) {
        let hits = lexicon::macro_hits(text);
        let conf = 0.35 + 0.15 * hits as f32 + if lexicon::has_macro_keyword(title) { 0.10 } else { 0.0 };
        // A regulation story without a company stays regulation.
        if let Some((EventType::Regulation, score, title_hit)) = best {
            return (EventType::Regulation, confidence(score, title_hit));
        }
        return (EventType::Macro, conf.min(0.95));
    }

    match best {
        Some((t, score, title_hit)) => (t, confidence(score, title_hit)),
        None => (EventType::Other, 0.30),
    }
}

fn confidence(hits: usize, title_hit: bool) -> f32 {
    let c = 0.35 + 0.15 * hits as f32 + if title_hit { 0.10 } else { 0.0 };
    c.min(0.95)
}

fn impact_labels(text: &str) -> Vec<ImpactLabel> {
    IMPACT_RES
        .iter()
        .filter(|(_, re)| re.is_match(text))
        .map(|(l, _)| *l)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{SourceCategory, SourceLayer};
    use chrono::{TimeZone, Utc};

    fn article(title: &str, desc: &str, tickers: &[&str]) -> CleanedArticle {
        CleanedArticle {
            raw_id: "r1".into(),
            source: "Reuters".into(),
            layer: SourceLayer::Wire,
            url: "https://x.test/1".into(),
            title: title.into(),
            description: desc.into(),
            body: String::new(),
            published_at: Utc.with_ymd_and_hms(2025, 3, 10, 8, 0, 0).unwrap(),
            published_at_estimated: false,
            tickers: tickers.iter().map(|s| s.to_string()).collect(),
            quality: 0.9,
            is_low_information: false,
            is_holdings_news: false,
            category: SourceCategory::Wire,
        }
    }

    #[test]
    fn earnings_with_title_hit() {
        let g = Gazetteer::default_seed();
        let d = EventDetector::new(&g);
        let ev = d.detect(&article(
            "Apple beats estimates as quarterly revenue climbs",
            "Earnings per share rose",
            &["AAPL"],
        ));
        assert_eq!(ev.event_type, EventType::Earnings);
        assert!(ev.confidence > 0.8 && ev.confidence <= 0.95);
        assert!(ev.impact_labels.contains(&ImpactLabel::EarningsSurprise));
        assert_eq!(ev.dominant_ticker.as_deref(), Some("AAPL"));
    }

    #[test]
    fn macro_without_ticker() {
        let g = Gazetteer::default_seed();
        let d = EventDetector::new(&g);
        let ev = d.detect(&article("Fed signals rate cut as inflation cools", "", &[]));
        assert_eq!(ev.event_type, EventType::Macro);
        assert_eq!(ev.dominant_ticker, None);
        assert!(ev.impact_labels.contains(&ImpactLabel::RateSensitive));
    }

    #[test]
    fn other_when_nothing_matches() {
        let g = Gazetteer::default_seed();
        let d = EventDetector::new(&g);
        let ev = d.detect(&article("Tesla shares in focus", "", &["TSLA"]));
        assert_eq!(ev.event_type, EventType::Other);
        assert!((ev.confidence - 0.30).abs() < 1e-6);
    }

    #[test]
    fn title_mention_wins_dominant_ticker() {
        let g = Gazetteer::default_seed();
        let d = EventDetector::new(&g);
        let ev = d.detect(&article(
            "Nvidia unveils new chip",
            "Microsoft and Microsoft Azure customers get early access",
            &["MSFT", "NVDA"],
        ));
        // MSFT: 2 body mentions; NVDA: 1 title mention + 2 bonus.
        assert_eq!(ev.dominant_ticker.as_deref(), Some("NVDA"));
    }

    #[test]
    fn low_information_halves_importance() {
        let g = Gazetteer::default_seed();
        let d = EventDetector::new(&g);
        let a = article("Microsoft acquires studio", "", &["MSFT"]);
        let mut b = a.clone();
        b.is_low_information = true;
        let full = d.detect(&a).importance;
        let half = d.detect(&b).importance;
        assert!((half - full * 0.5).abs() < 1e-6);
    }
}
