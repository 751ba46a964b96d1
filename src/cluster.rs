//! Clusterer: groups near-duplicate events into clusters. Never discards an event.
//!
//! Pair similarity = `w·jaccard(content tokens) + (1-w)·normalized_levenshtein(titles)`.
//! Only pairs with the same dominant ticker (or both market-wide), compatible event
//! types and publish times inside the window are compared. Grouping is transitive.

use chrono::Duration;
use std::collections::{HashMap, HashSet};
use strsim::normalized_levenshtein;

use crate::config::ClusterConfig;
use crate::model::{DetectedEvent, EventCluster, EventType, PairSimilarity};

const STOPWORDS: &[&str] = &[
    "a", "an", "the", "and", "or", "but", "of", "to", "in", "on", "at", "for", "with", "by",
    "from", "as", "is", "are", "was", "were", "be", "been", "its", "it", "this", "that",
    "after", "before", "over", "into", "about", "amid", "says", "said", "new", "will", "has",
    "have", "had", "up", "down", "than", "more", "inc", "corp", "co", "ltd", "stock", "stocks",
    "shares",
];

/// Lower-cased, stop-word-free, lightly stemmed token set.
pub fn content_tokens(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(|w| w.to_lowercase())
        .filter(|w| !STOPWORDS.contains(&w.as_str()))
        .map(|w| stem(&w))
        .collect()
}

fn stem(w: &str) -> String {
    for suffix in ["ing", "ed", "es", "s"] {
        if w.len() > suffix.len() + 3 && w.ends_with(suffix) {
            return w[..w.len() - suffix.len()].to_string();
        }
    }
    w.to_string()
}

pub fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f32 {
    if a.is_empty() && b.is_empty() {
        return 0.0;
    }
    let inter = a.intersection(b).count();
    let union = a.union(b).count();
    inter as f32 / union as f32
}

/// Equal, earnings↔guidance, or either side unclassified.
pub fn types_compatible(a: EventType, b: EventType) -> bool {
    a == b
        || a == EventType::Other
        || b == EventType::Other
        || matches!(
            (a, b),
            (EventType::Earnings, EventType::Guidance) | (EventType::Guidance, EventType::Earnings)
        )
}

struct UnionFind {
    parent: Vec<usize>,
}

impl UnionFind {
    fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
        }
    }

    fn find(&mut self, x: usize) -> usize {
        let mut root = x;
        while self.parent[root] != root {
            root = self.parent[root];
        }
        let mut cur = x;
        while self.parent[cur] != root {
            let next = self.parent[cur];
            self.parent[cur] = root;
            cur = next;
        }
        root
    }

    /// Lower index becomes the root so grouping is input-order stable.
    fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra != rb {
            let (lo, hi) = if ra < rb { (ra, rb) } else { (rb, ra) };
            self.parent[hi] = lo;
        }
    }
}

pub struct Clusterer {
    cfg: ClusterConfig,
}

impl Clusterer {
    pub fn new(cfg: ClusterConfig) -> Self {
        Self { cfg }
    }

    /// Similarity of two events, or `None` when the pair is not eligible.
    pub fn similarity(&self, a: &DetectedEvent, b: &DetectedEvent) -> Option<f32> {
        if a.dominant_ticker != b.dominant_ticker || !types_compatible(a.event_type, b.event_type)
        {
            return None;
        }
        let gap = (a.article.published_at - b.article.published_at).abs();
        if gap > Duration::hours(self.cfg.window_hours) {
            return None;
        }
        let ta = content_tokens(&a.article.headline_text());
        let tb = content_tokens(&b.article.headline_text());
        Some(self.score(&ta, &tb, &a.article.title, &b.article.title))
    }

    fn score(&self, ta: &HashSet<String>, tb: &HashSet<String>, title_a: &str, title_b: &str) -> f32 {
        let w = self.cfg.jaccard_weight.clamp(0.0, 1.0);
        let lev = normalized_levenshtein(&title_a.to_lowercase(), &title_b.to_lowercase()) as f32;
        w * jaccard(ta, tb) + (1.0 - w) * lev
    }

    pub fn cluster(&self, events: Vec<DetectedEvent>) -> Vec<EventCluster> {
        let n = events.len();
        let tokens: Vec<HashSet<String>> = events
            .iter()
            .map(|e| content_tokens(&e.article.headline_text()))
            .collect();

        let mut uf = UnionFind::new(n);
        let mut edges: Vec<(usize, usize, f32)> = Vec::new();
        let window = Duration::hours(self.cfg.window_hours);

        for i in 0..n {
            for j in (i + 1)..n {
                let (a, b) = (&events[i], &events[j]);
                if a.dominant_ticker != b.dominant_ticker
                    || !types_compatible(a.event_type, b.event_type)
                    || (a.article.published_at - b.article.published_at).abs() > window
                {
                    continue;
                }
                let s = self.score(&tokens[i], &tokens[j], &a.article.title, &b.article.title);
                if s >= self.cfg.threshold {
                    uf.union(i, j);
                    edges.push((i, j, s));
                }
            }
        }

        // Group members by root, in order of first appearance.
        let mut order: Vec<usize> = Vec::new();
        let mut groups: HashMap<usize, Vec<usize>> = HashMap::new();
        for i in 0..n {
            let r = uf.find(i);
            groups
                .entry(r)
                .or_insert_with(|| {
                    order.push(r);
                    Vec::new()
                })
                .push(i);
        }

        let root_of: Vec<usize> = (0..n).map(|i| uf.find(i)).collect();

        let mut slots: Vec<Option<DetectedEvent>> = events.into_iter().map(Some).collect();
        let mut out = Vec::with_capacity(order.len());
        for root in order {
            let idxs = groups.remove(&root).unwrap_or_default();
            let members: Vec<DetectedEvent> =
                idxs.iter().filter_map(|&i| slots[i].take()).collect();
            if members.is_empty() {
                continue;
            }

            // Highest quality; earliest in input order on ties.
            let mut canonical = 0usize;
            for (k, m) in members.iter().enumerate() {
                if m.article.quality > members[canonical].article.quality {
                    canonical = k;
                }
            }

            let similarities = edges
                .iter()
                .filter(|(i, _, _)| root_of[*i] == root)
                .map(|&(i, j, s)| PairSimilarity {
                    a: members_id(&idxs, &members, i),
                    b: members_id(&idxs, &members, j),
                    score: s,
                })
                .collect();

            let event_type = cluster_type(&members, canonical);
            let cluster = EventCluster {
                id: format!("cl-{}", members[canonical].article.raw_id),
                dominant_ticker: members[canonical].dominant_ticker.clone(),
                event_type,
                canonical,
                members,
                similarities,
            };
            out.push(cluster);
        }

        tracing::debug!(
            target: "cluster",
            events = n,
            clusters = out.len(),
            merged_pairs = edges.len(),
            "clustering complete"
        );
        out
    }
}

fn members_id(idxs: &[usize], members: &[DetectedEvent], original: usize) -> String {
    idxs.iter()
        .position(|&i| i == original)
        .and_then(|k| members.get(k))
        .map(|m| m.article.raw_id.clone())
        .unwrap_or_default()
}

/// Canonical's type, unless it is unclassified and a member is not.
fn cluster_type(members: &[DetectedEvent], canonical: usize) -> EventType {
    let t = members[canonical].event_type;
    if t != EventType::Other {
        return t;
    }
    members
        .iter()
        .map(|m| m.event_type)
        .find(|t| *t != EventType::Other)
        .unwrap_or(EventType::Other)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CleanedArticle, SourceCategory, SourceLayer};
    use chrono::{TimeZone, Utc};

    fn ev(id: &str, title: &str, ticker: Option<&str>, t: EventType, quality: f32, hour: u32) -> DetectedEvent {
        DetectedEvent {
            article: CleanedArticle {
                raw_id: id.into(),
                source: "S".into(),
                layer: SourceLayer::Aggregator,
                url: format!("https://x.test/{id}"),
                title: title.into(),
                description: String::new(),
                body: String::new(),
                published_at: Utc.with_ymd_and_hms(2025, 3, 10, hour, 0, 0).unwrap(),
                published_at_estimated: false,
                tickers: ticker.map(|t| vec![t.to_string()]).unwrap_or_default(),
                quality,
                is_low_information: false,
                is_holdings_news: false,
                category: SourceCategory::Aggregator,
            },
            event_type: t,
            impact_labels: vec![],
            importance: 0.5,
            dominant_ticker: ticker.map(str::to_string),
            confidence: 0.5,
        }
    }

    fn clusterer() -> Clusterer {
        Clusterer::new(ClusterConfig::default())
    }

    #[test]
    fn near_duplicates_merge_and_canonical_is_highest_quality() {
        let events = vec![
            ev("a", "Apple beats quarterly earnings estimates", Some("AAPL"), EventType::Earnings, 0.6, 8),
            ev("b", "Apple beats earnings estimates for the quarter", Some("AAPL"), EventType::Earnings, 0.9, 9),
            ev("c", "Tesla recalls Cybertruck over pedal issue", Some("TSLA"), EventType::ProductLaunch, 0.7, 9),
        ];
        let out = clusterer().cluster(events);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].members.len(), 2);
        assert_eq!(out[0].id, "cl-b");
        assert_eq!(out[0].canonical_article().raw_id, "b");
        assert_eq!(out[0].similarities.len(), 1);
        assert_eq!(out[1].id, "cl-c");
    }

    #[test]
    fn different_tickers_never_merge() {
        let events = vec![
            ev("a", "Chipmaker beats earnings estimates", Some("NVDA"), EventType::Earnings, 0.6, 8),
            ev("b", "Chipmaker beats earnings estimates", Some("AMD"), EventType::Earnings, 0.6, 8),
        ];
        assert_eq!(clusterer().cluster(events).len(), 2);
    }

    #[test]
    fn window_and_type_gate_pairs() {
        let c = clusterer();
        let a = ev("a", "Fed holds rates steady", None, EventType::Macro, 0.8, 1);
        let mut b = ev("b", "Fed holds rates steady", None, EventType::Macro, 0.8, 2);
        assert!(c.similarity(&a, &b).is_some());
        b.article.published_at = a.article.published_at + Duration::hours(40);
        assert!(c.similarity(&a, &b).is_none());
        let d = ev("d", "Fed holds rates steady", None, EventType::Regulation, 0.8, 2);
        assert!(c.similarity(&a, &d).is_none());
        assert!(types_compatible(EventType::Earnings, EventType::Guidance));
    }

    #[test]
    fn grouping_is_transitive() {
        let events = vec![
            ev("a", "Microsoft to acquire gaming studio Alpha", Some("MSFT"), EventType::MergerAcquisition, 0.5, 8),
            ev("b", "Microsoft to acquire gaming studio Alpha for $2B", Some("MSFT"), EventType::MergerAcquisition, 0.5, 8),
            ev("c", "Microsoft gaming studio Alpha deal for $2B approved", Some("MSFT"), EventType::MergerAcquisition, 0.5, 8),
        ];
        let c = clusterer();
        let ac = c.similarity(&events[0], &events[2]).unwrap();
        assert!(ac < 0.5);
        let out = c.cluster(events);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].canonical, 0);
        // Every input appears exactly once.
        assert_eq!(out[0].members.len(), 3);
    }

    #[test]
    fn stemming_and_stopwords() {
        let t = content_tokens("The shares of Apple rallied, rallies continue");
        // "rallied" and "rallies" collapse to one stem.
        assert_eq!(t.len(), 3);
        assert!(t.contains("ralli"));
        assert!(!t.contains("the"));
        assert!(!t.contains("shares"));
    }
}
