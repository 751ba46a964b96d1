//! # Source Quality
//!
//! Maps `(source name, source layer)` to a normalized quality score in `[0.0, 1.0]`
//! and an outlet category.
//!
//! - Base value comes from the source layer (wire > aggregator > fallback).
//! - A short list of named high-trust outlets adds a boost on top.
//! - Case-insensitive lookup with normalization of punctuation, dashes, etc.
//! - Aliases map alternative spellings/domains to canonical outlet names.
//! - Fallback order: aliases → exact match → substring match → no boost.

use serde::Deserialize;
use std::collections::HashMap;

use crate::model::{SourceCategory, SourceLayer};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutletKind {
    Wire,
    FinancialPress,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Outlet {
    pub boost: f32,
    pub kind: OutletKind,
}

/// Quality table, loadable from config or seeded with defaults.
#[derive(Debug, Clone, Deserialize)]
pub struct SourceQualityConfig {
    #[serde(default = "default_wire_base")]
    pub wire_base: f32,
    #[serde(default = "default_aggregator_base")]
    pub aggregator_base: f32,
    #[serde(default = "default_fallback_base")]
    pub fallback_base: f32,
    #[serde(default)]
    pub outlets: HashMap<String, Outlet>,
    #[serde(default)]
    pub aliases: HashMap<String, String>,
}

fn default_wire_base() -> f32 {
    0.75
}
fn default_aggregator_base() -> f32 {
    0.55
}
fn default_fallback_base() -> f32 {
    0.35
}

impl Default for SourceQualityConfig {
    fn default() -> Self {
        Self::default_seed()
    }
}

impl SourceQualityConfig {
    pub fn layer_base(&self, layer: SourceLayer) -> f32 {
        match layer {
            SourceLayer::Wire => self.wire_base,
            SourceLayer::Aggregator => self.aggregator_base,
            SourceLayer::Fallback => self.fallback_base,
        }
    }

    /// Resolve a source name to a known outlet.
    ///
    /// Steps: alias lookup (normalized) → exact match → substring match.
    fn outlet_for(&self, source: &str) -> Option<&Outlet> {
        let s = normalize(source);
        if s.is_empty() {
            return None;
        }

        if let Some(canon) = self.aliases.get(&s) {
            if let Some(o) = self.outlets.get(&normalize(canon)) {
                return Some(o);
            }
        }

        if let Some(o) = self.outlets.get(&s) {
            return Some(o);
        }

        // Longest key first so "associated press" is preferred over "ap".
        let mut keys: Vec<&String> = self.outlets.keys().collect();
        keys.sort_by(|a, b| b.len().cmp(&a.len()).then(a.cmp(b)));
        for k in keys {
            if contains_words(&s, k) {
                return self.outlets.get(k);
            }
        }
        None
    }

    /// Quality score: layer base + outlet boost, clamped to [0,1].
    pub fn quality_for(&self, source: &str, layer: SourceLayer) -> f32 {
        let boost = self.outlet_for(source).map(|o| o.boost).unwrap_or(0.0);
        clamp01(self.layer_base(layer) + boost)
    }

    /// Outlet category: named outlets win, otherwise derived from the layer.
    pub fn category_for(&self, source: &str, layer: SourceLayer) -> SourceCategory {
        match self.outlet_for(source).map(|o| o.kind) {
            Some(OutletKind::Wire) => SourceCategory::Wire,
            Some(OutletKind::FinancialPress) => SourceCategory::FinancialPress,
            None => match layer {
                SourceLayer::Wire => SourceCategory::Wire,
                SourceLayer::Aggregator => SourceCategory::Aggregator,
                SourceLayer::Fallback => SourceCategory::Supplemental,
            },
        }
    }

    /// Built-in seed with common wire services and financial press.
    pub fn default_seed() -> Self {
        let mut outlets = HashMap::new();
        let mut aliases = HashMap::new();

        for (k, boost, kind) in [
            ("reuters", 0.20, OutletKind::Wire),
            ("associated press", 0.15, OutletKind::Wire),
            ("sec", 0.20, OutletKind::Wire),
            ("federal reserve", 0.20, OutletKind::Wire),
            ("business wire", 0.05, OutletKind::Wire),
            ("pr newswire", 0.05, OutletKind::Wire),
            ("globenewswire", 0.05, OutletKind::Wire),
            ("bloomberg", 0.20, OutletKind::FinancialPress),
            ("wall street journal", 0.18, OutletKind::FinancialPress),
            ("financial times", 0.18, OutletKind::FinancialPress),
            ("cnbc", 0.12, OutletKind::FinancialPress),
            ("barrons", 0.12, OutletKind::FinancialPress),
            ("marketwatch", 0.10, OutletKind::FinancialPress),
            ("the economist", 0.12, OutletKind::FinancialPress),
        ] {
            outlets.insert(k.to_string(), Outlet { boost, kind });
        }

        for (a, c) in [
            ("ap", "associated press"),
            ("ap news", "associated press"),
            ("apnews com", "associated press"),
            ("reuters com", "reuters"),
            ("wsj", "wall street journal"),
            ("wsj com", "wall street journal"),
            ("the wall street journal", "wall street journal"),
            ("ft", "financial times"),
            ("ft com", "financial times"),
            ("barron s", "barrons"),
            ("bloomberg com", "bloomberg"),
            ("sec gov", "sec"),
            ("u s securities and exchange commission", "sec"),
            ("securities and exchange commission", "sec"),
            ("federalreserve gov", "federal reserve"),
            ("fed", "federal reserve"),
        ] {
            aliases.insert(a.to_string(), c.to_string());
        }

        Self {
            wire_base: default_wire_base(),
            aggregator_base: default_aggregator_base(),
            fallback_base: default_fallback_base(),
            outlets,
            aliases,
        }
    }
}

/// Normalize input string: lowercase, replace punctuation/dashes with spaces,
/// collapse multiple spaces into one.
fn normalize(s: &str) -> String {
    let mut out = s.trim().to_lowercase();

    for ch in ['—', '–', '-', '_', '/', '\\'] {
        out = out.replace(ch, " ");
    }

    out = out.replace(['\n', '\r', '\t', '.', ',', '‚', '’', '\'', '(', ')', ':'], " ");

    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Whole-word containment on normalized strings.
fn contains_words(hay: &str, needle: &str) -> bool {
    let padded_hay = format!(" {hay} ");
    let padded_needle = format!(" {needle} ");
    padded_hay.contains(&padded_needle)
}

fn clamp01(x: f32) -> f32 {
    x.clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> SourceQualityConfig {
        SourceQualityConfig::default_seed()
    }

    #[test]
    fn layer_base_orders_tiers() {
        let c = cfg();
        let w = c.quality_for("Unknown Blog", SourceLayer::Wire);
        let a = c.quality_for("Unknown Blog", SourceLayer::Aggregator);
        let f = c.quality_for("Unknown Blog", SourceLayer::Fallback);
        assert!(w > a && a > f);
    }

    #[test]
    fn named_outlet_boosts() {
        let c = cfg();
        let base = c.quality_for("Some Aggregator", SourceLayer::Aggregator);
        let reuters = c.quality_for("Reuters", SourceLayer::Aggregator);
        assert!((reuters - (base + 0.20)).abs() < 1e-6);
    }

    #[test]
    fn alias_and_substring() {
        let c = cfg();
        assert_eq!(c.category_for("WSJ", SourceLayer::Fallback), SourceCategory::FinancialPress);
        assert_eq!(
            c.category_for("Reuters Business News", SourceLayer::Aggregator),
            SourceCategory::Wire
        );
        // "ap" must not match inside other words.
        assert_eq!(c.category_for("Yahoo Finance", SourceLayer::Aggregator), SourceCategory::Aggregator);
    }

    #[test]
    fn clamped_to_one() {
        let mut c = cfg();
        c.wire_base = 0.95;
        assert!((c.quality_for("Bloomberg", SourceLayer::Wire) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn dash_and_typography_normalization() {
        let c = cfg();
        let a = c.quality_for("Wall—Street—Journal", SourceLayer::Aggregator);
        let b = c.quality_for("The Wall Street Journal", SourceLayer::Aggregator);
        assert!((a - b).abs() < 1e-6);
    }
}
