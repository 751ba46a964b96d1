// src/config/pipeline.rs
//! Pipeline tuning loaded from TOML.
//!
//! Resolution order:
//! 1) `$FEED_CONFIG_PATH` (must exist)
//! 2) `config/pipeline.toml`
//! 3) built-in defaults
//!
//! Every section and field is optional; omitted values keep their defaults.

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::PipelineError;
use crate::fetch::types::FeedSpec;
use crate::model::{RabbitMode, SourceLayer};
use crate::source_quality::SourceQualityConfig;
use crate::tickers::CompanyEntry;

pub const DEFAULT_PIPELINE_CONFIG_PATH: &str = "config/pipeline.toml";
pub const ENV_PIPELINE_CONFIG_PATH: &str = "FEED_CONFIG_PATH";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Used when the caller passes `limit = 0`.
    pub default_limit: usize,
    /// Upper bound on concurrently running source calls per task group.
    pub max_concurrency: usize,
    pub source_timeout_ms: u64,
    /// Items older than this are rejected unless they carry a macro/regulation keyword.
    pub stale_hours: i64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            default_limit: 60,
            max_concurrency: 8,
            source_timeout_ms: 8_000,
            stale_hours: 48,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub enabled: bool,
    pub base_url: String,
    /// Results requested per ticker.
    pub per_ticker_limit: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: "https://query1.finance.yahoo.com/v1/finance/search".to_string(),
            per_ticker_limit: 10,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct ModeBudget {
    /// Max detected events entering clustering.
    pub event_budget: usize,
    /// Stage-1 hard cap; also the max theme count.
    pub feed_limit: usize,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ModesConfig {
    pub beginner: ModeBudget,
    pub smart: ModeBudget,
    pub focus: ModeBudget,
}

impl Default for ModesConfig {
    fn default() -> Self {
        Self {
            beginner: ModeBudget {
                event_budget: 40,
                feed_limit: 8,
            },
            smart: ModeBudget {
                event_budget: 30,
                feed_limit: 6,
            },
            focus: ModeBudget {
                event_budget: 20,
                feed_limit: 4,
            },
        }
    }
}

impl ModesConfig {
    pub fn budget(&self, mode: RabbitMode) -> ModeBudget {
        match mode {
            RabbitMode::Beginner => self.beginner,
            RabbitMode::Smart => self.smart,
            RabbitMode::Focus => self.focus,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub w_holdings: f32,
    pub w_impact: f32,
    pub w_event_type: f32,
    pub w_recency: f32,
    pub half_life_hours: f64,
    /// Recency is zero past this age.
    pub horizon_hours: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            w_holdings: 0.55,
            w_impact: 0.20,
            w_event_type: 0.15,
            w_recency: 0.10,
            half_life_hours: 12.0,
            horizon_hours: 72.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    pub threshold: f32,
    pub window_hours: i64,
    /// Weight of token overlap; the title edit-distance term gets the remainder.
    pub jaccard_weight: f32,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            threshold: 0.5,
            window_hours: 36,
            jaccard_weight: 0.7,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    pub min_score: f32,
    pub llm_timeout_secs: u64,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            min_score: 0.20,
            llm_timeout_secs: 20,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct QuotesConfig {
    pub enabled: bool,
    pub base_url: String,
    pub delay_ms: u64,
}

impl Default for QuotesConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: "https://query1.finance.yahoo.com/v8/finance/chart".to_string(),
            delay_ms: 1_200,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub fetch: FetchConfig,
    pub feeds: Vec<FeedSpec>,
    pub search: SearchConfig,
    pub modes: ModesConfig,
    pub scoring: ScoringConfig,
    pub cluster: ClusterConfig,
    pub feed: FeedConfig,
    pub quotes: QuotesConfig,
    pub sources: SourceQualityConfig,
    /// Extra gazetteer entries merged over the built-in seed.
    pub tickers: Vec<CompanyEntry>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            fetch: FetchConfig::default(),
            feeds: default_feeds(),
            search: SearchConfig::default(),
            modes: ModesConfig::default(),
            scoring: ScoringConfig::default(),
            cluster: ClusterConfig::default(),
            feed: FeedConfig::default(),
            quotes: QuotesConfig::default(),
            sources: SourceQualityConfig::default_seed(),
            tickers: Vec::new(),
        }
    }
}

fn default_feeds() -> Vec<FeedSpec> {
    vec![
        FeedSpec::new(
            "Federal Reserve",
            "https://www.federalreserve.gov/feeds/press_all.xml",
            SourceLayer::Wire,
        ),
        FeedSpec::new(
            "SEC",
            "https://www.sec.gov/news/pressreleases.rss",
            SourceLayer::Wire,
        ),
        FeedSpec::new(
            "CNBC",
            "https://search.cnbc.com/rs/search/combinedcms/view.xml?partnerId=wrss01&id=10001147",
            SourceLayer::Aggregator,
        ),
        FeedSpec::new(
            "MarketWatch",
            "https://feeds.content.dowjones.io/public/rss/mw_topstories",
            SourceLayer::Aggregator,
        ),
        FeedSpec::new(
            "Yahoo Finance",
            "https://finance.yahoo.com/news/rssindex",
            SourceLayer::Fallback,
        ),
    ]
}

impl PipelineConfig {
    /// Load using env var + fallbacks (see module docs).
    pub fn load_default() -> Result<Self> {
        if let Ok(p) = std::env::var(ENV_PIPELINE_CONFIG_PATH) {
            let pb = PathBuf::from(p);
            if pb.exists() {
                return Self::load_from(&pb);
            }
            return Err(anyhow!(
                "{ENV_PIPELINE_CONFIG_PATH} points to non-existent path {}",
                pb.display()
            ));
        }
        let default_path = PathBuf::from(DEFAULT_PIPELINE_CONFIG_PATH);
        if default_path.exists() {
            return Self::load_from(&default_path);
        }
        Ok(Self::default())
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading pipeline config from {}", path.display()))?;
        Self::from_toml_str(&content)
            .with_context(|| format!("parsing pipeline config at {}", path.display()))
    }

    pub fn from_toml_str(s: &str) -> Result<Self> {
        let mut cfg: PipelineConfig = toml::from_str(s)?;
        // A config that names no sources table still gets the built-in outlets.
        if cfg.sources.outlets.is_empty() {
            let seed = SourceQualityConfig::default_seed();
            cfg.sources.outlets = seed.outlets;
            if cfg.sources.aliases.is_empty() {
                cfg.sources.aliases = seed.aliases;
            }
        }
        cfg.validate()?;
        Ok(cfg)
    }

    /// Reject values that would break the budget or scoring contracts.
    pub fn validate(&self) -> Result<(), PipelineError> {
        for (name, b) in [
            ("beginner", self.modes.beginner),
            ("smart", self.modes.smart),
            ("focus", self.modes.focus),
        ] {
            if b.feed_limit == 0 || b.event_budget == 0 {
                return Err(PipelineError::Config(format!(
                    "mode {name}: event_budget and feed_limit must be > 0"
                )));
            }
        }
        let s = &self.scoring;
        let weights = [s.w_holdings, s.w_impact, s.w_event_type, s.w_recency];
        if weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(PipelineError::Config(
                "scoring weights must be finite and non-negative".into(),
            ));
        }
        if !(s.half_life_hours > 0.0) {
            return Err(PipelineError::Config("half_life_hours must be > 0".into()));
        }
        if !(0.0..=1.0).contains(&self.cluster.threshold) {
            return Err(PipelineError::Config(
                "cluster.threshold must be within 0..=1".into(),
            ));
        }
        if self.fetch.max_concurrency == 0 {
            return Err(PipelineError::Config(
                "fetch.max_concurrency must be > 0".into(),
            ));
        }
        Ok(())
    }

    pub fn budget(&self, mode: RabbitMode) -> ModeBudget {
        self.modes.budget(mode)
    }

    /// Effective fetch limit for a caller-supplied value.
    pub fn fetch_limit(&self, requested: usize) -> usize {
        if requested == 0 {
            self.fetch.default_limit
        } else {
            requested
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{env, fs};

    #[test]
    fn empty_toml_yields_defaults() {
        let cfg = PipelineConfig::from_toml_str("").unwrap();
        assert_eq!(cfg.budget(RabbitMode::Focus).feed_limit, 4);
        assert_eq!(cfg.budget(RabbitMode::Smart).event_budget, 30);
        assert_eq!(cfg.fetch_limit(0), 60);
        assert_eq!(cfg.fetch_limit(15), 15);
        assert!(!cfg.sources.outlets.is_empty());
    }

    #[test]
    fn partial_sections_override() {
        let toml = r#"
            [modes.focus]
            event_budget = 10
            feed_limit = 3

            [[feeds]]
            name = "Wire A"
            url = "https://wire.example/rss"
            layer = "wire"

            [[tickers]]
            symbol = "ACME"
            name = "Acme Corp"
        "#;
        let cfg = PipelineConfig::from_toml_str(toml).unwrap();
        assert_eq!(cfg.budget(RabbitMode::Focus).feed_limit, 3);
        assert_eq!(cfg.budget(RabbitMode::Beginner).feed_limit, 8);
        assert_eq!(cfg.feeds.len(), 1);
        assert_eq!(cfg.feeds[0].layer, SourceLayer::Wire);
        assert_eq!(cfg.tickers[0].symbol, "ACME");
    }

    #[test]
    fn zero_feed_limit_is_rejected() {
        let toml = r#"
            [modes.smart]
            event_budget = 10
            feed_limit = 0
        "#;
        assert!(PipelineConfig::from_toml_str(toml).is_err());
    }

    #[serial_test::serial]
    #[test]
    fn default_uses_env_then_fallbacks() {
        let old = env::current_dir().unwrap();
        let tmp = tempfile::tempdir().unwrap();
        env::set_current_dir(tmp.path()).unwrap();

        env::remove_var(ENV_PIPELINE_CONFIG_PATH);
        let cfg = PipelineConfig::load_default().unwrap();
        assert_eq!(cfg.feed.min_score, 0.20);

        let p = tmp.path().join("custom.toml");
        fs::write(&p, "[feed]\nmin_score = 0.4\n").unwrap();
        env::set_var(ENV_PIPELINE_CONFIG_PATH, p.display().to_string());
        let cfg2 = PipelineConfig::load_default().unwrap();
        assert!((cfg2.feed.min_score - 0.4).abs() < 1e-6);

        env::set_var(ENV_PIPELINE_CONFIG_PATH, tmp.path().join("missing.toml"));
        assert!(PipelineConfig::load_default().is_err());
        env::remove_var(ENV_PIPELINE_CONFIG_PATH);

        env::set_current_dir(&old).unwrap();
    }
}
