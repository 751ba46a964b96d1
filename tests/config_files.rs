// tests/config_files.rs
//
// Shipped config files parse, and FEED_CONFIG_PATH takes precedence.

use std::io::Write;

use holdings_feed::config::{AiConfig, PipelineConfig, ENV_PIPELINE_CONFIG_PATH};
use holdings_feed::model::{RabbitMode, SourceLayer};
use serial_test::serial;

#[test]
fn shipped_pipeline_toml_loads() {
    let cfg = PipelineConfig::load_from("config/pipeline.toml".as_ref()).unwrap();
    assert_eq!(cfg.feeds.len(), 5);
    assert_eq!(cfg.feeds[0].layer, SourceLayer::Wire);
    assert_eq!(cfg.budget(RabbitMode::Focus).feed_limit, 4);
    assert_eq!(cfg.budget(RabbitMode::Beginner).event_budget, 40);
    assert!(cfg.tickers.iter().any(|t| t.symbol == "PLTR"));
    assert!(!cfg.sources.outlets.is_empty(), "seed outlets filled in");
}

#[test]
fn shipped_ai_json_is_disabled() {
    let cfg = AiConfig::load_from_file("config/ai.json").unwrap();
    assert!(!cfg.enabled);
    assert_eq!(cfg.provider, "openai");
    assert_eq!(cfg.timeout_secs, 20);
}

#[test]
fn invalid_values_are_rejected() {
    let err = PipelineConfig::from_toml_str("[modes.focus]\nevent_budget = 0\nfeed_limit = 4\n")
        .unwrap_err();
    assert!(err.to_string().contains("focus"));

    let err = PipelineConfig::from_toml_str("[cluster]\nthreshold = 1.5\n").unwrap_err();
    assert!(err.to_string().contains("threshold"));
}

#[test]
#[serial]
fn env_path_overrides_default() {
    let mut f = tempfile::NamedTempFile::new().unwrap();
    writeln!(f, "[fetch]\ndefault_limit = 7\n\n[quotes]\nenabled = false").unwrap();

    std::env::set_var(ENV_PIPELINE_CONFIG_PATH, f.path());
    let loaded = PipelineConfig::load_default();
    std::env::remove_var(ENV_PIPELINE_CONFIG_PATH);

    let cfg = loaded.unwrap();
    assert_eq!(cfg.fetch_limit(0), 7);
    assert_eq!(cfg.fetch_limit(3), 3);
    assert!(!cfg.quotes.enabled);
}

#[test]
#[serial]
fn env_path_to_missing_file_is_an_error() {
    std::env::set_var(ENV_PIPELINE_CONFIG_PATH, "/nonexistent/holdings-feed.toml");
    let loaded = PipelineConfig::load_default();
    std::env::remove_var(ENV_PIPELINE_CONFIG_PATH);

    let err = loaded.unwrap_err();
    assert!(err.to_string().contains(ENV_PIPELINE_CONFIG_PATH));
}
