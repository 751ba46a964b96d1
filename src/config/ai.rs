// src/config/ai.rs
use serde::{Deserialize, Serialize};
use std::{env, fs, path::Path};

pub const DEFAULT_AI_CONFIG_PATH: &str = "config/ai.json";

fn default_provider() -> String {
    "openai".to_string()
}
fn default_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_daily_limit() -> u32 {
    50
}
fn default_api_key() -> String {
    "ENV".to_string()
}
fn default_timeout_secs() -> u64 {
    20
}
fn default_cache_dir() -> String {
    "cache/llm".to_string()
}
fn default_cache_ttl_hours() -> u64 {
    24
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiConfig {
    pub enabled: bool,
    /// Only "openai" (any OpenAI-compatible chat-completions endpoint) is supported.
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    /// Real provider calls per day; cache hits do not count.
    #[serde(default = "default_daily_limit")]
    pub daily_limit: u32,
    /// "ENV" means: read from OPENAI_API_KEY.
    #[serde(default = "default_api_key")]
    pub api_key: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_cache_dir")]
    pub cache_dir: String,
    /// Cached replies older than this are refetched; 0 keeps them forever.
    #[serde(default = "default_cache_ttl_hours")]
    pub cache_ttl_hours: u64,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            provider: default_provider(),
            model: default_model(),
            daily_limit: default_daily_limit(),
            api_key: String::new(),
            timeout_secs: default_timeout_secs(),
            base_url: None,
            cache_dir: default_cache_dir(),
            cache_ttl_hours: default_cache_ttl_hours(),
        }
    }
}

impl AiConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let data = fs::read_to_string(path)?;
        Self::from_json_str(&data)
    }

    pub fn from_json_str(data: &str) -> anyhow::Result<Self> {
        let mut cfg: AiConfig = serde_json::from_str(data)?;

        cfg.provider = cfg.provider.trim().to_lowercase();

        // Resolve api key if "ENV"; only required when the model is actually enabled.
        if cfg.api_key.trim().eq_ignore_ascii_case("env") {
            cfg.api_key = match cfg.provider.as_str() {
                "openai" => match env::var("OPENAI_API_KEY") {
                    Ok(k) => k,
                    Err(_) if !cfg.enabled => String::new(),
                    Err(_) => anyhow::bail!("Missing OPENAI_API_KEY env var"),
                },
                other => anyhow::bail!("Unsupported provider in config: {other}"),
            };
        }

        if cfg.timeout_secs == 0 {
            cfg.timeout_secs = default_timeout_secs();
        }

        Ok(cfg)
    }

    /// `config/ai.json` if present, otherwise a disabled config.
    pub fn load_default() -> anyhow::Result<Self> {
        let p = Path::new(DEFAULT_AI_CONFIG_PATH);
        if p.exists() {
            Self::load_from_file(p)
        } else {
            Ok(Self::default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[serial_test::serial]
    #[test]
    fn env_key_is_resolved() {
        env::set_var("OPENAI_API_KEY", "sk-test");
        let cfg = AiConfig::from_json_str(r#"{"enabled": true, "provider": "OpenAI", "api_key": "ENV"}"#)
            .unwrap();
        assert_eq!(cfg.provider, "openai");
        assert_eq!(cfg.api_key, "sk-test");
        assert_eq!(cfg.model, "gpt-4o-mini");
        env::remove_var("OPENAI_API_KEY");
    }

    #[serial_test::serial]
    #[test]
    fn missing_key_only_fails_when_enabled() {
        env::remove_var("OPENAI_API_KEY");
        assert!(AiConfig::from_json_str(r#"{"enabled": true}"#).is_err());
        let off = AiConfig::from_json_str(r#"{"enabled": false}"#).unwrap();
        assert!(off.api_key.is_empty());
    }

    #[test]
    fn unsupported_provider_is_rejected() {
        assert!(AiConfig::from_json_str(r#"{"enabled": true, "provider": "other"}"#).is_err());
    }
}
