// src/config/mod.rs
pub mod ai;
pub mod pipeline;

pub use ai::{AiConfig, DEFAULT_AI_CONFIG_PATH};
pub use pipeline::{
    ClusterConfig, FeedConfig, FetchConfig, ModeBudget, ModesConfig, PipelineConfig,
    QuotesConfig, ScoringConfig, SearchConfig, DEFAULT_PIPELINE_CONFIG_PATH,
    ENV_PIPELINE_CONFIG_PATH,
};
