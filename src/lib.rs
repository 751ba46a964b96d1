// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod api;
pub mod config;
pub mod error;
pub mod metrics;
pub mod model;

// Shared text tables and lookups
pub mod dates;
pub mod lexicon;
pub mod source_quality;
pub mod tickers;

// Pipeline stages, in run order
pub mod fetch;
pub mod clean;
pub mod detect;
pub mod cluster;
pub mod score;
pub mod feed;

// Collaborators and orchestration
pub mod llm;
pub mod quotes;
pub mod pipeline;
pub mod runner;

// ---- Re-exports for stable public API ----
pub use crate::api::{router, AppState};
pub use crate::error::PipelineError;
pub use crate::model::{FeedTheme, Holding, RabbitMode};
pub use crate::pipeline::{Pipeline, PipelineOutput, PipelineRequest};
pub use crate::runner::PipelineRunner;
