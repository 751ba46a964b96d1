//! Typed errors for the pipeline and its collaborators.
//!
//! Source-level collaborator calls (`NewsSearch`, `FeedClient`) stay on `anyhow` and are
//! downgraded to empty results where they are made; only the conditions below surface.

use thiserror::Error;

/// Run-level failures surfaced to the caller of the pipeline.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Every source call failed (or none was configured and holdings search failed).
    #[error("no data available: every news source failed")]
    NoData,

    /// A newer run for the same user replaced this one.
    #[error("run superseded by a newer request for user {user_id}")]
    Superseded { user_id: String },

    #[error("configuration error: {0}")]
    Config(String),
}

impl PipelineError {
    /// Short machine-readable code used by the HTTP surface.
    pub fn code(&self) -> &'static str {
        match self {
            PipelineError::NoData => "no_data",
            PipelineError::Superseded { .. } => "superseded",
            PipelineError::Config(_) => "config",
        }
    }
}

/// Language-generation failures. Every call site has a deterministic fallback.
#[derive(Error, Debug)]
pub enum LlmError {
    #[error("language model disabled")]
    Disabled,

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("provider returned HTTP {status}")]
    Status { status: u16 },

    #[error("language model timed out after {secs}s")]
    Timeout { secs: u64 },

    #[error("language model returned an empty response")]
    EmptyResponse,

    #[error("daily call limit of {limit} reached")]
    DailyLimit { limit: u32 },

    #[error("{0}")]
    Other(String),
}

/// Price-quote lookup failures; each degrades to an "unavailable" snapshot.
#[derive(Error, Debug)]
pub enum QuoteError {
    #[error("rate limited for {symbol}")]
    RateLimited { symbol: String },

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("quote provider returned HTTP {status} for {symbol}")]
    Status { symbol: String, status: u16 },

    #[error("unparseable quote payload for {symbol}: {reason}")]
    Parse { symbol: String, reason: String },
}

/// Violations of the strict theme-response schema.
#[derive(Error, Debug, PartialEq)]
pub enum ThemeParseError {
    #[error("response is not a bare JSON array of themes: {0}")]
    Malformed(String),

    #[error("theme {theme} has an empty `{field}`")]
    EmptyField { theme: usize, field: &'static str },

    #[error("theme {theme} references cluster index {index} outside 1..={max}")]
    IndexOutOfRange { theme: usize, index: i64, max: usize },

    #[error("theme {theme} lists no clusters")]
    NoClusters { theme: usize },

    #[error("{count} themes exceed the maximum of {max}")]
    TooManyThemes { count: usize, max: usize },

    #[error("response contains no themes")]
    Empty,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        assert_eq!(PipelineError::NoData.code(), "no_data");
        assert_eq!(
            PipelineError::Superseded {
                user_id: "u1".into()
            }
            .code(),
            "superseded"
        );
    }

    #[test]
    fn messages_carry_context() {
        let e = ThemeParseError::IndexOutOfRange {
            theme: 2,
            index: 9,
            max: 4,
        };
        assert_eq!(e.to_string(), "theme 2 references cluster index 9 outside 1..=4");
        let q = QuoteError::RateLimited {
            symbol: "AAPL".into(),
        };
        assert!(q.to_string().contains("AAPL"));
    }
}
