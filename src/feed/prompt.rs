//! Theme prompt construction and strict parsing of the model's reply.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;

use crate::error::ThemeParseError;
use crate::model::{EventCluster, Holding};

pub const SYSTEM_PROMPT: &str = "You group financial news for a retail investor. \
Reply with a bare JSON array and nothing else. Each element must be an object with \
exactly these keys: \"name\", \"hook\", \"explanation\", \"why_it_matters\" (strings) and \
\"clusters\" (array of item numbers). Use every item at most once. Keep hooks to one \
line and tie \"why_it_matters\" to the investor's holdings.";

const SUMMARY_MAX_CHARS: usize = 240;

static RE_ITEM_LINE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^\[\d+\] ").expect("item line regex"));
static RE_MAX_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^Max themes: (\d+)$").expect("max themes regex"));

/// One theme as proposed by the model, before index resolution.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ThemeDraft {
    pub name: String,
    pub hook: String,
    pub explanation: String,
    pub why_it_matters: String,
    pub clusters: Vec<i64>,
}

/// Numbered listing of the selected clusters (1-based) plus holdings and the theme cap.
pub fn build_prompt(selected: &[EventCluster], holdings: &[Holding], max_themes: usize) -> String {
    let mut out = String::new();
    out.push_str("News items:\n");
    for (i, c) in selected.iter().enumerate() {
        let art = c.canonical_article();
        let ticker = c.dominant_ticker.as_deref().unwrap_or("MARKET");
        let summary = if art.description.is_empty() {
            art.title.as_str()
        } else {
            art.description.as_str()
        };
        let summary: String = summary.chars().take(SUMMARY_MAX_CHARS).collect();
        out.push_str(&format!(
            "[{}] {} | {} | {} | {}\n",
            i + 1,
            ticker,
            c.event_type.as_str(),
            art.title,
            summary
        ));
    }

    out.push('\n');
    if holdings.is_empty() {
        out.push_str("Holdings: none\n");
    } else {
        let list: Vec<String> = holdings
            .iter()
            .map(|h| {
                if h.name.is_empty() {
                    h.symbol.clone()
                } else {
                    format!("{} ({})", h.symbol, h.name)
                }
            })
            .collect();
        out.push_str(&format!("Holdings: {}\n", list.join(", ")));
    }
    out.push_str(&format!("Max themes: {max_themes}\n"));
    out
}

/// Parse and validate a reply. Anything short of a clean match is an error; there is
/// no partial recovery.
pub fn parse_themes(
    text: &str,
    cluster_count: usize,
    max_themes: usize,
) -> Result<Vec<ThemeDraft>, ThemeParseError> {
    let drafts: Vec<ThemeDraft> =
        serde_json::from_str(text.trim()).map_err(|e| ThemeParseError::Malformed(e.to_string()))?;

    if drafts.is_empty() {
        return Err(ThemeParseError::Empty);
    }
    if drafts.len() > max_themes {
        return Err(ThemeParseError::TooManyThemes {
            count: drafts.len(),
            max: max_themes,
        });
    }

    for (n, d) in drafts.iter().enumerate() {
        let theme = n + 1;
        for (field, value) in [
            ("name", &d.name),
            ("hook", &d.hook),
            ("explanation", &d.explanation),
            ("why_it_matters", &d.why_it_matters),
        ] {
            if value.trim().is_empty() {
                return Err(ThemeParseError::EmptyField { theme, field });
            }
        }
        if d.clusters.is_empty() {
            return Err(ThemeParseError::NoClusters { theme });
        }
        if let Some(&index) = d
            .clusters
            .iter()
            .find(|&&i| i < 1 || i as u64 > cluster_count as u64)
        {
            return Err(ThemeParseError::IndexOutOfRange {
                theme,
                index,
                max: cluster_count,
            });
        }
    }
    Ok(drafts)
}

/// Check a reply against the prompt that produced it, reading the item count and the
/// theme cap back from the prompt text. Used to keep invalid replies out of the cache.
pub fn reply_fits_prompt(prompt: &str, reply: &str) -> bool {
    let items = RE_ITEM_LINE.find_iter(prompt).count();
    let Some(max) = RE_MAX_LINE
        .captures(prompt)
        .and_then(|c| c.get(1)?.as_str().parse::<usize>().ok())
    else {
        return false;
    };
    parse_themes(reply, items, max).is_ok()
}
