//! Shared keyword tables used by the fetch filters, the cleaner and the event detector.
//!
//! All matching is case-insensitive and word-bounded. Patterns are compiled once.

use once_cell::sync::Lazy;
use regex::Regex;

fn word_alternation(words: &[&str]) -> Regex {
    let alts = words
        .iter()
        .map(|w| regex::escape(w))
        .collect::<Vec<_>>()
        .join("|");
    Regex::new(&format!(r"(?i)\b(?:{alts})\b")).expect("lexicon regex")
}

/// Verbs that signal something actually happened.
pub const EVENT_VERBS: &[&str] = &[
    "reports", "reported", "posts", "posted", "announces", "announced", "acquires", "acquired",
    "acquire", "beats", "beat", "misses", "missed", "raises", "raised", "cuts", "cut", "lowers",
    "lowered", "launches", "launched", "unveils", "unveiled", "files", "filed", "sues", "sued",
    "settles", "settled", "approves", "approved", "rejects", "rejected", "buys", "bought",
    "sells", "sold", "merges", "merged", "agrees", "agreed", "plunges", "plunged", "soars",
    "soared", "surges", "surged", "jumps", "jumped", "falls", "fell", "drops", "dropped",
    "slumps", "resigns", "resigned", "appoints", "appointed", "hikes", "hiked", "halts",
    "halted", "recalls", "recalled", "fines", "fined", "warns", "warned", "expands",
    "lays off", "delays", "delayed",
];

/// Market-wide topics.
pub const MACRO_KEYWORDS: &[&str] = &[
    "fed", "federal reserve", "fomc", "interest rate", "interest rates", "rate cut",
    "rate hike", "inflation", "cpi", "ppi", "pce", "gdp", "recession", "unemployment",
    "jobless", "payrolls", "jobs report", "treasury", "treasuries", "bond yields", "yields",
    "central bank", "ecb", "bank of england", "bank of japan", "tariff", "tariffs",
    "trade war", "oil prices", "opec", "stimulus", "debt ceiling", "powell",
];

/// Regulatory / legal topics.
pub const REGULATION_KEYWORDS: &[&str] = &[
    "sec", "ftc", "doj", "antitrust", "regulator", "regulators", "regulatory", "lawsuit",
    "probe", "investigation", "fine", "fined", "ban", "sanctions", "subpoena", "settlement",
    "compliance", "european commission", "fda", "approval", "court", "ruling", "legislation",
];

/// Keywords that mark a headline as being about a concrete corporate event.
pub const EVENT_KEYWORDS: &[&str] = &[
    "earnings", "revenue", "profit", "quarter", "quarterly", "q1", "q2", "q3", "q4",
    "guidance", "outlook", "forecast", "merger", "acquisition", "acquire", "acquires",
    "deal", "buyout", "takeover", "launch", "launches", "unveils", "recall", "lawsuit",
    "probe", "dividend", "buyback", "layoffs", "ceo", "split", "ipo", "sec", "fda",
    "beats", "misses", "downgrade", "upgrade", "results",
];

/// Low-value patterns rejected outright at fetch time. `(id, pattern)`.
pub const DENY_PATTERNS: &[(&str, &str)] = &[
    ("top_picks", r"(?i)\btop\s+(?:\d+\s+)?picks?\b"),
    ("should_you_buy", r"(?i)\bshould\s+you\s+(?:buy|sell)\b"),
    ("stocks_to_buy", r"(?i)\b(?:stocks?|shares)\s+to\s+(?:buy|watch|avoid)\b"),
    ("best_stocks", r"(?i)\bbest\s+(?:\w+\s+)?stocks?\b"),
    ("price_target_churn", r"(?i)\b(?:reiterates?|maintains?|reaffirms?)\b.{0,40}\b(?:rating|price target)\b"),
    ("analyst_rating_churn", r"(?i)\b(?:analyst|analysts)\b.{0,30}\b(?:rating|ratings)\b"),
    ("millionaire_bait", r"(?i)\b(?:millionaire|get rich|retire early)\b"),
    ("motley_list", r"(?i)\b\d+\s+(?:reasons|things)\s+(?:to|you)\b"),
];

static RE_EVENT_VERB: Lazy<Regex> = Lazy::new(|| word_alternation(EVENT_VERBS));
static RE_MACRO: Lazy<Regex> = Lazy::new(|| word_alternation(MACRO_KEYWORDS));
static RE_REGULATION: Lazy<Regex> = Lazy::new(|| word_alternation(REGULATION_KEYWORDS));
static RE_EVENT_KEYWORD: Lazy<Regex> = Lazy::new(|| word_alternation(EVENT_KEYWORDS));
static RE_DENY: Lazy<Vec<(&'static str, Regex)>> = Lazy::new(|| {
    DENY_PATTERNS
        .iter()
        .map(|(id, p)| (*id, Regex::new(p).expect("deny regex")))
        .collect()
});

pub fn has_digit(text: &str) -> bool {
    text.chars().any(|c| c.is_ascii_digit())
}

pub fn has_event_verb(text: &str) -> bool {
    RE_EVENT_VERB.is_match(text)
}

pub fn has_macro_keyword(text: &str) -> bool {
    RE_MACRO.is_match(text)
}

pub fn has_regulation_keyword(text: &str) -> bool {
    RE_REGULATION.is_match(text)
}

/// Macro or regulation keyword present.
pub fn has_macro_or_regulation(text: &str) -> bool {
    has_macro_keyword(text) || has_regulation_keyword(text)
}

pub fn has_event_keyword(text: &str) -> bool {
    RE_EVENT_KEYWORD.is_match(text)
}

/// First built-in deny pattern matching `text`, by id.
pub fn deny_match(text: &str) -> Option<&'static str> {
    RE_DENY
        .iter()
        .find(|(_, re)| re.is_match(text))
        .map(|(id, _)| *id)
}

/// Count of distinct macro keywords found; used for macro confidence.
pub fn macro_hits(text: &str) -> usize {
    let mut seen: Vec<String> = RE_MACRO
        .find_iter(text)
        .map(|m| m.as_str().to_ascii_lowercase())
        .collect();
    seen.sort();
    seen.dedup();
    seen.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deny_patterns_catch_listicles() {
        assert_eq!(deny_match("3 Top Picks for 2025"), Some("top_picks"));
        assert_eq!(deny_match("Should You Buy Nvidia Stock Now?"), Some("should_you_buy"));
        assert_eq!(
            deny_match("Morgan Stanley reiterates Overweight rating on AAPL"),
            Some("price_target_churn")
        );
        assert_eq!(deny_match("Apple reports record quarterly revenue"), None);
    }

    #[test]
    fn keyword_classes_are_word_bounded() {
        assert!(has_macro_keyword("The Fed held rates steady"));
        assert!(!has_macro_keyword("Federated Hermes names new CEO"));
        assert!(has_regulation_keyword("SEC opens probe into trading firm"));
        assert!(has_event_verb("Microsoft acquires gaming studio"));
        assert!(!has_event_verb("A look at the week ahead"));
    }

    #[test]
    fn macro_hits_counts_distinct() {
        assert_eq!(macro_hits("Fed, inflation and the Fed again"), 2);
    }
}
