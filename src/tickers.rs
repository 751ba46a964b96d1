//! Ticker extraction: tokenizer + gazetteer (symbol → company names/sector), with a
//! context-keyword map as a secondary signal.
//!
//! Resolution order for a piece of text:
//! 1. carry-over candidates supplied by the source (validated symbols only),
//! 2. cashtags (`$AAPL`) and bare upper-case tokens that are known symbols and not
//!    common words,
//! 3. company names / aliases from the gazetteer,
//! 4. only if nothing resolved: context keywords (e.g. "iPhone" → AAPL).

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use std::collections::HashMap;

/// One gazetteer row.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CompanyEntry {
    pub symbol: String,
    pub name: String,
    #[serde(default)]
    pub aliases: Vec<String>,
    #[serde(default)]
    pub sector: Option<String>,
    /// Product / brand words that imply this company when no symbol is printed.
    #[serde(default)]
    pub context: Vec<String>,
}

/// A single token with byte span and sequential index.
#[derive(Debug, Clone)]
pub struct Token {
    pub text: String,
    pub start: usize,
    pub index: usize,
    /// Preceded by `$`.
    pub cashtag: bool,
}

static RE_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?u)(\$?)\b([\w][\w.&-]*)\b").expect("tokenizer regex"));
static RE_SYMBOL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Z]{1,5}(?:\.[A-Z])?$").expect("symbol regex"));

/// Upper-case words that look like tickers but almost never are in headlines.
const COMMON_WORDS: &[&str] = &[
    "A", "I", "AI", "AN", "AM", "AS", "AT", "BE", "BY", "DO", "GO", "IF", "IN", "IS", "IT", "ME",
    "MY", "NO", "OF", "OK", "ON", "OR", "SO", "TO", "UP", "US", "WE", "ALL", "AND", "ARE", "BIG",
    "CAN", "CEO", "CFO", "EPS", "ETF", "EU", "FOR", "GDP", "HAS", "IPO", "NEW", "NOW", "NYSE",
    "ONE", "OUT", "SEC", "THE", "TOP", "UK", "USA", "USD", "WHO", "WHY", "YOU", "CPI", "FED",
    "FOMC", "Q1", "Q2", "Q3", "Q4", "PM", "EST", "ET", "GMT", "UTC", "LIVE", "NEWS", "CEOS",
];

/// Tokenize into word tokens, remembering whether each was written as a cashtag.
pub fn tokenize(input: &str) -> Vec<Token> {
    RE_TOKEN
        .captures_iter(input)
        .enumerate()
        .filter_map(|(i, caps)| {
            let word = caps.get(2)?;
            Some(Token {
                text: word.as_str().to_string(),
                start: word.start(),
                index: i,
                cashtag: caps.get(1).is_some_and(|m| !m.as_str().is_empty()),
            })
        })
        .collect()
}

/// True for a 1–5 letter upper-case symbol, optionally with a share-class suffix (`BRK.B`).
pub fn is_symbol_shaped(s: &str) -> bool {
    RE_SYMBOL.is_match(s)
}

pub fn is_common_word(s: &str) -> bool {
    COMMON_WORDS.iter().any(|w| w.eq_ignore_ascii_case(s))
}

/// A symbol found in text with where/how often it occurred.
#[derive(Debug, Clone, PartialEq)]
pub struct Mention {
    pub symbol: String,
    pub count: usize,
    pub first_pos: usize,
}

#[derive(Debug, Clone)]
pub struct Gazetteer {
    by_symbol: HashMap<String, CompanyEntry>,
    /// lower-cased name/alias → symbol
    names: Vec<(String, String)>,
    /// lower-cased context keyword → symbol
    context: Vec<(String, String)>,
}

impl Default for Gazetteer {
    fn default() -> Self {
        Self::default_seed()
    }
}

impl Gazetteer {
    pub fn empty() -> Self {
        Self {
            by_symbol: HashMap::new(),
            names: Vec::new(),
            context: Vec::new(),
        }
    }

    pub fn from_entries<I: IntoIterator<Item = CompanyEntry>>(entries: I) -> Self {
        let mut g = Self::empty();
        g.extend(entries);
        g
    }

    /// Add or replace entries (keyed by symbol).
    pub fn extend<I: IntoIterator<Item = CompanyEntry>>(&mut self, entries: I) {
        for mut e in entries {
            e.symbol = e.symbol.trim().to_ascii_uppercase();
            if e.symbol.is_empty() {
                continue;
            }
            self.names.retain(|(_, s)| s != &e.symbol);
            self.context.retain(|(_, s)| s != &e.symbol);
            self.names
                .push((e.name.to_lowercase(), e.symbol.clone()));
            for a in &e.aliases {
                self.names.push((a.to_lowercase(), e.symbol.clone()));
            }
            for c in &e.context {
                self.context.push((c.to_lowercase(), e.symbol.clone()));
            }
            self.by_symbol.insert(e.symbol.clone(), e);
        }
        // Longest names first so "Meta Platforms" wins over "Meta".
        self.names.sort_by(|a, b| b.0.len().cmp(&a.0.len()).then(a.0.cmp(&b.0)));
    }

    pub fn contains(&self, symbol: &str) -> bool {
        self.by_symbol.contains_key(&symbol.to_ascii_uppercase())
    }

    pub fn entry(&self, symbol: &str) -> Option<&CompanyEntry> {
        self.by_symbol.get(&symbol.to_ascii_uppercase())
    }

    pub fn sector(&self, symbol: &str) -> Option<&str> {
        self.entry(symbol).and_then(|e| e.sector.as_deref())
    }

    pub fn name_for(&self, symbol: &str) -> Option<&str> {
        self.entry(symbol).map(|e| e.name.as_str())
    }

    /// Symbol mentions in `text` from cashtags, bare symbols and company names.
    /// Context keywords are not consulted here.
    pub fn mentions(&self, text: &str) -> Vec<Mention> {
        let mut found: Vec<Mention> = Vec::new();
        let mut bump = |symbol: &str, pos: usize| {
            if let Some(m) = found.iter_mut().find(|m| m.symbol == symbol) {
                m.count += 1;
                m.first_pos = m.first_pos.min(pos);
            } else {
                found.push(Mention {
                    symbol: symbol.to_string(),
                    count: 1,
                    first_pos: pos,
                });
            }
        };

        for tok in tokenize(text) {
            if tok.cashtag {
                let sym = tok.text.to_ascii_uppercase();
                if is_symbol_shaped(&sym) {
                    bump(&sym, tok.start);
                }
                continue;
            }
            if is_symbol_shaped(&tok.text) && !is_common_word(&tok.text) && self.contains(&tok.text)
            {
                bump(&tok.text, tok.start);
            }
        }

        let lower = text.to_lowercase();
        let mut claimed: Vec<(usize, usize)> = Vec::new();
        for (name, sym) in &self.names {
            for (pos, _) in match_word_positions(&lower, name) {
                let end = pos + name.len();
                if claimed.iter().any(|&(s, e)| pos < e && end > s) {
                    continue;
                }
                claimed.push((pos, end));
                bump(sym, pos);
            }
        }

        found.sort_by_key(|m| m.first_pos);
        found
    }

    /// Context-keyword symbols (secondary signal).
    pub fn context_mentions(&self, text: &str) -> Vec<Mention> {
        let lower = text.to_lowercase();
        let mut found: Vec<Mention> = Vec::new();
        for (kw, sym) in &self.context {
            for (pos, _) in match_word_positions(&lower, kw) {
                if let Some(m) = found.iter_mut().find(|m| &m.symbol == sym) {
                    m.count += 1;
                    m.first_pos = m.first_pos.min(pos);
                } else {
                    found.push(Mention {
                        symbol: sym.clone(),
                        count: 1,
                        first_pos: pos,
                    });
                }
            }
        }
        found.sort_by_key(|m| m.first_pos);
        found
    }

    /// Full resolution: carry-over candidates, then text mentions, then (only if
    /// nothing resolved) context keywords. Ordered, deduplicated symbols. A candidate
    /// is kept when it is symbol-shaped or already known to the gazetteer.
    pub fn extract(&self, text: &str, candidates: &[String]) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for c in candidates {
            let sym = c.trim().trim_start_matches('$').to_ascii_uppercase();
            if (is_symbol_shaped(&sym) || self.contains(&sym)) && !out.contains(&sym) {
                out.push(sym);
            }
        }
        for m in self.mentions(text) {
            if !out.contains(&m.symbol) {
                out.push(m.symbol);
            }
        }
        if out.is_empty() {
            for m in self.context_mentions(text) {
                if !out.contains(&m.symbol) {
                    out.push(m.symbol);
                }
            }
        }
        out
    }

    /// Built-in seed with widely held US large caps.
    pub fn default_seed() -> Self {
        fn e(sym: &str, name: &str, aliases: &[&str], sector: &str, ctx: &[&str]) -> CompanyEntry {
            CompanyEntry {
                symbol: sym.to_string(),
                name: name.to_string(),
                aliases: aliases.iter().map(|s| s.to_string()).collect(),
                sector: Some(sector.to_string()),
                context: ctx.iter().map(|s| s.to_string()).collect(),
            }
        }
        Self::from_entries([
            e("AAPL", "Apple", &["Apple Inc"], "technology", &["iPhone", "iPad", "MacBook", "App Store", "Vision Pro", "Tim Cook"]),
            e("MSFT", "Microsoft", &[], "technology", &["Azure", "Windows", "Xbox", "Copilot", "Satya Nadella"]),
            e("GOOGL", "Alphabet", &["Google"], "communication", &["YouTube", "Gemini", "Waymo", "Sundar Pichai"]),
            e("AMZN", "Amazon", &["Amazon.com"], "consumer", &["AWS", "Prime Video", "Andy Jassy"]),
            e("META", "Meta Platforms", &["Meta", "Facebook"], "communication", &["Instagram", "WhatsApp", "Zuckerberg"]),
            e("NVDA", "Nvidia", &["NVIDIA Corp"], "technology", &["GeForce", "CUDA", "Blackwell", "Jensen Huang"]),
            e("TSLA", "Tesla", &[], "consumer", &["Cybertruck", "Model Y", "Model 3", "Elon Musk", "Autopilot"]),
            e("AMD", "Advanced Micro Devices", &["AMD"], "technology", &["Ryzen", "Radeon", "Lisa Su"]),
            e("INTC", "Intel", &[], "technology", &["Pat Gelsinger"]),
            e("NFLX", "Netflix", &[], "communication", &[]),
            e("JPM", "JPMorgan Chase", &["JPMorgan", "JP Morgan"], "financials", &["Jamie Dimon"]),
            e("BAC", "Bank of America", &[], "financials", &[]),
            e("GS", "Goldman Sachs", &[], "financials", &[]),
            e("V", "Visa", &[], "financials", &[]),
            e("MA", "Mastercard", &[], "financials", &[]),
            e("BRK.B", "Berkshire Hathaway", &["Berkshire"], "financials", &["Warren Buffett"]),
            e("JNJ", "Johnson & Johnson", &[], "healthcare", &[]),
            e("PFE", "Pfizer", &[], "healthcare", &[]),
            e("LLY", "Eli Lilly", &["Lilly"], "healthcare", &["Mounjaro", "Zepbound"]),
            e("UNH", "UnitedHealth", &["UnitedHealth Group"], "healthcare", &[]),
            e("XOM", "Exxon Mobil", &["Exxon", "ExxonMobil"], "energy", &[]),
            e("CVX", "Chevron", &[], "energy", &[]),
            e("WMT", "Walmart", &[], "consumer", &[]),
            e("KO", "Coca-Cola", &["Coca Cola"], "consumer", &[]),
            e("DIS", "Walt Disney", &["Disney"], "communication", &["Disney+", "Pixar", "Marvel"]),
            e("BA", "Boeing", &[], "industrials", &["737 MAX", "Dreamliner"]),
            e("CAT", "Caterpillar", &[], "industrials", &[]),
            e("ORCL", "Oracle", &[], "technology", &[]),
            e("CRM", "Salesforce", &[], "technology", &[]),
            e("AVGO", "Broadcom", &[], "technology", &[]),
            e("TSM", "Taiwan Semiconductor", &["TSMC"], "technology", &[]),
            e("SPY", "SPDR S&P 500 ETF", &[], "fund", &[]),
            e("QQQ", "Invesco QQQ", &[], "fund", &[]),
        ])
    }
}

/// Byte positions of word-bounded, case-already-lowered occurrences of `needle`.
fn match_word_positions<'a>(hay: &'a str, needle: &'a str) -> impl Iterator<Item = (usize, &'a str)> {
    hay.match_indices(needle).filter(move |(pos, _)| {
        let before_ok = hay[..*pos]
            .chars()
            .next_back()
            .map_or(true, |c| !c.is_alphanumeric());
        let after_ok = hay[pos + needle.len()..]
            .chars()
            .next()
            .map_or(true, |c| !c.is_alphanumeric());
        before_ok && after_ok
    })
}
