//! Cleaner: `RawArticle` → `CleanedArticle`, pure and total.
//!
//! Text normalization, boilerplate stripping, timestamp normalization, ticker
//! resolution, source quality and the low-information flag. Nothing is dropped here.

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::dates::normalize_published;
use crate::lexicon;
use crate::model::{CleanedArticle, RawArticle};
use crate::source_quality::SourceQualityConfig;
use crate::tickers::Gazetteer;

pub const TITLE_MAX_CHARS: usize = 300;
pub const DESCRIPTION_MAX_CHARS: usize = 1500;
pub const BODY_MAX_CHARS: usize = 5000;

static RE_TAGS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)<(script|style)[^>]*>.*?</(script|style)>|<!--.*?-->|</?[A-Za-z][^<>]*>").expect("tag regex")
});
static RE_WS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("ws regex"));

/// Phrases removed wherever they appear. Patterns ending in `.*$` drop the tail.
static BOILERPLATE: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?is)\bthe post\b.{0,300}?\bappeared first on\b.*$",
        r"(?is)\b(?:continue reading|read more|keep reading|read the full (?:story|article))\b.*$",
        r"(?i)\b(?:subscribe|sign up)\s+(?:now|today|here|to our newsletter)\b[^.]*\.?",
        r"(?i)\ball rights reserved\b\.?",
        r"(?i)^\s*[a-z][a-z .,]{0,40}\((?:reuters|ap|bloomberg|dow jones)\)\s*[-–—]+\s*",
        r"\[(?:…|\.\.\.)\]",
        r"(?i)\bclick here\b[^.]*\.?",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("boilerplate regex"))
    .collect()
});

/// Copyright lines: the marker and a year at the start of a line or sentence. Group 1
/// keeps the preceding sentence end.
static RE_COPYRIGHT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?im)(^|[.!?]\s+)\s*(?:©|\(c\)|copyright)\s*(?:©\s*)?(?:19|20)\d{2}\b[^.]{0,80}\.?")
        .expect("copyright regex")
});

/// Decode entities, strip tags and boilerplate, normalize quotes and whitespace,
/// drop trailing sentence punctuation and cap to `max_chars`.
pub fn normalize_text(s: &str, max_chars: usize) -> String {
    // 1) HTML entity decode
    let mut out = html_escape::decode_html_entities(s).to_string();

    // 2) Strip HTML tags (twice: entity-escaped markup shows up after decoding)
    out = RE_TAGS.replace_all(&out, " ").to_string();

    // 3) Normalize “ ” ‘ ’ « » to ASCII quotes
    out = out
        .replace(['\u{201C}', '\u{201D}', '\u{00AB}', '\u{00BB}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'")
        .replace('\u{00A0}', " ");

    // 4) Boilerplate
    out = RE_COPYRIGHT.replace_all(&out, "${1} ").to_string();
    for re in BOILERPLATE.iter() {
        out = re.replace_all(&out, " ").to_string();
    }

    // 5) Collapse whitespace
    out = RE_WS.replace_all(&out, " ").trim().to_string();

    // 6) Strip trailing sentence punctuation (keep quotes)
    while let Some(last) = out.chars().last() {
        if matches!(last, '!' | '?' | '.' | ',' | ':' | ';' | '-') {
            out.pop();
            out.truncate(out.trim_end().len());
        } else {
            break;
        }
    }

    // 7) Length cap
    if out.chars().count() > max_chars {
        out = out.chars().take(max_chars).collect();
    }

    out
}

/// True when text has no digit, no event verb and no macro/regulation keyword.
pub fn is_low_information(text: &str) -> bool {
    !lexicon::has_digit(text)
        && !lexicon::has_event_verb(text)
        && !lexicon::has_macro_or_regulation(text)
}

pub struct Cleaner<'a> {
    gazetteer: &'a Gazetteer,
    sources: &'a SourceQualityConfig,
}

impl<'a> Cleaner<'a> {
    pub fn new(gazetteer: &'a Gazetteer, sources: &'a SourceQualityConfig) -> Self {
        Self { gazetteer, sources }
    }

    pub fn clean(&self, raw: &RawArticle, now: DateTime<Utc>) -> CleanedArticle {
        let title = normalize_text(&raw.title, TITLE_MAX_CHARS);
        let description = raw
            .description
            .as_deref()
            .map(|d| normalize_text(d, DESCRIPTION_MAX_CHARS))
            .unwrap_or_default();
        let body = raw
            .body_html
            .as_deref()
            .map(|b| normalize_text(b, BODY_MAX_CHARS))
            .unwrap_or_default();

        let (published_at, estimated) = normalize_published(&raw.published_at, now);

        let combined = [title.as_str(), description.as_str(), body.as_str()]
            .iter()
            .filter(|s| !s.is_empty())
            .copied()
            .collect::<Vec<_>>()
            .join(" ");

        let tickers = self.gazetteer.extract(&combined, &raw.ticker_candidates);
        let low_info = is_low_information(&combined);

        if estimated {
            tracing::debug!(target: "clean", id = %raw.id, "publish time unparseable; using now");
        }

        CleanedArticle {
            raw_id: raw.id.clone(),
            source: raw.source.clone(),
            layer: raw.layer,
            url: raw.url.clone(),
            title,
            description,
            body,
            published_at,
            published_at_estimated: estimated,
            tickers,
            quality: self.sources.quality_for(&raw.source, raw.layer),
            is_low_information: low_info,
            is_holdings_news: raw.is_holdings_news,
            category: self.sources.category_for(&raw.source, raw.layer),
        }
    }

    pub fn clean_all(&self, raws: &[RawArticle], now: DateTime<Utc>) -> Vec<CleanedArticle> {
        let out: Vec<CleanedArticle> = raws.iter().map(|r| self.clean(r, now)).collect();
        tracing::debug!(
            target: "clean",
            cleaned = out.len(),
            low_info = out.iter().filter(|c| c.is_low_information).count(),
            "clean complete"
        );
        out
    }
}
