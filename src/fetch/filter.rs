// src/fetch/filter.rs
//! Coarse admission filters applied per item before the merge.
//!
//! Holdings-search hits: deny list, then "event keyword or the ticker (or its
//! company name) in the title".
//! Feed items: deny list, then staleness, then "resolvable ticker or macro/regulation
//! keyword". A macro/regulation keyword exempts an item from the staleness cut.

use chrono::{DateTime, Duration, Utc};

use crate::dates::parse_published;
use crate::fetch::types::RejectReason;
use crate::lexicon;
use crate::tickers::Gazetteer;

pub struct HardFilter<'a> {
    gazetteer: &'a Gazetteer,
    stale_after: Duration,
    now: DateTime<Utc>,
}

impl<'a> HardFilter<'a> {
    pub fn new(gazetteer: &'a Gazetteer, stale_hours: i64, now: DateTime<Utc>) -> Self {
        Self {
            gazetteer,
            stale_after: Duration::hours(stale_hours),
            now,
        }
    }

    /// Hit returned by the news search for `ticker`.
    pub fn check_holdings_item(&self, title: &str, ticker: &str) -> Result<(), RejectReason> {
        if let Some(id) = lexicon::deny_match(title) {
            return Err(RejectReason::Deny(id.to_string()));
        }
        if lexicon::has_event_keyword(title) || self.title_names_ticker(title, ticker) {
            Ok(())
        } else {
            Err(RejectReason::NoEventOrTickerInTitle)
        }
    }

    /// Item from a wire/aggregator/fallback feed. Returns the tickers it resolved.
    pub fn check_feed_item(
        &self,
        title: &str,
        description: &str,
        published: Option<&str>,
    ) -> Result<Vec<String>, RejectReason> {
        if let Some(id) = lexicon::deny_match(title) {
            return Err(RejectReason::Deny(id.to_string()));
        }

        let text = if description.is_empty() {
            title.to_string()
        } else {
            format!("{title} {description}")
        };
        let macro_or_reg = lexicon::has_macro_or_regulation(&text);

        // Undated items are judged fresh; the cleaner estimates their timestamp later.
        if let Some(ts) = published.and_then(parse_published) {
            if self.now.signed_duration_since(ts) > self.stale_after && !macro_or_reg {
                return Err(RejectReason::Stale);
            }
        }

        let tickers = self.gazetteer.extract(&text, &[]);
        if tickers.is_empty() && !macro_or_reg {
            return Err(RejectReason::NoTickerOrMacro);
        }
        Ok(tickers)
    }

    fn title_names_ticker(&self, title: &str, ticker: &str) -> bool {
        let sym = ticker.to_ascii_uppercase();
        if self
            .gazetteer
            .mentions(title)
            .iter()
            .any(|m| m.symbol == sym)
        {
            return true;
        }
        // Symbols outside the gazetteer still count when printed verbatim.
        crate::tickers::tokenize(title)
            .iter()
            .any(|t| t.text.eq_ignore_ascii_case(&sym))
    }
}
