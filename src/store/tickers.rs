//! # Ticker extraction
//!
//! Maps free text to the set of ticker symbols it mentions.
//!
//! - Cashtags (`$AAPL`) are always accepted.
//! - Bare uppercase tokens of 1-5 letters are accepted unless stoplisted
//!   (`CEO`, `EPS`, `US`, ...).
//! - Company names resolve through a case-insensitive alias table
//!   ("Apple" → `AAPL`), matched on whole normalized words.
//!
//! The alias table is loadable from JSON with a built-in seed as fallback.

use once_cell::sync::OnceCell;
use regex::Regex;
use serde::Deserialize;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::{fs, path::Path};

#[derive(Debug, Clone, Deserialize)]
pub struct TickerExtractor {
    /// normalized company name → ticker
    #[serde(default)]
    aliases: HashMap<String, String>,
    #[serde(default)]
    stoplist: HashSet<String>,
}

impl Default for TickerExtractor {
    fn default() -> Self {
        Self::default_seed()
    }
}

impl TickerExtractor {
    /// Load from a JSON file (`{"aliases": {...}, "stoplist": [...]}`).
    /// Falls back to `default_seed()` on error.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Self {
        match fs::read_to_string(path) {
            Ok(s) => match serde_json::from_str::<TickerExtractor>(&s) {
                Ok(mut cfg) => {
                    cfg.aliases = cfg
                        .aliases
                        .into_iter()
                        .filter_map(|(k, v)| Some((normalize(&k), normalize_ticker(&v)?)))
                        .collect();
                    if cfg.stoplist.is_empty() {
                        cfg.stoplist = Self::default_seed().stoplist;
                    }
                    cfg
                }
                Err(_) => Self::default_seed(),
            },
            Err(_) => Self::default_seed(),
        }
    }

    /// Every ticker mentioned in `text`, sorted.
    pub fn extract(&self, text: &str) -> BTreeSet<String> {
        static RE_CASHTAG: OnceCell<Regex> = OnceCell::new();
        static RE_UPPER: OnceCell<Regex> = OnceCell::new();
        let re_cash = RE_CASHTAG
            .get_or_init(|| Regex::new(r"\$([A-Za-z]{1,5}(?:\.[A-Za-z])?)\b").expect("static regex"));
        let re_upper =
            RE_UPPER.get_or_init(|| Regex::new(r"\b[A-Z]{1,5}(?:\.[A-Z])?\b").expect("static regex"));

        let mut out = BTreeSet::new();

        for cap in re_cash.captures_iter(text) {
            out.insert(cap[1].to_ascii_uppercase());
        }

        for m in re_upper.find_iter(text) {
            // Share classes ride along whole: "BRK.B", never a bare "B".
            let sym = m.as_str();
            let base = sym.split('.').next().unwrap_or(sym);
            if !self.stoplist.contains(sym) && !self.stoplist.contains(base) {
                out.insert(sym.to_string());
            }
        }

        // Whole-word alias match on normalized text, padded so " apple " never
        // matches inside "pineapple".
        let padded = format!(" {} ", normalize(text));
        for (name, ticker) in &self.aliases {
            if padded.contains(&format!(" {name} ")) {
                out.insert(ticker.clone());
            }
        }

        out
    }

    pub fn resolve_alias(&self, name: &str) -> Option<&str> {
        self.aliases.get(&normalize(name)).map(String::as_str)
    }

    /// Built-in seed with large caps and common finance-speak stopwords.
    pub fn default_seed() -> Self {
        let mut aliases = HashMap::new();
        for (name, ticker) in [
            ("apple", "AAPL"),
            ("microsoft", "MSFT"),
            ("alphabet", "GOOGL"),
            ("google", "GOOGL"),
            ("amazon", "AMZN"),
            ("meta platforms", "META"),
            ("facebook", "META"),
            ("nvidia", "NVDA"),
            ("tesla", "TSLA"),
            ("netflix", "NFLX"),
            ("intel", "INTC"),
            ("advanced micro devices", "AMD"),
            ("jpmorgan", "JPM"),
            ("jp morgan", "JPM"),
            ("goldman sachs", "GS"),
            ("berkshire hathaway", "BRK.B"),
            ("exxon", "XOM"),
            ("walmart", "WMT"),
            ("disney", "DIS"),
            ("boeing", "BA"),
        ] {
            aliases.insert(name.to_string(), ticker.to_string());
        }

        let stoplist = [
            "I", "A", "AN", "AM", "PM", "US", "USA", "UK", "EU", "UN", "CEO", "CFO", "CTO", "COO",
            "FY", "EPS", "GDP", "CPI", "IPO", "SEC", "FED", "FOMC", "AI", "IT", "TV", "OK", "Q",
            "QOQ", "YOY", "YTD", "ETF", "NYSE", "USD", "EUR", "ET", "PT", "EST", "NEW", "THE",
            "AND", "FOR", "OF", "TO", "IN", "ON", "AT", "BY", "OR", "IS", "BE", "AS", "IF", "NO",
            "SO", "UP", "DO", "GO", "MY", "WE", "HE", "IRS", "DOJ", "FTC", "LLC", "INC", "LTD",
            "CO", "PLC", "NEWS", "BREAKING", "UPDATE", "FAQ", "API", "R", "D", "U.S", "U.K",
        ]
        .into_iter()
        .map(str::to_string)
        .collect();

        Self { aliases, stoplist }
    }
}

/// Canonical ticker form: optional `$`, uppercase, 1-5 letters with an
/// optional one-letter share class (`BRK.B`).
pub fn normalize_ticker(raw: &str) -> Option<String> {
    static RE: OnceCell<Regex> = OnceCell::new();
    let re = RE.get_or_init(|| Regex::new(r"^[A-Z]{1,5}(\.[A-Z])?$").expect("static regex"));
    let t = raw.trim().trim_start_matches('$').to_ascii_uppercase();
    re.is_match(&t).then_some(t)
}

/// Lowercase, map punctuation and dashes to spaces, collapse whitespace.
fn normalize(s: &str) -> String {
    s.chars()
        .map(|c| {
            if c.is_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                ' '
            }
        })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}
