// src/store/text.rs
use once_cell::sync::OnceCell;
use regex::Regex;

/// Normalize document text: decode entities, strip tags, unify quotes and
/// collapse whitespace. Sentence punctuation is preserved for chunking.
pub fn normalize_text(s: &str) -> String {
    // 1) HTML entity decode
    let mut out = html_escape::decode_html_entities(s).to_string();

    // 2) Strip HTML tags
    static RE_TAGS: OnceCell<Regex> = OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| Regex::new(r"(?is)</?[^>]+>").expect("static regex"));
    out = re_tags.replace_all(&out, " ").to_string();

    // 3) Normalize typographic quotes to ASCII
    out = out
        .replace(['\u{201C}', '\u{201D}', '\u{00AB}', '\u{00BB}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'");

    // 4) Collapse whitespace (includes nbsp decoded in step 1)
    static RE_WS: OnceCell<Regex> = OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| Regex::new(r"[\s\u{00A0}]+").expect("static regex"));
    out = re_ws.replace_all(&out, " ").to_string();

    out.trim().to_string()
}

/// Lowercase alphanumeric tokens. Shared by the lexical index, the judges
/// and the lexicon scorer so they agree on what a term is.
pub fn tokenize(s: &str) -> impl Iterator<Item = String> + '_ {
    s.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
}
