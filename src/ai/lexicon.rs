use std::collections::HashMap;

use async_trait::async_trait;
use once_cell::sync::Lazy;

use super::{SentimentJudgment, SentimentScorer};
use crate::error::AlphaError;
use crate::retrieval::RetrievalResult;
use crate::store::text::tokenize;

static LEXICON: Lazy<HashMap<String, i32>> = Lazy::new(|| {
    let raw = include_str!("../../assets/sentiment_lexicon.json");
    serde_json::from_str::<HashMap<String, i32>>(raw).unwrap_or_else(|e| {
        tracing::error!(error = %e, "sentiment lexicon is not valid JSON");
        HashMap::new()
    })
});

/// Lexicon-based sentiment with short-range negation.
#[derive(Debug, Clone, Default)]
pub struct LexiconSentiment;

/// Per-passage result: signed lexicon sum plus the words that hit.
#[derive(Debug, Clone, PartialEq)]
pub struct PassageScore {
    pub raw: i32,
    pub hits: Vec<(String, i32)>,
}

impl LexiconSentiment {
    pub fn new() -> Self {
        Self
    }

    #[inline]
    fn word_score(&self, w: &str) -> i32 {
        *LEXICON.get(w).unwrap_or(&0)
    }

    /// Negation: if one of the previous 1..=3 tokens is a negator, the
    /// word's sign flips.
    pub fn score_text(&self, text: &str) -> PassageScore {
        let tokens: Vec<String> = tokenize(text).collect();
        let mut raw = 0;
        let mut hits = Vec::new();

        for i in 0..tokens.len() {
            let base = self.word_score(&tokens[i]);
            if base == 0 {
                continue;
            }
            let negated = (1..=3).any(|k| i >= k && is_negator(&tokens[i - k]));
            let adj = if negated { -base } else { base };
            raw += adj;
            hits.push((tokens[i].clone(), adj));
        }

        PassageScore { raw, hits }
    }
}

/// Squash a raw lexicon sum into `[-1, 1]`.
fn squash(raw: i32) -> f32 {
    (raw as f32 / 4.0).tanh()
}

fn is_negator(tok: &str) -> bool {
    // tokenization splits "isn't" into "isn" + "t", so match the stems
    matches!(
        tok,
        "not" | "no" | "never" | "isn" | "wasn" | "aren" | "cannot" | "without" | "didn" | "doesn"
    )
}

#[async_trait]
impl SentimentScorer for LexiconSentiment {
    async fn score(&self, ticker: &str, passages: &[RetrievalResult]) -> Result<SentimentJudgment, AlphaError> {
        if passages.is_empty() {
            return Ok(SentimentJudgment {
                score: 0.0,
                confidence: 0.0,
                factors: vec![format!("No indexed coverage for {ticker}")],
            });
        }

        let scored: Vec<PassageScore> = passages.iter().map(|p| self.score_text(&p.text)).collect();
        let with_hits: Vec<&PassageScore> = scored.iter().filter(|s| !s.hits.is_empty()).collect();
        let total_hits: usize = with_hits.iter().map(|s| s.hits.len()).sum();

        if with_hits.is_empty() {
            return Ok(SentimentJudgment {
                score: 0.0,
                confidence: 0.2,
                factors: vec![format!("{} passages, no sentiment-bearing terms", passages.len())],
            });
        }

        let score = with_hits.iter().map(|s| squash(s.raw)).sum::<f32>() / with_hits.len() as f32;
        let confidence = (0.35 + 0.1 * total_hits.min(6) as f32).min(0.95);

        let mut words: Vec<(String, i32)> = with_hits.iter().flat_map(|s| s.hits.clone()).collect();
        words.sort_by(|a, b| b.1.abs().cmp(&a.1.abs()).then_with(|| a.0.cmp(&b.0)));
        words.dedup_by(|a, b| a.0 == b.0);

        let neg: Vec<&str> = words.iter().filter(|w| w.1 < 0).take(3).map(|w| w.0.as_str()).collect();
        let pos: Vec<&str> = words.iter().filter(|w| w.1 > 0).take(3).map(|w| w.0.as_str()).collect();
        let mut factors = Vec::new();
        if !neg.is_empty() {
            factors.push(format!("Bearish terms: {}", neg.join(", ")));
        }
        if !pos.is_empty() {
            factors.push(format!("Bullish terms: {}", pos.join(", ")));
        }

        Ok(SentimentJudgment {
            score: score.clamp(-1.0, 1.0),
            confidence,
            factors,
        })
    }

    fn name(&self) -> &'static str {
        "lexicon"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn passage(text: &str) -> RetrievalResult {
        RetrievalResult::new("d:0000", "d", text)
    }

    #[test]
    fn negation_flips_sign() {
        let s = LexiconSentiment::new();
        assert!(s.score_text("strong growth").raw > 0);
        assert!(s.score_text("not strong").raw < 0);
        assert!(s.score_text("revenue isn't growing, no growth").raw < 0);
    }

    #[tokio::test]
    async fn bearish_passages_score_negative() {
        let s = LexiconSentiment::new();
        let j = s
            .score("AAPL", &[passage("Apple faces lawsuit. Shares plunge on fraud probe.")])
            .await
            .unwrap();
        assert!(j.score < -0.5, "score {}", j.score);
        assert!(j.confidence > 0.4);
        assert!(j.factors[0].starts_with("Bearish terms"));
    }

    #[tokio::test]
    async fn empty_evidence_is_neutral_with_zero_confidence() {
        let j = LexiconSentiment::new().score("AAPL", &[]).await.unwrap();
        assert_eq!(j.score, 0.0);
        assert_eq!(j.confidence, 0.0);
    }
}
