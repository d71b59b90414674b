//! Heuristic judges used when no remote model is configured.

use std::collections::HashSet;

use async_trait::async_trait;

use super::{RelevanceJudge, Sufficiency, SufficiencyJudge};
use crate::error::AlphaError;
use crate::retrieval::RetrievalResult;
use crate::store::text::tokenize;

/// Words that carry no retrieval signal on their own.
fn is_filler(t: &str) -> bool {
    matches!(
        t,
        "the" | "a" | "an" | "and" | "or" | "of" | "to" | "in" | "on" | "for" | "stock" | "news"
            | "latest" | "about" | "what" | "is" | "with"
    )
}

fn query_terms(query: &str) -> HashSet<String> {
    tokenize(query).filter(|t| !is_filler(t)).collect()
}

/// What the query asks about beyond its subject. Retrieval query text leads
/// with the ticker, and every candidate is already scoped to that ticker, so
/// the symbol itself is no evidence of coverage.
fn topic_terms(query: &str) -> HashSet<String> {
    tokenize(query).skip(1).filter(|t| !is_filler(t)).collect()
}

/// Fraction of `terms` that appear in `text`.
fn coverage(terms: &HashSet<String>, text: &str) -> f32 {
    if terms.is_empty() {
        return 0.0;
    }
    let tokens: HashSet<String> = tokenize(text).collect();
    terms.iter().filter(|t| tokens.contains(*t)).count() as f32 / terms.len() as f32
}

/// Sufficient once `min_supporting` passages from at least
/// `min_documents` distinct documents mention the query topic. A bare
/// ticker query has no topic; then every retrieved passage supports it.
#[derive(Debug, Clone)]
pub struct CoverageJudge {
    pub min_supporting: usize,
    pub min_documents: usize,
}

impl Default for CoverageJudge {
    fn default() -> Self {
        Self {
            min_supporting: 2,
            min_documents: 1,
        }
    }
}

#[async_trait]
impl SufficiencyJudge for CoverageJudge {
    async fn judge(&self, query: &str, passages: &[RetrievalResult]) -> Result<Sufficiency, AlphaError> {
        let topic = topic_terms(query);
        let supporting: Vec<&RetrievalResult> = passages
            .iter()
            .filter(|p| topic.is_empty() || coverage(&topic, &p.text) > 0.0)
            .collect();
        let docs: HashSet<&str> = supporting.iter().map(|p| p.document_id.as_str()).collect();

        if supporting.len() >= self.min_supporting && docs.len() >= self.min_documents {
            Ok(Sufficiency::yes(format!(
                "{} supporting passages from {} documents",
                supporting.len(),
                docs.len()
            )))
        } else {
            Ok(Sufficiency::no(format!(
                "only {} supporting passages",
                supporting.len()
            )))
        }
    }

    fn name(&self) -> &'static str {
        "coverage"
    }
}

/// Relevance = share of meaningful query terms present in the passage.
#[derive(Debug, Clone, Copy, Default)]
pub struct TermOverlapJudge;

#[async_trait]
impl RelevanceJudge for TermOverlapJudge {
    async fn score(&self, query: &str, passages: &[RetrievalResult]) -> Result<Vec<f32>, AlphaError> {
        let terms = query_terms(query);
        Ok(passages.iter().map(|p| coverage(&terms, &p.text)).collect())
    }

    fn name(&self) -> &'static str {
        "term-overlap"
    }
}
