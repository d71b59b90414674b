//! Query-time retrieval: hybrid ranking, adaptive escalation and reranking.

pub mod adaptive;
pub mod hybrid;
pub mod rerank;

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

pub use adaptive::{AdaptiveController, AdaptiveOutcome};
pub use hybrid::{HybridRetriever, PreparedQuery};
pub use rerank::Reranker;

/// What the caller is asking about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    pub ticker: String,
    pub refinement: Option<String>,
}

impl Query {
    pub fn new(ticker: impl Into<String>) -> Self {
        Self {
            ticker: ticker.into(),
            refinement: None,
        }
    }

    pub fn refined(mut self, text: impl Into<String>) -> Self {
        let t = text.into();
        self.refinement = (!t.trim().is_empty()).then(|| t.trim().to_string());
        self
    }

    /// Search text: the ticker plus the refinement, or a generic news query.
    pub fn text(&self) -> String {
        match &self.refinement {
            Some(r) => format!("{} {}", self.ticker, r),
            None => format!("{} stock news", self.ticker),
        }
    }

    /// Restrict candidates to chunks tagged with this ticker.
    pub fn ticker_filter(&self) -> Option<&str> {
        let t = self.ticker.trim();
        (!t.is_empty()).then_some(t)
    }
}

/// One ranked chunk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalResult {
    pub chunk_id: String,
    pub document_id: String,
    pub text: String,
    pub dense_score: f32,
    pub sparse_score: f32,
    pub fused_score: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rerank_score: Option<f32>,
}

impl RetrievalResult {
    pub fn new(chunk_id: &str, document_id: &str, text: &str) -> Self {
        Self {
            chunk_id: chunk_id.to_string(),
            document_id: document_id.to_string(),
            text: text.to_string(),
            dense_score: 0.0,
            sparse_score: 0.0,
            fused_score: 0.0,
            rerank_score: None,
        }
    }

    /// Total order: rerank score, then fused score (both descending; a
    /// missing rerank score ranks below any present one), then chunk id
    /// ascending.
    pub fn rank_cmp(&self, other: &Self) -> Ordering {
        let rerank = match (self.rerank_score, other.rerank_score) {
            (Some(a), Some(b)) => b.total_cmp(&a),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        };
        rerank
            .then_with(|| other.fused_score.total_cmp(&self.fused_score))
            .then_with(|| self.chunk_id.cmp(&other.chunk_id))
    }
}

pub fn sort_results(results: &mut [RetrievalResult]) {
    results.sort_by(RetrievalResult::rank_cmp);
}

/// Which path produced the evidence for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetrievalPath {
    Adaptive,
    Fallback,
}

impl RetrievalPath {
    pub fn as_str(&self) -> &'static str {
        match self {
            RetrievalPath::Adaptive => "adaptive",
            RetrievalPath::Fallback => "fallback",
        }
    }
}
