//! # Hybrid Retriever
//!
//! Dense cosine top-`m` and BM25 top-`m` candidates merged with Reciprocal
//! Rank Fusion: `score = 1/(c + rank_dense) + 1/(c + rank_sparse)`, ranks
//! starting at 1, an absent rank contributing 0. Chunks without an
//! embedding therefore compete on the lexical term alone.

use std::collections::HashMap;
use std::sync::Arc;

use crate::ai::Embedder;
use crate::config::RetrievalConfig;
use crate::index::{Bm25Params, IndexView};
use crate::store::text::tokenize;

use super::{sort_results, Query, RetrievalResult};

/// A query with its embedding computed once, reusable across rounds.
#[derive(Debug, Clone)]
pub struct PreparedQuery {
    pub text: String,
    pub terms: Vec<String>,
    pub vector: Option<Vec<f32>>,
    pub ticker: Option<String>,
}

impl PreparedQuery {
    /// No embedding: ranks on the lexical index only.
    pub fn lexical(query: &Query) -> Self {
        let text = query.text();
        Self {
            terms: tokenize(&text).collect(),
            text,
            vector: None,
            ticker: query.ticker_filter().map(str::to_string),
        }
    }
}

pub struct HybridRetriever {
    embedder: Arc<dyn Embedder>,
    rrf_k: f32,
    candidate_multiplier: usize,
    bm25: Bm25Params,
}

impl HybridRetriever {
    pub fn new(embedder: Arc<dyn Embedder>, cfg: &RetrievalConfig) -> Self {
        Self {
            embedder,
            rrf_k: cfg.rrf_k,
            candidate_multiplier: cfg.candidate_multiplier,
            bm25: Bm25Params {
                k1: cfg.bm25_k1,
                b: cfg.bm25_b,
            },
        }
    }

    /// Embed the query text. Failure degrades to lexical-only ranking.
    pub async fn prepare(&self, query: &Query) -> PreparedQuery {
        let mut prepared = PreparedQuery::lexical(query);
        match self.embedder.embed(std::slice::from_ref(&prepared.text)).await {
            Ok(mut v) if v.len() == 1 => prepared.vector = v.pop(),
            Ok(_) => {
                tracing::warn!(target: "retrieval", "query embedding returned wrong arity, lexical only");
            }
            Err(e) => {
                tracing::warn!(target: "retrieval", error = %e, "query embedding failed, lexical only");
            }
        }
        prepared
    }

    /// Rank against a fixed snapshot. Pure: same view and query, same output.
    pub fn rank(&self, view: &IndexView, q: &PreparedQuery, k: usize) -> Vec<RetrievalResult> {
        if k == 0 || view.is_empty() {
            return Vec::new();
        }
        let m = k.saturating_mul(self.candidate_multiplier).max(k);
        let ticker = q.ticker.as_deref();

        let dense = match &q.vector {
            Some(v) => view.dense_top(v, m, ticker),
            None => Vec::new(),
        };
        let sparse = view.lexical_top(&q.terms, m, self.bm25, ticker);

        let mut fused: HashMap<usize, RetrievalResult> = HashMap::new();
        for (rank0, (slot, score)) in dense.iter().enumerate() {
            let r = fused.entry(*slot).or_insert_with(|| result_for(view, *slot));
            r.dense_score = *score;
            r.fused_score += rrf(self.rrf_k, rank0 + 1);
        }
        for (rank0, (slot, score)) in sparse.iter().enumerate() {
            let r = fused.entry(*slot).or_insert_with(|| result_for(view, *slot));
            r.sparse_score = *score;
            r.fused_score += rrf(self.rrf_k, rank0 + 1);
        }

        let mut out: Vec<RetrievalResult> = fused.into_values().collect();
        sort_results(&mut out);
        out.truncate(k);
        out
    }

    pub async fn retrieve(&self, view: &IndexView, query: &Query, k: usize) -> Vec<RetrievalResult> {
        let q = self.prepare(query).await;
        self.rank(view, &q, k)
    }
}

fn rrf(c: f32, rank: usize) -> f32 {
    1.0 / (c + rank as f32)
}

fn result_for(view: &IndexView, slot: usize) -> RetrievalResult {
    let e = view.entry(slot);
    RetrievalResult::new(&e.chunk.chunk_id, &e.chunk.document_id, &e.chunk.text)
}
