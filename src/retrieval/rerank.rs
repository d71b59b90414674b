// src/retrieval/rerank.rs
//! Reranking: pointwise relevance from a judge, then near-duplicate decay.
//!
//! - Each passage gets `rerank_score` from the relevance judge.
//! - Walking the new order, a passage that is *nearly identical* to one
//!   ranked above it gets its score multiplied by `duplicate_decay`
//!   (default 0.7) so syndicated copies of one story sink.
//! - The output is a permutation of the input: nothing is dropped. On judge
//!   failure or timeout the input order is returned untouched.
//!
//! Similarity: `strsim::normalized_levenshtein` (returns f64 -> cast to f32).

use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use strsim::normalized_levenshtein;
use tokio::time::Instant;

use crate::ai::RelevanceJudge;
use crate::config::RerankConfig;

use super::{sort_results, RetrievalResult};

pub struct Reranker {
    judge: Arc<dyn RelevanceJudge>,
    cfg: RerankConfig,
}

impl Reranker {
    pub fn new(judge: Arc<dyn RelevanceJudge>, cfg: RerankConfig) -> Self {
        Self { judge, cfg }
    }

    pub async fn rerank(&self, query: &str, results: Vec<RetrievalResult>) -> Vec<RetrievalResult> {
        let deadline = Instant::now() + Duration::from_millis(self.cfg.timeout_ms);
        self.rerank_until(query, results, deadline).await
    }

    /// Rerank with the judge cut off at the configured timeout or
    /// `deadline`, whichever comes first.
    pub async fn rerank_until(
        &self,
        query: &str,
        results: Vec<RetrievalResult>,
        deadline: Instant,
    ) -> Vec<RetrievalResult> {
        if !self.cfg.enabled || results.len() < 2 {
            return results;
        }

        let deadline = deadline.min(Instant::now() + Duration::from_millis(self.cfg.timeout_ms));
        let scores = match tokio::time::timeout_at(deadline, self.judge.score(query, &results)).await {
            Ok(Ok(s)) if s.len() == results.len() => s,
            Ok(Ok(s)) => {
                self.keep_order("arity", &format!("{} scores for {} passages", s.len(), results.len()));
                return results;
            }
            Ok(Err(e)) => {
                self.keep_order("error", &e.to_string());
                return results;
            }
            Err(_) => {
                self.keep_order("timeout", "deadline reached");
                return results;
            }
        };

        let mut out = results;
        for (r, s) in out.iter_mut().zip(scores) {
            r.rerank_score = Some(s);
        }
        sort_results(&mut out);
        decay_near_duplicates(&mut out, self.cfg.similarity_threshold, self.cfg.duplicate_decay);
        sort_results(&mut out);
        out
    }

    fn keep_order(&self, cause: &'static str, detail: &str) {
        counter!("rerank_skipped_total", "cause" => cause).increment(1);
        tracing::warn!(target: "retrieval", judge = self.judge.name(), cause, detail, "rerank skipped, keeping input order");
    }
}

/// Decay every passage that is near-identical to one ranked above it.
/// Expects `items` sorted; only touches `rerank_score`.
pub fn decay_near_duplicates(items: &mut [RetrievalResult], similarity_threshold: f32, duplicate_decay: f32) {
    let lowered: Vec<String> = items.iter().map(|r| r.text.to_lowercase()).collect();
    for i in 1..items.len() {
        let dup = (0..i).any(|j| normalized_levenshtein(&lowered[i], &lowered[j]) as f32 >= similarity_threshold);
        if dup {
            if let Some(s) = items[i].rerank_score.as_mut() {
                *s *= duplicate_decay;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AlphaError;
    use async_trait::async_trait;

    struct Fixed(Vec<f32>);

    #[async_trait]
    impl RelevanceJudge for Fixed {
        async fn score(&self, _q: &str, _p: &[RetrievalResult]) -> Result<Vec<f32>, AlphaError> {
            Ok(self.0.clone())
        }
        fn name(&self) -> &'static str {
            "fixed"
        }
    }

    struct Slow;

    #[async_trait]
    impl RelevanceJudge for Slow {
        async fn score(&self, _q: &str, p: &[RetrievalResult]) -> Result<Vec<f32>, AlphaError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(vec![1.0; p.len()])
        }
        fn name(&self) -> &'static str {
            "slow"
        }
    }

    fn r(id: &str, text: &str, fused: f32) -> RetrievalResult {
        let mut x = RetrievalResult::new(id, id, text);
        x.fused_score = fused;
        x
    }

    fn input() -> Vec<RetrievalResult> {
        vec![
            r("a", "Apple sued over battery claims", 0.03),
            r("b", "Apple earnings beat estimates", 0.02),
            r("c", "Apple sued over battery claim", 0.01),
        ]
    }

    #[tokio::test]
    async fn reorders_without_dropping() {
        let rr = Reranker::new(Arc::new(Fixed(vec![0.2, 0.9, 0.5])), RerankConfig::default());
        let out = rr.rerank("AAPL", input()).await;
        let ids: Vec<_> = out.iter().map(|x| x.chunk_id.as_str()).collect();
        assert_eq!(ids, vec!["b", "c", "a"]);
    }

    #[tokio::test]
    async fn near_duplicates_are_demoted() {
        let rr = Reranker::new(Arc::new(Fixed(vec![0.9, 0.1, 0.85])), RerankConfig::default());
        let out = rr.rerank("AAPL", input()).await;
        let ids: Vec<_> = out.iter().map(|x| x.chunk_id.as_str()).collect();
        // "c" copies "a": 0.85 * 0.7 < 0.9 but still above "b"
        assert_eq!(ids, vec!["a", "c", "b"]);
        assert!((out[1].rerank_score.unwrap() - 0.85 * 0.7).abs() < 1e-6);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_keeps_input_order() {
        let rr = Reranker::new(Arc::new(Slow), RerankConfig::default());
        let out = rr.rerank("AAPL", input()).await;
        assert_eq!(out, input());
    }

    #[tokio::test(start_paused = true)]
    async fn request_deadline_cuts_the_judge_short() {
        let mut cfg = RerankConfig::default();
        cfg.timeout_ms = 10_000;
        let rr = Reranker::new(Arc::new(Slow), cfg);
        let started = Instant::now();
        let out = rr
            .rerank_until("AAPL", input(), started + Duration::from_millis(100))
            .await;
        assert_eq!(out, input());
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn wrong_arity_keeps_input_order() {
        let rr = Reranker::new(Arc::new(Fixed(vec![1.0])), RerankConfig::default());
        assert_eq!(rr.rerank("AAPL", input()).await, input());
    }
}
