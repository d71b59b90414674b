//! # Adaptive Retrieval Controller
//!
//! ```text
//! START ──► EVALUATE ──► DONE
//!              │  ▲
//!              ▼  │
//!            EXPAND          (any state) ──budget──► TIMEOUT_FALLBACK
//! ```
//!
//! Starts at `k = initial_k`, asks the sufficiency judge, and multiplies `k`
//! by `factor` until the judge is satisfied or `max_iterations` retrieval
//! calls have been made. A judge error counts as "insufficient". If the
//! wall-clock budget runs out at any point, one fixed-`k` retrieval runs
//! against the freshest snapshot with no judge involved.

use std::sync::Arc;
use std::time::Duration;

use metrics::{counter, histogram};
use serde::Serialize;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::ai::SufficiencyJudge;
use crate::config::AdaptiveConfig;
use crate::error::AlphaError;
use crate::index::Indexer;

use super::{HybridRetriever, PreparedQuery, Query, RetrievalPath, RetrievalResult};

#[derive(Debug, Clone, Serialize)]
pub struct AdaptiveOutcome {
    #[serde(skip)]
    pub results: Vec<RetrievalResult>,
    pub path: RetrievalPath,
    /// `k` used by each retrieval call, in order.
    pub k_schedule: Vec<usize>,
    pub iterations: usize,
    pub sufficient: bool,
    pub judge_reasons: Vec<String>,
    /// Index version of the snapshot the results came from.
    pub index_version: u64,
}

pub struct AdaptiveController {
    retriever: Arc<HybridRetriever>,
    judge: Arc<dyn SufficiencyJudge>,
    cfg: AdaptiveConfig,
}

impl AdaptiveController {
    pub fn new(retriever: Arc<HybridRetriever>, judge: Arc<dyn SufficiencyJudge>, cfg: AdaptiveConfig) -> Self {
        Self { retriever, judge, cfg }
    }

    pub fn budget(&self) -> Duration {
        Duration::from_millis(self.cfg.budget_ms)
    }

    /// Run the state machine. Only cancellation is an error.
    pub async fn run(
        &self,
        indexer: &Indexer,
        query: &Query,
        cancel: &CancellationToken,
    ) -> Result<AdaptiveOutcome, AlphaError> {
        self.run_until(indexer, query, cancel, Instant::now() + self.budget())
            .await
    }

    /// Like [`run`](Self::run), with escalation also cut off at `deadline`
    /// (the caller's request deadline) when that comes first.
    pub async fn run_until(
        &self,
        indexer: &Indexer,
        query: &Query,
        cancel: &CancellationToken,
        deadline: Instant,
    ) -> Result<AdaptiveOutcome, AlphaError> {
        let deadline = deadline.min(Instant::now() + self.budget());

        let work = async {
            // Embedding is part of the budget; a hung embedder falls back
            // to a lexical-only query.
            let prepared = match tokio::time::timeout_at(deadline, self.retriever.prepare(query)).await {
                Ok(p) => p,
                Err(_) => return Err(PreparedQuery::lexical(query)),
            };
            match tokio::time::timeout_at(deadline, self.escalate(indexer, &prepared)).await {
                Ok(outcome) => Ok(outcome),
                Err(_) => Err(prepared),
            }
        };

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(AlphaError::Superseded(query.ticker.clone())),
            r = work => match r {
                Ok(outcome) => outcome,
                Err(prepared) => self.fallback(indexer, &prepared),
            },
        };

        histogram!("retrieval_iterations").record(outcome.iterations as f64);
        Ok(outcome)
    }

    async fn escalate(&self, indexer: &Indexer, q: &PreparedQuery) -> AdaptiveOutcome {
        let snapshot = indexer.snapshot();
        let mut k = self.cfg.initial_k;
        let mut k_schedule = Vec::new();
        let mut judge_reasons = Vec::new();

        loop {
            // START / EXPAND
            let results = self.retriever.rank(&snapshot, q, k);
            k_schedule.push(k);
            let iterations = k_schedule.len();

            // DONE on the cap; the judge would not change the outcome.
            if iterations >= self.cfg.max_iterations {
                tracing::debug!(target: "retrieval", k, iterations, "escalation cap reached");
                return AdaptiveOutcome {
                    results,
                    path: RetrievalPath::Adaptive,
                    k_schedule,
                    iterations,
                    sufficient: false,
                    judge_reasons,
                    index_version: snapshot.version(),
                };
            }

            // EVALUATE
            let verdict = match self.judge.judge(&q.text, &results).await {
                Ok(v) => v,
                Err(e) => {
                    counter!("retrieval_judge_failures_total").increment(1);
                    tracing::warn!(target: "retrieval", judge = self.judge.name(), error = %e, "judge failed, treating as insufficient");
                    crate::ai::Sufficiency::no(e.to_string())
                }
            };
            if let Some(reason) = verdict.reason.clone() {
                judge_reasons.push(reason);
            }
            if verdict.sufficient {
                return AdaptiveOutcome {
                    results,
                    path: RetrievalPath::Adaptive,
                    k_schedule,
                    iterations,
                    sufficient: true,
                    judge_reasons,
                    index_version: snapshot.version(),
                };
            }

            k = k.saturating_mul(self.cfg.factor);
        }
    }

    /// TIMEOUT_FALLBACK: freshest snapshot, fixed `k`, no judge.
    fn fallback(&self, indexer: &Indexer, q: &PreparedQuery) -> AdaptiveOutcome {
        let snapshot = indexer.snapshot();
        let k = self.cfg.fallback_k;
        let results = self.retriever.rank(&snapshot, q, k);
        counter!("retrieval_fallback_total").increment(1);
        tracing::warn!(
            target: "retrieval",
            budget_ms = self.cfg.budget_ms,
            k,
            results = results.len(),
            "adaptive budget exceeded, manual fallback"
        );
        AdaptiveOutcome {
            results,
            path: RetrievalPath::Fallback,
            k_schedule: vec![k],
            iterations: 1,
            sufficient: false,
            judge_reasons: vec![AlphaError::RetrievalTimeout(self.budget()).to_string()],
            index_version: snapshot.version(),
        }
    }
}
