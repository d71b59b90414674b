//! tracker.rs — freshness and latency bookkeeping.
//!
//! Everything recorded here is also mirrored into the `metrics` facade so the
//! Prometheus exporter sees it. The tracker is owned by the service; callers
//! only read `stats()`.

use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use serde::Serialize;

use crate::retrieval::RetrievalPath;

/// One-time metrics registration (so series show up on /metrics).
pub fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("ingest_documents_total", "Documents accepted into the store.");
        describe_counter!(
            "ingest_rejected_total",
            "Documents rejected at ingestion, labelled by reason."
        );
        describe_counter!("ingest_chunks_total", "Chunks produced by accepted documents.");
        describe_histogram!(
            "index_freshness_ms",
            "Time from document acceptance until it is visible to snapshots."
        );
        describe_gauge!("index_documents", "Documents currently held by the store.");
        describe_gauge!("index_chunks", "Chunks currently visible in the index.");
        describe_histogram!("retrieval_iterations", "Retrieval calls per adaptive run.");
        describe_counter!(
            "retrieval_fallback_total",
            "Requests served by the timeout fallback path."
        );
        describe_counter!(
            "retrieval_judge_failures_total",
            "Sufficiency judge errors treated as insufficient."
        );
        describe_counter!("rerank_skipped_total", "Rerank calls that kept input order.");
        describe_counter!(
            "agent_degraded_total",
            "Agent signals replaced by a neutral degraded signal."
        );
        describe_histogram!("recommend_latency_ms", "End-to-end recommendation latency.");
        describe_counter!("recommend_requests_total", "Recommendations served, by path.");
        describe_counter!("recommend_cache_hits_total", "Recommendation cache hits.");
        describe_counter!("recommend_cache_misses_total", "Recommendation cache misses.");
        describe_counter!(
            "ingest_provider_errors_total",
            "Source provider fetch errors and timeouts."
        );
        describe_gauge!(
            "ingest_pipeline_last_run_ts",
            "Unix ts when the ingest pipeline last ran."
        );
        describe_counter!("ingest_runs_total", "Completed poller passes.");
        describe_histogram!("ingest_fetch_ms", "Provider fetch duration in milliseconds.");
        describe_counter!(
            "index_lexical_only_chunks_total",
            "Chunks indexed without an embedding."
        );
    });
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TrackerStats {
    pub document_count: u64,
    pub chunk_count: u64,
    pub rejected_count: u64,
    pub last_ingest_latency_ms: Option<f64>,
    pub avg_ingest_latency_ms: Option<f64>,
    pub adaptive_requests: u64,
    pub fallback_requests: u64,
    pub last_request_latency_ms: Option<f64>,
}

#[derive(Debug, Default)]
struct State {
    stats: TrackerStats,
    ingest_latency_sum_ms: f64,
}

#[derive(Debug, Default)]
pub struct FreshnessTracker {
    state: Mutex<State>,
}

impl FreshnessTracker {
    pub fn new() -> Self {
        ensure_metrics_described();
        Self::default()
    }

    /// An accepted document became visible `latency` after acceptance.
    pub fn record_ingest(&self, chunks: usize, latency: Duration) {
        let ms = latency.as_micros() as f64 / 1000.0;
        let mut st = self.state.lock();
        st.stats.document_count += 1;
        st.stats.chunk_count += chunks as u64;
        st.ingest_latency_sum_ms += ms;
        st.stats.last_ingest_latency_ms = Some(ms);
        st.stats.avg_ingest_latency_ms = Some(st.ingest_latency_sum_ms / st.stats.document_count as f64);
        let docs = st.stats.document_count;
        drop(st);

        counter!("ingest_documents_total").increment(1);
        counter!("ingest_chunks_total").increment(chunks as u64);
        histogram!("index_freshness_ms").record(ms);
        gauge!("index_documents").set(docs as f64);
    }

    pub fn record_rejected(&self, reason: &'static str) {
        self.state.lock().stats.rejected_count += 1;
        counter!("ingest_rejected_total", "reason" => reason).increment(1);
    }

    /// Documents removed by retention.
    pub fn record_evicted(&self, documents: usize, chunks: usize) {
        let mut st = self.state.lock();
        st.stats.document_count = st.stats.document_count.saturating_sub(documents as u64);
        st.stats.chunk_count = st.stats.chunk_count.saturating_sub(chunks as u64);
        gauge!("index_documents").set(st.stats.document_count as f64);
    }

    pub fn record_request(&self, path: RetrievalPath, latency: Duration) {
        let ms = latency.as_micros() as f64 / 1000.0;
        {
            let mut st = self.state.lock();
            match path {
                RetrievalPath::Adaptive => st.stats.adaptive_requests += 1,
                RetrievalPath::Fallback => st.stats.fallback_requests += 1,
            }
            st.stats.last_request_latency_ms = Some(ms);
        }
        histogram!("recommend_latency_ms").record(ms);
        counter!("recommend_requests_total", "path" => path.as_str()).increment(1);
    }

    pub fn stats(&self) -> TrackerStats {
        self.state.lock().stats.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ingest_latency_is_averaged() {
        let t = FreshnessTracker::new();
        t.record_ingest(2, Duration::from_millis(10));
        t.record_ingest(3, Duration::from_millis(30));
        let s = t.stats();
        assert_eq!(s.document_count, 2);
        assert_eq!(s.chunk_count, 5);
        assert_eq!(s.last_ingest_latency_ms, Some(30.0));
        assert_eq!(s.avg_ingest_latency_ms, Some(20.0));
    }

    #[test]
    fn requests_are_split_by_path() {
        let t = FreshnessTracker::new();
        t.record_request(RetrievalPath::Adaptive, Duration::from_millis(5));
        t.record_request(RetrievalPath::Fallback, Duration::from_millis(7));
        t.record_request(RetrievalPath::Adaptive, Duration::from_millis(9));
        let s = t.stats();
        assert_eq!(s.adaptive_requests, 2);
        assert_eq!(s.fallback_requests, 1);
        assert_eq!(s.last_request_latency_ms, Some(9.0));
    }

    #[test]
    fn eviction_never_underflows() {
        let t = FreshnessTracker::new();
        t.record_ingest(1, Duration::ZERO);
        t.record_evicted(5, 5);
        assert_eq!(t.stats().document_count, 0);
        assert_eq!(t.stats().chunk_count, 0);
    }
}
