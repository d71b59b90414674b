// src/ingest/mod.rs
//! Ingestion from external connectors.
//!
//! One pass fans out over every provider with at most `workers` fetching at
//! once. Each provider gets its own timeout; a provider that errors, hangs or
//! panics is counted and logged, and the others carry on.

pub mod providers;
pub mod scheduler;
pub mod types;

use std::sync::Arc;
use std::time::Duration;

use metrics::{counter, gauge, histogram};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::error::AlphaError;
use crate::ingest::types::{RunStats, SourceProvider};
use crate::service::{IngestStatus, SignalService};

pub use providers::DirectoryProvider;

/// Run every provider once and ingest what they return.
pub async fn run_once(
    service: &Arc<SignalService>,
    providers: &[Arc<dyn SourceProvider>],
    workers: usize,
    source_timeout: Duration,
) -> RunStats {
    crate::tracker::ensure_metrics_described();

    let permits = Arc::new(Semaphore::new(workers.max(1)));
    let mut set = JoinSet::new();
    for p in providers {
        let p = p.clone();
        let svc = service.clone();
        let permits = permits.clone();
        set.spawn(async move {
            let Ok(_permit) = permits.acquire_owned().await else {
                return RunStats::default();
            };
            ingest_source(&svc, p.as_ref(), source_timeout).await
        });
    }

    let mut total = RunStats::default();
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok(stats) => total.merge(&stats),
            Err(e) => {
                total.failed_sources += 1;
                counter!("ingest_provider_errors_total", "provider" => "panicked").increment(1);
                tracing::error!(target: "ingest", error = %e, "provider task failed");
            }
        }
    }

    gauge!("ingest_pipeline_last_run_ts").set(chrono::Utc::now().timestamp().max(0) as f64);
    tracing::info!(
        target: "ingest",
        fetched = total.fetched,
        accepted = total.accepted,
        rejected = total.rejected,
        failed_sources = total.failed_sources,
        "ingest pass finished"
    );
    total
}

async fn ingest_source(service: &SignalService, p: &dyn SourceProvider, timeout: Duration) -> RunStats {
    let mut stats = RunStats::default();
    let t0 = std::time::Instant::now();
    let docs = match tokio::time::timeout(timeout, p.fetch_latest()).await {
        Ok(Ok(docs)) => docs,
        Ok(Err(e)) => {
            stats.failed_sources = 1;
            counter!("ingest_provider_errors_total", "provider" => p.name()).increment(1);
            tracing::warn!(target: "ingest", provider = p.name(), error = ?e, "provider error");
            return stats;
        }
        Err(_) => {
            stats.failed_sources = 1;
            counter!("ingest_provider_errors_total", "provider" => p.name()).increment(1);
            tracing::warn!(target: "ingest", provider = p.name(), timeout_ms = timeout.as_millis() as u64, "provider timed out");
            return stats;
        }
    };
    histogram!("ingest_fetch_ms", "provider" => p.name()).record(t0.elapsed().as_secs_f64() * 1000.0);

    stats.fetched = docs.len();
    for raw in docs {
        match service.ingest(raw).await {
            Ok(r) if r.status == IngestStatus::Accepted => stats.accepted += 1,
            Ok(_) => stats.rejected += 1,
            Err(AlphaError::IndexUnavailable) => break,
            Err(e) => {
                stats.rejected += 1;
                tracing::warn!(target: "ingest", provider = p.name(), error = %e, "ingest failed");
            }
        }
    }
    stats
}
