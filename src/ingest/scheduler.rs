// src/ingest/scheduler.rs
use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::service::SignalService;

/// Poll every configured provider on a fixed interval until `cancel` fires.
/// The first pass runs immediately.
pub fn spawn_poller(service: Arc<SignalService>, interval: Duration, cancel: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval.max(Duration::from_millis(10)));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }
            let stats = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                s = service.poll_sources() => s,
            };
            counter!("ingest_runs_total").increment(1);
            tracing::debug!(target: "ingest", accepted = stats.accepted, "poll tick");
        }
        tracing::info!(target: "ingest", "poller stopped");
    })
}
