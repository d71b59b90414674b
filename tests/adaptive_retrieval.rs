// tests/adaptive_retrieval.rs
//
// Escalation schedule, the iteration cap, and the timeout fallback, driven
// through the service with scripted sufficiency judges.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use alphastream::ai::{Capabilities, Sufficiency, SufficiencyJudge};
use alphastream::config::AppConfig;
use alphastream::retrieval::{RetrievalPath, RetrievalResult};
use alphastream::{AlphaError, RawDocument};

#[derive(Default)]
struct NeverEnough {
    calls: AtomicUsize,
}

#[async_trait]
impl SufficiencyJudge for NeverEnough {
    async fn judge(&self, _q: &str, _p: &[RetrievalResult]) -> Result<Sufficiency, AlphaError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Sufficiency::no("need more"))
    }
    fn name(&self) -> &'static str {
        "never-enough"
    }
}

/// Never answers within any sane budget.
struct Stalled;

#[async_trait]
impl SufficiencyJudge for Stalled {
    async fn judge(&self, _q: &str, _p: &[RetrievalResult]) -> Result<Sufficiency, AlphaError> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(Sufficiency::yes("too late"))
    }
    fn name(&self) -> &'static str {
        "stalled"
    }
}

fn with_judge(judge: Arc<dyn SufficiencyJudge>) -> Capabilities {
    Capabilities {
        sufficiency: judge,
        ..Capabilities::local()
    }
}

#[tokio::test]
async fn escalation_stops_at_max_iterations() {
    let judge = Arc::new(NeverEnough::default());
    let svc = common::builder(AppConfig::default())
        .capabilities(with_judge(judge.clone()))
        .build();
    svc.start();
    for d in common::filler_docs() {
        svc.ingest(d).await.unwrap();
    }

    let rec = svc.recommend("AAPL", None).await.unwrap().recommendation;
    assert_eq!(rec.retrieval_path, RetrievalPath::Adaptive);
    assert_eq!(rec.retrieval.k_schedule, vec![2, 4, 8, 16]);
    assert_eq!(rec.retrieval.iterations, 4);
    assert!(!rec.retrieval.sufficient);
    // The judge is not consulted on the capped round.
    assert_eq!(judge.calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn schedule_follows_configured_factor() {
    let mut cfg = AppConfig::default();
    cfg.adaptive.initial_k = 3;
    cfg.adaptive.factor = 3;
    cfg.adaptive.max_iterations = 3;

    let judge = Arc::new(NeverEnough::default());
    let svc = common::builder(cfg)
        .capabilities(with_judge(judge.clone()))
        .build();
    svc.start();
    svc.ingest(common::lawsuit_doc()).await.unwrap();

    let rec = svc.recommend("AAPL", Some("lawsuit")).await.unwrap().recommendation;
    let ks = &rec.retrieval.k_schedule;
    assert_eq!(ks, &vec![3, 9, 27]);
    assert!(ks.windows(2).all(|w| w[1] == w[0] * 3));
    assert_eq!(judge.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn sufficient_first_round_stops_early() {
    let svc = common::started(AppConfig::default());
    for d in common::filler_docs() {
        svc.ingest(d).await.unwrap();
    }
    let rec = svc.recommend("AAPL", None).await.unwrap().recommendation;
    assert!(rec.retrieval.sufficient);
    assert_eq!(rec.retrieval.k_schedule, vec![2]);
}

#[tokio::test]
async fn off_topic_evidence_escalates_to_the_cap() {
    let svc = common::started(AppConfig::default());
    for d in common::filler_docs() {
        svc.ingest(d).await.unwrap();
    }
    let rec = svc.recommend("AAPL", Some("lawsuit")).await.unwrap().recommendation;
    assert_eq!(rec.retrieval_path, RetrievalPath::Adaptive);
    assert_eq!(rec.retrieval.k_schedule, vec![2, 4, 8, 16]);
    assert!(!rec.retrieval.sufficient);
    assert!(rec
        .retrieval
        .results
        .iter()
        .all(|r| !r.text.to_lowercase().contains("lawsuit")));
}

#[tokio::test]
async fn on_topic_evidence_stops_escalation() {
    let svc = common::started(AppConfig::default());
    for d in common::filler_docs() {
        svc.ingest(d).await.unwrap();
    }
    svc.ingest(common::lawsuit_doc()).await.unwrap();
    svc.ingest(RawDocument::new(
        "Second lawsuit targets Apple",
        "Another lawsuit names Apple over battery claims in federal court.",
    ))
    .await
    .unwrap();

    let rec = svc.recommend("AAPL", Some("lawsuit")).await.unwrap().recommendation;
    assert!(rec.retrieval.sufficient, "{:?}", rec.retrieval.judge_reasons);
    assert_eq!(rec.retrieval.k_schedule, vec![2]);
    assert!(rec
        .retrieval
        .results
        .iter()
        .all(|r| r.text.to_lowercase().contains("lawsuit")));
}

#[tokio::test(start_paused = true)]
async fn stalled_judge_falls_back_within_the_deadline() {
    let cfg = AppConfig::default();
    let deadline_ms = cfg.agents.request_deadline_ms;
    let fallback_k = cfg.adaptive.fallback_k;
    let svc = common::builder(cfg)
        .capabilities(with_judge(Arc::new(Stalled)))
        .build();
    svc.start();
    for d in common::filler_docs() {
        svc.ingest(d).await.unwrap();
    }

    let rec = svc.recommend("AAPL", None).await.unwrap().recommendation;
    assert_eq!(rec.retrieval_path, RetrievalPath::Fallback);
    assert_eq!(rec.retrieval.k_schedule, vec![fallback_k]);
    assert!(!rec.retrieval.results.is_empty());
    assert!(rec.latency_ms <= deadline_ms, "{}ms", rec.latency_ms);
    assert_eq!(svc.status().tracker.fallback_requests, 1);
}

#[tokio::test(start_paused = true)]
async fn fallback_reads_the_freshest_snapshot() {
    let svc = common::builder(AppConfig::default())
        .capabilities(with_judge(Arc::new(Stalled)))
        .build();
    svc.start();
    for d in common::filler_docs() {
        svc.ingest(d).await.unwrap();
    }

    let pending = {
        let svc = svc.clone();
        tokio::spawn(async move { svc.recommend("AAPL", Some("lawsuit")).await })
    };
    // Let the request start escalating, then publish the article mid-flight.
    tokio::time::sleep(Duration::from_millis(100)).await;
    let receipt = svc.ingest(common::lawsuit_doc()).await.unwrap();

    let rec = pending.await.unwrap().unwrap().recommendation;
    assert_eq!(rec.retrieval_path, RetrievalPath::Fallback);
    assert_eq!(rec.index_version, receipt.index_version);
    assert!(rec
        .retrieval
        .results
        .iter()
        .any(|r| r.text.to_lowercase().contains("lawsuit")));
}
