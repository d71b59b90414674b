// tests/ingest_pipeline.rs
//
// Multi-source fan-out: one bad or slow source never blocks the others,
// and the poller feeds the index on its own.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;

use alphastream::config::AppConfig;
use alphastream::ingest::types::SourceProvider;
use alphastream::ingest::{run_once, DirectoryProvider};
use alphastream::RawDocument;

struct MockProvider(Vec<RawDocument>);

#[async_trait]
impl SourceProvider for MockProvider {
    async fn fetch_latest(&self) -> Result<Vec<RawDocument>> {
        Ok(self.0.clone())
    }
    fn name(&self) -> &'static str {
        "mock"
    }
}

struct BrokenProvider;

#[async_trait]
impl SourceProvider for BrokenProvider {
    async fn fetch_latest(&self) -> Result<Vec<RawDocument>> {
        anyhow::bail!("upstream 502")
    }
    fn name(&self) -> &'static str {
        "broken"
    }
}

struct SlowProvider;

#[async_trait]
impl SourceProvider for SlowProvider {
    async fn fetch_latest(&self) -> Result<Vec<RawDocument>> {
        tokio::time::sleep(Duration::from_secs(600)).await;
        Ok(vec![RawDocument::new("Too late", "This never arrives.")])
    }
    fn name(&self) -> &'static str {
        "slow"
    }
}

#[derive(Default)]
struct CountingProvider {
    calls: AtomicUsize,
}

#[async_trait]
impl SourceProvider for CountingProvider {
    async fn fetch_latest(&self) -> Result<Vec<RawDocument>> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(vec![RawDocument::new(
            format!("Intel wire item {n}"),
            format!("Intel filed routine disclosure number {n}."),
        )])
    }
    fn name(&self) -> &'static str {
        "counting"
    }
}

#[tokio::test(start_paused = true)]
async fn failing_and_slow_sources_are_isolated() {
    let svc = common::started(AppConfig::default());
    let providers: Vec<Arc<dyn SourceProvider>> = vec![
        Arc::new(BrokenProvider),
        Arc::new(SlowProvider),
        Arc::new(MockProvider(common::filler_docs())),
    ];

    let stats = run_once(&svc, &providers, 3, Duration::from_secs(2)).await;
    assert_eq!(stats.failed_sources, 2);
    assert_eq!(stats.fetched, common::filler_docs().len());
    assert_eq!(stats.accepted, common::filler_docs().len());
    assert_eq!(svc.status().document_count, common::filler_docs().len());
}

#[tokio::test]
async fn overlapping_sources_deduplicate() {
    let svc = common::started(AppConfig::default());
    let providers: Vec<Arc<dyn SourceProvider>> = vec![
        Arc::new(MockProvider(vec![common::lawsuit_doc()])),
        Arc::new(MockProvider(vec![common::lawsuit_doc(), common::bearish_doc()])),
    ];

    // A single worker serializes the providers, so exactly one copy wins.
    let stats = run_once(&svc, &providers, 1, Duration::from_secs(5)).await;
    assert_eq!(stats.fetched, 3);
    assert_eq!(stats.accepted, 2);
    assert_eq!(stats.rejected, 1);
    assert_eq!(svc.status().document_count, 2);
}

#[tokio::test]
async fn directory_drop_folder_is_ingested_once() {
    let dir = tempfile::tempdir().expect("tempdir");
    std::fs::write(
        dir.path().join("apple.json"),
        r#"{"title":"Apple Faces Lawsuit","content":"Major legal trouble for Apple.","tickers":["AAPL"]}"#,
    )
    .unwrap();
    std::fs::write(
        dir.path().join("batch.json"),
        r#"[{"title":"Microsoft beats","content":"Microsoft beats estimates."},
            {"title":"Tesla recall","content":"Tesla recalls vehicles."}]"#,
    )
    .unwrap();
    std::fs::write(dir.path().join("broken.json"), "{ not json").unwrap();
    std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

    let svc = common::started(AppConfig::default());
    let providers: Vec<Arc<dyn SourceProvider>> = vec![Arc::new(DirectoryProvider::new(dir.path()))];

    let first = run_once(&svc, &providers, 2, Duration::from_secs(5)).await;
    assert_eq!(first.accepted, 3);
    assert_eq!(first.failed_sources, 0);

    let second = run_once(&svc, &providers, 2, Duration::from_secs(5)).await;
    assert_eq!(second.fetched, 0, "unchanged files are not re-read");

    let docs = svc.articles("AAPL", 10).unwrap();
    assert_eq!(docs.len(), 1);
    assert_eq!(docs[0].source, "directory");
}

#[tokio::test(start_paused = true)]
async fn poller_runs_until_stopped() {
    let mut cfg = AppConfig::default();
    cfg.ingest.poll_interval_secs = 60;
    let counter = Arc::new(CountingProvider::default());
    let svc = common::builder(cfg).provider(counter.clone()).build();
    svc.start();

    // First pass is immediate, then one per interval.
    tokio::time::sleep(Duration::from_secs(125)).await;
    svc.stop().await;
    let calls = counter.calls.load(Ordering::SeqCst);
    assert_eq!(calls, 3);
    assert_eq!(svc.status().document_count, 3);

    tokio::time::sleep(Duration::from_secs(600)).await;
    assert_eq!(counter.calls.load(Ordering::SeqCst), calls);
}
