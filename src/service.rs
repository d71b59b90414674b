//! # SignalService
//!
//! Owns the whole pipeline: document store, indexer, adaptive retrieval,
//! reranker, agent orchestrator, tracker, cache, history and event bus.
//! Built once with injected capabilities, then `start()`ed; `stop()` cancels
//! background tasks and in-flight requests. Nothing here is global.
//!
//! Request flow for `recommend`:
//! 1. resolve the ticker, check the cache for the current index version;
//! 2. register as the in-flight request for that ticker (a newer request
//!    cancels this one with `Superseded`);
//! 3. adaptive retrieval and the market snapshot run concurrently;
//! 4. rerank, fan the agents out, fuse;
//! 5. record history, cache, tracker and push a `sentiment_update`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::agents::{AgentContext, Orchestrator, SignalKind};
use crate::ai::Capabilities;
use crate::cache::{CacheKey, RecommendationCache};
use crate::config::AppConfig;
use crate::decision::Recommendation;
use crate::engine::fuse_signals;
use crate::error::{AlphaError, RejectReason};
use crate::events::{EventBus, StreamEvent};
use crate::history::History;
use crate::index::{IndexView, Indexer};
use crate::ingest::scheduler::spawn_poller;
use crate::ingest::types::{RunStats, SourceProvider};
use crate::market::{MarketDataSource, MarketSnapshot, SyntheticMarket};
use crate::retrieval::{AdaptiveController, HybridRetriever, Query, Reranker};
use crate::store::{Document, DocumentStore, RawDocument, TickerExtractor};
use crate::tracker::{FreshnessTracker, TrackerStats};

const RETENTION_SWEEP_EVERY: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IngestStatus {
    Accepted,
    Rejected,
}

/// Result of one `ingest` call; also the `/ingest` response body.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IngestReceipt {
    pub status: IngestStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunks: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lexical_only: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<RejectReason>,
    pub index_version: u64,
}

impl IngestReceipt {
    pub fn is_accepted(&self) -> bool {
        self.status == IngestStatus::Accepted
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CacheStatus {
    Hit,
    Miss,
}

#[derive(Debug, Clone)]
pub struct Recommended {
    pub recommendation: Arc<Recommendation>,
    pub cache: CacheStatus,
}

#[derive(Debug, Clone, Serialize)]
pub struct ServiceStatus {
    pub running: bool,
    pub document_count: usize,
    pub chunk_count: usize,
    pub index_version: u64,
    pub retrieval_ready: bool,
    pub agents_ready: bool,
    pub tracker: TrackerStats,
}

pub struct SignalServiceBuilder {
    config: AppConfig,
    capabilities: Option<Capabilities>,
    market: Option<Arc<dyn MarketDataSource>>,
    providers: Vec<Arc<dyn SourceProvider>>,
    tickers: Option<TickerExtractor>,
    orchestrator: Option<Orchestrator>,
}

impl SignalServiceBuilder {
    pub fn capabilities(mut self, caps: Capabilities) -> Self {
        self.capabilities = Some(caps);
        self
    }

    pub fn market(mut self, market: Arc<dyn MarketDataSource>) -> Self {
        self.market = Some(market);
        self
    }

    pub fn provider(mut self, p: Arc<dyn SourceProvider>) -> Self {
        self.providers.push(p);
        self
    }

    pub fn tickers(mut self, t: TickerExtractor) -> Self {
        self.tickers = Some(t);
        self
    }

    /// Replace the standard agent set.
    pub fn orchestrator(mut self, o: Orchestrator) -> Self {
        self.orchestrator = Some(o);
        self
    }

    pub fn build(self) -> Arc<SignalService> {
        let cfg = self.config;
        let caps = self.capabilities.unwrap_or_else(Capabilities::local);
        let retriever = Arc::new(HybridRetriever::new(caps.embedder.clone(), &cfg.retrieval));
        let orchestrator = self
            .orchestrator
            .unwrap_or_else(|| Orchestrator::standard(&caps, &cfg.agents));

        Arc::new(SignalService {
            store: DocumentStore::new(&cfg.chunking, self.tickers.unwrap_or_default()),
            indexer: Indexer::new(caps.embedder.clone(), &cfg.retrieval),
            adaptive: AdaptiveController::new(retriever, caps.sufficiency.clone(), cfg.adaptive.clone()),
            reranker: Reranker::new(caps.relevance.clone(), cfg.rerank.clone()),
            orchestrator,
            market: self.market.unwrap_or_else(|| Arc::new(SyntheticMarket::default())),
            providers: self.providers,
            tracker: FreshnessTracker::new(),
            history: History::with_capacity(cfg.history.capacity),
            cache: RecommendationCache::new(cfg.history.cache_capacity),
            events: EventBus::new(),
            inflight: Mutex::new(HashMap::new()),
            next_request: AtomicU64::new(1),
            running: AtomicBool::new(false),
            shutdown: Mutex::new(CancellationToken::new()),
            tasks: Mutex::new(Vec::new()),
            config: cfg,
        })
    }
}

pub struct SignalService {
    config: AppConfig,
    store: DocumentStore,
    indexer: Indexer,
    adaptive: AdaptiveController,
    reranker: Reranker,
    orchestrator: Orchestrator,
    market: Arc<dyn MarketDataSource>,
    providers: Vec<Arc<dyn SourceProvider>>,
    tracker: FreshnessTracker,
    history: History,
    cache: RecommendationCache,
    events: EventBus,
    /// ticker → (request id, token) of the request currently allowed to finish
    inflight: Mutex<HashMap<String, (u64, CancellationToken)>>,
    next_request: AtomicU64,
    running: AtomicBool,
    shutdown: Mutex<CancellationToken>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

/// Removes the in-flight registration when a request finishes, unless a
/// newer request already replaced it.
struct InflightGuard<'a> {
    svc: &'a SignalService,
    ticker: String,
    id: u64,
}

impl Drop for InflightGuard<'_> {
    fn drop(&mut self) {
        let mut g = self.svc.inflight.lock();
        if g.get(&self.ticker).map(|(id, _)| *id) == Some(self.id) {
            g.remove(&self.ticker);
        }
    }
}

impl SignalService {
    pub fn builder(config: AppConfig) -> SignalServiceBuilder {
        SignalServiceBuilder {
            config,
            capabilities: None,
            market: None,
            providers: Vec::new(),
            tickers: None,
            orchestrator: None,
        }
    }

    // ---- lifecycle ----

    /// Mark the service ready and spawn the source poller and retention
    /// sweeper. Calling it twice is a no-op.
    pub fn start(self: &Arc<Self>) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }
        let token = CancellationToken::new();
        *self.shutdown.lock() = token.clone();

        let mut tasks = self.tasks.lock();
        if !self.providers.is_empty() {
            let every = Duration::from_secs(self.config.ingest.poll_interval_secs);
            tasks.push(spawn_poller(self.clone(), every, token.child_token()));
        }
        if self.config.retrieval.retention_days.is_some() {
            tasks.push(self.spawn_retention(token.child_token()));
        }
        tracing::info!(
            providers = self.providers.len(),
            market = self.market.name(),
            "signal service started"
        );
    }

    /// Stop background work and cancel in-flight requests. Data is kept; a
    /// later `start()` resumes serving.
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        self.shutdown.lock().cancel();
        for (_, (_, token)) in self.inflight.lock().drain() {
            token.cancel();
        }
        let tasks: Vec<JoinHandle<()>> = self.tasks.lock().drain(..).collect();
        for t in tasks {
            let _ = t.await;
        }
        tracing::info!("signal service stopped");
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn ensure_running(&self) -> Result<(), AlphaError> {
        if self.is_running() {
            Ok(())
        } else {
            Err(AlphaError::IndexUnavailable)
        }
    }

    // ---- ingestion ----

    /// Accept a document and make it visible to the next snapshot before
    /// returning. Duplicates and missing fields are a `Rejected` receipt,
    /// not an error.
    pub async fn ingest(&self, raw: RawDocument) -> Result<IngestReceipt, AlphaError> {
        self.ensure_running()?;
        let started = Instant::now();

        let mut prepared = match self.store.prepare(raw, Utc::now()) {
            Ok(p) => p,
            Err(reason) => return Ok(self.rejected(reason)),
        };
        let lexical_only = self.indexer.embed(&mut prepared).await;
        let texts = prepared.index_texts();
        let (doc, chunks) = match self.store.commit(prepared) {
            Ok(c) => c,
            Err(reason) => return Ok(self.rejected(reason)),
        };
        let receipt = self.indexer.add(&doc, &chunks, &texts);
        let latency = started.elapsed();

        self.tracker.record_ingest(chunks.len(), latency);
        tracing::info!(
            target: "ingest",
            doc = %doc.short_id(),
            source = %doc.source,
            tickers = ?doc.tickers,
            chunks = receipt.chunks,
            lexical_only,
            index_version = receipt.version,
            latency_ms = latency.as_millis() as u64,
            "document indexed"
        );
        self.events.publish(StreamEvent::MetricsUpdate {
            indexing_latency_ms: latency.as_micros() as f64 / 1000.0,
            total_docs: self.store.document_count() as u64,
        });

        Ok(IngestReceipt {
            status: IngestStatus::Accepted,
            document_id: Some(doc.id.clone()),
            chunks: Some(receipt.chunks),
            lexical_only: Some(receipt.lexical_only),
            reason: None,
            index_version: receipt.version,
        })
    }

    fn rejected(&self, reason: RejectReason) -> IngestReceipt {
        let label = match reason {
            RejectReason::Duplicate => "duplicate",
            RejectReason::MissingField(_) => "missing_field",
        };
        self.tracker.record_rejected(label);
        let err = AlphaError::IngestionRejected(reason.clone());
        tracing::debug!(target: "ingest", error = %err, "document rejected");
        IngestReceipt {
            status: IngestStatus::Rejected,
            document_id: None,
            chunks: None,
            lexical_only: None,
            reason: Some(reason),
            index_version: self.indexer.version(),
        }
    }

    /// One pass over every configured provider.
    pub async fn poll_sources(self: &Arc<Self>) -> RunStats {
        crate::ingest::run_once(
            self,
            &self.providers,
            self.config.ingest.workers,
            Duration::from_millis(self.config.ingest.source_timeout_ms),
        )
        .await
    }

    /// Evict documents older than `retention_days`, never touching anything
    /// ingested within the freshness window. Returns evicted document count.
    pub fn sweep_retention(&self, now: DateTime<Utc>) -> usize {
        let Some(days) = self.config.retrieval.retention_days else {
            return 0;
        };
        let age = |d: Option<chrono::Duration>| d.and_then(|d| now.checked_sub_signed(d));
        let cutoff = age(chrono::Duration::try_days(i64::from(days))).unwrap_or(DateTime::<Utc>::MIN_UTC);
        let window = i64::try_from(self.config.retrieval.freshness_window_secs).ok();
        let fresh_after = age(window.and_then(chrono::Duration::try_seconds)).unwrap_or(DateTime::<Utc>::MIN_UTC);

        let removed = self
            .store
            .evict_where(|d| d.published_at < cutoff && d.ingested_at < fresh_after);
        if removed.is_empty() {
            return 0;
        }
        let chunks = self
            .indexer
            .retain(|e| !removed.iter().any(|id| *id == e.chunk.document_id));
        self.tracker.record_evicted(removed.len(), chunks);
        self.cache.clear();
        tracing::info!(target: "ingest", documents = removed.len(), chunks, "retention sweep evicted documents");
        removed.len()
    }

    fn spawn_retention(self: &Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        let svc = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(RETENTION_SWEEP_EVERY);
            loop {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                let Some(svc) = svc.upgrade() else { break };
                svc.sweep_retention(Utc::now());
            }
        })
    }

    // ---- queries ----

    pub async fn recommend(&self, ticker: &str, refinement: Option<&str>) -> Result<Recommended, AlphaError> {
        self.ensure_running()?;
        let started = Instant::now();
        let ticker = self
            .store
            .resolve_ticker(ticker)
            .ok_or_else(|| AlphaError::InvalidTicker(ticker.to_string()))?;
        let query = Query::new(&ticker).refined(refinement.unwrap_or_default());
        let query_text = query.text();

        if let Some(hit) = self.cache.get(&CacheKey::new(&ticker, &query_text, self.indexer.version())) {
            tracing::debug!(target: "agents", ticker = %ticker, "recommendation cache hit");
            return Ok(Recommended {
                recommendation: hit,
                cache: CacheStatus::Hit,
            });
        }

        let (id, token) = self.register(&ticker);
        let _guard = InflightGuard {
            svc: self,
            ticker: ticker.clone(),
            id,
        };

        let rec = tokio::select! {
            biased;
            _ = token.cancelled() => Err(AlphaError::Superseded(ticker.clone())),
            r = self.run_pipeline(&query, &token, started) => r,
        };
        let rec = match rec {
            Ok(r) => Arc::new(r),
            Err(e) => {
                tracing::info!(target: "agents", ticker = %ticker, error = %e, "request abandoned");
                return Err(e);
            }
        };

        self.history.push(rec.clone());
        self.cache.insert(
            CacheKey::new(&ticker, &query_text, rec.index_version),
            rec.clone(),
        );
        self.tracker
            .record_request(rec.retrieval_path, Duration::from_millis(rec.latency_ms));
        self.events.publish_recommendation(rec.clone());

        Ok(Recommended {
            recommendation: rec,
            cache: CacheStatus::Miss,
        })
    }

    fn register(&self, ticker: &str) -> (u64, CancellationToken) {
        let id = self.next_request.fetch_add(1, Ordering::Relaxed);
        let token = self.shutdown.lock().child_token();
        if let Some((old, stale)) = self.inflight.lock().insert(ticker.to_string(), (id, token.clone())) {
            tracing::debug!(target: "agents", ticker, superseded = old, by = id, "cancelling stale request");
            stale.cancel();
        }
        (id, token)
    }

    async fn run_pipeline(
        &self,
        query: &Query,
        cancel: &CancellationToken,
        started: Instant,
    ) -> Result<Recommendation, AlphaError> {
        let cfg = &self.config;
        let deadline = started + Duration::from_millis(cfg.agents.request_deadline_ms);
        let query_text = query.text();

        let (outcome, market) = tokio::join!(
            self.adaptive.run_until(&self.indexer, query, cancel, deadline),
            self.market_snapshot(&query.ticker, deadline)
        );
        let outcome = outcome?;
        let evidence = self
            .reranker
            .rerank_until(&query_text, outcome.results.clone(), deadline)
            .await;

        let ctx = AgentContext {
            ticker: query.ticker.clone(),
            evidence: Arc::new(evidence),
            market,
            prior: Arc::new(Vec::new()),
        };
        let signals = self.orchestrator.run(ctx.clone(), deadline).await;
        let fusion = fuse_signals(&signals, &cfg.fusion);
        if fusion.flag.is_some() {
            tracing::warn!(target: "agents", ticker = %query.ticker, error = %AlphaError::FusionImpossible, "holding with zero confidence");
        }

        let sources = sentiment_sources(&ctx, &signals);
        let latency_ms = started.elapsed().as_millis() as u64;
        tracing::info!(
            target: "agents",
            ticker = %query.ticker,
            decision = fusion.decision.as_str(),
            confidence = fusion.confidence,
            path = outcome.path.as_str(),
            k = ?outcome.k_schedule,
            latency_ms,
            "recommendation ready"
        );

        Ok(Recommendation {
            ticker: query.ticker.clone(),
            created_at: Utc::now(),
            decision: fusion.decision,
            confidence: fusion.confidence,
            sentiment_score: fusion.sentiment_score,
            sentiment_label: fusion.sentiment_label,
            technical_score: fusion.technical_score,
            risk_score: fusion.risk_score,
            key_factors: fusion.key_factors,
            sources,
            latency_ms,
            retrieval_path: outcome.path,
            index_version: outcome.index_version,
            signals,
            flag: fusion.flag,
            query: query_text,
            retrieval: outcome,
        })
    }

    async fn market_snapshot(&self, ticker: &str, deadline: Instant) -> Option<Arc<MarketSnapshot>> {
        let timeout = Duration::from_millis(self.config.agents.market_timeout_ms)
            .min(deadline.saturating_duration_since(Instant::now()));
        let days = self.config.agents.price_history_days;
        match tokio::time::timeout(timeout, self.market.snapshot(ticker, days)).await {
            Ok(Ok(s)) => Some(Arc::new(s)),
            Ok(Err(e)) => {
                tracing::warn!(target: "agents", ticker, source = self.market.name(), error = %e, "market data unavailable");
                None
            }
            Err(_) => {
                tracing::warn!(target: "agents", ticker, source = self.market.name(), timeout_ms = timeout.as_millis() as u64, "market data timed out");
                None
            }
        }
    }

    pub fn articles(&self, ticker: &str, limit: usize) -> Result<Vec<Arc<Document>>, AlphaError> {
        let t = self
            .store
            .resolve_ticker(ticker)
            .ok_or_else(|| AlphaError::InvalidTicker(ticker.to_string()))?;
        Ok(self.store.documents_for(&t, limit))
    }

    pub fn history(&self, limit: usize) -> Vec<Arc<Recommendation>> {
        self.history.last_n(limit)
    }

    pub fn status(&self) -> ServiceStatus {
        let running = self.is_running();
        let snapshot = self.indexer.snapshot();
        ServiceStatus {
            running,
            document_count: self.store.document_count(),
            chunk_count: snapshot.len(),
            index_version: snapshot.version(),
            retrieval_ready: running && !snapshot.is_empty(),
            agents_ready: running,
            tracker: self.tracker.stats(),
        }
    }

    pub fn snapshot(&self) -> Arc<IndexView> {
        self.indexer.snapshot()
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn store(&self) -> &DocumentStore {
        &self.store
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }
}

/// Document ids behind the sentiment evidence, in rank order. Empty when no
/// healthy sentiment signal cited anything.
fn sentiment_sources(ctx: &AgentContext, signals: &[crate::agents::AgentSignal]) -> Vec<String> {
    let Some(cited) = signals
        .iter()
        .find(|s| s.kind == SignalKind::Sentiment && !s.degraded)
        .map(|s| &s.evidence)
    else {
        return Vec::new();
    };
    let mut out: Vec<String> = Vec::new();
    for r in ctx.evidence.iter() {
        if cited.contains(&r.chunk_id) && !out.contains(&r.document_id) {
            out.push(r.document_id.clone());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn retaining(days: u32) -> Arc<SignalService> {
        let mut cfg = AppConfig::default();
        cfg.retrieval.retention_days = Some(days);
        let svc = SignalService::builder(cfg).build();
        svc.start();
        svc
    }

    fn old_article(days_ago: i64) -> RawDocument {
        RawDocument::new(
            "Apple settles old patent case",
            "Apple agreed to settle a patent dispute with a component supplier.",
        )
        .published(Utc::now() - chrono::Duration::days(days_ago))
    }

    #[tokio::test]
    async fn retention_spares_fresh_ingests_then_evicts_everywhere() {
        let svc = retaining(30);
        let receipt = svc.ingest(old_article(60)).await.unwrap();
        let doc_id = receipt.document_id.clone().unwrap();
        svc.recommend("AAPL", None).await.unwrap();
        assert_eq!(svc.cache.len(), 1);

        // Published long ago but ingested just now.
        assert_eq!(svc.sweep_retention(Utc::now()), 0);
        assert!(svc.store().contains(&doc_id));
        assert_eq!(svc.cache.len(), 1);

        let window = svc.config().retrieval.freshness_window_secs as i64;
        let later = Utc::now() + chrono::Duration::seconds(window + 3600);
        assert_eq!(svc.sweep_retention(later), 1);
        assert!(!svc.store().contains(&doc_id));
        assert!(!svc.snapshot().contains_document(&doc_id));
        assert!(svc.snapshot().is_empty());
        assert!(svc.snapshot().version() > receipt.index_version);
        assert!(svc.cache.is_empty());
        assert_eq!(svc.status().tracker.document_count, 0);
    }

    #[tokio::test]
    async fn recent_publications_survive_the_sweep() {
        let svc = retaining(30);
        let receipt = svc.ingest(old_article(2)).await.unwrap();
        let later = Utc::now() + chrono::Duration::days(1);
        assert_eq!(svc.sweep_retention(later), 0);
        assert!(svc.store().contains(receipt.document_id.as_deref().unwrap()));
    }

    #[tokio::test]
    async fn extreme_windows_do_not_overflow() {
        let mut cfg = AppConfig::default();
        cfg.retrieval.retention_days = Some(u32::MAX);
        cfg.retrieval.freshness_window_secs = u64::MAX;
        let svc = SignalService::builder(cfg).build();
        svc.start();
        svc.ingest(old_article(60)).await.unwrap();

        assert_eq!(svc.sweep_retention(Utc::now()), 0);
        assert_eq!(svc.sweep_retention(DateTime::<Utc>::MIN_UTC), 0);
        assert_eq!(svc.sweep_retention(DateTime::<Utc>::MAX_UTC), 0);
        assert_eq!(svc.store().document_count(), 1);
    }
}
