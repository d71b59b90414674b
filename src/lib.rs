// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod agents;
pub mod ai;
pub mod api;
pub mod cache;
pub mod config;
pub mod decision;
pub mod engine;
pub mod error;
pub mod events;
pub mod history;
pub mod index;
pub mod ingest;
pub mod market;
pub mod metrics;
pub mod retrieval;
pub mod service;
pub mod store;
pub mod tracker;

use std::sync::Arc;

use axum::Router;

pub use crate::api::router;
pub use crate::decision::{Recommendation, Verdict};
pub use crate::error::{AlphaError, RejectReason};
pub use crate::service::{SignalService, SignalServiceBuilder};
pub use crate::store::RawDocument;

use crate::ai::Capabilities;
use crate::config::{ai::AiConfig, AppConfig};
use crate::ingest::DirectoryProvider;
use crate::store::TickerExtractor;

/// Optional alias table for ticker extraction.
pub const DEFAULT_TICKERS_PATH: &str = "config/tickers.json";

/// Build a started service from on-disk configuration.
pub fn build_service(cfg: AppConfig, ai: &AiConfig) -> Arc<SignalService> {
    let mut builder = SignalService::builder(cfg.clone())
        .capabilities(Capabilities::from_config(ai))
        .tickers(TickerExtractor::load_from_file(DEFAULT_TICKERS_PATH));
    if let Some(dir) = cfg.ingest.articles_dir.as_ref() {
        builder = builder.provider(Arc::new(DirectoryProvider::new(dir.clone())));
    }
    let svc = builder.build();
    svc.start();
    svc
}

/// Full in-process application: API routes plus `/metrics`.
pub async fn app() -> anyhow::Result<Router> {
    let metrics = metrics::Metrics::init()?;
    let cfg = AppConfig::load()?;
    let ai = AiConfig::load_default();
    let svc = build_service(cfg, &ai);
    Ok(router(svc).merge(metrics.router()))
}
