//! AlphaStream — Binary Entrypoint
//! Boots the Axum HTTP server: configuration, tracing, the signal service
//! and the `/metrics` exporter.

use alphastream::config::{ai::AiConfig, AppConfig};
use alphastream::metrics::Metrics;
use shuttle_axum::ShuttleAxum;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const DEFAULT_FILTER: &str = "alphastream=info,ingest=info,retrieval=info,agents=info,warn";

/// Compact logs by default, JSON lines when `ALPHASTREAM_LOG_JSON=1`.
/// A subscriber installed by the runtime wins; ours is then skipped.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let json = std::env::var("ALPHASTREAM_LOG_JSON")
        .ok()
        .is_some_and(|v| v == "1");

    let registry = tracing_subscriber::registry().with(filter);
    let res = if json {
        registry.with(fmt::layer().json()).try_init()
    } else {
        registry.with(fmt::layer().compact()).try_init()
    };
    if res.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}

#[shuttle_runtime::main]
async fn axum() -> ShuttleAxum {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();
    init_tracing();

    let metrics = Metrics::init()?;
    let cfg = AppConfig::load()?;
    let ai = AiConfig::load_default();
    tracing::info!(
        ai_enabled = ai.enabled,
        rrf_k = cfg.retrieval.rrf_k,
        buy_threshold = cfg.fusion.buy_threshold,
        sell_threshold = cfg.fusion.sell_threshold,
        "configuration loaded"
    );

    let service = alphastream::build_service(cfg, &ai);
    let router = alphastream::router(service).merge(metrics.router());

    Ok(router.into())
}
