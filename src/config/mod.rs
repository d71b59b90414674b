//! # Configuration
//!
//! `AppConfig` is loaded from TOML (`config/alphastream.toml` by default,
//! overridable through `ALPHASTREAM_CONFIG_PATH`). Every section has working
//! defaults, so a missing default file is not an error. A few hot knobs can be
//! overridden from the environment without touching the file.

pub mod ai;

use std::{fs, path::PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};

pub const ENV_CONFIG_PATH: &str = "ALPHASTREAM_CONFIG_PATH";
pub const DEFAULT_CONFIG_PATH: &str = "config/alphastream.toml";

pub const ENV_BUY_THRESHOLD: &str = "ALPHASTREAM_BUY_THRESHOLD";
pub const ENV_SELL_THRESHOLD: &str = "ALPHASTREAM_SELL_THRESHOLD";
pub const ENV_RRF_K: &str = "ALPHASTREAM_RRF_K";

/// Upper bounds keeping retention arithmetic inside chrono's range.
pub const MAX_RETENTION_DAYS: u32 = 36_500;
pub const MAX_FRESHNESS_WINDOW_SECS: u64 = 10 * 365 * 24 * 3600;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub chunking: ChunkingConfig,
    pub retrieval: RetrievalConfig,
    pub adaptive: AdaptiveConfig,
    pub rerank: RerankConfig,
    pub agents: AgentsConfig,
    pub fusion: FusionConfig,
    pub ingest: IngestConfig,
    pub history: HistoryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Soft cap per chunk, in whitespace tokens. A single longer sentence
    /// still becomes one chunk.
    pub max_tokens: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self { max_tokens: 400 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Reciprocal Rank Fusion constant `c` in `1 / (c + rank)`.
    pub rrf_k: f32,
    /// Each sub-index contributes `k * candidate_multiplier` candidates.
    pub candidate_multiplier: usize,
    pub bm25_k1: f32,
    pub bm25_b: f32,
    /// Evict chunks of documents published more than N days ago.
    pub retention_days: Option<u32>,
    /// Chunks ingested within this window are never evicted.
    pub freshness_window_secs: u64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            rrf_k: 60.0,
            candidate_multiplier: 2,
            bm25_k1: 1.5,
            bm25_b: 0.75,
            retention_days: None,
            freshness_window_secs: 3600,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AdaptiveConfig {
    pub initial_k: usize,
    pub factor: usize,
    /// Upper bound on retrieval calls per request.
    pub max_iterations: usize,
    /// Wall-clock budget for the whole escalation loop. Never exceeds the
    /// request deadline.
    pub budget_ms: u64,
    /// `k` used by the fallback retrieval when the budget is exceeded.
    pub fallback_k: usize,
}

impl Default for AdaptiveConfig {
    fn default() -> Self {
        Self {
            initial_k: 2,
            factor: 2,
            max_iterations: 4,
            budget_ms: 1200,
            fallback_k: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RerankConfig {
    pub enabled: bool,
    pub timeout_ms: u64,
    pub similarity_threshold: f32,
    pub duplicate_decay: f32,
}

impl Default for RerankConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            timeout_ms: 250,
            similarity_threshold: 0.90,
            duplicate_decay: 0.7,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentsConfig {
    pub agent_timeout_ms: u64,
    /// Overall per-request deadline. Retrieval, rerank, market data and both
    /// agent stages are clipped to what is left of it.
    pub request_deadline_ms: u64,
    pub market_timeout_ms: u64,
    /// Days of daily bars requested from the market data source.
    pub price_history_days: usize,
    pub rsi_period: usize,
    /// Annualized volatility that maps to a risk score of 1.0.
    pub volatility_cap: f64,
}

impl Default for AgentsConfig {
    fn default() -> Self {
        Self {
            agent_timeout_ms: 2000,
            request_deadline_ms: 1900,
            market_timeout_ms: 1000,
            price_history_days: 60,
            rsi_period: 14,
            volatility_cap: 0.6,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FusionConfig {
    pub sentiment_weight: f32,
    pub technical_weight: f32,
    pub insider_weight: f32,
    pub buy_threshold: f32,
    pub sell_threshold: f32,
    /// Confidence is scaled by `1 - risk_penalty * risk_score`.
    pub risk_penalty: f32,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            sentiment_weight: 0.6,
            technical_weight: 0.4,
            insider_weight: 0.0,
            buy_threshold: 0.3,
            sell_threshold: -0.3,
            risk_penalty: 0.5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    pub workers: usize,
    pub source_timeout_ms: u64,
    pub poll_interval_secs: u64,
    /// Drop folder polled for `*.json` articles. Empty disables the poller.
    pub articles_dir: Option<PathBuf>,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            source_timeout_ms: 5000,
            poll_interval_secs: 60,
            articles_dir: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    pub capacity: usize,
    pub cache_capacity: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            capacity: 500,
            cache_capacity: 256,
        }
    }
}

impl AppConfig {
    /// Resolve the config path, read it, then apply env overrides.
    ///
    /// An explicit `ALPHASTREAM_CONFIG_PATH` must exist; the default path may
    /// be absent, in which case built-in defaults are used.
    pub fn load() -> anyhow::Result<Self> {
        let explicit = std::env::var(ENV_CONFIG_PATH).ok().map(PathBuf::from);
        let path = explicit
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));

        let mut cfg = match fs::read_to_string(&path) {
            Ok(s) => Self::from_toml_str(&s)
                .with_context(|| format!("parsing config at {}", path.display()))?,
            Err(e) if explicit.is_some() => {
                return Err(anyhow::anyhow!(
                    "Failed to read config at {}: {}",
                    path.display(),
                    e
                ));
            }
            Err(_) => {
                tracing::debug!(path = %path.display(), "no config file, using defaults");
                Self::default()
            }
        };

        cfg.apply_env_overrides();
        cfg.sanitize();
        Ok(cfg)
    }

    pub fn from_toml_str(s: &str) -> anyhow::Result<Self> {
        let mut cfg: AppConfig = toml::from_str(s)?;
        cfg.sanitize();
        Ok(cfg)
    }

    fn apply_env_overrides(&mut self) {
        if let Some(t) = parse_unit_env(std::env::var(ENV_BUY_THRESHOLD).ok()) {
            self.fusion.buy_threshold = t;
        }
        if let Some(t) = parse_unit_env(std::env::var(ENV_SELL_THRESHOLD).ok()) {
            self.fusion.sell_threshold = -t.abs();
        }
        if let Some(k) = std::env::var(ENV_RRF_K)
            .ok()
            .and_then(|v| v.trim().parse::<f32>().ok())
            .filter(|k| k.is_finite() && *k > 0.0)
        {
            self.retrieval.rrf_k = k;
        }
    }

    /// Clamp values that would break invariants back to defaults.
    fn sanitize(&mut self) {
        let d = AppConfig::default();
        if self.chunking.max_tokens == 0 {
            self.chunking.max_tokens = d.chunking.max_tokens;
        }
        if !(self.retrieval.rrf_k.is_finite() && self.retrieval.rrf_k > 0.0) {
            self.retrieval.rrf_k = d.retrieval.rrf_k;
        }
        self.retrieval.candidate_multiplier = self.retrieval.candidate_multiplier.max(1);
        self.retrieval.retention_days = self.retrieval.retention_days.map(|d| d.min(MAX_RETENTION_DAYS));
        self.retrieval.freshness_window_secs =
            self.retrieval.freshness_window_secs.min(MAX_FRESHNESS_WINDOW_SECS);
        if self.adaptive.initial_k == 0 {
            self.adaptive.initial_k = d.adaptive.initial_k;
        }
        self.adaptive.factor = self.adaptive.factor.max(2);
        self.adaptive.max_iterations = self.adaptive.max_iterations.max(1);
        self.adaptive.fallback_k = self.adaptive.fallback_k.max(1);
        self.agents.request_deadline_ms = self.agents.request_deadline_ms.max(1);
        self.adaptive.budget_ms = self.adaptive.budget_ms.min(self.agents.request_deadline_ms);
        if !(0.0..=1.0).contains(&self.fusion.risk_penalty) {
            self.fusion.risk_penalty = d.fusion.risk_penalty;
        }
        if self.fusion.sell_threshold > self.fusion.buy_threshold {
            std::mem::swap(&mut self.fusion.sell_threshold, &mut self.fusion.buy_threshold);
        }
        self.ingest.workers = self.ingest.workers.max(1);
        self.history.capacity = self.history.capacity.clamp(1, 10_000);
    }
}

/// Parse an env value in `[0, 1]`; anything else is ignored.
fn parse_unit_env(v: Option<String>) -> Option<f32> {
    let t = v?.trim().parse::<f32>().ok()?;
    let t = t.abs();
    (t.is_finite() && t <= 1.0).then_some(t)
}
