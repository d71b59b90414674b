//! Independent signal producers and the orchestrator that runs them.
//!
//! Sentiment, technical and insider producers run concurrently in the first
//! stage; risk runs second because its confidence depends on theirs. A
//! producer that errors, panics or times out is replaced by a neutral,
//! zero-confidence signal marked `degraded`.

pub mod insider;
pub mod orchestrator;
pub mod risk;
pub mod sentiment;
pub mod technical;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::AlphaError;
use crate::market::MarketSnapshot;
use crate::retrieval::RetrievalResult;

pub use insider::InsiderAgent;
pub use orchestrator::Orchestrator;
pub use risk::RiskAgent;
pub use sentiment::SentimentAgent;
pub use technical::TechnicalAgent;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalKind {
    Sentiment,
    Technical,
    Risk,
    Insider,
}

impl SignalKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalKind::Sentiment => "sentiment",
            SignalKind::Technical => "technical",
            SignalKind::Risk => "risk",
            SignalKind::Insider => "insider",
        }
    }
}

impl fmt::Display for SignalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SignalLabel {
    Bullish,
    Neutral,
    Bearish,
    Low,
    Medium,
    High,
}

impl SignalLabel {
    /// Directional label with a symmetric neutral band.
    pub fn directional(score: f32, band: f32) -> Self {
        if score > band {
            SignalLabel::Bullish
        } else if score < -band {
            SignalLabel::Bearish
        } else {
            SignalLabel::Neutral
        }
    }
}

/// One producer's opinion. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentSignal {
    pub kind: SignalKind,
    /// `[-1, 1]` for directional kinds, `[0, 1]` for risk.
    pub score: f32,
    pub confidence: f32,
    pub label: SignalLabel,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub factors: Vec<String>,
    /// Chunk ids or insider transaction ids backing this signal.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub evidence: Vec<String>,
    #[serde(default)]
    pub degraded: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub degraded_reason: Option<String>,
}

impl AgentSignal {
    pub fn new(kind: SignalKind, score: f32, confidence: f32, label: SignalLabel) -> Self {
        let score = if kind == SignalKind::Risk {
            score.clamp(0.0, 1.0)
        } else {
            score.clamp(-1.0, 1.0)
        };
        Self {
            kind,
            score,
            confidence: confidence.clamp(0.0, 1.0),
            label,
            factors: Vec::new(),
            evidence: Vec::new(),
            degraded: false,
            degraded_reason: None,
        }
    }

    /// Neutral stand-in for a producer that failed.
    pub fn degraded(kind: SignalKind, reason: impl Into<String>) -> Self {
        let label = if kind == SignalKind::Risk {
            SignalLabel::Medium
        } else {
            SignalLabel::Neutral
        };
        let reason = reason.into();
        Self {
            kind,
            score: 0.0,
            confidence: 0.0,
            label,
            factors: vec![format!("{kind} unavailable: {reason}")],
            evidence: Vec::new(),
            degraded: true,
            degraded_reason: Some(reason),
        }
    }

    pub fn with_factor(mut self, f: impl Into<String>) -> Self {
        self.factors.push(f.into());
        self
    }

    pub fn with_factors(mut self, fs: impl IntoIterator<Item = String>) -> Self {
        self.factors.extend(fs);
        self
    }

    pub fn with_evidence(mut self, ids: impl IntoIterator<Item = String>) -> Self {
        self.evidence.extend(ids);
        self
    }
}

/// Inputs shared by every producer for one request.
#[derive(Debug, Clone)]
pub struct AgentContext {
    pub ticker: String,
    pub evidence: Arc<Vec<RetrievalResult>>,
    /// `None` when the market data source failed.
    pub market: Option<Arc<MarketSnapshot>>,
    /// Stage-one signals; empty while stage one runs.
    pub prior: Arc<Vec<AgentSignal>>,
}

impl AgentContext {
    pub fn market(&self, kind: SignalKind) -> Result<&MarketSnapshot, AlphaError> {
        self.market
            .as_deref()
            .ok_or_else(|| AlphaError::agent(kind.as_str(), "market data unavailable"))
    }
}

#[async_trait]
pub trait SignalProducer: Send + Sync {
    fn kind(&self) -> SignalKind;
    async fn produce(&self, ctx: &AgentContext) -> Result<AgentSignal, AlphaError>;
}
