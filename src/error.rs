//! Error taxonomy for the retrieval and fusion core.
//!
//! Most variants never reach a caller: they are absorbed at the stage that
//! produced them (lexical-only chunks, fallback retrieval, neutral signals).
//! `IndexUnavailable` and `InvalidTicker` are the ones the HTTP layer surfaces.

use std::fmt;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

/// Why a document was not accepted. Rejections are outcomes, not failures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "field")]
pub enum RejectReason {
    /// Same content hash is already stored.
    Duplicate,
    MissingField(&'static str),
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::Duplicate => write!(f, "duplicate"),
            RejectReason::MissingField(name) => write!(f, "missing field: {name}"),
        }
    }
}

#[derive(Debug, Error)]
pub enum AlphaError {
    #[error("ingestion rejected: {0}")]
    IngestionRejected(RejectReason),

    #[error("embedding unavailable: {0}")]
    EmbeddingUnavailable(String),

    #[error("retrieval exceeded its {0:?} budget")]
    RetrievalTimeout(Duration),

    #[error("judge failure: {0}")]
    JudgeFailure(String),

    #[error("{kind} agent failed: {reason}")]
    AgentFailure { kind: &'static str, reason: String },

    #[error("fusion impossible: every directional signal is degraded")]
    FusionImpossible,

    #[error("index unavailable, retry in a few seconds")]
    IndexUnavailable,

    #[error("invalid ticker: {0:?}")]
    InvalidTicker(String),

    #[error("request for {0} superseded by a newer one")]
    Superseded(String),
}

impl AlphaError {
    pub fn agent(kind: &'static str, reason: impl Into<String>) -> Self {
        AlphaError::AgentFailure {
            kind,
            reason: reason.into(),
        }
    }

    /// Stable snake_case name used in logs and metric labels.
    pub fn label(&self) -> &'static str {
        match self {
            AlphaError::IngestionRejected(_) => "ingestion_rejected",
            AlphaError::EmbeddingUnavailable(_) => "embedding_unavailable",
            AlphaError::RetrievalTimeout(_) => "retrieval_timeout",
            AlphaError::JudgeFailure(_) => "judge_failure",
            AlphaError::AgentFailure { .. } => "agent_failure",
            AlphaError::FusionImpossible => "fusion_impossible",
            AlphaError::IndexUnavailable => "index_unavailable",
            AlphaError::InvalidTicker(_) => "invalid_ticker",
            AlphaError::Superseded(_) => "superseded",
        }
    }
}

pub type Result<T, E = AlphaError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reject_reason_serializes_with_field_name() {
        let v = serde_json::to_value(RejectReason::MissingField("content")).unwrap();
        assert_eq!(v["kind"], "missing_field");
        assert_eq!(v["field"], "content");
        assert_eq!(RejectReason::Duplicate.to_string(), "duplicate");
    }

    #[test]
    fn agent_failure_message_names_the_agent() {
        let e = AlphaError::agent("technical", "no price history");
        assert_eq!(e.to_string(), "technical agent failed: no price history");
        assert_eq!(e.label(), "agent_failure");
    }
}
