//! decision.rs — Verdict and the recommendation shape returned to callers.
//!
//! A `Recommendation` is built once per request and never mutated; the
//! cache, history and event stream all share the same `Arc`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::agents::{AgentSignal, SignalLabel};
use crate::retrieval::{AdaptiveOutcome, RetrievalPath};

/// Trading verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Verdict {
    Buy,
    Hold,
    Sell,
}

impl Verdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::Buy => "BUY",
            Verdict::Hold => "HOLD",
            Verdict::Sell => "SELL",
        }
    }
}

/// Flag attached when every directional producer degraded.
pub const FLAG_FUSION_IMPOSSIBLE: &str = "fusion_impossible";

/// Final, explainable answer for one ticker.
#[derive(Debug, Clone, Serialize)]
pub struct Recommendation {
    pub ticker: String,
    #[serde(rename = "timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "recommendation")]
    pub decision: Verdict,
    /// `[0, 100]`.
    pub confidence: f32,
    pub sentiment_score: f32,
    pub sentiment_label: SignalLabel,
    pub technical_score: f32,
    pub risk_score: f32,
    pub key_factors: Vec<String>,
    /// Document ids behind the sentiment evidence.
    pub sources: Vec<String>,
    pub latency_ms: u64,
    pub retrieval_path: RetrievalPath,
    pub index_version: u64,
    pub signals: Vec<AgentSignal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flag: Option<String>,
    /// Query text the evidence was retrieved for.
    pub query: String,
    pub retrieval: AdaptiveOutcome,
}

impl Recommendation {
    pub fn is_flagged(&self, flag: &str) -> bool {
        self.flag.as_deref() == Some(flag)
    }
}

#[cfg(test)]
pub(crate) fn sample(ticker: &str, index_version: u64) -> Recommendation {
    Recommendation {
        ticker: ticker.to_string(),
        created_at: Utc::now(),
        decision: Verdict::Hold,
        confidence: 0.0,
        sentiment_score: 0.0,
        sentiment_label: SignalLabel::Neutral,
        technical_score: 0.0,
        risk_score: 0.0,
        key_factors: vec![],
        sources: vec![],
        latency_ms: 0,
        retrieval_path: RetrievalPath::Adaptive,
        index_version,
        signals: vec![],
        flag: None,
        query: format!("{ticker} stock news"),
        retrieval: AdaptiveOutcome {
            results: vec![],
            path: RetrievalPath::Adaptive,
            k_schedule: vec![2],
            iterations: 1,
            sufficient: true,
            judge_reasons: vec![],
            index_version,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verdict_serializes_uppercase() {
        assert_eq!(serde_json::to_string(&Verdict::Sell).unwrap(), "\"SELL\"");
        let v: Verdict = serde_json::from_str("\"BUY\"").unwrap();
        assert_eq!(v, Verdict::Buy);
        assert_eq!(Verdict::Hold.as_str(), "HOLD");
    }

    #[test]
    fn recommendation_uses_wire_field_names() {
        let v = serde_json::to_value(sample("AAPL", 7)).unwrap();
        assert_eq!(v["recommendation"], "HOLD");
        assert!(v.get("timestamp").is_some());
        assert_eq!(v["retrieval_path"], "adaptive");
        assert_eq!(v["retrieval"]["k_schedule"][0], 2);
        assert!(v.get("flag").is_none());
    }
}
