// src/agents/sentiment.rs
use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;

use super::{AgentContext, AgentSignal, SignalKind, SignalLabel, SignalProducer};
use crate::ai::SentimentScorer;
use crate::error::AlphaError;

/// BULLISH above this, BEARISH below its negation.
pub const LABEL_BAND: f32 = 0.3;

/// Scores the retrieved evidence through the sentiment capability.
pub struct SentimentAgent {
    scorer: Arc<dyn SentimentScorer>,
}

impl SentimentAgent {
    pub fn new(scorer: Arc<dyn SentimentScorer>) -> Self {
        Self { scorer }
    }
}

#[async_trait]
impl SignalProducer for SentimentAgent {
    fn kind(&self) -> SignalKind {
        SignalKind::Sentiment
    }

    async fn produce(&self, ctx: &AgentContext) -> Result<AgentSignal, AlphaError> {
        let judgment = self
            .scorer
            .score(&ctx.ticker, &ctx.evidence)
            .await
            .map_err(|e| match e {
                AlphaError::AgentFailure { .. } => e,
                other => AlphaError::agent("sentiment", other.to_string()),
            })?;

        let docs: BTreeSet<&str> = ctx.evidence.iter().map(|r| r.document_id.as_str()).collect();
        let mut factors = judgment.factors;
        if !ctx.evidence.is_empty() {
            factors.push(format!(
                "{} passages from {} documents",
                ctx.evidence.len(),
                docs.len()
            ));
        }

        Ok(AgentSignal::new(
            SignalKind::Sentiment,
            judgment.score,
            judgment.confidence,
            SignalLabel::directional(judgment.score, LABEL_BAND),
        )
        .with_factors(factors)
        .with_evidence(ctx.evidence.iter().map(|r| r.chunk_id.clone())))
    }
}
