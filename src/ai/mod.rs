//! Capabilities consumed by the core: embeddings, sufficiency and relevance
//! judgments, and sentiment scoring.
//!
//! Every capability has a deterministic local implementation so the service
//! runs (and tests) without network access. The OpenAI-compatible provider in
//! [`openai`] implements the same traits when `config/ai.json` enables it.

pub mod hashing;
pub mod judges;
pub mod lexicon;
pub mod openai;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::ai::AiConfig;
use crate::error::AlphaError;
use crate::retrieval::RetrievalResult;

#[async_trait]
pub trait Embedder: Send + Sync {
    /// One vector per input text, in order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, AlphaError>;
    fn name(&self) -> &'static str;
}

/// Verdict of the sufficiency judge for one retrieval round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Sufficiency {
    pub sufficient: bool,
    #[serde(default)]
    pub reason: Option<String>,
}

impl Sufficiency {
    pub fn yes(reason: impl Into<String>) -> Self {
        Self {
            sufficient: true,
            reason: Some(reason.into()),
        }
    }

    pub fn no(reason: impl Into<String>) -> Self {
        Self {
            sufficient: false,
            reason: Some(reason.into()),
        }
    }
}

#[async_trait]
pub trait SufficiencyJudge: Send + Sync {
    async fn judge(&self, query: &str, passages: &[RetrievalResult]) -> Result<Sufficiency, AlphaError>;
    fn name(&self) -> &'static str;
}

#[async_trait]
pub trait RelevanceJudge: Send + Sync {
    /// Pointwise relevance in `[0, 1]`, one score per passage, same order.
    async fn score(&self, query: &str, passages: &[RetrievalResult]) -> Result<Vec<f32>, AlphaError>;
    fn name(&self) -> &'static str;
}

/// Aggregate sentiment over a set of passages about one ticker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SentimentJudgment {
    /// `[-1, 1]`
    pub score: f32,
    /// `[0, 1]`
    pub confidence: f32,
    #[serde(default)]
    pub factors: Vec<String>,
}

#[async_trait]
pub trait SentimentScorer: Send + Sync {
    async fn score(&self, ticker: &str, passages: &[RetrievalResult]) -> Result<SentimentJudgment, AlphaError>;
    fn name(&self) -> &'static str;
}

/// The bundle of capabilities a service is built with.
#[derive(Clone)]
pub struct Capabilities {
    pub embedder: Arc<dyn Embedder>,
    pub sufficiency: Arc<dyn SufficiencyJudge>,
    pub relevance: Arc<dyn RelevanceJudge>,
    pub sentiment: Arc<dyn SentimentScorer>,
}

impl Capabilities {
    /// Deterministic, offline capabilities.
    pub fn local() -> Self {
        Self {
            embedder: Arc::new(hashing::HashingEmbedder::default()),
            sufficiency: Arc::new(judges::CoverageJudge::default()),
            relevance: Arc::new(judges::TermOverlapJudge),
            sentiment: Arc::new(lexicon::LexiconSentiment::new()),
        }
    }

    /// Remote provider when enabled, otherwise local.
    ///
    /// * If `AI_TEST_MODE=mock`, always local.
    /// * Else if `config.enabled == false`, local.
    /// * Else the OpenAI-compatible client backs every capability.
    pub fn from_config(config: &AiConfig) -> Self {
        if std::env::var("AI_TEST_MODE")
            .map(|v| v == "mock")
            .unwrap_or(false)
            || !config.enabled
        {
            return Self::local();
        }

        match openai::OpenAiClient::from_config(config) {
            Ok(client) => {
                let client = Arc::new(client);
                tracing::info!(model = %config.model, base_url = %config.base_url, "remote ai provider enabled");
                Self {
                    embedder: client.clone(),
                    sufficiency: client.clone(),
                    relevance: client.clone(),
                    sentiment: client,
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "remote ai provider unavailable, using local capabilities");
                Self::local()
            }
        }
    }
}
