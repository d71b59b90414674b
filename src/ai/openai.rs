//! OpenAI-compatible provider: `/embeddings` for vectors, `/chat/completions`
//! in JSON mode for judgments.
//!
//! Model replies are parsed into strict schemas (`deny_unknown_fields`,
//! range checks). Anything that does not fit is a `JudgeFailure` or an
//! `AgentFailure`; callers treat those as "insufficient", "keep order" or
//! "neutral signal" respectively.

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::{Embedder, RelevanceJudge, SentimentJudgment, SentimentScorer, Sufficiency, SufficiencyJudge};
use crate::config::ai::AiConfig;
use crate::error::AlphaError;
use crate::retrieval::RetrievalResult;

/// Passages are truncated to this many chars before being sent.
const MAX_PASSAGE_CHARS: usize = 1200;

pub struct OpenAiClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    embedding_model: String,
}

impl OpenAiClient {
    pub fn from_config(cfg: &AiConfig) -> anyhow::Result<Self> {
        if cfg.api_key.trim().is_empty() {
            anyhow::bail!("ai provider enabled without an api key");
        }
        let http = reqwest::Client::builder()
            .user_agent(concat!("alphastream/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(4))
            .timeout(Duration::from_millis(cfg.timeout_ms))
            .build()?;
        Ok(Self {
            http,
            base_url: cfg.base_url.clone(),
            api_key: cfg.api_key.clone(),
            model: cfg.model.clone(),
            embedding_model: cfg.embedding_model.clone(),
        })
    }

    /// One JSON-mode chat call; returns the raw `content` string.
    async fn chat_json(&self, system: &str, user: &str) -> Result<String, String> {
        #[derive(Serialize)]
        struct Msg<'a> {
            role: &'a str,
            content: &'a str,
        }
        #[derive(Serialize)]
        struct ResponseFormat {
            #[serde(rename = "type")]
            kind: &'static str,
        }
        #[derive(Serialize)]
        struct Req<'a> {
            model: &'a str,
            messages: Vec<Msg<'a>>,
            temperature: f32,
            response_format: ResponseFormat,
        }
        #[derive(Deserialize)]
        struct Resp {
            choices: Vec<Choice>,
        }
        #[derive(Deserialize)]
        struct Choice {
            message: ChoiceMsg,
        }
        #[derive(Deserialize)]
        struct ChoiceMsg {
            content: Option<String>,
        }

        let req = Req {
            model: &self.model,
            messages: vec![
                Msg {
                    role: "system",
                    content: system,
                },
                Msg {
                    role: "user",
                    content: user,
                },
            ],
            temperature: 0.0,
            response_format: ResponseFormat {
                kind: "json_object",
            },
        };

        let resp = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&req)
            .send()
            .await
            .map_err(|e| format!("request failed: {e}"))?;
        if !resp.status().is_success() {
            return Err(format!("http status {}", resp.status()));
        }
        let body: Resp = resp.json().await.map_err(|e| format!("bad envelope: {e}"))?;
        body.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| "empty completion".to_string())
    }
}

/// Parse a model reply into `T`, rejecting extra fields and non-JSON.
pub fn parse_strict<T: DeserializeOwned>(content: &str) -> Result<T, String> {
    let trimmed = content
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim();
    serde_json::from_str(trimmed).map_err(|e| format!("schema violation: {e}"))
}

fn render_passages(passages: &[RetrievalResult]) -> String {
    passages
        .iter()
        .enumerate()
        .map(|(i, p)| {
            let text: String = p.text.chars().take(MAX_PASSAGE_CHARS).collect();
            format!("[{i}] {text}")
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RelevanceReply {
    scores: Vec<f32>,
}

#[async_trait]
impl Embedder for OpenAiClient {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, AlphaError> {
        #[derive(Serialize)]
        struct Req<'a> {
            model: &'a str,
            input: &'a [String],
        }
        #[derive(Deserialize)]
        struct Resp {
            data: Vec<Item>,
        }
        #[derive(Deserialize)]
        struct Item {
            index: usize,
            embedding: Vec<f32>,
        }

        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let resp = self
            .http
            .post(format!("{}/embeddings", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&Req {
                model: &self.embedding_model,
                input: texts,
            })
            .send()
            .await
            .map_err(|e| AlphaError::EmbeddingUnavailable(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(AlphaError::EmbeddingUnavailable(format!(
                "http status {}",
                resp.status()
            )));
        }
        let mut body: Resp = resp
            .json()
            .await
            .map_err(|e| AlphaError::EmbeddingUnavailable(e.to_string()))?;
        if body.data.len() != texts.len() {
            return Err(AlphaError::EmbeddingUnavailable(format!(
                "{} vectors for {} inputs",
                body.data.len(),
                texts.len()
            )));
        }
        body.data.sort_by_key(|d| d.index);
        Ok(body.data.into_iter().map(|d| d.embedding).collect())
    }

    fn name(&self) -> &'static str {
        "openai"
    }
}

#[async_trait]
impl SufficiencyJudge for OpenAiClient {
    async fn judge(&self, query: &str, passages: &[RetrievalResult]) -> Result<Sufficiency, AlphaError> {
        let system = "You decide whether retrieved passages are enough to assess a stock. \
                      Reply with JSON only: {\"sufficient\": bool, \"reason\": string}.";
        let user = format!("Query: {query}\nPassages:\n{}", render_passages(passages));
        let content = self.chat_json(system, &user).await.map_err(AlphaError::JudgeFailure)?;
        parse_strict::<Sufficiency>(&content).map_err(AlphaError::JudgeFailure)
    }

    fn name(&self) -> &'static str {
        "openai"
    }
}

#[async_trait]
impl RelevanceJudge for OpenAiClient {
    async fn score(&self, query: &str, passages: &[RetrievalResult]) -> Result<Vec<f32>, AlphaError> {
        let system = "Rate how relevant each passage is to the query on a 0..1 scale. \
                      Reply with JSON only: {\"scores\": [number, ...]} with one score per passage, in order.";
        let user = format!("Query: {query}\nPassages:\n{}", render_passages(passages));
        let content = self.chat_json(system, &user).await.map_err(AlphaError::JudgeFailure)?;
        let reply: RelevanceReply = parse_strict(&content).map_err(AlphaError::JudgeFailure)?;
        validate_relevance(reply.scores, passages.len()).map_err(AlphaError::JudgeFailure)
    }

    fn name(&self) -> &'static str {
        "openai"
    }
}

#[async_trait]
impl SentimentScorer for OpenAiClient {
    async fn score(&self, ticker: &str, passages: &[RetrievalResult]) -> Result<SentimentJudgment, AlphaError> {
        if passages.is_empty() {
            return Ok(SentimentJudgment {
                score: 0.0,
                confidence: 0.0,
                factors: vec![format!("No indexed coverage for {ticker}")],
            });
        }
        let system = "You are a financial sentiment analyst. Reply with JSON only: \
                      {\"score\": number in [-1,1], \"confidence\": number in [0,1], \"factors\": [string, ...]}.";
        let user = format!("Ticker: {ticker}\nPassages:\n{}", render_passages(passages));
        let content = self
            .chat_json(system, &user)
            .await
            .map_err(|e| AlphaError::agent("sentiment", e))?;
        let j: SentimentJudgment =
            parse_strict(&content).map_err(|e| AlphaError::agent("sentiment", e))?;
        validate_sentiment(j).map_err(|e| AlphaError::agent("sentiment", e))
    }

    fn name(&self) -> &'static str {
        "openai"
    }
}

fn validate_relevance(scores: Vec<f32>, expected: usize) -> Result<Vec<f32>, String> {
    if scores.len() != expected {
        return Err(format!("{} scores for {} passages", scores.len(), expected));
    }
    if scores.iter().any(|s| !s.is_finite() || !(0.0..=1.0).contains(s)) {
        return Err("score outside [0, 1]".to_string());
    }
    Ok(scores)
}

fn validate_sentiment(mut j: SentimentJudgment) -> Result<SentimentJudgment, String> {
    if !j.score.is_finite() || !(-1.0..=1.0).contains(&j.score) {
        return Err(format!("sentiment score {} outside [-1, 1]", j.score));
    }
    if !j.confidence.is_finite() || !(0.0..=1.0).contains(&j.confidence) {
        return Err(format!("confidence {} outside [0, 1]", j.confidence));
    }
    j.factors.truncate(5);
    Ok(j)
}
