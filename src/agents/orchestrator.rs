//! # Agent Orchestrator
//!
//! Fan-out/fan-in over signal producers. Each producer runs as its own task
//! under a timeout clipped to the request deadline; tasks live in a
//! `JoinSet`, so dropping an in-flight request aborts them.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use tokio::task::JoinSet;
use tokio::time::Instant;

use super::{
    AgentContext, AgentSignal, InsiderAgent, RiskAgent, SentimentAgent, SignalKind, SignalProducer,
    TechnicalAgent,
};
use crate::ai::Capabilities;
use crate::config::AgentsConfig;
use crate::error::AlphaError;

pub struct Orchestrator {
    stage_one: Vec<Arc<dyn SignalProducer>>,
    risk: Arc<dyn SignalProducer>,
    agent_timeout: Duration,
}

impl Orchestrator {
    pub fn new(
        stage_one: Vec<Arc<dyn SignalProducer>>,
        risk: Arc<dyn SignalProducer>,
        agent_timeout: Duration,
    ) -> Self {
        Self {
            stage_one,
            risk,
            agent_timeout,
        }
    }

    /// Sentiment, technical and insider in stage one; risk in stage two.
    pub fn standard(caps: &Capabilities, cfg: &AgentsConfig) -> Self {
        Self::new(
            vec![
                Arc::new(SentimentAgent::new(caps.sentiment.clone())),
                Arc::new(TechnicalAgent::new(cfg.rsi_period)),
                Arc::new(InsiderAgent),
            ],
            Arc::new(RiskAgent::new(cfg.volatility_cap, cfg.rsi_period)),
            Duration::from_millis(cfg.agent_timeout_ms),
        )
    }

    /// Run both stages. Always returns one signal per producer, in a stable
    /// order (sentiment, technical, insider, risk).
    pub async fn run(&self, mut ctx: AgentContext, deadline: Instant) -> Vec<AgentSignal> {
        let mut signals = self.run_stage(&self.stage_one, &ctx, deadline).await;
        signals.sort_by_key(|s| kind_order(s.kind));

        ctx.prior = Arc::new(signals.clone());
        let risk = self
            .run_stage(std::slice::from_ref(&self.risk), &ctx, deadline)
            .await;
        signals.extend(risk);
        signals
    }

    async fn run_stage(
        &self,
        producers: &[Arc<dyn SignalProducer>],
        ctx: &AgentContext,
        deadline: Instant,
    ) -> Vec<AgentSignal> {
        let budget = self
            .agent_timeout
            .min(deadline.saturating_duration_since(Instant::now()));

        let mut set = JoinSet::new();
        for p in producers {
            let p = p.clone();
            let ctx = ctx.clone();
            set.spawn(async move {
                let kind = p.kind();
                let res = match tokio::time::timeout(budget, p.produce(&ctx)).await {
                    Ok(r) => r,
                    Err(_) => Err(AlphaError::agent(
                        kind.as_str(),
                        format!("timed out after {}ms", budget.as_millis()),
                    )),
                };
                (kind, res)
            });
        }

        let mut out = Vec::with_capacity(producers.len());
        let mut seen = HashSet::new();
        while let Some(joined) = set.join_next().await {
            // A panicked task has no kind attached; it is filled in below.
            let Ok((kind, res)) = joined else { continue };
            seen.insert(kind);
            out.push(match res {
                Ok(sig) => sig,
                Err(e) => degrade(kind, e.to_string()),
            });
        }
        for p in producers {
            if seen.insert(p.kind()) {
                out.push(degrade(p.kind(), "producer panicked".to_string()));
            }
        }
        out
    }
}

fn degrade(kind: SignalKind, reason: String) -> AgentSignal {
    counter!("agent_degraded_total", "agent" => kind.as_str()).increment(1);
    tracing::warn!(target: "agents", agent = %kind, reason = %reason, "agent degraded to neutral");
    AgentSignal::degraded(kind, reason)
}

fn kind_order(k: SignalKind) -> u8 {
    match k {
        SignalKind::Sentiment => 0,
        SignalKind::Technical => 1,
        SignalKind::Insider => 2,
        SignalKind::Risk => 3,
    }
}
