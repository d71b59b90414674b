//! Risk signal from realized volatility.
//!
//! `risk_score = min(1, annualized_vol / volatility_cap)` with
//! `annualized_vol = daily_vol * sqrt(252)`. Daily volatility is the sample
//! standard deviation of log returns (0.02 when fewer than 10 bars), and is
//! scaled by 1.3 when RSI sits at an extreme (above 75 or below 25).
//! Confidence follows the stage-one signals' mean confidence.

use async_trait::async_trait;

use super::technical::rsi;
use super::{AgentContext, AgentSignal, SignalKind, SignalLabel, SignalProducer};
use crate::error::AlphaError;

pub const DEFAULT_DAILY_VOL: f64 = 0.02;
const TRADING_DAYS: f64 = 252.0;

pub fn daily_volatility(closes: &[f64]) -> f64 {
    if closes.len() < 10 {
        return DEFAULT_DAILY_VOL;
    }
    let rets: Vec<f64> = closes
        .windows(2)
        .filter(|w| w[0] > 0.0 && w[1] > 0.0)
        .map(|w| (w[1] / w[0]).ln())
        .collect();
    if rets.len() < 2 {
        return DEFAULT_DAILY_VOL;
    }
    let mean = rets.iter().sum::<f64>() / rets.len() as f64;
    let var = rets.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / (rets.len() - 1) as f64;
    var.sqrt()
}

#[derive(Debug, Clone)]
pub struct RiskAgent {
    pub volatility_cap: f64,
    pub rsi_period: usize,
}

impl Default for RiskAgent {
    fn default() -> Self {
        Self {
            volatility_cap: 0.6,
            rsi_period: 14,
        }
    }
}

impl RiskAgent {
    pub fn new(volatility_cap: f64, rsi_period: usize) -> Self {
        Self {
            volatility_cap: if volatility_cap > 0.0 { volatility_cap } else { 0.6 },
            rsi_period: rsi_period.max(2),
        }
    }

    pub fn evaluate(&self, closes: &[f64], prior: &[AgentSignal]) -> AgentSignal {
        let mut vol = daily_volatility(closes);
        let mut factors = Vec::new();

        if let Some(r) = rsi(closes, self.rsi_period) {
            if !(25.0..=75.0).contains(&r) {
                vol *= 1.3;
                factors.push(format!("RSI {r:.1} at an extreme"));
            }
        }

        let annual = vol * TRADING_DAYS.sqrt();
        let score = (annual / self.volatility_cap).min(1.0) as f32;
        let label = if score < 0.25 {
            SignalLabel::Low
        } else if score < 0.5 {
            SignalLabel::Medium
        } else {
            SignalLabel::High
        };
        factors.insert(0, format!("Annualized volatility {:.1}%", annual * 100.0));

        let healthy: Vec<f32> = prior.iter().filter(|s| !s.degraded).map(|s| s.confidence).collect();
        let confidence = if healthy.is_empty() {
            0.5
        } else {
            healthy.iter().sum::<f32>() / healthy.len() as f32
        };

        AgentSignal::new(SignalKind::Risk, score, confidence, label).with_factors(factors)
    }
}

#[async_trait]
impl SignalProducer for RiskAgent {
    fn kind(&self) -> SignalKind {
        SignalKind::Risk
    }

    async fn produce(&self, ctx: &AgentContext) -> Result<AgentSignal, AlphaError> {
        let market = ctx.market(SignalKind::Risk)?;
        Ok(self.evaluate(&market.closes(), &ctx.prior))
    }
}
