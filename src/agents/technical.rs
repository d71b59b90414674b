//! Technical signal from RSI and moving-average alignment.
//!
//! - RSI below 30 (oversold) adds +0.4, above 70 (overbought) adds -0.4.
//! - `price > SMA20 > SMA50` adds +0.3; `price < SMA20 < SMA50` adds -0.3.
//! - The sum is clamped to `[-1, 1]`.

use async_trait::async_trait;

use super::{AgentContext, AgentSignal, SignalKind, SignalLabel, SignalProducer};
use crate::error::AlphaError;

/// RSI from simple averages of the gains and losses over the last `period`
/// changes (Cutler's variant, no smoothing). `None` with too little data.
pub fn rsi(closes: &[f64], period: usize) -> Option<f64> {
    if period == 0 || closes.len() < period + 1 {
        return None;
    }
    let window = &closes[closes.len() - period - 1..];
    let (mut gains, mut losses) = (0.0, 0.0);
    for w in window.windows(2) {
        let d = w[1] - w[0];
        if d > 0.0 {
            gains += d;
        } else {
            losses -= d;
        }
    }
    if losses == 0.0 {
        return Some(if gains == 0.0 { 50.0 } else { 100.0 });
    }
    let rs = (gains / period as f64) / (losses / period as f64);
    Some(100.0 - 100.0 / (1.0 + rs))
}

/// Simple moving average of the last `n` closes.
pub fn sma(closes: &[f64], n: usize) -> Option<f64> {
    if n == 0 || closes.len() < n {
        return None;
    }
    Some(closes[closes.len() - n..].iter().sum::<f64>() / n as f64)
}

#[derive(Debug, Clone)]
pub struct TechnicalAgent {
    pub rsi_period: usize,
}

impl Default for TechnicalAgent {
    fn default() -> Self {
        Self { rsi_period: 14 }
    }
}

impl TechnicalAgent {
    pub fn new(rsi_period: usize) -> Self {
        Self {
            rsi_period: rsi_period.max(2),
        }
    }

    pub fn evaluate(&self, closes: &[f64]) -> AgentSignal {
        let mut score = 0.0f32;
        let mut factors = Vec::new();
        let mut observations = 0;

        if let Some(r) = rsi(closes, self.rsi_period) {
            observations += 1;
            if r < 30.0 {
                score += 0.4;
                factors.push(format!("RSI {r:.1} oversold"));
            } else if r > 70.0 {
                score -= 0.4;
                factors.push(format!("RSI {r:.1} overbought"));
            } else {
                factors.push(format!("RSI {r:.1} neutral"));
            }
        }

        if let (Some(price), Some(s20), Some(s50)) = (closes.last().copied(), sma(closes, 20), sma(closes, 50)) {
            observations += 1;
            if price > s20 && s20 > s50 {
                score += 0.3;
                factors.push("Price above SMA20 above SMA50 (uptrend)".to_string());
            } else if price < s20 && s20 < s50 {
                score -= 0.3;
                factors.push("Price below SMA20 below SMA50 (downtrend)".to_string());
            } else {
                factors.push("Moving averages mixed".to_string());
            }
        }

        let confidence = match observations {
            0 => 0.0,
            1 => 0.35,
            _ => (0.5 + 0.5 * score.abs()).min(0.9),
        };
        if observations == 0 {
            factors.push(format!("Only {} bars of history", closes.len()));
        }

        AgentSignal::new(
            SignalKind::Technical,
            score,
            confidence,
            SignalLabel::directional(score, 0.2),
        )
        .with_factors(factors)
    }
}

#[async_trait]
impl SignalProducer for TechnicalAgent {
    fn kind(&self) -> SignalKind {
        SignalKind::Technical
    }

    async fn produce(&self, ctx: &AgentContext) -> Result<AgentSignal, AlphaError> {
        let market = ctx.market(SignalKind::Technical)?;
        Ok(self.evaluate(&market.closes()))
    }
}
