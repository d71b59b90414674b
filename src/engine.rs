//! # Fusion Engine
//! Pure logic that maps a set of agent signals to a verdict. No I/O, so it is
//! easy to unit test and to replay offline.
//!
//! Policy:
//! - `final = w_s·sentiment + w_t·technical + w_i·insider`; above the buy
//!   threshold is BUY, below the sell threshold is SELL, otherwise HOLD.
//! - Confidence is the mean confidence of the weighted directional signals
//!   (degraded ones count as zero), penalized by risk:
//!   `mean × (1 − risk_penalty × risk_score) × 100`.
//! - If every directional signal degraded there is nothing to fuse: HOLD,
//!   confidence 0, flagged `fusion_impossible`.

use std::collections::BTreeSet;

use crate::agents::{AgentSignal, SignalKind, SignalLabel};
use crate::config::FusionConfig;
use crate::decision::{Verdict, FLAG_FUSION_IMPOSSIBLE};

pub const MAX_KEY_FACTORS: usize = 5;

/// Fused outcome, before request metadata is attached.
#[derive(Debug, Clone, PartialEq)]
pub struct Fusion {
    pub decision: Verdict,
    /// `[0, 100]`.
    pub confidence: f32,
    pub final_score: f32,
    pub sentiment_score: f32,
    pub sentiment_label: SignalLabel,
    pub technical_score: f32,
    pub risk_score: f32,
    pub key_factors: Vec<String>,
    pub flag: Option<String>,
}

fn find(signals: &[AgentSignal], kind: SignalKind) -> Option<&AgentSignal> {
    signals.iter().find(|s| s.kind == kind)
}

fn weight(cfg: &FusionConfig, kind: SignalKind) -> f32 {
    match kind {
        SignalKind::Sentiment => cfg.sentiment_weight,
        SignalKind::Technical => cfg.technical_weight,
        SignalKind::Insider => cfg.insider_weight,
        SignalKind::Risk => 0.0,
    }
}

pub fn fuse_signals(signals: &[AgentSignal], cfg: &FusionConfig) -> Fusion {
    let directional: Vec<&AgentSignal> = signals.iter().filter(|s| s.kind != SignalKind::Risk).collect();

    let sentiment = find(signals, SignalKind::Sentiment);
    let sentiment_score = sentiment.map(|s| s.score).unwrap_or(0.0);
    let sentiment_label = sentiment.map(|s| s.label).unwrap_or(SignalLabel::Neutral);
    let technical_score = find(signals, SignalKind::Technical).map(|s| s.score).unwrap_or(0.0);
    let risk = find(signals, SignalKind::Risk).filter(|s| !s.degraded);
    let risk_score = risk.map(|s| s.score).unwrap_or(0.0);

    let key_factors = key_factors(signals);

    if directional.iter().all(|s| s.degraded) {
        return Fusion {
            decision: Verdict::Hold,
            confidence: 0.0,
            final_score: 0.0,
            sentiment_score,
            sentiment_label,
            technical_score,
            risk_score,
            key_factors,
            flag: Some(FLAG_FUSION_IMPOSSIBLE.to_string()),
        };
    }

    let final_score: f32 = directional
        .iter()
        .map(|s| weight(cfg, s.kind) * s.score)
        .sum();

    let decision = if final_score > cfg.buy_threshold {
        Verdict::Buy
    } else if final_score < cfg.sell_threshold {
        Verdict::Sell
    } else {
        Verdict::Hold
    };

    // Only signals that can move the decision vote on confidence.
    let voting: Vec<f32> = directional
        .iter()
        .filter(|s| weight(cfg, s.kind) > 0.0)
        .map(|s| if s.degraded { 0.0 } else { s.confidence })
        .collect();
    let mean = if voting.is_empty() {
        0.0
    } else {
        voting.iter().sum::<f32>() / voting.len() as f32
    };
    let penalty = (1.0 - cfg.risk_penalty * risk_score).clamp(0.0, 1.0);
    let confidence = (mean * penalty * 100.0).clamp(0.0, 100.0);

    Fusion {
        decision,
        confidence,
        final_score,
        sentiment_score,
        sentiment_label,
        technical_score,
        risk_score,
        key_factors,
        flag: None,
    }
}

/// Leading factor of each signal first, then the rest, deduplicated.
fn key_factors(signals: &[AgentSignal]) -> Vec<String> {
    let mut seen = BTreeSet::new();
    let mut out = Vec::new();
    let firsts = signals.iter().filter_map(|s| s.factors.first());
    let rests = signals.iter().flat_map(|s| s.factors.iter().skip(1));
    for f in firsts.chain(rests) {
        if out.len() == MAX_KEY_FACTORS {
            break;
        }
        if seen.insert(f.as_str()) {
            out.push(f.clone());
        }
    }
    out
}
