// src/agents/insider.rs
use async_trait::async_trait;

use super::{AgentContext, AgentSignal, SignalKind, SignalLabel, SignalProducer};
use crate::error::AlphaError;
use crate::market::{InsiderTransaction, TradeSide};

/// Net insider buying as a score in `[-1, 1]`: `(buy - sell) / (buy + sell)`
/// over role-weighted transaction values. Officers and directors count 1.5x.
#[derive(Debug, Clone, Default)]
pub struct InsiderAgent;

fn role_weight(role: &str) -> f64 {
    let r = role.to_ascii_lowercase();
    if ["ceo", "cfo", "chief", "director", "president"]
        .iter()
        .any(|k| r.contains(k))
    {
        1.5
    } else {
        1.0
    }
}

impl InsiderAgent {
    pub fn evaluate(&self, txs: &[InsiderTransaction]) -> AgentSignal {
        if txs.is_empty() {
            return AgentSignal::new(SignalKind::Insider, 0.0, 0.0, SignalLabel::Neutral)
                .with_factor("No recent insider transactions");
        }

        let (mut buy, mut sell) = (0.0f64, 0.0f64);
        for t in txs {
            let v = t.value() * role_weight(&t.role);
            match t.side {
                TradeSide::Buy => buy += v,
                TradeSide::Sell => sell += v,
            }
        }
        let total = buy + sell;
        let score = if total > 0.0 { ((buy - sell) / total) as f32 } else { 0.0 };
        let confidence = (0.3 + 0.1 * txs.len().min(5) as f32).min(0.8);

        let buys = txs.iter().filter(|t| t.side == TradeSide::Buy).count();
        AgentSignal::new(
            SignalKind::Insider,
            score,
            confidence,
            SignalLabel::directional(score, 0.3),
        )
        .with_factor(format!(
            "{} insider buys, {} sells (net ${:.0})",
            buys,
            txs.len() - buys,
            buy - sell
        ))
        .with_evidence(txs.iter().map(|t| t.id.clone()))
    }
}

#[async_trait]
impl SignalProducer for InsiderAgent {
    fn kind(&self) -> SignalKind {
        SignalKind::Insider
    }

    async fn produce(&self, ctx: &AgentContext) -> Result<AgentSignal, AlphaError> {
        let market = ctx.market(SignalKind::Insider)?;
        Ok(self.evaluate(&market.insider))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn tx(id: &str, role: &str, side: TradeSide, shares: u64) -> InsiderTransaction {
        InsiderTransaction {
            id: id.into(),
            insider: "Someone".into(),
            role: role.into(),
            side,
            shares,
            price: 10.0,
            date: NaiveDate::from_ymd_opt(2025, 1, 2).unwrap(),
        }
    }

    #[test]
    fn net_selling_is_bearish_with_evidence() {
        let s = InsiderAgent.evaluate(&[
            tx("t1", "CEO", TradeSide::Sell, 1000),
            tx("t2", "VP Sales", TradeSide::Buy, 100),
        ]);
        // sell 15000 vs buy 1000
        assert!((s.score - (-14000.0 / 16000.0)).abs() < 1e-6);
        assert_eq!(s.label, SignalLabel::Bearish);
        assert_eq!(s.evidence, vec!["t1".to_string(), "t2".to_string()]);
    }

    #[test]
    fn no_transactions_is_neutral() {
        let s = InsiderAgent.evaluate(&[]);
        assert_eq!(s.score, 0.0);
        assert_eq!(s.confidence, 0.0);
        assert!(!s.degraded);
    }
}
