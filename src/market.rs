//! Market data consumed by the technical, risk and insider agents.
//!
//! [`SyntheticMarket`] produces a deterministic daily random walk per ticker
//! so the service is usable without a price feed. [`StaticMarket`] serves
//! fixed data, mostly for tests.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{Duration, NaiveDate, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::AlphaError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceBar {
    pub date: NaiveDate,
    pub close: f64,
    pub volume: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeSide {
    Buy,
    Sell,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsiderTransaction {
    pub id: String,
    pub insider: String,
    pub role: String,
    pub side: TradeSide,
    pub shares: u64,
    pub price: f64,
    pub date: NaiveDate,
}

impl InsiderTransaction {
    pub fn value(&self) -> f64 {
        self.shares as f64 * self.price
    }
}

/// Everything the market-facing agents see for one ticker.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MarketSnapshot {
    pub ticker: String,
    /// Oldest first.
    pub bars: Vec<PriceBar>,
    #[serde(default)]
    pub insider: Vec<InsiderTransaction>,
}

impl MarketSnapshot {
    pub fn closes(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.close).collect()
    }

    pub fn last_close(&self) -> Option<f64> {
        self.bars.last().map(|b| b.close)
    }

    /// Day-over-day change of the last bar, in percent.
    pub fn change_pct(&self) -> Option<f64> {
        let n = self.bars.len();
        if n < 2 || self.bars[n - 2].close == 0.0 {
            return None;
        }
        Some((self.bars[n - 1].close / self.bars[n - 2].close - 1.0) * 100.0)
    }
}

#[async_trait]
pub trait MarketDataSource: Send + Sync {
    async fn snapshot(&self, ticker: &str, days: usize) -> Result<MarketSnapshot, AlphaError>;
    fn name(&self) -> &'static str;
}

/// Deterministic daily random walk seeded by the ticker symbol.
#[derive(Debug, Clone)]
pub struct SyntheticMarket {
    /// Daily return standard deviation of the walk.
    pub daily_vol: f64,
    /// Last bar date; `None` means today.
    pub anchor: Option<NaiveDate>,
}

impl Default for SyntheticMarket {
    fn default() -> Self {
        Self {
            daily_vol: 0.015,
            anchor: None,
        }
    }
}

impl SyntheticMarket {
    pub fn series(&self, ticker: &str, days: usize) -> Vec<PriceBar> {
        let digest = Sha256::digest(ticker.as_bytes());
        let mut seed = u64::from_le_bytes([
            digest[0], digest[1], digest[2], digest[3], digest[4], digest[5], digest[6], digest[7],
        ]);
        let mut rng = move || {
            // LCG (Knuth MMIX constants), top 53 bits as a uniform in [0, 1)
            seed = seed
                .wrapping_mul(6_364_136_223_846_793_005)
                .wrapping_add(1_442_695_040_888_963_407);
            (seed >> 11) as f64 / (1u64 << 53) as f64
        };

        let end = self.anchor.unwrap_or_else(|| Utc::now().date_naive());
        let mut price = 50.0 + rng() * 250.0;
        let mut bars = Vec::with_capacity(days);
        for i in 0..days {
            // sum of 3 uniforms: cheap approximately-normal shock
            let z = (rng() + rng() + rng() - 1.5) * 2.0;
            price *= 1.0 + self.daily_vol * z;
            bars.push(PriceBar {
                date: end - Duration::days((days - 1 - i) as i64),
                close: (price * 100.0).round() / 100.0,
                volume: 1_000_000 + (rng() * 9_000_000.0) as u64,
            });
        }
        bars
    }
}

#[async_trait]
impl MarketDataSource for SyntheticMarket {
    async fn snapshot(&self, ticker: &str, days: usize) -> Result<MarketSnapshot, AlphaError> {
        Ok(MarketSnapshot {
            ticker: ticker.to_string(),
            bars: self.series(ticker, days),
            insider: Vec::new(),
        })
    }

    fn name(&self) -> &'static str {
        "synthetic"
    }
}

/// Fixed snapshots keyed by ticker; unknown tickers are an error.
#[derive(Debug, Default)]
pub struct StaticMarket {
    data: RwLock<HashMap<String, MarketSnapshot>>,
}

impl StaticMarket {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, snapshot: MarketSnapshot) {
        self.data.write().insert(snapshot.ticker.clone(), snapshot);
    }
}

#[async_trait]
impl MarketDataSource for StaticMarket {
    async fn snapshot(&self, ticker: &str, days: usize) -> Result<MarketSnapshot, AlphaError> {
        let mut snap = self
            .data
            .read()
            .get(ticker)
            .cloned()
            .ok_or_else(|| AlphaError::agent("market", format!("no data for {ticker}")))?;
        if snap.bars.len() > days {
            snap.bars.drain(..snap.bars.len() - days);
        }
        Ok(snap)
    }

    fn name(&self) -> &'static str {
        "static"
    }
}

/// Build bars from closes, one per day ending at `end`. Test and fixture helper.
pub fn bars_from_closes(closes: &[f64], end: NaiveDate) -> Vec<PriceBar> {
    let n = closes.len();
    closes
        .iter()
        .enumerate()
        .map(|(i, c)| PriceBar {
            date: end - Duration::days((n - 1 - i) as i64),
            close: *c,
            volume: 1_000_000,
        })
        .collect()
}
