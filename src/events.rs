//! Push-on-change event bus.
//!
//! The service publishes typed events into a `tokio::sync::broadcast`
//! channel; each WebSocket client subscribes and forwards what it receives.
//! The latest score per ticker is kept so new subscribers get a market
//! snapshot immediately.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::broadcast;

use crate::decision::Recommendation;

const CHANNEL_CAPACITY: usize = 1024;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MarketTick {
    pub ticker: String,
    pub score: f32,
    pub updated: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum StreamEvent {
    SentimentUpdate(Arc<Recommendation>),
    MarketUpdate(Vec<MarketTick>),
    MetricsUpdate {
        indexing_latency_ms: f64,
        total_docs: u64,
    },
}

#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<StreamEvent>,
    ticks: Arc<RwLock<BTreeMap<String, MarketTick>>>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            tx,
            ticks: Arc::new(RwLock::new(BTreeMap::new())),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StreamEvent> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Fire and forget; no subscribers is not an error.
    pub fn publish(&self, ev: StreamEvent) {
        let _ = self.tx.send(ev);
    }

    /// Publish a recommendation and the refreshed market snapshot.
    pub fn publish_recommendation(&self, rec: Arc<Recommendation>) {
        let snapshot = {
            let mut ticks = self.ticks.write();
            ticks.insert(
                rec.ticker.clone(),
                MarketTick {
                    ticker: rec.ticker.clone(),
                    score: rec.sentiment_score,
                    updated: rec.created_at,
                },
            );
            ticks.values().cloned().collect::<Vec<_>>()
        };
        self.publish(StreamEvent::SentimentUpdate(rec));
        self.publish(StreamEvent::MarketUpdate(snapshot));
    }

    pub fn market_snapshot(&self) -> Vec<MarketTick> {
        self.ticks.read().values().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn metrics_update_serializes_with_type_tag() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        bus.publish(StreamEvent::MetricsUpdate {
            indexing_latency_ms: 1.5,
            total_docs: 3,
        });
        let ev = rx.recv().await.unwrap();
        let v = serde_json::to_value(&ev).unwrap();
        assert_eq!(v["type"], "metrics_update");
        assert_eq!(v["data"]["total_docs"], 3);
    }

    #[test]
    fn publishing_without_subscribers_is_fine() {
        let bus = EventBus::new();
        assert_eq!(bus.subscriber_count(), 0);
        bus.publish(StreamEvent::MarketUpdate(vec![]));
        assert!(bus.market_snapshot().is_empty());
    }
}
