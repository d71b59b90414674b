// src/ingest/types.rs
use anyhow::Result;
use serde::Serialize;

use crate::store::RawDocument;

/// A connector that yields newly published documents.
#[async_trait::async_trait]
pub trait SourceProvider: Send + Sync {
    async fn fetch_latest(&self) -> Result<Vec<RawDocument>>;
    fn name(&self) -> &'static str;
}

/// Totals for one pass over every provider.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunStats {
    pub fetched: usize,
    pub accepted: usize,
    pub rejected: usize,
    pub failed_sources: usize,
}

impl RunStats {
    pub fn merge(&mut self, other: &RunStats) {
        self.fetched += other.fetched;
        self.accepted += other.accepted;
        self.rejected += other.rejected;
        self.failed_sources += other.failed_sources;
    }
}
