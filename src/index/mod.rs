//! # Indexer
//!
//! Owns the current [`IndexView`] behind `RwLock<Arc<_>>`. Writers are
//! serialized by a separate mutex and publish a new view by swapping the
//! `Arc`; readers take a snapshot (an `Arc` clone) and never wait on a writer
//! that is embedding or rebuilding. `Arc::make_mut` copies only the view's
//! segment list; the segments themselves are shared with older snapshots.
//!
//! All chunks of one document are published in the same swap, so a
//! snapshot never contains half of a document.

pub mod dense;
pub mod lexical;
pub mod view;

use std::sync::Arc;

use metrics::{counter, gauge};
use parking_lot::{Mutex, RwLock};

use crate::ai::Embedder;
use crate::config::RetrievalConfig;
use crate::error::AlphaError;
use crate::store::{Chunk, Document, PreparedDocument};

pub use lexical::Bm25Params;
pub use view::{IndexEntry, IndexView};

/// What one `add` call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexReceipt {
    pub version: u64,
    pub chunks: usize,
    pub lexical_only: usize,
}

pub struct Indexer {
    embedder: Arc<dyn Embedder>,
    current: RwLock<Arc<IndexView>>,
    writer: Mutex<()>,
    bm25: Bm25Params,
}

impl Indexer {
    pub fn new(embedder: Arc<dyn Embedder>, cfg: &RetrievalConfig) -> Self {
        Self {
            embedder,
            current: RwLock::new(Arc::new(IndexView::default())),
            writer: Mutex::new(()),
            bm25: Bm25Params {
                k1: cfg.bm25_k1,
                b: cfg.bm25_b,
            },
        }
    }

    pub fn bm25(&self) -> Bm25Params {
        self.bm25
    }

    /// Consistent, immutable point-in-time view.
    pub fn snapshot(&self) -> Arc<IndexView> {
        self.current.read().clone()
    }

    pub fn version(&self) -> u64 {
        self.current.read().version()
    }

    /// Attach embeddings to a prepared document's chunks. An embedder
    /// failure leaves every chunk lexical-only.
    pub async fn embed(&self, prepared: &mut PreparedDocument) -> usize {
        let texts = prepared.index_texts();
        match self.embedder.embed(&texts).await {
            Ok(vectors) if vectors.len() == prepared.chunks.len() => {
                for (chunk, v) in prepared.chunks.iter_mut().zip(vectors) {
                    chunk.embedding = Some(v);
                }
                0
            }
            Ok(vectors) => {
                let err = AlphaError::EmbeddingUnavailable(format!(
                    "{} vectors for {} chunks",
                    vectors.len(),
                    prepared.chunks.len()
                ));
                self.degrade(prepared, &err)
            }
            Err(e) => self.degrade(prepared, &e),
        }
    }

    fn degrade(&self, prepared: &PreparedDocument, err: &AlphaError) -> usize {
        tracing::warn!(
            target: "ingest",
            doc = %prepared.document.short_id(),
            embedder = self.embedder.name(),
            error = %err,
            "embedding failed, indexing lexical-only"
        );
        counter!("index_lexical_only_chunks_total").increment(prepared.chunks.len() as u64);
        prepared.chunks.len()
    }

    /// Publish a committed document's chunks in one atomic swap.
    pub fn add(&self, doc: &Document, chunks: &[Arc<Chunk>], index_texts: &[String]) -> IndexReceipt {
        let entries: Vec<IndexEntry> = chunks
            .iter()
            .zip(index_texts)
            .map(|(c, t)| IndexEntry::new(doc, c.clone(), t))
            .collect();
        let lexical_only = entries.iter().filter(|e| !e.has_embedding()).count();

        let _w = self.writer.lock();
        let mut next = self.snapshot();
        Arc::make_mut(&mut next).insert_batch(entries);
        let version = next.version();
        let size = next.len();
        *self.current.write() = next;

        gauge!("index_chunks").set(size as f64);
        IndexReceipt {
            version,
            chunks: chunks.len(),
            lexical_only,
        }
    }

    /// Drop entries failing `keep`; returns the number removed.
    pub fn retain<F>(&self, keep: F) -> usize
    where
        F: Fn(&IndexEntry) -> bool,
    {
        let _w = self.writer.lock();
        let mut next = self.snapshot();
        let removed = Arc::make_mut(&mut next).retain(keep);
        if removed > 0 {
            gauge!("index_chunks").set(next.len() as f64);
            *self.current.write() = next;
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::hashing::HashingEmbedder;
    use crate::config::ChunkingConfig;
    use crate::store::{DocumentStore, RawDocument, TickerExtractor};
    use async_trait::async_trait;
    use chrono::Utc;

    struct BrokenEmbedder;

    #[async_trait]
    impl Embedder for BrokenEmbedder {
        async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>, AlphaError> {
            Err(AlphaError::EmbeddingUnavailable("offline".into()))
        }
        fn name(&self) -> &'static str {
            "broken"
        }
    }

    async fn index_one(indexer: &Indexer, store: &DocumentStore, title: &str) -> IndexReceipt {
        let mut p = store
            .prepare(RawDocument::new(title, "Apple shares moved today."), Utc::now())
            .unwrap();
        indexer.embed(&mut p).await;
        let texts = p.index_texts();
        let (doc, chunks) = store.commit(p).unwrap();
        indexer.add(&doc, &chunks, &texts)
    }

    fn store() -> DocumentStore {
        DocumentStore::new(&ChunkingConfig::default(), TickerExtractor::default_seed())
    }

    #[tokio::test]
    async fn old_snapshots_are_unaffected_by_writes() {
        let indexer = Indexer::new(Arc::new(HashingEmbedder::default()), &RetrievalConfig::default());
        let store = store();
        let before = indexer.snapshot();
        let r = index_one(&indexer, &store, "First story").await;
        assert_eq!(r.version, 1);
        assert_eq!(r.lexical_only, 0);
        assert!(before.is_empty());
        assert_eq!(indexer.snapshot().len(), 1);
        assert_eq!(indexer.version(), 1);
    }

    #[tokio::test]
    async fn embedder_failure_degrades_to_lexical_only() {
        let indexer = Indexer::new(Arc::new(BrokenEmbedder), &RetrievalConfig::default());
        let store = store();
        let r = index_one(&indexer, &store, "Second story").await;
        assert_eq!(r.lexical_only, r.chunks);
        let snap = indexer.snapshot();
        assert_eq!(snap.lexical_only_count(), 1);
        let terms = vec!["aapl".to_string()];
        assert_eq!(snap.lexical_top(&terms, 5, indexer.bm25(), Some("AAPL")).len(), 1);
    }

    #[tokio::test]
    async fn retain_only_bumps_version_on_removal() {
        let indexer = Indexer::new(Arc::new(HashingEmbedder::default()), &RetrievalConfig::default());
        let store = store();
        index_one(&indexer, &store, "Third story").await;
        assert_eq!(indexer.retain(|_| true), 0);
        assert_eq!(indexer.version(), 1);
        assert_eq!(indexer.retain(|_| false), 1);
        assert_eq!(indexer.version(), 2);
        assert!(indexer.snapshot().is_empty());
    }

    #[tokio::test]
    async fn publishing_shares_segments_with_older_snapshots() {
        let indexer = Indexer::new(Arc::new(HashingEmbedder::default()), &RetrievalConfig::default());
        let store = store();
        for i in 0..4 {
            index_one(&indexer, &store, &format!("Story {i}")).await;
        }
        let before = indexer.snapshot();
        assert_eq!(before.segment_count(), 1);

        index_one(&indexer, &store, "Story 4").await;
        let after = indexer.snapshot();
        assert_eq!(before.len(), 4);
        assert_eq!(after.len(), 5);
        assert_eq!(after.segment_count(), 2);
        assert_eq!(after.shared_segments(&before), 1);
    }
}
