//! # Document Store
//!
//! Append-only, deduplicated repository of ingested documents and their
//! chunks. A document's id is the SHA-256 of its normalized title and body,
//! so re-submitting the same article is an idempotent no-op.
//!
//! Ingestion is two-phase: [`DocumentStore::prepare`] normalizes, hashes,
//! extracts tickers and chunks; [`DocumentStore::commit`] performs the final
//! duplicate check under the write lock and takes ownership. Embedding runs
//! between the two so it never happens while a lock is held.

pub mod chunking;
pub mod text;
pub mod tickers;

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::config::ChunkingConfig;
use crate::error::RejectReason;

pub use tickers::{normalize_ticker, TickerExtractor};

/// Inbound document as submitted by a connector or the `/ingest` endpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawDocument {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub published_at: Option<DateTime<Utc>>,
    /// Caller-supplied tickers, unioned with the extracted ones.
    #[serde(default)]
    pub tickers: Vec<String>,
}

impl RawDocument {
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            content: content.into(),
            ..Default::default()
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn with_tickers<I, S>(mut self, tickers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tickers = tickers.into_iter().map(Into::into).collect();
        self
    }

    pub fn published(mut self, at: DateTime<Utc>) -> Self {
        self.published_at = Some(at);
        self
    }
}

/// Accepted, immutable document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Document {
    pub id: String,
    pub title: String,
    pub raw_text: String,
    pub source: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub published_at: DateTime<Utc>,
    pub tickers: BTreeSet<String>,
    pub ingested_at: DateTime<Utc>,
}

impl Document {
    /// First 12 hex chars; what logs show instead of any document text.
    pub fn short_id(&self) -> &str {
        &self.id[..self.id.len().min(12)]
    }
}

/// Contiguous, sentence-aligned span of one document.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub chunk_id: String,
    pub document_id: String,
    pub ordinal: usize,
    pub text: String,
    pub token_count: usize,
    /// `None` means the chunk is searchable lexically only.
    pub embedding: Option<Vec<f32>>,
}

impl Chunk {
    pub fn new(document_id: &str, ordinal: usize, text: String) -> Self {
        Self {
            chunk_id: format!("{document_id}:{ordinal:04}"),
            document_id: document_id.to_string(),
            ordinal,
            token_count: chunking::token_count(&text),
            text,
            embedding: None,
        }
    }
}

/// Output of the prepare phase; not yet owned by the store.
#[derive(Debug, Clone)]
pub struct PreparedDocument {
    pub document: Document,
    pub chunks: Vec<Chunk>,
}

impl PreparedDocument {
    /// Text the indexes see for each chunk: ticker symbols first so that a
    /// query for `AAPL` matches an article that only says "Apple".
    pub fn index_texts(&self) -> Vec<String> {
        let tickers = self
            .document
            .tickers
            .iter()
            .cloned()
            .collect::<Vec<_>>()
            .join(" ");
        self.chunks
            .iter()
            .map(|c| {
                if tickers.is_empty() {
                    c.text.clone()
                } else {
                    format!("{tickers} {}", c.text)
                }
            })
            .collect()
    }
}

#[derive(Default)]
struct StoreInner {
    docs: HashMap<String, Arc<Document>>,
    chunks: HashMap<String, Vec<Arc<Chunk>>>,
    /// ticker → document ids in ingestion order
    by_ticker: HashMap<String, Vec<String>>,
    chunk_count: usize,
}

pub struct DocumentStore {
    inner: RwLock<StoreInner>,
    tickers: TickerExtractor,
    max_tokens: usize,
}

impl DocumentStore {
    pub fn new(cfg: &ChunkingConfig, tickers: TickerExtractor) -> Self {
        Self {
            inner: RwLock::new(StoreInner::default()),
            tickers,
            max_tokens: cfg.max_tokens,
        }
    }

    /// Normalize, hash, extract tickers and chunk. Rejects missing fields and
    /// documents already present.
    pub fn prepare(
        &self,
        raw: RawDocument,
        now: DateTime<Utc>,
    ) -> Result<PreparedDocument, RejectReason> {
        let title = text::normalize_text(&raw.title);
        let body = text::normalize_text(&raw.content);
        if body.is_empty() {
            return Err(RejectReason::MissingField("content"));
        }

        let id = content_hash(&title, &body);
        if self.contains(&id) {
            return Err(RejectReason::Duplicate);
        }

        let mut tickers = self.tickers.extract(&format!("{title}. {body}"));
        tickers.extend(raw.tickers.iter().filter_map(|t| normalize_ticker(t)));

        // The title leads the first chunk so headline terms are searchable.
        let full = if title.is_empty() {
            body.clone()
        } else if title.ends_with(['.', '!', '?']) {
            format!("{title} {body}")
        } else {
            format!("{title}. {body}")
        };
        let chunks = chunking::chunk_text(&full, self.max_tokens)
            .into_iter()
            .enumerate()
            .map(|(i, t)| Chunk::new(&id, i, t))
            .collect();

        let document = Document {
            id,
            title,
            raw_text: body,
            source: raw
                .source
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| "unknown".to_string()),
            url: raw.url,
            published_at: raw.published_at.unwrap_or(now),
            tickers,
            ingested_at: now,
        };

        Ok(PreparedDocument { document, chunks })
    }

    /// Take ownership of a prepared document. The duplicate check is repeated
    /// under the write lock so concurrent submissions accept exactly once.
    pub fn commit(
        &self,
        prepared: PreparedDocument,
    ) -> Result<(Arc<Document>, Vec<Arc<Chunk>>), RejectReason> {
        let mut g = self.inner.write();
        if g.docs.contains_key(&prepared.document.id) {
            return Err(RejectReason::Duplicate);
        }

        let doc = Arc::new(prepared.document);
        let chunks: Vec<Arc<Chunk>> = prepared.chunks.into_iter().map(Arc::new).collect();

        for t in &doc.tickers {
            g.by_ticker.entry(t.clone()).or_default().push(doc.id.clone());
        }
        g.chunk_count += chunks.len();
        g.chunks.insert(doc.id.clone(), chunks.clone());
        g.docs.insert(doc.id.clone(), doc.clone());

        Ok((doc, chunks))
    }

    /// Canonical ticker for user input: a known company name or a symbol.
    pub fn resolve_ticker(&self, raw: &str) -> Option<String> {
        self.tickers
            .resolve_alias(raw)
            .map(str::to_string)
            .or_else(|| normalize_ticker(raw))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.inner.read().docs.contains_key(id)
    }

    pub fn get(&self, id: &str) -> Option<Arc<Document>> {
        self.inner.read().docs.get(id).cloned()
    }

    pub fn chunks_of(&self, id: &str) -> Vec<Arc<Chunk>> {
        self.inner.read().chunks.get(id).cloned().unwrap_or_default()
    }

    /// Newest documents (by `published_at`) mentioning `ticker`.
    pub fn documents_for(&self, ticker: &str, limit: usize) -> Vec<Arc<Document>> {
        let g = self.inner.read();
        let mut docs: Vec<Arc<Document>> = g
            .by_ticker
            .get(ticker)
            .map(|ids| ids.iter().filter_map(|id| g.docs.get(id).cloned()).collect())
            .unwrap_or_default();
        docs.sort_by(|a, b| {
            b.published_at
                .cmp(&a.published_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        docs.truncate(limit);
        docs
    }

    pub fn document_count(&self) -> usize {
        self.inner.read().docs.len()
    }

    pub fn chunk_count(&self) -> usize {
        self.inner.read().chunk_count
    }

    /// Drop documents for which `evict` returns true. Returns removed ids.
    pub fn evict_where<F>(&self, evict: F) -> Vec<String>
    where
        F: Fn(&Document) -> bool,
    {
        let mut g = self.inner.write();
        let removed: Vec<String> = g
            .docs
            .values()
            .filter(|d| {
                let doc: &Document = d;
                evict(doc)
            })
            .map(|d| d.id.clone())
            .collect();
        for id in &removed {
            if let Some(doc) = g.docs.remove(id) {
                for t in &doc.tickers {
                    if let Some(ids) = g.by_ticker.get_mut(t) {
                        ids.retain(|x| x != id);
                    }
                }
            }
            if let Some(chunks) = g.chunks.remove(id) {
                g.chunk_count -= chunks.len();
            }
        }
        removed
    }
}

/// Hex SHA-256 over normalized title and body.
pub fn content_hash(title: &str, body: &str) -> String {
    let mut h = Sha256::new();
    h.update(title.as_bytes());
    h.update([0x1f]);
    h.update(body.as_bytes());
    h.finalize()
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect::<String>()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> DocumentStore {
        DocumentStore::new(&ChunkingConfig::default(), TickerExtractor::default_seed())
    }

    #[test]
    fn prepare_hashes_chunks_and_tags() {
        let s = store();
        let p = s
            .prepare(
                RawDocument::new("Apple Faces Lawsuit", "Major legal trouble for Apple..."),
                Utc::now(),
            )
            .unwrap();
        assert_eq!(p.document.id.len(), 64);
        assert!(p.document.tickers.contains("AAPL"));
        assert_eq!(p.chunks.len(), 1);
        assert!(p.chunks[0].text.starts_with("Apple Faces Lawsuit."));
        assert!(p.chunks[0].chunk_id.starts_with(&p.document.id));
        assert!(p.index_texts()[0].starts_with("AAPL "));
    }

    #[test]
    fn missing_fields_are_rejected() {
        let s = store();
        assert_eq!(
            s.prepare(RawDocument::new("Title", "   "), Utc::now()).unwrap_err(),
            RejectReason::MissingField("content")
        );
        assert_eq!(
            s.prepare(RawDocument::new("", ""), Utc::now()).unwrap_err(),
            RejectReason::MissingField("content")
        );
        // a headline is optional
        let p = s.prepare(RawDocument::new("", "Body only."), Utc::now()).unwrap();
        assert_eq!(p.chunks[0].text, "Body only.");
    }

    #[test]
    fn resolves_names_and_symbols() {
        let s = store();
        assert_eq!(s.resolve_ticker("Apple").as_deref(), Some("AAPL"));
        assert_eq!(s.resolve_ticker("$msft").as_deref(), Some("MSFT"));
        assert_eq!(s.resolve_ticker("not a ticker"), None);
    }

    #[test]
    fn commit_is_idempotent() {
        let s = store();
        let raw = RawDocument::new("Title", "Body text here.");
        let p1 = s.prepare(raw.clone(), Utc::now()).unwrap();
        let p2 = s.prepare(raw.clone(), Utc::now()).unwrap();
        assert!(s.commit(p1).is_ok());
        assert_eq!(s.commit(p2).unwrap_err(), RejectReason::Duplicate);
        assert_eq!(s.prepare(raw, Utc::now()).unwrap_err(), RejectReason::Duplicate);
        assert_eq!(s.document_count(), 1);
        assert_eq!(s.chunk_count(), 1);
    }

    #[test]
    fn caller_tickers_are_unioned_and_normalized() {
        let s = store();
        let p = s
            .prepare(
                RawDocument::new("Chip news", "Nvidia ships new parts.").with_tickers(["$amd", "bad1"]),
                Utc::now(),
            )
            .unwrap();
        let t: Vec<_> = p.document.tickers.iter().cloned().collect();
        assert_eq!(t, vec!["AMD".to_string(), "NVDA".to_string()]);
    }

    #[test]
    fn documents_for_orders_newest_first_and_evicts() {
        let s = store();
        let old = Utc::now() - chrono::Duration::days(10);
        let new = Utc::now();
        for (title, at) in [("Old AAPL story", old), ("New AAPL story", new)] {
            let p = s
                .prepare(RawDocument::new(title, "Apple news.").published(at), Utc::now())
                .unwrap();
            s.commit(p).unwrap();
        }
        let docs = s.documents_for("AAPL", 10);
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].title, "New AAPL story");

        let removed = s.evict_where(|d| d.published_at < Utc::now() - chrono::Duration::days(5));
        assert_eq!(removed.len(), 1);
        assert_eq!(s.documents_for("AAPL", 10).len(), 1);
        assert_eq!(s.chunk_count(), 1);
    }
}
