//! Immutable, point-in-time view over both indexes.
//!
//! A view is a list of shared, append-only segments. Publishing a batch
//! clones the list (not the segments) and appends a new segment; adjacent
//! segments of similar size are merged on the way, so a view holds
//! O(log n) segments and each entry is rebuilt O(log n) times over its life.
//! Readers holding an older snapshot keep their segments alive and are never
//! affected by later writes.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Utc};

use super::dense::{cosine, l2_norm};
use super::lexical::{Bm25Params, CorpusStats, LexicalIndex};
use crate::store::{Chunk, Document};

#[derive(Debug, Clone)]
pub struct IndexEntry {
    pub chunk: Arc<Chunk>,
    pub tickers: Arc<BTreeSet<String>>,
    pub published_at: DateTime<Utc>,
    pub ingested_at: DateTime<Utc>,
    pub terms: Arc<Vec<String>>,
    norm: f32,
}

impl IndexEntry {
    pub fn new(doc: &Document, chunk: Arc<Chunk>, index_text: &str) -> Self {
        let norm = chunk.embedding.as_deref().map(l2_norm).unwrap_or(0.0);
        Self {
            tickers: Arc::new(doc.tickers.clone()),
            published_at: doc.published_at,
            ingested_at: doc.ingested_at,
            terms: Arc::new(crate::store::text::tokenize(index_text).collect()),
            chunk,
            norm,
        }
    }

    pub fn has_embedding(&self) -> bool {
        self.chunk.embedding.is_some()
    }
}

/// Entries plus their postings. Never mutated once shared.
#[derive(Debug, Default)]
struct Segment {
    entries: Vec<IndexEntry>,
    lexical: LexicalIndex,
    by_chunk: HashMap<String, usize>,
}

impl Segment {
    fn build(entries: Vec<IndexEntry>) -> Self {
        let mut seg = Segment::default();
        for e in entries {
            let slot = seg.lexical.push(&e.terms);
            seg.by_chunk.insert(e.chunk.chunk_id.clone(), slot);
            seg.entries.push(e);
        }
        seg
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

#[derive(Debug, Clone, Default)]
pub struct IndexView {
    segments: Vec<Arc<Segment>>,
    /// First global slot of each segment.
    offsets: Vec<usize>,
    len: usize,
    version: u64,
}

impl IndexView {
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    /// Segments held by both views (same allocation, not a copy).
    pub fn shared_segments(&self, other: &IndexView) -> usize {
        self.segments
            .iter()
            .filter(|s| other.segments.iter().any(|o| Arc::ptr_eq(s, o)))
            .count()
    }

    /// Entry at a global slot. Slots follow insertion order.
    pub fn entry(&self, slot: usize) -> &IndexEntry {
        let seg = self.offsets.partition_point(|&o| o <= slot) - 1;
        &self.segments[seg].entries[slot - self.offsets[seg]]
    }

    pub fn get(&self, chunk_id: &str) -> Option<&IndexEntry> {
        self.segments
            .iter()
            .find_map(|s| s.by_chunk.get(chunk_id).map(|&i| &s.entries[i]))
    }

    pub fn entries(&self) -> impl Iterator<Item = &IndexEntry> + '_ {
        self.segments.iter().flat_map(|s| s.entries.iter())
    }

    pub fn contains_document(&self, document_id: &str) -> bool {
        self.entries().any(|e| e.chunk.document_id == document_id)
    }

    pub fn lexical_only_count(&self) -> usize {
        self.entries().filter(|e| !e.has_embedding()).count()
    }

    pub(crate) fn insert_batch(&mut self, entries: Vec<IndexEntry>) {
        let mut fresh: Vec<IndexEntry> = Vec::with_capacity(entries.len());
        for e in entries {
            let id = &e.chunk.chunk_id;
            if self.get(id).is_none() && !fresh.iter().any(|f| &f.chunk.chunk_id == id) {
                fresh.push(e);
            }
        }
        if !fresh.is_empty() {
            self.len += fresh.len();
            let mut seg = Segment::build(fresh);
            while self.segments.last().is_some_and(|last| last.len() <= seg.len()) {
                let Some(last) = self.segments.pop() else { break };
                let mut merged = last.entries.clone();
                merged.append(&mut seg.entries);
                seg = Segment::build(merged);
            }
            self.segments.push(Arc::new(seg));
            self.reindex_offsets();
        }
        self.version += 1;
    }

    /// Rebuild without the entries failing `keep`. Returns the number
    /// removed; nothing changes (version included) when that is zero.
    pub(crate) fn retain<F>(&mut self, keep: F) -> usize
    where
        F: Fn(&IndexEntry) -> bool,
    {
        let removed = self.entries().filter(|e| !keep(e)).count();
        if removed == 0 {
            return 0;
        }
        let kept: Vec<IndexEntry> = self.entries().filter(|e| keep(e)).cloned().collect();
        self.len = kept.len();
        self.segments.clear();
        if !kept.is_empty() {
            self.segments.push(Arc::new(Segment::build(kept)));
        }
        self.reindex_offsets();
        self.version += 1;
        removed
    }

    fn reindex_offsets(&mut self) {
        self.offsets.clear();
        let mut at = 0;
        for s in &self.segments {
            self.offsets.push(at);
            at += s.len();
        }
    }

    /// Top-`m` chunks by cosine similarity. Chunks without an embedding are
    /// not candidates. Ordered by score desc, then chunk id.
    pub fn dense_top(&self, query: &[f32], m: usize, ticker: Option<&str>) -> Vec<(usize, f32)> {
        let qn = l2_norm(query);
        if qn == 0.0 || m == 0 {
            return Vec::new();
        }
        let scored = self
            .entries()
            .enumerate()
            .filter(|(_, e)| allowed(e, ticker))
            .filter_map(|(slot, e)| {
                let v = e.chunk.embedding.as_deref()?;
                Some((slot, cosine(query, qn, v, e.norm)))
            })
            .collect();
        self.top_m(scored, m)
    }

    /// Top-`m` chunks by BM25 over all segments, with corpus statistics of
    /// the whole view. Ordered by score desc, then chunk id.
    pub fn lexical_top(
        &self,
        terms: &[String],
        m: usize,
        params: Bm25Params,
        ticker: Option<&str>,
    ) -> Vec<(usize, f32)> {
        if m == 0 || self.is_empty() {
            return Vec::new();
        }
        let stats = CorpusStats::gather(self.segments.iter().map(|s| &s.lexical), terms);
        let mut scored = Vec::new();
        for (seg, offset) in self.segments.iter().zip(&self.offsets) {
            let local = seg
                .lexical
                .score_with(&stats, terms, params, |slot| allowed(&seg.entries[slot], ticker));
            scored.extend(local.into_iter().map(|(slot, s)| (slot + offset, s)));
        }
        self.top_m(scored, m)
    }

    fn top_m(&self, mut scored: Vec<(usize, f32)>, m: usize) -> Vec<(usize, f32)> {
        scored.sort_by(|a, b| {
            b.1.total_cmp(&a.1)
                .then_with(|| self.entry(a.0).chunk.chunk_id.cmp(&self.entry(b.0).chunk.chunk_id))
        });
        scored.truncate(m);
        scored
    }
}

fn allowed(e: &IndexEntry, ticker: Option<&str>) -> bool {
    ticker.map_or(true, |t| e.tickers.contains(t))
}
