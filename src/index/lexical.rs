//! BM25 inverted index keyed by slot (position in the owning segment).

use std::collections::{HashMap, HashSet};

use serde::Serialize;

#[derive(Debug, Clone, Copy, Serialize)]
pub struct Bm25Params {
    pub k1: f32,
    pub b: f32,
}

impl Default for Bm25Params {
    fn default() -> Self {
        Self { k1: 1.5, b: 0.75 }
    }
}

#[derive(Debug, Clone, Copy)]
struct Posting {
    slot: u32,
    tf: u32,
}

#[derive(Debug, Clone, Default)]
pub struct LexicalIndex {
    postings: HashMap<String, Vec<Posting>>,
    lengths: Vec<u32>,
    total_len: u64,
}

impl LexicalIndex {
    /// Append a document at the next slot. Slots must be added in order.
    pub fn push(&mut self, terms: &[String]) -> usize {
        let slot = self.lengths.len();
        let mut tf: HashMap<&str, u32> = HashMap::new();
        for t in terms {
            *tf.entry(t.as_str()).or_default() += 1;
        }
        for (term, n) in tf {
            self.postings.entry(term.to_string()).or_default().push(Posting {
                slot: slot as u32,
                tf: n,
            });
        }
        self.lengths.push(terms.len() as u32);
        self.total_len += terms.len() as u64;
        slot
    }

    pub fn len(&self) -> usize {
        self.lengths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lengths.is_empty()
    }

    pub fn total_len(&self) -> u64 {
        self.total_len
    }

    /// Number of documents containing `term`.
    pub fn df(&self, term: &str) -> usize {
        self.postings.get(term).map_or(0, Vec::len)
    }

    /// Score against this index alone.
    pub fn score<F>(&self, query_terms: &[String], params: Bm25Params, allow: F) -> Vec<(usize, f32)>
    where
        F: Fn(usize) -> bool,
    {
        let stats = CorpusStats::gather([self], query_terms);
        self.score_with(&stats, query_terms, params, allow)
    }

    /// Score every slot that matches at least one query term and passes
    /// `allow`, using corpus-wide `stats` (never filtered). Slots are local
    /// to this index. Unordered.
    pub fn score_with<F>(
        &self,
        stats: &CorpusStats,
        query_terms: &[String],
        params: Bm25Params,
        allow: F,
    ) -> Vec<(usize, f32)>
    where
        F: Fn(usize) -> bool,
    {
        let avgdl = stats.avgdl().max(1.0);
        let mut seen = HashSet::new();
        let mut acc: HashMap<usize, f32> = HashMap::new();

        for term in query_terms {
            if !seen.insert(term.as_str()) {
                continue;
            }
            let Some(list) = self.postings.get(term) else {
                continue;
            };
            let idf = stats.idf(term);
            for p in list {
                let slot = p.slot as usize;
                if !allow(slot) {
                    continue;
                }
                let tf = p.tf as f32;
                let dl = self.lengths[slot] as f32;
                let denom = tf + params.k1 * (1.0 - params.b + params.b * dl / avgdl);
                *acc.entry(slot).or_default() += idf * tf * (params.k1 + 1.0) / denom;
            }
        }

        acc.into_iter().collect()
    }
}

/// Document count, total length and per-term document frequency summed over
/// several indexes, so segments score as if they were one corpus.
#[derive(Debug, Clone, Default)]
pub struct CorpusStats {
    docs: usize,
    total_len: u64,
    df: HashMap<String, usize>,
}

impl CorpusStats {
    pub fn gather<'a, I>(parts: I, query_terms: &[String]) -> Self
    where
        I: IntoIterator<Item = &'a LexicalIndex>,
    {
        let mut s = Self::default();
        for part in parts {
            s.docs += part.len();
            s.total_len += part.total_len();
            for t in query_terms {
                let n = part.df(t);
                if n > 0 {
                    *s.df.entry(t.clone()).or_default() += n;
                }
            }
        }
        s
    }

    pub fn docs(&self) -> usize {
        self.docs
    }

    fn avgdl(&self) -> f32 {
        if self.docs == 0 {
            0.0
        } else {
            self.total_len as f32 / self.docs as f32
        }
    }

    /// `ln(1 + (N - df + 0.5) / (df + 0.5))`, always positive.
    fn idf(&self, term: &str) -> f32 {
        let n = self.docs as f32;
        let df = self.df.get(term).copied().unwrap_or(0) as f32;
        (1.0 + (n - df + 0.5) / (df + 0.5)).ln()
    }
}
