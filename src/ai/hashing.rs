//! Feature-hashing embedder.
//!
//! Tokens and adjacent-token bigrams are hashed into a fixed number of
//! signed buckets and the result is L2-normalized. Same text, same vector,
//! on every machine.

use async_trait::async_trait;

use super::Embedder;
use crate::error::AlphaError;
use crate::store::text::tokenize;

pub const DEFAULT_DIMENSIONS: usize = 256;

#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dims: usize,
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new(DEFAULT_DIMENSIONS)
    }
}

impl HashingEmbedder {
    pub fn new(dims: usize) -> Self {
        Self { dims: dims.max(8) }
    }

    pub fn dimensions(&self) -> usize {
        self.dims
    }

    pub fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; self.dims];
        let tokens: Vec<String> = tokenize(text).collect();

        for t in &tokens {
            self.bump(&mut v, t.as_bytes(), 1.0);
        }
        for pair in tokens.windows(2) {
            let bigram = format!("{} {}", pair[0], pair[1]);
            self.bump(&mut v, bigram.as_bytes(), 0.5);
        }

        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            v.iter_mut().for_each(|x| *x /= norm);
        }
        v
    }

    fn bump(&self, v: &mut [f32], key: &[u8], weight: f32) {
        let h = fnv1a(key);
        let idx = (h % self.dims as u64) as usize;
        let sign = if h >> 63 == 1 { -1.0 } else { 1.0 };
        v[idx] += sign * weight;
    }
}

fn fnv1a(bytes: &[u8]) -> u64 {
    let mut h: u64 = 0xcbf2_9ce4_8422_2325;
    for b in bytes {
        h ^= u64::from(*b);
        h = h.wrapping_mul(0x0100_0000_01b3);
    }
    h
}

#[async_trait]
impl Embedder for HashingEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, AlphaError> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }

    fn name(&self) -> &'static str {
        "hashing"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::dense::{cosine, l2_norm};

    fn sim(e: &HashingEmbedder, a: &str, b: &str) -> f32 {
        let (va, vb) = (e.embed_one(a), e.embed_one(b));
        cosine(&va, l2_norm(&va), &vb, l2_norm(&vb))
    }

    #[test]
    fn deterministic_and_normalized() {
        let e = HashingEmbedder::default();
        let a = e.embed_one("Apple faces lawsuit");
        assert_eq!(a, e.embed_one("apple FACES lawsuit!"));
        assert!((l2_norm(&a) - 1.0).abs() < 1e-5);
        assert_eq!(a.len(), DEFAULT_DIMENSIONS);
    }

    #[test]
    fn overlapping_text_is_closer() {
        let e = HashingEmbedder::default();
        let near = sim(&e, "aapl lawsuit legal trouble", "aapl lawsuit filed");
        let far = sim(&e, "aapl lawsuit legal trouble", "quarterly dividend raised");
        assert!(near > far);
    }

    #[test]
    fn empty_text_is_zero_vector() {
        let e = HashingEmbedder::new(16);
        assert!(e.embed_one("  ").iter().all(|x| *x == 0.0));
    }
}
