//! Recommendation cache keyed by `(ticker, query, index_version)`.
//!
//! A new index version makes every older entry unreachable, so entries for
//! stale versions are pruned whenever a newer one is inserted. Capacity is a
//! hard bound; the oldest insertion is evicted first.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use metrics::counter;
use parking_lot::Mutex;

use crate::decision::Recommendation;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub ticker: String,
    pub query: String,
    pub index_version: u64,
}

impl CacheKey {
    pub fn new(ticker: &str, query: &str, index_version: u64) -> Self {
        Self {
            ticker: ticker.to_string(),
            query: query.to_string(),
            index_version,
        }
    }
}

#[derive(Debug, Default)]
struct Inner {
    map: HashMap<CacheKey, Arc<Recommendation>>,
    order: VecDeque<CacheKey>,
}

#[derive(Debug)]
pub struct RecommendationCache {
    inner: Mutex<Inner>,
    capacity: usize,
}

impl RecommendationCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            capacity,
        }
    }

    pub fn get(&self, key: &CacheKey) -> Option<Arc<Recommendation>> {
        if self.capacity == 0 {
            return None;
        }
        let hit = self.inner.lock().map.get(key).cloned();
        match hit {
            Some(_) => counter!("recommend_cache_hits_total").increment(1),
            None => counter!("recommend_cache_misses_total").increment(1),
        }
        hit
    }

    pub fn insert(&self, key: CacheKey, rec: Arc<Recommendation>) {
        if self.capacity == 0 {
            return;
        }
        let mut g = self.inner.lock();
        let version = key.index_version;
        g.map.retain(|k, _| k.index_version >= version);
        let Inner { map, order } = &mut *g;
        order.retain(|k| map.contains_key(k));

        if map.insert(key.clone(), rec).is_none() {
            order.push_back(key);
        }
        while order.len() > self.capacity {
            if let Some(old) = order.pop_front() {
                map.remove(&old);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        let mut g = self.inner.lock();
        g.map.clear();
        g.order.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decision::sample;

    #[test]
    fn hit_only_for_same_version() {
        let c = RecommendationCache::new(8);
        let k1 = CacheKey::new("AAPL", "AAPL stock news", 1);
        c.insert(k1.clone(), Arc::new(sample("AAPL", 1)));
        assert!(c.get(&k1).is_some());
        assert!(c.get(&CacheKey::new("AAPL", "AAPL stock news", 2)).is_none());
        assert!(c.get(&CacheKey::new("AAPL", "AAPL lawsuit", 1)).is_none());
    }

    #[test]
    fn newer_version_prunes_older_entries() {
        let c = RecommendationCache::new(8);
        c.insert(CacheKey::new("AAPL", "q", 1), Arc::new(sample("AAPL", 1)));
        c.insert(CacheKey::new("MSFT", "q", 1), Arc::new(sample("MSFT", 1)));
        assert_eq!(c.len(), 2);
        c.insert(CacheKey::new("AAPL", "q", 2), Arc::new(sample("AAPL", 2)));
        assert_eq!(c.len(), 1);
    }

    #[test]
    fn capacity_evicts_oldest() {
        let c = RecommendationCache::new(2);
        for t in ["A", "B", "C"] {
            c.insert(CacheKey::new(t, "q", 1), Arc::new(sample(t, 1)));
        }
        assert_eq!(c.len(), 2);
        assert!(c.get(&CacheKey::new("A", "q", 1)).is_none());
        assert!(c.get(&CacheKey::new("C", "q", 1)).is_some());
    }

    #[test]
    fn zero_capacity_disables_cache() {
        let c = RecommendationCache::new(0);
        let k = CacheKey::new("A", "q", 1);
        c.insert(k.clone(), Arc::new(sample("A", 1)));
        assert!(c.get(&k).is_none());
        assert!(c.is_empty());
    }
}
