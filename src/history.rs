//! history.rs — bounded in-memory log of recent recommendations.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::decision::Recommendation;

#[derive(Debug)]
pub struct History {
    inner: Mutex<VecDeque<Arc<Recommendation>>>,
    cap: usize,
}

impl History {
    pub fn with_capacity(cap: usize) -> Self {
        let cap = cap.clamp(1, 10_000);
        Self {
            inner: Mutex::new(VecDeque::with_capacity(cap)),
            cap,
        }
    }

    pub fn push(&self, rec: Arc<Recommendation>) {
        let mut v = self.inner.lock();
        v.push_back(rec);
        while v.len() > self.cap {
            v.pop_front();
        }
    }

    /// Newest first.
    pub fn last_n(&self, n: usize) -> Vec<Arc<Recommendation>> {
        self.inner.lock().iter().rev().take(n).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
