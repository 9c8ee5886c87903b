//! LRU cache of decoded frames, keyed by canonical URL and bounded by the
//! allocated byte cost of the decoded textures.

use {
    crate::frame::Frame,
    lru::LruCache,
    parking_lot::Mutex,
    std::sync::Arc,
    tap::prelude::*,
};

struct Entry {
    frame: Arc<Frame>,
    cost: usize,
}

struct Inner {
    entries: LruCache<String, Entry>,
    total_cost: usize,
}

/// All mutation happens under one mutex; the pipeline never holds the lock
/// across decode work.
pub struct TextureCache {
    inner: Mutex<Inner>,
    ceiling: usize,
}

impl TextureCache {
    pub fn new(ceiling_mb: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: LruCache::unbounded(),
                total_cost: 0,
            }),
            ceiling: ceiling_mb * 1024 * 1024,
        }
    }

    pub fn get(&self, url: &str) -> Option<Arc<Frame>> {
        self.inner
            .lock()
            .entries
            .get(url)
            .map(|entry| Arc::clone(&entry.frame))
            .tap_some(|_| tracing::debug!(%url, "texture cache hit"))
    }

    /// Peek without touching the LRU order.
    pub fn contains(&self, url: &str) -> bool {
        self.inner.lock().entries.peek(url).is_some()
    }

    pub fn put(&self, url: String, frame: Arc<Frame>) {
        let cost = frame.byte_cost();
        let mut inner = self.inner.lock();
        if let Some(previous) = inner.entries.put(url, Entry { frame, cost }) {
            inner.total_cost -= previous.cost;
        }
        inner.total_cost += cost;
        Self::evict(&mut inner, self.ceiling);
    }

    /// Evicts least-recently-used entries until the total cost is at most
    /// `cost_le` bytes.
    pub fn evict_until(&self, cost_le: usize) {
        Self::evict(&mut self.inner.lock(), cost_le);
    }

    fn evict(inner: &mut Inner, ceiling: usize) {
        while inner.total_cost > ceiling {
            match inner.entries.pop_lru() {
                Some((url, entry)) => {
                    inner.total_cost -= entry.cost;
                    tracing::debug!(%url, cost = entry.cost, "evicted texture");
                }
                None => break,
            }
        }
    }

    pub fn total_cost(&self) -> usize {
        self.inner.lock().total_cost
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
