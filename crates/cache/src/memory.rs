//! In-memory bitmap cache with LRU eviction.
//!
//! Process-lifetime tier: decoded bitmaps shared via `Arc`, evicted least
//! recently used when the configured byte budget would be exceeded, and
//! cleared wholesale on a low-memory signal from the host environment.

use crate::CacheKey;
use picstory_decode::DecodedImage;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

/// Statistics about memory-tier usage.
#[derive(Debug, Clone, Copy, Default)]
pub struct MemoryCacheStats {
    /// Number of bitmaps currently cached.
    pub entry_count: usize,
    /// Total bytes held by cached bitmaps.
    pub bytes_used: usize,
    /// Configured byte budget.
    pub byte_budget: usize,
    /// Lookup hits.
    pub hits: u64,
    /// Lookup misses.
    pub misses: u64,
    /// Entries evicted under budget pressure.
    pub evictions: u64,
}

impl MemoryCacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

struct CacheState {
    entries: HashMap<CacheKey, Arc<DecodedImage>>,
    /// Front = least recently used, back = most recently used.
    lru_queue: VecDeque<CacheKey>,
    bytes_used: usize,
    byte_budget: usize,
    stats: MemoryCacheStats,
}

impl CacheState {
    fn new(byte_budget: usize) -> Self {
        Self {
            entries: HashMap::new(),
            lru_queue: VecDeque::new(),
            bytes_used: 0,
            byte_budget,
            stats: MemoryCacheStats { byte_budget, ..Default::default() },
        }
    }

    fn touch(&mut self, key: CacheKey) {
        self.lru_queue.retain(|&k| k != key);
        self.lru_queue.push_back(key);
    }

    fn evict_lru(&mut self) -> bool {
        if let Some(key) = self.lru_queue.pop_front() {
            if let Some(image) = self.entries.remove(&key) {
                self.bytes_used = self.bytes_used.saturating_sub(image.byte_size());
                self.stats.evictions += 1;
                return true;
            }
        }
        false
    }

    fn evict_to_fit(&mut self, required: usize) {
        while self.bytes_used + required > self.byte_budget && !self.entries.is_empty() {
            if !self.evict_lru() {
                break;
            }
        }
    }

    fn sync_stats(&mut self) {
        self.stats.entry_count = self.entries.len();
        self.stats.bytes_used = self.bytes_used;
    }
}

/// Byte-bounded in-memory LRU cache of decoded bitmaps.
///
/// Thread-safe; structural mutations are guarded by one mutex per instance.
/// Values are immutable once stored and handed out as `Arc` clones, so
/// exactly one decoded copy exists per key no matter how many surfaces
/// display it.
pub struct MemoryCache {
    state: Mutex<CacheState>,
}

impl MemoryCache {
    /// Create a cache with the given byte budget.
    pub fn new(byte_budget: usize) -> Self {
        Self { state: Mutex::new(CacheState::new(byte_budget)) }
    }

    /// Look up a bitmap, promoting it to most recently used on a hit.
    pub fn get(&self, key: CacheKey) -> Option<Arc<DecodedImage>> {
        let mut state = self.state.lock().unwrap();

        if let Some(image) = state.entries.get(&key).cloned() {
            state.touch(key);
            state.stats.hits += 1;
            Some(image)
        } else {
            state.stats.misses += 1;
            None
        }
    }

    /// Store a bitmap, evicting least-recently-used entries to make room.
    ///
    /// An existing entry under the same key is replaced and promoted. A
    /// value larger than the entire budget is rejected outright — evicting
    /// everything else would empty the cache without ever fitting it —
    /// and `false` is returned; the caller still owns a usable `Arc`.
    pub fn put(&self, key: CacheKey, image: Arc<DecodedImage>) -> bool {
        let mut state = self.state.lock().unwrap();
        let size = image.byte_size();

        if size > state.byte_budget {
            warn!(key, size, budget = state.byte_budget, "bitmap larger than memory budget, not cached");
            return false;
        }

        if let Some(old) = state.entries.remove(&key) {
            state.bytes_used = state.bytes_used.saturating_sub(old.byte_size());
            state.lru_queue.retain(|&k| k != key);
        }

        state.evict_to_fit(size);

        state.bytes_used += size;
        state.entries.insert(key, image);
        state.touch(key);
        state.sync_stats();
        true
    }

    /// Check presence without updating recency.
    pub fn contains(&self, key: CacheKey) -> bool {
        let state = self.state.lock().unwrap();
        state.entries.contains_key(&key)
    }

    /// Remove a single entry.
    pub fn remove(&self, key: CacheKey) -> Option<Arc<DecodedImage>> {
        let mut state = self.state.lock().unwrap();

        let image = state.entries.remove(&key)?;
        state.bytes_used = state.bytes_used.saturating_sub(image.byte_size());
        state.lru_queue.retain(|&k| k != key);
        state.sync_stats();
        Some(image)
    }

    /// Drop every entry.
    ///
    /// Also the response to a low-memory signal: pressure callbacks carry no
    /// size hint, so the whole tier goes rather than guessing at a partial
    /// eviction.
    pub fn clear(&self) {
        let mut state = self.state.lock().unwrap();
        let dropped = state.entries.len();
        state.entries.clear();
        state.lru_queue.clear();
        state.bytes_used = 0;
        state.sync_stats();
        debug!(dropped, "memory cache cleared");
    }

    pub fn stats(&self) -> MemoryCacheStats {
        let mut state = self.state.lock().unwrap();
        state.sync_stats();
        state.stats
    }

    pub fn bytes_used(&self) -> usize {
        let state = self.state.lock().unwrap();
        state.bytes_used
    }

    pub fn byte_budget(&self) -> usize {
        let state = self.state.lock().unwrap();
        state.byte_budget
    }

    pub fn entry_count(&self) -> usize {
        let state = self.state.lock().unwrap();
        state.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use picstory_decode::Bitmap;

    fn image(width: u32, height: u32) -> Arc<DecodedImage> {
        Arc::new(DecodedImage::new(Bitmap::new(width, height)))
    }

    #[test]
    fn put_then_get_returns_same_bitmap() {
        let cache = MemoryCache::new(1024 * 1024);
        let img = image(16, 16);

        assert!(cache.put(1, img.clone()));

        let hit = cache.get(1).expect("entry should be cached");
        assert!(Arc::ptr_eq(&hit, &img));
    }

    #[test]
    fn miss_is_counted() {
        let cache = MemoryCache::new(1024);

        assert!(cache.get(99).is_none());

        let stats = cache.stats();
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hits, 0);
    }

    #[test]
    fn lru_entry_is_evicted_first() {
        // Budget fits two 16x16 RGBA bitmaps (1024 bytes each).
        let cache = MemoryCache::new(2048);

        cache.put(1, image(16, 16));
        cache.put(2, image(16, 16));
        cache.put(3, image(16, 16));

        assert!(cache.get(1).is_none());
        assert!(cache.get(2).is_some());
        assert!(cache.get(3).is_some());
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn get_promotes_entry() {
        let cache = MemoryCache::new(2048);

        cache.put(1, image(16, 16));
        cache.put(2, image(16, 16));

        assert!(cache.get(1).is_some());
        cache.put(3, image(16, 16));

        assert!(cache.contains(1));
        assert!(!cache.contains(2));
        assert!(cache.contains(3));
    }

    #[test]
    fn replacing_a_key_promotes_it() {
        let cache = MemoryCache::new(2048);

        cache.put(1, image(16, 16));
        cache.put(2, image(16, 16));
        cache.put(1, image(16, 16)); // replace + promote

        cache.put(3, image(16, 16)); // evicts 2, not 1

        assert!(cache.contains(1));
        assert!(!cache.contains(2));
        assert_eq!(cache.entry_count(), 2);
    }

    #[test]
    fn oversized_value_is_rejected_without_eviction() {
        let cache = MemoryCache::new(2048);
        cache.put(1, image(16, 16));

        // 64x64 RGBA = 16KB, larger than the whole budget.
        assert!(!cache.put(2, image(64, 64)));

        // Existing contents untouched.
        assert!(cache.contains(1));
        assert!(!cache.contains(2));
        assert_eq!(cache.stats().evictions, 0);
    }

    #[test]
    fn budget_holds_after_any_put_sequence() {
        let cache = MemoryCache::new(8 * 1024);

        for key in 0..100u64 {
            cache.put(key, image(16, 16));
            assert!(cache.bytes_used() <= cache.byte_budget());
        }
        assert!(cache.stats().evictions > 0);
    }

    #[test]
    fn clear_empties_the_tier() {
        let cache = MemoryCache::new(1024 * 1024);
        cache.put(1, image(16, 16));
        cache.put(2, image(16, 16));

        cache.clear();

        assert_eq!(cache.entry_count(), 0);
        assert_eq!(cache.bytes_used(), 0);
        assert!(!cache.contains(1));
    }

    #[test]
    fn remove_updates_accounting() {
        let cache = MemoryCache::new(1024 * 1024);
        cache.put(1, image(16, 16));

        assert!(cache.remove(1).is_some());
        assert_eq!(cache.bytes_used(), 0);
        assert!(cache.remove(1).is_none());
    }

    #[test]
    fn concurrent_access_stays_within_budget() {
        use std::thread;

        let cache = Arc::new(MemoryCache::new(64 * 1024));
        let mut handles = Vec::new();

        for thread_id in 0..4u64 {
            let cache = Arc::clone(&cache);
            handles.push(thread::spawn(move || {
                for i in 0..200 {
                    let key = thread_id * 1000 + i;
                    cache.put(key, image(16, 16));
                    let _ = cache.get(key);
                }
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }

        assert!(cache.bytes_used() <= cache.byte_budget());
    }
}
