//! Two-tier image cache: a fast in-memory LRU backed by an optional
//! persistent disk tier.
//!
//! Lookups consult memory first and fall back to disk, repopulating the
//! memory tier on a disk hit. Writes go to both tiers; a failed or skipped
//! disk write never fails the overall operation.

use crate::config::CacheConfig;
use crate::disk::DiskCache;
use crate::memory::MemoryCache;
use picstory_decode::{DecodedImage, ImageLocator};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};

pub struct ImageCache {
    name: String,
    memory: MemoryCache,
    disk: Option<DiskCache>,
}

impl ImageCache {
    /// Open the cache named `name` with its disk tier rooted under
    /// `storage_root`.
    ///
    /// When the disk directory cannot be created or its index cannot be
    /// opened the cache degrades to memory-only rather than failing; the
    /// app keeps working without persistence.
    pub fn open<P: AsRef<Path>>(name: &str, storage_root: P, config: &CacheConfig) -> Self {
        let memory = MemoryCache::new(config.memory_budget_bytes);

        let dir = storage_root.as_ref().join(name);
        let disk = match DiskCache::open(&dir, config.disk_budget_bytes) {
            Ok(disk) => Some(disk),
            Err(err) => {
                warn!(name, dir = %dir.display(), %err, "disk tier unavailable, running memory-only");
                None
            }
        };

        Self { name: name.to_owned(), memory, disk }
    }

    /// Build a memory-only cache, used when no storage root exists at all.
    pub fn memory_only(name: &str, config: &CacheConfig) -> Self {
        Self {
            name: name.to_owned(),
            memory: MemoryCache::new(config.memory_budget_bytes),
            disk: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn has_disk_tier(&self) -> bool {
        self.disk.is_some()
    }

    /// Memory-tier-only lookup, cheap enough for the UI thread.
    pub fn get_memory(&self, locator: &ImageLocator) -> Option<Arc<DecodedImage>> {
        self.memory.get(locator.cache_key())
    }

    /// Full lookup across both tiers.
    ///
    /// A disk hit is decoded back into memory so the next lookup for the
    /// same image is a memory hit.
    pub fn get(&self, locator: &ImageLocator) -> Option<Arc<DecodedImage>> {
        let key = locator.cache_key();

        if let Some(image) = self.memory.get(key) {
            return Some(image);
        }

        let disk = self.disk.as_ref()?;
        let image = Arc::new(disk.get(key)?);
        debug!(key, "disk hit, repopulating memory tier");
        self.memory.put(key, Arc::clone(&image));
        Some(image)
    }

    /// Store a freshly decoded image in both tiers.
    ///
    /// Returns the shared handle so the caller can deliver the same
    /// allocation it cached.
    pub fn put(&self, locator: &ImageLocator, image: DecodedImage) -> Arc<DecodedImage> {
        let key = locator.cache_key();
        let shared = Arc::new(image);

        self.memory.put(key, Arc::clone(&shared));

        if let Some(disk) = &self.disk {
            match disk.put(key, &locator.stable_key(), &shared) {
                Ok(true) => {}
                Ok(false) => debug!(key, "disk write skipped, entry too large for budget"),
                Err(err) => warn!(key, %err, "disk write failed"),
            }
        }

        shared
    }

    pub fn contains(&self, locator: &ImageLocator) -> bool {
        let key = locator.cache_key();
        self.memory.contains(key) || self.disk.as_ref().is_some_and(|disk| disk.contains(key))
    }

    /// Drop an image from both tiers.
    pub fn remove(&self, locator: &ImageLocator) {
        let key = locator.cache_key();
        self.memory.remove(key);
        if let Some(disk) = &self.disk {
            if let Err(err) = disk.remove(key) {
                warn!(key, %err, "failed to remove disk entry");
            }
        }
    }

    /// Empty both tiers.
    pub fn clear(&self) {
        self.memory.clear();
        if let Some(disk) = &self.disk {
            if let Err(err) = disk.clear() {
                warn!(%err, "failed to clear disk tier");
            }
        }
    }

    /// Low-memory response: release the memory tier, keep the disk tier so
    /// entries can be restored cheaply when pressure subsides.
    pub fn on_memory_pressure(&self) {
        debug!(name = %self.name, "memory pressure, releasing memory tier");
        self.memory.clear();
    }

    pub fn memory_tier(&self) -> &MemoryCache {
        &self.memory
    }

    pub fn disk_tier(&self) -> Option<&DiskCache> {
        self.disk.as_ref()
    }
}
