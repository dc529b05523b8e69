//! Named cache registry.
//!
//! Different views of the app (story thumbnails, full-screen pages) keep
//! separate caches with separate budgets and directories. The registry
//! hands out one shared [`ImageCache`] per name so every caller asking for
//! the same name gets the same tiers.

use crate::config::CacheConfig;
use crate::tiered::ImageCache;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::debug;

pub struct CacheRegistry {
    config: CacheConfig,
    caches: Mutex<HashMap<String, Arc<ImageCache>>>,
}

impl CacheRegistry {
    pub fn new(config: CacheConfig) -> Self {
        Self { config, caches: Mutex::new(HashMap::new()) }
    }

    /// Return the cache registered under `name`, creating it on first use.
    pub fn find_or_create(&self, name: &str) -> Arc<ImageCache> {
        let mut caches = self.caches.lock().unwrap();

        if let Some(cache) = caches.get(name) {
            return Arc::clone(cache);
        }

        debug!(name, "creating image cache");
        let cache =
            Arc::new(ImageCache::open(name, self.config.resolved_storage_root(), &self.config));
        caches.insert(name.to_owned(), Arc::clone(&cache));
        cache
    }

    /// Drop every registered cache's contents. Registered names stay valid.
    pub fn clear_all(&self) {
        let caches = self.caches.lock().unwrap();
        for cache in caches.values() {
            cache.clear();
        }
    }

    /// Release every cache's memory tier, keeping disk tiers intact.
    pub fn on_memory_pressure(&self) {
        let caches = self.caches.lock().unwrap();
        for cache in caches.values() {
            cache.on_memory_pressure();
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;
    use picstory_decode::{Bitmap, DecodedImage, ImageLocator};

    fn registry_in(dir: &std::path::Path) -> CacheRegistry {
        let config = CacheConfig::default()
            .with_memory_mb(4)
            .with_disk_mb(4)
            .with_storage_root(dir);
        CacheRegistry::new(config)
    }

    #[test]
    fn same_name_returns_same_cache() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry_in(dir.path());

        let first = registry.find_or_create("thumbs");
        let second = registry.find_or_create("thumbs");
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn distinct_names_are_isolated() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry_in(dir.path());

        let thumbs = registry.find_or_create("thumbs");
        let pages = registry.find_or_create("pages");
        assert!(!Arc::ptr_eq(&thumbs, &pages));

        let locator = ImageLocator::parse("/pictures/a.jpg");
        thumbs.put(
            &locator,
            DecodedImage::new(Bitmap::from_pixel(8, 8, Rgba([1, 2, 3, 255]))),
        );

        assert!(thumbs.get(&locator).is_some());
        assert!(pages.get(&locator).is_none());
    }

    #[test]
    fn clear_all_empties_every_cache() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry_in(dir.path());

        let thumbs = registry.find_or_create("thumbs");
        let locator = ImageLocator::parse("/pictures/b.jpg");
        thumbs.put(
            &locator,
            DecodedImage::new(Bitmap::from_pixel(8, 8, Rgba([1, 2, 3, 255]))),
        );

        registry.clear_all();
        assert!(thumbs.get(&locator).is_none());
    }
}
