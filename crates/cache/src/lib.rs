//! Picstory cache library
//!
//! Two-tier bitmap cache: a byte-bounded in-memory LRU tier and a
//! persistent, JPEG-encoded disk tier with a durable index, composed behind
//! one keyed get/put/remove contract.

pub mod config;
pub mod disk;
pub mod memory;
pub mod registry;
pub mod tiered;

pub use config::{CacheConfig, ConfigError};
pub use disk::{DiskCache, DiskCacheStats};
pub use memory::{MemoryCache, MemoryCacheStats};
pub use registry::CacheRegistry;
pub use tiered::ImageCache;

/// Stable 64-bit key naming an entry in either tier.
///
/// Produced by [`picstory_decode::ImageLocator::cache_key`].
pub type CacheKey = u64;
