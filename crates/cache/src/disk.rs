//! Persistent disk cache for decoded bitmaps.
//!
//! One file per entry, named by the stable hash of its locator, holding a
//! JPEG-encoded copy of the bitmap. A durable JSON index records every
//! entry's original-key hint, byte size and last-access order so both the
//! contents and the eviction order survive process restarts. A corrupt or
//! unreadable index is treated as an empty cache; files it no longer
//! describes are orphans reclaimed by the next full sweep.

use crate::CacheKey;
use image::codecs::jpeg::JpegEncoder;
use picstory_decode::DecodedImage;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, warn};

const INDEX_FILE: &str = "index.json";
const ENTRY_EXTENSION: &str = "img";
const INDEX_SCHEMA_VERSION: u32 = 1;
const JPEG_QUALITY: u8 = 85;

/// Statistics about disk-tier usage.
#[derive(Debug, Clone, Copy, Default)]
pub struct DiskCacheStats {
    pub entry_count: usize,
    pub bytes_used: u64,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct IndexRecord {
    /// Entry file stem, the stable hash in hex.
    key: String,
    /// Original locator string, kept as a debugging hint only.
    hint: String,
    /// Size of the encoded file in bytes.
    size: u64,
    /// Monotonic access order; higher = more recent.
    last_access: u64,
}

#[derive(Debug, Serialize, Deserialize)]
struct IndexEnvelope {
    version: u32,
    records: Vec<IndexRecord>,
}

#[derive(Debug, Clone)]
struct EntryMeta {
    hint: String,
    size: u64,
    last_access: u64,
}

struct CacheState {
    entries: HashMap<CacheKey, EntryMeta>,
    access_counter: u64,
    bytes_used: u64,
    byte_budget: u64,
    dir: PathBuf,
    stats: DiskCacheStats,
}

impl CacheState {
    fn entry_path(&self, key: CacheKey) -> PathBuf {
        self.dir.join(format!("{key:016x}.{ENTRY_EXTENSION}"))
    }

    fn index_path(&self) -> PathBuf {
        self.dir.join(INDEX_FILE)
    }

    fn touch(&mut self, key: CacheKey) {
        self.access_counter += 1;
        if let Some(meta) = self.entries.get_mut(&key) {
            meta.last_access = self.access_counter;
        }
    }

    /// Remove the least recently used entry and its file.
    fn evict_lru(&mut self) -> bool {
        let oldest = self
            .entries
            .iter()
            .min_by_key(|(_, meta)| meta.last_access)
            .map(|(key, _)| *key);

        let Some(key) = oldest else {
            return false;
        };

        if let Some(meta) = self.entries.remove(&key) {
            let path = self.entry_path(key);
            if let Err(err) = fs::remove_file(&path) {
                if err.kind() != io::ErrorKind::NotFound {
                    warn!(path = %path.display(), %err, "failed to remove evicted entry file");
                }
            }
            self.bytes_used = self.bytes_used.saturating_sub(meta.size);
            self.stats.evictions += 1;
        }
        true
    }

    fn evict_to_fit(&mut self, required: u64) {
        while self.bytes_used + required > self.byte_budget && !self.entries.is_empty() {
            if !self.evict_lru() {
                break;
            }
        }
    }

    fn drop_entry(&mut self, key: CacheKey) -> Option<EntryMeta> {
        let meta = self.entries.remove(&key)?;
        self.bytes_used = self.bytes_used.saturating_sub(meta.size);
        Some(meta)
    }

    /// Rewrite the durable index. Called under the instance mutex for every
    /// structural mutation so concurrent writers can never interleave.
    fn write_index(&self) -> io::Result<()> {
        let records = self
            .entries
            .iter()
            .map(|(key, meta)| IndexRecord {
                key: format!("{key:016x}"),
                hint: meta.hint.clone(),
                size: meta.size,
                last_access: meta.last_access,
            })
            .collect();

        let envelope = IndexEnvelope { version: INDEX_SCHEMA_VERSION, records };
        let bytes = serde_json::to_vec_pretty(&envelope).map_err(io::Error::other)?;
        fs::write(self.index_path(), bytes)
    }

    fn sync_stats(&mut self) {
        self.stats.entry_count = self.entries.len();
        self.stats.bytes_used = self.bytes_used;
    }
}

/// Bounded persistent cache of JPEG-encoded bitmaps.
///
/// Thread-safe; all structural mutations and the index rewrite happen under
/// one mutex per instance. One instance owns its directory exclusively —
/// two instances over the same directory would interleave index writes and
/// are not a supported configuration.
pub struct DiskCache {
    state: Mutex<CacheState>,
}

impl DiskCache {
    /// Open or create a disk cache in `dir` with the given byte budget.
    ///
    /// The directory is created when absent. An existing index restores the
    /// entries and their recency order; a corrupt index starts empty.
    pub fn open<P: AsRef<Path>>(dir: P, byte_budget: u64) -> io::Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;

        let mut state = CacheState {
            entries: HashMap::new(),
            access_counter: 0,
            bytes_used: 0,
            byte_budget,
            dir,
            stats: DiskCacheStats::default(),
        };

        match fs::read(state.index_path()) {
            Ok(bytes) => match serde_json::from_slice::<IndexEnvelope>(&bytes) {
                Ok(envelope) if envelope.version == INDEX_SCHEMA_VERSION => {
                    for record in envelope.records {
                        let Ok(key) = u64::from_str_radix(&record.key, 16) else {
                            continue;
                        };
                        state.access_counter = state.access_counter.max(record.last_access);
                        state.bytes_used += record.size;
                        state.entries.insert(
                            key,
                            EntryMeta {
                                hint: record.hint,
                                size: record.size,
                                last_access: record.last_access,
                            },
                        );
                    }
                }
                Ok(envelope) => {
                    warn!(version = envelope.version, "unknown index schema, starting empty");
                }
                Err(err) => {
                    warn!(%err, "corrupt disk cache index, starting empty");
                }
            },
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => {
                warn!(%err, "unreadable disk cache index, starting empty");
            }
        }

        state.sync_stats();
        Ok(Self { state: Mutex::new(state) })
    }

    /// Encode and persist a bitmap.
    ///
    /// Evicts least-recently-used entries until the encoded bytes fit the
    /// budget; returns `Ok(false)` without writing when they cannot fit even
    /// then. The skip is non-fatal by design — the decoded result is still
    /// usable by the caller, only persistence is lost.
    pub fn put(&self, key: CacheKey, hint: &str, image: &DecodedImage) -> io::Result<bool> {
        let encoded = encode_jpeg(image)?;
        let size = encoded.len() as u64;

        let mut state = self.state.lock().unwrap();

        if size > state.byte_budget {
            warn!(key, size, budget = state.byte_budget, "encoded bitmap larger than disk budget, write skipped");
            return Ok(false);
        }

        // Replacement: the old record goes away, the file is overwritten in place.
        state.drop_entry(key);

        state.evict_to_fit(size);

        if state.bytes_used + size > state.byte_budget {
            warn!(key, size, "insufficient disk budget after eviction, write skipped");
            state.sync_stats();
            state.write_index()?;
            return Ok(false);
        }

        fs::write(state.entry_path(key), &encoded)?;

        state.access_counter += 1;
        let last_access = state.access_counter;
        state.entries.insert(key, EntryMeta { hint: hint.to_owned(), size, last_access });
        state.bytes_used += size;
        state.sync_stats();
        state.write_index()?;

        Ok(true)
    }

    /// Read and decode a stored bitmap, promoting it on a hit.
    ///
    /// A missing or undecodable entry file is dropped from the index and
    /// reported as a miss.
    pub fn get(&self, key: CacheKey) -> Option<DecodedImage> {
        let mut state = self.state.lock().unwrap();

        if !state.entries.contains_key(&key) {
            state.stats.misses += 1;
            return None;
        }

        let path = state.entry_path(key);
        let decoded = fs::read(&path)
            .ok()
            .and_then(|bytes| image::load_from_memory(&bytes).ok())
            .map(|dynamic| DecodedImage::new(dynamic.into_rgba8()));

        match decoded {
            Some(image) => {
                state.touch(key);
                state.stats.hits += 1;
                if let Err(err) = state.write_index() {
                    warn!(%err, "failed to persist disk cache recency");
                }
                Some(image)
            }
            None => {
                warn!(key, path = %path.display(), "stale or corrupt disk entry, dropping");
                state.drop_entry(key);
                state.stats.misses += 1;
                state.sync_stats();
                if let Err(err) = state.write_index() {
                    warn!(%err, "failed to persist disk cache index");
                }
                None
            }
        }
    }

    /// Check presence without touching recency.
    pub fn contains(&self, key: CacheKey) -> bool {
        let state = self.state.lock().unwrap();
        state.entries.contains_key(&key)
    }

    /// Remove one entry and its file.
    pub fn remove(&self, key: CacheKey) -> io::Result<()> {
        let mut state = self.state.lock().unwrap();

        if state.drop_entry(key).is_some() {
            let path = state.entry_path(key);
            match fs::remove_file(&path) {
                Ok(()) => {}
                Err(err) if err.kind() == io::ErrorKind::NotFound => {}
                Err(err) => return Err(err),
            }
            state.sync_stats();
            state.write_index()?;
        }
        Ok(())
    }

    /// Remove every entry, including orphaned files the index no longer
    /// describes.
    pub fn clear(&self) -> io::Result<()> {
        let mut state = self.state.lock().unwrap();

        state.entries.clear();
        state.bytes_used = 0;

        for entry in fs::read_dir(&state.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|ext| ext.to_str()) == Some(ENTRY_EXTENSION) {
                fs::remove_file(&path).ok();
            }
        }

        state.sync_stats();
        state.write_index()?;
        debug!(dir = %state.dir.display(), "disk cache cleared");
        Ok(())
    }

    pub fn stats(&self) -> DiskCacheStats {
        let mut state = self.state.lock().unwrap();
        state.sync_stats();
        state.stats
    }

    pub fn entry_count(&self) -> usize {
        let state = self.state.lock().unwrap();
        state.entries.len()
    }

    pub fn bytes_used(&self) -> u64 {
        let state = self.state.lock().unwrap();
        state.bytes_used
    }

    pub fn byte_budget(&self) -> u64 {
        let state = self.state.lock().unwrap();
        state.byte_budget
    }

    pub fn dir(&self) -> PathBuf {
        let state = self.state.lock().unwrap();
        state.dir.clone()
    }
}

/// Encode a bitmap as JPEG for on-disk storage.
///
/// The stored encoding is deliberately lossy and independent of the RGBA
/// in-memory representation.
fn encode_jpeg(image: &DecodedImage) -> io::Result<Vec<u8>> {
    let rgb = image::DynamicImage::ImageRgba8(image.bitmap().clone()).into_rgb8();

    let mut bytes = Vec::new();
    JpegEncoder::new_with_quality(&mut bytes, JPEG_QUALITY)
        .encode_image(&rgb)
        .map_err(io::Error::other)?;
    Ok(bytes)
}
