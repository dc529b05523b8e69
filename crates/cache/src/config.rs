//! Cache configuration for memory and disk budgets and cache locations.
//!
//! Configuration can be loaded from a file, environment variables, or
//! created programmatically. The memory budget defaults to a fraction of
//! device RAM, clamped so small devices still get a usable cache and large
//! ones do not hoard bitmaps.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Fraction of device RAM dedicated to the memory tier by default.
const MEMORY_FRACTION_DIVISOR: usize = 8;
const MIN_MEMORY_BUDGET: usize = 32 * 1024 * 1024;
const MAX_MEMORY_BUDGET: usize = 512 * 1024 * 1024;

/// Assumed device RAM when no hint is available.
const FALLBACK_RAM_MB: usize = 2048;

const DEFAULT_DISK_MB: u64 = 256;

/// Configuration for the image cache system.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheConfig {
    /// Memory tier size limit in bytes.
    pub memory_budget_bytes: usize,
    /// Disk tier size limit in bytes.
    pub disk_budget_bytes: u64,
    /// Root directory under which each named cache gets its own
    /// subdirectory. `None` means use the platform default.
    pub storage_root: Option<PathBuf>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            memory_budget_bytes: memory_budget_for_ram(FALLBACK_RAM_MB),
            disk_budget_bytes: DEFAULT_DISK_MB * 1024 * 1024,
            storage_root: None,
        }
    }
}

/// Derive a memory budget from a device RAM size in megabytes.
///
/// One eighth of RAM, clamped to [32 MB, 512 MB].
pub fn memory_budget_for_ram(total_ram_mb: usize) -> usize {
    let budget = (total_ram_mb * 1024 * 1024) / MEMORY_FRACTION_DIVISOR;
    budget.clamp(MIN_MEMORY_BUDGET, MAX_MEMORY_BUDGET)
}

impl CacheConfig {
    /// Creates a configuration with explicit budgets in megabytes.
    pub fn new(memory_mb: usize, disk_mb: u64, storage_root: PathBuf) -> Self {
        Self {
            memory_budget_bytes: memory_mb * 1024 * 1024,
            disk_budget_bytes: disk_mb * 1024 * 1024,
            storage_root: Some(storage_root),
        }
    }

    /// Sets the memory tier budget in megabytes.
    pub fn with_memory_mb(mut self, mb: usize) -> Self {
        self.memory_budget_bytes = mb * 1024 * 1024;
        self
    }

    /// Sets the disk tier budget in megabytes.
    pub fn with_disk_mb(mut self, mb: u64) -> Self {
        self.disk_budget_bytes = mb * 1024 * 1024;
        self
    }

    /// Sets the storage root directory.
    pub fn with_storage_root<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.storage_root = Some(path.as_ref().to_path_buf());
        self
    }

    /// Resolve the storage root, falling back to the platform default.
    pub fn resolved_storage_root(&self) -> PathBuf {
        self.storage_root.clone().unwrap_or_else(Self::default_storage_root)
    }

    /// Returns the default storage root for the current platform.
    ///
    /// - macOS: ~/Library/Caches/picstory
    /// - Linux: ~/.cache/picstory
    /// - Windows: %LOCALAPPDATA%\picstory
    pub fn default_storage_root() -> PathBuf {
        if let Some(cache_dir) = dirs::cache_dir() {
            cache_dir.join("picstory")
        } else {
            // Fallback to current directory if cache dir unavailable
            PathBuf::from("cache")
        }
    }

    /// Loads configuration from environment variables.
    ///
    /// Environment variables:
    /// - `PICSTORY_TOTAL_RAM_MB`: device RAM hint for the adaptive memory budget
    /// - `PICSTORY_MEMORY_CACHE_MB`: memory tier size in MB (overrides the hint)
    /// - `PICSTORY_DISK_CACHE_MB`: disk tier size in MB (default: 256)
    /// - `PICSTORY_CACHE_DIR`: storage root directory
    ///
    /// # Errors
    /// Returns an error if any variable contains an invalid value.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("PICSTORY_TOTAL_RAM_MB") {
            let ram_mb = val
                .parse::<usize>()
                .map_err(|_| ConfigError::InvalidValue("PICSTORY_TOTAL_RAM_MB".to_string()))?;
            config.memory_budget_bytes = memory_budget_for_ram(ram_mb);
        }

        if let Ok(val) = std::env::var("PICSTORY_MEMORY_CACHE_MB") {
            config.memory_budget_bytes = val
                .parse::<usize>()
                .map_err(|_| ConfigError::InvalidValue("PICSTORY_MEMORY_CACHE_MB".to_string()))?
                * 1024
                * 1024;
        }

        if let Ok(val) = std::env::var("PICSTORY_DISK_CACHE_MB") {
            config.disk_budget_bytes = val
                .parse::<u64>()
                .map_err(|_| ConfigError::InvalidValue("PICSTORY_DISK_CACHE_MB".to_string()))?
                * 1024
                * 1024;
        }

        if let Ok(val) = std::env::var("PICSTORY_CACHE_DIR") {
            config.storage_root = Some(PathBuf::from(val));
        }

        Ok(config)
    }

    /// Loads configuration from a key = value file.
    ///
    /// Expected format:
    /// ```text
    /// memory_cache_mb = 64
    /// disk_cache_mb = 256
    /// storage_root = "/path/to/cache"
    /// ```
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path.as_ref()).map_err(ConfigError::IoError)?;
        Self::from_str_contents(&contents)
    }

    fn from_str_contents(contents: &str) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        for line in contents.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            if let Some((key, value)) = line.split_once('=') {
                let key = key.trim();
                let value = value.trim().trim_matches('"');

                match key {
                    "memory_cache_mb" => {
                        config.memory_budget_bytes = value
                            .parse::<usize>()
                            .map_err(|_| ConfigError::InvalidValue(key.to_string()))?
                            * 1024
                            * 1024;
                    }
                    "disk_cache_mb" => {
                        config.disk_budget_bytes = value
                            .parse::<u64>()
                            .map_err(|_| ConfigError::InvalidValue(key.to_string()))?
                            * 1024
                            * 1024;
                    }
                    "storage_root" => {
                        config.storage_root = Some(PathBuf::from(value));
                    }
                    _ => {} // Ignore unknown keys
                }
            }
        }

        Ok(config)
    }

    /// Saves configuration to a key = value file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be written.
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        fs::write(path.as_ref(), self.to_file_contents()).map_err(ConfigError::IoError)
    }

    fn to_file_contents(&self) -> String {
        format!(
            "# Picstory Cache Configuration\n\
             memory_cache_mb = {}\n\
             disk_cache_mb = {}\n\
             storage_root = \"{}\"\n",
            self.memory_budget_bytes / (1024 * 1024),
            self.disk_budget_bytes / (1024 * 1024),
            self.resolved_storage_root().display()
        )
    }

    /// Returns the memory tier budget in megabytes.
    pub fn memory_cache_mb(&self) -> usize {
        self.memory_budget_bytes / (1024 * 1024)
    }

    /// Returns the disk tier budget in megabytes.
    pub fn disk_cache_mb(&self) -> u64 {
        self.disk_budget_bytes / (1024 * 1024)
    }
}

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for configuration key: {0}")]
    InvalidValue(String),
    #[error("I/O error: {0}")]
    IoError(#[source] io::Error),
}
