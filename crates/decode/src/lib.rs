//! Picstory decode library
//!
//! Locator model, sample-factor calculation and the two-pass image decoder.
//!
//! A locator identifies an image source (filesystem path or content-store
//! reference). The decoder probes the source's native dimensions first,
//! derives an integer sample factor that shrinks the image to the smallest
//! size still covering the requested display bounds, then decodes and
//! rotates according to the source's orientation metadata.

mod decoder;
mod sampler;
mod source;

pub use decoder::ImageDecoder;
pub use sampler::{apply_orientation, calculate_sample_factor, orientation, Rotation, SampleDecision};
pub use source::{ContentStore, NoContentStore};

use image::{ImageBuffer, Rgba};
use std::path::PathBuf;

/// RGBA bitmap used throughout the pipeline.
pub type Bitmap = ImageBuffer<Rgba<u8>, Vec<u8>>;

/// Scheme prefix identifying content-store references.
pub const CONTENT_SCHEME: &str = "content://";

/// Scheme prefix stripped from incoming file locators.
pub const FILE_SCHEME: &str = "file://";

/// Errors produced by the decoder.
///
/// Both variants are handled locally by the loading layer and surface to the
/// UI as a cleared image; neither ever propagates as a panic.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// The source stream could not be opened or read (missing file, revoked
    /// access, source deleted between the bounds pass and the full pass).
    #[error("source unavailable: {reference}")]
    SourceUnavailable {
        reference: String,
        #[source]
        source: std::io::Error,
    },
    /// The bytes opened but did not parse as a valid image.
    #[error("decode failed: {0}")]
    DecodeFailed(#[from] image::ImageError),
}

/// Opaque reference to an image source.
///
/// Immutable once created; the normalized form is the cache key for both
/// cache tiers.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ImageLocator {
    /// Absolute filesystem path.
    Path(PathBuf),
    /// Content-store reference, kept verbatim including its scheme.
    Content(String),
}

impl ImageLocator {
    /// Parse a raw locator string as handed over by the presentation layer.
    ///
    /// Strings carrying the content scheme become content references;
    /// everything else is a filesystem path, with a leading `file://`
    /// stripped when present.
    pub fn parse(raw: &str) -> Self {
        if raw.starts_with(CONTENT_SCHEME) {
            Self::Content(raw.to_owned())
        } else if let Some(path) = raw.strip_prefix(FILE_SCHEME) {
            Self::Path(PathBuf::from(path))
        } else {
            Self::Path(PathBuf::from(raw))
        }
    }

    /// Normalized string form, stable across process restarts.
    pub fn stable_key(&self) -> String {
        match self {
            Self::Path(path) => path.to_string_lossy().into_owned(),
            Self::Content(reference) => reference.clone(),
        }
    }

    /// Stable 64-bit key used to name cache entries.
    ///
    /// FNV-1a over the normalized form; deliberately not the std hasher,
    /// whose keys vary per process and would orphan every disk entry on
    /// restart.
    pub fn cache_key(&self) -> u64 {
        const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
        const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

        let mut hash = FNV_OFFSET;
        for byte in self.stable_key().as_bytes() {
            hash ^= u64::from(*byte);
            hash = hash.wrapping_mul(FNV_PRIME);
        }
        hash
    }
}

/// Minimum bitmap bounds required for display.
///
/// Supplied once per decoder instance; all requests through one instance
/// share the same target size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetSize {
    pub width: u32,
    pub height: u32,
}

impl TargetSize {
    /// Create a target size. Zero dimensions are clamped to one pixel.
    pub fn new(width: u32, height: u32) -> Self {
        Self { width: width.max(1), height: height.max(1) }
    }
}

/// A decoded, correctly-oriented bitmap plus its measured byte footprint.
#[derive(Debug, Clone)]
pub struct DecodedImage {
    bitmap: Bitmap,
}

impl DecodedImage {
    pub fn new(bitmap: Bitmap) -> Self {
        Self { bitmap }
    }

    pub fn width(&self) -> u32 {
        self.bitmap.width()
    }

    pub fn height(&self) -> u32 {
        self.bitmap.height()
    }

    /// In-memory footprint of the pixel data in bytes.
    pub fn byte_size(&self) -> usize {
        self.bitmap.as_raw().len()
    }

    pub fn bitmap(&self) -> &Bitmap {
        &self.bitmap
    }

    pub fn into_bitmap(self) -> Bitmap {
        self.bitmap
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_detects_content_scheme() {
        let locator = ImageLocator::parse("content://media/external/images/42");
        assert_eq!(
            locator,
            ImageLocator::Content("content://media/external/images/42".to_owned())
        );
    }

    #[test]
    fn parse_strips_file_scheme() {
        let locator = ImageLocator::parse("file:///sdcard/pictures/img.jpg");
        assert_eq!(locator, ImageLocator::Path(PathBuf::from("/sdcard/pictures/img.jpg")));
    }

    #[test]
    fn parse_accepts_bare_path() {
        let locator = ImageLocator::parse("/tmp/photo.png");
        assert_eq!(locator, ImageLocator::Path(PathBuf::from("/tmp/photo.png")));
    }

    #[test]
    fn cache_key_is_stable_and_distinct() {
        let a = ImageLocator::parse("/tmp/a.jpg");
        let b = ImageLocator::parse("/tmp/b.jpg");

        assert_eq!(a.cache_key(), ImageLocator::parse("/tmp/a.jpg").cache_key());
        assert_ne!(a.cache_key(), b.cache_key());
    }

    #[test]
    fn target_size_clamps_zero() {
        let target = TargetSize::new(0, 0);
        assert_eq!(target, TargetSize { width: 1, height: 1 });
    }

    #[test]
    fn decoded_image_reports_byte_size() {
        let image = DecodedImage::new(Bitmap::new(8, 4));
        assert_eq!(image.byte_size(), 8 * 4 * 4);
        assert_eq!(image.width(), 8);
        assert_eq!(image.height(), 4);
    }
}
