//! Two-pass image decoder.

use crate::sampler::{self, apply_orientation, calculate_sample_factor, SampleDecision};
use crate::{ContentStore, DecodeError, DecodedImage, ImageLocator, TargetSize};
use image::imageops;
use image::ImageReader;
use std::fs::File;
use std::io::{Cursor, Read};
use std::sync::Arc;
use tracing::debug;

/// Decodes and downsamples images to a fixed target size.
///
/// One instance serves one target size; every decode runs two passes, each
/// opening and closing its own source stream:
///
/// 1. a bounds pass that parses only the header for the native dimensions,
/// 2. a full pass with the computed sample factor, followed by rotation
///    from the source's orientation metadata.
///
/// The source may disappear between the two passes — a real race when the
/// backing file is deleted while a decode is queued — and that surfaces as
/// [`DecodeError::SourceUnavailable`], never a panic or a partial bitmap.
pub struct ImageDecoder {
    target: TargetSize,
    store: Arc<dyn ContentStore>,
}

impl ImageDecoder {
    pub fn new(target: TargetSize, store: Arc<dyn ContentStore>) -> Self {
        Self { target, store }
    }

    pub fn target(&self) -> TargetSize {
        self.target
    }

    /// Decode a locator to a sampled, correctly-oriented bitmap.
    pub fn decode(&self, locator: &ImageLocator) -> Result<DecodedImage, DecodeError> {
        // Bounds pass: header only.
        let header_bytes = self.open_and_read(locator)?;
        let (src_width, src_height) = probe_dimensions(&header_bytes)?;
        drop(header_bytes);

        let decision = SampleDecision {
            factor: calculate_sample_factor(
                src_width,
                src_height,
                self.target.width,
                self.target.height,
            ),
            rotation: sampler::lookup_rotation(self.store.as_ref(), locator),
        };
        debug!(
            locator = %locator.stable_key(),
            src_width,
            src_height,
            factor = decision.factor,
            degrees = decision.rotation.degrees(),
            "sample decision"
        );

        // Full pass: independent open, the source may be gone by now.
        let bytes = self.open_and_read(locator)?;
        let decoded = image::load_from_memory(&bytes)?.into_rgba8();

        let sampled = if decision.factor > 1 {
            imageops::thumbnail(
                &decoded,
                (decoded.width() / decision.factor).max(1),
                (decoded.height() / decision.factor).max(1),
            )
        } else {
            decoded
        };

        Ok(DecodedImage::new(apply_orientation(sampled, decision.rotation)))
    }

    /// Open a fresh stream for the locator, read it fully, close it.
    fn open_and_read(&self, locator: &ImageLocator) -> Result<Vec<u8>, DecodeError> {
        let unavailable = |source: std::io::Error| DecodeError::SourceUnavailable {
            reference: locator.stable_key(),
            source,
        };

        let mut stream: Box<dyn Read + Send> = match locator {
            ImageLocator::Path(path) => Box::new(File::open(path).map_err(unavailable)?),
            ImageLocator::Content(reference) => self.store.open(reference).map_err(unavailable)?,
        };

        let mut bytes = Vec::new();
        stream.read_to_end(&mut bytes).map_err(unavailable)?;
        Ok(bytes)
    }
}

/// Parse only the image header for its native dimensions.
fn probe_dimensions(bytes: &[u8]) -> Result<(u32, u32), DecodeError> {
    let format = image::guess_format(bytes)?;
    let dimensions = ImageReader::with_format(Cursor::new(bytes), format).into_dimensions()?;
    Ok(dimensions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::NoContentStore;
    use crate::{Bitmap, Rotation};
    use image::Rgba;
    use std::collections::HashMap;
    use std::io::Cursor;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let bitmap = Bitmap::from_pixel(width, height, Rgba([10, 20, 30, 255]));
        let mut bytes = Vec::new();
        bitmap
            .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
            .expect("encoding to memory should succeed");
        bytes
    }

    fn decoder(target: TargetSize) -> ImageDecoder {
        ImageDecoder::new(target, Arc::new(NoContentStore))
    }

    struct MapStore {
        entries: HashMap<String, Vec<u8>>,
        orientations: HashMap<String, i32>,
        opens: AtomicUsize,
        fail_after_opens: Option<usize>,
    }

    impl MapStore {
        fn new() -> Self {
            Self {
                entries: HashMap::new(),
                orientations: HashMap::new(),
                opens: AtomicUsize::new(0),
                fail_after_opens: None,
            }
        }

        fn with_entry(mut self, reference: &str, bytes: Vec<u8>) -> Self {
            self.entries.insert(reference.to_owned(), bytes);
            self
        }

        fn with_orientation(mut self, reference: &str, degrees: i32) -> Self {
            self.orientations.insert(reference.to_owned(), degrees);
            self
        }

        fn failing_after(mut self, opens: usize) -> Self {
            self.fail_after_opens = Some(opens);
            self
        }
    }

    impl ContentStore for MapStore {
        fn open(&self, reference: &str) -> std::io::Result<Box<dyn Read + Send>> {
            let count = self.opens.fetch_add(1, Ordering::SeqCst);
            if self.fail_after_opens.is_some_and(|limit| count >= limit) {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "source deleted",
                ));
            }
            self.entries
                .get(reference)
                .map(|bytes| Box::new(Cursor::new(bytes.clone())) as Box<dyn Read + Send>)
                .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::NotFound, "no such row"))
        }

        fn orientation_degrees(&self, reference: &str) -> Option<i32> {
            self.orientations.get(reference).copied()
        }
    }

    #[test]
    fn decodes_file_within_target_untouched() {
        let dir = tempfile::tempdir().expect("temp dir should be created");
        let path = dir.path().join("small.png");
        std::fs::write(&path, png_bytes(100, 50)).unwrap();

        let image = decoder(TargetSize::new(800, 480))
            .decode(&ImageLocator::Path(path))
            .expect("decode should succeed");

        assert_eq!((image.width(), image.height()), (100, 50));
    }

    #[test]
    fn downsamples_oversized_source() {
        let dir = tempfile::tempdir().expect("temp dir should be created");
        let path = dir.path().join("big.png");
        std::fs::write(&path, png_bytes(1600, 1200)).unwrap();

        let target = TargetSize::new(400, 240);
        let image = decoder(target)
            .decode(&ImageLocator::Path(path))
            .expect("decode should succeed");

        // Factor round(1200/240) = 5.
        assert_eq!((image.width(), image.height()), (320, 240));
        let pixels = image.width() as u64 * image.height() as u64;
        assert!(pixels <= 400 * 240 * 2);
    }

    #[test]
    fn missing_file_is_source_unavailable() {
        let dir = tempfile::tempdir().expect("temp dir should be created");
        let path = dir.path().join("nope.png");

        let err = decoder(TargetSize::new(100, 100))
            .decode(&ImageLocator::Path(path))
            .expect_err("decode should fail");

        assert!(matches!(err, DecodeError::SourceUnavailable { .. }));
    }

    #[test]
    fn corrupt_bytes_are_decode_failed() {
        let dir = tempfile::tempdir().expect("temp dir should be created");
        let path = dir.path().join("corrupt.png");
        std::fs::write(&path, b"not an image at all").unwrap();

        let err = decoder(TargetSize::new(100, 100))
            .decode(&ImageLocator::Path(path))
            .expect_err("decode should fail");

        assert!(matches!(err, DecodeError::DecodeFailed(_)));
    }

    #[test]
    fn content_locator_decodes_through_store() {
        let store = MapStore::new().with_entry("content://media/7", png_bytes(64, 32));
        let decoder = ImageDecoder::new(TargetSize::new(100, 100), Arc::new(store));

        let image = decoder
            .decode(&ImageLocator::Content("content://media/7".to_owned()))
            .expect("decode should succeed");

        assert_eq!((image.width(), image.height()), (64, 32));
    }

    #[test]
    fn store_orientation_rotates_result() {
        let store = MapStore::new()
            .with_entry("content://media/9", png_bytes(64, 32))
            .with_orientation("content://media/9", 90);
        let decoder = ImageDecoder::new(TargetSize::new(100, 100), Arc::new(store));

        let image = decoder
            .decode(&ImageLocator::Content("content://media/9".to_owned()))
            .expect("decode should succeed");

        // Dimensions swap under a quarter turn.
        assert_eq!((image.width(), image.height()), (32, 64));
    }

    #[test]
    fn missing_orientation_row_means_no_rotation() {
        let store = MapStore::new().with_entry("content://media/10", png_bytes(64, 32));
        let decoder = ImageDecoder::new(TargetSize::new(100, 100), Arc::new(store));

        let image = decoder
            .decode(&ImageLocator::Content("content://media/10".to_owned()))
            .expect("decode should succeed");

        assert_eq!((image.width(), image.height()), (64, 32));
    }

    #[test]
    fn source_deleted_between_passes_is_unavailable() {
        // First open (bounds pass) succeeds, second open fails: the decoder
        // must report an unavailable source, not crash or return garbage.
        let store = MapStore::new()
            .with_entry("content://media/11", png_bytes(64, 32))
            .failing_after(1);
        let decoder = ImageDecoder::new(TargetSize::new(100, 100), Arc::new(store));

        let err = decoder
            .decode(&ImageLocator::Content("content://media/11".to_owned()))
            .expect_err("decode should fail");

        assert!(matches!(err, DecodeError::SourceUnavailable { .. }));
    }

    #[test]
    fn file_without_exif_decodes_unrotated() {
        // PNGs carry no EXIF container; metadata lookup must quietly yield
        // no rotation rather than erroring.
        let dir = tempfile::tempdir().expect("temp dir should be created");
        let path = dir.path().join("plain.png");
        std::fs::write(&path, png_bytes(40, 20)).unwrap();

        assert_eq!(crate::orientation::from_exif(&path), Rotation::None);
    }
}
