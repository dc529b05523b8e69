//! Sample-factor calculation and post-decode rotation.
//!
//! Pure functions; the decoder recomputes a [`SampleDecision`] for every
//! decode rather than storing it anywhere.

use crate::{Bitmap, ContentStore};
use image::imageops;

/// Clockwise rotation applied after decoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Rotation {
    #[default]
    None,
    Cw90,
    Cw180,
    Cw270,
}

impl Rotation {
    /// Interpret a degree value as reported by a content store's metadata.
    ///
    /// Anything other than 90/180/270 (including a missing value) means no
    /// rotation.
    pub fn from_degrees(degrees: i32) -> Self {
        match degrees {
            90 => Self::Cw90,
            180 => Self::Cw180,
            270 => Self::Cw270,
            _ => Self::None,
        }
    }

    /// Translate a raw EXIF orientation code into a rotation.
    ///
    /// Only the pure-rotation codes are honored; mirrored orientations and
    /// unknown codes fall back to no rotation.
    pub fn from_exif_code(code: u32) -> Self {
        match code {
            3 => Self::Cw180,
            6 => Self::Cw90,
            8 => Self::Cw270,
            _ => Self::None,
        }
    }

    pub fn degrees(self) -> u32 {
        match self {
            Self::None => 0,
            Self::Cw90 => 90,
            Self::Cw180 => 180,
            Self::Cw270 => 270,
        }
    }
}

/// Per-decode sampling decision: the integer divisor to shrink by while
/// decoding plus the rotation to apply afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleDecision {
    pub factor: u32,
    pub rotation: Rotation,
}

/// Calculate the integer sample factor for a decode.
///
/// Returns 1 when the source already fits within the requested bounds on
/// both axes. Otherwise the factor is estimated along the binding axis and
/// then refined upward until the total decoded pixel count is at most twice
/// the requested pixel count. The refinement keeps worst-case memory bounded
/// for extreme aspect ratios (panoramas), where the single-axis estimate
/// alone would under-sample.
///
/// The factor is not forced to a power of two: a slightly slower decode in
/// exchange for a tighter bitmap, which matters because results are cached
/// rather than redecoded per frame.
pub fn calculate_sample_factor(src_width: u32, src_height: u32, req_width: u32, req_height: u32) -> u32 {
    let req_width = req_width.max(1);
    let req_height = req_height.max(1);

    if src_height <= req_height && src_width <= req_width {
        return 1;
    }

    let mut factor = if src_width > src_height {
        (src_height as f32 / req_height as f32).round() as u32
    } else {
        (src_width as f32 / req_width as f32).round() as u32
    };
    factor = factor.max(1);

    let total_pixels = src_width as u64 * src_height as u64;
    let pixel_cap = req_width as u64 * req_height as u64 * 2;

    while total_pixels / (factor as u64 * factor as u64) > pixel_cap {
        factor += 1;
    }

    factor
}

/// Rotate a decoded bitmap clockwise.
///
/// `Rotation::None` returns the input untouched (no copy); any other
/// rotation allocates the rotated bitmap and drops the unrotated one.
pub fn apply_orientation(bitmap: Bitmap, rotation: Rotation) -> Bitmap {
    match rotation {
        Rotation::None => bitmap,
        Rotation::Cw90 => imageops::rotate90(&bitmap),
        Rotation::Cw180 => imageops::rotate180(&bitmap),
        Rotation::Cw270 => imageops::rotate270(&bitmap),
    }
}

/// Orientation lookup strategies.
///
/// File-path sources carry an embedded EXIF tag whose raw code needs
/// translation; content stores report a degree value directly. The two
/// lookups stay separate because their units differ at the source.
pub mod orientation {
    use super::Rotation;
    use crate::ContentStore;
    use std::fs::File;
    use std::io::BufReader;
    use std::path::Path;
    use tracing::debug;

    /// Read the rotation from a file's embedded EXIF metadata.
    ///
    /// Missing or unreadable metadata is not an error: the image decodes
    /// with no rotation.
    pub fn from_exif(path: &Path) -> Rotation {
        let file = match File::open(path) {
            Ok(file) => file,
            Err(_) => return Rotation::None,
        };

        let exif = match exif::Reader::new().read_from_container(&mut BufReader::new(file)) {
            Ok(exif) => exif,
            Err(_) => {
                debug!(path = %path.display(), "no readable exif metadata");
                return Rotation::None;
            }
        };

        let code = exif
            .get_field(exif::Tag::Orientation, exif::In::PRIMARY)
            .and_then(|field| field.value.get_uint(0))
            .unwrap_or(0);

        let rotation = Rotation::from_exif_code(code);
        debug!(path = %path.display(), code, degrees = rotation.degrees(), "exif orientation");
        rotation
    }

    /// Read the rotation from a content store's metadata row.
    ///
    /// The store reports degrees directly; a missing row means no rotation.
    pub fn from_store(store: &dyn ContentStore, reference: &str) -> Rotation {
        let degrees = store.orientation_degrees(reference).unwrap_or(0);
        debug!(reference, degrees, "store orientation");
        Rotation::from_degrees(degrees)
    }
}

/// Look up the rotation for a locator using the strategy matching its kind.
pub(crate) fn lookup_rotation(store: &dyn ContentStore, locator: &crate::ImageLocator) -> Rotation {
    match locator {
        crate::ImageLocator::Path(path) => orientation::from_exif(path),
        crate::ImageLocator::Content(reference) => orientation::from_store(store, reference),
    }
}
