//! Content-store abstraction for non-file locators.

use std::io::Read;

/// Resolver for `content://` references.
///
/// The presentation layer owns the concrete store (on-device it fronts the
/// media database); this core only needs to open a byte stream for a
/// reference and to ask the store's metadata for an orientation value.
///
/// Each call to [`open`](Self::open) must return a fresh stream: the decoder
/// opens the source once for the bounds pass and again for the full decode.
pub trait ContentStore: Send + Sync {
    /// Open a fresh byte stream for the reference.
    fn open(&self, reference: &str) -> std::io::Result<Box<dyn Read + Send>>;

    /// Orientation in degrees from the store's metadata, `None` when the
    /// reference has no metadata row or the column is absent.
    fn orientation_degrees(&self, reference: &str) -> Option<i32>;
}

/// Store used when a loader only ever sees file-path locators.
///
/// Refuses every reference, which the decoder reports as an unavailable
/// source.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoContentStore;

impl ContentStore for NoContentStore {
    fn open(&self, reference: &str) -> std::io::Result<Box<dyn Read + Send>> {
        Err(std::io::Error::new(
            std::io::ErrorKind::Unsupported,
            format!("no content store configured for {reference}"),
        ))
    }

    fn orientation_degrees(&self, _reference: &str) -> Option<i32> {
        None
    }
}
