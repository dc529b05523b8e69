//! Asynchronous image loading for display surfaces.
//!
//! `ImageLoader` ties the pieces together: a request binds a surface to a
//! locator, answers straight from the memory tier when it can, and
//! otherwise queues a load task on the worker pool. Completed tasks post a
//! [`Delivery`] that the UI thread commits; the commit re-reads the
//! surface binding at that moment, so a recycled surface never receives a
//! stale bitmap.
//!
//! A cancelled task that finishes its decode anyway still writes both
//! cache tiers. Cancellation only suppresses delivery; the decoded bytes
//! stay useful for the next surface that wants the same image.

use crate::cancel::CancellationToken;
use crate::pool::{WorkerPool, WorkerPoolConfig};
use crate::surface::SurfaceHandle;
use picstory_cache::ImageCache;
use picstory_decode::{DecodedImage, ImageDecoder, ImageLocator};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use tracing::{debug, warn};

/// What a completed load task produced.
#[derive(Debug)]
pub enum LoadOutcome {
    /// A decoded bitmap ready to display.
    Image(Arc<DecodedImage>),
    /// The load failed; the surface should fall back to its placeholder.
    Cleared,
}

/// Synchronous answer to a load request.
pub enum RequestOutcome {
    /// Memory hit; the bitmap can be displayed right away.
    Immediate(Arc<DecodedImage>),
    /// A background task was queued; a [`Delivery`] will follow.
    Scheduled,
    /// The surface is already bound to this image, nothing to do.
    AlreadyBound,
}

/// A completed load waiting to be applied to its surface.
pub struct Delivery {
    surface: SurfaceHandle,
    locator: ImageLocator,
    token: CancellationToken,
    outcome: LoadOutcome,
}

impl Delivery {
    pub fn locator(&self) -> &ImageLocator {
        &self.locator
    }

    pub fn surface(&self) -> &SurfaceHandle {
        &self.surface
    }

    /// Apply the delivery if it is still wanted.
    ///
    /// The surface binding is read here, at delivery time, not captured
    /// when the task was queued. Returns `None` when the task was
    /// cancelled or the surface has been rebound to a different image
    /// since the request.
    pub fn commit(self) -> Option<LoadOutcome> {
        if self.token.is_cancelled() {
            debug!(locator = %self.locator.stable_key(), "delivery dropped, task cancelled");
            return None;
        }

        if !self.surface.is_bound_to(&self.locator) {
            debug!(locator = %self.locator.stable_key(), "delivery dropped, surface rebound");
            return None;
        }

        Some(self.outcome)
    }
}

/// Front door for asynchronous image loading.
pub struct ImageLoader {
    cache: Arc<ImageCache>,
    decoder: Arc<ImageDecoder>,
    pool: WorkerPool,
    deliveries: Sender<Delivery>,
}

impl ImageLoader {
    /// Build a loader over `cache` and `decoder`, returning the receiving
    /// end of the delivery queue for the UI thread to drain.
    pub fn new(
        cache: Arc<ImageCache>,
        decoder: ImageDecoder,
        config: WorkerPoolConfig,
    ) -> (Self, Receiver<Delivery>) {
        let (deliveries, receiver) = mpsc::channel();
        let loader = Self {
            cache,
            decoder: Arc::new(decoder),
            pool: WorkerPool::new(config),
            deliveries,
        };
        (loader, receiver)
    }

    /// Request `locator` for `surface`.
    ///
    /// Binds the surface to the locator, cancelling whatever it was
    /// loading before. A memory-tier hit is returned synchronously with no
    /// task queued; everything else is resolved by a background task.
    pub fn request(&self, surface: &SurfaceHandle, locator: ImageLocator) -> RequestOutcome {
        if surface.is_bound_to(&locator) {
            return RequestOutcome::AlreadyBound;
        }

        if let Some(image) = self.cache.get_memory(&locator) {
            surface.bind(locator);
            return RequestOutcome::Immediate(image);
        }

        let token = surface.bind(locator.clone());

        let cache = Arc::clone(&self.cache);
        let decoder = Arc::clone(&self.decoder);
        let surface = surface.clone();
        let deliveries = self.deliveries.clone();

        self.pool.submit(Box::new(move || {
            // Disk tier first, then a full decode. Results are cached even
            // when the token was cancelled mid-flight; only delivery is
            // suppressed.
            let outcome = match cache.get(&locator) {
                Some(image) => LoadOutcome::Image(image),
                None => match decoder.decode(&locator) {
                    Ok(image) => LoadOutcome::Image(cache.put(&locator, image)),
                    Err(err) => {
                        warn!(locator = %locator.stable_key(), %err, "image load failed");
                        LoadOutcome::Cleared
                    }
                },
            };

            let delivery = Delivery { surface, locator, token, outcome };
            if deliveries.send(delivery).is_err() {
                debug!("delivery receiver dropped, discarding result");
            }
        }));

        RequestOutcome::Scheduled
    }

    /// Unbind `surface` and cancel its in-flight task, if any.
    pub fn cancel(&self, surface: &SurfaceHandle) {
        surface.clear();
    }

    pub fn cache(&self) -> &Arc<ImageCache> {
        &self.cache
    }

    /// Stop the worker pool, waiting for running tasks to finish.
    pub fn shutdown(self) {
        self.pool.shutdown();
    }
}
