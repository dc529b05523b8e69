//! Display surface bindings.
//!
//! A surface stands for one recyclable display slot (a grid cell, a pager
//! page). At any moment it is bound to at most one image locator plus the
//! cancellation token of the task loading that image. Rebinding atomically
//! cancels the previous task's token, so a recycled slot never shows a
//! stale image.

use crate::cancel::CancellationToken;
use picstory_decode::ImageLocator;
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct BindingState {
    locator: Option<ImageLocator>,
    token: Option<CancellationToken>,
}

/// Cloneable handle to one display surface's binding.
///
/// Clones refer to the same surface; equality of surfaces is handle
/// identity, not value equality.
#[derive(Clone, Default)]
pub struct SurfaceHandle {
    inner: Arc<Mutex<BindingState>>,
}

impl SurfaceHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind this surface to `locator`, cancelling whatever task was bound
    /// before, and return the fresh token for the new task.
    pub fn bind(&self, locator: ImageLocator) -> CancellationToken {
        let mut state = self.inner.lock().unwrap();

        if let Some(previous) = state.token.take() {
            previous.cancel();
        }

        let token = CancellationToken::new();
        state.locator = Some(locator);
        state.token = Some(token.clone());
        token
    }

    /// Whether the surface is currently bound to exactly this locator.
    pub fn is_bound_to(&self, locator: &ImageLocator) -> bool {
        let state = self.inner.lock().unwrap();
        state.locator.as_ref() == Some(locator)
    }

    pub fn bound_locator(&self) -> Option<ImageLocator> {
        let state = self.inner.lock().unwrap();
        state.locator.clone()
    }

    /// Unbind the surface, cancelling any in-flight task.
    pub fn clear(&self) {
        let mut state = self.inner.lock().unwrap();

        if let Some(token) = state.token.take() {
            token.cancel();
        }
        state.locator = None;
    }

    /// Handle identity: two handles for the same surface.
    pub fn same_surface(&self, other: &SurfaceHandle) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}
