//! Picstory background loading
//!
//! Binds display surfaces to image locators and resolves them off the UI
//! thread: memory hits answer synchronously, everything else goes through
//! a decode worker pool and comes back as a delivery the UI commits.
//! Rebinding a surface cancels its previous task cooperatively; delivery
//! re-checks the binding so recycled surfaces never show stale images.

pub mod cancel;
pub mod loader;
pub mod pool;
pub mod surface;

pub use cancel::CancellationToken;
pub use loader::{Delivery, ImageLoader, LoadOutcome, RequestOutcome};
pub use pool::{WorkerPool, WorkerPoolConfig};
pub use surface::SurfaceHandle;
