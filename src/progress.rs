//! Progress-callback trait for per-item batch events.
//!
//! Hand an [`Arc<dyn BatchProgressCallback>`] to
//! [`crate::processor::OcrProcessor::with_progress`] to receive events as a
//! batch walks its work list. The CLI drives an `indicatif` bar from it;
//! library callers can forward events wherever they like.
//!
//! # Example
//!
//! ```rust
//! use mistral_ocr::{BatchProgressCallback, ProcessResult};
//! use std::sync::atomic::{AtomicUsize, Ordering};
//!
//! struct Counter(AtomicUsize);
//!
//! impl BatchProgressCallback for Counter {
//!     fn on_item_complete(&self, index: usize, total: usize, result: &ProcessResult) {
//!         self.0.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("{}/{} → {}", index + 1, total, result.output_dir.display());
//!     }
//! }
//! ```

use crate::output::ProcessResult;
use std::path::Path;
use std::sync::Arc;

/// Called by the batch processor as it handles each item.
///
/// All methods have default no-op implementations so callers only override
/// what they care about. `index` is zero-based.
pub trait BatchProgressCallback: Send + Sync {
    /// Called once after inputs are expanded, before the first item.
    fn on_batch_start(&self, total: usize) {
        let _ = total;
    }

    /// Called before an item's first remote call (or skip check).
    fn on_item_start(&self, index: usize, total: usize, path: &Path) {
        let _ = (index, total, path);
    }

    /// Called when an item finishes, including items skipped as already done.
    fn on_item_complete(&self, index: usize, total: usize, result: &ProcessResult) {
        let _ = (index, total, result);
    }

    /// Called when an item fails.
    ///
    /// * `error`: human-readable error chain
    fn on_item_error(&self, index: usize, total: usize, error: &str) {
        let _ = (index, total, error);
    }

    /// Called once after every item has been attempted (or the batch aborted).
    fn on_batch_complete(&self, total: usize, succeeded: usize) {
        let _ = (total, succeeded);
    }
}

/// A no-op implementation, used when no callback is configured.
pub struct NoopProgressCallback;

impl BatchProgressCallback for NoopProgressCallback {}

/// Shared callback handle as stored by the processor.
pub type ProgressCallback = Arc<dyn BatchProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct TrackingCallback {
        starts: AtomicUsize,
        completes: AtomicUsize,
        errors: AtomicUsize,
        succeeded: AtomicUsize,
    }

    impl BatchProgressCallback for TrackingCallback {
        fn on_item_start(&self, _index: usize, _total: usize, _path: &Path) {
            self.starts.fetch_add(1, Ordering::SeqCst);
        }

        fn on_item_complete(&self, _index: usize, _total: usize, _result: &ProcessResult) {
            self.completes.fetch_add(1, Ordering::SeqCst);
        }

        fn on_item_error(&self, _index: usize, _total: usize, _error: &str) {
            self.errors.fetch_add(1, Ordering::SeqCst);
        }

        fn on_batch_complete(&self, _total: usize, succeeded: usize) {
            self.succeeded.store(succeeded, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_batch_start(2);
        cb.on_item_start(0, 2, Path::new("a.pdf"));
        cb.on_item_complete(0, 2, &ProcessResult::skipped(PathBuf::from("out/a")));
        cb.on_item_error(1, 2, "boom");
        cb.on_batch_complete(2, 1);
    }

    #[test]
    fn tracking_callback_receives_events() {
        let tracker = TrackingCallback::default();
        let done = ProcessResult::skipped(PathBuf::from("out/a"));

        tracker.on_item_start(0, 3, Path::new("a.pdf"));
        tracker.on_item_complete(0, 3, &done);
        tracker.on_item_start(1, 3, Path::new("b.pdf"));
        tracker.on_item_error(1, 3, "HTTP 500");
        tracker.on_item_start(2, 3, Path::new("c.pdf"));
        tracker.on_item_complete(2, 3, &done);
        tracker.on_batch_complete(3, 2);

        assert_eq!(tracker.starts.load(Ordering::SeqCst), 3);
        assert_eq!(tracker.completes.load(Ordering::SeqCst), 2);
        assert_eq!(tracker.errors.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.succeeded.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn arc_dyn_callback_works() {
        let cb: ProgressCallback = Arc::new(NoopProgressCallback);
        cb.on_batch_start(10);
        cb.on_item_start(0, 10, Path::new("x.pdf"));
    }
}
