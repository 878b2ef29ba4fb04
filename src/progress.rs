//! Progress-callback trait for per-slice conversion events.
//!
//! Inject an [`Arc<dyn ConversionProgressCallback>`] via
//! [`crate::config::ConversionConfigBuilder::progress_callback`] to receive
//! events as the pipeline transcribes each image slice and assembles the
//! document.
//!
//! # Why callbacks instead of channels?
//!
//! The callback approach is the least-invasive integration point: callers can
//! forward events to a channel, a WebSocket, or a terminal progress bar
//! without the library knowing how the host application communicates. The
//! trait is `Send + Sync` because slices are transcribed concurrently.
//!
//! # Example
//!
//! ```rust
//! use edgequake_math2docx::{ConversionProgressCallback, ConversionConfig};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     completed: Arc<AtomicUsize>,
//! }
//!
//! impl ConversionProgressCallback for CountingCallback {
//!     fn on_slice_complete(&self, slice_num: usize, total_slices: usize, text_len: usize) {
//!         self.completed.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("Slice {}/{} done ({} bytes)", slice_num, total_slices, text_len);
//!     }
//! }
//!
//! let counter = Arc::new(CountingCallback {
//!     completed: Arc::new(AtomicUsize::new(0)),
//! });
//!
//! let config = ConversionConfig::builder()
//!     .progress_callback(counter as Arc<dyn ConversionProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

use crate::pipeline::merge::MergeDecision;

/// Called by the conversion pipeline as it processes each slice.
///
/// All methods have default no-op implementations so callers only override
/// what they care about.
///
/// # Thread safety
///
/// `on_slice_start`, `on_slice_complete` and `on_slice_error` may be called
/// concurrently from different tasks. `on_slice_merged` and the document
/// events are always called from the task driving the conversion, in slice
/// order.
pub trait ConversionProgressCallback: Send + Sync {
    /// Called once after the image has been sliced.
    fn on_conversion_start(&self, total_slices: usize) {
        let _ = total_slices;
    }

    /// Called just before the VLM request is sent for a slice (1-indexed).
    fn on_slice_start(&self, slice_num: usize, total_slices: usize) {
        let _ = (slice_num, total_slices);
    }

    /// Called when a slice is transcribed; `text_len` is the byte length of
    /// the cleaned transcript.
    fn on_slice_complete(&self, slice_num: usize, total_slices: usize, text_len: usize) {
        let _ = (slice_num, total_slices, text_len);
    }

    /// Called when a slice fails after all retries are exhausted.
    fn on_slice_error(&self, slice_num: usize, total_slices: usize, error: &str) {
        let _ = (slice_num, total_slices, error);
    }

    /// Called when a slice transcript has been merged into the running text.
    fn on_slice_merged(&self, slice_num: usize, decision: &MergeDecision) {
        let _ = (slice_num, decision);
    }

    /// Called once the Word document has been assembled.
    ///
    /// * `formulas`  — display and inline formulas written
    /// * `fallbacks` — formulas kept as LaTeX source
    fn on_document_assembled(&self, formulas: usize, fallbacks: usize) {
        let _ = (formulas, fallbacks);
    }

    /// Called once at the end of the conversion.
    fn on_conversion_complete(&self, total_slices: usize, success_count: usize) {
        let _ = (total_slices, success_count);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl ConversionProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ConversionConfig`].
pub type ProgressCallback = Arc<dyn ConversionProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct TrackingCallback {
        starts: AtomicUsize,
        completes: AtomicUsize,
        errors: AtomicUsize,
        trimmed: AtomicUsize,
        fallbacks: AtomicUsize,
    }

    impl ConversionProgressCallback for TrackingCallback {
        fn on_slice_start(&self, _slice_num: usize, _total: usize) {
            self.starts.fetch_add(1, Ordering::SeqCst);
        }

        fn on_slice_complete(&self, _slice_num: usize, _total: usize, _len: usize) {
            self.completes.fetch_add(1, Ordering::SeqCst);
        }

        fn on_slice_error(&self, _slice_num: usize, _total: usize, _error: &str) {
            self.errors.fetch_add(1, Ordering::SeqCst);
        }

        fn on_slice_merged(&self, _slice_num: usize, decision: &MergeDecision) {
            if let MergeDecision::Trimmed { removed_chars } = decision {
                self.trimmed.fetch_add(*removed_chars, Ordering::SeqCst);
            }
        }

        fn on_document_assembled(&self, _formulas: usize, fallbacks: usize) {
            self.fallbacks.store(fallbacks, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_conversion_start(3);
        cb.on_slice_start(1, 3);
        cb.on_slice_complete(1, 3, 42);
        cb.on_slice_error(2, 3, "some error");
        cb.on_slice_merged(1, &MergeDecision::Appended);
        cb.on_document_assembled(4, 0);
        cb.on_conversion_complete(3, 2);
    }

    #[test]
    fn tracking_callback_receives_events() {
        let tracker = TrackingCallback::default();

        tracker.on_slice_start(1, 2);
        tracker.on_slice_complete(1, 2, 100);
        tracker.on_slice_start(2, 2);
        tracker.on_slice_error(2, 2, "VLM timeout");
        tracker.on_slice_merged(2, &MergeDecision::Trimmed { removed_chars: 17 });
        tracker.on_document_assembled(5, 1);

        assert_eq!(tracker.starts.load(Ordering::SeqCst), 2);
        assert_eq!(tracker.completes.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.errors.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.trimmed.load(Ordering::SeqCst), 17);
        assert_eq!(tracker.fallbacks.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn arc_dyn_callback_works() {
        let cb: Arc<dyn ConversionProgressCallback> = Arc::new(NoopProgressCallback);
        cb.on_conversion_start(1);
        cb.on_slice_complete(1, 1, 512);
    }
}
