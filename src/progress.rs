//! Progress-callback trait for per-card extraction events.
//!
//! Inject an [`Arc<dyn ExtractionProgressCallback>`] via
//! [`crate::config::ExtractionConfigBuilder::progress_callback`] to receive
//! events as the controller works through each card. The CLI uses this to
//! drive its progress bar; library callers can forward events anywhere.
//!
//! # Example
//!
//! ```rust
//! use recipe_extract::{ExtractionConfig, ExtractionProgressCallback};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     failed: AtomicUsize,
//! }
//!
//! impl ExtractionProgressCallback for CountingCallback {
//!     fn on_item_error(&self, index: usize, total: usize, label: &str, error: &str) {
//!         self.failed.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("card {index}/{total} ({label}) failed: {error}");
//!     }
//! }
//!
//! let cb = Arc::new(CountingCallback { failed: AtomicUsize::new(0) });
//! let config = ExtractionConfig::builder()
//!     .progress_callback(cb as Arc<dyn ExtractionProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the pairing controller as it processes each card.
///
/// Cards (pairs or trailing singletons) are processed one at a time, so
/// events for different cards never overlap. All methods default to no-ops.
pub trait ExtractionProgressCallback: Send + Sync {
    /// Called once after discovery, before the first card.
    ///
    /// `total_items` is the number of pairs plus singletons.
    fn on_run_start(&self, total_items: usize) {
        let _ = total_items;
    }

    /// Called before a card's images are normalised.
    ///
    /// `index` is 1-based; `label` is e.g. `"IMG_1.HEIC + IMG_2.HEIC"`.
    fn on_item_start(&self, index: usize, total: usize, label: &str) {
        let _ = (index, total, label);
    }

    /// Called when a card produced a recipe record.
    fn on_item_complete(&self, index: usize, total: usize, label: &str) {
        let _ = (index, total, label);
    }

    /// Called when a card ended in an image, transport or parse failure.
    fn on_item_error(&self, index: usize, total: usize, label: &str, error: &str) {
        let _ = (index, total, label, error);
    }

    /// Called once after every card has been attempted.
    fn on_run_complete(&self, total_items: usize, succeeded: usize) {
        let _ = (total_items, succeeded);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl ExtractionProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ExtractionConfig`].
pub type ProgressCallback = Arc<dyn ExtractionProgressCallback>;
