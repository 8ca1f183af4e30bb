//! Progress-callback trait for per-page extraction events.
//!
//! Inject an [`Arc<dyn ExtractionProgressCallback>`] via
//! [`crate::config::ExtractionConfigBuilder::progress_callback`] to receive
//! events as the aggregator processes each page. Every page produces exactly
//! one `on_page_start` followed by exactly one of `on_page_complete` or
//! `on_page_error`.
//!
//! # Example
//!
//! ```rust
//! use notescan::{ExtractionConfig, ExtractionProgressCallback};
//! use std::sync::Arc;
//!
//! struct Log;
//!
//! impl ExtractionProgressCallback for Log {
//!     fn on_page_complete(&self, page: usize, total: usize, records: usize) {
//!         eprintln!("page {page}/{total}: {records} rows");
//!     }
//! }
//!
//! let config = ExtractionConfig::builder()
//!     .progress_callback(Arc::new(Log))
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the aggregator as it processes each page.
///
/// With `concurrency > 1` the per-page methods may be called concurrently
/// from different tasks, so implementations guard shared state themselves.
pub trait ExtractionProgressCallback: Send + Sync {
    /// Called once after rasterisation, before any page is interpreted.
    fn on_document_start(&self, total_pages: usize) {
        let _ = total_pages;
    }

    /// Called just before the first interpretation attempt for a page.
    fn on_page_start(&self, page: usize, total_pages: usize) {
        let _ = (page, total_pages);
    }

    /// Called when a page yielded records (possibly zero).
    fn on_page_complete(&self, page: usize, total_pages: usize, record_count: usize) {
        let _ = (page, total_pages, record_count);
    }

    /// Called when a page failed; `error` is the rendered [`crate::PageError`].
    fn on_page_error(&self, page: usize, total_pages: usize, error: &str) {
        let _ = (page, total_pages, error);
    }

    /// Called once after every page has an outcome.
    fn on_document_complete(&self, total_pages: usize, success_count: usize) {
        let _ = (total_pages, success_count);
    }
}

/// No-op callback used when nothing is configured.
pub struct NoopProgressCallback;

impl ExtractionProgressCallback for NoopProgressCallback {}

/// The type stored in [`crate::config::ExtractionConfig`].
pub type ProgressCallback = Arc<dyn ExtractionProgressCallback>;
