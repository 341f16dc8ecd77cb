//! Progress-callback trait for per-record ingestion events.
//!
//! Pass an [`Arc<dyn IngestProgressCallback>`] to
//! [`crate::ingest::Ingestor::with_progress`] to receive events as the
//! pipeline works through a day's search hits. The CLI uses it to drive a
//! progress bar; a server can forward events to its own logging.
//!
//! # Example
//!
//! ```rust
//! use verkeersbesluit_ingest::{IngestProgressCallback, RecordError};
//! use std::sync::atomic::{AtomicUsize, Ordering};
//!
//! struct SkipCounter(AtomicUsize);
//!
//! impl IngestProgressCallback for SkipCounter {
//!     fn on_record_skipped(&self, _index: usize, _total: usize, reason: &RecordError) {
//!         self.0.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("skipped: {reason}");
//!     }
//! }
//! ```

use crate::error::RecordError;
use std::sync::Arc;

/// Called by the pipeline as it processes each search record.
///
/// Implementations must be `Send + Sync`: with `concurrency > 1` records are
/// processed concurrently and events arrive out of order. All methods
/// default to no-ops.
pub trait IngestProgressCallback: Send + Sync {
    /// Called once the search response is parsed.
    ///
    /// # Arguments
    /// * `date`: the day being ingested
    /// * `total_records`: hits with a content URL
    fn on_run_start(&self, date: &str, total_records: usize) {
        let _ = (date, total_records);
    }

    /// Called before a record's content is fetched.
    ///
    /// # Arguments
    /// * `index`: 1-based position in the search response
    fn on_record_start(&self, index: usize, total_records: usize) {
        let _ = (index, total_records);
    }

    /// Called when a record made it into the result.
    ///
    /// # Arguments
    /// * `id`: the decision id
    /// * `image_count`: image references located
    fn on_record_complete(&self, index: usize, total_records: usize, id: &str, image_count: usize) {
        let _ = (index, total_records, id, image_count);
    }

    /// Called when a record was left out of the result.
    fn on_record_skipped(&self, index: usize, total_records: usize, reason: &RecordError) {
        let _ = (index, total_records, reason);
    }

    /// Called once every record has been attempted.
    ///
    /// # Arguments
    /// * `kept`: records in the result
    fn on_run_complete(&self, total_records: usize, kept: usize) {
        let _ = (total_records, kept);
    }
}

/// A no-op implementation, used when no callback is configured.
pub struct NoopProgressCallback;

impl IngestProgressCallback for NoopProgressCallback {}

/// Convenience alias for the type the ingestor stores.
pub type ProgressCallback = Arc<dyn IngestProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct TrackingCallback {
        starts: AtomicUsize,
        completes: AtomicUsize,
        skips: AtomicUsize,
        kept: AtomicUsize,
    }

    impl IngestProgressCallback for TrackingCallback {
        fn on_record_start(&self, _index: usize, _total: usize) {
            self.starts.fetch_add(1, Ordering::SeqCst);
        }

        fn on_record_complete(&self, _index: usize, _total: usize, _id: &str, _images: usize) {
            self.completes.fetch_add(1, Ordering::SeqCst);
        }

        fn on_record_skipped(&self, _index: usize, _total: usize, _reason: &RecordError) {
            self.skips.fetch_add(1, Ordering::SeqCst);
        }

        fn on_run_complete(&self, _total: usize, kept: usize) {
            self.kept.store(kept, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb: ProgressCallback = Arc::new(NoopProgressCallback);
        cb.on_run_start("2024-05-01", 2);
        cb.on_record_start(1, 2);
        cb.on_record_complete(1, 2, "gmb-2024-1", 0);
        cb.on_record_skipped(
            2,
            2,
            &RecordError::ContentFetchFailed {
                url: "https://repo/x.xml".into(),
            },
        );
        cb.on_run_complete(2, 1);
    }

    #[test]
    fn tracking_callback_receives_events() {
        let tracker = TrackingCallback::default();
        tracker.on_record_start(1, 2);
        tracker.on_record_complete(1, 2, "gmb-2024-1", 3);
        tracker.on_record_start(2, 2);
        tracker.on_record_skipped(
            2,
            2,
            &RecordError::Excluded {
                keyword: "laadpaal".into(),
            },
        );
        tracker.on_run_complete(2, 1);

        assert_eq!(tracker.starts.load(Ordering::SeqCst), 2);
        assert_eq!(tracker.completes.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.skips.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.kept.load(Ordering::SeqCst), 1);
    }
}
