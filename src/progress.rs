//! Progress-callback trait for ingestion events.
//!
//! Inject an [`Arc<dyn IngestProgressCallback>`] via
//! [`crate::config::StudyBotConfigBuilder::progress_callback`] to observe a
//! run as pages finish. The CLI forwards these to an `indicatif` bar; tests
//! count them.
//!
//! # Example
//!
//! ```rust
//! use cst_studybot::{IngestProgressCallback, PageOutcome, StudyBotConfig};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     done: AtomicUsize,
//! }
//!
//! impl IngestProgressCallback for CountingCallback {
//!     fn on_page_complete(&self, id: &str, outcome: &PageOutcome) {
//!         self.done.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("{id}: {}", outcome.label());
//!     }
//! }
//!
//! let cb = Arc::new(CountingCallback { done: AtomicUsize::new(0) });
//! let config = StudyBotConfig::builder()
//!     .progress_callback(cb as Arc<dyn IngestProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use crate::ingest::{IngestSummary, PageOutcome};
use std::sync::Arc;

/// Called by the ingestion pipeline as it works through the task list.
///
/// Pages complete concurrently and out of order, so implementations must be
/// `Send + Sync` and synchronise their own state. Every method defaults to a
/// no-op.
pub trait IngestProgressCallback: Send + Sync {
    /// Called once, after the task list is built and before any page runs.
    ///
    /// * `papers`: number of papers that contributed tasks
    /// * `pages` : number of page tasks (cover pages excluded)
    fn on_ingest_start(&self, papers: usize, pages: usize) {
        let _ = (papers, pages);
    }

    /// Called when one page task finishes, whatever its outcome.
    fn on_page_complete(&self, id: &str, outcome: &PageOutcome) {
        let _ = (id, outcome);
    }

    /// Called once after every task has been attempted.
    fn on_ingest_complete(&self, summary: &IngestSummary) {
        let _ = summary;
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl IngestProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::StudyBotConfig`].
pub type ProgressCallback = Arc<dyn IngestProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PageError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct TrackingCallback {
        pages: AtomicUsize,
        completes: AtomicUsize,
        failures: AtomicUsize,
    }

    impl IngestProgressCallback for TrackingCallback {
        fn on_ingest_start(&self, _papers: usize, pages: usize) {
            self.pages.store(pages, Ordering::SeqCst);
        }

        fn on_page_complete(&self, _id: &str, outcome: &PageOutcome) {
            self.completes.fetch_add(1, Ordering::SeqCst);
            if matches!(outcome, PageOutcome::Failed(_)) {
                self.failures.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_ingest_start(1, 3);
        cb.on_page_complete("2023_1_2", &PageOutcome::Processed);
        cb.on_ingest_complete(&IngestSummary::default());
    }

    #[test]
    fn tracking_callback_receives_events() {
        let tracker = TrackingCallback::default();
        tracker.on_ingest_start(2, 3);
        tracker.on_page_complete("2023_1_2", &PageOutcome::Processed);
        tracker.on_page_complete("2023_1_3", &PageOutcome::Skipped);
        tracker.on_page_complete(
            "2023_2_2",
            &PageOutcome::Failed(PageError::RenderFailed {
                id: "2023_2_2".into(),
                detail: "bad page".into(),
            }),
        );

        assert_eq!(tracker.pages.load(Ordering::SeqCst), 3);
        assert_eq!(tracker.completes.load(Ordering::SeqCst), 3);
        assert_eq!(tracker.failures.load(Ordering::SeqCst), 1);
    }
}
