//! Progress-callback trait for per-run summarisation events.
//!
//! Pass an [`Arc<dyn SummaryProgressCallback>`] in
//! [`crate::session::RunOptions`] to receive events as the driver moves
//! through a run. [`crate::session::SummarySession::subscribe`] offers the
//! same information as state snapshots; callbacks suit push-style consumers
//! such as a terminal progress bar.
//!
//! # Example
//!
//! ```rust
//! use edgequake_summarize::{ChunkSummary, SummaryProgressCallback};
//! use std::sync::atomic::{AtomicUsize, Ordering};
//!
//! struct Counter(AtomicUsize);
//!
//! impl SummaryProgressCallback for Counter {
//!     fn on_chunk_complete(&self, completed: usize, total: usize, summary: &ChunkSummary) {
//!         self.0.store(completed, Ordering::SeqCst);
//!         eprintln!("chunk {}/{} ({} chars)", completed, total, summary.text.len());
//!     }
//! }
//! ```

use crate::document::ExtractionMethod;
use crate::pipeline::summarize::ChunkSummary;
use crate::state::{RunId, RunPhase, RunState};
use std::sync::Arc;

/// Called by the run driver as a run progresses.
///
/// Calls come from the driver task, one at a time and in pipeline order:
/// chunk events arrive in ascending chunk index even when a call was retried.
/// All methods default to no-ops.
pub trait SummaryProgressCallback: Send + Sync {
    /// A run was accepted.
    fn on_run_start(&self, run_id: RunId, total_pages: usize) {
        let _ = (run_id, total_pages);
    }

    fn on_phase_change(&self, phase: RunPhase) {
        let _ = phase;
    }

    /// A page's text is available (`from_cache` when no extraction ran).
    fn on_page_extracted(
        &self,
        page: usize,
        total_pages: usize,
        method: ExtractionMethod,
        from_cache: bool,
    ) {
        let _ = (page, total_pages, method, from_cache);
    }

    /// A page could not be extracted; it counts as empty.
    fn on_page_error(&self, page: usize, total_pages: usize, error: &str) {
        let _ = (page, total_pages, error);
    }

    /// Chunks are known; summarisation is about to start.
    fn on_chunks_ready(&self, total_chunks: usize) {
        let _ = total_chunks;
    }

    /// Just before the model call for `index` is sent.
    fn on_chunk_start(&self, index: usize, total: usize) {
        let _ = (index, total);
    }

    /// A chunk summary is available.
    fn on_chunk_complete(&self, completed: usize, total: usize, summary: &ChunkSummary) {
        let _ = (completed, total, summary);
    }

    /// The run reached a terminal phase.
    fn on_run_complete(&self, state: &RunState) {
        let _ = state;
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl SummaryProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::session::RunOptions`].
pub type ProgressCallback = Arc<dyn SummaryProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Tracking {
        pages: AtomicUsize,
        errors: AtomicUsize,
        chunks: AtomicUsize,
    }

    impl SummaryProgressCallback for Tracking {
        fn on_page_extracted(&self, _: usize, _: usize, _: ExtractionMethod, _: bool) {
            self.pages.fetch_add(1, Ordering::SeqCst);
        }

        fn on_page_error(&self, _: usize, _: usize, _: &str) {
            self.errors.fetch_add(1, Ordering::SeqCst);
        }

        fn on_chunk_complete(&self, completed: usize, _: usize, _: &ChunkSummary) {
            self.chunks.store(completed, Ordering::SeqCst);
        }
    }

    fn summary(index: usize) -> ChunkSummary {
        ChunkSummary {
            index,
            pages: vec![index],
            text: "s".into(),
            estimated_pages: 1,
            attempts: 1,
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_run_start(RunId(1), 3);
        cb.on_phase_change(RunPhase::Summarizing);
        cb.on_chunk_start(1, 2);
        cb.on_chunk_complete(1, 2, &summary(1));
        cb.on_run_complete(&RunState::default());
    }

    #[test]
    fn tracking_callback_receives_events() {
        let cb: Arc<dyn SummaryProgressCallback> = Arc::new(Tracking::default());
        cb.on_page_extracted(1, 3, ExtractionMethod::EmbeddedText, false);
        cb.on_page_error(2, 3, "OCR failed");
        cb.on_page_extracted(3, 3, ExtractionMethod::OpticalCharacterRecognition, true);
        cb.on_chunk_complete(1, 1, &summary(1));

        let t = Tracking::default();
        t.on_page_extracted(1, 1, ExtractionMethod::EmbeddedText, false);
        t.on_page_error(1, 1, "x");
        t.on_chunk_complete(4, 4, &summary(4));
        assert_eq!(t.pages.load(Ordering::SeqCst), 1);
        assert_eq!(t.errors.load(Ordering::SeqCst), 1);
        assert_eq!(t.chunks.load(Ordering::SeqCst), 4);
    }
}
