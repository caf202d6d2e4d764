//! Progress-callback trait for per-record run events.
//!
//! Inject an [`Arc<dyn RunProgressCallback>`] via
//! [`crate::config::RunConfigBuilder::progress_callback`] to receive events
//! as the runner resolves each record. The CLI uses it to drive a terminal
//! progress bar; library users can forward events anywhere.
//!
//! # Example
//!
//! ```rust
//! use paper2txt::{RunConfig, RunProgressCallback};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     completed: Arc<AtomicUsize>,
//! }
//!
//! impl RunProgressCallback for CountingCallback {
//!     fn on_record_complete(&self, index: usize, total: usize, id: &str, chars: usize) {
//!         self.completed.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("[{}/{}] {} ({} chars)", index + 1, total, id, chars);
//!     }
//! }
//!
//! let counter = Arc::new(CountingCallback {
//!     completed: Arc::new(AtomicUsize::new(0)),
//! });
//!
//! let config = RunConfig::builder()
//!     .progress_callback(counter as Arc<dyn RunProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use crate::error::FailureKind;
use crate::output::RunSummary;
use std::sync::Arc;

/// Called by the batch runner as it resolves each record.
///
/// Records are processed strictly in order, so events arrive in order too.
/// All methods have default no-op implementations so callers only override
/// what they care about. `index` is 0-based into the input collection.
pub trait RunProgressCallback: Send + Sync {
    /// Called once after the checkpoint is loaded, before the first record.
    fn on_run_start(&self, total_records: usize, already_done: usize) {
        let _ = (total_records, already_done);
    }

    /// Called when a record leaves `pending` for `fetching`.
    fn on_record_start(&self, index: usize, total: usize, id: &str) {
        let _ = (index, total, id);
    }

    /// Called when a record is skipped because the checkpoint already has it.
    fn on_record_resumed(&self, index: usize, total: usize, id: &str) {
        let _ = (index, total, id);
    }

    /// Called after a record is checkpointed.
    ///
    /// `chars` is the length of the extracted text in characters.
    fn on_record_complete(&self, index: usize, total: usize, id: &str, chars: usize) {
        let _ = (index, total, id, chars);
    }

    /// Called after a record reached `failed` and was cleaned up.
    fn on_record_failed(&self, index: usize, total: usize, id: &str, kind: FailureKind, error: String) {
        let _ = (index, total, id, kind, error);
    }

    /// Called once when the run ends, after the whole collection was walked
    /// or when a persistence failure halts it early.
    fn on_run_complete(&self, summary: &RunSummary) {
        let _ = summary;
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl RunProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::RunConfig`].
pub type ProgressCallback = Arc<dyn RunProgressCallback>;
