//! Batch entry points: walk a record collection through the pipeline.
//!
//! Records are resolved strictly one after another. For each record the
//! runner either skips it (already checkpointed) or takes it through
//! `fetching → extracting → writing → checkpointed`, with `failed` reachable
//! from every step. A failed record never stops the run unless the caller
//! asked for persistence failures to be fatal.
//!
//! ## Output invariant
//!
//! An identifier is appended to the checkpoint only after its output
//! document has been synced and renamed into place, and the document is
//! removed again if the append fails and was rolled back. The transient PDF is gone before the next record
//! starts, whatever happened to this one.

use crate::config::RunConfig;
use crate::error::{BatchError, FailureKind, RecordError};
use crate::output::{OutputDocument, RecordOutcome, RunStatus, RunSummary};
use crate::pipeline::checkpoint::{self, Checkpoint};
use crate::pipeline::extract::{PdfiumExtractor, TextExtractor};
use crate::pipeline::fetch::{Artifact, Fetch, HttpFetcher};
use crate::pipeline::input::{load_records, PaperRecord};
use crate::pipeline::rate_limit::RateLimiter;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::AsyncWriteExt;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

/// Drives records through fetch, extraction and persistence.
///
/// Generic over its collaborators so tests (and library users with their
/// own mirror or parser) can inject them; [`run_batch`] wires up the HTTP
/// fetcher and pdfium.
pub struct BatchRunner<F, E> {
    config: RunConfig,
    fetcher: F,
    extractor: Arc<E>,
    limiter: RateLimiter,
}

impl<F: Fetch, E: TextExtractor> BatchRunner<F, E> {
    pub fn new(config: RunConfig, fetcher: F, extractor: E) -> Self {
        let limiter = RateLimiter::new(config.burst_size, config.window());
        Self {
            config,
            fetcher,
            extractor: Arc::new(extractor),
            limiter,
        }
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Process every record in order and return the run's counters.
    ///
    /// # Errors
    /// Only fatal conditions: output or artifact directory not creatable,
    /// checkpoint not usable, or a persistence failure while
    /// `halt_on_persistence_error` is set. Per-record failures are reported
    /// in [`RunSummary::failures`].
    pub async fn run(&mut self, records: &[PaperRecord]) -> Result<RunSummary, BatchError> {
        let started = Instant::now();
        ensure_dir(&self.config.output_dir)?;
        ensure_dir(self.config.artifact_dir())?;

        let mut checkpoint = Checkpoint::open(&self.config.checkpoint_path(), self.config.resume)?;
        let total = records.len();
        let already_done = records.iter().filter(|r| checkpoint.contains(r.id())).count();

        info!(
            "Starting run: {} records, {} already checkpointed in {}",
            total,
            already_done,
            checkpoint.path().display()
        );
        debug!("Effective configuration: {:?}", self.config);
        let callback = self.config.progress_callback.clone();
        if let Some(ref cb) = callback {
            cb.on_run_start(total, already_done);
        }

        let mut summary = RunSummary {
            total_records: total,
            ..RunSummary::default()
        };

        for (index, record) in records.iter().enumerate() {
            let id = record.id();
            let outcome = if checkpoint.contains(id) {
                debug!("{}: already checkpointed, skipping", id);
                RecordOutcome::Resumed { id: id.to_string() }
            } else {
                if let Some(ref cb) = callback {
                    cb.on_record_start(index, total, id);
                }
                self.process_record(record, &mut checkpoint).await
            };

            match &outcome {
                RecordOutcome::Resumed { .. } => {
                    if let Some(ref cb) = callback {
                        cb.on_record_resumed(index, total, id);
                    }
                }
                RecordOutcome::Completed { chars, bytes, .. } => {
                    info!("{}: done ({} chars from {} bytes)", id, chars, bytes);
                    if let Some(ref cb) = callback {
                        cb.on_record_complete(index, total, id, *chars);
                    }
                }
                RecordOutcome::Failed(e) => {
                    warn!("{}: {} failure: {}", id, e.kind(), e.detail());
                    if let Some(ref cb) = callback {
                        cb.on_record_failed(index, total, id, e.kind(), e.detail().to_string());
                    }
                }
            }
            summary.record(&outcome);

            if let RecordOutcome::Failed(e) = outcome {
                if e.kind() == FailureKind::Persistence && self.config.halt_on_persistence_error {
                    summary.duration_ms = started.elapsed().as_millis() as u64;
                    error!("Halting run after persistence failure ({summary})");
                    if let Some(ref cb) = callback {
                        cb.on_run_complete(&summary);
                    }
                    return Err(BatchError::PersistenceHalted(e));
                }
            }

            if (index + 1) % self.config.progress_every.max(1) == 0 && index + 1 < total {
                info!(
                    "Progress: {}/{} records, {} processed, {} failed",
                    index + 1,
                    total,
                    summary.processed,
                    summary.failed
                );
            }
        }

        summary.duration_ms = started.elapsed().as_millis() as u64;
        info!("Run complete in {}ms: {}", summary.duration_ms, summary);
        if let Some(ref cb) = callback {
            cb.on_run_complete(&summary);
        }
        Ok(summary)
    }

    async fn process_record(
        &mut self,
        record: &PaperRecord,
        checkpoint: &mut Checkpoint,
    ) -> RecordOutcome {
        let id = record.id();
        let (text, bytes) = match self.acquire_text(id).await {
            Ok(v) => v,
            Err(e) => return RecordOutcome::Failed(e),
        };
        let chars = text.chars().count();

        match self.persist(record, text, checkpoint).await {
            Ok(()) => RecordOutcome::Completed {
                id: id.to_string(),
                chars,
                bytes,
            },
            Err(e) => RecordOutcome::Failed(e),
        }
    }

    /// Fetch and extract, retrying retrieval failures with exponential
    /// backoff. Every attempt takes its own rate-limit slot.
    async fn acquire_text(&mut self, id: &str) -> Result<(String, u64), RecordError> {
        let mut attempt: u32 = 0;
        loop {
            match self.fetch_and_extract(id).await {
                Ok(v) => return Ok(v),
                Err(e)
                    if e.kind() == FailureKind::Retrieval && attempt < self.config.max_retries =>
                {
                    attempt += 1;
                    let backoff = backoff_ms(self.config.retry_backoff_ms, attempt);
                    warn!(
                        "{}: retry {}/{} after {}ms ({})",
                        id,
                        attempt,
                        self.config.max_retries,
                        backoff,
                        e.detail()
                    );
                    sleep(Duration::from_millis(backoff)).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn fetch_and_extract(&mut self, id: &str) -> Result<(String, u64), RecordError> {
        self.limiter.acquire().await;

        let dir = self.config.artifact_dir();
        let artifact = Artifact::create_in(dir, id).map_err(|e| {
            RecordError::retrieval(id, format!("cannot create artifact in '{}': {e}", dir.display()))
        })?;

        let result = self.fetch_into(id, &artifact).await;
        if let Err(e) = artifact.discard() {
            warn!("{}: could not remove transient PDF: {}", id, e);
        }
        result
    }

    async fn fetch_into(&self, id: &str, artifact: &Artifact) -> Result<(String, u64), RecordError> {
        let bytes = self.fetcher.fetch(id, artifact.path()).await?;
        debug!("{}: extracting text from {} bytes", id, bytes);

        let extractor = Arc::clone(&self.extractor);
        let path = artifact.path_buf();
        let owned_id = id.to_string();
        let text = tokio::task::spawn_blocking(move || extractor.extract(&owned_id, &path))
            .await
            .map_err(|e| RecordError::extraction(id, format!("extraction task failed: {e}")))??;

        Ok((text.render(&self.config.page_separator), bytes))
    }

    /// Write the output document, then checkpoint it.
    async fn persist(
        &self,
        record: &PaperRecord,
        text: String,
        checkpoint: &mut Checkpoint,
    ) -> Result<(), RecordError> {
        let id = record.id();
        let path = self.config.output_path(id);
        let content = OutputDocument::new(record, text)
            .render()
            .map_err(|e| RecordError::persistence(id, format!("metadata serialization: {e}")))?;

        write_atomic(&path, content.as_bytes())
            .await
            .map_err(|e| RecordError::persistence(id, format!("'{}': {e}", path.display())))?;

        if let Err(e) = checkpoint.append(id) {
            if e.entry_kept {
                error!(
                    "{}: checkpoint entry could not be rolled back, keeping '{}'",
                    id,
                    path.display()
                );
            } else if let Err(rm) = tokio::fs::remove_file(&path).await {
                error!(
                    "{}: checkpoint append failed and '{}' could not be removed: {}",
                    id,
                    path.display(),
                    rm
                );
            }
            return Err(RecordError::persistence(
                id,
                format!("checkpoint '{}': {e}", checkpoint.path().display()),
            ));
        }
        Ok(())
    }
}

/// Run the whole pipeline over the collection at `input`.
///
/// Loads the records, builds the HTTP fetcher and binds pdfium, then hands
/// everything to a [`BatchRunner`].
///
/// # Example
/// ```rust,no_run
/// use paper2txt::{run_batch, RunConfig};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let config = RunConfig::builder().output_dir("data/papers").build()?;
/// let summary = run_batch("data/cs_papers_filtered.json", &config).await?;
/// println!("{summary}");
/// # Ok(())
/// # }
/// ```
pub async fn run_batch(
    input: impl AsRef<Path>,
    config: &RunConfig,
) -> Result<RunSummary, BatchError> {
    let records = load_records(input.as_ref(), &config.id_field)?;
    let fetcher = HttpFetcher::from_config(config)?;
    let extractor = PdfiumExtractor::from_config(config)?;
    BatchRunner::new(config.clone(), fetcher, extractor)
        .run(&records)
        .await
}

/// Synchronous wrapper around [`run_batch`].
///
/// Creates a temporary tokio runtime internally.
pub fn run_batch_sync(
    input: impl AsRef<Path>,
    config: &RunConfig,
) -> Result<RunSummary, BatchError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| BatchError::Internal(format!("Failed to create tokio runtime: {e}")))?
        .block_on(run_batch(input, config))
}

/// Compare the collection at `input` against the checkpoint without
/// fetching anything.
pub fn status(input: impl AsRef<Path>, config: &RunConfig) -> Result<RunStatus, BatchError> {
    let records = load_records(input.as_ref(), &config.id_field)?;
    let entries = checkpoint::read_entries(&config.checkpoint_path())?;
    let checkpointed = records.iter().filter(|r| entries.contains(r.id())).count();
    Ok(RunStatus {
        total_records: records.len(),
        checkpointed,
        pending: records.len() - checkpointed,
        checkpoint_entries: entries.len(),
    })
}

// ── Internal helpers ─────────────────────────────────────────────────────

fn ensure_dir(path: &Path) -> Result<(), BatchError> {
    std::fs::create_dir_all(path).map_err(|e| BatchError::OutputDirUnavailable {
        path: path.to_path_buf(),
        detail: e.to_string(),
    })
}

/// `base * 2^(attempt - 1)`, saturating.
fn backoff_ms(base: u64, attempt: u32) -> u64 {
    base.saturating_mul(1u64 << attempt.saturating_sub(1).min(20))
}

/// Write to a sibling `.tmp` file, sync it, and rename it over `path`.
async fn write_atomic(path: &Path, content: &[u8]) -> std::io::Result<()> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    let result = async {
        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(content).await?;
        file.sync_all().await?;
        drop(file);
        tokio::fs::rename(&tmp, path).await
    }
    .await;

    if result.is_err() {
        let _ = tokio::fs::remove_file(&tmp).await;
    }
    result
}
