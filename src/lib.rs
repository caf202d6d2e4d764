//! # paper2txt
//!
//! Turn a list of arXiv paper records into a corpus of plain-text documents,
//! politely and resumably.
//!
//! ## Pipeline Overview
//!
//! ```text
//! records (JSON / JSON Lines)
//!  │
//!  ├─ 1. Skip     identifiers already in the checkpoint log
//!  ├─ 2. Limit    sliding-window rate limiter (B requests per W)
//!  ├─ 3. Fetch    stream the PDF to a transient file
//!  ├─ 4. Extract  pdfium text per page, layout fallback (spawn_blocking)
//!  ├─ 5. Write    ---METADATA--- / ---FULLTEXT--- document, atomic rename
//!  └─ 6. Log      append the identifier, fsync
//! ```
//!
//! One record is resolved completely before the next one starts, so a
//! killed run loses at most the record in flight and picks up where it left
//! off on the next invocation.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use paper2txt::{run_batch, RunConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = RunConfig::builder()
//!         .output_dir("data/papers")
//!         .burst_size(4)
//!         .window_ms(1000)
//!         .build()?;
//!     let summary = run_batch("data/cs_papers_filtered.json", &config).await?;
//!     eprintln!("{summary}");
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `paper2txt` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! paper2txt = { version = "0.1", default-features = false }
//! ```
//!
//! ## pdfium
//!
//! Text extraction binds pdfium at run start. Point
//! [`RunConfig::pdfium_library`] (CLI: `--pdfium-lib` / `PDFIUM_LIB_PATH`)
//! at the shared library or its directory; otherwise the system library is
//! used.

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod runner;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ExtractionStrategy, LayoutOptions, PageSeparator, RunConfig, RunConfigBuilder};
pub use error::{BatchError, FailureKind, RecordError};
pub use output::{
    ExtractedText, FailedRecord, OutputDocument, PageText, RecordOutcome, RunStatus, RunSummary,
    TextSource,
};
pub use pipeline::extract::{PdfiumExtractor, TextExtractor};
pub use pipeline::fetch::{Fetch, HttpFetcher};
pub use pipeline::input::{load_records, PaperRecord};
pub use pipeline::rate_limit::RateLimiter;
pub use progress::{NoopProgressCallback, ProgressCallback, RunProgressCallback};
pub use runner::{run_batch, run_batch_sync, status, BatchRunner};
