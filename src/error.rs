//! Error types for the paper2txt library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`BatchError`] — **Fatal**: the run cannot start or must stop (input
//!   collection missing, output directory not creatable, pdfium unavailable).
//!   Returned as `Err(BatchError)` from [`crate::run_batch`] and
//!   [`crate::BatchRunner::run`] before any record is touched, or when the
//!   hardened persistence policy is enabled.
//!
//! * [`RecordError`] — **Non-fatal**: a single record failed (download
//!   refused, corrupt PDF, output not writable) but the run continues with
//!   the next record. Collected into [`crate::output::RunSummary`] so callers
//!   can audit every failure after the run.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the paper2txt library.
///
/// Per-record failures use [`RecordError`] and are stored in
/// [`crate::output::RunSummary`] rather than propagated here.
#[derive(Debug, Error)]
pub enum BatchError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input collection was not found at the given path.
    #[error("Input collection not found: '{path}'\nRun the corpus filter first or check the path.")]
    InputNotFound { path: PathBuf },

    /// Input collection exists but could not be read.
    #[error("Failed to read input collection '{path}': {source}")]
    InputUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Input collection is not a JSON array of objects (or valid JSON Lines).
    #[error("Input collection '{path}' is not valid JSON (line {line}): {detail}")]
    InputMalformed {
        path: PathBuf,
        line: usize,
        detail: String,
    },

    /// A record lacks the identifier field, or it is not a non-empty string.
    #[error("Record #{index} has no usable '{field}' identifier")]
    MissingIdentifier { index: usize, field: String },

    // ── Output location errors ────────────────────────────────────────────
    /// Output (or artifact) directory does not exist or is not a directory.
    #[error("Output location '{path}' is not available: {detail}")]
    OutputDirUnavailable { path: PathBuf, detail: String },

    /// Checkpoint log exists but could not be read or opened for appending.
    #[error("Checkpoint log '{path}' is not usable: {source}")]
    CheckpointUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Pdfium binding errors ─────────────────────────────────────────────
    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
You can:\n\
  • Install libpdfium system-wide (e.g. from bblanchon/pdfium-binaries).\n\
  • Set PDFIUM_LIB_PATH=/path/to/libpdfium (file or containing directory).\n"
    )]
    PdfiumBindingFailed(String),

    // ── Escalated per-record errors ───────────────────────────────────────
    /// A persistence failure stopped the run (`halt_on_persistence_error`).
    #[error("Run halted after persistence failure: {0}")]
    PersistenceHalted(#[source] RecordError),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// The kind of a per-record failure, without its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Non-2xx response, connection error, timeout, or non-PDF body.
    Retrieval,
    /// Corrupt document or no extractable text on any page.
    Extraction,
    /// Output document or checkpoint entry could not be written.
    Persistence,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FailureKind::Retrieval => "retrieval",
            FailureKind::Extraction => "extraction",
            FailureKind::Persistence => "persistence",
        })
    }
}

/// A non-fatal error for a single record.
///
/// Every stage of the pipeline returns one of these instead of unwinding;
/// the runner matches on it, cleans up, counts it and moves on.
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
pub enum RecordError {
    /// The document could not be downloaded.
    #[error("{id}: retrieval failed: {detail}")]
    Retrieval { id: String, detail: String },

    /// The document was downloaded but yielded no text.
    #[error("{id}: extraction failed: {detail}")]
    Extraction { id: String, detail: String },

    /// The output document or checkpoint entry could not be written.
    #[error("{id}: persistence failed: {detail}")]
    Persistence { id: String, detail: String },
}

impl RecordError {
    pub fn retrieval(id: &str, detail: impl Into<String>) -> Self {
        RecordError::Retrieval {
            id: id.to_string(),
            detail: detail.into(),
        }
    }

    pub fn extraction(id: &str, detail: impl Into<String>) -> Self {
        RecordError::Extraction {
            id: id.to_string(),
            detail: detail.into(),
        }
    }

    pub fn persistence(id: &str, detail: impl Into<String>) -> Self {
        RecordError::Persistence {
            id: id.to_string(),
            detail: detail.into(),
        }
    }

    pub fn kind(&self) -> FailureKind {
        match self {
            RecordError::Retrieval { .. } => FailureKind::Retrieval,
            RecordError::Extraction { .. } => FailureKind::Extraction,
            RecordError::Persistence { .. } => FailureKind::Persistence,
        }
    }

    /// Identifier of the record that failed.
    pub fn id(&self) -> &str {
        match self {
            RecordError::Retrieval { id, .. }
            | RecordError::Extraction { id, .. }
            | RecordError::Persistence { id, .. } => id,
        }
    }

    /// Cause without the identifier prefix.
    pub fn detail(&self) -> &str {
        match self {
            RecordError::Retrieval { detail, .. }
            | RecordError::Extraction { detail, .. }
            | RecordError::Persistence { detail, .. } => detail,
        }
    }
}

/// A file that does not follow the two-section output document layout.
#[derive(Debug, Error)]
pub enum DocumentFormatError {
    #[error("document does not start with the metadata marker")]
    MissingMetadataMarker,

    #[error("document has no full-text marker")]
    MissingFulltextMarker,

    #[error("metadata section is not a JSON object: {0}")]
    Metadata(#[from] serde_json::Error),
}
