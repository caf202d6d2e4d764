//! Output types: extracted text, the persisted document, and run summaries.

use crate::config::PageSeparator;
use crate::error::{DocumentFormatError, FailureKind, RecordError};
use crate::pipeline::input::PaperRecord;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// First line of every output document.
pub const METADATA_MARKER: &str = "---METADATA---";
/// Line separating the metadata section from the extracted text.
pub const FULLTEXT_MARKER: &str = "---FULLTEXT---";

// ── Extracted text ───────────────────────────────────────────────────────

/// Which strategy produced a page's text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextSource {
    /// Parser's native flowed text.
    Native,
    /// Lines rebuilt from word bounding boxes.
    Layout,
    /// Neither strategy found text.
    Empty,
}

/// Text of a single page as ordered lines.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageText {
    /// 1-indexed page number.
    pub page_num: usize,
    pub lines: Vec<String>,
    pub source: TextSource,
}

impl PageText {
    pub fn empty(page_num: usize) -> Self {
        Self {
            page_num,
            lines: Vec::new(),
            source: TextSource::Empty,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.lines.iter().all(|l| l.trim().is_empty())
    }
}

/// Ordered per-page text of one document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractedText {
    pub pages: Vec<PageText>,
}

impl ExtractedText {
    pub fn new(pages: Vec<PageText>) -> Self {
        Self { pages }
    }

    /// True when no page carries any text.
    pub fn is_empty(&self) -> bool {
        self.pages.iter().all(PageText::is_empty)
    }

    /// Number of pages that yielded text through the given strategy.
    pub fn pages_from(&self, source: TextSource) -> usize {
        self.pages.iter().filter(|p| p.source == source).count()
    }

    /// Join pages in order, skipping empty ones and placing `separator`
    /// between consecutive emitted pages.
    pub fn render(&self, separator: &PageSeparator) -> String {
        let mut out = String::new();
        let mut first = true;
        for page in self.pages.iter().filter(|p| !p.is_empty()) {
            if !first {
                out.push_str(&separator.render(page.page_num));
            }
            out.push_str(&page.lines.join("\n"));
            first = false;
        }
        out
    }
}

// ── Output document ──────────────────────────────────────────────────────

/// The durable per-paper artifact: metadata plus full text.
///
/// ```text
/// ---METADATA---
/// { ...record, pretty-printed... }
/// ---FULLTEXT---
/// ...extracted text...
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct OutputDocument {
    pub metadata: Map<String, Value>,
    pub text: String,
}

impl OutputDocument {
    pub fn new(record: &PaperRecord, text: String) -> Self {
        Self {
            metadata: record.fields().clone(),
            text,
        }
    }

    /// Serialise into the two-section text layout.
    pub fn render(&self) -> Result<String, serde_json::Error> {
        let metadata = serde_json::to_string_pretty(&self.metadata)?;
        Ok(format!(
            "{METADATA_MARKER}\n{metadata}\n{FULLTEXT_MARKER}\n{}",
            self.text
        ))
    }

    /// Split a rendered document back into metadata and text.
    ///
    /// JSON strings never contain a raw newline, so the first
    /// `\n---FULLTEXT---\n` always terminates the metadata section even if
    /// the text body itself contains the marker.
    pub fn parse(content: &str) -> Result<Self, DocumentFormatError> {
        let rest = content
            .strip_prefix(METADATA_MARKER)
            .and_then(|r| r.strip_prefix('\n'))
            .ok_or(DocumentFormatError::MissingMetadataMarker)?;

        let needle = format!("\n{FULLTEXT_MARKER}\n");
        let split = rest
            .find(&needle)
            .ok_or(DocumentFormatError::MissingFulltextMarker)?;

        let metadata: Map<String, Value> = serde_json::from_str(&rest[..split])?;
        let text = rest[split + needle.len()..].to_string();
        Ok(Self { metadata, text })
    }
}

// ── Run results ──────────────────────────────────────────────────────────

/// Terminal state of one record.
#[derive(Debug, Clone)]
pub enum RecordOutcome {
    /// Fetched, extracted, written and checkpointed in this run.
    Completed { id: String, chars: usize, bytes: u64 },
    /// Already in the checkpoint; nothing was done.
    Resumed { id: String },
    /// Reached `failed`; artifact removed, no output kept.
    Failed(RecordError),
}

impl RecordOutcome {
    pub fn id(&self) -> &str {
        match self {
            RecordOutcome::Completed { id, .. } | RecordOutcome::Resumed { id } => id,
            RecordOutcome::Failed(e) => e.id(),
        }
    }
}

/// One failed record, as reported in the summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedRecord {
    pub id: String,
    pub kind: FailureKind,
    pub detail: String,
}

/// Aggregate result of a run, accumulated locally by the runner.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Records in the input collection.
    pub total_records: usize,
    /// Records that ended `checkpointed`, including resumed ones.
    pub processed: usize,
    /// Subset of `processed` skipped because the checkpoint had them.
    pub resumed: usize,
    /// Records that ended `failed`.
    pub failed: usize,
    pub retrieval_failures: usize,
    pub extraction_failures: usize,
    pub persistence_failures: usize,
    /// Every failure of this run, in input order.
    pub failures: Vec<FailedRecord>,
    /// Bytes downloaded for records completed in this run.
    pub bytes_downloaded: u64,
    /// Wall-clock duration of the run.
    pub duration_ms: u64,
}

impl RunSummary {
    /// Fold one record's outcome into the counters.
    pub fn record(&mut self, outcome: &RecordOutcome) {
        match outcome {
            RecordOutcome::Completed { bytes, .. } => {
                self.processed += 1;
                self.bytes_downloaded += bytes;
            }
            RecordOutcome::Resumed { .. } => {
                self.processed += 1;
                self.resumed += 1;
            }
            RecordOutcome::Failed(e) => {
                self.failed += 1;
                match e.kind() {
                    FailureKind::Retrieval => self.retrieval_failures += 1,
                    FailureKind::Extraction => self.extraction_failures += 1,
                    FailureKind::Persistence => self.persistence_failures += 1,
                }
                self.failures.push(FailedRecord {
                    id: e.id().to_string(),
                    kind: e.kind(),
                    detail: e.detail().to_string(),
                });
            }
        }
    }

    /// Records completed during this run (not resumed).
    pub fn newly_processed(&self) -> usize {
        self.processed - self.resumed
    }

    /// `processed / (processed + failed)` as a percentage; `None` if both are zero.
    pub fn completion_rate(&self) -> Option<f64> {
        let attempted = self.processed + self.failed;
        (attempted > 0).then(|| self.processed as f64 / attempted as f64 * 100.0)
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "processed {} ({} resumed), failed {}, completion rate ",
            self.processed, self.resumed, self.failed
        )?;
        match self.completion_rate() {
            Some(rate) => write!(f, "{rate:.2}%"),
            None => f.write_str("n/a"),
        }
    }
}

/// Resume state of an input collection against a checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStatus {
    /// Records in the input collection.
    pub total_records: usize,
    /// Input records already in the checkpoint.
    pub checkpointed: usize,
    /// Input records a resumed run would still fetch.
    pub pending: usize,
    /// Entries in the checkpoint log (may include ids not in this input).
    pub checkpoint_entries: usize,
}
