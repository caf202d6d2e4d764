//! Configuration types for a batch harvesting run.
//!
//! All run behaviour is controlled through [`RunConfig`], built via its
//! [`RunConfigBuilder`]. Keeping every knob in one struct makes it easy to
//! log the effective settings at run start and to diff two runs when their
//! outputs differ.

use crate::error::BatchError;
use crate::progress::ProgressCallback;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default canonical PDF endpoint; the identifier is appended as a path segment.
pub const DEFAULT_BASE_URL: &str = "https://export.arxiv.org/pdf";

/// Default `User-Agent` sent with every fetch.
pub const DEFAULT_USER_AGENT: &str = concat!(
    "paper2txt/",
    env!("CARGO_PKG_VERSION"),
    " (academic text corpus builder; polite rate-limited fetcher)"
);

/// Default checkpoint log name inside the output directory.
pub const DEFAULT_CHECKPOINT_FILE: &str = "processed_papers.log";

/// Configuration for a resumable harvesting run.
///
/// Built via [`RunConfig::builder()`] or using [`RunConfig::default()`].
///
/// # Example
/// ```rust
/// use paper2txt::RunConfig;
///
/// let config = RunConfig::builder()
///     .output_dir("data/papers")
///     .burst_size(4)
///     .window_ms(1000)
///     .build()
///     .unwrap();
/// assert_eq!(config.burst_size, 4);
/// ```
#[derive(Clone)]
pub struct RunConfig {
    /// Directory receiving one output document per paper. Default: `data/papers`.
    pub output_dir: PathBuf,

    /// Directory for the transient downloaded PDFs. Default: the output directory.
    pub artifact_dir: Option<PathBuf>,

    /// File name of the checkpoint log inside `output_dir`.
    pub checkpoint_file: String,

    /// Extension of output documents, without the dot. Default: `txt`.
    pub output_extension: String,

    /// Skip identifiers already present in the checkpoint. Default: true.
    pub resume: bool,

    /// Name of the record field holding the unique identifier. Default: `id`.
    pub id_field: String,

    /// Maximum fetches inside one sliding window. Default: 4.
    pub burst_size: usize,

    /// Sliding-window length in milliseconds. Default: 1000.
    pub window_ms: u64,

    /// Base of the canonical retrieval URL. Default: [`DEFAULT_BASE_URL`].
    pub base_url: String,

    /// Descriptive client header sent with every request.
    pub user_agent: String,

    /// Whole-request timeout in seconds (headers and body). Default: 120.
    pub download_timeout_secs: u64,

    /// TCP/TLS connect timeout in seconds. Default: 30.
    pub connect_timeout_secs: u64,

    /// Capacity of the write buffer used while streaming a download. Default: 64 KiB.
    pub chunk_size: usize,

    /// Extra fetch attempts for a record within the same run. Default: 0.
    ///
    /// Zero means a failed download is only retried by a later resumed run.
    pub max_retries: u32,

    /// Initial retry delay in milliseconds, doubled after each attempt. Default: 500.
    pub retry_backoff_ms: u64,

    /// How page text is obtained. Default: [`ExtractionStrategy::Auto`].
    pub strategy: ExtractionStrategy,

    /// Vertical tolerance (points) for grouping words into lines. Default: 3.0.
    pub y_tolerance: f32,

    /// Horizontal tolerance (points) for grouping glyphs into words. Default: 1.0.
    pub x_tolerance: f32,

    /// Marker inserted between pages of the extracted text.
    pub page_separator: PageSeparator,

    /// Log aggregate progress every N records. Default: 4.
    pub progress_every: usize,

    /// Abort the run on the first output/checkpoint write failure. Default: false.
    pub halt_on_persistence_error: bool,

    /// Path to libpdfium (file or directory). `None` binds the system library.
    pub pdfium_library: Option<PathBuf>,

    /// Receives per-record progress events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("data/papers"),
            artifact_dir: None,
            checkpoint_file: DEFAULT_CHECKPOINT_FILE.to_string(),
            output_extension: "txt".to_string(),
            resume: true,
            id_field: "id".to_string(),
            burst_size: 4,
            window_ms: 1000,
            base_url: DEFAULT_BASE_URL.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            download_timeout_secs: 120,
            connect_timeout_secs: 30,
            chunk_size: 64 * 1024,
            max_retries: 0,
            retry_backoff_ms: 500,
            strategy: ExtractionStrategy::default(),
            y_tolerance: 3.0,
            x_tolerance: 1.0,
            page_separator: PageSeparator::default(),
            progress_every: 4,
            halt_on_persistence_error: false,
            pdfium_library: None,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for RunConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunConfig")
            .field("output_dir", &self.output_dir)
            .field("artifact_dir", &self.artifact_dir)
            .field("checkpoint_file", &self.checkpoint_file)
            .field("resume", &self.resume)
            .field("burst_size", &self.burst_size)
            .field("window_ms", &self.window_ms)
            .field("base_url", &self.base_url)
            .field("max_retries", &self.max_retries)
            .field("strategy", &self.strategy)
            .field("y_tolerance", &self.y_tolerance)
            .field("x_tolerance", &self.x_tolerance)
            .field("page_separator", &self.page_separator)
            .field("halt_on_persistence_error", &self.halt_on_persistence_error)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn RunProgressCallback>"),
            )
            .finish()
    }
}

impl RunConfig {
    /// Create a new builder for `RunConfig`.
    pub fn builder() -> RunConfigBuilder {
        RunConfigBuilder {
            config: Self::default(),
        }
    }

    /// Sliding-window length as a `Duration`.
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }

    /// Where transient PDFs are written.
    pub fn artifact_dir(&self) -> &Path {
        self.artifact_dir.as_deref().unwrap_or(&self.output_dir)
    }

    /// Full path of the checkpoint log.
    pub fn checkpoint_path(&self) -> PathBuf {
        self.output_dir.join(&self.checkpoint_file)
    }

    /// Output document path for an identifier.
    ///
    /// `/` in old-style identifiers (`cs/0601001`) is replaced with `_` so
    /// every document lands directly in the output directory. The mapping is
    /// not injective: `cs/0601001` and `cs_0601001` share a file. arXiv
    /// identifiers never contain `_`, so only foreign id schemes can collide.
    pub fn output_path(&self, id: &str) -> PathBuf {
        self.output_dir
            .join(format!("{}.{}", file_stem(id), self.output_extension))
    }

    /// Options handed to the text extractor.
    pub fn layout_options(&self) -> LayoutOptions {
        LayoutOptions {
            strategy: self.strategy,
            y_tolerance: self.y_tolerance,
            x_tolerance: self.x_tolerance,
        }
    }
}

/// File-system safe stem for an identifier.
pub fn file_stem(id: &str) -> String {
    id.trim().replace(['/', '\\'], "_")
}

/// Builder for [`RunConfig`].
#[derive(Debug)]
pub struct RunConfigBuilder {
    config: RunConfig,
}

impl RunConfigBuilder {
    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.output_dir = dir.into();
        self
    }

    pub fn artifact_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.artifact_dir = Some(dir.into());
        self
    }

    pub fn checkpoint_file(mut self, name: impl Into<String>) -> Self {
        self.config.checkpoint_file = name.into();
        self
    }

    pub fn output_extension(mut self, ext: impl Into<String>) -> Self {
        self.config.output_extension = ext.into().trim_start_matches('.').to_string();
        self
    }

    pub fn resume(mut self, v: bool) -> Self {
        self.config.resume = v;
        self
    }

    pub fn id_field(mut self, field: impl Into<String>) -> Self {
        self.config.id_field = field.into();
        self
    }

    pub fn burst_size(mut self, n: usize) -> Self {
        self.config.burst_size = n.max(1);
        self
    }

    pub fn window_ms(mut self, ms: u64) -> Self {
        self.config.window_ms = ms;
        self
    }

    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.config.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn user_agent(mut self, ua: impl Into<String>) -> Self {
        self.config.user_agent = ua.into();
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn connect_timeout_secs(mut self, secs: u64) -> Self {
        self.config.connect_timeout_secs = secs;
        self
    }

    pub fn chunk_size(mut self, bytes: usize) -> Self {
        self.config.chunk_size = bytes.max(1024);
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn strategy(mut self, strategy: ExtractionStrategy) -> Self {
        self.config.strategy = strategy;
        self
    }

    pub fn y_tolerance(mut self, t: f32) -> Self {
        self.config.y_tolerance = t;
        self
    }

    pub fn x_tolerance(mut self, t: f32) -> Self {
        self.config.x_tolerance = t;
        self
    }

    pub fn page_separator(mut self, sep: PageSeparator) -> Self {
        self.config.page_separator = sep;
        self
    }

    pub fn progress_every(mut self, n: usize) -> Self {
        self.config.progress_every = n.max(1);
        self
    }

    pub fn halt_on_persistence_error(mut self, v: bool) -> Self {
        self.config.halt_on_persistence_error = v;
        self
    }

    pub fn pdfium_library(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.pdfium_library = Some(path.into());
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<RunConfig, BatchError> {
        let c = &self.config;
        if c.burst_size == 0 {
            return Err(BatchError::InvalidConfig("Burst size must be ≥ 1".into()));
        }
        if c.window_ms == 0 {
            return Err(BatchError::InvalidConfig(
                "Rate-limit window must be > 0 ms".into(),
            ));
        }
        for (name, t) in [("y_tolerance", c.y_tolerance), ("x_tolerance", c.x_tolerance)] {
            if !t.is_finite() || t < 0.0 {
                return Err(BatchError::InvalidConfig(format!(
                    "{name} must be a finite, non-negative number of points, got {t}"
                )));
            }
        }
        if c.output_extension.is_empty() || c.output_extension.contains(['/', '\\']) {
            return Err(BatchError::InvalidConfig(format!(
                "Invalid output extension '{}'",
                c.output_extension
            )));
        }
        if c.checkpoint_file.trim().is_empty() {
            return Err(BatchError::InvalidConfig(
                "Checkpoint file name must not be empty".into(),
            ));
        }
        if c.id_field.is_empty() {
            return Err(BatchError::InvalidConfig(
                "Identifier field name must not be empty".into(),
            ));
        }
        if !(c.base_url.starts_with("http://") || c.base_url.starts_with("https://")) {
            return Err(BatchError::InvalidConfig(format!(
                "Base URL must be HTTP(S), got '{}'",
                c.base_url
            )));
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// How page text is obtained from a document.
///
/// | Strategy | Behaviour |
/// |----------|-----------|
/// | `Auto`   | Native flowed text; geometric reconstruction for pages where it is empty (default) |
/// | `Native` | Native flowed text only |
/// | `Layout` | Geometric reconstruction from word boxes only |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionStrategy {
    #[default]
    Auto,
    Native,
    Layout,
}

/// Per-document extraction settings derived from [`RunConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LayoutOptions {
    pub strategy: ExtractionStrategy,
    pub y_tolerance: f32,
    pub x_tolerance: f32,
}

impl Default for LayoutOptions {
    fn default() -> Self {
        RunConfig::default().layout_options()
    }
}

/// How to separate pages in the FULLTEXT section.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub enum PageSeparator {
    /// Two blank lines between pages. (default)
    #[default]
    Blank,
    /// ASCII form feed on its own line.
    FormFeed,
    /// Marker line with the number of the page that follows: "--- page N ---".
    Marker,
    /// Custom line inserted between pages.
    Custom(String),
}

impl PageSeparator {
    /// Render the separator placed before the given page (1-indexed).
    pub fn render(&self, page_num: usize) -> String {
        match self {
            PageSeparator::Blank => "\n\n\n".to_string(),
            PageSeparator::FormFeed => "\n\u{000C}\n".to_string(),
            PageSeparator::Marker => format!("\n\n--- page {} ---\n\n", page_num),
            PageSeparator::Custom(s) => format!("\n{}\n", s),
        }
    }
}
