//! Text extraction: turn a downloaded PDF into ordered per-page lines.
//!
//! Each page first asks pdfium for its native flowed text. When that comes
//! back empty (or when the strategy says so) the page is rebuilt from glyph
//! boxes by [`crate::pipeline::layout`]. A document whose pages all come
//! back empty is an extraction failure.
//!
//! ## Why spawn_blocking?
//!
//! pdfium is a C++ library with thread-local state; calling it from an async
//! worker would stall the runtime. The runner moves every
//! [`TextExtractor::extract`] call onto the blocking pool and awaits it
//! before doing anything else.

use crate::config::{ExtractionStrategy, LayoutOptions, RunConfig};
use crate::error::{BatchError, RecordError};
use crate::output::{ExtractedText, PageText, TextSource};
use crate::pipeline::layout::{reconstruct_lines, segment_words, Glyph, Word};
use crate::pipeline::normalize::page_lines;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Converts a document on disk into [`ExtractedText`].
///
/// Implementations are synchronous and may block; the runner calls them on
/// the blocking thread pool.
pub trait TextExtractor: Send + Sync + 'static {
    fn extract(&self, id: &str, path: &Path) -> Result<ExtractedText, RecordError>;
}

/// One page of an opened document, as seen by the strategy logic.
pub trait PageSource {
    /// The parser's flowed text for the page, if it has any.
    fn native_text(&self) -> Option<String>;

    /// Words with bounding boxes, segmented with the given tolerances.
    fn words(&self, x_tolerance: f32, y_tolerance: f32) -> Vec<Word>;
}

/// Produce one page's text according to the strategy.
pub fn extract_page(page: &dyn PageSource, page_num: usize, options: &LayoutOptions) -> PageText {
    if options.strategy != ExtractionStrategy::Layout {
        let lines = page.native_text().map(|t| page_lines(&t)).unwrap_or_default();
        if !lines.is_empty() {
            return PageText {
                page_num,
                lines,
                source: TextSource::Native,
            };
        }
        if options.strategy == ExtractionStrategy::Native {
            return PageText::empty(page_num);
        }
        debug!("Page {}: no native text, rebuilding from word boxes", page_num);
    }

    let words = page.words(options.x_tolerance, options.y_tolerance);
    let lines = reconstruct_lines(&words, options.y_tolerance);
    if lines.is_empty() {
        PageText::empty(page_num)
    } else {
        PageText {
            page_num,
            lines,
            source: TextSource::Layout,
        }
    }
}

/// Run [`extract_page`] over every page and enforce the non-empty rule.
pub fn extract_pages<'a>(
    id: &str,
    pages: impl IntoIterator<Item = &'a dyn PageSource>,
    options: &LayoutOptions,
) -> Result<ExtractedText, RecordError> {
    let text = ExtractedText::new(
        pages
            .into_iter()
            .enumerate()
            .map(|(idx, page)| extract_page(page, idx + 1, options))
            .collect(),
    );
    if text.pages.is_empty() {
        return Err(RecordError::extraction(id, "document has no pages"));
    }
    if text.is_empty() {
        return Err(RecordError::extraction(
            id,
            format!("no extractable text on any of {} pages", text.pages.len()),
        ));
    }
    Ok(text)
}

// ── pdfium backend ───────────────────────────────────────────────────────

/// Bind pdfium from an explicit location or the system library.
///
/// `library` may name the shared library itself or the directory holding it.
pub fn bind_pdfium(library: Option<&Path>) -> Result<Pdfium, PdfiumError> {
    let bindings = match library {
        Some(path) if path.is_dir() => {
            Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(path))?
        }
        Some(path) => Pdfium::bind_to_library(path)?,
        None => Pdfium::bind_to_system_library()?,
    };
    Ok(Pdfium::new(bindings))
}

/// [`TextExtractor`] backed by pdfium.
#[derive(Debug, Clone)]
pub struct PdfiumExtractor {
    library: Option<PathBuf>,
    options: LayoutOptions,
}

impl PdfiumExtractor {
    /// Build from the run configuration, checking once that pdfium binds so
    /// a missing library fails the run up front instead of every record.
    pub fn from_config(config: &RunConfig) -> Result<Self, BatchError> {
        let extractor = Self {
            library: config.pdfium_library.clone(),
            options: config.layout_options(),
        };
        bind_pdfium(extractor.library.as_deref())
            .map_err(|e| BatchError::PdfiumBindingFailed(format!("{e:?}")))?;
        info!(
            "pdfium ready (strategy {:?}, y_tolerance {}, x_tolerance {})",
            extractor.options.strategy, extractor.options.y_tolerance, extractor.options.x_tolerance
        );
        Ok(extractor)
    }
}

impl TextExtractor for PdfiumExtractor {
    fn extract(&self, id: &str, path: &Path) -> Result<ExtractedText, RecordError> {
        let pdfium = bind_pdfium(self.library.as_deref())
            .map_err(|e| RecordError::extraction(id, format!("pdfium unavailable: {e:?}")))?;

        let document = pdfium
            .load_pdf_from_file(path, None)
            .map_err(|e| RecordError::extraction(id, format!("cannot open PDF: {e:?}")))?;

        let pages = document.pages();
        debug!("{}: {} pages", id, pages.len());

        let mut sources = Vec::with_capacity(pages.len() as usize);
        for (idx, page) in pages.iter().enumerate() {
            let height = page.height().value;
            match page.text() {
                Ok(text) => sources.push(PdfiumPage::collect(&text, height)),
                Err(e) => {
                    warn!("{}: page {} has no text layer: {:?}", id, idx + 1, e);
                    sources.push(PdfiumPage::default());
                }
            }
        }

        extract_pages(id, sources.iter().map(|p| p as &dyn PageSource), &self.options)
    }
}

/// Snapshot of one pdfium page: native text plus positioned glyphs.
///
/// Collected eagerly so the strategy logic never holds pdfium handles.
#[derive(Debug, Default)]
struct PdfiumPage {
    native: String,
    glyphs: Vec<Glyph>,
}

impl PdfiumPage {
    fn collect(text: &PdfPageText, page_height: f32) -> Self {
        let glyphs = text
            .chars()
            .iter()
            .filter_map(|c| {
                let ch = c.unicode_char()?;
                let bounds = c.loose_bounds().ok()?;
                Some(Glyph {
                    ch,
                    x0: bounds.left().value,
                    x1: bounds.right().value,
                    // pdfium's origin is bottom-left; flip to distance from the top.
                    top: page_height - bounds.top().value,
                })
            })
            .collect();
        Self {
            native: text.all(),
            glyphs,
        }
    }
}

impl PageSource for PdfiumPage {
    fn native_text(&self) -> Option<String> {
        (!self.native.trim().is_empty()).then(|| self.native.clone())
    }

    fn words(&self, x_tolerance: f32, y_tolerance: f32) -> Vec<Word> {
        segment_words(&self.glyphs, x_tolerance, y_tolerance)
    }
}
