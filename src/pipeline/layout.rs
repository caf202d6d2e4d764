//! Geometric reading-order reconstruction from word bounding boxes.
//!
//! Used for pages where the parser's native text is empty (or always, with
//! [`crate::config::ExtractionStrategy::Layout`]). Coordinates follow the
//! usual text-layout convention: `top` grows downwards from the top edge of
//! the page, `x0`/`x1` grow rightwards.
//!
//! ## Line grouping
//!
//! ```text
//! sort words by (top quantised to Ty, x0)
//! for each word:
//!     |top - line_y| > Ty  →  close line, open new one at top
//!     otherwise            →  append to current line
//! flush last line
//! ```
//!
//! The reference `line_y` is set by the first word of a line and is not
//! updated while the line grows, so a slow baseline drift cannot chain two
//! visual lines together.

/// A positioned glyph as reported by the parser.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Glyph {
    pub ch: char,
    pub x0: f32,
    pub x1: f32,
    pub top: f32,
}

/// A word with its bounding box.
#[derive(Debug, Clone, PartialEq)]
pub struct Word {
    pub text: String,
    pub x0: f32,
    pub x1: f32,
    pub top: f32,
}

impl Word {
    pub fn new(text: impl Into<String>, top: f32, x0: f32) -> Self {
        Self {
            text: text.into(),
            x0,
            x1: x0,
            top,
        }
    }

    fn from_glyph(g: &Glyph) -> Self {
        Self {
            text: g.ch.to_string(),
            x0: g.x0,
            x1: g.x1,
            top: g.top,
        }
    }

    fn push(&mut self, g: &Glyph) {
        self.text.push(g.ch);
        self.x0 = self.x0.min(g.x0);
        self.x1 = self.x1.max(g.x1);
        self.top = self.top.min(g.top);
    }
}

/// Group glyphs (in content-stream order) into words.
///
/// A word ends at whitespace or a control character, or when the next glyph
/// starts more than `x_tolerance` right of the word's right edge, starts left
/// of the word's left edge, or sits more than `y_tolerance` above or below
/// it. Glyphs overlapping the right edge (kerning) stay in the word.
pub fn segment_words(glyphs: &[Glyph], x_tolerance: f32, y_tolerance: f32) -> Vec<Word> {
    let mut words = Vec::new();
    let mut current: Option<Word> = None;

    for g in glyphs {
        if g.ch.is_whitespace() || g.ch.is_control() {
            words.extend(current.take());
            continue;
        }
        match current.as_mut() {
            Some(w)
                if g.x0 <= w.x1 + x_tolerance
                    && g.x0 >= w.x0
                    && (g.top - w.top).abs() <= y_tolerance =>
            {
                w.push(g)
            }
            _ => {
                words.extend(current.take());
                current = Some(Word::from_glyph(g));
            }
        }
    }
    words.extend(current);
    words
}

/// Rebuild reading-order lines from words.
///
/// Blank words are dropped; words on one line are joined by a single space
/// in left-to-right order.
pub fn reconstruct_lines(words: &[Word], y_tolerance: f32) -> Vec<String> {
    let mut sorted: Vec<&Word> = words.iter().filter(|w| !w.text.trim().is_empty()).collect();
    sorted.sort_by(|a, b| {
        quantise(a.top, y_tolerance)
            .total_cmp(&quantise(b.top, y_tolerance))
            .then_with(|| a.x0.total_cmp(&b.x0))
    });

    let mut lines = Vec::new();
    let mut current: Vec<&Word> = Vec::new();
    let mut line_y: Option<f32> = None;

    for word in sorted {
        match line_y {
            Some(y) if (word.top - y).abs() <= y_tolerance => {}
            _ => {
                flush_line(&mut current, &mut lines);
                line_y = Some(word.top);
            }
        }
        current.push(word);
    }
    flush_line(&mut current, &mut lines);
    lines
}

fn flush_line(current: &mut Vec<&Word>, lines: &mut Vec<String>) {
    if current.is_empty() {
        return;
    }
    // Quantisation can split one visual line across two buckets.
    current.sort_by(|a, b| a.x0.total_cmp(&b.x0));
    let line = current
        .iter()
        .map(|w| w.text.trim())
        .collect::<Vec<_>>()
        .join(" ");
    lines.push(line);
    current.clear();
}

/// Snap `top` to a multiple of the tolerance so jitter sorts together.
fn quantise(top: f32, tolerance: f32) -> f32 {
    if tolerance > 0.0 {
        (top / tolerance).round() * tolerance
    } else {
        top
    }
}
