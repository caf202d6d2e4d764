//! Normalisation of parser-native page text.
//!
//! pdfium reports page text with `\r\n` line breaks, sprinkles in zero-width
//! and soft-hyphen characters, and marks generated characters with Unicode
//! non-characters. The rules below strip those artefacts without touching
//! the words themselves.
//!
//! ## Rule Order
//!
//! Line endings are normalised first so every later rule can assume `\n`;
//! invisible characters go before whitespace trimming because a trailing
//! zero-width space would otherwise shield the spaces before it.

use once_cell::sync::Lazy;
use regex::Regex;

/// Apply all normalisation rules to a page's native text.
///
/// Rules (applied in order):
/// 1. Normalise line endings (CRLF / CR → LF)
/// 2. Strip invisible Unicode and stray control characters
/// 3. Trim trailing whitespace per line
/// 4. Collapse 3+ consecutive blank lines down to 2
/// 5. Drop leading and trailing blank lines
pub fn clean_page_text(input: &str) -> String {
    let s = normalise_line_endings(input);
    let s = remove_invisible_chars(&s);
    let s = trim_trailing_whitespace(&s);
    let s = collapse_blank_lines(&s);
    trim_blank_edges(&s).to_string()
}

/// Clean a page's native text and split it into lines.
///
/// Returns no lines when nothing but whitespace remains.
pub fn page_lines(input: &str) -> Vec<String> {
    let cleaned = clean_page_text(input);
    if cleaned.is_empty() {
        return Vec::new();
    }
    cleaned.lines().map(str::to_string).collect()
}

// ── Rule 1: Normalise line endings ───────────────────────────────────────────

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

// ── Rule 2: Remove invisible characters ──────────────────────────────────────

fn remove_invisible_chars(input: &str) -> String {
    input
        .chars()
        .filter(|&c| !is_invisible(c))
        .collect()
}

fn is_invisible(c: char) -> bool {
    matches!(
        c,
        '\u{200B}' | '\u{FEFF}' | '\u{00AD}' | '\u{200C}' | '\u{200D}' | '\u{2060}'
            | '\u{FFFE}' | '\u{FFFF}'
    ) || (c.is_control() && !matches!(c, '\n' | '\t' | '\u{000C}'))
}

// ── Rule 3: Trim trailing whitespace per line ────────────────────────────────

fn trim_trailing_whitespace(input: &str) -> String {
    input
        .lines()
        .map(|line| line.trim_end())
        .collect::<Vec<_>>()
        .join("\n")
}

// ── Rule 4: Collapse excessive blank lines ───────────────────────────────────

static RE_BLANK_LINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{4,}").unwrap());

fn collapse_blank_lines(input: &str) -> String {
    RE_BLANK_LINES.replace_all(input, "\n\n\n").to_string()
}

// ── Rule 5: Drop blank lines at both ends ────────────────────────────────────

fn trim_blank_edges(input: &str) -> &str {
    input.trim_start_matches('\n').trim_end()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalise_line_endings() {
        assert_eq!(normalise_line_endings("a\r\nb\rc"), "a\nb\nc");
    }

    #[test]
    fn test_remove_invisible() {
        assert_eq!(remove_invisible_chars("co\u{00AD}operate\u{200B}"), "cooperate");
        assert_eq!(remove_invisible_chars("a\u{FFFE}b\u{0002}c"), "abc");
        assert_eq!(remove_invisible_chars("keep\ttabs\nand lines"), "keep\ttabs\nand lines");
    }

    #[test]
    fn test_trim_trailing_whitespace() {
        assert_eq!(trim_trailing_whitespace("a  \nb\t\nc"), "a\nb\nc");
    }

    #[test]
    fn test_collapse_blank_lines() {
        assert_eq!(collapse_blank_lines("a\n\n\n\n\n\nb"), "a\n\n\nb");
        assert_eq!(collapse_blank_lines("a\n\nb"), "a\n\nb");
    }

    #[test]
    fn test_clean_page_text_full_pipeline() {
        let raw = "\r\n\r\nAttention Is All You Need  \r\nAshish Vaswani\u{200B}\r\n\r\n\r\n\r\n\r\nAbstract\r\n  \r\n";
        assert_eq!(
            clean_page_text(raw),
            "Attention Is All You Need\nAshish Vaswani\n\n\nAbstract"
        );
    }

    #[test]
    fn test_page_lines_keeps_internal_breaks() {
        assert_eq!(
            page_lines("Title\r\n\r\nBody line"),
            vec!["Title", "", "Body line"]
        );
    }

    #[test]
    fn test_whitespace_only_page_has_no_lines() {
        assert!(page_lines(" \r\n\u{200B}\r\n\t").is_empty());
        assert!(page_lines("").is_empty());
    }
}
