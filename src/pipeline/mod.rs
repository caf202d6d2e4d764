//! Pipeline stages for turning a paper list into text documents.
//!
//! Each submodule implements exactly one step. The runner in
//! [`crate::runner`] strings them together, one record at a time.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ rate_limit ──▶ fetch ──▶ extract ──▶ (runner writes) ──▶ checkpoint
//! (records)  (slot)        (PDF)     (pages)       (document)         (id log)
//! ```
//!
//! 1. [`input`]      — load the record collection (JSON array or JSON Lines)
//! 2. [`rate_limit`] — sliding-window bound on outbound requests
//! 3. [`fetch`]      — stream the PDF to a transient artifact file
//! 4. [`extract`]    — pdfium text per page; runs in `spawn_blocking`
//!    - [`normalize`] — cleanup of parser-native text
//!    - [`layout`]    — reading order rebuilt from word boxes
//! 5. [`checkpoint`] — durable log of completed identifiers

pub mod checkpoint;
pub mod extract;
pub mod fetch;
pub mod input;
pub mod layout;
pub mod normalize;
pub mod rate_limit;
