//! Token-bounded chunk assembly.
//!
//! Paragraphs are packed greedily into chunks whose estimated token count stays within the
//! budget. Headings start a new chunk, and every flushed chunk hands a short tail of its text to
//! the next one so answers spanning a boundary stay retrievable.

mod assembler;

pub use assembler::assemble_chunks;

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Budget and labelling applied to every chunk.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkSettings {
    /// Maximum estimated tokens per chunk.
    pub max_tokens: usize,
    /// Fraction of a flushed chunk carried into the next one.
    pub overlap_ratio: f32,
    /// Characters per estimated token.
    pub chars_per_token: f32,
    /// Owner label.
    pub owner: String,
    /// Sensitivity label.
    pub sensitivity: String,
}

impl Default for ChunkSettings {
    fn default() -> Self {
        Self {
            max_tokens: 800,
            overlap_ratio: 0.12,
            chars_per_token: 4.0,
            owner: "owner:unknown".into(),
            sensitivity: "internal".into(),
        }
    }
}

/// A bounded unit of document text with its provenance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    /// Normalised document name.
    pub source: String,
    /// Resolved path of the source file.
    pub path: String,
    /// First page covered; `0` when unknown.
    pub page_start: u32,
    /// Last page covered; `0` when unknown.
    pub page_end: u32,
    /// Owner label.
    pub owner: String,
    /// Sensitivity label.
    pub sensitivity: String,
    /// Estimated token count of `text`.
    pub tokens_est: usize,
    /// Chunk text; non-empty, and led by the carried overlap tail after the first chunk.
    pub text: String,
    /// Creation time as unix seconds.
    pub updated_at: i64,
}

impl Chunk {
    /// Page span, or `None` when no paragraph carried a valid page.
    pub fn page_span(&self) -> Option<(u32, u32)> {
        (self.page_start > 0).then_some((self.page_start, self.page_end))
    }
}

/// Estimated token count: characters over `chars_per_token`, rounded up, at least 1.
pub fn estimate_tokens(text: &str, chars_per_token: f32) -> usize {
    tokens_for_chars(text.chars().count(), chars_per_token)
}

pub(crate) fn tokens_for_chars(chars: usize, chars_per_token: f32) -> usize {
    let per_token = f64::from(chars_per_token.max(f32::EPSILON));
    ((chars as f64 / per_token).ceil() as usize).max(1)
}

/// Document name used as the chunk `source`: lowercase stem with other characters folded to
/// `_`, plus a `.txt` suffix.
pub fn normalize_doc_name(path: &Path) -> String {
    let stem = path
        .file_stem()
        .map(|stem| stem.to_string_lossy().to_lowercase())
        .unwrap_or_default();

    let mut name = String::with_capacity(stem.len());
    let mut pending_separator = false;
    for c in stem.chars() {
        if c.is_ascii_alphanumeric() || ('\u{0E00}'..='\u{0E7F}').contains(&c) {
            if pending_separator && !name.is_empty() {
                name.push('_');
            }
            pending_separator = false;
            name.push(c);
        } else {
            pending_separator = true;
        }
    }

    if name.is_empty() {
        name.push_str("document");
    }
    name.push_str(".txt");
    name
}
