//! Paragraph segmentation of cleaned page text.
//!
//! Blocks are separated by blank lines. Inside a block, runs of list-item lines form one
//! paragraph and other lines accumulate into prose paragraphs. Overlong prose is cut on sentence
//! boundaries so later chunking never sees a single multi-page paragraph.

pub mod patterns;

pub use patterns::{PatternError, PatternSet, PatternSource};

use crate::extraction::PageRecord;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

/// Prose paragraphs longer than this many characters are split into sentences.
pub const LONG_PARAGRAPH_CHARS: usize = 1200;
/// Upper bound for repacked sentence groups.
pub const SENTENCE_PACK_CHARS: usize = 600;
const MIN_PARAGRAPH_CHARS: usize = 2;

const SENTENCE_TERMINATORS: [char; 7] = ['.', '!', '?', '…', '\u{0E2F}', '\u{0E5B}', '\u{0E46}'];

static BLOCK_SEPARATOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n\s*\n+").expect("valid block regex"));

/// A paragraph with its source page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Paragraph {
    /// 1-based page; `None` when the page number was missing or invalid.
    pub page: Option<u32>,
    /// Trimmed paragraph text.
    pub text: String,
    /// Whether the first line matched a heading pattern.
    pub is_heading: bool,
}

/// Split cleaned page text into paragraph strings.
pub fn split_paragraphs(text: &str, patterns: &PatternSet) -> Vec<String> {
    let mut paragraphs = Vec::new();
    for block in BLOCK_SEPARATOR.split(text.trim()) {
        let mut prose: Vec<&str> = Vec::new();
        let mut items: Vec<&str> = Vec::new();
        for line in block.lines().map(str::trim).filter(|line| !line.is_empty()) {
            if patterns.is_list_item(line) {
                flush_prose(&mut prose, &mut paragraphs);
                items.push(line);
            } else {
                flush_items(&mut items, &mut paragraphs);
                prose.push(line);
            }
        }
        flush_prose(&mut prose, &mut paragraphs);
        flush_items(&mut items, &mut paragraphs);
    }
    paragraphs
        .into_iter()
        .filter(|p| p.chars().count() >= MIN_PARAGRAPH_CHARS)
        .collect()
}

fn flush_items(items: &mut Vec<&str>, out: &mut Vec<String>) {
    if !items.is_empty() {
        out.push(items.join("\n"));
        items.clear();
    }
}

fn flush_prose(prose: &mut Vec<&str>, out: &mut Vec<String>) {
    if prose.is_empty() {
        return;
    }
    let paragraph = prose.join("\n");
    prose.clear();
    if paragraph.chars().count() > LONG_PARAGRAPH_CHARS {
        out.extend(pack_sentences(&split_sentences(&paragraph), SENTENCE_PACK_CHARS));
    } else {
        out.push(paragraph);
    }
}

/// Split text after sentence terminators followed by whitespace.
///
/// Text without terminators comes back as a single sentence.
pub fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current = String::new();
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        current.push(c);
        let at_boundary = SENTENCE_TERMINATORS.contains(&c)
            && chars.peek().is_some_and(|next| next.is_whitespace());
        if at_boundary {
            while chars.peek().is_some_and(|next| next.is_whitespace()) {
                chars.next();
            }
            push_trimmed(&mut sentences, &current);
            current.clear();
        }
    }
    push_trimmed(&mut sentences, &current);
    sentences
}

fn push_trimmed(out: &mut Vec<String>, text: &str) {
    let trimmed = text.trim();
    if !trimmed.is_empty() {
        out.push(trimmed.to_string());
    }
}

/// Greedily join sentences with spaces into groups of at most `limit` characters.
///
/// A sentence longer than `limit` forms its own group.
pub fn pack_sentences(sentences: &[String], limit: usize) -> Vec<String> {
    let mut packs = Vec::new();
    let mut buffer = String::new();
    let mut buffer_chars = 0usize;
    for sentence in sentences {
        let sentence_chars = sentence.chars().count();
        if buffer.is_empty() {
            buffer.push_str(sentence);
            buffer_chars = sentence_chars;
        } else if buffer_chars + 1 + sentence_chars <= limit {
            buffer.push(' ');
            buffer.push_str(sentence);
            buffer_chars += 1 + sentence_chars;
        } else {
            packs.push(std::mem::take(&mut buffer));
            buffer.push_str(sentence);
            buffer_chars = sentence_chars;
        }
    }
    if !buffer.is_empty() {
        packs.push(buffer);
    }
    packs
}

/// Paragraphs of a single page record.
pub fn segment_page(record: &PageRecord, patterns: &PatternSet) -> Vec<Paragraph> {
    segment_document(std::slice::from_ref(record), patterns)
}

/// Paragraphs of a whole document in page order.
///
/// Consecutive bullet paragraphs are merged, including across page boundaries, before headings
/// are tagged. A merged run keeps the page of its first bullet.
pub fn segment_document(records: &[PageRecord], patterns: &PatternSet) -> Vec<Paragraph> {
    let mut merged: Vec<Paragraph> = Vec::new();
    let mut in_bullet_run = false;

    for record in records {
        let page = (record.page_no > 0).then_some(record.page_no);
        let texts: Vec<&str> = if record.paragraphs.is_empty() {
            vec![record.text.as_str()]
        } else {
            record.paragraphs.iter().map(String::as_str).collect()
        };

        for text in texts.into_iter().map(str::trim).filter(|t| !t.is_empty()) {
            let bullet = patterns.is_bullet(text);
            match merged.last_mut() {
                Some(last) if bullet && in_bullet_run => {
                    last.text.push('\n');
                    last.text.push_str(text);
                }
                _ => merged.push(Paragraph {
                    page,
                    text: text.to_string(),
                    is_heading: false,
                }),
            }
            in_bullet_run = bullet;
        }
    }

    for paragraph in &mut merged {
        paragraph.is_heading = patterns.is_heading(&paragraph.text);
    }
    merged
}
