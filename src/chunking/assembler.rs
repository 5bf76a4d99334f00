use crate::chunking::{Chunk, ChunkSettings, estimate_tokens, normalize_doc_name, tokens_for_chars};
use crate::segment::{Paragraph, split_sentences};
use std::path::Path;
use time::OffsetDateTime;

/// Pack paragraphs of one file into token-bounded chunks.
///
/// `path` is the resolved source path; chunks never span files.
pub fn assemble_chunks(paragraphs: &[Paragraph], path: &str, settings: &ChunkSettings) -> Vec<Chunk> {
    let mut assembler = Assembler::new(path, settings);
    for paragraph in paragraphs {
        assembler.add(paragraph);
    }
    assembler.finish()
}

struct Assembler<'a> {
    settings: &'a ChunkSettings,
    source: String,
    path: String,
    updated_at: i64,
    carry: Option<String>,
    parts: Vec<String>,
    pages: Vec<u32>,
    chunks: Vec<Chunk>,
}

impl<'a> Assembler<'a> {
    fn new(path: &str, settings: &'a ChunkSettings) -> Self {
        Self {
            settings,
            source: normalize_doc_name(Path::new(path)),
            path: path.to_string(),
            updated_at: OffsetDateTime::now_utc().unix_timestamp(),
            carry: None,
            parts: Vec::new(),
            pages: Vec::new(),
            chunks: Vec::new(),
        }
    }

    fn add(&mut self, paragraph: &Paragraph) {
        let text = paragraph.text.trim();
        if text.is_empty() {
            return;
        }
        if paragraph.is_heading && !self.parts.is_empty() {
            self.flush(true);
        }
        if self.fits(text) {
            self.push(text.to_string(), paragraph.page);
            return;
        }
        if !self.parts.is_empty() {
            self.flush(true);
        }
        if self.fits(text) {
            self.push(text.to_string(), paragraph.page);
            return;
        }
        if self.carry.is_some() && self.fits_alone(text) {
            tracing::debug!(path = %self.path, "Dropping overlap tail to fit paragraph");
            self.carry = None;
            self.push(text.to_string(), paragraph.page);
            return;
        }
        self.split_long(text, paragraph.page);
    }

    fn finish(mut self) -> Vec<Chunk> {
        if !self.parts.is_empty() {
            self.flush(false);
        }
        self.chunks
    }

    /// Pack the sentences of an oversize paragraph; the last pack stays open.
    fn split_long(&mut self, text: &str, page: Option<u32>) {
        let max_chars = self.max_chars();
        let sentences: Vec<String> = split_sentences(text)
            .into_iter()
            .flat_map(|sentence| hard_split(&sentence, max_chars))
            .collect();

        let mut pack = String::new();
        for sentence in sentences {
            let candidate = if pack.is_empty() {
                sentence.clone()
            } else {
                format!("{pack} {sentence}")
            };
            if self.fits(&candidate) {
                pack = candidate;
                continue;
            }
            if !pack.is_empty() {
                self.push(std::mem::take(&mut pack), page);
                self.flush(true);
            }
            pack = sentence;
            if !self.fits(&pack) {
                self.carry = None;
            }
        }
        if !pack.is_empty() {
            self.push(pack, page);
        }
    }

    fn push(&mut self, text: String, page: Option<u32>) {
        self.parts.push(text);
        if let Some(page) = page.filter(|page| *page > 0) {
            self.pages.push(page);
        }
    }

    fn flush(&mut self, carry_forward: bool) {
        let text = self.compose();
        self.parts.clear();
        let pages = std::mem::take(&mut self.pages);
        self.carry = None;
        if text.is_empty() {
            return;
        }

        let page_start = pages.iter().copied().min().unwrap_or(0);
        let page_end = pages.iter().copied().max().unwrap_or(0);
        if carry_forward {
            self.carry = overlap_tail(&text, self.settings.overlap_ratio);
        }
        self.chunks.push(Chunk {
            source: self.source.clone(),
            path: self.path.clone(),
            page_start,
            page_end,
            owner: self.settings.owner.clone(),
            sensitivity: self.settings.sensitivity.clone(),
            tokens_est: estimate_tokens(&text, self.settings.chars_per_token),
            text,
            updated_at: self.updated_at,
        });
    }

    fn compose(&self) -> String {
        let body = self.parts.join("\n\n");
        match &self.carry {
            Some(carry) => format!("{carry}\n{}", body.trim()),
            None => body.trim().to_string(),
        }
    }

    /// Whether `extra` fits next to the carried tail and the open parts.
    fn fits(&self, extra: &str) -> bool {
        let mut body = extra.chars().count();
        for part in &self.parts {
            body += part.chars().count() + 2;
        }
        let total = match &self.carry {
            Some(carry) => carry.chars().count() + 1 + body,
            None => body,
        };
        tokens_for_chars(total, self.settings.chars_per_token) <= self.settings.max_tokens
    }

    fn fits_alone(&self, text: &str) -> bool {
        estimate_tokens(text, self.settings.chars_per_token) <= self.settings.max_tokens
    }

    fn max_chars(&self) -> usize {
        ((self.settings.max_tokens as f64 * f64::from(self.settings.chars_per_token)).floor() as usize).max(1)
    }
}

/// Exactly the last `floor(ratio * len)` characters of `text`, whitespace included.
fn overlap_tail(text: &str, ratio: f32) -> Option<String> {
    let total = text.chars().count();
    let take = ((f64::from(ratio) * total as f64).floor() as usize).min(total);
    (take > 0).then(|| text.chars().skip(total - take).collect())
}

/// Cut a sentence longer than `max_chars` on character boundaries.
fn hard_split(sentence: &str, max_chars: usize) -> Vec<String> {
    let chars: Vec<char> = sentence.chars().collect();
    if chars.len() <= max_chars {
        return vec![sentence.to_string()];
    }
    chars
        .chunks(max_chars)
        .map(|piece| piece.iter().collect::<String>().trim().to_string())
        .filter(|piece| !piece.is_empty())
        .collect()
}
