//! Ordered regex lists recognising headings, list items and bullets.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Errors raised while loading or compiling pattern sets.
#[derive(Debug, Error)]
pub enum PatternError {
    /// Pattern file could not be read.
    #[error("failed to read pattern file: {0}")]
    Io(#[from] std::io::Error),
    /// Pattern file is not valid JSON.
    #[error("failed to parse pattern file: {0}")]
    Json(#[from] serde_json::Error),
    /// A pattern failed to compile.
    #[error("invalid pattern `{pattern}`: {source}")]
    Regex {
        /// Offending pattern.
        pattern: String,
        /// Compiler error.
        #[source]
        source: regex::Error,
    },
}

/// Serializable pattern lists. Missing lists fall back to the defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PatternSource {
    /// Matched against the first line of a paragraph.
    pub headings: Vec<String>,
    /// Matched against single lines while splitting blocks.
    pub list_items: Vec<String>,
    /// Matched against whole paragraphs when merging bullet runs across pages.
    pub bullets: Vec<String>,
}

impl Default for PatternSource {
    fn default() -> Self {
        let owned = |patterns: &[&str]| patterns.iter().map(|p| p.to_string()).collect();
        Self {
            headings: owned(&[
                r"^บท\s*ที่\s*\d+",
                r"^หมวด\s*ที่?\s*\d+",
                r"^ภาคผนวก",
                r"^บท\s*\d+",
                r"^(?:\d+\.)+\s+",
                r"^\d+\)\s+",
                r"^[A-Za-zก-๙]+\s*:\s+",
            ]),
            list_items: owned(&[
                r"^[-•–*]\s+",
                r"^\d+[.)]\s+",
                r"^[ก-ฮ]\)\s+",
                r"^\([0-9]+\)\s+",
                r"^\([ก-ฮ]\)\s+",
            ]),
            bullets: owned(&[
                r"^[-•–]\s+",
                r"^[ก-ฮ]\)\s+",
                r"^\([ก-ฮ]\)\s+",
                r"^\([0-9]+\)\s+",
            ]),
        }
    }
}

/// Compiled pattern lists.
#[derive(Debug, Clone)]
pub struct PatternSet {
    headings: Vec<Regex>,
    list_items: Vec<Regex>,
    bullets: Vec<Regex>,
}

impl PatternSet {
    /// Compile every list in `source`.
    pub fn compile(source: &PatternSource) -> Result<Self, PatternError> {
        Ok(Self {
            headings: compile_all(&source.headings)?,
            list_items: compile_all(&source.list_items)?,
            bullets: compile_all(&source.bullets)?,
        })
    }

    /// Load a JSON [`PatternSource`] from disk and compile it.
    pub fn load(path: &Path) -> Result<Self, PatternError> {
        let raw = std::fs::read_to_string(path)?;
        let source: PatternSource = serde_json::from_str(&raw)?;
        Self::compile(&source)
    }

    /// Whether the first line of `paragraph` looks like a heading.
    pub fn is_heading(&self, paragraph: &str) -> bool {
        let first_line = paragraph.trim().lines().next().unwrap_or_default();
        self.headings.iter().any(|re| re.is_match(first_line))
    }

    /// Whether a single line starts a list item.
    pub fn is_list_item(&self, line: &str) -> bool {
        let line = line.trim();
        self.list_items.iter().any(|re| re.is_match(line))
    }

    /// Whether a paragraph is a bullet that may continue a bullet run.
    pub fn is_bullet(&self, paragraph: &str) -> bool {
        let paragraph = paragraph.trim();
        self.bullets.iter().any(|re| re.is_match(paragraph))
    }
}

impl Default for PatternSet {
    fn default() -> Self {
        Self::compile(&PatternSource::default()).expect("default patterns compile")
    }
}

fn compile_all(patterns: &[String]) -> Result<Vec<Regex>, PatternError> {
    patterns
        .iter()
        .map(|pattern| {
            Regex::new(pattern).map_err(|source| PatternError::Regex {
                pattern: pattern.clone(),
                source,
            })
        })
        .collect()
}
