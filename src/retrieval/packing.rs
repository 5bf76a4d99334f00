//! Token-bounded context packing with citations, and the grounded prompt.

use crate::chunking::tokens_for_chars;
use crate::retrieval::RetrievalCandidate;
use serde::Serialize;
use std::fmt;

/// Reference from a context block back to its source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Citation {
    /// 1-based block number.
    pub index: usize,
    /// Document name, or path when the name is missing.
    pub source: String,
    /// First page; `None` when unknown.
    pub page: Option<u32>,
}

impl fmt::Display for Citation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.page {
            Some(page) => write!(f, "{}:{page}", self.source),
            None => write!(f, "{}:?", self.source),
        }
    }
}

/// Token-bounded context assembled from ranked candidates.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PackedContext {
    /// Numbered blocks joined by blank lines.
    pub text: String,
    /// One citation per included block.
    pub citations: Vec<Citation>,
    /// Token estimate of `text`, separators included; `0` when empty.
    pub tokens_used: usize,
}

const BLOCK_SEPARATOR: &str = "\n\n";

/// Pack candidates in rank order until the next block would push the joined text past
/// `budget` tokens.
pub fn pack_context(candidates: &[RetrievalCandidate], budget: usize, chars_per_token: f32) -> PackedContext {
    let mut blocks = Vec::new();
    let mut citations = Vec::new();
    let mut chars = 0;
    let mut used = 0;

    for (offset, candidate) in candidates.iter().enumerate() {
        let index = offset + 1;
        let block = format!("[{index}] {}", candidate.text.trim());
        let separator = if blocks.is_empty() { 0 } else { BLOCK_SEPARATOR.len() };
        let next_chars = chars + separator + block.chars().count();
        let tokens = tokens_for_chars(next_chars, chars_per_token);
        if tokens > budget {
            break;
        }
        chars = next_chars;
        used = tokens;
        blocks.push(block);

        let metadata = &candidate.metadata;
        let source = if metadata.source.is_empty() {
            metadata.path.clone()
        } else {
            metadata.source.clone()
        };
        citations.push(Citation {
            index,
            source,
            page: (metadata.page_start > 0).then_some(metadata.page_start),
        });
    }

    PackedContext {
        text: blocks.join(BLOCK_SEPARATOR),
        citations,
        tokens_used: used,
    }
}

/// Grounded prompt instructing the model to answer only from the packed context.
pub fn build_prompt(question: &str, context: &PackedContext) -> String {
    let references = context
        .citations
        .iter()
        .map(|citation| format!("[{}] {citation}", citation.index))
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "You are a document assistant. Answer using only the reference context below. \
         If the context does not contain the answer, say that it was not found.\n\n\
         Question:\n{question}\n\nContext:\n{}\n\nReferences:\n{references}\n",
        context.text
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunking::estimate_tokens;
    use crate::index::ChunkMetadata;

    fn candidate(id: &str, text: String, page: u32) -> RetrievalCandidate {
        RetrievalCandidate {
            doc_id: id.into(),
            text,
            metadata: ChunkMetadata {
                doc_id: id.into(),
                source: format!("{id}.txt"),
                path: format!("/docs/{id}.pdf"),
                page_start: page,
                page_end: page,
                ..ChunkMetadata::default()
            },
            vector_rank: None,
            lexical_rank: None,
            vector_distance: None,
            fused_score: 0.0,
        }
    }

    #[test]
    fn stops_at_first_block_over_budget() {
        // Blocks of 399, 499 and 399 tokens.
        let candidates = vec![
            candidate("a", "x".repeat(1590), 1),
            candidate("b", "y".repeat(1990), 2),
            candidate("c", "z".repeat(1590), 3),
        ];
        let packed = pack_context(&candidates, 1200, 4.0);

        assert_eq!(packed.citations.len(), 2);
        assert_eq!(packed.tokens_used, 898);
        assert!(packed.text.starts_with("[1] x"));
        assert!(packed.text.contains("\n\n[2] y"));
        assert!(!packed.text.contains("[3]"));
        assert_eq!(packed.citations[1].to_string(), "b.txt:2");
    }

    #[test]
    fn separators_count_against_the_budget() {
        // Each block is exactly 400 tokens; the blank lines between three of them tip past 1200.
        let candidates: Vec<_> = ["a", "b", "c"]
            .iter()
            .enumerate()
            .map(|(idx, id)| candidate(id, "w".repeat(1596), idx as u32 + 1))
            .collect();
        let packed = pack_context(&candidates, 1200, 4.0);

        assert_eq!(packed.citations.len(), 2);
        assert_eq!(packed.tokens_used, estimate_tokens(&packed.text, 4.0));
        assert!(packed.tokens_used <= 1200);
    }

    #[test]
    fn packed_text_never_exceeds_budget() {
        let candidates: Vec<_> = (0..6)
            .map(|idx| candidate(&format!("d{idx}"), "ก".repeat(37 * (idx + 1)), 1))
            .collect();
        for budget in 1..400 {
            let packed = pack_context(&candidates, budget, 4.0);
            if packed.text.is_empty() {
                assert_eq!(packed.tokens_used, 0);
            } else {
                assert!(estimate_tokens(&packed.text, 4.0) <= budget, "budget {budget}");
                assert_eq!(packed.tokens_used, estimate_tokens(&packed.text, 4.0));
            }
        }
    }

    #[test]
    fn unknown_pages_cite_question_mark() {
        let packed = pack_context(&[candidate("a", "short".into(), 0)], 1200, 4.0);
        assert_eq!(packed.citations[0].to_string(), "a.txt:?");
    }

    #[test]
    fn oversize_first_block_yields_empty_context() {
        let packed = pack_context(&[candidate("a", "x".repeat(10_000), 1)], 100, 4.0);
        assert!(packed.text.is_empty());
        assert!(packed.citations.is_empty());
        assert_eq!(packed.tokens_used, 0);
    }

    #[test]
    fn prompt_lists_question_context_and_references() {
        let packed = pack_context(&[candidate("a", "Budget approved.".into(), 4)], 1200, 4.0);
        let prompt = build_prompt("Was the budget approved?", &packed);
        assert!(prompt.contains("Question:\nWas the budget approved?"));
        assert!(prompt.contains("Context:\n[1] Budget approved."));
        assert!(prompt.contains("References:\n[1] a.txt:4"));
    }
}
