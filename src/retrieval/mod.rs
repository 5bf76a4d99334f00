//! Hybrid retrieval and answer-context packing.
//!
//! Dense and lexical candidates are fused with reciprocal rank fusion and packed, in rank
//! order, into a token-bounded context with citations.

pub mod fusion;
pub mod hybrid;
pub mod packing;
pub mod service;

pub use fusion::{FusedRank, fuse_rankings};
pub use hybrid::HybridRetriever;
pub use packing::{Citation, PackedContext, build_prompt, pack_context};
pub use service::{ContextSummary, QueryError, QueryOutcome, QueryService};

use crate::index::ChunkMetadata;
use serde::Serialize;

/// Candidate counts, fusion constant and context budget.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievalSettings {
    /// Candidates requested from the vector index.
    pub k_vector: usize,
    /// Candidates requested from the lexical index.
    pub k_lexical: usize,
    /// Reciprocal rank fusion constant.
    pub rrf_k: f64,
    /// Fused candidates kept.
    pub max_contexts: usize,
    /// Token budget of the packed context.
    pub token_budget: usize,
    /// Characters per estimated token.
    pub chars_per_token: f32,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            k_vector: 20,
            k_lexical: 30,
            rrf_k: 60.0,
            max_contexts: 8,
            token_budget: 1200,
            chars_per_token: 4.0,
        }
    }
}

/// A fused retrieval result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievalCandidate {
    /// Canonical chunk identifier.
    pub doc_id: String,
    /// Chunk text.
    pub text: String,
    /// Chunk metadata.
    pub metadata: ChunkMetadata,
    /// 1-based rank in the vector list.
    pub vector_rank: Option<usize>,
    /// 1-based rank in the lexical list.
    pub lexical_rank: Option<usize>,
    /// Distance reported by the vector index.
    pub vector_distance: Option<f32>,
    /// Fused score.
    pub fused_score: f64,
}
