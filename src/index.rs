//! Storage seams for the dense and lexical indices.

use crate::gate::EnrichedChunk;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors surfaced by index backends.
#[derive(Debug, Error)]
pub enum IndexError {
    /// The vector store rejected a request or was unreachable.
    #[error("Vector store error: {0}")]
    Vector(String),
    /// The lexical index failed.
    #[error("Lexical index error: {0}")]
    Lexical(String),
    /// A blocking index task failed to complete.
    #[error("Index task failed: {0}")]
    Task(String),
}

/// Metadata stored next to every indexed chunk.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkMetadata {
    /// Chunk identifier.
    pub doc_id: String,
    /// Normalised document name.
    pub source: String,
    /// Resolved source path.
    pub path: String,
    /// First page; `0` when unknown.
    pub page_start: u32,
    /// Last page; `0` when unknown.
    pub page_end: u32,
    /// Ordinal within the file.
    pub chunk_id: usize,
    /// Source format label.
    pub file_type: String,
    /// Owner label.
    pub owner: String,
    /// Sensitivity label.
    pub sensitivity: String,
    /// Estimated tokens.
    pub tokens_est: usize,
    /// Gate outcome (`ok` or `flagged`).
    pub status: String,
    /// Creation time as unix seconds.
    pub updated_at: i64,
}

impl From<&EnrichedChunk> for ChunkMetadata {
    fn from(chunk: &EnrichedChunk) -> Self {
        Self {
            doc_id: chunk.doc_id.clone(),
            source: chunk.chunk.source.clone(),
            path: chunk.chunk.path.clone(),
            page_start: chunk.chunk.page_start,
            page_end: chunk.chunk.page_end,
            chunk_id: chunk.chunk_id,
            file_type: chunk.file_type.clone(),
            owner: chunk.chunk.owner.clone(),
            sensitivity: chunk.chunk.sensitivity.clone(),
            tokens_est: chunk.chunk.tokens_est,
            status: chunk.status.to_string(),
            updated_at: chunk.chunk.updated_at,
        }
    }
}

/// Document stored in either index.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredDoc {
    /// Chunk identifier.
    pub id: String,
    /// Chunk text.
    pub text: String,
    /// Chunk metadata.
    pub metadata: ChunkMetadata,
}

impl From<&EnrichedChunk> for StoredDoc {
    fn from(chunk: &EnrichedChunk) -> Self {
        Self {
            id: chunk.doc_id.clone(),
            text: chunk.chunk.text.clone(),
            metadata: ChunkMetadata::from(chunk),
        }
    }
}

/// Dense point ready for upsert.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorPoint {
    /// Stored document.
    pub doc: StoredDoc,
    /// Embedding of `doc.text`.
    pub vector: Vec<f32>,
}

/// Dense search hit.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorHit {
    /// Stored document.
    pub doc: StoredDoc,
    /// Distance to the query; lower is closer.
    pub distance: f32,
}

/// Dense vector index keyed by chunk identifier.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Insert or replace points by identifier.
    async fn upsert(&self, points: Vec<VectorPoint>) -> Result<usize, IndexError>;

    /// Nearest neighbours of `vector`, closest first.
    async fn query(&self, vector: Vec<f32>, top_k: usize) -> Result<Vec<VectorHit>, IndexError>;
}

/// Keyword index keyed by chunk identifier.
#[async_trait]
pub trait LexicalIndex: Send + Sync {
    /// Insert or replace documents by identifier.
    async fn upsert(&self, docs: Vec<StoredDoc>) -> Result<usize, IndexError>;

    /// Identifiers of the best matches for `query`, best first.
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<String>, IndexError>;

    /// Stored documents for `ids`; unknown identifiers are skipped.
    async fn fetch(&self, ids: &[String]) -> Result<Vec<StoredDoc>, IndexError>;
}
