//! Qdrant vector store integration.

pub mod client;
pub mod payload;
pub mod types;

pub use client::{QdrantService, QdrantVectorIndex};
pub use payload::{compute_chunk_hash, point_id};
pub use types::{ChunkPayload, QdrantError, ScoredChunk};
