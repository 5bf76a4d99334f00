//! Wire types for the Qdrant collection that holds chunk vectors.

use crate::index::ChunkMetadata;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Failures talking to the vector store.
#[derive(Debug, Error)]
pub enum QdrantError {
    /// The configured endpoint is not a usable URL.
    #[error("Invalid vector store URL: {0}")]
    InvalidUrl(String),
    /// Transport failure or undecodable response body.
    #[error("Vector store request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// Non-success status from the vector store.
    #[error("Vector store returned {status}: {body}")]
    UnexpectedStatus {
        /// Status code of the failing response.
        status: StatusCode,
        /// Raw response body.
        body: String,
    },
}

/// Payload stored with every chunk vector.
///
/// The metadata fields sit flat beside the chunk text so they can carry keyword indexes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChunkPayload {
    /// Chunk text as indexed.
    #[serde(default)]
    pub text: String,
    /// SHA-256 of `text`.
    #[serde(default)]
    pub chunk_hash: String,
    /// Upsert time (RFC 3339).
    #[serde(default)]
    pub indexed_at: String,
    /// Chunk metadata, including `doc_id`.
    #[serde(flatten)]
    pub metadata: ChunkMetadata,
}

/// One chunk matched by a similarity query.
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    /// Point id (UUID form of the chunk identifier).
    pub point_id: String,
    /// Cosine similarity.
    pub score: f32,
    /// Stored payload; empty when the point carried none.
    pub payload: ChunkPayload,
}

#[derive(Deserialize)]
pub(crate) struct QueryResponse {
    pub(crate) result: QueryResult,
}

/// Newer servers wrap matches in `{ "points": [...] }`; older ones return the list directly.
#[derive(Deserialize)]
#[serde(untagged)]
pub(crate) enum QueryResult {
    Bare(Vec<MatchedPoint>),
    Wrapped {
        #[serde(default)]
        points: Vec<MatchedPoint>,
    },
}

impl QueryResult {
    pub(crate) fn into_chunks(self) -> Vec<ScoredChunk> {
        let points = match self {
            Self::Bare(points) | Self::Wrapped { points } => points,
        };
        points.into_iter().map(MatchedPoint::into_chunk).collect()
    }
}

#[derive(Deserialize)]
pub(crate) struct MatchedPoint {
    id: Value,
    score: f32,
    #[serde(default)]
    payload: Option<ChunkPayload>,
}

impl MatchedPoint {
    fn into_chunk(self) -> ScoredChunk {
        let point_id = match self.id {
            Value::String(text) => text,
            Value::Null => String::new(),
            other => other.to_string(),
        };
        ScoredChunk {
            point_id,
            score: self.score,
            payload: self.payload.unwrap_or_default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn wrapped_and_bare_results_decode_alike() {
        let point = json!({
            "id": 7,
            "score": 0.5,
            "payload": { "doc_id": "abc", "text": "สวัสดี", "page_start": 3, "chunk_hash": "h" }
        });
        let wrapped: QueryResponse =
            serde_json::from_value(json!({ "result": { "points": [point.clone()] } })).expect("wrapped");
        let bare: QueryResponse = serde_json::from_value(json!({ "result": [point] })).expect("bare");

        for response in [wrapped, bare] {
            let chunks = response.result.into_chunks();
            assert_eq!(chunks.len(), 1);
            assert_eq!(chunks[0].point_id, "7");
            assert_eq!(chunks[0].payload.text, "สวัสดี");
            assert_eq!(chunks[0].payload.metadata.doc_id, "abc");
            assert_eq!(chunks[0].payload.metadata.page_start, 3);
        }
    }

    #[test]
    fn missing_payload_decodes_empty() {
        let response: QueryResponse = serde_json::from_value(json!({
            "result": { "points": [{ "id": "p", "score": 0.1 }] }
        }))
        .expect("decode");
        let chunks = response.result.into_chunks();
        assert_eq!(chunks[0].payload, ChunkPayload::default());
    }
}
