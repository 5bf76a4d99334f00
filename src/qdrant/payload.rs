//! Helpers for constructing and reading Qdrant payloads.

use crate::index::StoredDoc;
use crate::qdrant::types::{ChunkPayload, ScoredChunk};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Build the payload stored alongside each indexed chunk.
pub(crate) fn build_payload(doc: &StoredDoc, timestamp_rfc3339: &str) -> ChunkPayload {
    let mut metadata = doc.metadata.clone();
    metadata.doc_id = doc.id.clone();
    ChunkPayload {
        text: doc.text.clone(),
        chunk_hash: compute_chunk_hash(&doc.text),
        indexed_at: timestamp_rfc3339.to_string(),
        metadata,
    }
}

/// Rebuild the stored document carried by a matched chunk.
///
/// Points written without a `doc_id` fall back to their point id.
pub(crate) fn stored_doc(chunk: &ScoredChunk) -> StoredDoc {
    let mut metadata = chunk.payload.metadata.clone();
    if metadata.doc_id.is_empty() {
        metadata.doc_id = chunk.point_id.clone();
    }
    StoredDoc {
        id: metadata.doc_id.clone(),
        text: chunk.payload.text.clone(),
        metadata,
    }
}

/// Compute a deterministic SHA-256 hash for the chunk text.
pub fn compute_chunk_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hex::encode(hasher.finalize())
}

/// Qdrant point id for a chunk identifier.
///
/// 32-character hex identifiers are read directly as UUIDs; anything else is hashed first.
pub fn point_id(doc_id: &str) -> String {
    if let Ok(uuid) = Uuid::try_parse(doc_id) {
        return uuid.to_string();
    }
    let digest = Sha256::digest(doc_id.as_bytes());
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&digest[..16]);
    Uuid::from_bytes(bytes).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::ChunkMetadata;

    fn doc() -> StoredDoc {
        StoredDoc {
            id: "0123456789abcdef0123456789abcdef".into(),
            text: "sample".into(),
            metadata: ChunkMetadata {
                doc_id: "0123456789abcdef0123456789abcdef".into(),
                source: "report.txt".into(),
                page_start: 2,
                page_end: 3,
                status: "ok".into(),
                ..ChunkMetadata::default()
            },
        }
    }

    #[test]
    fn chunk_hash_is_stable() {
        let h1 = compute_chunk_hash("Hello world");
        let h2 = compute_chunk_hash("Hello world");
        assert_eq!(h1, h2);
        assert_eq!(h1.len(), 64);
    }

    #[test]
    fn point_ids_are_uuids() {
        assert_eq!(
            point_id("0123456789abcdef0123456789abcdef"),
            "01234567-89ab-cdef-0123-456789abcdef"
        );
        let hashed = point_id("not-a-uuid");
        assert_eq!(hashed, point_id("not-a-uuid"));
        assert!(Uuid::try_parse(&hashed).is_ok());
    }

    #[test]
    fn payload_round_trips_metadata_and_text() {
        let now = "2025-01-01T00:00:00Z";
        let payload = build_payload(&doc(), now);
        let json = serde_json::to_value(&payload).expect("serialize");
        assert_eq!(json["doc_id"], "0123456789abcdef0123456789abcdef");
        assert_eq!(json["text"], "sample");
        assert_eq!(json["page_start"], 2);
        assert_eq!(json["indexed_at"], now);

        let chunk = ScoredChunk {
            point_id: point_id(&doc().id),
            score: 0.9,
            payload: serde_json::from_value(json).expect("deserialize"),
        };
        assert_eq!(stored_doc(&chunk), doc());
    }

    #[test]
    fn missing_doc_id_falls_back_to_point_id() {
        let chunk = ScoredChunk {
            point_id: "01234567-89ab-cdef-0123-456789abcdef".into(),
            score: 0.2,
            payload: ChunkPayload {
                text: "orphan".into(),
                ..ChunkPayload::default()
            },
        };
        let doc = stored_doc(&chunk);
        assert_eq!(doc.id, chunk.point_id);
        assert_eq!(doc.metadata.doc_id, chunk.point_id);
        assert_eq!(doc.text, "orphan");
    }
}
