//! Parallel dense and lexical retrieval fused into one ranked candidate list.

use crate::embedding::{EmbeddingClient, embed_with_fallback};
use crate::index::{LexicalIndex, StoredDoc, VectorHit, VectorIndex};
use crate::retrieval::fusion::fuse_rankings;
use crate::retrieval::{RetrievalCandidate, RetrievalSettings};
use std::collections::HashMap;
use std::sync::Arc;

/// Runs dense and lexical search side by side and fuses the rankings.
///
/// Either index may be absent; a missing or failing side contributes an empty list.
pub struct HybridRetriever {
    embedder: Arc<dyn EmbeddingClient>,
    vector: Option<Arc<dyn VectorIndex>>,
    lexical: Option<Arc<dyn LexicalIndex>>,
    embedding_dimension: usize,
    settings: RetrievalSettings,
}

impl HybridRetriever {
    /// Create a retriever over the available indices.
    pub fn new(
        embedder: Arc<dyn EmbeddingClient>,
        vector: Option<Arc<dyn VectorIndex>>,
        lexical: Option<Arc<dyn LexicalIndex>>,
        embedding_dimension: usize,
        settings: RetrievalSettings,
    ) -> Self {
        Self {
            embedder,
            vector,
            lexical,
            embedding_dimension,
            settings,
        }
    }

    /// Active retrieval settings.
    pub fn settings(&self) -> &RetrievalSettings {
        &self.settings
    }

    /// Fused candidates for `query`, best first, at most `max_contexts` of them.
    pub async fn retrieve(&self, query: &str) -> Vec<RetrievalCandidate> {
        let (dense, lexical) = tokio::join!(self.dense_search(query), self.lexical_search(query));
        tracing::debug!(dense = dense.len(), lexical = lexical.len(), "Hybrid search lists");

        let dense_ids: Vec<String> = dense.iter().map(|hit| hit.doc.id.clone()).collect();
        let lexical_ids: Vec<String> = lexical.iter().map(|doc| doc.id.clone()).collect();
        let fused = fuse_rankings(&[dense_ids.clone(), lexical_ids.clone()], self.settings.rrf_k);

        let mut bank: HashMap<String, StoredDoc> = HashMap::new();
        let mut distances: HashMap<String, f32> = HashMap::new();
        for hit in dense {
            distances.entry(hit.doc.id.clone()).or_insert(hit.distance);
            bank.entry(hit.doc.id.clone()).or_insert(hit.doc);
        }
        for doc in lexical {
            bank.entry(doc.id.clone()).or_insert(doc);
        }

        fused
            .into_iter()
            .take(self.settings.max_contexts)
            .filter_map(|rank| {
                let doc = bank.remove(&rank.doc_id)?;
                Some(RetrievalCandidate {
                    vector_rank: first_rank(&dense_ids, &rank.doc_id),
                    lexical_rank: first_rank(&lexical_ids, &rank.doc_id),
                    vector_distance: distances.get(&rank.doc_id).copied(),
                    doc_id: rank.doc_id,
                    text: doc.text,
                    metadata: doc.metadata,
                    fused_score: rank.score,
                })
            })
            .collect()
    }

    async fn dense_search(&self, query: &str) -> Vec<VectorHit> {
        let Some(index) = &self.vector else {
            return Vec::new();
        };
        let vector = embed_with_fallback(
            self.embedder.as_ref(),
            &[query.to_string()],
            self.embedding_dimension,
            1,
        )
        .await
        .pop()
        .unwrap_or_default();
        match index.query(vector, self.settings.k_vector).await {
            Ok(hits) => hits,
            Err(error) => {
                tracing::warn!(error = %error, "Vector search failed; continuing with lexical results");
                Vec::new()
            }
        }
    }

    async fn lexical_search(&self, query: &str) -> Vec<StoredDoc> {
        let Some(index) = &self.lexical else {
            return Vec::new();
        };
        let result = async {
            let ids = index.search(query, self.settings.k_lexical).await?;
            let docs = index.fetch(&ids).await?;
            let mut by_id: HashMap<String, StoredDoc> =
                docs.into_iter().map(|doc| (doc.id.clone(), doc)).collect();
            Ok::<_, crate::index::IndexError>(
                ids.iter().filter_map(|id| by_id.remove(id)).collect::<Vec<_>>(),
            )
        }
        .await;
        match result {
            Ok(docs) => docs,
            Err(error) => {
                tracing::warn!(error = %error, "Lexical search failed; continuing with vector results");
                Vec::new()
            }
        }
    }
}

fn first_rank(ids: &[String], doc_id: &str) -> Option<usize> {
    ids.iter().position(|id| id == doc_id).map(|idx| idx + 1)
}
