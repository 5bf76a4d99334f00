//! Query entry point: retrieve, pack and optionally generate an answer.

use crate::generation::{GenerationClient, GenerationRequest};
use crate::metrics::IngestMetrics;
use crate::retrieval::{
    Citation, HybridRetriever, RetrievalCandidate, build_prompt, pack_context,
};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;

/// Errors returned for invalid queries.
#[derive(Debug, Error)]
pub enum QueryError {
    /// The question was empty after trimming.
    #[error("question must not be empty")]
    EmptyQuestion,
}

/// Short description of one retrieved context.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContextSummary {
    /// Chunk identifier.
    pub doc_id: String,
    /// Document name.
    pub source: String,
    /// Resolved source path.
    pub path: String,
    /// First page; `None` when unknown.
    pub page_start: Option<u32>,
    /// Last page; `None` when unknown.
    pub page_end: Option<u32>,
    /// Fused score.
    pub score_rrf: f64,
}

impl From<&RetrievalCandidate> for ContextSummary {
    fn from(candidate: &RetrievalCandidate) -> Self {
        let metadata = &candidate.metadata;
        let known = metadata.page_start > 0;
        Self {
            doc_id: candidate.doc_id.clone(),
            source: metadata.source.clone(),
            path: metadata.path.clone(),
            page_start: known.then_some(metadata.page_start),
            page_end: known.then_some(metadata.page_end),
            score_rrf: candidate.fused_score,
        }
    }
}

/// Everything returned for one question.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryOutcome {
    /// Grounded prompt.
    pub prompt: String,
    /// Retrieved contexts in rank order.
    pub contexts: Vec<ContextSummary>,
    /// Citations of the packed blocks.
    pub citations: Vec<Citation>,
    /// Token estimate of the packed context.
    pub token_est: usize,
    /// Generated answer when a provider is configured and succeeded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub answer: Option<String>,
}

/// Answers questions from the indices.
pub struct QueryService {
    retriever: HybridRetriever,
    generator: Option<Arc<dyn GenerationClient>>,
    generation_model: String,
    metrics: Arc<IngestMetrics>,
}

impl QueryService {
    /// Combine a retriever with an optional generation client.
    pub fn new(
        retriever: HybridRetriever,
        generator: Option<Arc<dyn GenerationClient>>,
        generation_model: String,
        metrics: Arc<IngestMetrics>,
    ) -> Self {
        Self {
            retriever,
            generator,
            generation_model,
            metrics,
        }
    }

    /// Retrieve, pack and optionally generate an answer for `question`.
    pub async fn answer(&self, question: &str) -> Result<QueryOutcome, QueryError> {
        let question = question.trim();
        if question.is_empty() {
            return Err(QueryError::EmptyQuestion);
        }

        let settings = self.retriever.settings();
        let candidates = self.retriever.retrieve(question).await;
        let packed = pack_context(&candidates, settings.token_budget, settings.chars_per_token);
        let prompt = build_prompt(question, &packed);
        let token_est = packed.tokens_used;

        let answer = match &self.generator {
            Some(generator) => {
                let request = GenerationRequest {
                    model: self.generation_model.clone(),
                    prompt: prompt.clone(),
                };
                match generator.generate(request).await {
                    Ok(answer) => Some(answer),
                    Err(error) => {
                        tracing::warn!(error = %error, "Answer generation failed; returning prompt only");
                        None
                    }
                }
            }
            None => None,
        };

        self.metrics.record_query();
        tracing::info!(
            candidates = candidates.len(),
            packed = packed.citations.len(),
            token_est,
            generated = answer.is_some(),
            "Query answered"
        );

        Ok(QueryOutcome {
            prompt,
            contexts: candidates.iter().map(ContextSummary::from).collect(),
            citations: packed.citations,
            token_est,
            answer,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunking::estimate_tokens;
    use crate::embedding::HashingEmbeddingClient;
    use crate::generation::GenerationClientError;
    use crate::index::{ChunkMetadata, IndexError, LexicalIndex, StoredDoc};
    use crate::retrieval::RetrievalSettings;
    use async_trait::async_trait;

    struct OneDoc;

    #[async_trait]
    impl LexicalIndex for OneDoc {
        async fn upsert(&self, docs: Vec<StoredDoc>) -> Result<usize, IndexError> {
            Ok(docs.len())
        }

        async fn search(&self, _query: &str, _limit: usize) -> Result<Vec<String>, IndexError> {
            Ok(vec!["doc-1".into()])
        }

        async fn fetch(&self, ids: &[String]) -> Result<Vec<StoredDoc>, IndexError> {
            Ok(ids
                .iter()
                .map(|id| StoredDoc {
                    id: id.clone(),
                    text: "The budget was approved in March.".into(),
                    metadata: ChunkMetadata {
                        doc_id: id.clone(),
                        source: "minutes.txt".into(),
                        path: "/docs/minutes.pdf".into(),
                        page_start: 3,
                        page_end: 4,
                        ..ChunkMetadata::default()
                    },
                })
                .collect())
        }
    }

    struct Echo(Result<&'static str, ()>);

    #[async_trait]
    impl GenerationClient for Echo {
        async fn generate(&self, request: GenerationRequest) -> Result<String, GenerationClientError> {
            assert!(request.prompt.contains("March"));
            self.0
                .map(str::to_string)
                .map_err(|_| GenerationClientError::GenerationFailed("boom".into()))
        }
    }

    fn service(generator: Option<Arc<dyn GenerationClient>>) -> (QueryService, Arc<IngestMetrics>) {
        let metrics = Arc::new(IngestMetrics::new());
        let retriever = HybridRetriever::new(
            Arc::new(HashingEmbeddingClient::new(4)),
            None,
            Some(Arc::new(OneDoc)),
            4,
            RetrievalSettings::default(),
        );
        (
            QueryService::new(retriever, generator, "llama".into(), metrics.clone()),
            metrics,
        )
    }

    #[tokio::test]
    async fn answer_packs_context_and_counts_query() {
        let (service, metrics) = service(None);
        let outcome = service.answer("When was the budget approved?").await.expect("answer");

        assert!(outcome.prompt.contains("[1] The budget was approved in March."));
        assert_eq!(outcome.citations[0].to_string(), "minutes.txt:3");
        assert_eq!(outcome.contexts[0].page_end, Some(4));
        assert_eq!(outcome.token_est, estimate_tokens("[1] The budget was approved in March.", 4.0));
        assert_eq!(outcome.answer, None);
        assert_eq!(metrics.snapshot().queries_served, 1);
    }

    #[tokio::test]
    async fn generation_success_and_failure() {
        let (service_ok, _) = service(Some(Arc::new(Echo(Ok("In March.")))));
        let outcome = service_ok.answer("When?").await.expect("answer");
        assert_eq!(outcome.answer.as_deref(), Some("In March."));

        let (service_err, _) = service(Some(Arc::new(Echo(Err(())))));
        let outcome = service_err.answer("When?").await.expect("answer");
        assert_eq!(outcome.answer, None);
        assert!(!outcome.prompt.is_empty());
    }

    #[tokio::test]
    async fn empty_context_estimates_zero_tokens() {
        let retriever = HybridRetriever::new(
            Arc::new(HashingEmbeddingClient::new(4)),
            None,
            None,
            4,
            RetrievalSettings::default(),
        );
        let service = QueryService::new(retriever, None, "llama".into(), Arc::new(IngestMetrics::new()));
        let outcome = service.answer("Anything indexed?").await.expect("answer");

        assert!(outcome.citations.is_empty());
        assert_eq!(outcome.token_est, 0);
    }

    #[tokio::test]
    async fn empty_question_is_rejected() {
        let (service, _) = service(None);
        assert!(matches!(service.answer("   ").await, Err(QueryError::EmptyQuestion)));
    }
}
