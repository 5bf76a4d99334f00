//! Embedding providers and the batching wrapper used during ingestion and queries.
//!
//! The deterministic hashing client needs no external service and doubles as the placeholder
//! for any text a remote provider fails to embed, so every input always gets a vector of the
//! configured dimension.

use crate::config::{Config, EmbeddingProvider};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;

const DEFAULT_OLLAMA_URL: &str = "http://127.0.0.1:11434";
const DEFAULT_OPENAI_BASE: &str = "https://api.openai.com/v1";

/// Errors raised by embedding providers.
#[derive(Debug, Error)]
pub enum EmbeddingClientError {
    /// Provider was unable to produce embeddings for the supplied input.
    #[error("Failed to generate embeddings: {0}")]
    GenerationFailed(String),
    /// Provider could not be reached.
    #[error("Embedding provider unavailable: {0}")]
    ProviderUnavailable(String),
    /// Provider response could not be parsed.
    #[error("Malformed embedding response: {0}")]
    InvalidResponse(String),
}

/// Interface implemented by embedding backends.
#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    /// Produce an embedding vector for each supplied chunk of text.
    async fn generate_embeddings(
        &self,
        texts: Vec<String>,
    ) -> Result<Vec<Vec<f32>>, EmbeddingClientError>;
}

/// Deterministic embedding client hashing character bigrams into a fixed number of slots.
///
/// Bigrams need no word segmentation, so unsegmented Thai text still shares features with
/// overlapping phrasings. Used offline and as the placeholder for failed provider batches.
pub struct HashingEmbeddingClient {
    dimension: usize,
}

impl HashingEmbeddingClient {
    /// Construct a client producing vectors of `dimension` components.
    pub const fn new(dimension: usize) -> Self {
        Self { dimension }
    }

    /// Unit-normalised bigram embedding of `text`; all zeros when `text` has no visible characters.
    pub fn encode(text: &str, dimension: usize) -> Vec<f32> {
        let mut embedding = vec![0.0_f32; dimension];
        let chars: Vec<char> = text
            .chars()
            .filter(|ch| !ch.is_whitespace())
            .flat_map(char::to_lowercase)
            .collect();
        if chars.is_empty() || dimension == 0 {
            return embedding;
        }

        let slot = |gram: &[char]| {
            let hash = gram.iter().fold(FNV_OFFSET, |hash, ch| {
                let mut buf = [0u8; 4];
                ch.encode_utf8(&mut buf).bytes().fold(hash, |hash, byte| {
                    (hash ^ u64::from(byte)).wrapping_mul(FNV_PRIME)
                })
            });
            (hash % dimension as u64) as usize
        };
        if chars.len() == 1 {
            embedding[slot(&chars)] += 1.0;
        } else {
            for gram in chars.windows(2) {
                embedding[slot(gram)] += 1.0;
            }
        }

        let norm = embedding.iter().map(|value| value * value).sum::<f32>().sqrt();
        for value in &mut embedding {
            *value /= norm;
        }
        embedding
    }
}

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0100_0000_01b3;

#[async_trait]
impl EmbeddingClient for HashingEmbeddingClient {
    async fn generate_embeddings(
        &self,
        texts: Vec<String>,
    ) -> Result<Vec<Vec<f32>>, EmbeddingClientError> {
        if self.dimension == 0 {
            return Err(EmbeddingClientError::GenerationFailed(
                "embedding dimension must be greater than zero".to_string(),
            ));
        }

        Ok(texts
            .iter()
            .map(|text| Self::encode(text, self.dimension))
            .collect())
    }
}

/// Ollama `/api/embed` client.
pub struct OllamaEmbeddingClient {
    http: Client,
    base_url: String,
    model: String,
}

impl OllamaEmbeddingClient {
    /// Construct a client for `model` served at `base_url`.
    pub fn new(base_url: String, model: String) -> Result<Self, EmbeddingClientError> {
        let http = Client::builder()
            .user_agent("hybrid-rag/embed")
            .build()
            .map_err(|error| EmbeddingClientError::ProviderUnavailable(error.to_string()))?;
        Ok(Self {
            http,
            base_url,
            model,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/api/embed", self.base_url.trim_end_matches('/'))
    }
}

#[derive(Debug, Deserialize)]
struct OllamaEmbedResponse {
    #[serde(default)]
    embeddings: Vec<Vec<f32>>,
}

#[async_trait]
impl EmbeddingClient for OllamaEmbeddingClient {
    async fn generate_embeddings(
        &self,
        texts: Vec<String>,
    ) -> Result<Vec<Vec<f32>>, EmbeddingClientError> {
        let payload = json!({
            "model": self.model,
            "input": texts,
        });

        let response = self
            .http
            .post(self.endpoint())
            .json(&payload)
            .send()
            .await
            .map_err(|error| {
                EmbeddingClientError::ProviderUnavailable(format!(
                    "failed to reach Ollama at {}: {error}",
                    self.base_url
                ))
            })?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(EmbeddingClientError::ProviderUnavailable(format!(
                "Ollama endpoint {} returned 404",
                self.endpoint()
            )));
        }
        let response = ensure_success(response).await?;

        let body: OllamaEmbedResponse = response.json().await.map_err(|error| {
            EmbeddingClientError::InvalidResponse(format!("failed to decode Ollama response: {error}"))
        })?;
        Ok(body.embeddings)
    }
}

/// OpenAI-compatible `/embeddings` client.
pub struct OpenAiEmbeddingClient {
    http: Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
}

impl OpenAiEmbeddingClient {
    /// Construct a client for `model` at `base_url`.
    pub fn new(
        base_url: String,
        api_key: Option<String>,
        model: String,
    ) -> Result<Self, EmbeddingClientError> {
        let http = Client::builder()
            .user_agent("hybrid-rag/embed")
            .build()
            .map_err(|error| EmbeddingClientError::ProviderUnavailable(error.to_string()))?;
        Ok(Self {
            http,
            base_url,
            api_key,
            model,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/embeddings", self.base_url.trim_end_matches('/'))
    }
}

#[derive(Debug, Deserialize)]
struct OpenAiEmbedResponse {
    data: Vec<OpenAiEmbedding>,
}

#[derive(Debug, Deserialize)]
struct OpenAiEmbedding {
    embedding: Vec<f32>,
    #[serde(default)]
    index: usize,
}

#[async_trait]
impl EmbeddingClient for OpenAiEmbeddingClient {
    async fn generate_embeddings(
        &self,
        texts: Vec<String>,
    ) -> Result<Vec<Vec<f32>>, EmbeddingClientError> {
        let mut request = self.http.post(self.endpoint()).json(&json!({
            "model": self.model,
            "input": texts,
        }));
        if let Some(key) = &self.api_key
            && !key.is_empty()
        {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|error| {
            EmbeddingClientError::ProviderUnavailable(format!(
                "failed to reach {}: {error}",
                self.base_url
            ))
        })?;
        let response = ensure_success(response).await?;

        let mut body: OpenAiEmbedResponse = response.json().await.map_err(|error| {
            EmbeddingClientError::InvalidResponse(format!("failed to decode embeddings: {error}"))
        })?;
        body.data.sort_by_key(|item| item.index);
        Ok(body.data.into_iter().map(|item| item.embedding).collect())
    }
}

async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, EmbeddingClientError> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    Err(EmbeddingClientError::GenerationFailed(format!(
        "provider returned {status}: {body}"
    )))
}

/// Pad with zeros or truncate `vector` to `dimension` components.
pub fn fit_dimension(mut vector: Vec<f32>, dimension: usize) -> Vec<f32> {
    vector.resize(dimension, 0.0);
    vector
}

/// Embed `texts` in batches, substituting the hashing placeholder for anything the provider
/// fails to return.
///
/// Always yields exactly one vector of `dimension` components per input, in input order.
pub async fn embed_with_fallback(
    client: &dyn EmbeddingClient,
    texts: &[String],
    dimension: usize,
    batch_size: usize,
) -> Vec<Vec<f32>> {
    let mut vectors = Vec::with_capacity(texts.len());
    for batch in texts.chunks(batch_size.max(1)) {
        let mut produced = match client.generate_embeddings(batch.to_vec()).await {
            Ok(produced) => produced,
            Err(error) => {
                tracing::warn!(error = %error, batch = batch.len(), "Embedding batch failed; using placeholders");
                Vec::new()
            }
        };
        if !produced.is_empty() && produced.len() != batch.len() {
            tracing::warn!(
                expected = batch.len(),
                received = produced.len(),
                "Embedding provider returned a mismatched batch"
            );
        }
        produced.resize(batch.len(), Vec::new());

        for (text, vector) in batch.iter().zip(produced) {
            let vector = if vector.is_empty() {
                HashingEmbeddingClient::encode(text, dimension)
            } else {
                vector
            };
            vectors.push(fit_dimension(vector, dimension));
        }
    }
    vectors
}

/// Build an embedding client suitable for the configuration.
pub fn build_embedding_client(
    config: &Config,
) -> Result<Arc<dyn EmbeddingClient>, EmbeddingClientError> {
    tracing::debug!(
        provider = ?config.embedding_provider,
        model = %config.embedding_model,
        dimension = config.embedding_dimension,
        "Building embedding client"
    );
    Ok(match config.embedding_provider {
        EmbeddingProvider::Hashing => Arc::new(HashingEmbeddingClient::new(config.embedding_dimension)),
        EmbeddingProvider::Ollama => Arc::new(OllamaEmbeddingClient::new(
            config
                .ollama_url
                .clone()
                .unwrap_or_else(|| DEFAULT_OLLAMA_URL.to_string()),
            config.embedding_model.clone(),
        )?),
        EmbeddingProvider::OpenAI => Arc::new(OpenAiEmbeddingClient::new(
            config
                .embedding_api_base
                .clone()
                .unwrap_or_else(|| DEFAULT_OPENAI_BASE.to_string()),
            config.embedding_api_key.clone(),
            config.embedding_model.clone(),
        )?),
    })
}
