//! Qdrant REST calls behind the [`VectorIndex`] seam.

use crate::gate::current_timestamp_rfc3339;
use crate::index::{IndexError, VectorHit, VectorIndex, VectorPoint};
use crate::qdrant::{
    payload::{build_payload, point_id, stored_doc},
    types::{QdrantError, QueryResponse, ScoredChunk},
};
use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode};
use serde_json::json;

/// Chunk metadata fields indexed as keywords.
const KEYWORD_FIELDS: [&str; 3] = ["doc_id", "source", "status"];

/// REST client for the collection holding chunk vectors.
pub struct QdrantService {
    pub(crate) client: Client,
    pub(crate) base_url: String,
    pub(crate) api_key: Option<String>,
}

impl QdrantService {
    /// Construct a client for the Qdrant instance at `url`.
    pub fn new(url: &str, api_key: Option<String>) -> Result<Self, QdrantError> {
        let client = Client::builder().user_agent("hybrid-rag/0.1").build()?;

        let base_url = normalize_base_url(url).map_err(QdrantError::InvalidUrl)?;
        tracing::debug!(
            url = %base_url,
            has_api_key = %api_key
                .as_deref()
                .map(|value| !value.is_empty())
                .unwrap_or(false),
            "Initialized Qdrant HTTP client"
        );

        Ok(Self {
            client,
            base_url,
            api_key,
        })
    }

    /// Create a collection only when it is missing from Qdrant.
    pub async fn create_collection_if_not_exists(
        &self,
        collection_name: &str,
        vector_size: u64,
    ) -> Result<(), QdrantError> {
        if self.collection_exists(collection_name).await? {
            return Ok(());
        }

        tracing::debug!(
            collection = collection_name,
            vector_size,
            "Creating collection"
        );
        self.create_collection(collection_name, vector_size).await
    }

    /// Create or update a collection with the specified vector size.
    pub async fn create_collection(
        &self,
        collection_name: &str,
        vector_size: u64,
    ) -> Result<(), QdrantError> {
        let body = json!({
            "vectors": {
                "size": vector_size,
                "distance": "Cosine"
            }
        });

        let response = self
            .request(Method::PUT, &format!("collections/{collection_name}"))
            .json(&body)
            .send()
            .await?;

        checked(response, "create collection").await?;
        tracing::info!(collection = collection_name, vector_size, "Created chunk collection");
        Ok(())
    }

    /// Insert or replace points; ids come from the chunk identifiers.
    pub async fn upsert_points(
        &self,
        collection_name: &str,
        points: &[VectorPoint],
    ) -> Result<usize, QdrantError> {
        if points.is_empty() {
            return Ok(0);
        }

        let now = current_timestamp_rfc3339();
        let serialized: Vec<_> = points
            .iter()
            .map(|point| {
                json!({
                    "id": point_id(&point.doc.id),
                    "vector": point.vector,
                    "payload": build_payload(&point.doc, &now),
                })
            })
            .collect();

        let point_count = serialized.len();
        let response = self
            .request(Method::PUT, &format!("collections/{collection_name}/points"))
            .query(&[("wait", true)])
            .json(&json!({ "points": serialized }))
            .send()
            .await?;

        checked(response, "upsert points").await?;
        tracing::debug!(collection = collection_name, points = point_count, "Chunks upserted");

        Ok(point_count)
    }

    /// Perform a similarity search against a collection, returning scored payloads.
    pub async fn search_points(
        &self,
        collection_name: &str,
        vector: Vec<f32>,
        limit: usize,
    ) -> Result<Vec<ScoredChunk>, QdrantError> {
        let body = json!({
            "query": vector,
            "limit": limit,
            "with_payload": true,
        });

        let response = self
            .request(
                Method::POST,
                &format!("collections/{collection_name}/points/query"),
            )
            .json(&body)
            .send()
            .await?;

        let decoded: QueryResponse = checked(response, "query points").await?.json().await?;
        Ok(decoded.result.into_chunks())
    }

    /// Create keyword indexes on the metadata fields used for filtering.
    ///
    /// Failures are logged and skipped; an existing index answers `409`.
    pub async fn ensure_payload_indexes(&self, collection_name: &str) -> Result<(), QdrantError> {
        for field in KEYWORD_FIELDS {
            let response = self
                .request(Method::PUT, &format!("collections/{collection_name}/index"))
                .json(&json!({ "field_name": field, "field_schema": "keyword" }))
                .send()
                .await?;

            let status = response.status();
            if status == StatusCode::CONFLICT {
                continue;
            }
            if let Err(error) = checked(response, "create payload index").await {
                tracing::warn!(collection = collection_name, field, error = %error, "Payload index skipped");
            }
        }
        Ok(())
    }

    async fn collection_exists(&self, collection_name: &str) -> Result<bool, QdrantError> {
        let response = self
            .request(Method::GET, &format!("collections/{collection_name}"))
            .send()
            .await?;

        match response.status() {
            StatusCode::OK => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            _ => checked(response, "inspect collection").await.map(|_| true),
        }
    }

    fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        let url = format_endpoint(&self.base_url, path);
        let mut req = self.client.request(method, url);
        if let Some(api_key) = &self.api_key
            && !api_key.is_empty()
        {
            req = req.header("api-key", api_key);
        }
        req
    }
}

/// Pass through successful responses; anything else becomes [`QdrantError::UnexpectedStatus`].
async fn checked(
    response: reqwest::Response,
    action: &'static str,
) -> Result<reqwest::Response, QdrantError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let error = QdrantError::UnexpectedStatus { status, body };
    tracing::error!(action, error = %error, "Vector store request failed");
    Err(error)
}

/// [`VectorIndex`] backed by one Qdrant collection.
pub struct QdrantVectorIndex {
    service: QdrantService,
    collection: String,
}

impl QdrantVectorIndex {
    /// Connect to `collection`, creating it with cosine distance when missing.
    pub async fn connect(
        service: QdrantService,
        collection: &str,
        vector_size: u64,
    ) -> Result<Self, QdrantError> {
        service
            .create_collection_if_not_exists(collection, vector_size)
            .await?;
        service.ensure_payload_indexes(collection).await?;
        Ok(Self {
            service,
            collection: collection.to_string(),
        })
    }
}

#[async_trait]
impl VectorIndex for QdrantVectorIndex {
    async fn upsert(&self, points: Vec<VectorPoint>) -> Result<usize, IndexError> {
        self.service
            .upsert_points(&self.collection, &points)
            .await
            .map_err(|error| IndexError::Vector(error.to_string()))
    }

    async fn query(&self, vector: Vec<f32>, top_k: usize) -> Result<Vec<VectorHit>, IndexError> {
        let points = self
            .service
            .search_points(&self.collection, vector, top_k)
            .await
            .map_err(|error| IndexError::Vector(error.to_string()))?;
        Ok(points
            .iter()
            .map(|point| VectorHit {
                doc: stored_doc(point),
                distance: 1.0 - point.score,
            })
            .collect())
    }
}

fn normalize_base_url(url: &str) -> Result<String, String> {
    let mut parsed = reqwest::Url::parse(url).map_err(|err| err.to_string())?;
    let path = parsed.path().trim_end_matches('/').to_string();
    parsed.set_path(&path);
    Ok(parsed.to_string())
}

fn format_endpoint(base: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    format!("{base}/{path}")
}
