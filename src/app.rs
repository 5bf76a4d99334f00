//! Service wiring shared by the HTTP server and the CLI.
//!
//! [`build_services`] turns a [`Config`] into long-lived handles. Optional capabilities degrade
//! to absent: no Qdrant URL (or an unreachable one) disables dense search, and OCR engines are
//! only attached when enabled.

use crate::config::Config;
use crate::embedding::{EmbeddingClientError, build_embedding_client};
use crate::extraction::{
    EngineError, FileExtractor, LopdfExtractor, PageExtractor, RemoteOcrEngine, TesseractEngine,
};
use crate::gate::FlaggingGate;
use crate::generation::{GenerationClientError, build_generation_client};
use crate::index::{IndexError, LexicalIndex, VectorIndex};
use crate::ingest::{IngestError, IngestRequest, IngestService, IngestSummary, ProgressSnapshot};
use crate::lexical::TantivyLexicalIndex;
use crate::metrics::{IngestMetrics, MetricsSnapshot};
use crate::qdrant::{QdrantService, QdrantVectorIndex};
use crate::retrieval::{HybridRetriever, QueryError, QueryOutcome, QueryService};
use crate::segment::{PatternError, PatternSet};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Errors raised while constructing services from configuration.
#[derive(Debug, Error)]
pub enum BootstrapError {
    /// Segmentation pattern file could not be loaded.
    #[error("failed to load segmentation patterns: {0}")]
    Patterns(#[from] PatternError),
    /// Lexical index could not be opened.
    #[error("failed to open lexical index: {0}")]
    Lexical(#[from] IndexError),
    /// Embedding client could not be built.
    #[error("failed to build embedding client: {0}")]
    Embedding(#[from] EmbeddingClientError),
    /// Generation client could not be built.
    #[error("failed to build generation client: {0}")]
    Generation(#[from] GenerationClientError),
    /// Remote OCR client could not be built.
    #[error("failed to build remote OCR engine: {0}")]
    Ocr(#[from] EngineError),
}

/// Operations exposed by external surfaces (HTTP).
#[async_trait]
pub trait PipelineApi: Send + Sync {
    /// Start an ingestion run in the background and return its identifier.
    fn start_ingest(&self, request: IngestRequest) -> Result<String, IngestError>;

    /// Run ingestion to completion.
    async fn run_ingest(&self, request: IngestRequest) -> Result<IngestSummary, IngestError>;

    /// Progress of the current or last run.
    fn ingest_status(&self) -> ProgressSnapshot;

    /// Answer a question from the indices.
    async fn query(&self, question: &str) -> Result<QueryOutcome, QueryError>;

    /// Current counters.
    fn metrics_snapshot(&self) -> MetricsSnapshot;
}

/// Ingestion and query services sharing indices and metrics.
pub struct AppServices {
    /// Ingestion pipeline.
    pub ingest: Arc<IngestService>,
    /// Query pipeline.
    pub query: QueryService,
    /// Shared counters.
    pub metrics: Arc<IngestMetrics>,
}

/// Build every service described by `config`.
pub async fn build_services(config: &Config) -> Result<AppServices, BootstrapError> {
    let metrics = Arc::new(IngestMetrics::new());
    let script = config.script_profile();
    let ingest_settings = config.ingest_settings();

    let embedder = build_embedding_client(config)?;
    let generator = build_generation_client(config)?;

    let lexical: Arc<dyn LexicalIndex> = Arc::new(TantivyLexicalIndex::open(
        &ingest_settings.lexical_dir(),
        script.clone(),
    )?);
    let vector = connect_vector_index(config).await;

    let mut ingest = IngestService::new(
        build_extractor(config)?,
        FlaggingGate::new(config.validity_settings(), script),
        config.chunk_settings(),
        ingest_settings,
        Arc::clone(&embedder),
        Arc::clone(&metrics),
    )
    .with_lexical_index(Arc::clone(&lexical));
    if let Some(vector) = &vector {
        ingest = ingest.with_vector_index(Arc::clone(vector));
    }

    let retriever = HybridRetriever::new(
        embedder,
        vector,
        Some(lexical),
        config.embedding_dimension,
        config.retrieval_settings(),
    );
    let query = QueryService::new(
        retriever,
        generator,
        config.generation_model.clone(),
        Arc::clone(&metrics),
    );

    Ok(AppServices {
        ingest: Arc::new(ingest),
        query,
        metrics,
    })
}

/// File extractor with the OCR engines and segmentation patterns enabled in `config`.
pub fn build_extractor(config: &Config) -> Result<FileExtractor, BootstrapError> {
    let mut pages = PageExtractor::new(Arc::new(LopdfExtractor::new()), config.extraction_settings());
    if let Some(settings) = config.remote_ocr_settings() {
        tracing::info!(base_url = %settings.base_url, model = %settings.model, "Remote OCR enabled");
        pages = pages.with_remote(Arc::new(RemoteOcrEngine::new(settings, config.rasterizer())?));
    }
    if config.local_ocr_enable {
        tracing::info!(program = %config.tesseract_path, "Local OCR enabled");
        pages = pages.with_local(Arc::new(TesseractEngine::new(
            &config.tesseract_path,
            config.rasterizer(),
        )));
    }

    let patterns = match &config.segment_patterns_file {
        Some(path) => {
            tracing::info!(path = %path.display(), "Loading segmentation patterns");
            PatternSet::load(path)?
        }
        None => PatternSet::default(),
    };
    Ok(FileExtractor::new(pages, patterns))
}

async fn connect_vector_index(config: &Config) -> Option<Arc<dyn VectorIndex>> {
    let Some(url) = config.qdrant_url.as_deref() else {
        tracing::info!("QDRANT_URL not set; dense retrieval disabled");
        return None;
    };
    let service = match QdrantService::new(url, config.qdrant_api_key.clone()) {
        Ok(service) => service,
        Err(error) => {
            tracing::warn!(error = %error, "Invalid Qdrant configuration; dense retrieval disabled");
            return None;
        }
    };
    tracing::debug!(
        collection = %config.qdrant_collection_name,
        vector_size = config.embedding_dimension,
        "Ensuring vector collection"
    );
    match QdrantVectorIndex::connect(
        service,
        &config.qdrant_collection_name,
        config.embedding_dimension as u64,
    )
    .await
    {
        Ok(index) => Some(Arc::new(index) as Arc<dyn VectorIndex>),
        Err(error) => {
            tracing::warn!(error = %error, "Qdrant unavailable; dense retrieval disabled");
            None
        }
    }
}

#[async_trait]
impl PipelineApi for AppServices {
    fn start_ingest(&self, request: IngestRequest) -> Result<String, IngestError> {
        if !request.input_dir.is_dir() {
            return Err(IngestError::InputMissing(request.input_dir));
        }
        self.ingest.start(request)
    }

    async fn run_ingest(&self, request: IngestRequest) -> Result<IngestSummary, IngestError> {
        self.ingest.run(request).await
    }

    fn ingest_status(&self) -> ProgressSnapshot {
        self.ingest.progress()
    }

    async fn query(&self, question: &str) -> Result<QueryOutcome, QueryError> {
        self.query.answer(question).await
    }

    fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }
}
