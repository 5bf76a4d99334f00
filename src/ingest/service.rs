//! Ingestion runs over an input directory and the per-file pipeline.

use crate::chunking::{ChunkSettings, assemble_chunks};
use crate::embedding::{EmbeddingClient, embed_with_fallback};
use crate::extraction::{ExtractionError, ExtractionMethod, FileExtractor, FileKind, PageRecord, resolve_source};
use crate::gate::{EnrichedChunk, FlaggingGate, GatedChunk, QualityEntry, ReviewRecord};
use crate::index::{LexicalIndex, StoredDoc, VectorIndex, VectorPoint};
use crate::ingest::progress::{ProgressSnapshot, ProgressTracker};
use crate::metrics::IngestMetrics;
use crate::records::{RecordError, append_jsonl, run_stamp, write_jsonl};
use crate::segment::segment_document;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use walkdir::WalkDir;

/// Artifact locations and indexing switches.
#[derive(Debug, Clone, PartialEq)]
pub struct IngestSettings {
    /// Root of every artifact.
    pub data_dir: PathBuf,
    /// Index flagged chunks alongside accepted ones.
    pub index_flagged: bool,
    /// Dimension of stored vectors.
    pub embedding_dimension: usize,
    /// Texts per embedding request.
    pub embed_batch: usize,
    /// Page quality required to keep a reprocessed page.
    pub reprocess_min_quality: f32,
}

impl Default for IngestSettings {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            index_flagged: false,
            embedding_dimension: 1024,
            embed_batch: 32,
            reprocess_min_quality: 0.3,
        }
    }
}

impl IngestSettings {
    /// Default page records artifact.
    pub fn records_path(&self) -> PathBuf {
        self.data_dir.join("db").join("records.jsonl")
    }

    /// Default chunks artifact.
    pub fn chunks_path(&self) -> PathBuf {
        self.data_dir.join("db").join("chunks.jsonl")
    }

    /// Directory holding review and reprocessing artifacts.
    pub fn review_dir(&self) -> PathBuf {
        self.data_dir.join("review")
    }

    /// Append-only quality log.
    pub fn quality_log_path(&self) -> PathBuf {
        self.data_dir.join("quality").join("quality_log.jsonl")
    }

    /// Directory of the lexical index.
    pub fn lexical_dir(&self) -> PathBuf {
        self.data_dir.join("lexical")
    }
}

fn default_true() -> bool {
    true
}

/// Parameters of one ingestion run.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct IngestRequest {
    /// Directory scanned recursively for supported files.
    pub input_dir: PathBuf,
    /// Override for the page records artifact.
    #[serde(default)]
    pub records_jsonl: Option<PathBuf>,
    /// Override for the chunks artifact.
    #[serde(default)]
    pub chunks_jsonl: Option<PathBuf>,
    /// Write chunks to the lexical index.
    #[serde(default = "default_true")]
    pub store: bool,
    /// Embed chunks and write them to the vector index.
    #[serde(default = "default_true")]
    pub embed: bool,
}

impl IngestRequest {
    /// Request with default outputs and indexing enabled.
    pub fn new(input_dir: impl Into<PathBuf>) -> Self {
        Self {
            input_dir: input_dir.into(),
            records_jsonl: None,
            chunks_jsonl: None,
            store: true,
            embed: true,
        }
    }
}

/// A file skipped because of a file-level failure.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileFailure {
    /// Skipped file.
    pub path: PathBuf,
    /// Failure description.
    pub error: String,
}

/// Outcome of an ingestion run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IngestSummary {
    /// Run identifier.
    pub run_id: String,
    /// Files extracted successfully.
    pub files_processed: usize,
    /// Page and sheet records written.
    pub pages: usize,
    /// Chunks produced.
    pub chunks: usize,
    /// Chunks flagged for review.
    pub flagged: usize,
    /// Chunks written to at least one index.
    pub indexed: usize,
    /// Records artifact.
    pub records_file: PathBuf,
    /// Chunks artifact.
    pub chunks_file: PathBuf,
    /// Review artifact, when any chunk was flagged.
    pub review_file: Option<PathBuf>,
    /// Files skipped.
    pub failures: Vec<FileFailure>,
}

/// Run-level ingestion failures.
#[derive(Debug, Error)]
pub enum IngestError {
    /// Another run is active.
    #[error("an ingestion run is already in progress")]
    AlreadyRunning,
    /// The input directory does not exist.
    #[error("input directory not found: {0}")]
    InputMissing(PathBuf),
    /// An artifact could not be read or written.
    #[error(transparent)]
    Records(#[from] RecordError),
    /// A file could not be extracted.
    #[error(transparent)]
    Extraction(#[from] ExtractionError),
}

/// Extraction, segmentation, chunking and gating output for one file.
pub struct FileOutcome {
    /// Page or sheet records.
    pub records: Vec<PageRecord>,
    /// Gated chunks in source order.
    pub chunks: Vec<GatedChunk>,
}

/// Drives ingestion runs and owns the write side of both indices.
pub struct IngestService {
    extractor: FileExtractor,
    gate: FlaggingGate,
    chunk_settings: ChunkSettings,
    settings: IngestSettings,
    embedder: Arc<dyn EmbeddingClient>,
    vector: Option<Arc<dyn VectorIndex>>,
    lexical: Option<Arc<dyn LexicalIndex>>,
    progress: ProgressTracker,
    metrics: Arc<IngestMetrics>,
}

impl IngestService {
    /// Build a service without indices.
    pub fn new(
        extractor: FileExtractor,
        gate: FlaggingGate,
        chunk_settings: ChunkSettings,
        settings: IngestSettings,
        embedder: Arc<dyn EmbeddingClient>,
        metrics: Arc<IngestMetrics>,
    ) -> Self {
        Self {
            extractor,
            gate,
            chunk_settings,
            settings,
            embedder,
            vector: None,
            lexical: None,
            progress: ProgressTracker::new(),
            metrics,
        }
    }

    /// Attach a vector index.
    pub fn with_vector_index(mut self, index: Arc<dyn VectorIndex>) -> Self {
        self.vector = Some(index);
        self
    }

    /// Attach a lexical index.
    pub fn with_lexical_index(mut self, index: Arc<dyn LexicalIndex>) -> Self {
        self.lexical = Some(index);
        self
    }

    /// File extractor used by the pipeline.
    pub fn extractor(&self) -> &FileExtractor {
        &self.extractor
    }

    /// Flagging gate used by the pipeline.
    pub fn gate(&self) -> &FlaggingGate {
        &self.gate
    }

    /// Artifact settings.
    pub fn settings(&self) -> &IngestSettings {
        &self.settings
    }

    /// Progress of the current or last run.
    pub fn progress(&self) -> ProgressSnapshot {
        self.progress.snapshot()
    }

    /// Run ingestion to completion.
    pub async fn run(&self, request: IngestRequest) -> Result<IngestSummary, IngestError> {
        let run_id = self.progress.try_start().ok_or(IngestError::AlreadyRunning)?;
        self.execute(run_id, request).await
    }

    /// Start ingestion in the background and return its run identifier.
    pub fn start(self: &Arc<Self>, request: IngestRequest) -> Result<String, IngestError> {
        let run_id = self.progress.try_start().ok_or(IngestError::AlreadyRunning)?;
        let service = Arc::clone(self);
        let spawned_id = run_id.clone();
        tokio::spawn(async move {
            if let Err(error) = service.execute(spawned_id, request).await {
                tracing::error!(error = %error, "Background ingestion failed");
            }
        });
        Ok(run_id)
    }

    async fn execute(&self, run_id: String, request: IngestRequest) -> Result<IngestSummary, IngestError> {
        match self.ingest(run_id, &request).await {
            Ok(summary) => {
                self.progress.complete(format!(
                    "{} files, {} chunks, {} flagged",
                    summary.files_processed, summary.chunks, summary.flagged
                ));
                Ok(summary)
            }
            Err(error) => {
                self.progress.fail(error.to_string());
                Err(error)
            }
        }
    }

    async fn ingest(&self, run_id: String, request: &IngestRequest) -> Result<IngestSummary, IngestError> {
        if !request.input_dir.is_dir() {
            return Err(IngestError::InputMissing(request.input_dir.clone()));
        }
        let files = discover_files(&request.input_dir);
        tracing::info!(
            run_id = %run_id,
            input = %request.input_dir.display(),
            files = files.len(),
            "Ingestion started"
        );

        let mut summary = IngestSummary {
            run_id,
            records_file: request
                .records_jsonl
                .clone()
                .unwrap_or_else(|| self.settings.records_path()),
            chunks_file: request
                .chunks_jsonl
                .clone()
                .unwrap_or_else(|| self.settings.chunks_path()),
            ..IngestSummary::default()
        };
        let mut records = Vec::new();
        let mut gated = Vec::new();

        let total = files.len().max(1) as f32;
        for (index, path) in files.iter().enumerate() {
            self.progress
                .update(0.9 * index as f32 / total, format!("processing {}", path.display()));
            match self.process_file(path).await {
                Ok(outcome) => {
                    let flagged = outcome.chunks.iter().filter(|chunk| chunk.is_flagged()).count();
                    self.metrics.record_document(
                        outcome.records.len() as u64,
                        outcome.chunks.len() as u64,
                        flagged as u64,
                    );
                    summary.files_processed += 1;
                    records.extend(outcome.records);
                    gated.extend(outcome.chunks);
                }
                Err(error) => {
                    tracing::warn!(path = %path.display(), error = %error, "Skipping file");
                    self.metrics.record_failure();
                    summary.failures.push(FileFailure {
                        path: path.clone(),
                        error: error.to_string(),
                    });
                }
            }
        }

        self.progress.update(0.9, "writing artifacts");
        summary.pages = records.len();
        summary.chunks = gated.len();
        summary.flagged = gated.iter().filter(|chunk| chunk.is_flagged()).count();
        write_jsonl(&summary.records_file, &records)?;
        summary.review_file = self.write_chunk_artifacts(&gated, &summary.chunks_file, "review")?;

        if request.store || request.embed {
            self.progress.update(0.95, "indexing");
            let selected = self.indexable(&gated);
            summary.indexed = self.index_chunks(&selected, request.store, request.embed).await;
        }

        tracing::info!(
            run_id = %summary.run_id,
            files = summary.files_processed,
            failures = summary.failures.len(),
            chunks = summary.chunks,
            flagged = summary.flagged,
            indexed = summary.indexed,
            "Ingestion finished"
        );
        Ok(summary)
    }

    /// Extract, segment, assemble and gate one file.
    pub async fn process_file(&self, path: &Path) -> Result<FileOutcome, ExtractionError> {
        let kind = FileKind::from_path(path).ok_or_else(|| ExtractionError::Unsupported(path.to_path_buf()))?;
        let records = self.extractor.extract_file(path).await?;
        let chunks = self.gate_records(&records, &resolve_source(path), kind.label(), None);
        Ok(FileOutcome { records, chunks })
    }

    pub(crate) fn gate_records(
        &self,
        records: &[PageRecord],
        source: &str,
        file_type: &str,
        scope: Option<&str>,
    ) -> Vec<GatedChunk> {
        let paragraphs = segment_document(records, self.extractor.patterns());
        let methods: HashMap<u32, ExtractionMethod> =
            records.iter().map(|record| (record.page_no, record.method)).collect();
        let chunks = assemble_chunks(&paragraphs, source, &self.chunk_settings);
        self.gate.enrich(chunks, file_type, &methods, scope)
    }

    /// Write enriched chunks, append quality entries and, when any chunk is flagged, a review
    /// file named `{prefix}_{stamp}.jsonl`.
    pub(crate) fn write_chunk_artifacts(
        &self,
        gated: &[GatedChunk],
        chunks_file: &Path,
        prefix: &str,
    ) -> Result<Option<PathBuf>, RecordError> {
        let enriched: Vec<&EnrichedChunk> = gated.iter().map(|chunk| &chunk.chunk).collect();
        write_jsonl(chunks_file, &enriched)?;

        let quality: Vec<&QualityEntry> = gated.iter().map(|chunk| &chunk.quality).collect();
        append_jsonl(&self.settings.quality_log_path(), &quality)?;

        let review: Vec<ReviewRecord> = gated
            .iter()
            .filter(|chunk| chunk.is_flagged())
            .map(GatedChunk::review_record)
            .collect();
        if review.is_empty() {
            return Ok(None);
        }
        let review_file = self
            .settings
            .review_dir()
            .join(format!("{prefix}_{}.jsonl", run_stamp()));
        write_jsonl(&review_file, &review)?;
        tracing::info!(path = %review_file.display(), flagged = review.len(), "Review file written");
        Ok(Some(review_file))
    }

    pub(crate) fn indexable<'a>(&self, gated: &'a [GatedChunk]) -> Vec<&'a EnrichedChunk> {
        gated
            .iter()
            .filter(|chunk| self.settings.index_flagged || !chunk.is_flagged())
            .map(|chunk| &chunk.chunk)
            .collect()
    }

    /// Write chunks to the attached indices; failures are logged and absorbed.
    ///
    /// Returns the number of chunks accepted by at least one index.
    pub(crate) async fn index_chunks(&self, chunks: &[&EnrichedChunk], store: bool, embed: bool) -> usize {
        if chunks.is_empty() {
            return 0;
        }
        let docs: Vec<StoredDoc> = chunks.iter().map(|chunk| StoredDoc::from(*chunk)).collect();
        let mut indexed = 0;

        if store && let Some(lexical) = &self.lexical {
            match lexical.upsert(docs.clone()).await {
                Ok(count) => indexed = indexed.max(count),
                Err(error) => tracing::warn!(error = %error, "Lexical indexing failed"),
            }
        }

        if embed && let Some(vector) = &self.vector {
            let texts: Vec<String> = docs.iter().map(|doc| doc.text.clone()).collect();
            let vectors = embed_with_fallback(
                self.embedder.as_ref(),
                &texts,
                self.settings.embedding_dimension,
                self.settings.embed_batch,
            )
            .await;
            let points = docs
                .into_iter()
                .zip(vectors)
                .map(|(doc, vector)| VectorPoint { doc, vector })
                .collect();
            match vector.upsert(points).await {
                Ok(count) => indexed = indexed.max(count),
                Err(error) => tracing::warn!(error = %error, "Vector indexing failed"),
            }
        }

        indexed
    }
}

/// Supported files under `dir`, sorted by path.
pub fn discover_files(dir: &Path) -> Vec<PathBuf> {
    WalkDir::new(dir)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(error) => {
                tracing::warn!(error = %error, "Skipping unreadable directory entry");
                None
            }
        })
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| FileKind::from_path(path).is_some())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashingEmbeddingClient;
    use crate::extraction::{ExtractionSettings, LopdfExtractor, PageExtractor};
    use crate::gate::{ChunkStatus, ValiditySettings};
    use crate::ingest::RunStatus;
    use crate::index::{IndexError, VectorHit};
    use crate::quality::ScriptProfile;
    use crate::records::read_jsonl;
    use crate::segment::PatternSet;
    use async_trait::async_trait;
    use tokio::sync::Mutex;

    #[derive(Default)]
    struct RecordingLexical {
        docs: Mutex<Vec<StoredDoc>>,
    }

    #[async_trait]
    impl LexicalIndex for RecordingLexical {
        async fn upsert(&self, docs: Vec<StoredDoc>) -> Result<usize, IndexError> {
            let count = docs.len();
            self.docs.lock().await.extend(docs);
            Ok(count)
        }

        async fn search(&self, _query: &str, _limit: usize) -> Result<Vec<String>, IndexError> {
            Ok(Vec::new())
        }

        async fn fetch(&self, _ids: &[String]) -> Result<Vec<StoredDoc>, IndexError> {
            Ok(Vec::new())
        }
    }

    #[derive(Default)]
    struct RecordingVector {
        points: Mutex<Vec<VectorPoint>>,
    }

    #[async_trait]
    impl VectorIndex for RecordingVector {
        async fn upsert(&self, points: Vec<VectorPoint>) -> Result<usize, IndexError> {
            let count = points.len();
            self.points.lock().await.extend(points);
            Ok(count)
        }

        async fn query(&self, _vector: Vec<f32>, _top_k: usize) -> Result<Vec<VectorHit>, IndexError> {
            Ok(Vec::new())
        }
    }

    const GOOD: &str = "The committee approved the annual budget after a long discussion about regional priorities and spending.";

    fn service(data_dir: &Path) -> IngestService {
        let extractor = FileExtractor::new(
            PageExtractor::new(Arc::new(LopdfExtractor), ExtractionSettings::default()),
            PatternSet::default(),
        );
        IngestService::new(
            extractor,
            FlaggingGate::new(ValiditySettings::default(), ScriptProfile::default()),
            ChunkSettings {
                max_tokens: 40,
                ..ChunkSettings::default()
            },
            IngestSettings {
                data_dir: data_dir.to_path_buf(),
                embedding_dimension: 8,
                ..IngestSettings::default()
            },
            Arc::new(HashingEmbeddingClient::new(8)),
            Arc::new(IngestMetrics::new()),
        )
    }

    #[test]
    fn discovers_supported_files_in_order() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::create_dir_all(dir.path().join("nested")).expect("mkdir");
        std::fs::write(dir.path().join("b.txt"), "b").expect("write");
        std::fs::write(dir.path().join("a.md"), "a").expect("write");
        std::fs::write(dir.path().join("image.png"), "x").expect("write");
        std::fs::write(dir.path().join("nested/c.pdf"), "x").expect("write");

        let names: Vec<String> = discover_files(dir.path())
            .iter()
            .map(|path| path.strip_prefix(dir.path()).expect("prefix").display().to_string())
            .collect();
        assert_eq!(names, vec!["a.md", "b.txt", "nested/c.pdf"]);
    }

    #[tokio::test]
    async fn run_writes_artifacts_and_indexes_accepted_chunks() {
        let input = tempfile::tempdir().expect("input");
        let data = tempfile::tempdir().expect("data");
        std::fs::write(input.path().join("minutes.txt"), format!("{GOOD}\n\nok\n\n{GOOD}")).expect("write");

        let lexical = Arc::new(RecordingLexical::default());
        let vector = Arc::new(RecordingVector::default());
        let service = service(data.path())
            .with_lexical_index(lexical.clone())
            .with_vector_index(vector.clone());

        let summary = service.run(IngestRequest::new(input.path())).await.expect("run");

        assert_eq!(summary.files_processed, 1);
        assert_eq!(summary.pages, 1);
        assert!(summary.chunks >= 2);
        assert!(summary.failures.is_empty());

        let enriched: Vec<EnrichedChunk> = read_jsonl(&summary.chunks_file).expect("chunks");
        assert_eq!(enriched.len(), summary.chunks);
        let quality: Vec<QualityEntry> =
            read_jsonl(&service.settings().quality_log_path()).expect("quality");
        assert_eq!(quality.len(), summary.chunks);

        let flagged: Vec<&EnrichedChunk> = enriched
            .iter()
            .filter(|chunk| chunk.status == ChunkStatus::Flagged)
            .collect();
        assert_eq!(flagged.len(), summary.flagged);
        if let Some(review_file) = &summary.review_file {
            let review: Vec<ReviewRecord> = read_jsonl(review_file).expect("review");
            assert_eq!(review.len(), summary.flagged);
        } else {
            assert_eq!(summary.flagged, 0);
        }

        let stored = lexical.docs.lock().await;
        assert_eq!(stored.len(), summary.chunks - summary.flagged);
        assert!(stored.iter().all(|doc| doc.metadata.status == "ok"));
        let points = vector.points.lock().await;
        assert_eq!(points.len(), stored.len());
        assert!(points.iter().all(|point| point.vector.len() == 8));
        assert_eq!(service.progress().status, RunStatus::Completed);
    }

    #[tokio::test]
    async fn identifiers_are_stable_across_runs() {
        let input = tempfile::tempdir().expect("input");
        let data = tempfile::tempdir().expect("data");
        std::fs::write(input.path().join("doc.txt"), GOOD).expect("write");
        let service = service(data.path());

        let first = service.run(IngestRequest::new(input.path())).await.expect("first");
        let first_ids: Vec<String> = read_jsonl::<EnrichedChunk>(&first.chunks_file)
            .expect("chunks")
            .into_iter()
            .map(|chunk| chunk.doc_id)
            .collect();
        let second = service.run(IngestRequest::new(input.path())).await.expect("second");
        let second_ids: Vec<String> = read_jsonl::<EnrichedChunk>(&second.chunks_file)
            .expect("chunks")
            .into_iter()
            .map(|chunk| chunk.doc_id)
            .collect();
        assert_eq!(first_ids, second_ids);
        assert_ne!(first.run_id, second.run_id);
    }

    #[tokio::test]
    async fn corrupt_files_are_reported_and_skipped() {
        let input = tempfile::tempdir().expect("input");
        let data = tempfile::tempdir().expect("data");
        std::fs::write(input.path().join("broken.pdf"), b"not a pdf").expect("write");
        std::fs::write(input.path().join("notes.txt"), GOOD).expect("write");

        let summary = service(data.path())
            .run(IngestRequest::new(input.path()))
            .await
            .expect("run");
        assert_eq!(summary.files_processed, 1);
        assert_eq!(summary.failures.len(), 1);
        assert!(summary.failures[0].path.ends_with("broken.pdf"));
    }

    #[tokio::test]
    async fn missing_input_fails_the_run() {
        let data = tempfile::tempdir().expect("data");
        let service = service(data.path());
        let error = service
            .run(IngestRequest::new(data.path().join("absent")))
            .await
            .expect_err("missing input");
        assert!(matches!(error, IngestError::InputMissing(_)));
        assert_eq!(service.progress().status, RunStatus::Error);
    }
}
