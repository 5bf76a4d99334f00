use std::fs;
use std::path::Path;
use std::sync::Arc;

use hybrid_rag::chunking::ChunkSettings;
use hybrid_rag::embedding::HashingEmbeddingClient;
use hybrid_rag::extraction::{ExtractionSettings, FileExtractor, LopdfExtractor, PageExtractor};
use hybrid_rag::gate::{ChunkStatus, EnrichedChunk, FlaggingGate, ReviewRecord, ValiditySettings};
use hybrid_rag::index::LexicalIndex;
use hybrid_rag::ingest::{IngestRequest, IngestService, IngestSettings, RunStatus};
use hybrid_rag::lexical::TantivyLexicalIndex;
use hybrid_rag::metrics::IngestMetrics;
use hybrid_rag::quality::ScriptProfile;
use hybrid_rag::records::read_jsonl;
use hybrid_rag::retrieval::{HybridRetriever, QueryService, RetrievalSettings};
use hybrid_rag::segment::PatternSet;

const BUDGET_MINUTES: &str = "Minutes of the finance committee.\n\n\
The committee approved the annual budget for the northern region after reviewing the \
infrastructure plan and the revised staffing estimates presented by the treasurer.";

const THAI_NOTICE: &str = "ประกาศกระทรวงการคลัง\n\n\
คณะกรรมการได้พิจารณาและอนุมัติงบประมาณประจำปีสำหรับโครงการพัฒนาโครงสร้างพื้นฐานในภาคเหนือเรียบร้อยแล้ว";

const NOISE: &str = "@@ 12 ## 34";

struct Harness {
    ingest: IngestService,
    query: QueryService,
    metrics: Arc<IngestMetrics>,
}

fn harness(data_dir: &Path) -> Harness {
    let script = ScriptProfile::default();
    let metrics = Arc::new(IngestMetrics::new());
    let embedder = Arc::new(HashingEmbeddingClient::new(32));
    let lexical: Arc<dyn LexicalIndex> =
        Arc::new(TantivyLexicalIndex::in_memory(script.clone()).expect("lexical index"));

    let extractor = FileExtractor::new(
        PageExtractor::new(Arc::new(LopdfExtractor::new()), ExtractionSettings::default()),
        PatternSet::default(),
    );
    let ingest = IngestService::new(
        extractor,
        FlaggingGate::new(ValiditySettings::default(), script),
        ChunkSettings::default(),
        IngestSettings {
            data_dir: data_dir.to_path_buf(),
            embedding_dimension: 32,
            ..IngestSettings::default()
        },
        embedder.clone(),
        metrics.clone(),
    )
    .with_lexical_index(lexical.clone());

    let retriever = HybridRetriever::new(embedder, None, Some(lexical), 32, RetrievalSettings::default());
    let query = QueryService::new(retriever, None, "unused".into(), metrics.clone());
    Harness {
        ingest,
        query,
        metrics,
    }
}

fn seed_inputs(dir: &Path) {
    fs::create_dir_all(dir.join("nested")).expect("input dirs");
    fs::write(dir.join("minutes.txt"), BUDGET_MINUTES).expect("minutes");
    fs::write(dir.join("nested").join("notice.md"), THAI_NOTICE).expect("notice");
    fs::write(dir.join("noise.txt"), NOISE).expect("noise");
    fs::write(dir.join("ignored.bin"), [0u8, 1, 2]).expect("ignored");
}

#[tokio::test]
async fn ingest_then_query_cites_the_matching_document() {
    let input = tempfile::tempdir().expect("input");
    let data = tempfile::tempdir().expect("data");
    seed_inputs(input.path());
    let harness = harness(data.path());

    let summary = harness
        .ingest
        .run(IngestRequest::new(input.path()))
        .await
        .expect("ingest");

    assert_eq!(summary.files_processed, 3);
    assert!(summary.failures.is_empty());
    assert_eq!(summary.chunks, 3);
    assert_eq!(summary.flagged, 1);
    assert_eq!(summary.indexed, 2);
    assert_eq!(harness.ingest.progress().status, RunStatus::Completed);

    let chunks: Vec<EnrichedChunk> = read_jsonl(&summary.chunks_file).expect("chunks");
    assert_eq!(chunks.len(), 3);
    let review_file = summary.review_file.expect("review file");
    let review: Vec<ReviewRecord> = read_jsonl(&review_file).expect("review");
    assert_eq!(review.len(), 1);
    assert_eq!(review[0].chunk.status, ChunkStatus::Flagged);
    assert!(review[0].chunk.chunk.path.ends_with("noise.txt"));

    let outcome = harness
        .query
        .answer("Which budget did the committee approve?")
        .await
        .expect("answer");
    assert_eq!(outcome.citations[0].source, "minutes.txt");
    assert!(outcome.prompt.contains("northern region"));
    assert!(!outcome.prompt.contains("@@"));

    let outcome = harness.query.answer("อนุมัติงบประมาณ").await.expect("answer");
    assert_eq!(outcome.citations[0].source, "notice.txt");
    assert!(outcome.token_est > 0);

    let metrics = harness.metrics.snapshot();
    assert_eq!(metrics.documents_ingested, 3);
    assert_eq!(metrics.chunks_flagged, 1);
    assert_eq!(metrics.queries_served, 2);
}

#[tokio::test]
async fn reingesting_keeps_identifiers_and_index_size() {
    let input = tempfile::tempdir().expect("input");
    let data = tempfile::tempdir().expect("data");
    seed_inputs(input.path());
    let harness = harness(data.path());

    let first = harness
        .ingest
        .run(IngestRequest::new(input.path()))
        .await
        .expect("first run");
    let first_ids: Vec<String> = read_jsonl::<EnrichedChunk>(&first.chunks_file)
        .expect("chunks")
        .into_iter()
        .map(|chunk| chunk.doc_id)
        .collect();

    let second = harness
        .ingest
        .run(IngestRequest::new(input.path()))
        .await
        .expect("second run");
    let second_ids: Vec<String> = read_jsonl::<EnrichedChunk>(&second.chunks_file)
        .expect("chunks")
        .into_iter()
        .map(|chunk| chunk.doc_id)
        .collect();

    assert_ne!(first.run_id, second.run_id);
    assert_eq!(first_ids, second_ids);

    let outcome = harness.query.answer("budget committee").await.expect("answer");
    let ids: Vec<&str> = outcome.contexts.iter().map(|context| context.doc_id.as_str()).collect();
    let mut unique = ids.clone();
    unique.sort_unstable();
    unique.dedup();
    assert_eq!(ids.len(), unique.len());
}

#[tokio::test]
async fn store_disabled_leaves_lexical_index_empty() {
    let input = tempfile::tempdir().expect("input");
    let data = tempfile::tempdir().expect("data");
    seed_inputs(input.path());
    let harness = harness(data.path());

    let request = IngestRequest {
        store: false,
        embed: false,
        ..IngestRequest::new(input.path())
    };
    let summary = harness.ingest.run(request).await.expect("ingest");
    assert_eq!(summary.indexed, 0);
    assert!(summary.chunks_file.exists());

    let outcome = harness.query.answer("budget").await.expect("answer");
    assert!(outcome.contexts.is_empty());
    assert!(outcome.citations.is_empty());
}
