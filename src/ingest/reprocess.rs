//! Re-running OCR on pages behind flagged chunks.

use crate::extraction::{ExtractionMethod, FileKind, PageRecord};
use crate::gate::{ChunkStatus, ReviewRecord};
use crate::ingest::service::{FileFailure, IngestError, IngestService};
use crate::records::{read_jsonl, run_stamp};
use crate::segment::split_paragraphs;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

/// Outcome of re-running OCR over flagged pages.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReprocessSummary {
    /// Engine used for re-extraction.
    pub engine: String,
    /// Distinct pages requested across all files.
    pub pages_requested: usize,
    /// Pages that met the quality threshold and passed validation.
    pub pages_kept: usize,
    /// Chunks produced from kept pages.
    pub chunks: usize,
    /// Chunks flagged again.
    pub flagged: usize,
    /// Chunks written to at least one index.
    pub indexed: usize,
    /// Reprocessed chunks artifact, when any chunk was produced.
    pub output_file: Option<PathBuf>,
    /// Review file for chunks flagged again.
    pub review_file: Option<PathBuf>,
    /// Files that could not be re-extracted.
    pub failures: Vec<FileFailure>,
}

/// Flagged pages grouped by source path; unknown pages are skipped.
pub fn flagged_pages(records: &[ReviewRecord]) -> BTreeMap<String, BTreeSet<u32>> {
    let mut grouped: BTreeMap<String, BTreeSet<u32>> = BTreeMap::new();
    for record in records.iter().filter(|record| record.chunk.status == ChunkStatus::Flagged) {
        let chunk = &record.chunk.chunk;
        if chunk.page_start == 0 {
            tracing::debug!(doc_id = %record.chunk.doc_id, "Flagged chunk has no page; skipping");
            continue;
        }
        grouped
            .entry(chunk.path.clone())
            .or_default()
            .extend(chunk.page_start..=chunk.page_end.max(chunk.page_start));
    }
    grouped
}

impl IngestService {
    /// Re-extract the pages behind a review file with `engine` and ingest what now passes.
    ///
    /// Identifiers are scoped by the engine tag, so reprocessed chunks never overwrite
    /// first-pass ones and stay stable across repeated reprocessing.
    pub async fn reprocess_flagged(
        &self,
        review_file: &Path,
        engine: ExtractionMethod,
    ) -> Result<ReprocessSummary, IngestError> {
        let records: Vec<ReviewRecord> = read_jsonl(review_file)?;
        let grouped = flagged_pages(&records);
        let scope = engine.as_str();
        let min_quality = self.settings().reprocess_min_quality;

        let mut summary = ReprocessSummary {
            engine: scope.to_string(),
            pages_requested: grouped.values().map(BTreeSet::len).sum(),
            ..ReprocessSummary::default()
        };
        let mut gated = Vec::new();

        for (path, pages) in &grouped {
            let file = Path::new(path);
            let pages: Vec<u32> = pages.iter().copied().collect();
            let reextracted = match self
                .extractor()
                .page_extractor()
                .reextract_pages(file, &pages, engine)
                .await
            {
                Ok(reextracted) => reextracted,
                Err(error) => {
                    tracing::warn!(path = %path, error = %error, "Reprocessing failed for file");
                    summary.failures.push(FileFailure {
                        path: file.to_path_buf(),
                        error: error.to_string(),
                    });
                    continue;
                }
            };

            let kept: Vec<PageRecord> = reextracted
                .into_iter()
                .filter(|page| {
                    let keep = page.quality >= min_quality
                        && self.gate().validate(&page.text).status == ChunkStatus::Ok;
                    if !keep {
                        tracing::debug!(path = %path, page = page.page_no, quality = page.quality, "Reprocessed page rejected");
                    }
                    keep
                })
                .map(|page| PageRecord {
                    source: path.clone(),
                    page_no: page.page_no,
                    method: engine,
                    sheet: None,
                    paragraphs: split_paragraphs(&page.text, self.extractor().patterns()),
                    text: page.text,
                })
                .collect();
            summary.pages_kept += kept.len();
            if kept.is_empty() {
                continue;
            }

            let file_type = FileKind::from_path(file).map(|kind| kind.label()).unwrap_or("pdf");
            gated.extend(self.gate_records(&kept, path, file_type, Some(scope)));
        }

        summary.chunks = gated.len();
        summary.flagged = gated.iter().filter(|chunk| chunk.is_flagged()).count();
        if !gated.is_empty() {
            let output = self
                .settings()
                .review_dir()
                .join(format!("reprocessed_{scope}_{}.jsonl", run_stamp()));
            summary.review_file = self.write_chunk_artifacts(&gated, &output, &format!("review_{scope}"))?;
            summary.output_file = Some(output);

            let selected = self.indexable(&gated);
            summary.indexed = self.index_chunks(&selected, true, true).await;
        }

        tracing::info!(
            engine = scope,
            pages_requested = summary.pages_requested,
            pages_kept = summary.pages_kept,
            chunks = summary.chunks,
            flagged = summary.flagged,
            "Reprocessing finished"
        );
        Ok(summary)
    }
}
