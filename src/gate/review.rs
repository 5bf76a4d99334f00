//! Statistics over a review artifact: where flagged chunks come from and why they failed.

use crate::gate::{ChunkStatus, ReviewRecord};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

const SAMPLE_COUNT: usize = 3;
const PREVIEW_CHARS: usize = 150;

/// Flagged chunk count of one source file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileFlags {
    /// Source path.
    pub path: String,
    /// Flagged chunks from this file.
    pub flagged: usize,
}

/// Character length statistics of flagged chunk texts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LengthStats {
    /// Shortest text.
    pub min: usize,
    /// Longest text.
    pub max: usize,
    /// Integer mean.
    pub avg: usize,
    /// Texts with no visible characters.
    pub empty: usize,
}

/// Short excerpt of one flagged chunk.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlaggedSample {
    /// File name of the source.
    pub file: String,
    /// First page; `None` when unknown.
    pub page: Option<u32>,
    /// Leading characters of the text, with `...` when cut.
    pub preview: String,
    /// Full text length in characters.
    pub chars: usize,
    /// Engine that produced the chunk.
    pub engine: String,
    /// Quality score at flagging time.
    pub quality_score: f32,
}

/// Summary of a review artifact.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReviewReport {
    /// Flagged records in the artifact.
    pub total_flagged: usize,
    /// Distinct source files with flagged chunks.
    pub files_with_flags: usize,
    /// Files with the most flagged chunks, most first.
    pub top_files: Vec<FileFlags>,
    /// Count per failing check.
    pub reasons: BTreeMap<String, usize>,
    /// Count per extraction engine.
    pub engines: BTreeMap<String, usize>,
    /// Text lengths; `None` when nothing was flagged.
    pub lengths: Option<LengthStats>,
    /// First few flagged chunks in artifact order.
    pub samples: Vec<FlaggedSample>,
}

/// Summarise the flagged records of a review artifact, keeping the `top` busiest files.
pub fn summarize_review(records: &[ReviewRecord], top: usize) -> ReviewReport {
    let flagged: Vec<&ReviewRecord> = records
        .iter()
        .filter(|record| record.chunk.status == ChunkStatus::Flagged)
        .collect();

    let mut per_file: HashMap<&str, usize> = HashMap::new();
    let mut reasons = BTreeMap::new();
    let mut engines = BTreeMap::new();
    for record in &flagged {
        *per_file.entry(record.chunk.chunk.path.as_str()).or_default() += 1;
        *engines.entry(record.engine.clone()).or_default() += 1;
        for reason in record.notes.split(';').map(str::trim).filter(|reason| !reason.is_empty()) {
            *reasons.entry(reason_label(reason).to_string()).or_default() += 1;
        }
    }

    let mut files: Vec<FileFlags> = per_file
        .into_iter()
        .map(|(path, flagged)| FileFlags {
            path: path.to_string(),
            flagged,
        })
        .collect();
    files.sort_by(|a, b| b.flagged.cmp(&a.flagged).then_with(|| a.path.cmp(&b.path)));
    let files_with_flags = files.len();
    files.truncate(top);

    let lengths: Vec<usize> = flagged
        .iter()
        .map(|record| record.chunk.chunk.text.chars().count())
        .collect();
    let length_stats = (!lengths.is_empty()).then(|| LengthStats {
        min: lengths.iter().copied().min().unwrap_or(0),
        max: lengths.iter().copied().max().unwrap_or(0),
        avg: lengths.iter().sum::<usize>() / lengths.len(),
        empty: flagged
            .iter()
            .filter(|record| record.chunk.chunk.text.trim().is_empty())
            .count(),
    });

    ReviewReport {
        total_flagged: flagged.len(),
        files_with_flags,
        top_files: files,
        reasons,
        engines,
        lengths: length_stats,
        samples: flagged.iter().take(SAMPLE_COUNT).map(|record| sample(record)).collect(),
    }
}

/// Check name without its measured values, e.g. `too short (12 < 30)` becomes `too short`.
fn reason_label(reason: &str) -> &str {
    ["too short", "language", "quality"]
        .into_iter()
        .find(|label| reason.starts_with(label))
        .unwrap_or(reason)
}

fn sample(record: &ReviewRecord) -> FlaggedSample {
    let chunk = &record.chunk.chunk;
    let chars = chunk.text.chars().count();
    let mut preview: String = chunk.text.chars().take(PREVIEW_CHARS).collect();
    if chars > PREVIEW_CHARS {
        preview.push_str("...");
    }
    FlaggedSample {
        file: Path::new(&chunk.path)
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| chunk.source.clone()),
        page: chunk.page_span().map(|(start, _)| start),
        preview,
        chars,
        engine: record.engine.clone(),
        quality_score: record.quality_score,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunking::Chunk;
    use crate::gate::EnrichedChunk;

    fn record(path: &str, page: u32, text: &str, engine: &str, notes: &str) -> ReviewRecord {
        ReviewRecord {
            chunk: EnrichedChunk {
                chunk: Chunk {
                    source: "scan.txt".into(),
                    path: path.into(),
                    page_start: page,
                    page_end: page,
                    owner: "owner:unknown".into(),
                    sensitivity: "internal".into(),
                    tokens_est: 1,
                    text: text.into(),
                    updated_at: 0,
                },
                doc_id: format!("{path}-{page}"),
                file_type: "pdf".into(),
                chunk_id: 0,
                status: ChunkStatus::Flagged,
            },
            quality_score: 0.2,
            engine: engine.into(),
            notes: notes.into(),
        }
    }

    #[test]
    fn counts_files_reasons_and_engines() {
        let long = "ก".repeat(200);
        let records = vec![
            record("/docs/scan.pdf", 1, "@@", "native", "too short (2 < 30); quality 0.10 below 0.50"),
            record("/docs/scan.pdf", 2, &long, "local-ocr", "language und not accepted"),
            record("/docs/memo.pdf", 0, "", "native", "too short (0 < 30); language undetected"),
        ];
        let report = summarize_review(&records, 10);

        assert_eq!(report.total_flagged, 3);
        assert_eq!(report.files_with_flags, 2);
        assert_eq!(
            report.top_files[0],
            FileFlags {
                path: "/docs/scan.pdf".into(),
                flagged: 2
            }
        );
        assert_eq!(report.reasons["too short"], 2);
        assert_eq!(report.reasons["language"], 2);
        assert_eq!(report.reasons["quality"], 1);
        assert_eq!(report.engines["native"], 2);
        assert_eq!(
            report.lengths,
            Some(LengthStats {
                min: 0,
                max: 200,
                avg: 67,
                empty: 1
            })
        );

        assert_eq!(report.samples.len(), 3);
        assert_eq!(report.samples[0].file, "scan.pdf");
        assert_eq!(report.samples[1].preview.chars().count(), PREVIEW_CHARS + 3);
        assert!(report.samples[1].preview.ends_with("..."));
        assert_eq!(report.samples[2].page, None);
    }

    #[test]
    fn top_limits_files_and_ok_records_are_ignored() {
        let mut accepted = record("/docs/ok.pdf", 1, "fine", "native", "ok");
        accepted.chunk.status = ChunkStatus::Ok;
        let records = vec![
            record("/docs/a.pdf", 1, "x", "native", "too short (1 < 30)"),
            record("/docs/b.pdf", 1, "y", "native", "too short (1 < 30)"),
            accepted,
        ];
        let report = summarize_review(&records, 1);

        assert_eq!(report.total_flagged, 2);
        assert_eq!(report.files_with_flags, 2);
        assert_eq!(report.top_files.len(), 1);
        assert_eq!(report.top_files[0].path, "/docs/a.pdf");
    }

    #[test]
    fn empty_artifact_has_no_length_stats() {
        let report = summarize_review(&[], 10);
        assert_eq!(report.total_flagged, 0);
        assert!(report.lengths.is_none());
        assert!(report.samples.is_empty());
    }
}
