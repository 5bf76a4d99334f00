//! Chunk validation, stable identifiers and quality bookkeeping.
//!
//! Every chunk leaves the gate with an ordinal index, a deterministic identifier and an
//! `ok`/`flagged` status. Flagged chunks are routed to review instead of the indices; each chunk
//! gets exactly one [`QualityEntry`].

use crate::chunking::Chunk;
use crate::extraction::ExtractionMethod;
use crate::quality::{ScriptProfile, detect_language, text_quality_score};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt;
use time::OffsetDateTime;

pub mod review;

pub use review::{ReviewReport, summarize_review};

const IDENTIFIER_HEX_LEN: usize = 32;

/// Thresholds a chunk must meet to be indexed.
#[derive(Debug, Clone, PartialEq)]
pub struct ValiditySettings {
    /// Minimum trimmed length in characters.
    pub min_length: usize,
    /// Minimum quality score.
    pub min_score: f32,
    /// Accepted ISO 639-3 language codes.
    pub accepted_languages: Vec<String>,
}

impl Default for ValiditySettings {
    fn default() -> Self {
        Self {
            min_length: 30,
            min_score: 0.7,
            accepted_languages: vec!["tha".into(), "eng".into()],
        }
    }
}

/// Outcome of the gate for one chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkStatus {
    /// Accepted for indexing.
    Ok,
    /// Routed to human review.
    Flagged,
}

impl fmt::Display for ChunkStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Ok => "ok",
            Self::Flagged => "flagged",
        })
    }
}

/// Chunk plus identity and gate status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichedChunk {
    /// Underlying chunk fields.
    #[serde(flatten)]
    pub chunk: Chunk,
    /// Deterministic identifier.
    pub doc_id: String,
    /// Source format label (`pdf`, `excel`, `txt`).
    pub file_type: String,
    /// Ordinal of the chunk within its file.
    pub chunk_id: usize,
    /// Gate outcome.
    pub status: ChunkStatus,
}

/// Audit record written once per chunk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityEntry {
    /// Identifier of the chunk.
    pub doc_id: String,
    /// First page of the chunk; `0` when unknown.
    pub page: u32,
    /// Quality score of the chunk text.
    pub quality_score: f32,
    /// Engine that produced the chunk's first page.
    pub engine: String,
    /// Gate outcome.
    pub status: ChunkStatus,
    /// `ok` or the failing checks.
    pub notes: String,
    /// RFC 3339 creation time.
    pub created_at: String,
}

/// Line of a review artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewRecord {
    /// Flagged chunk.
    #[serde(flatten)]
    pub chunk: EnrichedChunk,
    /// Quality score at flagging time.
    pub quality_score: f32,
    /// Engine that produced the chunk.
    pub engine: String,
    /// Failing checks.
    pub notes: String,
}

/// Chunk and its quality entry as emitted by the gate.
#[derive(Debug, Clone, PartialEq)]
pub struct GatedChunk {
    /// Enriched chunk.
    pub chunk: EnrichedChunk,
    /// Matching quality entry.
    pub quality: QualityEntry,
}

impl GatedChunk {
    /// Whether the gate flagged this chunk.
    pub fn is_flagged(&self) -> bool {
        self.chunk.status == ChunkStatus::Flagged
    }

    /// Review artifact line for this chunk.
    pub fn review_record(&self) -> ReviewRecord {
        ReviewRecord {
            chunk: self.chunk.clone(),
            quality_score: self.quality.quality_score,
            engine: self.quality.engine.clone(),
            notes: self.quality.notes.clone(),
        }
    }
}

/// Result of validating one text.
#[derive(Debug, Clone, PartialEq)]
pub struct Validation {
    /// Gate outcome.
    pub status: ChunkStatus,
    /// Quality score of the text.
    pub score: f32,
    /// Failing checks; empty when accepted.
    pub reasons: Vec<String>,
}

impl Validation {
    /// Notes string stored in quality entries.
    pub fn notes(&self) -> String {
        if self.reasons.is_empty() {
            "ok".to_string()
        } else {
            self.reasons.join("; ")
        }
    }
}

/// Deterministic identifier of a chunk: truncated SHA-256 over scope, path, page and index.
pub fn chunk_identifier(scope: Option<&str>, path: &str, page: u32, index: usize) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!("{}|{path}|{page}|{index}", scope.unwrap_or_default()).as_bytes());
    let mut digest = hex::encode(hasher.finalize());
    digest.truncate(IDENTIFIER_HEX_LEN);
    digest
}

/// Current timestamp formatted for quality entries.
pub fn current_timestamp_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
}

/// Validates and enriches chunks.
#[derive(Debug, Clone)]
pub struct FlaggingGate {
    settings: ValiditySettings,
    script: ScriptProfile,
}

impl FlaggingGate {
    /// Create a gate.
    pub fn new(settings: ValiditySettings, script: ScriptProfile) -> Self {
        Self { settings, script }
    }

    /// Active thresholds.
    pub fn settings(&self) -> &ValiditySettings {
        &self.settings
    }

    /// Check length, language and quality of `text`.
    pub fn validate(&self, text: &str) -> Validation {
        let trimmed = text.trim();
        let score = text_quality_score(trimmed, &self.script);
        let mut reasons = Vec::new();

        let length = trimmed.chars().count();
        if length < self.settings.min_length {
            reasons.push(format!("too short ({length} < {})", self.settings.min_length));
        }
        match detect_language(trimmed) {
            Some(code) if self.settings.accepted_languages.iter().any(|lang| lang == code) => {}
            Some(code) => reasons.push(format!("language {code} not accepted")),
            None => reasons.push("language undetected".to_string()),
        }
        if score < self.settings.min_score {
            reasons.push(format!("quality {score:.2} below {:.2}", self.settings.min_score));
        }

        Validation {
            status: if reasons.is_empty() {
                ChunkStatus::Ok
            } else {
                ChunkStatus::Flagged
            },
            score,
            reasons,
        }
    }

    /// Enrich the chunks of one file in source order.
    ///
    /// `methods` maps page numbers to the engine that produced them; `scope` separates
    /// identifiers of reprocessed chunks from first-pass ones.
    pub fn enrich(
        &self,
        chunks: Vec<Chunk>,
        file_type: &str,
        methods: &HashMap<u32, ExtractionMethod>,
        scope: Option<&str>,
    ) -> Vec<GatedChunk> {
        chunks
            .into_iter()
            .enumerate()
            .map(|(index, chunk)| {
                let validation = self.validate(&chunk.text);
                let doc_id = chunk_identifier(scope, &chunk.path, chunk.page_start, index);
                let engine = methods
                    .get(&chunk.page_start)
                    .map(|method| method.as_str().to_string())
                    .unwrap_or_else(|| "unknown".to_string());
                if validation.status == ChunkStatus::Flagged {
                    tracing::debug!(doc_id = %doc_id, notes = %validation.notes(), "Chunk flagged");
                }
                let quality = QualityEntry {
                    doc_id: doc_id.clone(),
                    page: chunk.page_start,
                    quality_score: validation.score,
                    engine,
                    status: validation.status,
                    notes: validation.notes(),
                    created_at: current_timestamp_rfc3339(),
                };
                GatedChunk {
                    chunk: EnrichedChunk {
                        chunk,
                        doc_id,
                        file_type: file_type.to_string(),
                        chunk_id: index,
                        status: validation.status,
                    },
                    quality,
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(page: u32, text: &str) -> Chunk {
        Chunk {
            source: "report.txt".into(),
            path: "/docs/report.pdf".into(),
            page_start: page,
            page_end: page,
            owner: "owner:unknown".into(),
            sensitivity: "internal".into(),
            tokens_est: 1,
            text: text.into(),
            updated_at: 0,
        }
    }

    fn gate(min_length: usize) -> FlaggingGate {
        FlaggingGate::new(
            ValiditySettings {
                min_length,
                ..ValiditySettings::default()
            },
            ScriptProfile::default(),
        )
    }

    const ENGLISH: &str = "The committee approved the annual budget after a long discussion about regional priorities.";

    #[test]
    fn short_text_is_flagged() {
        let validation = gate(50).validate("tiny text.");
        assert_eq!(validation.status, ChunkStatus::Flagged);
        assert!(validation.notes().contains("too short"));
    }

    #[test]
    fn clean_english_text_passes() {
        let validation = gate(30).validate(ENGLISH);
        assert_eq!(validation.status, ChunkStatus::Ok);
        assert_eq!(validation.notes(), "ok");
    }

    #[test]
    fn unaccepted_language_and_noise_are_flagged() {
        let gate = gate(30);
        let german = gate.validate(
            "Der Ausschuss hat den Jahreshaushalt nach einer langen Diskussion über regionale Prioritäten genehmigt.",
        );
        assert_eq!(german.status, ChunkStatus::Flagged);
        assert!(german.notes().contains("not accepted"));

        let noisy = gate.validate("@@ ## $$ %% ^^ && ** (( )) !! ?? ;; :: ~~ ++ == -- __");
        assert_eq!(noisy.status, ChunkStatus::Flagged);
        assert!(noisy.notes().contains("quality"));
    }

    #[test]
    fn identifiers_are_stable_unique_and_scoped() {
        let a = chunk_identifier(None, "/docs/a.pdf", 1, 0);
        assert_eq!(a, chunk_identifier(None, "/docs/a.pdf", 1, 0));
        assert_eq!(a.len(), 32);
        assert_ne!(a, chunk_identifier(None, "/docs/a.pdf", 1, 1));
        assert_ne!(a, chunk_identifier(None, "/docs/a.pdf", 2, 0));
        assert_ne!(a, chunk_identifier(None, "/docs/b.pdf", 1, 0));
        assert_ne!(a, chunk_identifier(Some("local-ocr"), "/docs/a.pdf", 1, 0));
    }

    #[test]
    fn enrich_emits_one_quality_entry_per_chunk() {
        let methods = HashMap::from([(1, ExtractionMethod::Native), (2, ExtractionMethod::LocalOcr)]);
        let gated = gate(30).enrich(
            vec![chunk(1, ENGLISH), chunk(2, "short")],
            "pdf",
            &methods,
            None,
        );

        assert_eq!(gated.len(), 2);
        assert_eq!(gated[0].chunk.chunk_id, 0);
        assert_eq!(gated[1].chunk.chunk_id, 1);
        assert_eq!(gated[0].chunk.status, ChunkStatus::Ok);
        assert!(gated[1].is_flagged());
        assert_eq!(gated[1].quality.engine, "local-ocr");
        assert_eq!(gated[0].quality.doc_id, gated[0].chunk.doc_id);
        assert_eq!(gated[1].quality.status, ChunkStatus::Flagged);
        assert_eq!(gated[0].chunk.file_type, "pdf");
    }

    #[test]
    fn review_record_round_trips_through_json() {
        let gated = gate(30).enrich(vec![chunk(3, "short")], "pdf", &HashMap::new(), None);
        let record = gated[0].review_record();
        let line = serde_json::to_string(&record).expect("json");
        assert!(line.contains("\"status\":\"flagged\""));
        assert!(line.contains("\"page_start\":3"));
        let parsed: ReviewRecord = serde_json::from_str(&line).expect("parse");
        assert_eq!(parsed, record);
        assert_eq!(parsed.engine, "unknown");
    }
}
