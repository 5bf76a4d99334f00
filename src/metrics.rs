use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters describing ingestion and query activity.
#[derive(Default)]
pub struct IngestMetrics {
    documents_ingested: AtomicU64,
    documents_failed: AtomicU64,
    pages_extracted: AtomicU64,
    chunks_emitted: AtomicU64,
    chunks_flagged: AtomicU64,
    queries_served: AtomicU64,
}

impl IngestMetrics {
    /// Create an empty metrics accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an ingested document with its page, chunk and flagged counts.
    pub fn record_document(&self, pages: u64, chunks: u64, flagged: u64) {
        self.documents_ingested.fetch_add(1, Ordering::Relaxed);
        self.pages_extracted.fetch_add(pages, Ordering::Relaxed);
        self.chunks_emitted.fetch_add(chunks, Ordering::Relaxed);
        self.chunks_flagged.fetch_add(flagged, Ordering::Relaxed);
    }

    /// Record a document skipped because of a file-level failure.
    pub fn record_failure(&self) {
        self.documents_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an answered query.
    pub fn record_query(&self) {
        self.queries_served.fetch_add(1, Ordering::Relaxed);
    }

    /// Return a snapshot of the current counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            documents_ingested: self.documents_ingested.load(Ordering::Relaxed),
            documents_failed: self.documents_failed.load(Ordering::Relaxed),
            pages_extracted: self.pages_extracted.load(Ordering::Relaxed),
            chunks_emitted: self.chunks_emitted.load(Ordering::Relaxed),
            chunks_flagged: self.chunks_flagged.load(Ordering::Relaxed),
            queries_served: self.queries_served.load(Ordering::Relaxed),
        }
    }
}

/// Immutable view of the counters used for reporting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct MetricsSnapshot {
    /// Documents ingested since startup.
    pub documents_ingested: u64,
    /// Documents skipped because they could not be read.
    pub documents_failed: u64,
    /// Pages or sheets extracted across all documents.
    pub pages_extracted: u64,
    /// Chunks produced across all documents.
    pub chunks_emitted: u64,
    /// Chunks the flagging gate marked for review.
    pub chunks_flagged: u64,
    /// Queries answered since startup.
    pub queries_served: u64,
}
