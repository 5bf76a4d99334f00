#![deny(missing_docs)]

//! Quality-gated Thai/English document ingestion with hybrid lexical and semantic retrieval.

/// HTTP routing and REST handlers.
pub mod api;
/// Service construction from configuration.
pub mod app;
/// Token-bounded chunk assembly.
pub mod chunking;
/// Environment-driven configuration management.
pub mod config;
/// Embedding client abstraction and adapters.
pub mod embedding;
/// Multi-engine text extraction.
pub mod extraction;
/// Chunk validation, identifiers and review routing.
pub mod gate;
/// Optional answer generation.
pub mod generation;
/// Storage seams for the dense and lexical indices.
pub mod index;
/// Ingestion runs and reprocessing of flagged pages.
pub mod ingest;
/// Embedded Tantivy lexical index.
pub mod lexical;
/// Structured logging and tracing setup.
pub mod logging;
/// Ingestion and query counters.
pub mod metrics;
/// Qdrant vector store integration.
pub mod qdrant;
/// Text quality scoring and language hints.
pub mod quality;
/// JSON Lines artifacts.
pub mod records;
/// Hybrid retrieval, fusion and context packing.
pub mod retrieval;
/// Paragraph and sentence segmentation.
pub mod segment;
