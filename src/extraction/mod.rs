//! Multi-engine text extraction.
//!
//! Each PDF page is read from its native text layer first. Pages that come back empty, short or
//! noisy are escalated to OCR: the remote engine when enabled and the local engine when
//! available, with [`choose_ocr_output`] deciding between them. Engine failures only ever empty
//! a single page; file-level problems surface as [`ExtractionError`].

pub mod clean;
pub mod engine;
pub mod extractor;
pub mod local_ocr;
pub mod pdf;
pub mod raster;
pub mod remote_ocr;
pub mod sheet;
pub mod types;

pub use clean::clean_text;
pub use engine::{NativeExtractor, OcrEngine, choose_ocr_output};
pub use extractor::{
    ExtractionMode, ExtractionSettings, FileExtractor, FileKind, PageExtractor, ReextractedPage,
    resolve_source,
};
pub use local_ocr::TesseractEngine;
pub use pdf::LopdfExtractor;
pub use raster::Rasterizer;
pub use remote_ocr::{RemoteOcrEngine, RemoteOcrSettings};
pub use types::{
    EngineError, EngineOutput, EngineResult, ExtractionError, ExtractionMethod, PageRecord, PageText,
};
