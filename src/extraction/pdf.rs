//! Born-digital PDF text extraction backed by `lopdf`.

use crate::extraction::engine::NativeExtractor;
use crate::extraction::types::{EngineError, ExtractionError};
use lopdf::Document;
use std::path::Path;

/// Reads the text layer of PDF pages.
#[derive(Debug, Default, Clone, Copy)]
pub struct LopdfExtractor;

impl LopdfExtractor {
    /// Create a new extractor.
    pub const fn new() -> Self {
        Self
    }
}

impl NativeExtractor for LopdfExtractor {
    fn extract_pages(&self, path: &Path) -> Result<Vec<Result<String, EngineError>>, ExtractionError> {
        let doc = Document::load(path).map_err(|error| ExtractionError::Pdf {
            path: path.to_path_buf(),
            message: error.to_string(),
        })?;

        let pages = doc.get_pages();
        if pages.is_empty() {
            return Err(ExtractionError::Pdf {
                path: path.to_path_buf(),
                message: "document has no pages".into(),
            });
        }

        // Page numbers from get_pages are 1-based and contiguous in document order.
        let texts = pages
            .keys()
            .map(|page_no| {
                doc.extract_text(&[*page_no])
                    .map_err(|error| EngineError::Native(format!("page {page_no}: {error}")))
            })
            .collect();
        Ok(texts)
    }
}
