//! Local OCR through the `tesseract` command line tool.

use crate::extraction::engine::OcrEngine;
use crate::extraction::raster::{Rasterizer, run_process};
use crate::extraction::types::{EngineError, ExtractionMethod};
use async_trait::async_trait;
use std::path::Path;

/// Rasterises a page and pipes the PNG through `tesseract stdin stdout`.
pub struct TesseractEngine {
    program: String,
    rasterizer: Rasterizer,
}

impl TesseractEngine {
    /// Create an engine using the given `tesseract` executable.
    pub fn new(program: &str, rasterizer: Rasterizer) -> Self {
        Self {
            program: program.to_string(),
            rasterizer,
        }
    }
}

#[async_trait]
impl OcrEngine for TesseractEngine {
    fn method(&self) -> ExtractionMethod {
        ExtractionMethod::LocalOcr
    }

    async fn ocr_page(&self, path: &Path, page_no: u32, language: &str) -> Result<String, EngineError> {
        let png = self
            .rasterizer
            .render_png(ExtractionMethod::LocalOcr, path, page_no)
            .await?;
        let args = vec![
            "stdin".to_string(),
            "stdout".to_string(),
            "-l".to_string(),
            language.to_string(),
        ];
        let stdout = run_process(
            ExtractionMethod::LocalOcr,
            &self.program,
            &args,
            Some(png),
            self.rasterizer.timeout(),
        )
        .await?;
        let text = String::from_utf8_lossy(&stdout).into_owned();
        tracing::debug!(page = page_no, language, chars = text.chars().count(), "Tesseract page done");
        Ok(text)
    }
}
