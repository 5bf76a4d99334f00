//! Page-level orchestration of the native and OCR engines, plus per-format file readers.

use crate::extraction::clean::clean_text;
use crate::extraction::engine::{NativeExtractor, OcrEngine, choose_ocr_output, run_ocr, usable};
use crate::extraction::sheet::read_sheets;
use crate::extraction::types::{EngineOutput, ExtractionError, ExtractionMethod, PageRecord, PageText};
use crate::quality::{ScriptProfile, choose_language_hint, text_quality_score};
use crate::segment::{PatternSet, split_paragraphs};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

/// Whether PDFs are extracted page by page or as one document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractionMode {
    /// Escalate to OCR independently for each page.
    #[default]
    Page,
    /// Extract the whole document at once; output is a single record.
    Document,
}

impl FromStr for ExtractionMode {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "page" => Ok(Self::Page),
            "document" | "whole" => Ok(Self::Document),
            _ => Err(()),
        }
    }
}

/// Thresholds driving OCR escalation and engine choice.
#[derive(Debug, Clone)]
pub struct ExtractionSettings {
    /// Native text shorter than this escalates to OCR.
    pub min_length: usize,
    /// Native text scoring below this escalates to OCR.
    pub min_quality_score: f32,
    /// Remote/local agreement at which the remote output is trusted.
    pub similarity_threshold: f32,
    /// Whole-document native score below which one OCR pass re-verifies it.
    pub reverify_below: f32,
    /// Latin share that widens the OCR language hint.
    pub latin_threshold: f32,
    /// Leading native characters inspected for the language hint.
    pub preview_chars: usize,
    /// Page or whole-document extraction.
    pub mode: ExtractionMode,
    /// Target writing system.
    pub script: ScriptProfile,
}

impl Default for ExtractionSettings {
    fn default() -> Self {
        Self {
            min_length: 50,
            min_quality_score: 0.2,
            similarity_threshold: 0.60,
            reverify_below: 0.1,
            latin_threshold: 0.15,
            preview_chars: 2000,
            mode: ExtractionMode::Page,
            script: ScriptProfile::default(),
        }
    }
}

/// Re-extracted page produced while reprocessing flagged chunks.
#[derive(Debug, Clone, PartialEq)]
pub struct ReextractedPage {
    /// 1-based page index.
    pub page_no: u32,
    /// Cleaned OCR text.
    pub text: String,
    /// Quality score of the cleaned text.
    pub quality: f32,
}

/// Chooses, per page, among the native text layer and the OCR engines.
pub struct PageExtractor {
    native: Arc<dyn NativeExtractor>,
    remote: Option<Arc<dyn OcrEngine>>,
    local: Option<Arc<dyn OcrEngine>>,
    settings: ExtractionSettings,
}

impl PageExtractor {
    /// Create an extractor with only the native engine.
    pub fn new(native: Arc<dyn NativeExtractor>, settings: ExtractionSettings) -> Self {
        Self {
            native,
            remote: None,
            local: None,
            settings,
        }
    }

    /// Attach the remote OCR engine.
    pub fn with_remote(mut self, engine: Arc<dyn OcrEngine>) -> Self {
        self.remote = Some(engine);
        self
    }

    /// Attach the local OCR engine.
    pub fn with_local(mut self, engine: Arc<dyn OcrEngine>) -> Self {
        self.local = Some(engine);
        self
    }

    /// Active settings.
    pub fn settings(&self) -> &ExtractionSettings {
        &self.settings
    }

    /// Extract every page of a PDF, escalating weak pages to OCR.
    pub async fn extract_pages(&self, path: &Path) -> Result<Vec<PageText>, ExtractionError> {
        let natives = self.native_pages(path).await?;
        let hint = self.language_hint(&natives);
        let script = &self.settings.script;
        let mut pages = Vec::with_capacity(natives.len());

        for (index, native) in natives.into_iter().enumerate() {
            let page_no = index as u32 + 1;
            let score = text_quality_score(native.trim(), script);
            let (method, raw) = if self.needs_ocr(&native, score) {
                tracing::debug!(page = page_no, score, "Escalating page to OCR");
                match self.ocr_page(path, page_no, &hint).await {
                    Some(output) => (output.engine, output.text),
                    None if !native.trim().is_empty() => (ExtractionMethod::Native, native),
                    None => (ExtractionMethod::None, String::new()),
                }
            } else {
                (ExtractionMethod::Native, native)
            };
            let text = clean_text(&raw, script);
            tracing::debug!(page = page_no, method = %method, chars = text.chars().count(), "Page extracted");
            pages.push(PageText { page_no, method, text });
        }
        Ok(pages)
    }

    /// Extract a PDF as one text, re-verifying very weak native text with a single OCR pass.
    pub async fn extract_document(&self, path: &Path) -> Result<PageText, ExtractionError> {
        let natives = self.native_pages(path).await?;
        let hint = self.language_hint(&natives);
        let page_count = natives.len() as u32;
        let script = &self.settings.script;

        let native_full = natives
            .iter()
            .map(|page| page.trim())
            .filter(|page| !page.is_empty())
            .collect::<Vec<_>>()
            .join("\n\n");
        let native_score = text_quality_score(&native_full, script);

        let (method, raw) = if native_full.is_empty() {
            match self.ocr_document(path, page_count, &hint).await {
                Some(output) => (output.engine, output.text),
                None => (ExtractionMethod::None, String::new()),
            }
        } else if native_score < self.settings.reverify_below {
            match self.ocr_document(path, page_count, &hint).await {
                Some(output) if output.quality > native_score => (output.engine, output.text),
                _ => (ExtractionMethod::Native, native_full),
            }
        } else {
            (ExtractionMethod::Native, native_full)
        };

        Ok(PageText {
            page_no: 1,
            method,
            text: clean_text(&raw, script),
        })
    }

    /// Re-run only `engine` on selected pages.
    pub async fn reextract_pages(
        &self,
        path: &Path,
        pages: &[u32],
        engine: ExtractionMethod,
    ) -> Result<Vec<ReextractedPage>, ExtractionError> {
        let selected = match engine {
            ExtractionMethod::RemoteOcr => self.remote.as_ref(),
            ExtractionMethod::LocalOcr => self.local.as_ref(),
            _ => None,
        }
        .ok_or(ExtractionError::EngineUnavailable(engine))?;

        let hint = match self.native_pages(path).await {
            Ok(natives) => self.language_hint(&natives),
            Err(_) => self.settings.script.ocr_language.clone(),
        };
        let script = &self.settings.script;

        let mut results = Vec::with_capacity(pages.len());
        for &page_no in pages {
            let output = usable(
                run_ocr(selected.as_ref(), path, page_no, &hint, script).await,
                page_no,
            );
            let text = output
                .map(|output| clean_text(&output.text, script))
                .unwrap_or_default();
            let quality = text_quality_score(&text, script);
            results.push(ReextractedPage {
                page_no,
                text,
                quality,
            });
        }
        Ok(results)
    }

    fn needs_ocr(&self, native: &str, score: f32) -> bool {
        let trimmed = native.trim();
        trimmed.is_empty()
            || trimmed.chars().count() < self.settings.min_length
            || score < self.settings.min_quality_score
    }

    async fn native_pages(&self, path: &Path) -> Result<Vec<String>, ExtractionError> {
        let native = Arc::clone(&self.native);
        let owned = path.to_path_buf();
        let pages = tokio::task::spawn_blocking(move || native.extract_pages(&owned))
            .await
            .map_err(|error| ExtractionError::Task(error.to_string()))??;

        Ok(pages
            .into_iter()
            .enumerate()
            .map(|(index, page)| {
                page.unwrap_or_else(|error| {
                    tracing::warn!(path = %path.display(), page = index + 1, error = %error, "Native extraction failed");
                    String::new()
                })
            })
            .collect())
    }

    fn language_hint(&self, natives: &[String]) -> String {
        let preview: String = natives
            .iter()
            .flat_map(|page| page.chars())
            .take(self.settings.preview_chars)
            .collect();
        choose_language_hint(&preview, &self.settings.script, self.settings.latin_threshold)
    }

    async fn ocr_page(&self, path: &Path, page_no: u32, hint: &str) -> Option<EngineOutput> {
        let script = &self.settings.script;
        let remote = async {
            match &self.remote {
                Some(engine) => usable(run_ocr(engine.as_ref(), path, page_no, hint, script).await, page_no),
                None => None,
            }
        };
        let local = async {
            match &self.local {
                Some(engine) => usable(run_ocr(engine.as_ref(), path, page_no, hint, script).await, page_no),
                None => None,
            }
        };
        let (remote, local) = tokio::join!(remote, local);
        choose_ocr_output(remote, local, self.settings.similarity_threshold)
    }

    async fn ocr_document(&self, path: &Path, page_count: u32, hint: &str) -> Option<EngineOutput> {
        let engine = self.remote.as_ref().or(self.local.as_ref())?;
        let script = &self.settings.script;
        let mut texts = Vec::new();
        for page_no in 1..=page_count {
            if let Some(output) = usable(run_ocr(engine.as_ref(), path, page_no, hint, script).await, page_no) {
                texts.push(output.text.trim().to_string());
            }
        }
        if texts.is_empty() {
            return None;
        }
        let text = texts.join("\n\n");
        let quality = text_quality_score(&text, script);
        Some(EngineOutput {
            engine: engine.method(),
            text,
            quality,
        })
    }
}

/// Supported input formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    /// PDF documents.
    Pdf,
    /// Excel or OpenDocument workbooks.
    Spreadsheet,
    /// Plain text or markdown.
    Text,
}

impl FileKind {
    /// Classify a path by extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        let extension = path.extension()?.to_str()?.to_lowercase();
        match extension.as_str() {
            "pdf" => Some(Self::Pdf),
            "xlsx" | "xlsm" | "xls" | "ods" => Some(Self::Spreadsheet),
            "txt" | "md" => Some(Self::Text),
            _ => None,
        }
    }

    /// File type label stored on chunks.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Spreadsheet => "excel",
            Self::Text => "txt",
        }
    }
}

/// Turns any supported file into page records.
pub struct FileExtractor {
    pages: PageExtractor,
    patterns: PatternSet,
}

impl FileExtractor {
    /// Combine a page extractor with the paragraph patterns used to segment its output.
    pub fn new(pages: PageExtractor, patterns: PatternSet) -> Self {
        Self { pages, patterns }
    }

    /// Underlying page extractor.
    pub fn page_extractor(&self) -> &PageExtractor {
        &self.pages
    }

    /// Paragraph patterns.
    pub fn patterns(&self) -> &PatternSet {
        &self.patterns
    }

    /// Extract a file into records, one per page or sheet.
    pub async fn extract_file(&self, path: &Path) -> Result<Vec<PageRecord>, ExtractionError> {
        let kind = FileKind::from_path(path).ok_or_else(|| ExtractionError::Unsupported(path.to_path_buf()))?;
        let source = resolve_source(path);
        let script = &self.pages.settings().script;

        let records = match kind {
            FileKind::Pdf => {
                let pages = match self.pages.settings().mode {
                    ExtractionMode::Page => self.pages.extract_pages(path).await?,
                    ExtractionMode::Document => vec![self.pages.extract_document(path).await?],
                };
                pages
                    .into_iter()
                    .map(|page| PageRecord {
                        source: source.clone(),
                        page_no: page.page_no,
                        method: page.method,
                        sheet: None,
                        paragraphs: split_paragraphs(&page.text, &self.patterns),
                        text: page.text,
                    })
                    .collect()
            }
            FileKind::Spreadsheet => {
                let owned = path.to_path_buf();
                let sheets = tokio::task::spawn_blocking(move || read_sheets(&owned))
                    .await
                    .map_err(|error| ExtractionError::Task(error.to_string()))??;
                sheets
                    .into_iter()
                    .enumerate()
                    .map(|(index, sheet)| {
                        let text = clean_text(&sheet.text, script);
                        let paragraphs = if text.is_empty() { Vec::new() } else { vec![text.clone()] };
                        PageRecord {
                            source: source.clone(),
                            page_no: index as u32 + 1,
                            method: ExtractionMethod::Sheet,
                            sheet: Some(sheet.name),
                            text,
                            paragraphs,
                        }
                    })
                    .collect()
            }
            FileKind::Text => {
                let bytes = tokio::fs::read(path).await.map_err(|source| ExtractionError::Io {
                    path: path.to_path_buf(),
                    source,
                })?;
                let text = clean_text(&String::from_utf8_lossy(&bytes), script);
                vec![PageRecord {
                    source: source.clone(),
                    page_no: 1,
                    method: ExtractionMethod::Text,
                    sheet: None,
                    paragraphs: split_paragraphs(&text, &self.patterns),
                    text,
                }]
            }
        };

        tracing::info!(path = %source, kind = kind.label(), records = records.len(), "File extracted");
        Ok(records)
    }
}

/// Absolute, symlink-resolved path when available; the given path otherwise.
pub fn resolve_source(path: &Path) -> String {
    std::fs::canonicalize(path)
        .unwrap_or_else(|_| PathBuf::from(path))
        .to_string_lossy()
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extraction::types::EngineError;
    use async_trait::async_trait;
    use std::collections::HashMap;

    struct FixedNative(Vec<Result<String, EngineError>>);

    impl NativeExtractor for FixedNative {
        fn extract_pages(&self, _path: &Path) -> Result<Vec<Result<String, EngineError>>, ExtractionError> {
            Ok(self
                .0
                .iter()
                .map(|page| match page {
                    Ok(text) => Ok(text.clone()),
                    Err(error) => Err(EngineError::Native(error.to_string())),
                })
                .collect())
        }
    }

    struct FixedOcr {
        method: ExtractionMethod,
        pages: HashMap<u32, String>,
    }

    #[async_trait]
    impl OcrEngine for FixedOcr {
        fn method(&self) -> ExtractionMethod {
            self.method
        }

        async fn ocr_page(&self, _path: &Path, page_no: u32, _language: &str) -> Result<String, EngineError> {
            self.pages.get(&page_no).cloned().ok_or(EngineError::Timeout {
                engine: self.method,
                seconds: 1,
            })
        }
    }

    fn ocr(method: ExtractionMethod, pages: &[(u32, &str)]) -> Arc<dyn OcrEngine> {
        Arc::new(FixedOcr {
            method,
            pages: pages.iter().map(|(page, text)| (*page, text.to_string())).collect(),
        })
    }

    const GOOD_NATIVE: &str = "Annual report for the fiscal year with revenue and expense details.";

    #[tokio::test]
    async fn good_native_pages_skip_ocr() {
        let extractor = PageExtractor::new(
            Arc::new(FixedNative(vec![Ok(GOOD_NATIVE.into())])),
            ExtractionSettings::default(),
        )
        .with_local(ocr(ExtractionMethod::LocalOcr, &[(1, "ocr text that should not be used")]));

        let pages = extractor.extract_pages(Path::new("doc.pdf")).await.expect("pages");
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].method, ExtractionMethod::Native);
        assert_eq!(pages[0].text, GOOD_NATIVE);
    }

    #[tokio::test]
    async fn empty_native_page_escalates_to_local_ocr() {
        let extractor = PageExtractor::new(
            Arc::new(FixedNative(vec![Ok(String::new()), Ok(GOOD_NATIVE.into())])),
            ExtractionSettings::default(),
        )
        .with_local(ocr(ExtractionMethod::LocalOcr, &[(1, "scanned   page text")]));

        let pages = extractor.extract_pages(Path::new("doc.pdf")).await.expect("pages");
        assert_eq!(pages[0].method, ExtractionMethod::LocalOcr);
        assert_eq!(pages[0].text, "scanned page text");
        assert_eq!(pages[1].method, ExtractionMethod::Native);
    }

    #[tokio::test]
    async fn failing_engines_leave_page_empty_without_aborting() {
        let extractor = PageExtractor::new(
            Arc::new(FixedNative(vec![Err(EngineError::Native("broken".into())), Ok(GOOD_NATIVE.into())])),
            ExtractionSettings::default(),
        )
        .with_remote(ocr(ExtractionMethod::RemoteOcr, &[]))
        .with_local(ocr(ExtractionMethod::LocalOcr, &[]));

        let pages = extractor.extract_pages(Path::new("doc.pdf")).await.expect("pages");
        assert_eq!(pages.len(), 2);
        assert_eq!(pages[0].method, ExtractionMethod::None);
        assert!(pages[0].text.is_empty());
        assert_eq!(pages[1].text, GOOD_NATIVE);
    }

    #[tokio::test]
    async fn short_native_text_is_kept_when_no_ocr_output_exists() {
        let extractor = PageExtractor::new(
            Arc::new(FixedNative(vec![Ok("Page 3".into())])),
            ExtractionSettings::default(),
        );
        let pages = extractor.extract_pages(Path::new("doc.pdf")).await.expect("pages");
        assert_eq!(pages[0].method, ExtractionMethod::Native);
        assert_eq!(pages[0].text, "Page 3");
    }

    #[tokio::test]
    async fn document_mode_reverifies_weak_native_text() {
        let extractor = PageExtractor::new(
            Arc::new(FixedNative(vec![Ok("#### @@@@ ~~~~".into()), Ok("%%%% ^^^^".into())])),
            ExtractionSettings::default(),
        )
        .with_local(ocr(ExtractionMethod::LocalOcr, &[(1, "first page"), (2, "second page")]));

        let document = extractor.extract_document(Path::new("doc.pdf")).await.expect("document");
        assert_eq!(document.page_no, 1);
        assert_eq!(document.method, ExtractionMethod::LocalOcr);
        assert_eq!(document.text, "first page\n\nsecond page");
    }

    #[tokio::test]
    async fn reextract_requires_configured_engine() {
        let extractor = PageExtractor::new(
            Arc::new(FixedNative(vec![Ok(String::new())])),
            ExtractionSettings::default(),
        )
        .with_local(ocr(ExtractionMethod::LocalOcr, &[(1, "clean rescan of the page")]));

        let error = extractor
            .reextract_pages(Path::new("doc.pdf"), &[1], ExtractionMethod::RemoteOcr)
            .await
            .expect_err("remote missing");
        assert!(matches!(error, ExtractionError::EngineUnavailable(ExtractionMethod::RemoteOcr)));

        let pages = extractor
            .reextract_pages(Path::new("doc.pdf"), &[1], ExtractionMethod::LocalOcr)
            .await
            .expect("pages");
        assert_eq!(pages[0].text, "clean rescan of the page");
        assert!(pages[0].quality > 0.9);
    }

    #[tokio::test]
    async fn text_files_become_single_segmented_record() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, "First paragraph here.\n\nSecond paragraph here.").expect("write");

        let extractor = FileExtractor::new(
            PageExtractor::new(Arc::new(FixedNative(Vec::new())), ExtractionSettings::default()),
            PatternSet::default(),
        );
        let records = extractor.extract_file(&path).await.expect("records");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].method, ExtractionMethod::Text);
        assert_eq!(records[0].paragraphs.len(), 2);
        assert!(records[0].source.ends_with("notes.txt"));
    }

    #[tokio::test]
    async fn unsupported_extension_is_rejected() {
        let extractor = FileExtractor::new(
            PageExtractor::new(Arc::new(FixedNative(Vec::new())), ExtractionSettings::default()),
            PatternSet::default(),
        );
        let error = extractor
            .extract_file(Path::new("image.bmp"))
            .await
            .expect_err("unsupported");
        assert!(matches!(error, ExtractionError::Unsupported(_)));
    }

    #[test]
    fn file_kinds_follow_extensions() {
        assert_eq!(FileKind::from_path(Path::new("a/B.PDF")), Some(FileKind::Pdf));
        assert_eq!(FileKind::from_path(Path::new("sheet.xlsx")), Some(FileKind::Spreadsheet));
        assert_eq!(FileKind::from_path(Path::new("readme")), None);
        assert_eq!(FileKind::Spreadsheet.label(), "excel");
    }
}
