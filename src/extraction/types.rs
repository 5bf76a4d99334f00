//! Records, engine outputs and error types shared by the extraction layer.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Engine or reader that produced a page's accepted text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExtractionMethod {
    /// Born-digital text layer.
    Native,
    /// Remote learned OCR service.
    RemoteOcr,
    /// Local Tesseract OCR.
    LocalOcr,
    /// Spreadsheet cells.
    Sheet,
    /// Plain text file.
    Text,
    /// No engine produced text.
    None,
}

impl ExtractionMethod {
    /// Stable tag used in records, quality entries and identifier scopes.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Native => "native",
            Self::RemoteOcr => "remote-ocr",
            Self::LocalOcr => "local-ocr",
            Self::Sheet => "sheet",
            Self::Text => "text",
            Self::None => "none",
        }
    }
}

impl fmt::Display for ExtractionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Extraction output for one page or sheet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageRecord {
    /// Resolved path of the source file.
    pub source: String,
    /// 1-based page (or sheet) index.
    pub page_no: u32,
    /// Engine that produced the accepted text.
    pub method: ExtractionMethod,
    /// Sheet name for spreadsheet records.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sheet: Option<String>,
    /// Cleaned page text.
    pub text: String,
    /// Paragraphs segmented from `text`.
    #[serde(default)]
    pub paragraphs: Vec<String>,
}

/// Accepted, cleaned text for one page before segmentation.
#[derive(Debug, Clone, PartialEq)]
pub struct PageText {
    /// 1-based page index.
    pub page_no: u32,
    /// Engine that produced the text.
    pub method: ExtractionMethod,
    /// Cleaned text; may be empty when every engine failed.
    pub text: String,
}

/// Successful output of a single engine run.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineOutput {
    /// Engine that produced the text.
    pub engine: ExtractionMethod,
    /// Raw (uncleaned) text.
    pub text: String,
    /// Quality score of `text`.
    pub quality: f32,
}

/// Uniform result of one engine invocation.
pub type EngineResult = Result<EngineOutput, EngineError>;

/// Failure of a single engine on a single unit. Never fatal to the document.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Engine is not configured or its binary cannot be started.
    #[error("{engine} engine unavailable: {reason}")]
    Unavailable {
        /// Engine tag.
        engine: ExtractionMethod,
        /// Why the engine could not run.
        reason: String,
    },
    /// Engine exceeded its time budget.
    #[error("{engine} engine timed out after {seconds}s")]
    Timeout {
        /// Engine tag.
        engine: ExtractionMethod,
        /// Configured budget in seconds.
        seconds: u64,
    },
    /// Subprocess exited unsuccessfully.
    #[error("{engine} process failed: {stderr}")]
    ProcessFailed {
        /// Engine tag.
        engine: ExtractionMethod,
        /// Captured standard error.
        stderr: String,
    },
    /// Remote service returned an error or an unreadable body.
    #[error("{engine} request failed: {message}")]
    Request {
        /// Engine tag.
        engine: ExtractionMethod,
        /// Status or decoding detail.
        message: String,
    },
    /// Native text layer could not be read for this page.
    #[error("native extraction failed: {0}")]
    Native(String),
}

/// File-level failure; the file is skipped and reported.
#[derive(Debug, Error)]
pub enum ExtractionError {
    /// File could not be read.
    #[error("failed to read {path}: {source}")]
    Io {
        /// File path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// File is corrupt or not a readable PDF.
    #[error("failed to open PDF {path}: {message}")]
    Pdf {
        /// File path.
        path: PathBuf,
        /// Parser message.
        message: String,
    },
    /// Spreadsheet could not be opened.
    #[error("failed to open spreadsheet {path}: {message}")]
    Spreadsheet {
        /// File path.
        path: PathBuf,
        /// Reader message.
        message: String,
    },
    /// Extension is not handled by any reader.
    #[error("unsupported file type: {0}")]
    Unsupported(PathBuf),
    /// The requested OCR engine is not configured.
    #[error("no {0} engine is configured")]
    EngineUnavailable(ExtractionMethod),
    /// Background extraction task panicked or was cancelled.
    #[error("extraction task failed: {0}")]
    Task(String),
}
