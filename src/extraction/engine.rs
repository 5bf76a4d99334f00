//! Engine seams and the pure OCR selection policy.

use crate::extraction::types::{EngineError, EngineOutput, EngineResult, ExtractionError, ExtractionMethod};
use crate::quality::{ScriptProfile, similarity, text_quality_score};
use async_trait::async_trait;
use std::path::Path;

/// Born-digital text extractor. Loads a document once and yields one result per page.
pub trait NativeExtractor: Send + Sync {
    /// Extract every page's text layer; the outer error means the file itself is unreadable.
    fn extract_pages(&self, path: &Path) -> Result<Vec<Result<String, EngineError>>, ExtractionError>;
}

/// OCR engine operating on one page at a time.
#[async_trait]
pub trait OcrEngine: Send + Sync {
    /// Tag recorded for text produced by this engine.
    fn method(&self) -> ExtractionMethod;

    /// Recognise the text of a 1-based page using the given language hint.
    async fn ocr_page(&self, path: &Path, page_no: u32, language: &str) -> Result<String, EngineError>;
}

/// Run `engine` on one page and score its output.
pub async fn run_ocr(
    engine: &dyn OcrEngine,
    path: &Path,
    page_no: u32,
    language: &str,
    script: &ScriptProfile,
) -> EngineResult {
    let text = engine.ocr_page(path, page_no, language).await?;
    let quality = text_quality_score(&text, script);
    Ok(EngineOutput {
        engine: engine.method(),
        text,
        quality,
    })
}

/// Keep a successful, non-empty engine output; failures are logged and dropped.
pub fn usable(result: EngineResult, page_no: u32) -> Option<EngineOutput> {
    match result {
        Ok(output) if !output.text.trim().is_empty() => Some(output),
        Ok(output) => {
            tracing::debug!(engine = %output.engine, page = page_no, "Engine returned no text");
            None
        }
        Err(error) => {
            tracing::warn!(page = page_no, error = %error, "OCR engine failed");
            None
        }
    }
}

/// Choose between remote and local OCR outputs.
///
/// With both present the remote output wins when the two agree (similarity at or above
/// `similarity_threshold`) or when it scores at least as well as the local output.
pub fn choose_ocr_output(
    remote: Option<EngineOutput>,
    local: Option<EngineOutput>,
    similarity_threshold: f32,
) -> Option<EngineOutput> {
    match (remote, local) {
        (Some(remote), Some(local)) => {
            let agreement = similarity(remote.text.trim(), local.text.trim());
            if agreement >= similarity_threshold || remote.quality >= local.quality {
                Some(remote)
            } else {
                Some(local)
            }
        }
        (Some(remote), None) => Some(remote),
        (None, Some(local)) => Some(local),
        (None, None) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn output(engine: ExtractionMethod, text: &str, quality: f32) -> EngineOutput {
        EngineOutput {
            engine,
            text: text.into(),
            quality,
        }
    }

    #[test]
    fn remote_wins_when_outputs_agree_even_with_lower_quality() {
        let remote = output(ExtractionMethod::RemoteOcr, "invoice number 1234 total", 0.5);
        let local = output(ExtractionMethod::LocalOcr, "invoice number 1284 total", 0.9);
        let chosen = choose_ocr_output(Some(remote), Some(local), 0.60).expect("choice");
        assert_eq!(chosen.engine, ExtractionMethod::RemoteOcr);
    }

    #[test]
    fn local_wins_when_outputs_disagree_and_local_scores_higher() {
        let remote = output(ExtractionMethod::RemoteOcr, "zzzzzzzzzz", 0.5);
        let local = output(ExtractionMethod::LocalOcr, "quarterly report", 0.9);
        let chosen = choose_ocr_output(Some(remote), Some(local), 0.60).expect("choice");
        assert_eq!(chosen.engine, ExtractionMethod::LocalOcr);
    }

    #[test]
    fn remote_wins_on_quality_even_when_outputs_disagree() {
        let remote = output(ExtractionMethod::RemoteOcr, "zzzzzzzzzz", 0.9);
        let local = output(ExtractionMethod::LocalOcr, "quarterly report", 0.9);
        let chosen = choose_ocr_output(Some(remote), Some(local), 0.60).expect("choice");
        assert_eq!(chosen.engine, ExtractionMethod::RemoteOcr);
    }

    #[test]
    fn single_output_is_accepted_and_none_yields_none() {
        let local = output(ExtractionMethod::LocalOcr, "text", 0.1);
        let chosen = choose_ocr_output(None, Some(local), 0.60).expect("choice");
        assert_eq!(chosen.engine, ExtractionMethod::LocalOcr);
        assert!(choose_ocr_output(None, None, 0.60).is_none());
    }

    #[test]
    fn empty_and_failed_outputs_are_not_usable() {
        assert!(usable(Ok(output(ExtractionMethod::LocalOcr, "  \n", 0.0)), 1).is_none());
        let failed = Err(EngineError::Timeout {
            engine: ExtractionMethod::LocalOcr,
            seconds: 5,
        });
        assert!(usable(failed, 1).is_none());
    }
}
