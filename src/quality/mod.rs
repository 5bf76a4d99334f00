//! Text reliability scoring, script composition and language detection.
//!
//! Scores are cheap heuristics over characters; they decide whether a page needs OCR, which
//! OCR output to trust, and whether a finished chunk is fit for indexing.

/// Target writing system used by scoring, OCR hints and spacing normalisation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptProfile {
    /// Human readable name of the script.
    pub name: String,
    /// First code point of the script's Unicode block.
    pub range_start: char,
    /// Last code point of the script's Unicode block.
    pub range_end: char,
    /// OCR language code used when the text is purely in this script.
    pub ocr_language: String,
    /// Whether whitespace between two characters of this script is removed during cleaning.
    pub collapse_inner_spaces: bool,
}

impl ScriptProfile {
    /// Thai block (U+0E00 to U+0E7F) with the given OCR language code.
    pub fn thai(ocr_language: &str) -> Self {
        Self {
            name: "thai".into(),
            range_start: '\u{0E00}',
            range_end: '\u{0E7F}',
            ocr_language: ocr_language.to_string(),
            collapse_inner_spaces: true,
        }
    }

    /// Whether `c` belongs to the script's block.
    pub fn contains(&self, c: char) -> bool {
        (self.range_start..=self.range_end).contains(&c)
    }
}

impl Default for ScriptProfile {
    fn default() -> Self {
        Self::thai("tha")
    }
}

/// Ratio of alphanumeric (script-inclusive) characters to non-whitespace characters.
///
/// Returns `0.0` for empty or whitespace-only input. Combining marks of the target script
/// count as meaningful characters.
pub fn text_quality_score(text: &str, script: &ScriptProfile) -> f32 {
    let mut total = 0usize;
    let mut meaningful = 0usize;
    for c in text.chars().filter(|c| !c.is_whitespace()) {
        total += 1;
        if c.is_alphanumeric() || script.contains(c) {
            meaningful += 1;
        }
    }
    if total == 0 {
        return 0.0;
    }
    meaningful as f32 / total as f32
}

/// Share of target-script characters and Latin letters among non-whitespace characters.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ScriptRatios {
    /// Fraction of characters inside the target script block.
    pub target: f32,
    /// Fraction of ASCII Latin letters.
    pub latin: f32,
}

/// Compute [`ScriptRatios`] for `text`; both ratios are zero for empty input.
pub fn script_ratios(text: &str, script: &ScriptProfile) -> ScriptRatios {
    let mut total = 0usize;
    let mut target = 0usize;
    let mut latin = 0usize;
    for c in text.chars().filter(|c| !c.is_whitespace()) {
        total += 1;
        if script.contains(c) {
            target += 1;
        } else if c.is_ascii_alphabetic() {
            latin += 1;
        }
    }
    if total == 0 {
        return ScriptRatios::default();
    }
    ScriptRatios {
        target: target as f32 / total as f32,
        latin: latin as f32 / total as f32,
    }
}

/// Pick the OCR language hint for a document from a short preview of its text.
///
/// A Latin share at or above `latin_threshold` widens the hint to `"<lang>+eng"`.
pub fn choose_language_hint(preview: &str, script: &ScriptProfile, latin_threshold: f32) -> String {
    let ratios = script_ratios(preview, script);
    if ratios.latin >= latin_threshold && !script.ocr_language.contains("eng") {
        format!("{}+eng", script.ocr_language)
    } else {
        script.ocr_language.clone()
    }
}

/// Detect the dominant language of `text` as an ISO 639-3 code.
pub fn detect_language(text: &str) -> Option<&'static str> {
    let info = whatlang::detect(text)?;
    Some(info.lang().code())
}

/// Similarity ratio in `[0, 1]` between two texts based on a character diff.
pub fn similarity(a: &str, b: &str) -> f32 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    similar::TextDiff::from_chars(a, b).ratio()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quality_score_of_empty_text_is_zero() {
        let script = ScriptProfile::default();
        assert_eq!(text_quality_score("", &script), 0.0);
        assert_eq!(text_quality_score("   \n\t", &script), 0.0);
    }

    #[test]
    fn quality_score_penalises_symbol_noise() {
        let script = ScriptProfile::default();
        assert!((text_quality_score("abcd", &script) - 1.0).abs() < f32::EPSILON);
        let noisy = text_quality_score("a#$%", &script);
        assert!((noisy - 0.25).abs() < f32::EPSILON);
    }

    #[test]
    fn thai_marks_count_as_meaningful() {
        let script = ScriptProfile::default();
        assert!((text_quality_score("สวัสดีครับ", &script) - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn script_ratios_split_thai_and_latin() {
        let script = ScriptProfile::default();
        let ratios = script_ratios("กขค abc 1", &script);
        assert!((ratios.target - 3.0 / 7.0).abs() < 1e-6);
        assert!((ratios.latin - 3.0 / 7.0).abs() < 1e-6);
        assert_eq!(script_ratios("", &script), ScriptRatios::default());
    }

    #[test]
    fn language_hint_widens_for_latin_heavy_previews() {
        let script = ScriptProfile::default();
        assert_eq!(choose_language_hint("ภาษาไทยล้วน", &script, 0.15), "tha");
        assert_eq!(
            choose_language_hint("รายงาน annual report", &script, 0.15),
            "tha+eng"
        );
        assert_eq!(choose_language_hint("", &script, 0.15), "tha");
    }

    #[test]
    fn detects_english_and_thai() {
        assert_eq!(
            detect_language("The quick brown fox jumps over the lazy dog near the river bank"),
            Some("eng")
        );
        assert_eq!(
            detect_language("ประเทศไทยมีประชากรประมาณหกสิบหกล้านคนและมีกรุงเทพเป็นเมืองหลวง"),
            Some("tha")
        );
    }

    #[test]
    fn similarity_is_symmetric_for_identical_text() {
        assert!((similarity("hello world", "hello world") - 1.0).abs() < f32::EPSILON);
        assert!(similarity("hello", "qqqqq") < 0.2);
    }
}
