//! Normalisation applied to every accepted page text before segmentation.

use crate::quality::ScriptProfile;
use regex::Regex;
use std::sync::LazyLock;
use unicode_normalization::UnicodeNormalization;

static HYPHEN_BREAK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([A-Za-z0-9])-\n([A-Za-z0-9])").expect("valid hyphen regex"));
static EXCESS_BLANK_LINES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n{3,}").expect("valid blank line regex"));
static INLINE_SPACE_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[ \t]+").expect("valid space regex"));

/// Clean raw engine text for indexing.
pub fn clean_text(raw: &str, script: &ScriptProfile) -> String {
    let unified = raw.replace("\r\n", "\n").replace('\r', "\n");
    let normalized: String = unified
        .nfc()
        .filter_map(|c| match c {
            '\u{00A0}' => Some(' '),
            '\u{200B}'..='\u{200D}' | '\u{FEFF}' => None,
            '\n' | '\t' => Some(c),
            c if c.is_control() => None,
            c => Some(c),
        })
        .collect();

    let lines: Vec<String> = normalized
        .split('\n')
        .map(|line| INLINE_SPACE_RUN.replace_all(line, " ").trim().to_string())
        .collect();
    let joined = lines.join("\n");

    let dehyphenated = HYPHEN_BREAK.replace_all(&joined, "$1$2");
    let collapsed = EXCESS_BLANK_LINES.replace_all(&dehyphenated, "\n\n");

    let spaced = if script.collapse_inner_spaces {
        collapse_inner_spaces(&collapsed, script)
    } else {
        collapsed.into_owned()
    };
    spaced.trim().to_string()
}

/// Remove spaces and tabs sitting between two characters of the target script.
fn collapse_inner_spaces(text: &str, script: &ScriptProfile) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut index = 0;
    while index < chars.len() {
        let c = chars[index];
        if c == ' ' || c == '\t' {
            let run_end = chars[index..]
                .iter()
                .position(|next| *next != ' ' && *next != '\t')
                .map(|offset| index + offset)
                .unwrap_or(chars.len());
            let before = out.chars().next_back();
            let after = chars.get(run_end).copied();
            let between_script = matches!((before, after), (Some(b), Some(a)) if script.contains(b) && script.contains(a));
            if !between_script {
                out.push(' ');
            }
            index = run_end;
            continue;
        }
        out.push(c);
        index += 1;
    }
    out
}
