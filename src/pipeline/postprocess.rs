//! Post-processing: deterministic cleanup of extracted text and model output.
//!
//! ## Why is post-processing necessary?
//!
//! Embedded PDF text arrives with hard-wrapped runs of spaces, soft hyphens
//! and zero-width characters; OCR output repeats lines the embedded text
//! already holds; and small local models wrap their answers in
//! ` ```markdown ` fences or pad them with blank lines. Fixing these with
//! cheap string rules keeps the prompts about *what to summarise* and keeps
//! chunk sizes honest, since every stray character counts against the budget.
//!
//! ## Rule Order
//!
//! Line endings are normalised before anything works line by line, and fences
//! are stripped before trimming so the fence regex sees the raw answer.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

/// Clean a model answer (chunk summary or final summary).
///
/// Rules (applied in order):
/// 1. Strip outer markdown fences
/// 2. Normalise line endings (CRLF → LF)
/// 3. Trim trailing whitespace per line
/// 4. Collapse 3+ consecutive blank lines down to 1
/// 5. Strip invisible Unicode (zero-width spaces, BOM, soft hyphens)
/// 6. Trim outer whitespace
pub fn clean_summary(input: &str) -> String {
    let s = strip_markdown_fences(input);
    let s = normalise_line_endings(&s);
    let s = trim_trailing_whitespace(&s);
    let s = collapse_blank_lines(&s);
    let s = remove_invisible_chars(&s);
    s.trim().to_string()
}

/// Clean text pulled from a PDF text layer or OCR.
///
/// Rules (applied in order):
/// 1. Normalise line endings
/// 2. Strip invisible Unicode
/// 3. Collapse runs of spaces/tabs to one space
/// 4. Trim each line
/// 5. Collapse 3+ consecutive blank lines down to 1
/// 6. Trim outer whitespace
pub fn clean_extracted_text(input: &str) -> String {
    let s = normalise_line_endings(input);
    let s = remove_invisible_chars(&s);
    let s = RE_INLINE_SPACE.replace_all(&s, " ");
    let s = s.lines().map(str::trim).collect::<Vec<_>>().join("\n");
    let s = collapse_blank_lines(&s);
    s.trim().to_string()
}

/// Append OCR lines not already present in `embedded`.
///
/// Lines are compared case- and whitespace-insensitively; blank OCR lines
/// and OCR lines repeated within the OCR output are dropped. Returns the
/// merged text and the number of OCR lines that were added.
pub fn merge_ocr_lines(embedded: &str, ocr: &str) -> (String, usize) {
    let mut seen: HashSet<String> = embedded
        .lines()
        .map(line_key)
        .filter(|k| !k.is_empty())
        .collect();

    let extra: Vec<&str> = ocr
        .lines()
        .map(str::trim)
        .filter(|line| {
            let key = line_key(line);
            !key.is_empty() && seen.insert(key)
        })
        .collect();

    let added = extra.len();
    let merged = match (embedded.trim().is_empty(), extra.is_empty()) {
        (_, true) => embedded.trim().to_string(),
        (true, false) => extra.join("\n"),
        (false, false) => format!("{}\n\n{}", embedded.trim(), extra.join("\n")),
    };
    (merged, added)
}

fn line_key(line: &str) -> String {
    line.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

// ── Rule: Strip outer markdown fences ────────────────────────────────────

static RE_OUTER_FENCES: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)^```(?:markdown|md|text)?\r?\n(.*)\r?\n```\s*$").unwrap()
});

fn strip_markdown_fences(input: &str) -> String {
    if let Some(caps) = RE_OUTER_FENCES.captures(input.trim()) {
        caps[1].to_string()
    } else {
        input.to_string()
    }
}

// ── Rule: Normalise line endings ─────────────────────────────────────────

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

// ── Rule: Trim trailing whitespace per line ──────────────────────────────

fn trim_trailing_whitespace(input: &str) -> String {
    input
        .lines()
        .map(|line| line.trim_end())
        .collect::<Vec<_>>()
        .join("\n")
}

// ── Rule: Collapse excessive blank lines ─────────────────────────────────

static RE_BLANK_LINES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\n{3,}").unwrap());

fn collapse_blank_lines(input: &str) -> String {
    RE_BLANK_LINES.replace_all(input, "\n\n").to_string()
}

// ── Rule: Collapse inline whitespace ─────────────────────────────────────

static RE_INLINE_SPACE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[ \t\x{00A0}]{2,}|\t").unwrap());

// ── Rule: Remove invisible Unicode characters ────────────────────────────

fn remove_invisible_chars(input: &str) -> String {
    input.replace(
        [
            '\u{200B}', '\u{FEFF}', '\u{00AD}', '\u{200C}', '\u{200D}', '\u{2060}',
        ],
        "",
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_markdown_fences() {
        let input = "```markdown\n## Summary\n\nAll good.\n```";
        assert_eq!(clean_summary(input), "## Summary\n\nAll good.");
    }

    #[test]
    fn keeps_inner_code_fences() {
        let input = "Intro\n\n```\ncode\n```\n\nOutro";
        assert_eq!(clean_summary(input), input);
    }

    #[test]
    fn normalises_crlf_and_blank_lines() {
        let input = "Line 1\r\n\r\n\r\n\r\nLine 2   \r\n";
        assert_eq!(clean_summary(input), "Line 1\n\nLine 2");
    }

    #[test]
    fn removes_invisible_chars() {
        assert_eq!(clean_summary("\u{FEFF}Bud\u{00AD}get\u{200B}"), "Budget");
    }

    #[test]
    fn extracted_text_collapses_spacing() {
        let input = "  Revenue    grew\t\t4%  \n\n\n\n  Costs   fell  ";
        assert_eq!(clean_extracted_text(input), "Revenue grew 4%\n\nCosts fell");
    }

    #[test]
    fn extracted_text_blank_stays_blank() {
        assert_eq!(clean_extracted_text(" \n\t\n \u{200B}"), "");
    }

    #[test]
    fn merge_adds_only_new_ocr_lines() {
        let embedded = "Quarterly Report\nRevenue: 10M";
        let ocr = "QUARTERLY   REPORT\nRevenue: 10M\nSigned: J. Smith\n\nSigned: J. Smith";
        let (merged, added) = merge_ocr_lines(embedded, ocr);
        assert_eq!(added, 1);
        assert_eq!(merged, "Quarterly Report\nRevenue: 10M\n\nSigned: J. Smith");
    }

    #[test]
    fn merge_with_empty_embedded_text() {
        let (merged, added) = merge_ocr_lines("  ", "a\nb");
        assert_eq!((merged.as_str(), added), ("a\nb", 2));
    }

    #[test]
    fn merge_without_new_lines_keeps_embedded() {
        let (merged, added) = merge_ocr_lines("Same line", "same   LINE");
        assert_eq!((merged.as_str(), added), ("Same line", 0));
    }
}
