//! Post-processing: deterministic cleanup of a raw slice transcript.
//!
//! ## Why is post-processing necessary?
//!
//! Even well-prompted VLMs occasionally add artefacts that have nothing to
//! do with the image:
//!
//! - Wrapping the answer in ` ```latex ... ``` ` fences despite the prompt
//!   saying not to
//! - Using Windows-style `\r\n` line endings
//! - Emitting zero-width spaces or a BOM that later break LaTeX parsing
//!
//! These rules run on every slice *before* the overlap reconciler, because
//! the reconciler compares slice text and a fence line or a stray BOM at the
//! start of a slice would hide a genuine overlap.
//!
//! ## Rule Order
//!
//! Fences are stripped first so the fence line is not mistaken for content;
//! line endings are normalised before whitespace trimming so `\r` does not
//! count as trailing text.

use once_cell::sync::Lazy;
use regex::Regex;

/// Apply all cleanup rules to a raw slice transcript.
///
/// Rules (applied in order):
/// 1. Strip an outer code fence (` ``` `, ` ```markdown `, ` ```md `,
///    ` ```latex `, ` ```text `)
/// 2. Normalise line endings (CRLF → LF)
/// 3. Trim trailing whitespace per line
/// 4. Collapse 3+ consecutive blank lines down to 2
/// 5. Strip invisible Unicode (zero-width spaces, BOM, soft hyphens, etc.)
/// 6. Ensure the text ends with exactly one newline
pub fn clean_transcript(input: &str) -> String {
    let s = strip_outer_fence(input);
    let s = normalise_line_endings(&s);
    let s = trim_trailing_whitespace(&s);
    let s = collapse_blank_lines(&s);
    let s = remove_invisible_chars(&s);
    ensure_final_newline(&s)
}

// ── Rule 1: Strip outer fence ────────────────────────────────────────────────

static RE_OUTER_FENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)^```(?:markdown|md|latex|tex|text)?[ \t]*\r?\n(.*?)\r?\n```\s*$").unwrap()
});

fn strip_outer_fence(input: &str) -> String {
    match RE_OUTER_FENCE.captures(input.trim()) {
        Some(caps) => caps[1].to_string(),
        None => input.to_string(),
    }
}

// ── Rule 2: Normalise line endings ───────────────────────────────────────────

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

// ── Rule 3: Trim trailing whitespace per line ────────────────────────────────

fn trim_trailing_whitespace(input: &str) -> String {
    input
        .lines()
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n")
}

// ── Rule 4: Collapse blank lines ─────────────────────────────────────────────

static RE_MANY_NEWLINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{4,}").unwrap());

fn collapse_blank_lines(input: &str) -> String {
    RE_MANY_NEWLINES.replace_all(input, "\n\n\n").into_owned()
}

// ── Rule 5: Invisible characters ─────────────────────────────────────────────

/// Zero-width space, ZWNJ, ZWJ, word joiner, BOM, soft hyphen.
const INVISIBLE: &[char] = &[
    '\u{200B}', '\u{200C}', '\u{200D}', '\u{2060}', '\u{FEFF}', '\u{00AD}',
];

fn remove_invisible_chars(input: &str) -> String {
    input.chars().filter(|c| !INVISIBLE.contains(c)).collect()
}

// ── Rule 6: Final newline ────────────────────────────────────────────────────

fn ensure_final_newline(input: &str) -> String {
    let trimmed = input.trim_end_matches('\n');
    if trimmed.trim().is_empty() {
        return String::new();
    }
    format!("{trimmed}\n")
}
