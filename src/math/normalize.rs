//! Unicode/LaTeX normalizer: deterministic repair of vision-model transcripts.
//!
//! ## Why normalize before segmenting?
//!
//! Vision models transcribe math reliably but not *canonically*. The same
//! page comes back with `∑` instead of `\sum`, with a stray backspace byte
//! where a JSON-escaped `\b` of `\bar` used to be, with `y_0 2` where the
//! image shows `y_0^2`. Each of these is either invisible in the final
//! document or a hard LaTeX parse failure, so they are repaired here, once,
//! before any formula is extracted.
//!
//! ## Rule Order
//!
//! Control characters go first because they break every later pattern. The
//! Unicode table runs before the `\bar` repair so that a `\bar{` produced
//! from a combining overline is already in canonical form. Fraction and
//! brace repairs only touch `$…$` spans and run last, after the caret rules
//! have settled which digits are exponents.
//!
//! Every rule is a no-op on its own output, so `normalize` is idempotent.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

/// Unicode math symbols and their LaTeX spelling.
///
/// Greek capitals that share a glyph with a Latin capital map to that Latin
/// letter: LaTeX has no `\Alpha`, and the rendered result is identical.
pub const UNICODE_TO_LATEX: &[(char, &str)] = &[
    // Large operators
    ('∑', r"\sum"),
    ('∏', r"\prod"),
    ('∫', r"\int"),
    ('∬', r"\iint"),
    ('∭', r"\iiint"),
    ('∮', r"\oint"),
    ('√', r"\sqrt"),
    ('∂', r"\partial"),
    ('∇', r"\nabla"),
    ('∞', r"\infty"),
    // Relations
    ('≈', r"\approx"),
    ('≠', r"\neq"),
    ('≡', r"\equiv"),
    ('≤', r"\leq"),
    ('≥', r"\geq"),
    ('≪', r"\ll"),
    ('≫', r"\gg"),
    ('∝', r"\propto"),
    ('∈', r"\in"),
    ('∉', r"\notin"),
    ('⊂', r"\subset"),
    ('⊃', r"\supset"),
    ('⊆', r"\subseteq"),
    ('⊇', r"\supseteq"),
    ('∪', r"\cup"),
    ('∩', r"\cap"),
    ('∅', r"\emptyset"),
    // Arrows
    ('→', r"\rightarrow"),
    ('←', r"\leftarrow"),
    ('⇒', r"\Rightarrow"),
    ('⇐', r"\Leftarrow"),
    ('⇔', r"\Leftrightarrow"),
    ('↔', r"\leftrightarrow"),
    // Logic
    ('∀', r"\forall"),
    ('∃', r"\exists"),
    ('¬', r"\neg"),
    ('∧', r"\wedge"),
    ('∨', r"\vee"),
    // Binary operators and misc
    ('×', r"\times"),
    ('÷', r"\div"),
    ('±', r"\pm"),
    ('∓', r"\mp"),
    ('⋅', r"\cdot"),
    ('·', r"\cdot"),
    ('∘', r"\circ"),
    ('−', "-"),
    ('′', "'"),
    ('″', "''"),
    ('⊥', r"\perp"),
    ('⟂', r"\perp"),
    ('∥', r"\parallel"),
    ('‖', r"\parallel"),
    ('∠', r"\angle"),
    ('△', r"\triangle"),
    ('°', r"^{\circ}"),
    // Greek lowercase
    ('α', r"\alpha"),
    ('β', r"\beta"),
    ('γ', r"\gamma"),
    ('δ', r"\delta"),
    ('ε', r"\epsilon"),
    ('ϵ', r"\epsilon"),
    ('ζ', r"\zeta"),
    ('η', r"\eta"),
    ('θ', r"\theta"),
    ('ϑ', r"\vartheta"),
    ('ι', r"\iota"),
    ('κ', r"\kappa"),
    ('λ', r"\lambda"),
    ('μ', r"\mu"),
    ('ν', r"\nu"),
    ('ξ', r"\xi"),
    ('ο', "o"),
    ('π', r"\pi"),
    ('ρ', r"\rho"),
    ('σ', r"\sigma"),
    ('ς', r"\varsigma"),
    ('τ', r"\tau"),
    ('υ', r"\upsilon"),
    ('φ', r"\phi"),
    ('ϕ', r"\phi"),
    ('χ', r"\chi"),
    ('ψ', r"\psi"),
    ('ω', r"\omega"),
    // Greek uppercase
    ('Α', "A"),
    ('Β', "B"),
    ('Γ', r"\Gamma"),
    ('Δ', r"\Delta"),
    ('Ε', "E"),
    ('Ζ', "Z"),
    ('Η', "H"),
    ('Θ', r"\Theta"),
    ('Ι', "I"),
    ('Κ', "K"),
    ('Λ', r"\Lambda"),
    ('Μ', "M"),
    ('Ν', "N"),
    ('Ξ', r"\Xi"),
    ('Ο', "O"),
    ('Π', r"\Pi"),
    ('Ρ', "P"),
    ('Σ', r"\Sigma"),
    ('Τ', "T"),
    ('Υ', r"\Upsilon"),
    ('Φ', r"\Phi"),
    ('Χ', "X"),
    ('Ψ', r"\Psi"),
    ('Ω', r"\Omega"),
];

/// Combining overline / macron placed after a letter (`x̄`).
const COMBINING_OVERLINES: &[char] = &['\u{0304}', '\u{0305}'];

/// Apply all normalization rules to a transcript.
///
/// Rules (applied in order):
/// 1. Strip ASCII control characters other than `\n`, `\r`, `\t`
/// 2. Replace Unicode math symbols with LaTeX commands
/// 3. Repair `ar{` (a `\bar{` whose `\b` was eaten) into `\bar{`
/// 4. Insert the missing caret in `y_0 2` and `y_02`
/// 5. Insert the missing underscore in `\bar{x}1`
/// 6. Rewrite `(a)/(b)` as `\frac{a}{b}` inside math spans
/// 7. Brace multi-character scripts (`x^23` → `x^{23}`) inside math spans
pub fn normalize(text: &str) -> String {
    let s = strip_control_chars(text);
    let s = replace_unicode_symbols(&s);
    let s = repair_bar_command(&s);
    let s = repair_missing_caret(&s);
    let s = repair_bar_subscript(&s);
    let s = map_math_spans(&s, repair_text_fractions);
    map_math_spans(&s, brace_multichar_scripts)
}

// ── Rule 1: Strip control characters ─────────────────────────────────────────

static RE_CONTROL_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[\x00-\x08\x0B\x0C\x0E-\x1F\x7F]").unwrap());

fn strip_control_chars(input: &str) -> String {
    RE_CONTROL_CHARS.replace_all(input, "").into_owned()
}

// ── Rule 2: Unicode symbols → LaTeX ──────────────────────────────────────────

fn latex_for(c: char) -> Option<&'static str> {
    UNICODE_TO_LATEX
        .iter()
        .find(|(u, _)| *u == c)
        .map(|(_, latex)| *latex)
}

fn replace_unicode_symbols(input: &str) -> String {
    let mut out = String::with_capacity(input.len() + 16);
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        // x̄ → \bar{x}
        if chars.peek().is_some_and(|n| COMBINING_OVERLINES.contains(n)) && c.is_alphanumeric() {
            chars.next();
            out.push_str(r"\bar{");
            match latex_for(c) {
                Some(latex) => out.push_str(latex),
                None => out.push(c),
            }
            out.push('}');
            continue;
        }
        if COMBINING_OVERLINES.contains(&c) {
            continue;
        }

        match latex_for(c) {
            Some(latex) => {
                out.push_str(latex);
                // \alpha followed by x must not become the undefined \alphax
                let is_command = latex.starts_with('\\')
                    && latex.ends_with(|l: char| l.is_ascii_alphabetic());
                if is_command && chars.peek().is_some_and(|n| n.is_ascii_alphabetic()) {
                    out.push(' ');
                }
            }
            None => out.push(c),
        }
    }
    out
}

// ── Rule 3: ar{ → \bar{ ──────────────────────────────────────────────────────

/// `ar{` is only a damaged `\bar{` at a word start: after a letter it is part
/// of an intact command (`\bar{`) or a word, after a backslash it is `\ar`.
fn repair_bar_command(input: &str) -> String {
    let mut out = String::with_capacity(input.len() + 8);
    let mut prev: Option<char> = None;
    let mut rest = input;

    while let Some(pos) = rest.find("ar{") {
        let before = &rest[..pos];
        let preceding = before.chars().next_back().or(prev);
        out.push_str(before);
        if preceding.is_some_and(|p| p == '\\' || p.is_alphabetic()) {
            out.push_str("ar{");
        } else {
            out.push_str(r"\bar{");
        }
        prev = Some('{');
        rest = &rest[pos + 3..];
    }
    out.push_str(rest);
    out
}

// ── Rule 4: Missing caret after a subscript ──────────────────────────────────

static RE_SUBSCRIPT_SPACE_DIGITS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([A-Za-z]_[A-Za-z0-9]+) (\d+)").unwrap());

static RE_SUBSCRIPT_GLUED_DIGITS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([A-Za-z]_\d)(\d+)").unwrap());

fn repair_missing_caret(input: &str) -> String {
    // y_0 2 → y_0^2
    let s = RE_SUBSCRIPT_SPACE_DIGITS.replace_all(input, "${1}^${2}");
    // y_02 → y_0^2; y_{02} never matches since the brace sits before the digits
    RE_SUBSCRIPT_GLUED_DIGITS
        .replace_all(&s, "${1}^${2}")
        .into_owned()
}

// ── Rule 5: \bar{x}1 → \bar{x}_1 ─────────────────────────────────────────────

static RE_BAR_BARE_DIGITS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\\bar\{([A-Za-z])\}(\d+)").unwrap());

fn repair_bar_subscript(input: &str) -> String {
    RE_BAR_BARE_DIGITS
        .replace_all(input, r"\bar{${1}}_${2}")
        .into_owned()
}

// ── Math-span helper ─────────────────────────────────────────────────────────

static RE_MATH_SPAN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$\$([^$]+)\$\$|\$([^$]+)\$").unwrap());

/// Rewrite the body of every `$$…$$` and `$…$` span with `f`, leaving prose
/// untouched.
fn map_math_spans(input: &str, f: fn(&str) -> String) -> String {
    RE_MATH_SPAN
        .replace_all(input, |caps: &Captures| match (caps.get(1), caps.get(2)) {
            (Some(display), _) => format!("$${}$$", f(display.as_str())),
            (None, Some(inline)) => format!("${}$", f(inline.as_str())),
            (None, None) => caps[0].to_string(),
        })
        .into_owned()
}

// ── Rule 6: (a)/(b) → \frac{a}{b} ────────────────────────────────────────────

static RE_TEXT_FRACTION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\(([^()]+)\)/\(([^()]+)\)").unwrap());

/// Repeats until no parenthesised pair is left, so nested `((a)/(b))/(c)`
/// resolves inside out. Every pass removes parentheses.
fn repair_text_fractions(body: &str) -> String {
    let mut s = body.to_string();
    while RE_TEXT_FRACTION.is_match(&s) {
        s = RE_TEXT_FRACTION
            .replace_all(&s, r"\frac{${1}}{${2}}")
            .into_owned();
    }
    s
}

// ── Rule 7: Brace multi-character scripts ────────────────────────────────────

static RE_BARE_SUPERSCRIPT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\^([A-Za-z0-9]{2,})").unwrap());

static RE_BARE_SUBSCRIPT: Lazy<Regex> = Lazy::new(|| Regex::new(r"_([A-Za-z0-9]{2,})").unwrap());

fn brace_multichar_scripts(body: &str) -> String {
    let s = RE_BARE_SUPERSCRIPT.replace_all(body, "^{${1}}");
    RE_BARE_SUBSCRIPT.replace_all(&s, "_{${1}}").into_owned()
}
