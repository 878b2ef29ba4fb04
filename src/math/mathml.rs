//! LaTeX → MathML glue around the `latex2mathml` crate.
//!
//! The library is lenient: on an unknown command it still returns `Ok` with
//! an `<mtext>[PARSE ERROR: …]</mtext>` node spliced into the tree, and it
//! happily renders unbalanced input. Both would end up as garbage inside a
//! Word equation, so this module validates before and after the call and
//! reports anything suspicious as a [`ConversionError`]. The caller then
//! keeps the formula as literal LaTeX.
//!
//! Before the call, common commands the library does not know are replaced
//! by ones it does (`\le` → `\leq`, `\dfrac` → `\frac`, …). Multi-line
//! environments are rewritten too. `aligned`, `align`, `gathered` and
//! `eqnarray` lose their `&` column markers and become a single-column
//! `matrix` (a centred stack of rows); `cases` becomes a brace-fenced
//! two-column `matrix`; `Bmatrix` and `Vmatrix` become a `matrix` inside
//! `\left…\right` fences. Column alignment is not preserved.
//!
//! After the call, the markup is repaired: the library writes `<` and `&`
//! tokens unescaped and emits `&lang;`/`&rang;`, none of which an XML
//! parser accepts.

use latex2mathml::{latex_to_mathml, DisplayStyle};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use crate::error::ConversionError;
use crate::math::segment::FormulaType;

const PARSE_ERROR_MARKER: &str = "[PARSE ERROR:";

/// Convert a display formula to MathML.
pub fn to_mathml(latex: &str) -> Result<String, ConversionError> {
    to_mathml_styled(latex, FormulaType::Display)
}

/// Convert a formula to MathML with the given display style.
pub fn to_mathml_styled(latex: &str, style: FormulaType) -> Result<String, ConversionError> {
    let trimmed = latex.trim();
    if trimmed.is_empty() {
        return Err(ConversionError::Parse {
            latex: latex.to_string(),
            detail: "empty formula".into(),
        });
    }
    check_braces(trimmed)?;
    check_environments(trimmed)?;

    let prepared = rewrite_environments(&rewrite_aliases(trimmed));
    let display = match style {
        FormulaType::Display => DisplayStyle::Block,
        FormulaType::Inline => DisplayStyle::Inline,
    };

    let mathml = latex_to_mathml(&prepared, display).map_err(|e| ConversionError::Parse {
        latex: latex.to_string(),
        detail: e.to_string(),
    })?;

    if mathml.contains(PARSE_ERROR_MARKER) {
        return Err(ConversionError::Parse {
            latex: latex.to_string(),
            detail: "unsupported LaTeX command or token".into(),
        });
    }
    Ok(repair_markup(&mathml))
}

// ── Command aliases ──────────────────────────────────────────────────────────

/// Commands missing from `latex2mathml`, with a supported spelling.
/// An empty replacement drops the command.
const COMMAND_ALIASES: &[(&str, &str)] = &[
    ("le", r"\leq"),
    ("ge", r"\geq"),
    ("dfrac", r"\frac"),
    ("tfrac", r"\frac"),
    ("lbrace", r"\{"),
    ("rbrace", r"\}"),
    ("vert", "|"),
    ("lvert", "|"),
    ("rvert", "|"),
    ("Vert", r"\|"),
    ("lVert", r"\|"),
    ("rVert", r"\|"),
    ("prime", "'"),
    ("dots", r"\ldots"),
    ("neg", r"\lnot"),
    ("varnothing", r"\emptyset"),
    ("mathcal", r"\mathscr"),
    ("gcd", r"\operatorname{gcd}"),
    ("deg", r"\operatorname{deg}"),
    ("degree", r"^{\circ}"),
    ("displaystyle", ""),
    ("textstyle", ""),
    ("limits", ""),
    ("nolimits", ""),
];

/// `^{\prime}` and `^\prime` are plain primes.
static RE_SCRIPT_PRIME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\^(?:\{\s*\\prime\s*\}|\\prime\b)").unwrap());

/// A command name; the match is greedy so `\left` never matches `\le`.
static RE_COMMAND: Lazy<Regex> = Lazy::new(|| Regex::new(r"\\([A-Za-z]+)").unwrap());

fn rewrite_aliases(latex: &str) -> String {
    let s = RE_SCRIPT_PRIME.replace_all(latex, "'");
    RE_COMMAND
        .replace_all(&s, |caps: &Captures| {
            match COMMAND_ALIASES.iter().find(|(name, _)| *name == &caps[1]) {
                Some((_, replacement)) => replacement.to_string(),
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}

// ── Markup repair ────────────────────────────────────────────────────────────

/// Entity references XML defines without a DTD.
const XML_ENTITIES: &[&str] = &["lt;", "gt;", "amp;", "quot;", "apos;"];

/// Make library output well-formed: fix the misspelled `</mro>` close tag,
/// replace the HTML-only angle entities and escape bare `<` and `&`.
fn repair_markup(mathml: &str) -> String {
    let s = mathml
        .replace("</mro>", "</mo>")
        .replace("&lang;", "⟨")
        .replace("&rang;", "⟩");

    let mut out = String::with_capacity(s.len());
    for (i, c) in s.char_indices() {
        let rest = &s[i + c.len_utf8()..];
        match c {
            '<' if !rest.starts_with(|n: char| n.is_ascii_alphabetic() || n == '/') => {
                out.push_str("&lt;")
            }
            '&' if !is_entity_reference(rest) => out.push_str("&amp;"),
            _ => out.push(c),
        }
    }
    out
}

/// Whether `rest` (the text after a `&`) starts a valid reference.
fn is_entity_reference(rest: &str) -> bool {
    if XML_ENTITIES.iter().any(|e| rest.starts_with(e)) {
        return true;
    }
    let Some(num) = rest.strip_prefix('#') else {
        return false;
    };
    let (digits, radix) = match num.strip_prefix('x') {
        Some(hex) => (hex, 16),
        None => (num, 10),
    };
    let len = digits.chars().take_while(|d| d.is_digit(radix)).count();
    len > 0 && digits[len..].starts_with(';')
}

// ── Validation ───────────────────────────────────────────────────────────────

/// `{` and `}` must pair up; escaped `\{` / `\}` are literal braces.
fn check_braces(latex: &str) -> Result<(), ConversionError> {
    let mut depth: i64 = 0;
    let mut chars = latex.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                chars.next();
            }
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth < 0 {
                    break;
                }
            }
            _ => {}
        }
    }
    if depth == 0 {
        Ok(())
    } else {
        Err(ConversionError::UnbalancedBraces {
            latex: latex.to_string(),
        })
    }
}

static RE_ENVIRONMENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\\(begin|end)\{([A-Za-z]+\*?)\}").unwrap());

fn check_environments(latex: &str) -> Result<(), ConversionError> {
    let mut open: Vec<&str> = Vec::new();
    for caps in RE_ENVIRONMENT.captures_iter(latex) {
        let name = caps.get(2).map_or("", |m| m.as_str());
        if &caps[1] == "begin" {
            open.push(name);
            continue;
        }
        match open.pop() {
            Some(expected) if expected == name => {}
            Some(expected) => {
                return Err(ConversionError::EnvironmentMismatch {
                    latex: latex.to_string(),
                    detail: format!("\\begin{{{expected}}} closed by \\end{{{name}}}"),
                })
            }
            None => {
                return Err(ConversionError::EnvironmentMismatch {
                    latex: latex.to_string(),
                    detail: format!("\\end{{{name}}} without \\begin"),
                })
            }
        }
    }
    match open.pop() {
        None => Ok(()),
        Some(name) => Err(ConversionError::EnvironmentMismatch {
            latex: latex.to_string(),
            detail: format!("unterminated \\begin{{{name}}}"),
        }),
    }
}

// ── Environment rewriting ────────────────────────────────────────────────────

static RE_STACKED_ENV: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?s)\\begin\{(?:aligned|align\*?|gathered|eqnarray\*?)\}(.*?)\\end\{(?:aligned|align\*?|gathered|eqnarray\*?)\}",
    )
    .unwrap()
});

static RE_CASES_ENV: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)\\begin\{cases\}(.*?)\\end\{cases\}").unwrap());

/// Matrices whose fences the library has no environment for.
static FENCED_MATRIX_ENVS: Lazy<Vec<(Regex, &'static str, &'static str)>> = Lazy::new(|| {
    [("Bmatrix", r"\{", r"\}"), ("Vmatrix", r"\|", r"\|")]
        .into_iter()
        .map(|(env, open, close)| {
            let pattern = format!(r"(?s)\\begin\{{{env}\}}(.*?)\\end\{{{env}\}}");
            (Regex::new(&pattern).unwrap(), open, close)
        })
        .collect()
});

fn rewrite_environments(latex: &str) -> String {
    let s = RE_STACKED_ENV.replace_all(latex, |caps: &Captures| {
        let rows = split_rows(&caps[1].replace('&', ""));
        format!(r"\begin{{matrix}}{}\end{{matrix}}", rows.join(r" \\ "))
    });
    let mut s = RE_CASES_ENV
        .replace_all(&s, |caps: &Captures| {
            let rows = split_rows(&caps[1]);
            format!(
                r"\left\{{\begin{{matrix}}{}\end{{matrix}}\right.",
                rows.join(r" \\ ")
            )
        })
        .into_owned();
    for (re, open, close) in FENCED_MATRIX_ENVS.iter() {
        s = re
            .replace_all(&s, |caps: &Captures| {
                format!(
                    r"\left{open}\begin{{matrix}}{}\end{{matrix}}\right{close}",
                    &caps[1]
                )
            })
            .into_owned();
    }
    s
}

/// Split an environment body on `\\`, dropping empty rows (a trailing `\\`
/// would otherwise produce an empty table row).
fn split_rows(body: &str) -> Vec<String> {
    body.split(r"\\")
        .map(str::trim)
        .filter(|row| !row.is_empty())
        .map(str::to_string)
        .collect()
}
