//! Content segmenter: split a transcript into text and display-formula
//! elements.
//!
//! Only `$$…$$` spans become standalone [`FormulaElement`]s. Inline `$…$`
//! spans stay inside their [`TextElement`] so a sentence such as
//! "已知函数 $f(x)=x^2$ 是偶函数" is rendered as one paragraph with an equation
//! in the middle, not three block-level fragments.
//!
//! Segmentation is lossless: text slices are kept verbatim (including any
//! surrounding whitespace) and formula bodies are stored exactly as written,
//! so [`reconstruct`] reproduces the input byte-for-byte. Whitespace-only
//! text is dropped later by the document assembler, not here.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::math::mathml::to_mathml;

// ── Types ────────────────────────────────────────────────────────────────────

/// One unit of parsed content, in reading order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Element {
    Text(TextElement),
    Formula(FormulaElement),
}

/// Prose, possibly with inline `$…$` formulas left in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextElement {
    pub content: String,
}

/// Whether a formula flows with its line or stands on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FormulaType {
    Inline,
    Display,
}

impl FormulaType {
    /// The delimiter that marks this formula type in a transcript.
    pub fn delimiter(self) -> &'static str {
        match self {
            FormulaType::Inline => "$",
            FormulaType::Display => "$$",
        }
    }
}

/// A formula extracted as a standalone element.
///
/// `mathml` is `None` when the LaTeX could not be converted; the document
/// assembler then writes the source LaTeX instead of an equation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormulaElement {
    pub formula_type: FormulaType,
    pub latex: String,
    pub mathml: Option<String>,
}

impl FormulaElement {
    /// Build the element and attempt the LaTeX → MathML conversion.
    pub fn new(formula_type: FormulaType, latex: impl Into<String>) -> Self {
        let latex = latex.into();
        let mathml = match to_mathml(&latex) {
            Ok(m) => Some(m),
            Err(e) => {
                warn!("Formula will be kept as LaTeX source: {}", e);
                None
            }
        };
        Self {
            formula_type,
            latex,
            mathml,
        }
    }

    /// The formula as it appeared in the transcript, delimiters included.
    pub fn source(&self) -> String {
        let d = self.formula_type.delimiter();
        format!("{d}{}{d}", self.latex)
    }
}

impl Element {
    /// Text this element was cut from.
    pub fn source(&self) -> String {
        match self {
            Element::Text(t) => t.content.clone(),
            Element::Formula(f) => f.source(),
        }
    }
}

/// Concatenate the source of every element, in order.
pub fn reconstruct(elements: &[Element]) -> String {
    elements.iter().map(Element::source).collect()
}

// ── Segmentation ─────────────────────────────────────────────────────────────

static RE_DISPLAY_FORMULA: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)\$\$(.+?)\$\$").unwrap());

/// Split `text` into an ordered list of text and display-formula elements.
///
/// A text without any `$$…$$` span comes back as a single [`TextElement`].
/// An unmatched `$$` stays in the surrounding text as literal characters.
pub fn segment(text: &str) -> Vec<Element> {
    let repaired = repair_single_dollar_aligned(text);
    let mut elements = Vec::new();
    let mut cursor = 0;

    for caps in RE_DISPLAY_FORMULA.captures_iter(&repaired) {
        let (Some(whole), Some(body)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        if whole.start() > cursor {
            elements.push(Element::Text(TextElement {
                content: repaired[cursor..whole.start()].to_string(),
            }));
        }
        elements.push(Element::Formula(FormulaElement::new(
            FormulaType::Display,
            body.as_str(),
        )));
        cursor = whole.end();
    }

    if cursor < repaired.len() {
        elements.push(Element::Text(TextElement {
            content: repaired[cursor..].to_string(),
        }));
    }

    debug!(
        "Segmented into {} elements ({} display formulas)",
        elements.len(),
        elements
            .iter()
            .filter(|e| matches!(e, Element::Formula(_)))
            .count()
    );
    elements
}

// ── Malformed aligned wrapper ────────────────────────────────────────────────

const BEGIN_ALIGNED: &str = r"\begin{aligned}";
const END_ALIGNED: &str = r"\end{aligned}";

/// Repair a multi-line `aligned` block that the model wrapped in single
/// dollars together with surrounding prose:
///
/// ```text
/// $
/// 1. Solution: \begin{aligned} … \end{aligned} so the answer is 2.
/// $
/// ```
///
/// Prose before `\begin{aligned}` and after `\end{aligned}` is hoisted out as
/// plain text and the block itself is rewrapped in `$$`. Lines that do not
/// complete the shape are left untouched.
pub fn repair_single_dollar_aligned(text: &str) -> String {
    if !text.contains(BEGIN_ALIGNED) {
        return text.to_string();
    }

    let lines: Vec<&str> = text.split('\n').collect();
    let mut out: Vec<String> = Vec::with_capacity(lines.len() + 4);
    let mut i = 0;

    while i < lines.len() {
        if lines[i].trim() == "$" {
            if let Some((close, rewritten)) = rewrite_wrapped_block(&lines, i) {
                debug!("Repaired single-dollar aligned block at line {}", i + 1);
                out.extend(rewritten);
                i = close + 1;
                continue;
            }
        }
        out.push(lines[i].to_string());
        i += 1;
    }
    out.join("\n")
}

/// `open` is the index of a line that is exactly `$`. Returns the index of
/// the closing `$` line and the replacement lines.
fn rewrite_wrapped_block(lines: &[&str], open: usize) -> Option<(usize, Vec<String>)> {
    let body_start = open + 1;
    let close = lines[body_start..]
        .iter()
        .position(|l| l.trim() == "$")
        .map(|p| p + body_start)?;

    let body = lines[body_start..close].join("\n");
    let begin = body.find(BEGIN_ALIGNED)?;
    let end_rel = body[begin..].find(END_ALIGNED)?;
    let end = begin + end_rel + END_ALIGNED.len();

    let before = body[..begin].trim();
    let block = &body[begin..end];
    let after = body[end..].trim();

    let mut out = Vec::new();
    if !before.is_empty() {
        out.push(before.to_string());
    }
    out.push("$$".to_string());
    out.push(block.to_string());
    out.push("$$".to_string());
    if !after.is_empty() {
        out.push(after.to_string());
    }
    Some((close, out))
}
