//! Document assembler: segmented elements → WordprocessingML paragraphs.
//!
//! ## Inline vs. display
//!
//! Word has two mutually exclusive ways to embed an equation:
//!
//! * **inline** — an `m:oMath` inside a `w:r`, flowing with the text around
//!   it. It cannot carry its own alignment.
//! * **display** — an `m:oMathPara` appended directly under `w:p`, with its
//!   own `m:oMathParaPr/m:jc`. Multi-line systems (`aligned`, `cases`, …)
//!   are left-aligned, everything else is centred.
//!
//! Putting a display equation inside a run silently loses the alignment;
//! putting an inline one under `w:p` breaks the line. [`insert_formula`] is
//! the single place that decides.
//!
//! ## Fallback
//!
//! A formula that fails LaTeX → MathML or MathML → OMML is written as its
//! original source (`$…$` or `$$…$$`) in a monospaced run. The failure is
//! logged and the rest of the document is unaffected.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::DocumentConfig;
use crate::docx::document::{Alignment, CoreProperties, DefaultFont, Document, Paragraph, Run};
use crate::docx::xml::XmlElement;
use crate::error::ConversionError;
use crate::math::mathml::to_mathml_styled;
use crate::math::omml::mathml_to_omml;
use crate::math::segment::{Element, FormulaElement, FormulaType};

/// Counts collected while assembling.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssemblyStats {
    pub display_formulas: usize,
    pub inline_formulas: usize,
    /// Formulas written as LaTeX source instead of an equation.
    pub fallback_formulas: usize,
    pub paragraphs: usize,
}

static RE_MULTILINE_ENV: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\\begin\{(?:aligned|gathered|align|eqnarray|cases)\*?\}").unwrap()
});

/// Alignment for a display formula: left for multi-line environments,
/// centre otherwise.
///
/// Only the literal `\begin{…}` form counts; the word "aligned" in a
/// `\text{}` does not.
pub fn display_alignment(latex: &str) -> Alignment {
    if RE_MULTILINE_ENV.is_match(latex) {
        Alignment::Left
    } else {
        Alignment::Center
    }
}

/// Translate `mathml` to OMML and attach it to `paragraph`.
///
/// Display formulas become an `m:oMathPara` directly under the paragraph,
/// aligned per [`display_alignment`] of `latex`. Inline formulas become an
/// `m:oMath` inside a new run.
pub fn insert_formula(
    paragraph: &mut Paragraph,
    mathml: &str,
    latex: &str,
    is_display: bool,
) -> Result<(), ConversionError> {
    let omath = mathml_to_omml(mathml)?;
    if is_display {
        let jc = display_alignment(latex).as_str();
        let para = XmlElement::new("m:oMathPara")
            .child(XmlElement::new("m:oMathParaPr").child(XmlElement::with_val("m:jc", jc)))
            .child(omath);
        paragraph.append_xml(para);
    } else {
        let mut run = Run::new();
        run.append_xml(omath);
        paragraph.add_run(run);
    }
    Ok(())
}

// ── Inline scan ──────────────────────────────────────────────────────────────

/// A piece of a text element: plain text or the body of a `$…$` formula.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InlinePiece<'a> {
    Text(&'a str),
    Math(&'a str),
}

/// Split prose into text and inline-formula pieces.
///
/// A delimiter is a `$` with no `$` on either side, so `$$` never opens or
/// closes an inline formula. A span may not cross a line break and must
/// have a non-blank body; otherwise the opening `$` is kept as text.
pub fn split_inline(text: &str) -> Vec<InlinePiece<'_>> {
    let bytes = text.as_bytes();
    let is_single = |i: usize| {
        bytes[i] == b'$'
            && (i == 0 || bytes[i - 1] != b'$')
            && bytes.get(i + 1).map_or(true, |&b| b != b'$')
    };

    let mut pieces = Vec::new();
    let mut cursor = 0;
    let mut open: Option<usize> = None;

    for i in 0..bytes.len() {
        if bytes[i] == b'\n' {
            open = None;
            continue;
        }
        if !is_single(i) {
            continue;
        }
        match open {
            None => open = Some(i),
            Some(start) => {
                let body = &text[start + 1..i];
                if body.trim().is_empty() {
                    open = Some(i);
                    continue;
                }
                if start > cursor {
                    pieces.push(InlinePiece::Text(&text[cursor..start]));
                }
                pieces.push(InlinePiece::Math(body));
                cursor = i + 1;
                open = None;
            }
        }
    }
    if cursor < text.len() {
        pieces.push(InlinePiece::Text(&text[cursor..]));
    }
    pieces
}

// ── Blocks ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
enum Block {
    Prose(String),
    Code(String),
}

/// Split a text element into paragraphs at blank lines, keeping fenced
/// code blocks whole.
fn split_blocks(text: &str) -> Vec<Block> {
    let mut blocks = Vec::new();
    let mut prose: Vec<&str> = Vec::new();
    let mut code: Option<Vec<&str>> = None;

    let flush_prose = |prose: &mut Vec<&str>, blocks: &mut Vec<Block>| {
        let joined = prose.join("\n");
        if !joined.trim().is_empty() {
            blocks.push(Block::Prose(joined.trim().to_string()));
        }
        prose.clear();
    };

    for line in text.lines() {
        let is_fence = line.trim_start().starts_with("```");
        match code.as_mut() {
            Some(lines) if is_fence => {
                blocks.push(Block::Code(lines.join("\n")));
                code = None;
            }
            Some(lines) => lines.push(line),
            None if is_fence => {
                flush_prose(&mut prose, &mut blocks);
                code = Some(Vec::new());
            }
            None if line.trim().is_empty() => flush_prose(&mut prose, &mut blocks),
            None => prose.push(line),
        }
    }
    if let Some(lines) = code {
        blocks.push(Block::Code(lines.join("\n")));
    }
    flush_prose(&mut prose, &mut blocks);
    blocks
}

// ── Assembler ────────────────────────────────────────────────────────────────

/// Builds a [`Document`] from segmented elements.
pub struct DocumentAssembler<'a> {
    config: &'a DocumentConfig,
    document: Document,
    stats: AssemblyStats,
}

impl<'a> DocumentAssembler<'a> {
    pub fn new(config: &'a DocumentConfig) -> Self {
        let mut document = Document::new(DefaultFont {
            family: config.font_family.clone(),
            size_pt: config.font_size_pt,
        });
        document.properties = CoreProperties {
            title: config.title.clone(),
            author: Some(config.author.clone()),
            subject: config.subject.clone(),
        };
        let mut assembler = Self {
            config,
            document,
            stats: AssemblyStats::default(),
        };
        if let Some(title) = &config.title {
            let mut p = Paragraph::with_style("Title").align(Alignment::Center);
            p.add_run(Run::text(title));
            assembler.push(p);
        }
        assembler
    }

    /// Append every element in order.
    pub fn add_elements(&mut self, elements: &[Element]) {
        for element in elements {
            match element {
                Element::Text(t) => self.add_text(&t.content),
                Element::Formula(f) => self.add_formula(f),
            }
        }
    }

    /// Append prose, one paragraph per blank-line-separated block.
    pub fn add_text(&mut self, text: &str) {
        for block in split_blocks(text) {
            match block {
                Block::Prose(p) => self.add_prose_paragraph(&p),
                Block::Code(c) => {
                    let mut p = Paragraph::new();
                    p.add_run(self.code_run(&c));
                    self.push(p);
                }
            }
        }
    }

    /// Append a standalone formula in its own paragraph.
    pub fn add_formula(&mut self, formula: &FormulaElement) {
        let is_display = formula.formula_type == FormulaType::Display;
        let mut paragraph = Paragraph::new();
        let inserted = match &formula.mathml {
            Some(mathml) => insert_formula(&mut paragraph, mathml, &formula.latex, is_display),
            None => Err(ConversionError::Parse {
                latex: formula.latex.clone(),
                detail: "no MathML available".into(),
            }),
        };
        match inserted {
            Ok(()) => self.count(formula.formula_type),
            Err(e) => {
                self.log_fallback(&e, &formula.latex, formula.mathml.as_deref());
                paragraph.add_run(self.code_run(&formula.source()));
                self.stats.fallback_formulas += 1;
            }
        }
        self.push(paragraph);
    }

    fn add_prose_paragraph(&mut self, text: &str) {
        let mut paragraph = Paragraph::new();
        for piece in split_inline(text) {
            match piece {
                InlinePiece::Text(t) => paragraph.add_run(Run::text(t)),
                InlinePiece::Math(body) => {
                    let latex = body.trim();
                    let result = to_mathml_styled(latex, FormulaType::Inline).and_then(|mathml| {
                        insert_formula(&mut paragraph, &mathml, latex, false)
                            .map_err(|e| {
                                debug!("MathML: {}", mathml);
                                e
                            })
                    });
                    match result {
                        Ok(()) => self.count(FormulaType::Inline),
                        Err(e) => {
                            self.log_fallback(&e, latex, None);
                            paragraph.add_run(self.code_run(&format!("${latex}$")));
                            self.stats.fallback_formulas += 1;
                        }
                    }
                }
            }
        }
        self.push(paragraph);
    }

    /// Final centred credit line, set off by a rule.
    pub fn add_footer(&mut self, text: &str) {
        let mut rule = Paragraph::new();
        rule.add_run(Run::text(&"_".repeat(50)));
        self.push(rule);

        let mut footer = Paragraph::new().align(Alignment::Center);
        footer.add_run(
            Run::text(text)
                .font(&self.config.font_family, 8.0)
                .color("808080"),
        );
        self.push(footer);
    }

    pub fn stats(&self) -> AssemblyStats {
        self.stats
    }

    /// Finish the document, appending the configured footer.
    pub fn finish(mut self) -> (Document, AssemblyStats) {
        if let Some(footer) = self.config.footer.clone() {
            self.add_footer(&footer);
        }
        (self.document, self.stats)
    }

    fn code_run(&self, text: &str) -> Run {
        Run::text(text).font(&self.config.code_font_family, self.config.code_font_size_pt)
    }

    fn count(&mut self, formula_type: FormulaType) {
        match formula_type {
            FormulaType::Display => self.stats.display_formulas += 1,
            FormulaType::Inline => self.stats.inline_formulas += 1,
        }
    }

    fn log_fallback(&self, error: &ConversionError, latex: &str, mathml: Option<&str>) {
        warn!("Formula kept as LaTeX source: {}", error);
        debug!("LaTeX: {}", latex);
        if let Some(m) = mathml {
            debug!("MathML: {}", m);
        }
    }

    fn push(&mut self, paragraph: Paragraph) {
        self.stats.paragraphs += 1;
        self.document.add_paragraph(paragraph);
    }
}

/// Assemble `elements` into a document using `config`.
pub fn assemble(elements: &[Element], config: &DocumentConfig) -> (Document, AssemblyStats) {
    let mut assembler = DocumentAssembler::new(config);
    assembler.add_elements(elements);
    assembler.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::mathml::to_mathml;
    use crate::math::segment::{segment, TextElement};

    fn only_paragraph(doc: &Document) -> XmlElement {
        assert_eq!(doc.paragraphs().len(), 1, "expected a single paragraph");
        doc.paragraphs()[0].to_xml()
    }

    #[test]
    fn test_display_alignment_keywords() {
        assert_eq!(display_alignment(r"\begin{aligned} x &= 1 \end{aligned}"), Alignment::Left);
        assert_eq!(display_alignment(r"\begin{cases} 1 & x>0 \end{cases}"), Alignment::Left);
        assert_eq!(display_alignment(r"\begin{align*} x \end{align*}"), Alignment::Left);
        assert_eq!(display_alignment("x^2+y^2=1"), Alignment::Center);
        // prose mentioning the word is not an environment
        assert_eq!(display_alignment(r"\text{aligned} x = 1"), Alignment::Center);
    }

    #[test]
    fn test_display_formula_is_math_paragraph_under_w_p() {
        let mut p = Paragraph::new();
        let mathml = to_mathml("x^2+y^2=1").unwrap();
        insert_formula(&mut p, &mathml, "x^2+y^2=1", true).unwrap();
        let xml = p.to_xml();
        let first = xml.elements().next().unwrap();
        assert_eq!(first.name, "m:oMathPara");
        assert_eq!(
            first.find("m:jc").and_then(|j| j.attribute("m:val")),
            Some("center")
        );
        assert!(xml.find("w:r").is_none());
    }

    #[test]
    fn test_aligned_display_formula_is_left() {
        let latex = r"\begin{aligned} x + y &= 3 \\ x - y &= 1 \end{aligned}";
        let mut p = Paragraph::new();
        let mathml = to_mathml(latex).unwrap();
        insert_formula(&mut p, &mathml, latex, true).unwrap();
        let xml = p.to_xml();
        assert_eq!(
            xml.find("m:oMathParaPr")
                .and_then(|pr| pr.find("m:jc"))
                .and_then(|j| j.attribute("m:val")),
            Some("left")
        );
    }

    #[test]
    fn test_inline_formula_lives_in_a_run() {
        let mut p = Paragraph::new();
        let mathml = to_mathml_styled("a+b", FormulaType::Inline).unwrap();
        insert_formula(&mut p, &mathml, "a+b", false).unwrap();
        let xml = p.to_xml();
        let run = xml.elements().next().unwrap();
        assert_eq!(run.name, "w:r");
        assert_eq!(run.elements().next().unwrap().name, "m:oMath");
        assert!(xml.find("m:oMathPara").is_none());
    }

    #[test]
    fn test_split_inline_excludes_double_dollar() {
        let pieces = split_inline("Let $x$ be $$y$$ and $z$.");
        assert_eq!(
            pieces,
            vec![
                InlinePiece::Text("Let "),
                InlinePiece::Math("x"),
                InlinePiece::Text(" be $$y$$ and "),
                InlinePiece::Math("z"),
                InlinePiece::Text("."),
            ]
        );
    }

    #[test]
    fn test_split_inline_does_not_cross_lines() {
        let pieces = split_inline("costs $5\nand $x$");
        assert_eq!(
            pieces,
            vec![InlinePiece::Text("costs $5\nand "), InlinePiece::Math("x")]
        );
    }

    #[test]
    fn test_split_inline_unmatched_dollar_is_text() {
        assert_eq!(split_inline("price: $3"), vec![InlinePiece::Text("price: $3")]);
    }

    #[test]
    fn test_inline_formulas_keep_reading_order() {
        let config = DocumentConfig::default();
        let mut a = DocumentAssembler::new(&config);
        a.add_text("Given $f(x)=x^2$, find $f(2)$.");
        let (doc, stats) = a.finish();
        let xml = only_paragraph(&doc);
        let kinds: Vec<&str> = xml
            .elements()
            .map(|r| r.elements().last().map_or("", |e| e.name.as_str()))
            .collect();
        assert_eq!(kinds, vec!["w:t", "m:oMath", "w:t", "m:oMath", "w:t"]);
        assert_eq!(stats.inline_formulas, 2);
        assert_eq!(stats.fallback_formulas, 0);
    }

    #[test]
    fn test_bad_display_latex_falls_back_to_source() {
        let config = DocumentConfig::default();
        let elements = segment(r"Intro $$\frac{1}{2$$ outro");
        let (doc, stats) = assemble(&elements, &config);
        assert_eq!(stats.fallback_formulas, 1);
        assert_eq!(stats.display_formulas, 0);
        let all: String = doc
            .paragraphs()
            .iter()
            .map(|p| p.to_xml().text_content())
            .collect();
        assert!(all.contains(r"$$\frac{1}{2$$"), "{all}");
        let code = doc.paragraphs()[1].to_xml();
        assert_eq!(
            code.find("w:rFonts").and_then(|f| f.attribute("w:ascii")),
            Some("Courier New")
        );
    }

    #[test]
    fn test_bad_inline_latex_falls_back_in_place() {
        let config = DocumentConfig::default();
        let mut a = DocumentAssembler::new(&config);
        a.add_text(r"before $\frac{1}{2$ after");
        let (doc, stats) = a.finish();
        assert_eq!(stats.fallback_formulas, 1);
        let text = only_paragraph(&doc).text_content();
        assert_eq!(text, r"before $\frac{1}{2$ after");
    }

    #[test]
    fn test_blank_lines_split_paragraphs_and_code_stays_whole() {
        let config = DocumentConfig::default();
        let mut a = DocumentAssembler::new(&config);
        a.add_text("First.\n\nSecond line one\nline two\n\n```\nplot(x)\n\nend\n```\n");
        let (doc, _) = a.finish();
        assert_eq!(doc.paragraphs().len(), 3);
        let second = doc.paragraphs()[1].to_xml();
        assert!(second.find("w:br").is_some());
        let code = doc.paragraphs()[2].to_xml();
        assert_eq!(code.text_content(), "plot(x)end");
        assert_eq!(code.descendants().iter().filter(|e| e.name == "w:br").count(), 2);
    }

    #[test]
    fn test_whitespace_text_elements_are_skipped() {
        let config = DocumentConfig::default();
        let elements = vec![
            Element::Text(TextElement { content: "\n\n".into() }),
            Element::Formula(FormulaElement::new(FormulaType::Display, "x=1")),
            Element::Text(TextElement { content: "  ".into() }),
        ];
        let (doc, stats) = assemble(&elements, &config);
        assert_eq!(doc.paragraphs().len(), 1);
        assert_eq!(stats.display_formulas, 1);
    }

    #[test]
    fn test_title_and_footer() {
        let config = DocumentConfig {
            title: Some("Worksheet".into()),
            footer: Some("model: test".into()),
            ..DocumentConfig::default()
        };
        let (doc, _) = assemble(&[], &config);
        let paras = doc.paragraphs();
        assert_eq!(paras.len(), 3);
        assert_eq!(paras[0].to_xml().text_content(), "Worksheet");
        assert_eq!(paras[2].to_xml().text_content(), "model: test");
        assert_eq!(
            paras[2].to_xml().find("w:sz").and_then(|s| s.attribute("w:val")),
            Some("16")
        );
    }
}
