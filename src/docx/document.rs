//! In-memory WordprocessingML document: paragraphs, runs and raw subtrees.
//!
//! This is deliberately thin. A [`Paragraph`] is a list of properties plus
//! content elements; a [`Run`] likewise. Either can take an arbitrary
//! [`XmlElement`] (an OMML equation, most importantly) next to ordinary
//! text, which is the one capability the assembler needs that generic
//! document builders make awkward.

use crate::docx::xml::XmlElement;

/// Namespace declarations carried by the `w:document` root.
pub const DOCUMENT_NAMESPACES: &[(&str, &str)] = &[
    (
        "xmlns:w",
        "http://schemas.openxmlformats.org/wordprocessingml/2006/main",
    ),
    (
        "xmlns:m",
        "http://schemas.openxmlformats.org/officeDocument/2006/math",
    ),
    (
        "xmlns:r",
        "http://schemas.openxmlformats.org/officeDocument/2006/relationships",
    ),
];

/// Paragraph alignment (`w:jc`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Alignment {
    Left,
    Center,
}

impl Alignment {
    pub fn as_str(self) -> &'static str {
        match self {
            Alignment::Left => "left",
            Alignment::Center => "center",
        }
    }
}

/// Font sizes are stored in half-points.
fn half_points(size_pt: f32) -> String {
    ((size_pt * 2.0).round() as u32).to_string()
}

// ── Run ──────────────────────────────────────────────────────────────────────

/// A `w:r`: formatting properties followed by text, breaks or raw XML.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Run {
    properties: Vec<XmlElement>,
    content: Vec<XmlElement>,
}

impl Run {
    pub fn new() -> Self {
        Self::default()
    }

    /// A run holding `text`; each `\n` becomes a line break.
    pub fn text(text: &str) -> Self {
        let mut run = Self::new();
        for (i, line) in text.split('\n').enumerate() {
            if i > 0 {
                run.content.push(XmlElement::new("w:br"));
            }
            if !line.is_empty() {
                run.content.push(
                    XmlElement::new("w:t")
                        .attr("xml:space", "preserve")
                        .text(line),
                );
            }
        }
        run
    }

    /// Set the font family (all scripts) and size.
    pub fn font(mut self, family: &str, size_pt: f32) -> Self {
        self.properties.retain(|p| p.name != "w:rFonts" && p.name != "w:sz");
        self.properties.push(
            XmlElement::new("w:rFonts")
                .attr("w:ascii", family)
                .attr("w:hAnsi", family)
                .attr("w:cs", family),
        );
        self.properties.push(XmlElement::with_val("w:sz", half_points(size_pt)));
        self
    }

    pub fn color(mut self, hex: &str) -> Self {
        self.properties.push(XmlElement::with_val("w:color", hex));
        self
    }

    /// Append a raw subtree (e.g. an `m:oMath`) to the run.
    pub fn append_xml(&mut self, element: XmlElement) {
        self.content.push(element);
    }

    pub fn to_xml(&self) -> XmlElement {
        // w:rPr children must follow the schema order: rFonts, …, color, sz
        let mut props = self.properties.clone();
        props.sort_by_key(|p| match p.name.as_str() {
            "w:rFonts" => 0,
            "w:color" => 1,
            "w:sz" => 2,
            _ => 3,
        });
        let mut r = XmlElement::new("w:r");
        if !props.is_empty() {
            r.push(XmlElement::new("w:rPr").with_children(props));
        }
        r.with_children(self.content.iter().cloned())
    }
}

// ── Paragraph ────────────────────────────────────────────────────────────────

/// A `w:p`: optional style and alignment, then runs and raw subtrees in
/// order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Paragraph {
    style: Option<String>,
    alignment: Option<Alignment>,
    content: Vec<XmlElement>,
}

impl Paragraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_style(style: impl Into<String>) -> Self {
        Self {
            style: Some(style.into()),
            ..Self::default()
        }
    }

    pub fn align(mut self, alignment: Alignment) -> Self {
        self.alignment = Some(alignment);
        self
    }

    pub fn add_run(&mut self, run: Run) {
        self.content.push(run.to_xml());
    }

    /// Append a raw subtree directly under `w:p` (e.g. an `m:oMathPara`).
    pub fn append_xml(&mut self, element: XmlElement) {
        self.content.push(element);
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }

    /// Content elements in order (runs already rendered to `w:r`).
    pub fn content(&self) -> &[XmlElement] {
        &self.content
    }

    pub fn to_xml(&self) -> XmlElement {
        let mut p = XmlElement::new("w:p");
        if self.style.is_some() || self.alignment.is_some() {
            let mut ppr = XmlElement::new("w:pPr");
            if let Some(style) = &self.style {
                ppr.push(XmlElement::with_val("w:pStyle", style.as_str()));
            }
            if let Some(a) = self.alignment {
                ppr.push(XmlElement::with_val("w:jc", a.as_str()));
            }
            p.push(ppr);
        }
        p.with_children(self.content.iter().cloned())
    }
}

// ── Document ─────────────────────────────────────────────────────────────────

/// Core properties stored in `docProps/core.xml`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CoreProperties {
    pub title: Option<String>,
    pub author: Option<String>,
    pub subject: Option<String>,
}

/// Default character formatting written to `word/styles.xml`.
#[derive(Debug, Clone, PartialEq)]
pub struct DefaultFont {
    pub family: String,
    pub size_pt: f32,
}

/// An ordered list of paragraphs plus package-level metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    paragraphs: Vec<Paragraph>,
    pub properties: CoreProperties,
    pub default_font: DefaultFont,
}

impl Document {
    pub fn new(default_font: DefaultFont) -> Self {
        Self {
            paragraphs: Vec::new(),
            properties: CoreProperties::default(),
            default_font,
        }
    }

    pub fn add_paragraph(&mut self, paragraph: Paragraph) {
        self.paragraphs.push(paragraph);
    }

    pub fn paragraphs(&self) -> &[Paragraph] {
        &self.paragraphs
    }

    /// The `w:document` element of `word/document.xml`.
    pub fn to_xml(&self) -> XmlElement {
        let mut root = XmlElement::new("w:document");
        for (k, v) in DOCUMENT_NAMESPACES {
            root = root.attr(*k, *v);
        }
        let section = XmlElement::new("w:sectPr")
            .child(
                XmlElement::new("w:pgSz")
                    .attr("w:w", "12240")
                    .attr("w:h", "15840"),
            )
            .child(
                XmlElement::new("w:pgMar")
                    .attr("w:top", "1440")
                    .attr("w:right", "1440")
                    .attr("w:bottom", "1440")
                    .attr("w:left", "1440")
                    .attr("w:header", "720")
                    .attr("w:footer", "720")
                    .attr("w:gutter", "0"),
            );
        let body = XmlElement::new("w:body")
            .with_children(self.paragraphs.iter().map(Paragraph::to_xml))
            .child(section);
        root.child(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_text_breaks_lines() {
        let xml = Run::text("a\nb").to_xml().to_xml_string();
        assert_eq!(
            xml,
            "<w:r><w:t xml:space=\"preserve\">a</w:t><w:br/><w:t xml:space=\"preserve\">b</w:t></w:r>"
        );
    }

    #[test]
    fn test_run_font_in_half_points() {
        let r = Run::text("x").font("Courier New", 10.0).to_xml();
        assert_eq!(r.find("w:sz").unwrap().attribute("w:val"), Some("20"));
        assert_eq!(r.find("w:rFonts").unwrap().attribute("w:ascii"), Some("Courier New"));
        // properties precede content
        assert_eq!(r.elements().next().unwrap().name, "w:rPr");
    }

    #[test]
    fn test_paragraph_properties_first() {
        let mut p = Paragraph::with_style("Title").align(Alignment::Center);
        p.add_run(Run::text("Hi"));
        let xml = p.to_xml();
        let first = xml.elements().next().unwrap();
        assert_eq!(first.name, "w:pPr");
        assert_eq!(first.find("w:jc").unwrap().attribute("w:val"), Some("center"));
        assert_eq!(first.find("w:pStyle").unwrap().attribute("w:val"), Some("Title"));
    }

    #[test]
    fn test_raw_xml_goes_directly_under_paragraph() {
        let mut p = Paragraph::new();
        p.append_xml(XmlElement::new("m:oMathPara"));
        let xml = p.to_xml();
        assert_eq!(xml.elements().next().unwrap().name, "m:oMathPara");
    }

    #[test]
    fn test_document_declares_math_namespace() {
        let doc = Document::new(DefaultFont {
            family: "Arial".into(),
            size_pt: 11.0,
        });
        let xml = doc.to_xml();
        assert!(xml.attribute("xmlns:m").is_some());
        assert!(xml.find("w:sectPr").is_some());
    }
}
