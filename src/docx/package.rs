//! OPC packaging: write a [`Document`] as a minimal `.docx` zip.
//!
//! Parts written:
//!
//! | Part                           | Content                                 |
//! |--------------------------------|-----------------------------------------|
//! | `[Content_Types].xml`          | content types for every part            |
//! | `_rels/.rels`                  | package relationships                   |
//! | `docProps/core.xml`            | title, author, subject                  |
//! | `word/document.xml`            | body (`w`, `m`, `r` namespaces)         |
//! | `word/styles.xml`              | Normal, Title, Heading1, Heading2       |
//! | `word/_rels/document.xml.rels` | link from the document to its styles    |

use std::io::{Cursor, Write};

use tracing::debug;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::docx::document::{DefaultFont, Document};
use crate::docx::xml::{to_xml_bytes, XmlElement};
use crate::error::MathDocxError;

const NS_CONTENT_TYPES: &str = "http://schemas.openxmlformats.org/package/2006/content-types";
const NS_RELATIONSHIPS: &str = "http://schemas.openxmlformats.org/package/2006/relationships";
const NS_WORDML: &str = "http://schemas.openxmlformats.org/wordprocessingml/2006/main";

const REL_OFFICE_DOCUMENT: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument";
const REL_CORE_PROPERTIES: &str =
    "http://schemas.openxmlformats.org/package/2006/relationships/metadata/core-properties";
const REL_STYLES: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles";

/// Serialize `document` to `.docx` bytes.
pub fn write_docx(document: &Document) -> Result<Vec<u8>, MathDocxError> {
    let parts: [(&str, XmlElement); 6] = [
        ("[Content_Types].xml", content_types()),
        ("_rels/.rels", package_rels()),
        ("docProps/core.xml", core_properties(document)),
        ("word/document.xml", document.to_xml()),
        ("word/styles.xml", styles(&document.default_font)),
        ("word/_rels/document.xml.rels", document_rels()),
    ];

    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    for (name, root) in &parts {
        let bytes = to_xml_bytes(root)?;
        debug!("Writing part {} ({} bytes)", name, bytes.len());
        zip.start_file(*name, options)?;
        zip.write_all(&bytes)
            .map_err(|e| MathDocxError::Packaging(format!("writing {name}: {e}")))?;
    }

    let cursor = zip.finish()?;
    Ok(cursor.into_inner())
}

fn content_types() -> XmlElement {
    let default = |ext: &str, ty: &str| {
        XmlElement::new("Default")
            .attr("Extension", ext)
            .attr("ContentType", ty)
    };
    let over = |part: &str, ty: &str| {
        XmlElement::new("Override")
            .attr("PartName", part)
            .attr("ContentType", ty)
    };
    XmlElement::new("Types")
        .attr("xmlns", NS_CONTENT_TYPES)
        .child(default(
            "rels",
            "application/vnd.openxmlformats-package.relationships+xml",
        ))
        .child(default("xml", "application/xml"))
        .child(over(
            "/word/document.xml",
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml",
        ))
        .child(over(
            "/word/styles.xml",
            "application/vnd.openxmlformats-officedocument.wordprocessingml.styles+xml",
        ))
        .child(over(
            "/docProps/core.xml",
            "application/vnd.openxmlformats-package.core-properties+xml",
        ))
}

fn relationship(id: &str, ty: &str, target: &str) -> XmlElement {
    XmlElement::new("Relationship")
        .attr("Id", id)
        .attr("Type", ty)
        .attr("Target", target)
}

fn package_rels() -> XmlElement {
    XmlElement::new("Relationships")
        .attr("xmlns", NS_RELATIONSHIPS)
        .child(relationship("rId1", REL_OFFICE_DOCUMENT, "word/document.xml"))
        .child(relationship("rId2", REL_CORE_PROPERTIES, "docProps/core.xml"))
}

fn document_rels() -> XmlElement {
    XmlElement::new("Relationships")
        .attr("xmlns", NS_RELATIONSHIPS)
        .child(relationship("rId1", REL_STYLES, "styles.xml"))
}

fn core_properties(document: &Document) -> XmlElement {
    let props = &document.properties;
    let mut root = XmlElement::new("cp:coreProperties")
        .attr(
            "xmlns:cp",
            "http://schemas.openxmlformats.org/package/2006/metadata/core-properties",
        )
        .attr("xmlns:dc", "http://purl.org/dc/elements/1.1/")
        .attr("xmlns:dcterms", "http://purl.org/dc/terms/")
        .attr("xmlns:xsi", "http://www.w3.org/2001/XMLSchema-instance");
    if let Some(title) = &props.title {
        root.push(XmlElement::new("dc:title").text(title.as_str()));
    }
    if let Some(subject) = &props.subject {
        root.push(XmlElement::new("dc:subject").text(subject.as_str()));
    }
    if let Some(author) = &props.author {
        root.push(XmlElement::new("dc:creator").text(author.as_str()));
    }
    root
}

fn styles(font: &DefaultFont) -> XmlElement {
    let half_points = |pt: f32| ((pt * 2.0).round() as u32).to_string();
    let rfonts = |family: &str| {
        XmlElement::new("w:rFonts")
            .attr("w:ascii", family)
            .attr("w:hAnsi", family)
            .attr("w:eastAsia", family)
            .attr("w:cs", family)
    };

    let doc_defaults = XmlElement::new("w:docDefaults").child(
        XmlElement::new("w:rPrDefault").child(
            XmlElement::new("w:rPr")
                .child(rfonts(&font.family))
                .child(XmlElement::with_val("w:sz", half_points(font.size_pt))),
        ),
    );

    let paragraph_style = |id: &str, name: &str, size_pt: Option<f32>, bold: bool| {
        let mut style = XmlElement::new("w:style")
            .attr("w:type", "paragraph")
            .attr("w:styleId", id)
            .child(XmlElement::with_val("w:name", name));
        if id != "Normal" {
            style.push(XmlElement::with_val("w:basedOn", "Normal"));
            style.push(XmlElement::with_val("w:next", "Normal"));
            style.push(XmlElement::new("w:qFormat"));
            style.push(
                XmlElement::new("w:pPr").child(
                    XmlElement::new("w:spacing")
                        .attr("w:before", "240")
                        .attr("w:after", "120"),
                ),
            );
        } else {
            style = style.attr("w:default", "1").child(XmlElement::new("w:qFormat"));
            style.push(
                XmlElement::new("w:pPr")
                    .child(XmlElement::new("w:spacing").attr("w:after", "120")),
            );
        }
        let mut rpr = XmlElement::new("w:rPr");
        if bold {
            rpr.push(XmlElement::new("w:b"));
        }
        if let Some(pt) = size_pt {
            rpr.push(XmlElement::with_val("w:sz", half_points(pt)));
        }
        if !rpr.children.is_empty() {
            style.push(rpr);
        }
        style
    };

    XmlElement::new("w:styles")
        .attr("xmlns:w", NS_WORDML)
        .child(doc_defaults)
        .child(paragraph_style("Normal", "Normal", None, false))
        .child(paragraph_style("Title", "Title", Some(18.0), true))
        .child(paragraph_style("Heading1", "heading 1", Some(14.0), true))
        .child(paragraph_style("Heading2", "heading 2", Some(12.0), true))
}
