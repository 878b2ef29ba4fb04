//! A small owned XML tree and its serializer.
//!
//! Both the OMML translator and the WordprocessingML assembler build their
//! output as [`XmlElement`] values and hand them to [`to_xml_bytes`] at the
//! end. Building a tree (rather than streaming events) lets the assembler
//! append an equation subtree to a paragraph or a run after the fact, and
//! lets tests inspect the structure without re-parsing text.

use std::io::Cursor;

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;

use crate::error::MathDocxError;

/// A child of an [`XmlElement`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum XmlNode {
    Element(XmlElement),
    Text(String),
}

/// An element with a (prefixed) name, attributes in insertion order, and
/// children.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlElement {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<XmlNode>,
}

impl XmlElement {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Element with a single `…:val` attribute, the common OOXML property
    /// shape (`<m:chr m:val="∑"/>`). The prefix is taken from `name`.
    pub fn with_val(name: &str, val: impl Into<String>) -> Self {
        let prefix = name.split_once(':').map_or("", |(p, _)| p);
        let key = if prefix.is_empty() {
            "val".to_string()
        } else {
            format!("{prefix}:val")
        };
        Self::new(name).attr(key, val)
    }

    pub fn attr(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.push((key.into(), value.into()));
        self
    }

    pub fn child(mut self, child: XmlElement) -> Self {
        self.children.push(XmlNode::Element(child));
        self
    }

    pub fn with_children(mut self, children: impl IntoIterator<Item = XmlElement>) -> Self {
        self.children
            .extend(children.into_iter().map(XmlNode::Element));
        self
    }

    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.children.push(XmlNode::Text(text.into()));
        self
    }

    pub fn push(&mut self, child: XmlElement) {
        self.children.push(XmlNode::Element(child));
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Direct element children.
    pub fn elements(&self) -> impl Iterator<Item = &XmlElement> {
        self.children.iter().filter_map(|c| match c {
            XmlNode::Element(e) => Some(e),
            XmlNode::Text(_) => None,
        })
    }

    /// All descendant elements in document order, `self` excluded.
    pub fn descendants(&self) -> Vec<&XmlElement> {
        let mut out = Vec::new();
        for e in self.elements() {
            out.push(e);
            out.extend(e.descendants());
        }
        out
    }

    /// First descendant element called `name`.
    pub fn find(&self, name: &str) -> Option<&XmlElement> {
        self.descendants().into_iter().find(|e| e.name == name)
    }

    /// Concatenated text of this element and its descendants.
    pub fn text_content(&self) -> String {
        let mut out = String::new();
        for c in &self.children {
            match c {
                XmlNode::Text(t) => out.push_str(t),
                XmlNode::Element(e) => out.push_str(&e.text_content()),
            }
        }
        out
    }

    pub fn write_to<W: std::io::Write>(&self, writer: &mut Writer<W>) -> quick_xml::Result<()> {
        let mut start = BytesStart::new(self.name.as_str());
        for (k, v) in &self.attributes {
            start.push_attribute((k.as_str(), v.as_str()));
        }
        if self.children.is_empty() {
            return writer.write_event(Event::Empty(start));
        }
        writer.write_event(Event::Start(start))?;
        for c in &self.children {
            match c {
                XmlNode::Element(e) => e.write_to(writer)?,
                XmlNode::Text(t) => writer.write_event(Event::Text(BytesText::new(t)))?,
            }
        }
        writer.write_event(Event::End(BytesEnd::new(self.name.as_str())))
    }

    /// Serialize without an XML declaration (for logging and tests).
    pub fn to_xml_string(&self) -> String {
        let mut writer = Writer::new(Cursor::new(Vec::new()));
        match self.write_to(&mut writer) {
            Ok(()) => String::from_utf8_lossy(&writer.into_inner().into_inner()).into_owned(),
            Err(e) => format!("<!-- serialization failed: {e} -->"),
        }
    }
}

/// Serialize `root` as a standalone UTF-8 XML part.
pub fn to_xml_bytes(root: &XmlElement) -> Result<Vec<u8>, MathDocxError> {
    let mut writer = Writer::new(Cursor::new(Vec::new()));
    writer
        .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), Some("yes"))))
        .and_then(|_| root.write_to(&mut writer))
        .map_err(|e| MathDocxError::Packaging(format!("XML serialization of <{}>: {e}", root.name)))?;
    Ok(writer.into_inner().into_inner())
}
