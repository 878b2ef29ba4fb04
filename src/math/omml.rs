//! MathML → OMML (Office Math Markup Language) translator.
//!
//! ## Why translate ourselves?
//!
//! Word stores editable equations as OMML, a vocabulary under the
//! `http://schemas.openxmlformats.org/officeDocument/2006/math` namespace
//! that is structurally close to presentation MathML but not identical:
//! fractions have explicit numerator/denominator slots, radicals carry a
//! "hide degree" flag, n-ary operators own their operand, and brackets around
//! a matrix are a delimiter object rather than two loose characters.
//!
//! ## Shape
//!
//! The MathML string is parsed once into an immutable [`MathNode`] tree with
//! a closed [`MathTag`] enum. [`translate`] is a pure function from that tree
//! to a freshly built [`XmlElement`]; nothing is mutated in place. Tags the
//! translator does not know are logged at `debug` and their children are
//! still translated, so one exotic node never costs the whole formula.

use tracing::debug;

use crate::docx::xml::XmlElement;
use crate::error::ConversionError;

// ── MathML tree ──────────────────────────────────────────────────────────────

/// Presentation MathML tags the translator understands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MathTag {
    Math,
    Mrow,
    Mi,
    Mn,
    Mo,
    Mtext,
    Ms,
    Mfrac,
    Msup,
    Msub,
    Msubsup,
    Msqrt,
    Mroot,
    Mover,
    Munder,
    Munderover,
    Mtable,
    Mtr,
    Mtd,
    Mspace,
    Mfenced,
    Mstyle,
    Mpadded,
    Mphantom,
    Semantics,
    Annotation,
    Other(String),
}

impl MathTag {
    fn from_name(name: &str) -> Self {
        match name {
            "math" => MathTag::Math,
            "mrow" => MathTag::Mrow,
            "mi" => MathTag::Mi,
            "mn" => MathTag::Mn,
            "mo" => MathTag::Mo,
            "mtext" => MathTag::Mtext,
            "ms" => MathTag::Ms,
            "mfrac" => MathTag::Mfrac,
            "msup" => MathTag::Msup,
            "msub" => MathTag::Msub,
            "msubsup" => MathTag::Msubsup,
            "msqrt" => MathTag::Msqrt,
            "mroot" => MathTag::Mroot,
            "mover" => MathTag::Mover,
            "munder" => MathTag::Munder,
            "munderover" => MathTag::Munderover,
            "mtable" => MathTag::Mtable,
            "mtr" | "mlabeledtr" => MathTag::Mtr,
            "mtd" => MathTag::Mtd,
            "mspace" => MathTag::Mspace,
            "mfenced" => MathTag::Mfenced,
            "mstyle" => MathTag::Mstyle,
            "mpadded" => MathTag::Mpadded,
            "mphantom" => MathTag::Mphantom,
            "semantics" => MathTag::Semantics,
            "annotation" | "annotation-xml" => MathTag::Annotation,
            other => MathTag::Other(other.to_string()),
        }
    }

    fn is_token(&self) -> bool {
        matches!(
            self,
            MathTag::Mi | MathTag::Mn | MathTag::Mo | MathTag::Mtext | MathTag::Ms
        )
    }
}

/// One node of a parsed MathML tree. Token elements carry their text;
/// layout elements carry their children.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MathNode {
    pub tag: MathTag,
    pub attributes: Vec<(String, String)>,
    pub text: String,
    pub children: Vec<MathNode>,
}

impl MathNode {
    /// Parse a MathML document (the `<math>` element is the root).
    pub fn parse(mathml: &str) -> Result<MathNode, ConversionError> {
        let doc = roxmltree::Document::parse(mathml)
            .map_err(|e| ConversionError::MalformedMathMl(e.to_string()))?;
        Ok(Self::from_xml(doc.root_element()))
    }

    fn from_xml(node: roxmltree::Node<'_, '_>) -> MathNode {
        let tag = MathTag::from_name(node.tag_name().name());
        let attributes = node
            .attributes()
            .map(|a| (a.name().to_string(), a.value().to_string()))
            .collect();
        let text = if tag.is_token() {
            node.descendants()
                .filter(|d| d.is_text())
                .filter_map(|d| d.text())
                .collect()
        } else {
            String::new()
        };
        let children = if tag.is_token() {
            Vec::new()
        } else {
            node.children()
                .filter(|c| c.is_element())
                .map(Self::from_xml)
                .collect()
        };
        MathNode {
            tag,
            attributes,
            text,
            children,
        }
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// The single `mtable` this node is or directly wraps, if any.
    fn as_table(&self) -> Option<&MathNode> {
        match self.tag {
            MathTag::Mtable => Some(self),
            MathTag::Mrow if self.children.len() == 1 => self.children[0].as_table(),
            _ => None,
        }
    }

    /// Operator text of an `mo`, possibly wrapped in a single-child `mrow`.
    fn operator_text(&self) -> Option<&str> {
        match self.tag {
            MathTag::Mo => Some(self.text.trim()),
            MathTag::Mrow if self.children.len() == 1 => self.children[0].operator_text(),
            _ => None,
        }
    }
}

// ── Glyph sets ───────────────────────────────────────────────────────────────

/// Delimiters accepted around a table for it to be read as a bracketed
/// matrix. The empty string is an invisible delimiter (`\right.`).
const MATRIX_BRACKETS: &[&str] = &[
    "", "(", ")", "[", "]", "{", "}", "|", "‖", "∥", "⟨", "⟩", "〈", "〉", "⌊", "⌋", "⌈", "⌉",
];

/// Operators that become an OMML n-ary object when scripted.
const NARY_OPERATORS: &[&str] = &[
    "∑", "∏", "∐", "∫", "∬", "∭", "∮", "∯", "∰", "⋃", "⋂", "⋁", "⋀", "⨁", "⨂",
];

/// Integrals keep their limits beside the sign; the others stack them.
const INTEGRALS: &[&str] = &["∫", "∬", "∭", "∮", "∯", "∰"];

/// Over-scripts rendered as an accent on the base.
const ACCENTS: &[&str] = &[
    "¯", "‾", "^", "ˆ", "~", "˜", "→", "⃗", "˙", "¨", "´", "`", "ˇ", "˘", "̂", "̃", "̄", "̇", "̈", "⏞", "⏟",
];

// ── Public API ───────────────────────────────────────────────────────────────

/// Parse `mathml` and translate it into an `m:oMath` element.
pub fn mathml_to_omml(mathml: &str) -> Result<XmlElement, ConversionError> {
    let root = MathNode::parse(mathml)?;
    Ok(translate(&root))
}

/// Translate a MathML tree into an `m:oMath` element.
pub fn translate(root: &MathNode) -> XmlElement {
    XmlElement::new("m:oMath").with_children(translate_node(root))
}

// ── Translation ──────────────────────────────────────────────────────────────

fn translate_node(node: &MathNode) -> Vec<XmlElement> {
    match &node.tag {
        MathTag::Mi => token_run(node, identifier_style(node)),
        MathTag::Mn | MathTag::Mo => token_run(node, RunStyle::Default),
        MathTag::Mtext | MathTag::Ms => token_run(node, RunStyle::Text),
        MathTag::Mspace => vec![space_run()],

        MathTag::Mrow => translate_row(node),
        MathTag::Math | MathTag::Mstyle | MathTag::Mpadded | MathTag::Semantics => {
            translate_sequence(&node.children)
        }
        MathTag::Mphantom | MathTag::Annotation => Vec::new(),

        MathTag::Mfrac => translate_fraction(node),
        MathTag::Msup | MathTag::Msub | MathTag::Msubsup => translate_script(node),
        MathTag::Msqrt => vec![radical(None, translate_sequence(&node.children))],
        MathTag::Mroot => match node.children.as_slice() {
            [base, degree] => vec![radical(Some(translate_node(degree)), translate_node(base))],
            _ => arity_mismatch(node, 2),
        },
        MathTag::Mover | MathTag::Munder | MathTag::Munderover => translate_under_over(node),

        MathTag::Mtable => vec![table(node)],
        MathTag::Mtr | MathTag::Mtd => translate_sequence(&node.children),
        MathTag::Mfenced => vec![fenced(node)],

        MathTag::Other(name) => {
            debug!("Skipping unsupported MathML element <{}>", name);
            translate_sequence(&node.children)
        }
    }
}

/// Translate siblings in order. A scripted n-ary operator takes the sibling
/// that follows it as its operand.
fn translate_sequence(nodes: &[MathNode]) -> Vec<XmlElement> {
    let mut out = Vec::new();
    let mut i = 0;
    while i < nodes.len() {
        if let Some(parts) = nary_parts(&nodes[i]) {
            let operand = nodes.get(i + 1).filter(|n| n.tag != MathTag::Mo);
            let body = operand.map(translate_node).unwrap_or_default();
            out.push(nary(parts, body));
            i += if operand.is_some() { 2 } else { 1 };
            continue;
        }
        out.extend(translate_node(&nodes[i]));
        i += 1;
    }
    out
}

fn translate_row(node: &MathNode) -> Vec<XmlElement> {
    if let Some(d) = bracketed_matrix(node) {
        return vec![d];
    }
    translate_sequence(&node.children)
}

fn arity_mismatch(node: &MathNode, expected: usize) -> Vec<XmlElement> {
    debug!(
        "MathML <{:?}> has {} children, expected {}; translating as a row",
        node.tag,
        node.children.len(),
        expected
    );
    translate_sequence(&node.children)
}

// ── Runs ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunStyle {
    /// Word's default: italic letters, upright digits and operators.
    Default,
    /// Upright identifier (`sin`, `lim`, `mathvariant="normal"`).
    Plain,
    /// Ordinary text inside an equation.
    Text,
}

fn identifier_style(node: &MathNode) -> RunStyle {
    if node.attribute("mathvariant") == Some("normal") || node.text.trim().chars().count() > 1 {
        RunStyle::Plain
    } else {
        RunStyle::Default
    }
}

fn token_run(node: &MathNode, style: RunStyle) -> Vec<XmlElement> {
    if node.text.is_empty() {
        return Vec::new();
    }
    vec![run(&node.text, style)]
}

fn run(text: &str, style: RunStyle) -> XmlElement {
    let mut r = XmlElement::new("m:r");
    match style {
        RunStyle::Default => {}
        RunStyle::Plain => {
            r.push(XmlElement::new("m:rPr").child(XmlElement::with_val("m:sty", "p")));
        }
        RunStyle::Text => {
            r.push(XmlElement::new("m:rPr").child(XmlElement::new("m:nor")));
        }
    }
    let mut t = XmlElement::new("m:t");
    if text.starts_with(char::is_whitespace) || text.ends_with(char::is_whitespace) {
        t = t.attr("xml:space", "preserve");
    }
    r.child(t.text(text))
}

fn space_run() -> XmlElement {
    XmlElement::new("m:r").child(
        XmlElement::new("m:t")
            .attr("xml:space", "preserve")
            .text(" "),
    )
}

/// Wrap translated content in an OMML argument slot (`m:e`, `m:num`, …).
fn slot(name: &str, content: Vec<XmlElement>) -> XmlElement {
    XmlElement::new(name).with_children(content)
}

// ── Fractions, scripts, radicals ─────────────────────────────────────────────

fn translate_fraction(node: &MathNode) -> Vec<XmlElement> {
    let [num, den] = node.children.as_slice() else {
        return arity_mismatch(node, 2);
    };
    let mut f = XmlElement::new("m:f");
    // \binom and friends
    if node.attribute("linethickness").is_some_and(|t| t.trim_start_matches('0').is_empty()) {
        f.push(XmlElement::new("m:fPr").child(XmlElement::with_val("m:type", "noBar")));
    }
    vec![f
        .child(slot("m:num", translate_node(num)))
        .child(slot("m:den", translate_node(den)))]
}

fn translate_script(node: &MathNode) -> Vec<XmlElement> {
    if nary_parts(node).is_some() {
        return translate_sequence(std::slice::from_ref(node));
    }
    match (&node.tag, node.children.as_slice()) {
        (MathTag::Msup, [base, sup]) => vec![XmlElement::new("m:sSup")
            .child(slot("m:e", translate_node(base)))
            .child(slot("m:sup", translate_node(sup)))],
        (MathTag::Msub, [base, sub]) => vec![XmlElement::new("m:sSub")
            .child(slot("m:e", translate_node(base)))
            .child(slot("m:sub", translate_node(sub)))],
        (MathTag::Msubsup, [base, sub, sup]) => vec![XmlElement::new("m:sSubSup")
            .child(slot("m:e", translate_node(base)))
            .child(slot("m:sub", translate_node(sub)))
            .child(slot("m:sup", translate_node(sup)))],
        (MathTag::Msubsup, _) => arity_mismatch(node, 3),
        _ => arity_mismatch(node, 2),
    }
}

fn radical(degree: Option<Vec<XmlElement>>, body: Vec<XmlElement>) -> XmlElement {
    let mut rad = XmlElement::new("m:rad");
    match degree {
        None => {
            rad.push(XmlElement::new("m:radPr").child(XmlElement::with_val("m:degHide", "1")));
            rad.push(XmlElement::new("m:deg"));
        }
        Some(d) => rad.push(slot("m:deg", d)),
    }
    rad.child(slot("m:e", body))
}

// ── Over / under ─────────────────────────────────────────────────────────────

fn translate_under_over(node: &MathNode) -> Vec<XmlElement> {
    if nary_parts(node).is_some() {
        // scripted large operator outside a row: nothing to take as operand
        return translate_sequence(std::slice::from_ref(node));
    }
    match (&node.tag, node.children.as_slice()) {
        (MathTag::Mover, [base, over]) => {
            let marked = node.attribute("accent") == Some("true")
                || over.attribute("accent") == Some("true");
            let accent = over
                .operator_text()
                .filter(|t| marked || ACCENTS.contains(t))
                .map(accent_char);
            match accent {
                Some(chr) => vec![XmlElement::new("m:acc")
                    .child(XmlElement::new("m:accPr").child(XmlElement::with_val("m:chr", chr)))
                    .child(slot("m:e", translate_node(base)))],
                None => vec![XmlElement::new("m:limUpp")
                    .child(slot("m:e", translate_node(base)))
                    .child(slot("m:lim", translate_node(over)))],
            }
        }
        (MathTag::Munder, [base, under]) => vec![XmlElement::new("m:limLow")
            .child(slot("m:e", translate_node(base)))
            .child(slot("m:lim", translate_node(under)))],
        (MathTag::Munderover, [base, under, over]) => vec![XmlElement::new("m:limUpp")
            .child(slot(
                "m:e",
                vec![XmlElement::new("m:limLow")
                    .child(slot("m:e", translate_node(base)))
                    .child(slot("m:lim", translate_node(under)))],
            ))
            .child(slot("m:lim", translate_node(over)))],
        (MathTag::Munderover, _) => arity_mismatch(node, 3),
        _ => arity_mismatch(node, 2),
    }
}

/// Overline glyphs all become the macron Word draws as a bar.
fn accent_char(chr: &str) -> &str {
    match chr {
        "_" | "‾" | "\u{0305}" => "¯",
        other => other,
    }
}

// ── N-ary operators ──────────────────────────────────────────────────────────

/// Operator glyph, limit placement and limits of a scripted large operator.
struct NaryParts<'a> {
    chr: &'a str,
    stacked: bool,
    sub: Option<&'a MathNode>,
    sup: Option<&'a MathNode>,
}

fn nary_parts(node: &MathNode) -> Option<NaryParts<'_>> {
    let (stacked, base, sub, sup) = match (&node.tag, node.children.as_slice()) {
        (MathTag::Munderover, [b, under, over]) => (true, b, Some(under), Some(over)),
        (MathTag::Munder, [b, under]) => (true, b, Some(under), None),
        (MathTag::Mover, [b, over]) => (true, b, None, Some(over)),
        (MathTag::Msubsup, [b, sub, sup]) => (false, b, Some(sub), Some(sup)),
        (MathTag::Msub, [b, sub]) => (false, b, Some(sub), None),
        (MathTag::Msup, [b, sup]) => (false, b, None, Some(sup)),
        _ => return None,
    };
    let chr = base.operator_text().filter(|t| NARY_OPERATORS.contains(t))?;
    Some(NaryParts {
        chr,
        stacked: stacked && !INTEGRALS.contains(&chr),
        sub,
        sup,
    })
}

fn nary(parts: NaryParts<'_>, body: Vec<XmlElement>) -> XmlElement {
    let mut pr = XmlElement::new("m:naryPr").child(XmlElement::with_val("m:chr", parts.chr));
    pr.push(XmlElement::with_val(
        "m:limLoc",
        if parts.stacked { "undOvr" } else { "subSup" },
    ));
    if parts.sub.is_none() {
        pr.push(XmlElement::with_val("m:subHide", "1"));
    }
    if parts.sup.is_none() {
        pr.push(XmlElement::with_val("m:supHide", "1"));
    }
    XmlElement::new("m:nary")
        .child(pr)
        .child(slot("m:sub", parts.sub.map(translate_node).unwrap_or_default()))
        .child(slot("m:sup", parts.sup.map(translate_node).unwrap_or_default()))
        .child(slot("m:e", body))
}

// ── Tables, matrices, delimiters ─────────────────────────────────────────────

/// `[mo, mtable, mo]` with known bracket glyphs: one delimiter object around
/// a matrix, so the brackets stay attached to it.
fn bracketed_matrix(row: &MathNode) -> Option<XmlElement> {
    let [open, body, close] = row.children.as_slice() else {
        return None;
    };
    if open.tag != MathTag::Mo || close.tag != MathTag::Mo {
        return None;
    }
    let table = body.as_table()?;
    let (beg, end) = (open.text.trim(), close.text.trim());
    if !MATRIX_BRACKETS.contains(&beg) || !MATRIX_BRACKETS.contains(&end) {
        return None;
    }
    Some(delimiter(
        fence_char(beg),
        fence_char(end),
        vec![vec![matrix(table)]],
    ))
}

/// Word draws a norm bar with U+2016; `\|` arrives as the parallel sign.
fn fence_char(chr: &str) -> &str {
    if chr == "∥" {
        "‖"
    } else {
        chr
    }
}

fn rows_of(table: &MathNode) -> Vec<Vec<&MathNode>> {
    table
        .children
        .iter()
        .filter(|r| r.tag == MathTag::Mtr)
        .map(|r| r.children.iter().filter(|c| c.tag == MathTag::Mtd).collect())
        .collect()
}

/// A standalone table: one column is a stack of equations, several columns
/// are an unbracketed matrix.
fn table(node: &MathNode) -> XmlElement {
    let rows = rows_of(node);
    if rows.iter().all(|cells| cells.len() <= 1) {
        return XmlElement::new("m:eqArr").with_children(
            rows.iter()
                .map(|cells| slot("m:e", cells.iter().flat_map(|c| translate_node(c)).collect())),
        );
    }
    matrix(node)
}

fn matrix(node: &MathNode) -> XmlElement {
    let rows = rows_of(node);
    let columns = rows.iter().map(Vec::len).max().unwrap_or(0).max(1);
    let mpr = XmlElement::new("m:mPr").child(
        XmlElement::new("m:mcs").child(
            XmlElement::new("m:mc").child(
                XmlElement::new("m:mcPr")
                    .child(XmlElement::with_val("m:count", columns.to_string()))
                    .child(XmlElement::with_val("m:mcJc", "center")),
            ),
        ),
    );
    XmlElement::new("m:m").child(mpr).with_children(rows.iter().map(|cells| {
        let mut mr = XmlElement::new("m:mr");
        for i in 0..columns {
            let content = cells.get(i).map(|c| translate_node(c)).unwrap_or_default();
            mr.push(slot("m:e", content));
        }
        mr
    }))
}

fn fenced(node: &MathNode) -> XmlElement {
    let open = node.attribute("open").unwrap_or("(");
    let close = node.attribute("close").unwrap_or(")");
    let parts = node.children.iter().map(translate_node).collect();
    delimiter(open, close, parts)
}

/// `m:d` with one `m:e` per part.
fn delimiter(beg: &str, end: &str, parts: Vec<Vec<XmlElement>>) -> XmlElement {
    let pr = XmlElement::new("m:dPr")
        .child(XmlElement::with_val("m:begChr", beg))
        .child(XmlElement::with_val("m:endChr", end));
    XmlElement::new("m:d")
        .child(pr)
        .with_children(parts.into_iter().map(|p| slot("m:e", p)))
}

#[cfg(test)]
mod tests {
    use super::*;

    const NS: &str = r#"xmlns="http://www.w3.org/1998/Math/MathML""#;

    fn omml(body: &str) -> XmlElement {
        mathml_to_omml(&format!("<math {NS}>{body}</math>")).unwrap()
    }

    fn names(e: &XmlElement) -> Vec<&str> {
        e.descendants().iter().map(|d| d.name.as_str()).collect()
    }

    #[test]
    fn test_root_is_omath() {
        let o = omml("<mi>x</mi>");
        assert_eq!(o.name, "m:oMath");
        assert_eq!(o.to_xml_string(), "<m:oMath><m:r><m:t>x</m:t></m:r></m:oMath>");
    }

    #[test]
    fn test_fraction_slots() {
        let o = omml("<mfrac><mn>1</mn><mn>2</mn></mfrac>");
        let f = o.find("m:f").unwrap();
        assert_eq!(f.find("m:num").unwrap().text_content(), "1");
        assert_eq!(f.find("m:den").unwrap().text_content(), "2");
    }

    #[test]
    fn test_scripts() {
        let o = omml("<msup><mi>x</mi><mn>2</mn></msup><msub><mi>y</mi><mn>0</mn></msub>");
        assert!(names(&o).contains(&"m:sSup"));
        assert!(names(&o).contains(&"m:sSub"));
        let o = omml("<msubsup><mi>x</mi><mi>i</mi><mn>2</mn></msubsup>");
        let s = o.find("m:sSubSup").unwrap();
        assert_eq!(s.find("m:sub").unwrap().text_content(), "i");
        assert_eq!(s.find("m:sup").unwrap().text_content(), "2");
    }

    #[test]
    fn test_sqrt_hides_degree() {
        let o = omml("<msqrt><mi>x</mi></msqrt>");
        let rad = o.find("m:rad").unwrap();
        assert_eq!(rad.find("m:degHide").unwrap().attribute("m:val"), Some("1"));
        assert_eq!(rad.find("m:e").unwrap().text_content(), "x");
    }

    #[test]
    fn test_root_has_degree() {
        let o = omml("<mroot><mi>x</mi><mn>3</mn></mroot>");
        let rad = o.find("m:rad").unwrap();
        assert!(rad.find("m:degHide").is_none());
        assert_eq!(rad.find("m:deg").unwrap().text_content(), "3");
        assert_eq!(rad.find("m:e").unwrap().text_content(), "x");
    }

    #[test]
    fn test_multi_letter_identifier_is_upright() {
        let o = omml("<mi>sin</mi>");
        assert_eq!(o.find("m:sty").unwrap().attribute("m:val"), Some("p"));
        assert!(omml("<mi>x</mi>").find("m:sty").is_none());
    }

    #[test]
    fn test_unknown_tag_children_still_translated() {
        let o = omml("<mfoo><mi>a</mi><mi>b</mi></mfoo>");
        assert_eq!(o.text_content(), "ab");
    }

    #[test]
    fn test_space_preserved() {
        let o = omml("<mi>a</mi><mspace width=\"1em\"/><mi>b</mi>");
        assert_eq!(o.text_content(), "a b");
        let spaces: Vec<_> = o
            .descendants()
            .into_iter()
            .filter(|e| e.attribute("xml:space") == Some("preserve"))
            .collect();
        assert_eq!(spaces.len(), 1);
    }

    #[test]
    fn test_bracketed_matrix_becomes_delimiter() {
        let o = omml(
            "<mrow><mo>[</mo><mtable><mtr><mtd><mn>1</mn></mtd><mtd><mn>2</mn></mtd></mtr>\
             <mtr><mtd><mn>3</mn></mtd><mtd><mn>4</mn></mtd></mtr></mtable><mo>]</mo></mrow>",
        );
        let d = o.find("m:d").unwrap();
        assert_eq!(d.find("m:begChr").unwrap().attribute("m:val"), Some("["));
        assert_eq!(d.find("m:endChr").unwrap().attribute("m:val"), Some("]"));
        let m = d.find("m:m").unwrap();
        assert_eq!(m.find("m:count").unwrap().attribute("m:val"), Some("2"));
        assert_eq!(m.elements().filter(|e| e.name == "m:mr").count(), 2);
        // brackets are not also emitted as loose runs
        assert_eq!(o.text_content(), "1234");
    }

    #[test]
    fn test_non_bracket_operators_are_not_a_matrix() {
        let o = omml(
            "<mrow><mo>=</mo><mtable><mtr><mtd><mn>1</mn></mtd></mtr></mtable><mo>+</mo></mrow>",
        );
        assert!(o.find("m:d").is_none());
        assert_eq!(o.text_content(), "=1+");
    }

    #[test]
    fn test_single_column_table_is_equation_array() {
        let o = omml(
            "<mtable><mtr><mtd><mi>x</mi><mo>=</mo><mn>1</mn></mtd></mtr>\
             <mtr><mtd><mi>y</mi><mo>=</mo><mn>2</mn></mtd></mtr></mtable>",
        );
        let arr = o.find("m:eqArr").unwrap();
        let rows: Vec<_> = arr.elements().collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].text_content(), "x=1");
        assert_eq!(rows[1].text_content(), "y=2");
    }

    #[test]
    fn test_sum_with_limits_takes_operand() {
        let o = omml(
            "<munderover><mo>∑</mo><mrow><mi>i</mi><mo>=</mo><mn>1</mn></mrow><mi>n</mi></munderover>\
             <msub><mi>a</mi><mi>i</mi></msub>",
        );
        let n = o.find("m:nary").unwrap();
        assert_eq!(n.find("m:chr").unwrap().attribute("m:val"), Some("∑"));
        assert_eq!(n.find("m:limLoc").unwrap().attribute("m:val"), Some("undOvr"));
        assert_eq!(n.find("m:sub").unwrap().text_content(), "i=1");
        let e = n.elements().find(|c| c.name == "m:e").unwrap();
        assert_eq!(e.text_content(), "ai");
        // operand is not duplicated after the n-ary object
        assert_eq!(o.elements().count(), 1);
    }

    #[test]
    fn test_integral_keeps_side_limits() {
        let o = omml("<msubsup><mo>∫</mo><mn>0</mn><mn>1</mn></msubsup><mi>x</mi>");
        let n = o.find("m:nary").unwrap();
        assert_eq!(n.find("m:limLoc").unwrap().attribute("m:val"), Some("subSup"));
    }

    #[test]
    fn test_accent_and_limit() {
        let o = omml("<mover><mi>x</mi><mo>¯</mo></mover>");
        assert_eq!(o.find("m:acc").unwrap().find("m:chr").unwrap().attribute("m:val"), Some("¯"));
        let o = omml("<munder><mi>lim</mi><mrow><mi>x</mi><mo>→</mo><mn>0</mn></mrow></munder>");
        assert!(o.find("m:limLow").is_some());
    }

    #[test]
    fn test_overline_is_accent() {
        let o = omml(
            "<mover><mrow><mi>A</mi><mi>B</mi></mrow><mo accent=\"true\">_</mo></mover>",
        );
        let acc = o.find("m:acc").unwrap();
        assert_eq!(acc.find("m:chr").unwrap().attribute("m:val"), Some("¯"));
        assert_eq!(acc.find("m:e").unwrap().text_content(), "AB");
        assert!(o.find("m:limUpp").is_none());
        // an unmarked over-script stays a limit
        let o = omml("<mover><mo>=</mo><mo accent=\"false\">!</mo></mover>");
        assert!(o.find("m:limUpp").is_some());
    }

    #[test]
    fn test_matrix_environments_keep_their_brackets() {
        let cases = [
            ("pmatrix", "(", ")"),
            ("bmatrix", "[", "]"),
            ("vmatrix", "|", "|"),
            ("Bmatrix", "{", "}"),
            ("Vmatrix", "‖", "‖"),
        ];
        for (env, beg, end) in cases {
            let latex = format!(r"\begin{{{env}}} 1 & 2 \\ 3 & 4 \end{{{env}}}");
            let mathml = crate::math::mathml::to_mathml(&latex).unwrap();
            let o = mathml_to_omml(&mathml).unwrap();
            let d = o.find("m:d").unwrap_or_else(|| panic!("{env}: no delimiter"));
            assert_eq!(d.find("m:begChr").unwrap().attribute("m:val"), Some(beg), "{env}");
            assert_eq!(d.find("m:endChr").unwrap().attribute("m:val"), Some(end), "{env}");
            assert!(d.find("m:m").is_some(), "{env}");
        }
    }

    #[test]
    fn test_mfenced() {
        let o = omml("<mfenced open=\"{\" close=\"}\"><mi>a</mi><mi>b</mi></mfenced>");
        let d = o.find("m:d").unwrap();
        assert_eq!(d.find("m:begChr").unwrap().attribute("m:val"), Some("{"));
        assert_eq!(d.elements().filter(|e| e.name == "m:e").count(), 2);
    }

    #[test]
    fn test_malformed_mathml_is_error() {
        assert!(matches!(
            mathml_to_omml("<math><mi>x</math>"),
            Err(ConversionError::MalformedMathMl(_))
        ));
    }
}
