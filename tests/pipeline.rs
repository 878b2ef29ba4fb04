//! Offline integration tests: transcript → normalized text → elements →
//! .docx, checked by reading the package back.
//!
//! No network and no API key needed:
//!   cargo test --test pipeline

use edgequake_math2docx::{
    build_document, convert, reconcile, ConversionConfig, DocumentConfig, Element, FormulaType,
    MathDocxError, MergeConfig, MergeDecision, SliceMerger,
};
use std::io::{Cursor, Read};

// ── Test helpers ─────────────────────────────────────────────────────────────

/// Read one part of a .docx package as a string.
fn read_part(docx: &[u8], name: &str) -> String {
    let mut archive = zip::ZipArchive::new(Cursor::new(docx)).expect("valid zip");
    let mut file = archive.by_name(name).expect("part present");
    let mut xml = String::new();
    file.read_to_string(&mut xml).expect("utf-8 part");
    xml
}

/// Count elements with the given namespace-qualified local name.
fn count(xml: &str, ns: &str, local: &str) -> usize {
    let doc = roxmltree::Document::parse(xml).expect("well-formed XML");
    doc.descendants()
        .filter(|n| n.tag_name().name() == local && n.tag_name().namespace() == Some(ns))
        .count()
}

/// `m:val` of every math element with the given local name.
fn math_vals(xml: &str, local: &str) -> Vec<String> {
    let doc = roxmltree::Document::parse(xml).expect("well-formed XML");
    doc.descendants()
        .filter(|n| n.tag_name().name() == local && n.tag_name().namespace() == Some(M))
        .filter_map(|n| n.attribute((M, "val")).map(str::to_string))
        .collect()
}

const W: &str = "http://schemas.openxmlformats.org/wordprocessingml/2006/main";
const M: &str = "http://schemas.openxmlformats.org/officeDocument/2006/math";

const WORKSHEET: &str = "\
Problem 1. Simplify the fraction.
$$\\frac{x^2-1}{x-1}$$

Problem 2. If $a=3$ and $b=4$, find $c$ such that
$$c=\\sqrt{a^2+b^2}$$

Problem 3. Solve the system:
$$\\begin{aligned} x+y &= 3 \\\\ x-y &= 1 \\end{aligned}$$
";

// ── Transcript → document ────────────────────────────────────────────────────

#[test]
fn test_worksheet_produces_native_equations() {
    let rendered = build_document(WORKSHEET, &DocumentConfig::default()).expect("document");

    assert_eq!(rendered.assembly.display_formulas, 3);
    assert_eq!(rendered.assembly.inline_formulas, 3);
    assert_eq!(rendered.assembly.fallback_formulas, 0);

    let xml = read_part(&rendered.docx, "word/document.xml");
    assert_eq!(count(&xml, M, "oMathPara"), 3);
    // 3 inside the display paragraphs, 3 inline
    assert_eq!(count(&xml, M, "oMath"), 6);
    assert!(count(&xml, M, "f") >= 1, "fraction expected");
    assert!(count(&xml, M, "rad") >= 1, "square root expected");
}

#[test]
fn test_elements_keep_reading_order() {
    let rendered = build_document(WORKSHEET, &DocumentConfig::default()).expect("document");

    let kinds: Vec<&str> = rendered
        .elements
        .iter()
        .filter(|e| match e {
            Element::Text(t) => !t.content.trim().is_empty(),
            Element::Formula(_) => true,
        })
        .map(|e| match e {
            Element::Text(_) => "text",
            Element::Formula(f) if f.formula_type == FormulaType::Display => "display",
            Element::Formula(_) => "inline",
        })
        .collect();
    assert_eq!(
        kinds,
        vec!["text", "display", "text", "display", "text", "display"]
    );
}

#[test]
fn test_ocr_repairs_reach_the_document() {
    // Unicode operators and a missing caret are repaired before conversion.
    let rendered =
        build_document("Show that $$x2 ≤ 1$$ when $|x| ≤ 1$.", &DocumentConfig::default())
            .expect("document");
    assert!(rendered.text.contains("\\leq"));
    assert!(!rendered.text.contains('≤'));
    assert_eq!(rendered.assembly.fallback_formulas, 0);
}

#[test]
fn test_broken_formula_is_kept_as_source() {
    let rendered = build_document(
        "Evaluate:\n$$\\frac{1}{2$$\nthen simplify.",
        &DocumentConfig::default(),
    )
    .expect("a bad formula never fails the document");

    assert_eq!(rendered.assembly.fallback_formulas, 1);
    let xml = read_part(&rendered.docx, "word/document.xml");
    assert!(xml.contains("\\frac{1}{2"));
    assert_eq!(count(&xml, M, "oMathPara"), 0);
}

#[test]
fn test_title_and_footer() {
    let config = DocumentConfig {
        title: Some("Homework 3".to_string()),
        footer: Some("Transcribed by math2docx".to_string()),
        ..DocumentConfig::default()
    };
    let rendered = build_document("Find $x$.", &config).expect("document");

    let xml = read_part(&rendered.docx, "word/document.xml");
    assert!(xml.contains("Homework 3"));
    assert!(xml.contains("Transcribed by math2docx"));

    let core = read_part(&rendered.docx, "docProps/core.xml");
    assert!(core.contains("<dc:title>Homework 3</dc:title>"));
}

#[test]
fn test_body_font_in_styles() {
    let config = DocumentConfig {
        font_family: "Cambria".to_string(),
        font_size_pt: 12.0,
        ..DocumentConfig::default()
    };
    let rendered = build_document("Text only.", &config).expect("document");

    let styles = read_part(&rendered.docx, "word/styles.xml");
    assert!(styles.contains("Cambria"));
    // 12pt in half-points
    assert!(styles.contains("w:val=\"24\""));
}

#[test]
fn test_empty_transcript_still_packages() {
    let rendered = build_document("", &DocumentConfig::default()).expect("document");
    assert_eq!(&rendered.docx[..2], b"PK");
    let xml = read_part(&rendered.docx, "word/document.xml");
    assert_eq!(count(&xml, W, "body"), 1);
    assert_eq!(count(&xml, M, "oMath"), 0);
}

#[test]
fn test_relations_and_escaped_ampersand_are_native() {
    let rendered = build_document("Solve $x < 3$ and $A \\& B$.", &DocumentConfig::default())
        .expect("document");
    assert_eq!(rendered.assembly.inline_formulas, 2);
    assert_eq!(rendered.assembly.fallback_formulas, 0);
    let xml = read_part(&rendered.docx, "word/document.xml");
    assert_eq!(count(&xml, M, "oMath"), 2);
}

#[test]
fn test_common_command_spellings_are_native() {
    let rendered = build_document(
        "Given $a \\ge 0$ and $\\dfrac{1}{2}$ with $f^{\\prime}(x)$.",
        &DocumentConfig::default(),
    )
    .expect("document");
    assert_eq!(rendered.assembly.inline_formulas, 3);
    assert_eq!(rendered.assembly.fallback_formulas, 0);
}

#[test]
fn test_piecewise_function_is_left_aligned_equation() {
    let rendered = build_document(
        "$$f(x)=\\begin{cases} x & x>0 \\\\ -x & x\\le 0 \\end{cases}$$",
        &DocumentConfig::default(),
    )
    .expect("document");
    assert_eq!(rendered.assembly.display_formulas, 1);
    assert_eq!(rendered.assembly.fallback_formulas, 0);
    let xml = read_part(&rendered.docx, "word/document.xml");
    assert_eq!(math_vals(&xml, "jc"), vec!["left"]);
}

#[test]
fn test_curly_bracket_matrix_keeps_braces() {
    let rendered = build_document(
        "$$\\begin{Bmatrix} 1 & 0 \\\\ 0 & 1 \\end{Bmatrix}$$",
        &DocumentConfig::default(),
    )
    .expect("document");
    assert_eq!(rendered.assembly.fallback_formulas, 0);
    let xml = read_part(&rendered.docx, "word/document.xml");
    assert_eq!(math_vals(&xml, "begChr"), vec!["{"]);
    assert_eq!(math_vals(&xml, "endChr"), vec!["}"]);
    assert_eq!(count(&xml, M, "m"), 1);
}

// ── Slice merging ────────────────────────────────────────────────────────────

#[test]
fn test_overlapping_slices_merge_without_duplicates() {
    let first = "Problem 1. Compute the derivative of $f(x)=x^3$.\n\
                 Problem 2. Evaluate the integral $$\\int_0^1 x dx$$\n";
    let second = "Problem 2. Evaluate the integral $$\\int_0^1 x dx$$\n\
                  Problem 3. Factor $x^2-4$.\n";

    let mut merger = SliceMerger::new(MergeConfig::default());
    assert_eq!(merger.push(first), MergeDecision::Appended);
    assert!(matches!(merger.push(second), MergeDecision::Trimmed { .. }));
    let merged = merger.finish();

    assert_eq!(merged.matches("Problem 2.").count(), 1);
    assert!(merged.contains("Problem 3."));

    let rendered = build_document(&merged, &DocumentConfig::default()).expect("document");
    assert_eq!(rendered.assembly.display_formulas, 1);
}

#[test]
fn test_reconcile_without_overlap_appends() {
    let appended = reconcile("First part of the page.\n", "Unrelated next part.\n");
    assert_eq!(appended, "Unrelated next part.\n");
}

#[test]
fn test_reconcile_repeated_slice_is_empty() {
    let tail = "Problem 4. Find all real roots of $x^3-x=0$.\n";
    let existing = format!("Problem 3. Factor $x^2-4$.\n{tail}");
    assert_eq!(reconcile(&existing, tail), "");
}

// ── Errors before any LLM call ───────────────────────────────────────────────

#[tokio::test]
async fn test_convert_missing_file() {
    let config = ConversionConfig::default();
    let err = convert("/definitely/not/a/real/image.png", &config)
        .await
        .expect_err("missing file");
    assert!(matches!(err, MathDocxError::FileNotFound { .. }));
}

#[tokio::test]
async fn test_convert_rejects_non_image() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("notes.png");
    std::fs::write(&path, b"these are not pixels").expect("write");

    let err = convert(path.to_str().expect("utf-8 path"), &ConversionConfig::default())
        .await
        .expect_err("not an image");
    assert!(matches!(err, MathDocxError::NotAnImage { .. }));
}
