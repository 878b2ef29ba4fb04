//! # edgequake-math2docx
//!
//! Convert images of math problems into editable Word documents using
//! Vision Language Models (VLMs).
//!
//! ## Why this crate?
//!
//! Classic OCR reads `x²` as `x2` and a fraction bar as a dash. A VLM reads
//! a worksheet photo the way a person would and writes the formulas out as
//! LaTeX. This crate takes that LaTeX the rest of the way: it repairs the
//! model's usual slips, converts every formula to MathML and then to Office
//! Math (OMML), and writes a `.docx` in which every equation is a native,
//! editable Word equation rather than a picture.
//!
//! ## Pipeline Overview
//!
//! ```text
//! Image
//!  │
//!  ├─ 1. Input      read file or download URL, check it decodes
//!  ├─ 2. Slice      downscale wide images, cut tall ones into overlapping strips
//!  ├─ 3. VLM        concurrent calls, one per strip, results kept in order
//!  ├─ 4. Merge      clean each transcript, drop text repeated at strip seams
//!  ├─ 5. Normalize  OCR repairs: Unicode symbols, missing carets and braces
//!  ├─ 6. Segment    $$…$$ → display formulas, $…$ stays inline in text
//!  ├─ 7. Convert    LaTeX → MathML → OMML, LaTeX source on failure
//!  └─ 8. Package    paragraphs, runs and equations zipped into a .docx
//! ```
//!
//! Steps 5–8 need no network; [`render_docx`] runs them on a saved
//! transcript.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_math2docx::{convert_to_file, ConversionConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider auto-detected from OPENAI_API_KEY / ANTHROPIC_API_KEY / GEMINI_API_KEY
//!     let config = ConversionConfig::builder().title("Homework 3").build()?;
//!     let stats = convert_to_file("worksheet.jpg", "worksheet.docx", &config).await?;
//!     eprintln!(
//!         "{} formulas, {} kept as LaTeX, tokens: {} in / {} out",
//!         stats.display_formulas + stats.inline_formulas,
//!         stats.fallback_formulas,
//!         stats.total_input_tokens,
//!         stats.total_output_tokens
//!     );
//!     Ok(())
//! }
//! ```
//!
//! Offline, from a transcript:
//!
//! ```rust
//! use edgequake_math2docx::{render_docx, DocumentConfig};
//!
//! let docx = render_docx(
//!     "Solve the system:\n$$\\begin{aligned} x+y &= 3 \\\\ x-y &= 1 \\end{aligned}$$",
//!     &DocumentConfig::default(),
//! )
//! .unwrap();
//! assert_eq!(&docx[..2], b"PK");
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `math2docx` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! edgequake-math2docx = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod convert;
pub mod docx;
pub mod error;
pub mod math;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ConversionConfig, ConversionConfigBuilder, DocumentConfig, MergeConfig};
pub use convert::{
    build_document, convert, convert_sync, convert_to_file, parse_document, render_docx,
    RenderedDocument,
};
pub use error::{ConversionError, MathDocxError, SliceError};
pub use math::{Element, FormulaElement, FormulaType, TextElement};
pub use output::{ConversionOutput, ConversionStats, SliceResult};
pub use pipeline::merge::{reconcile, MergeDecision, SliceMerger};
pub use progress::{ConversionProgressCallback, NoopProgressCallback, ProgressCallback};
