//! WordprocessingML output.
//!
//! 1. [`xml`]      — owned XML tree plus `quick-xml` serializer
//! 2. [`document`] — paragraphs, runs and raw subtrees
//! 3. [`assemble`] — elements → paragraphs, inline vs. display equations,
//!    LaTeX fallback
//! 4. [`package`]  — zip the parts into a `.docx`

pub mod assemble;
pub mod document;
pub mod package;
pub mod xml;

pub use assemble::{assemble, display_alignment, insert_formula, AssemblyStats, DocumentAssembler};
pub use document::{Alignment, Document, Paragraph, Run};
pub use package::write_docx;
