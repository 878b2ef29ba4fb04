//! Text and formula processing: everything between a merged transcript and
//! an Office Math tree.
//!
//! ```text
//! transcript ──▶ normalize ──▶ segment ──▶ mathml ──▶ omml
//!               (OCR repair)   ($$ spans)  (latex2mathml) (m:oMath)
//! ```
//!
//! All of it is pure, synchronous string and tree work with no I/O.

pub mod mathml;
pub mod normalize;
pub mod omml;
pub mod segment;

pub use mathml::{to_mathml, to_mathml_styled};
pub use normalize::normalize;
pub use omml::{mathml_to_omml, MathNode, MathTag};
pub use segment::{reconstruct, segment, Element, FormulaElement, FormulaType, TextElement};
