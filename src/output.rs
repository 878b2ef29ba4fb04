//! Conversion results: the document, the transcript and per-slice detail.

use serde::{Deserialize, Serialize};

use crate::docx::AssemblyStats;
use crate::error::SliceError;
use crate::math::Element;
use crate::pipeline::merge::MergeDecision;

/// Everything a conversion produced.
#[derive(Debug, Clone)]
pub struct ConversionOutput {
    /// Merged and normalized transcript the document was built from.
    pub text: String,
    /// Segmented transcript, in reading order.
    pub elements: Vec<Element>,
    /// The `.docx` file contents.
    pub docx: Vec<u8>,
    /// One entry per slice, in slice order.
    pub slices: Vec<SliceResult>,
    pub stats: ConversionStats,
}

/// Outcome of transcribing one image slice.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SliceResult {
    /// 1-indexed slice number, top to bottom.
    pub slice_num: usize,
    /// Top edge of the slice in the (pre-scaled) image, in pixels.
    pub top_px: u32,
    pub height_px: u32,
    /// Cleaned transcript of the slice; empty on failure.
    pub text: String,
    pub input_tokens: usize,
    pub output_tokens: usize,
    pub duration_ms: u64,
    pub retries: u8,
    /// How the transcript was merged; `None` for failed slices.
    pub merge: Option<MergeDecision>,
    pub error: Option<SliceError>,
}

impl SliceResult {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Aggregate statistics of a conversion.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConversionStats {
    pub total_slices: usize,
    pub processed_slices: usize,
    pub failed_slices: usize,
    /// Slices whose whole transcript duplicated text already merged.
    pub discarded_slices: usize,
    pub display_formulas: usize,
    pub inline_formulas: usize,
    /// Formulas written as LaTeX source instead of an equation.
    pub fallback_formulas: usize,
    pub total_input_tokens: u64,
    pub total_output_tokens: u64,
    pub total_duration_ms: u64,
    pub llm_duration_ms: u64,
}

impl ConversionStats {
    /// Copy the document-side counts from the assembler.
    pub fn with_assembly(mut self, assembly: &AssemblyStats) -> Self {
        self.display_formulas = assembly.display_formulas;
        self.inline_formulas = assembly.inline_formulas;
        self.fallback_formulas = assembly.fallback_formulas;
        self
    }
}
