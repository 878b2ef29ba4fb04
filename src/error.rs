//! Error types for the edgequake-math2docx library.
//!
//! Three error types reflect three failure scopes:
//!
//! * [`MathDocxError`] — **Fatal**: the conversion cannot proceed at all
//!   (bad input file, not an image, provider not configured, every slice
//!   failed). Returned as `Err(MathDocxError)` from the top-level `convert*`
//!   functions.
//!
//! * [`SliceError`] — **Non-fatal**: one image slice failed (transient API
//!   error, timeout) but the others are fine. Stored inside
//!   [`crate::output::SliceResult`] so callers can inspect partial success
//!   rather than losing the whole document to one bad slice.
//!
//! * [`ConversionError`] — **Per formula**: a single LaTeX span could not be
//!   turned into an equation. It never crosses the document assembler; the
//!   formula is written as literal LaTeX instead.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the edgequake-math2docx library.
///
/// Slice-level failures use [`SliceError`] and are stored in
/// [`crate::output::SliceResult`] rather than propagated here.
#[derive(Debug, Error)]
pub enum MathDocxError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("Input file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The input string is not a valid file path or URL.
    #[error("Invalid input '{input}': not a file path or a valid HTTP/HTTPS URL")]
    InvalidInput { input: String },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'\nIncrease --download-timeout.")]
    DownloadTimeout { url: String, secs: u64 },

    /// The bytes were read but do not decode as a supported image.
    #[error("Input is not a decodable image: '{source_name}'\n{detail}")]
    NotAnImage { source_name: String, detail: String },

    // ── LLM errors ────────────────────────────────────────────────────────
    /// The configured provider is not initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// Every slice failed after all retries; the transcript would be empty.
    #[error("All {total} slices failed after {retries} retries each.\nFirst error: {first_error}")]
    AllSlicesFailed {
        total: usize,
        retries: u32,
        first_error: String,
    },

    // ── Output errors ─────────────────────────────────────────────────────
    /// Could not create or write the output document.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The .docx package could not be produced.
    #[error("Failed to build .docx package: {0}")]
    Packaging(String),

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<zip::result::ZipError> for MathDocxError {
    fn from(e: zip::result::ZipError) -> Self {
        MathDocxError::Packaging(e.to_string())
    }
}

/// A non-fatal error for a single image slice.
///
/// Stored alongside [`crate::output::SliceResult`] when a slice fails.
/// The overall conversion continues unless ALL slices fail.
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
pub enum SliceError {
    /// Slice could not be PNG-encoded.
    #[error("Slice {slice}: encoding failed: {detail}")]
    EncodeFailed { slice: usize, detail: String },

    /// LLM call failed after retries.
    #[error("Slice {slice}: LLM call failed after {retries} retries: {detail}")]
    LlmFailed {
        slice: usize,
        retries: u8,
        detail: String,
    },

    /// LLM call timed out.
    #[error("Slice {slice}: LLM call timed out after {secs}s")]
    Timeout { slice: usize, secs: u64 },
}

/// Why one formula could not be converted into an equation.
///
/// Recoverable: the assembler logs it and falls back to literal LaTeX.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConversionError {
    /// `{` / `}` do not pair up.
    #[error("unbalanced braces in '{latex}'")]
    UnbalancedBraces { latex: String },

    /// `\begin{..}` without a matching `\end{..}` or vice versa.
    #[error("environment mismatch in '{latex}': {detail}")]
    EnvironmentMismatch { latex: String, detail: String },

    /// The LaTeX → MathML library rejected the input.
    #[error("LaTeX parse error in '{latex}': {detail}")]
    Parse { latex: String, detail: String },

    /// The MathML produced for the formula is not well-formed XML.
    #[error("malformed MathML: {0}")]
    MalformedMathMl(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_slices_failed_display() {
        let e = MathDocxError::AllSlicesFailed {
            total: 4,
            retries: 3,
            first_error: "rate limited".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("All 4 slices"), "got: {msg}");
        assert!(msg.contains("rate limited"));
    }

    #[test]
    fn not_an_image_display() {
        let e = MathDocxError::NotAnImage {
            source_name: "notes.txt".into(),
            detail: "unknown format".into(),
        };
        assert!(e.to_string().contains("notes.txt"));
    }

    #[test]
    fn slice_timeout_display() {
        let e = SliceError::Timeout { slice: 2, secs: 120 };
        assert!(e.to_string().contains("Slice 2"));
        assert!(e.to_string().contains("120s"));
    }

    #[test]
    fn conversion_error_carries_latex() {
        let e = ConversionError::UnbalancedBraces {
            latex: r"\frac{1}{2".into(),
        };
        assert!(e.to_string().contains(r"\frac{1}{2"));
    }

    #[test]
    fn slice_error_serialises() {
        let e = SliceError::LlmFailed {
            slice: 1,
            retries: 3,
            detail: "boom".into(),
        };
        let json = serde_json::to_string(&e).unwrap();
        assert!(json.contains("LlmFailed"));
    }
}
