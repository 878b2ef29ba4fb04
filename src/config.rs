//! Configuration types for image-to-Word conversion.
//!
//! All conversion behaviour is controlled through [`ConversionConfig`], built
//! via its [`ConversionConfigBuilder`]. Keeping every knob in one struct makes
//! it trivial to share configs across threads, log them, and diff two runs to
//! understand why their outputs differ.
//!
//! Two plain sub-configs group the knobs of the offline stages:
//! [`MergeConfig`] for stitching slice transcripts together and
//! [`DocumentConfig`] for the Word document itself. Both are usable on their
//! own (e.g. by [`crate::convert::render_docx`], which never calls an LLM).

use crate::error::MathDocxError;
use crate::progress::ProgressCallback;
use edgequake_llm::LLMProvider;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Configuration for an image-to-.docx conversion.
///
/// Built via [`ConversionConfig::builder()`] or using
/// [`ConversionConfig::default()`].
///
/// # Example
/// ```rust
/// use edgequake_math2docx::ConversionConfig;
///
/// let config = ConversionConfig::builder()
///     .slice_height(1600)
///     .concurrency(2)
///     .model("gpt-4.1-mini")
///     .title("Homework 3")
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct ConversionConfig {
    /// Images wider than this are downscaled before slicing. Default: 2048.
    ///
    /// Vision APIs resize large uploads server-side anyway; doing it here
    /// keeps request bodies small and makes slice heights meaningful.
    pub max_image_width: u32,

    /// Height of one horizontal slice in pixels. Default: 1600.
    ///
    /// A phone photo of a worksheet is often 4000+ px tall. Sent whole, the
    /// provider shrinks it until subscripts are unreadable; cut into slices
    /// each part keeps its resolution.
    pub slice_height: u32,

    /// Pixel overlap between consecutive slices. Default: 200.
    ///
    /// A line cut in half by a slice border is unreadable in both slices.
    /// The overlap guarantees every line appears whole in at least one
    /// slice; the duplicated text is removed again by the overlap
    /// reconciler.
    pub slice_overlap: u32,

    /// Number of concurrent VLM API calls. Default: 2.
    ///
    /// Most inputs yield one to four slices, so a small number is enough.
    /// Slice results are always merged in slice order whatever the
    /// completion order.
    pub concurrency: usize,

    /// LLM model identifier, e.g. "gpt-4.1-mini", "claude-sonnet-4-20250514".
    /// If None, uses provider default.
    pub model: Option<String>,

    /// LLM provider name (e.g. "openai", "anthropic", "gemini").
    /// If None along with `provider`, uses `ProviderFactory::from_env()`.
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Sampling temperature for the LLM completion. Default: 0.1.
    ///
    /// Transcription wants the model faithful to the pixels, not creative.
    pub temperature: f32,

    /// Maximum tokens the LLM may generate per slice. Default: 4096.
    pub max_tokens: usize,

    /// Maximum retry attempts on a transient VLM API failure. Default: 3.
    pub max_retries: u32,

    /// Initial retry delay in milliseconds (exponential backoff). Default: 500.
    ///
    /// Doubles after each attempt: 500 ms → 1 s → 2 s.
    pub retry_backoff_ms: u64,

    /// Custom system prompt. If None, uses built-in default.
    pub system_prompt: Option<String>,

    /// Download timeout for URL inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// Per-VLM-call timeout in seconds. Default: 120.
    ///
    /// Dense worksheets produce long LaTeX answers; 60 s is too tight for
    /// slower vision models.
    pub api_timeout_secs: u64,

    /// Overlap reconciliation thresholds.
    pub merge: MergeConfig,

    /// Word document appearance and metadata.
    pub document: DocumentConfig,

    /// Progress observer. Default: None (no callbacks).
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            max_image_width: 2048,
            slice_height: 1600,
            slice_overlap: 200,
            concurrency: 2,
            model: None,
            provider_name: None,
            provider: None,
            temperature: 0.1,
            max_tokens: 4096,
            max_retries: 3,
            retry_backoff_ms: 500,
            system_prompt: None,
            download_timeout_secs: 120,
            api_timeout_secs: 120,
            merge: MergeConfig::default(),
            document: DocumentConfig::default(),
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ConversionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversionConfig")
            .field("max_image_width", &self.max_image_width)
            .field("slice_height", &self.slice_height)
            .field("slice_overlap", &self.slice_overlap)
            .field("concurrency", &self.concurrency)
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("max_retries", &self.max_retries)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("merge", &self.merge)
            .field("document", &self.document)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn ConversionProgressCallback>"),
            )
            .finish()
    }
}

impl ConversionConfig {
    /// Create a new builder for `ConversionConfig`.
    pub fn builder() -> ConversionConfigBuilder {
        ConversionConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`ConversionConfig`].
pub struct ConversionConfigBuilder {
    config: ConversionConfig,
}

impl fmt::Debug for ConversionConfigBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversionConfigBuilder")
            .field("config", &self.config)
            .finish()
    }
}

impl ConversionConfigBuilder {
    pub fn max_image_width(mut self, px: u32) -> Self {
        self.config.max_image_width = px.max(256);
        self
    }

    pub fn slice_height(mut self, px: u32) -> Self {
        self.config.slice_height = px.max(256);
        self
    }

    pub fn slice_overlap(mut self, px: u32) -> Self {
        self.config.slice_overlap = px;
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = Some(prompt.into());
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn merge(mut self, merge: MergeConfig) -> Self {
        self.config.merge = merge;
        self
    }

    pub fn document(mut self, document: DocumentConfig) -> Self {
        self.config.document = document;
        self
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.config.document.title = Some(title.into());
        self
    }

    pub fn font(mut self, family: impl Into<String>, size_pt: f32) -> Self {
        self.config.document.font_family = family.into();
        self.config.document.font_size_pt = size_pt.clamp(6.0, 72.0);
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ConversionConfig, MathDocxError> {
        let c = &self.config;
        if c.slice_overlap >= c.slice_height {
            return Err(MathDocxError::InvalidConfig(format!(
                "Slice overlap ({}px) must be smaller than slice height ({}px)",
                c.slice_overlap, c.slice_height
            )));
        }
        if c.concurrency == 0 {
            return Err(MathDocxError::InvalidConfig(
                "Concurrency must be ≥ 1".into(),
            ));
        }
        if c.merge.min_overlap == 0 || c.merge.min_overlap > c.merge.max_overlap {
            return Err(MathDocxError::InvalidConfig(format!(
                "Merge overlap bounds must satisfy 1 ≤ min ≤ max, got {}..{}",
                c.merge.min_overlap, c.merge.max_overlap
            )));
        }
        Ok(self.config)
    }
}

// ── Sub-configs ──────────────────────────────────────────────────────────

/// Thresholds for the overlap reconciler.
///
/// Lengths are counted in characters of the whitespace-free projection of
/// each transcript.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeConfig {
    /// Shortest seam accepted as a real overlap. Default: 30.
    ///
    /// Shorter matches are too often coincidences such as a shared `$x$`
    /// or a repeated word.
    pub min_overlap: usize,

    /// Longest seam searched for, and the size of the tail of the merged
    /// text a whole slice is compared against. Default: 2000.
    pub max_overlap: usize,

    /// How far past the computed cut point to look for a sentence, line or
    /// formula boundary. Default: 40 characters.
    pub snap_window: usize,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            min_overlap: 30,
            max_overlap: 2000,
            snap_window: 40,
        }
    }
}

/// Appearance and metadata of the generated Word document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentConfig {
    /// Heading written at the top of the document and stored as the title
    /// property. Default: None.
    pub title: Option<String>,

    /// Author property. Default: "edgequake-math2docx".
    pub author: String,

    /// Subject property. Default: None.
    pub subject: Option<String>,

    /// Body font. Default: "Arial".
    pub font_family: String,

    /// Body font size in points. Default: 11.
    pub font_size_pt: f32,

    /// Font for code blocks and for formulas kept as LaTeX source.
    /// Default: "Courier New".
    pub code_font_family: String,

    /// Size of the code font in points. Default: 10.
    pub code_font_size_pt: f32,

    /// Small centred credit line at the end of the document, e.g. the
    /// provider and model that produced the transcript. Default: None.
    pub footer: Option<String>,
}

impl Default for DocumentConfig {
    fn default() -> Self {
        Self {
            title: None,
            author: "edgequake-math2docx".to_string(),
            subject: None,
            font_family: "Arial".to_string(),
            font_size_pt: 11.0,
            code_font_family: "Courier New".to_string(),
            code_font_size_pt: 10.0,
            footer: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let c = ConversionConfig::builder().build().unwrap();
        assert_eq!(c.slice_height, 1600);
        assert_eq!(c.merge, MergeConfig::default());
        assert_eq!(c.document.font_family, "Arial");
    }

    #[test]
    fn overlap_must_be_smaller_than_slice() {
        let err = ConversionConfig::builder()
            .slice_height(800)
            .slice_overlap(800)
            .build()
            .unwrap_err();
        assert!(matches!(err, MathDocxError::InvalidConfig(_)));
    }

    #[test]
    fn setters_clamp() {
        let c = ConversionConfig::builder()
            .concurrency(0)
            .temperature(9.0)
            .slice_height(10)
            .slice_overlap(0)
            .font("Times New Roman", 200.0)
            .build()
            .unwrap();
        assert_eq!(c.concurrency, 1);
        assert_eq!(c.temperature, 2.0);
        assert_eq!(c.slice_height, 256);
        assert_eq!(c.document.font_size_pt, 72.0);
    }

    #[test]
    fn invalid_merge_bounds_rejected() {
        let err = ConversionConfig::builder()
            .merge(MergeConfig {
                min_overlap: 100,
                max_overlap: 50,
                snap_window: 40,
            })
            .build();
        assert!(err.is_err());
    }
}
