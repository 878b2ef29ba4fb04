//! Conversion entry points.
//!
//! ## Two halves
//!
//! [`convert`] runs the whole pipeline: image → slices → VLM transcripts →
//! merged text → Word document. The second half (text → document) needs no
//! network and no provider; it is exposed on its own as [`parse_document`]
//! and [`render_docx`] so a saved transcript can be re-rendered, and so the
//! document side can be tested offline.

use crate::config::{ConversionConfig, DocumentConfig};
use crate::docx::{assemble, write_docx, AssemblyStats};
use crate::error::MathDocxError;
use crate::math::{normalize, segment, Element};
use crate::output::{ConversionOutput, ConversionStats, SliceResult};
use crate::pipeline::llm::{failed_slice, transcribe_slice, SlicePosition};
use crate::pipeline::merge::{MergeDecision, SliceMerger};
use crate::pipeline::slice::{prepare_slices, ImageSlice};
use crate::pipeline::{encode, input, postprocess};
use edgequake_llm::{LLMProvider, ProviderFactory};
use futures::stream::{self, StreamExt};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Default model when a provider is named without one.
const DEFAULT_MODEL: &str = "gpt-4.1-mini";

/// Convert an image file or URL into a Word document.
///
/// This is the primary entry point for the library.
///
/// # Arguments
/// * `input` — Local file path or HTTP/HTTPS URL to a PNG, JPEG, WebP, GIF
///   or BMP image
/// * `config` — Conversion configuration
///
/// # Returns
/// `Ok(ConversionOutput)` on success, even if some slices failed
/// (check `output.stats.failed_slices`).
///
/// # Errors
/// Returns `Err(MathDocxError)` only for fatal errors:
/// - File not found / permission denied / download failure
/// - Not a decodable image
/// - No provider configured
/// - All slices failed
pub async fn convert(
    input_str: impl AsRef<str>,
    config: &ConversionConfig,
) -> Result<ConversionOutput, MathDocxError> {
    let total_start = Instant::now();
    let input_str = input_str.as_ref();
    info!("Starting conversion: {}", input_str);

    // ── Step 1: Resolve input ────────────────────────────────────────────
    let resolved = input::resolve_input(input_str, config.download_timeout_secs).await?;

    // ── Step 2: Decode, pre-scale, slice ─────────────────────────────────
    // A bad image is reported before any provider is needed.
    let slices = prepare_slices(resolved, config).await?;
    let total_slices = slices.len();

    // ── Step 3: Get/create provider ──────────────────────────────────────
    let provider = resolve_provider(config).await?;
    if let Some(ref cb) = config.progress_callback {
        cb.on_conversion_start(total_slices);
    }

    // ── Step 4: Transcribe slices ────────────────────────────────────────
    let llm_start = Instant::now();
    let mut results = transcribe_all(&provider, &slices, config).await;
    let llm_duration_ms = llm_start.elapsed().as_millis() as u64;

    // ── Step 5: Clean and merge, in slice order ──────────────────────────
    let merged = merge_results(&mut results, config);

    let processed = results.iter().filter(|r| r.is_ok()).count();
    if processed == 0 {
        let first_error = results
            .iter()
            .find_map(|r| r.error.as_ref())
            .map(|e| e.to_string())
            .unwrap_or_else(|| "Unknown error".to_string());
        return Err(MathDocxError::AllSlicesFailed {
            total: total_slices,
            retries: config.max_retries,
            first_error,
        });
    }

    // ── Step 6: Normalize, segment, assemble, package ────────────────────
    let rendered = build_document(&merged, &config.document)?;
    if let Some(ref cb) = config.progress_callback {
        let a = &rendered.assembly;
        cb.on_document_assembled(a.display_formulas + a.inline_formulas, a.fallback_formulas);
    }

    // ── Step 7: Compute stats ────────────────────────────────────────────
    let stats = ConversionStats {
        total_slices,
        processed_slices: processed,
        failed_slices: total_slices - processed,
        discarded_slices: results
            .iter()
            .filter(|r| r.merge == Some(MergeDecision::Discarded))
            .count(),
        total_input_tokens: results.iter().map(|r| r.input_tokens as u64).sum(),
        total_output_tokens: results.iter().map(|r| r.output_tokens as u64).sum(),
        total_duration_ms: total_start.elapsed().as_millis() as u64,
        llm_duration_ms,
        ..ConversionStats::default()
    }
    .with_assembly(&rendered.assembly);

    info!(
        "Conversion complete: {}/{} slices, {} formulas ({} kept as LaTeX), {}ms total",
        processed,
        total_slices,
        stats.display_formulas + stats.inline_formulas,
        stats.fallback_formulas,
        stats.total_duration_ms
    );
    if let Some(ref cb) = config.progress_callback {
        cb.on_conversion_complete(total_slices, processed);
    }

    Ok(ConversionOutput {
        text: rendered.text,
        elements: rendered.elements,
        docx: rendered.docx,
        slices: results,
        stats,
    })
}

/// Convert an image and write the `.docx` directly to a file.
///
/// Uses atomic write (temp file + rename) to prevent partial files.
pub async fn convert_to_file(
    input_str: impl AsRef<str>,
    output_path: impl AsRef<Path>,
    config: &ConversionConfig,
) -> Result<ConversionStats, MathDocxError> {
    let output = convert(input_str, config).await?;
    write_atomic(output_path.as_ref(), &output.docx).await?;
    Ok(output.stats)
}

/// Synchronous wrapper around [`convert`].
///
/// Creates a temporary tokio runtime internally.
pub fn convert_sync(
    input_str: impl AsRef<str>,
    config: &ConversionConfig,
) -> Result<ConversionOutput, MathDocxError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| MathDocxError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(convert(input_str, config))
}

// ── Text → document ──────────────────────────────────────────────────────

/// A document built from a transcript, without any LLM involved.
#[derive(Debug, Clone)]
pub struct RenderedDocument {
    /// The normalized transcript.
    pub text: String,
    pub elements: Vec<Element>,
    pub docx: Vec<u8>,
    pub assembly: AssemblyStats,
}

/// Normalize a transcript and split it into text and display-formula
/// elements.
pub fn parse_document(text: &str) -> Vec<Element> {
    segment(&normalize(text))
}

/// Build a `.docx` from a transcript.
pub fn render_docx(text: &str, config: &DocumentConfig) -> Result<Vec<u8>, MathDocxError> {
    Ok(build_document(text, config)?.docx)
}

/// Build a `.docx` from a transcript, keeping the intermediate results.
pub fn build_document(text: &str, config: &DocumentConfig) -> Result<RenderedDocument, MathDocxError> {
    let normalized = normalize(text);
    let elements = segment(&normalized);
    debug!("Segmented transcript into {} elements", elements.len());
    let (document, assembly) = assemble(&elements, config);
    let docx = write_docx(&document)?;
    Ok(RenderedDocument {
        text: normalized,
        elements,
        docx,
        assembly,
    })
}

/// Write `bytes` to `path` via a temp file and rename.
pub async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), MathDocxError> {
    let write_err = |e: std::io::Error| MathDocxError::OutputWriteFailed {
        path: path.to_path_buf(),
        source: e,
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
    }
    let tmp_path = path.with_extension("docx.tmp");
    tokio::fs::write(&tmp_path, bytes).await.map_err(write_err)?;
    tokio::fs::rename(&tmp_path, path).await.map_err(write_err)?;
    info!("Wrote {} ({} bytes)", path.display(), bytes.len());
    Ok(())
}

// ── Internal helpers ─────────────────────────────────────────────────────

/// Instantiate a named provider with the given model.
fn create_vision_provider(
    provider_name: &str,
    model: &str,
) -> Result<Arc<dyn LLMProvider>, MathDocxError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        MathDocxError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}

/// Resolve the LLM provider, from most-specific to least-specific.
///
/// 1. **Pre-built provider** (`config.provider`) — used as-is. Useful in
///    tests or with custom middleware.
/// 2. **Named provider + model** (`config.provider_name`) — the factory
///    reads the matching API key from the environment.
/// 3. **Environment pair** (`EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`) —
///    honoured even when several API keys are present.
/// 4. **Full auto-detection** (`ProviderFactory::from_env`), preferring
///    OpenAI when `OPENAI_API_KEY` is set.
async fn resolve_provider(config: &ConversionConfig) -> Result<Arc<dyn LLMProvider>, MathDocxError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    if let Some(ref name) = config.provider_name {
        let model = config.model.as_deref().unwrap_or(DEFAULT_MODEL);
        return create_vision_provider(name, model);
    }

    if let (Ok(prov), Ok(model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !model.is_empty() {
            return create_vision_provider(&prov, &model);
        }
    }

    if let Ok(openai_key) = std::env::var("OPENAI_API_KEY") {
        if !openai_key.is_empty() {
            let model = config.model.as_deref().unwrap_or(DEFAULT_MODEL);
            return create_vision_provider("openai", model);
        }
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| MathDocxError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No LLM provider could be auto-detected from environment.\n\
                Set OPENAI_API_KEY, ANTHROPIC_API_KEY, GEMINI_API_KEY or pass --provider.\n\
                Error: {}",
                e
            ),
        })?;

    Ok(llm_provider)
}

/// Transcribe every slice with up to `config.concurrency` calls in flight.
///
/// `buffered` (not `buffer_unordered`) yields results in slice order, which
/// the merge step relies on.
async fn transcribe_all(
    provider: &Arc<dyn LLMProvider>,
    slices: &[ImageSlice],
    config: &ConversionConfig,
) -> Vec<SliceResult> {
    let total_slices = slices.len();
    stream::iter(slices.iter().map(|slice| {
        let provider = Arc::clone(provider);
        let position = SlicePosition {
            slice_num: slice.slice_num,
            total_slices,
            top_px: slice.top,
            height_px: slice.image.height(),
        };
        async move {
            if let Some(ref cb) = config.progress_callback {
                cb.on_slice_start(position.slice_num, total_slices);
            }
            let result = match encode::encode_slice(position.slice_num, &slice.image) {
                Ok(data) => transcribe_slice(&provider, position, data, config).await,
                Err(e) => {
                    warn!("{}", e);
                    failed_slice(position, 0, 0, e)
                }
            };
            if let Some(ref cb) = config.progress_callback {
                match &result.error {
                    None => cb.on_slice_complete(position.slice_num, total_slices, result.text.len()),
                    Some(e) => cb.on_slice_error(position.slice_num, total_slices, &e.to_string()),
                }
            }
            result
        }
    }))
    .buffered(config.concurrency)
    .collect()
    .await
}

/// Clean each successful transcript and merge them in slice order.
///
/// Records the merge decision on each result and returns the merged text.
fn merge_results(results: &mut [SliceResult], config: &ConversionConfig) -> String {
    let mut merger = SliceMerger::new(config.merge);
    for result in results.iter_mut().filter(|r| r.is_ok()) {
        result.text = postprocess::clean_transcript(&result.text);
        let decision = merger.push(&result.text);
        debug!("Slice {}: {:?}", result.slice_num, decision);
        if let Some(ref cb) = config.progress_callback {
            cb.on_slice_merged(result.slice_num, &decision);
        }
        result.merge = Some(decision);
    }
    merger.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SliceError;

    fn ok_slice(n: usize, text: &str) -> SliceResult {
        SliceResult {
            slice_num: n,
            top_px: 0,
            height_px: 100,
            text: text.to_string(),
            input_tokens: 10,
            output_tokens: 5,
            duration_ms: 1,
            retries: 0,
            merge: None,
            error: None,
        }
    }

    #[test]
    fn test_parse_document_normalizes_first() {
        let elements = parse_document("Let ar{x}1 be the mean.\n$$x^2≤1$$");
        assert_eq!(elements.len(), 2);
        match &elements[0] {
            Element::Text(t) => assert!(t.content.contains(r"\bar{x}_1"), "{}", t.content),
            other => panic!("expected text, got {other:?}"),
        }
        match &elements[1] {
            Element::Formula(f) => assert_eq!(f.latex, r"x^2\leq1"),
            other => panic!("expected formula, got {other:?}"),
        }
    }

    #[test]
    fn test_render_docx_is_a_zip() {
        let bytes = render_docx("Hello $x$.", &DocumentConfig::default()).unwrap();
        assert_eq!(&bytes[..2], b"PK");
    }

    #[test]
    fn test_merge_results_skips_failed_and_records_decisions() {
        let seam = "Problem 2. Find all real numbers x such that x squared equals four.";
        let mut results = vec![
            ok_slice(1, &format!("```\nProblem 1. Compute the sum.\n{seam}\n```")),
            SliceResult {
                error: Some(SliceError::Timeout { slice: 2, secs: 1 }),
                text: String::new(),
                ..ok_slice(2, "")
            },
            ok_slice(3, &format!("{seam}\nProblem 3. Factor the polynomial.")),
            ok_slice(4, "Problem 3. Factor the polynomial."),
        ];
        let merged = merge_results(&mut results, &ConversionConfig::default());
        assert_eq!(merged.matches("Problem 2.").count(), 1);
        assert!(merged.ends_with("Problem 3. Factor the polynomial."));
        assert!(!merged.contains("```"));
        assert_eq!(results[0].merge, Some(MergeDecision::Appended));
        assert_eq!(results[1].merge, None);
        assert!(matches!(results[2].merge, Some(MergeDecision::Trimmed { .. })));
        assert_eq!(results[3].merge, Some(MergeDecision::Discarded));
    }

    #[tokio::test]
    async fn test_write_atomic_leaves_no_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("doc.docx");
        write_atomic(&path, b"PK data").await.unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"PK data");
        assert!(!path.with_extension("docx.tmp").exists());
    }
}
