//! VLM interaction: build vision messages and call the provider.
//!
//! This module turns one image slice into a raw transcript. It is
//! intentionally thin: prompt wording lives in [`crate::prompts`] so it can
//! change without touching retry or error handling here.
//!
//! ## Retry Strategy
//!
//! HTTP 429 / 503 errors from LLM APIs are transient and frequent under
//! concurrent load. Exponential backoff (`retry_backoff_ms * 2^attempt`)
//! avoids thundering-herd: with 500 ms base and 3 retries the wait sequence
//! is 500 ms → 1 s → 2 s. Every attempt is bounded by `api_timeout_secs`; a
//! timed-out attempt is retried like any other failure.

use crate::config::ConversionConfig;
use crate::error::SliceError;
use crate::output::SliceResult;
use crate::prompts::{slice_user_text, DEFAULT_SYSTEM_PROMPT};
use edgequake_llm::{ChatMessage, CompletionOptions, ImageData, LLMProvider};
use std::sync::Arc;
use std::time::Instant;
use tokio::time::{sleep, timeout, Duration};
use tracing::{debug, warn};

/// Where a slice sits in the source image.
#[derive(Debug, Clone, Copy)]
pub struct SlicePosition {
    pub slice_num: usize,
    pub total_slices: usize,
    pub top_px: u32,
    pub height_px: u32,
}

/// Transcribe one slice via the VLM.
///
/// ## Message Layout
///
/// 1. **System message** — the transcription rules (or user override)
/// 2. **User message** — the slice PNG; for slices after the first, a note
///    that it continues the previous one
///
/// ## Return Value
///
/// Always returns a `SliceResult`; a failed slice carries its error instead
/// of aborting the whole conversion.
pub async fn transcribe_slice(
    provider: &Arc<dyn LLMProvider>,
    position: SlicePosition,
    image_data: ImageData,
    config: &ConversionConfig,
) -> SliceResult {
    let start = Instant::now();
    let slice_num = position.slice_num;
    let system_prompt = config
        .system_prompt
        .as_deref()
        .unwrap_or(DEFAULT_SYSTEM_PROMPT);

    let user_text = slice_user_text(slice_num, position.total_slices);
    let messages = vec![
        ChatMessage::system(system_prompt),
        ChatMessage::user_with_images(&user_text, vec![image_data]),
    ];
    let options = build_options(config);
    let limit = Duration::from_secs(config.api_timeout_secs);

    let mut last_err: Option<SliceError> = None;

    for attempt in 0..=config.max_retries {
        if attempt > 0 {
            let backoff = config.retry_backoff_ms * 2u64.pow(attempt - 1);
            warn!(
                "Slice {}: retry {}/{} after {}ms",
                slice_num, attempt, config.max_retries, backoff
            );
            sleep(Duration::from_millis(backoff)).await;
        }

        match timeout(limit, provider.chat(&messages, Some(&options))).await {
            Ok(Ok(response)) => {
                let duration = start.elapsed();
                debug!(
                    "Slice {}: {} input tokens, {} output tokens, {:?}",
                    slice_num, response.prompt_tokens, response.completion_tokens, duration
                );
                return SliceResult {
                    slice_num,
                    top_px: position.top_px,
                    height_px: position.height_px,
                    text: response.content,
                    input_tokens: response.prompt_tokens,
                    output_tokens: response.completion_tokens,
                    duration_ms: duration.as_millis() as u64,
                    retries: attempt as u8,
                    merge: None,
                    error: None,
                };
            }
            Ok(Err(e)) => {
                warn!("Slice {}: attempt {} failed: {}", slice_num, attempt + 1, e);
                last_err = Some(SliceError::LlmFailed {
                    slice: slice_num,
                    retries: config.max_retries as u8,
                    detail: e.to_string(),
                });
            }
            Err(_) => {
                warn!(
                    "Slice {}: attempt {} timed out after {}s",
                    slice_num,
                    attempt + 1,
                    config.api_timeout_secs
                );
                last_err = Some(SliceError::Timeout {
                    slice: slice_num,
                    secs: config.api_timeout_secs,
                });
            }
        }
    }

    failed_slice(
        position,
        start.elapsed().as_millis() as u64,
        config.max_retries as u8,
        last_err.unwrap_or(SliceError::LlmFailed {
            slice: slice_num,
            retries: config.max_retries as u8,
            detail: "Unknown error".to_string(),
        }),
    )
}

/// A result for a slice that produced no transcript.
pub fn failed_slice(position: SlicePosition, duration_ms: u64, retries: u8, error: SliceError) -> SliceResult {
    SliceResult {
        slice_num: position.slice_num,
        top_px: position.top_px,
        height_px: position.height_px,
        text: String::new(),
        input_tokens: 0,
        output_tokens: 0,
        duration_ms,
        retries,
        merge: None,
        error: Some(error),
    }
}

/// Build `CompletionOptions` from the conversion config.
fn build_options(config: &ConversionConfig) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(config.temperature),
        max_tokens: Some(config.max_tokens),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_options_defaults() {
        let config = ConversionConfig::default();
        let opts = build_options(&config);
        assert_eq!(opts.temperature, Some(0.1));
        assert_eq!(opts.max_tokens, Some(4096));
    }

    #[test]
    fn failed_slice_has_no_text() {
        let pos = SlicePosition {
            slice_num: 2,
            total_slices: 3,
            top_px: 1400,
            height_px: 1600,
        };
        let r = failed_slice(pos, 10, 3, SliceError::Timeout { slice: 2, secs: 120 });
        assert!(!r.is_ok());
        assert!(r.text.is_empty());
        assert_eq!(r.top_px, 1400);
    }
}
