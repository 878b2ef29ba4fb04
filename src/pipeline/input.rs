//! Input resolution: turn a user-supplied path or URL into image bytes.
//!
//! ## Why validate here?
//!
//! A provider will happily bill a request for a truncated PNG or an HTML
//! error page and answer with an apology. Decoding the bytes up front turns
//! both into a clear [`MathDocxError::NotAnImage`] before any slice is sent.
//! Images are small enough to hold in memory, so nothing is written to disk.

use std::path::PathBuf;

use image::DynamicImage;
use tracing::{debug, info};

use crate::error::MathDocxError;

/// Raw bytes of the input image plus a name for messages.
#[derive(Debug, Clone)]
pub struct ResolvedInput {
    pub bytes: Vec<u8>,
    /// File path or URL the bytes came from.
    pub source_name: String,
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Read the input from disk or download it.
pub async fn resolve_input(input: &str, timeout_secs: u64) -> Result<ResolvedInput, MathDocxError> {
    if input.trim().is_empty() {
        return Err(MathDocxError::InvalidInput {
            input: input.to_string(),
        });
    }
    if is_url(input) {
        download_url(input, timeout_secs).await
    } else {
        read_local(input).await
    }
}

async fn read_local(path_str: &str) -> Result<ResolvedInput, MathDocxError> {
    let path = PathBuf::from(path_str);
    let bytes = tokio::fs::read(&path).await.map_err(|e| match e.kind() {
        std::io::ErrorKind::PermissionDenied => MathDocxError::PermissionDenied { path: path.clone() },
        _ => MathDocxError::FileNotFound { path: path.clone() },
    })?;
    debug!("Read {} bytes from {}", bytes.len(), path.display());
    Ok(ResolvedInput {
        bytes,
        source_name: path_str.to_string(),
    })
}

async fn download_url(url: &str, timeout_secs: u64) -> Result<ResolvedInput, MathDocxError> {
    info!("Downloading image from: {}", url);

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| MathDocxError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let to_error = |e: reqwest::Error| {
        if e.is_timeout() {
            MathDocxError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            MathDocxError::DownloadFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    };

    let response = client.get(url).send().await.map_err(to_error)?;
    if !response.status().is_success() {
        return Err(MathDocxError::DownloadFailed {
            url: url.to_string(),
            reason: format!("HTTP {}", response.status()),
        });
    }
    let bytes = response.bytes().await.map_err(to_error)?;
    info!("Downloaded {} bytes", bytes.len());

    Ok(ResolvedInput {
        bytes: bytes.to_vec(),
        source_name: url.to_string(),
    })
}

/// Decode image bytes, sniffing the format from the content.
///
/// CPU-bound for large images; call from `spawn_blocking`.
pub fn decode_image(input: &ResolvedInput) -> Result<DynamicImage, MathDocxError> {
    let not_an_image = |detail: String| MathDocxError::NotAnImage {
        source_name: input.source_name.clone(),
        detail,
    };

    let format = image::guess_format(&input.bytes).map_err(|e| not_an_image(e.to_string()))?;
    let img = image::load_from_memory_with_format(&input.bytes, format)
        .map_err(|e| not_an_image(e.to_string()))?;
    debug!(
        "Decoded {:?} image {}x{} from {}",
        format,
        img.width(),
        img.height(),
        input.source_name
    );
    Ok(img)
}
