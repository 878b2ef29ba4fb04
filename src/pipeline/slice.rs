//! Pre-scaling and slicing: one decoded image → overlapping horizontal strips.
//!
//! ## Why slice?
//!
//! Vision APIs shrink large uploads to a fixed pixel budget. A tall scan of
//! a worksheet shrunk that way loses its subscripts and primes. Cutting it
//! into strips of `slice_height` keeps every strip at full resolution.
//!
//! ## Why overlap?
//!
//! A text line cut by a strip border is unreadable in both strips. Strips
//! advance by `slice_height - slice_overlap`, so every line shorter than the
//! overlap lies whole inside at least one strip. The text transcribed twice
//! is removed again by [`crate::pipeline::merge`].
//!
//! ## Why spawn_blocking?
//!
//! Decoding, Lanczos resampling and cropping a 4000 px photo take long
//! enough to stall the async executor, so [`prepare_slices`] moves the work
//! onto tokio's blocking pool.

use image::imageops::FilterType;
use image::DynamicImage;
use tracing::{debug, info};

use crate::config::ConversionConfig;
use crate::error::MathDocxError;
use crate::pipeline::input::{decode_image, ResolvedInput};

/// One horizontal strip of the source image.
#[derive(Debug, Clone)]
pub struct ImageSlice {
    /// 1-indexed, top to bottom.
    pub slice_num: usize,
    /// Top edge in the pre-scaled image.
    pub top: u32,
    pub image: DynamicImage,
}

/// Vertical spans `(top, height)` covering `height` pixels.
///
/// Strips advance by `slice_height - overlap`. The last strip is moved up
/// so it ends exactly at the bottom edge, which makes it full height and
/// overlap its predecessor by at least `overlap` pixels.
pub fn slice_spans(height: u32, slice_height: u32, overlap: u32) -> Vec<(u32, u32)> {
    if height == 0 {
        return Vec::new();
    }
    if height <= slice_height || slice_height == 0 {
        return vec![(0, height)];
    }
    let step = slice_height.saturating_sub(overlap).max(1);
    let mut spans = Vec::new();
    let mut top = 0;
    loop {
        if top + slice_height >= height {
            spans.push((height - slice_height, slice_height));
            break;
        }
        spans.push((top, slice_height));
        top += step;
    }
    spans
}

/// Downscale `img` to at most `max_width` pixels wide, keeping its aspect
/// ratio.
pub fn prescale(img: DynamicImage, max_width: u32) -> DynamicImage {
    let (w, h) = (img.width(), img.height());
    if w <= max_width || max_width == 0 {
        return img;
    }
    let new_h = ((h as f64) * (max_width as f64) / (w as f64)).round().max(1.0) as u32;
    debug!("Downscaling {}x{} → {}x{}", w, h, max_width, new_h);
    img.resize_exact(max_width, new_h, FilterType::Lanczos3)
}

/// Cut an already decoded image into slices.
pub fn slice_image(img: &DynamicImage, slice_height: u32, overlap: u32) -> Vec<ImageSlice> {
    slice_spans(img.height(), slice_height, overlap)
        .into_iter()
        .enumerate()
        .map(|(i, (top, height))| ImageSlice {
            slice_num: i + 1,
            top,
            image: img.crop_imm(0, top, img.width(), height),
        })
        .collect()
}

/// Decode, pre-scale and slice the input on the blocking pool.
pub async fn prepare_slices(
    input: ResolvedInput,
    config: &ConversionConfig,
) -> Result<Vec<ImageSlice>, MathDocxError> {
    let max_width = config.max_image_width;
    let slice_height = config.slice_height;
    let overlap = config.slice_overlap;

    let slices = tokio::task::spawn_blocking(move || -> Result<_, MathDocxError> {
        let img = decode_image(&input)?;
        let img = DynamicImage::ImageRgb8(prescale(img, max_width).to_rgb8());
        info!(
            "Image {}x{} → {} slice(s)",
            img.width(),
            img.height(),
            slice_spans(img.height(), slice_height, overlap).len()
        );
        Ok(slice_image(&img, slice_height, overlap))
    })
    .await
    .map_err(|e| MathDocxError::Internal(format!("slicing task panicked: {e}")))??;

    for s in &slices {
        debug!(
            "Slice {}: top={} {}x{}",
            s.slice_num,
            s.top,
            s.image.width(),
            s.image.height()
        );
    }
    Ok(slices)
}
