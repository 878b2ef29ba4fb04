//! Image encoding: `DynamicImage` slice → base64 PNG wrapped in `ImageData`.
//!
//! PNG rather than JPEG: compression artefacts around thin strokes turn
//! `\bar{x}` into `x`, a `'` into nothing and `_1` into `_l`. Lossless keeps
//! the marks the transcription depends on. `detail: "high"` asks
//! GPT-4-class models for the full tile budget so subscripts stay legible.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::ImageData;
use image::DynamicImage;
use std::io::Cursor;
use tracing::debug;

use crate::error::SliceError;

/// Encode one slice as a base64 PNG ready for the VLM API.
pub fn encode_slice(slice_num: usize, img: &DynamicImage) -> Result<ImageData, SliceError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
        .map_err(|e| SliceError::EncodeFailed {
            slice: slice_num,
            detail: e.to_string(),
        })?;

    let b64 = STANDARD.encode(&buf);
    debug!("Slice {}: {} bytes PNG → {} bytes base64", slice_num, buf.len(), b64.len());

    Ok(ImageData::new(b64, "image/png").with_detail("high"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Luma, GrayImage};

    #[test]
    fn encode_small_slice() {
        let img = DynamicImage::ImageLuma8(GrayImage::from_pixel(16, 8, Luma([200])));
        let data = encode_slice(1, &img).expect("encode should succeed");
        assert_eq!(data.mime_type, "image/png");
        let decoded = STANDARD.decode(&data.data).expect("valid base64");
        assert_eq!(&decoded[1..4], b"PNG");
    }
}
