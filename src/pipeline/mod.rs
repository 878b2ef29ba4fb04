//! Pipeline stages for image-to-transcript conversion.
//!
//! Each submodule implements exactly one transformation step, so each can
//! be tested without the others and without a network.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ slice ──▶ encode ──▶ llm ──▶ postprocess ──▶ merge
//! (path/URL) (strips)  (base64)  (VLM)    (cleanup)     (dedup seams)
//! ```
//!
//! 1. [`input`]  — read the file or download the URL, decode-check the bytes
//! 2. [`slice`]  — downscale wide images, cut tall ones into overlapping
//!    strips; runs in `spawn_blocking`
//! 3. [`encode`] — PNG-encode and base64-wrap each strip for the API body
//! 4. [`llm`]    — drive the VLM call with timeout and retry/backoff; the
//!    only stage with network I/O besides URL download
//! 5. [`postprocess`] — deterministic cleanup of model quirks
//! 6. [`merge`]  — stitch strip transcripts together, removing text that
//!    was transcribed twice where strips overlap

pub mod encode;
pub mod input;
pub mod llm;
pub mod merge;
pub mod postprocess;
pub mod slice;
