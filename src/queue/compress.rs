//! # Attachment Compression
//!
//! Photos are downscaled and re-encoded before they enter the queue so a
//! queued body stays under a byte budget. The pixel codec is external and
//! plugs in through [`ImageEncoder`].
//!
//! The size measured against the budget is the length of the final
//! `data:` URL, since that is what gets stored and replayed.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use super::errors::{QueueError, QueueResult};

/// Longest edge after downscaling, in pixels
pub const MAX_EDGE_PX: u32 = 1200;

/// Default encoded-size budget
pub const DEFAULT_BUDGET_BYTES: usize = 1_200_000;

/// First JPEG quality tried
pub const START_QUALITY: f32 = 0.92;

/// Quality reduction per step
pub const QUALITY_STEP: f32 = 0.08;

/// Steps stop once quality is at or below this
pub const MIN_QUALITY: f32 = 0.4;

const DATA_URL_PREFIX: &str = "data:image/jpeg;base64,";

/// Pixel codec for one source image
pub trait ImageEncoder {
    /// Source dimensions `(width, height)`
    fn dimensions(&self) -> (u32, u32);

    /// Encode as JPEG scaled to `width` x `height` at `quality` in (0, 1]
    fn encode_jpeg(&self, width: u32, height: u32, quality: f32) -> Result<Vec<u8>, String>;
}

/// Result of compressing one image
#[derive(Debug, Clone, PartialEq)]
pub struct CompressedImage {
    pub bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub quality: f32,
    /// Quality reductions applied
    pub steps: u32,
}

impl CompressedImage {
    pub fn to_data_url(&self) -> String {
        data_url(&self.bytes)
    }

    /// Length of the data URL, the figure held against the budget
    pub fn encoded_len(&self) -> usize {
        data_url_len(self.bytes.len())
    }
}

fn data_url(bytes: &[u8]) -> String {
    let mut url = String::with_capacity(data_url_len(bytes.len()));
    url.push_str(DATA_URL_PREFIX);
    STANDARD.encode_string(bytes, &mut url);
    url
}

fn data_url_len(raw: usize) -> usize {
    DATA_URL_PREFIX.len() + raw.div_ceil(3) * 4
}

/// Dimensions after fitting the longest edge within `max_edge`. Never
/// upscales.
pub fn scaled_dimensions(width: u32, height: u32, max_edge: u32) -> (u32, u32) {
    let longest = width.max(height);
    if longest <= max_edge || longest == 0 {
        return (width, height);
    }
    let scale = max_edge as f64 / longest as f64;
    let w = ((width as f64 * scale).floor() as u32).max(1);
    let h = ((height as f64 * scale).floor() as u32).max(1);
    (w, h)
}

/// Quality for a given step, computed from the step count so repeated
/// subtraction cannot drift.
fn quality_at(step: u32) -> f32 {
    START_QUALITY - QUALITY_STEP * step as f32
}

/// Downscale, then lower quality while over budget. Gives up after the
/// quality floor and returns the last, possibly oversized, encoding.
pub fn compress_image(encoder: &dyn ImageEncoder, budget_bytes: usize) -> QueueResult<CompressedImage> {
    let (src_w, src_h) = encoder.dimensions();
    if src_w == 0 || src_h == 0 {
        return Err(QueueError::Compression("image has no pixels".to_string()));
    }
    let (width, height) = scaled_dimensions(src_w, src_h, MAX_EDGE_PX);

    let mut steps = 0;
    let mut quality = quality_at(steps);
    let mut bytes = encoder
        .encode_jpeg(width, height, quality)
        .map_err(QueueError::Compression)?;

    while data_url_len(bytes.len()) > budget_bytes && quality > MIN_QUALITY {
        steps += 1;
        quality = quality_at(steps);
        bytes = encoder
            .encode_jpeg(width, height, quality)
            .map_err(QueueError::Compression)?;
    }

    Ok(CompressedImage {
        bytes,
        width,
        height,
        quality,
        steps,
    })
}
