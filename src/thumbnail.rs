use crate::types::{EngineError, Result};
use image::imageops::FilterType;
use sha2::{Digest, Sha256};
use tracing::debug;

/// Target geometry and encoding for generated thumbnails.
#[derive(Debug, Clone)]
pub struct ThumbnailConfig {
    pub width: u32,
    pub height: u32,
    pub jpeg_quality: u8,
}

impl Default for ThumbnailConfig {
    fn default() -> Self {
        Self {
            width: 1168,
            height: 657,
            jpeg_quality: 80,
        }
    }
}

/// Deterministic image transform: decode, crop-resize to the target
/// dimensions, re-encode as JPEG at a fixed quality. Identical input
/// bytes always produce identical output bytes, so results can be
/// content-addressed.
#[derive(Debug, Clone)]
pub struct Thumbnailer {
    config: ThumbnailConfig,
}

impl Thumbnailer {
    pub fn new(config: ThumbnailConfig) -> Self {
        Self { config }
    }

    pub fn generate(&self, bytes: &[u8]) -> Result<Vec<u8>> {
        let decoded = image::load_from_memory(bytes)
            .map_err(|e| EngineError::Thumbnail(format!("failed to decode image: {e}")))?;

        let resized = decoded
            .resize_to_fill(self.config.width, self.config.height, FilterType::Lanczos3)
            .to_rgb8();

        let mut out = Vec::new();
        let mut encoder =
            image::codecs::jpeg::JpegEncoder::new_with_quality(&mut out, self.config.jpeg_quality);
        encoder
            .encode_image(&resized)
            .map_err(|e| EngineError::Thumbnail(format!("failed to encode thumbnail: {e}")))?;

        debug!(
            input_bytes = bytes.len(),
            output_bytes = out.len(),
            "generated thumbnail"
        );
        Ok(out)
    }

    /// Content-addressed file name for a thumbnail derived from the given
    /// source image bytes.
    pub fn thumbnail_name(source_bytes: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(source_bytes);
        format!("{:x}.jpg", hasher.finalize())
    }
}
