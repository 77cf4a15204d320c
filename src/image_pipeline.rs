//! Normalization of downloaded artwork before it is written to the cache.

use std::io::Cursor;

use image::{
    codecs::jpeg::JpegEncoder, imageops::FilterType, DynamicImage, ExtendedColorType,
    GenericImageView, ImageReader,
};
use log::{debug, warn};
use zune_core::{colorspace::ColorSpace, options::DecoderOptions};
use zune_jpeg::JpegDecoder;

use crate::config::ArtworkConfig;

const DEFAULT_MAX_EDGE_PX: u32 = 500;
const DEFAULT_JPEG_QUALITY: u8 = 80;

#[derive(Debug, thiserror::Error)]
pub enum ImagePipelineError {
    #[error("image payload could not be decoded")]
    Undecodable,
    #[error("failed to re-encode image: {0}")]
    Encode(#[from] image::ImageError),
}

/// Shrinks oversized artwork to fit a square box and re-encodes it as JPEG.
/// Images already inside the box are kept byte-for-byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImagePostProcessor {
    max_edge_px: u32,
    jpeg_quality: u8,
}

impl Default for ImagePostProcessor {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_EDGE_PX, DEFAULT_JPEG_QUALITY)
    }
}

impl ImagePostProcessor {
    pub fn new(max_edge_px: u32, jpeg_quality: u8) -> Self {
        Self {
            max_edge_px: max_edge_px.max(1),
            jpeg_quality: jpeg_quality.clamp(1, 100),
        }
    }

    pub fn from_config(config: &ArtworkConfig) -> Self {
        Self::new(config.max_image_edge_px, config.jpeg_quality)
    }

    /// Bytes to persist for a fetched payload. `None` stays `None` (negative
    /// marker). Payloads that fail to rescale are stored unchanged.
    pub fn prepare_for_storage(&self, payload: Option<Vec<u8>>) -> Option<Vec<u8>> {
        let bytes = payload?;
        match self.normalize(&bytes) {
            Ok(Some(rescaled)) => Some(rescaled),
            Ok(None) => Some(bytes),
            Err(error) => {
                warn!("Artwork pipeline: keeping original bytes, rescale failed: {error}");
                Some(bytes)
            }
        }
    }

    /// Returns `Ok(None)` when the image can be stored as-is.
    pub fn normalize(&self, bytes: &[u8]) -> Result<Option<Vec<u8>>, ImagePipelineError> {
        let Some((width, height)) = probe_dimensions(bytes) else {
            debug!("Artwork pipeline: unreadable bounds, storing payload unchanged");
            return Ok(None);
        };
        if width <= self.max_edge_px && height <= self.max_edge_px {
            return Ok(None);
        }

        debug!(
            "Artwork pipeline: image too big ({}x{}), rescaling to fit {}px",
            width, height, self.max_edge_px
        );
        let decoded =
            decode_image_from_memory_with_fallback(bytes).ok_or(ImagePipelineError::Undecodable)?;
        let (source_width, source_height) = decoded.dimensions();
        let (target_width, target_height) =
            fit_to_max_edge(source_width, source_height, self.max_edge_px);
        let resized = decoded.resize_exact(target_width, target_height, FilterType::Lanczos3);
        encode_jpeg(&resized, self.jpeg_quality).map(Some)
    }
}

/// Reads width/height from the header only.
pub fn probe_dimensions(bytes: &[u8]) -> Option<(u32, u32)> {
    ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .ok()?
        .into_dimensions()
        .ok()
}

fn encode_jpeg(image: &DynamicImage, quality: u8) -> Result<Vec<u8>, ImagePipelineError> {
    // JPEG has no alpha channel.
    let rgb = image.to_rgb8();
    let mut encoded = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut encoded, quality);
    encoder.encode(
        rgb.as_raw(),
        rgb.width(),
        rgb.height(),
        ExtendedColorType::Rgb8,
    )?;
    Ok(encoded)
}

fn looks_like_jpeg(bytes: &[u8]) -> bool {
    bytes.len() >= 2 && bytes[0] == 0xff && bytes[1] == 0xd8
}

fn decode_jpeg_non_strict(bytes: &[u8]) -> Option<DynamicImage> {
    if !looks_like_jpeg(bytes) {
        return None;
    }

    let options = DecoderOptions::new_cmd()
        .set_strict_mode(false)
        .jpeg_set_out_colorspace(ColorSpace::RGBA);
    let mut decoder = JpegDecoder::new_with_options(bytes, options);
    let pixels = decoder.decode().ok()?;
    let (width, height) = decoder.dimensions()?;
    let image = image::RgbaImage::from_raw(width as u32, height as u32, pixels)?;
    Some(DynamicImage::ImageRgba8(image))
}

fn decode_image_from_memory_with_fallback(bytes: &[u8]) -> Option<DynamicImage> {
    image::load_from_memory(bytes)
        .ok()
        .or_else(|| decode_jpeg_non_strict(bytes))
}

fn fit_to_max_edge(width: u32, height: u32, max_edge: u32) -> (u32, u32) {
    if width == 0 || height == 0 {
        return (1, 1);
    }
    let clamped = max_edge.max(1);
    if width.max(height) <= clamped {
        return (width, height);
    }
    if width >= height {
        let scaled_height =
            ((u64::from(height) * u64::from(clamped)) + (u64::from(width) / 2)) / u64::from(width);
        (clamped, scaled_height.max(1) as u32)
    } else {
        let scaled_width =
            ((u64::from(width) * u64::from(clamped)) + (u64::from(height) / 2)) / u64::from(height);
        (scaled_width.max(1) as u32, clamped)
    }
}
