//! Image normalization applied before an image is sent for recognition.

use std::fs;
use std::path::Path;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use breedscan_contracts::RecognitionError;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, Rgb, RgbImage};
use sha2::{Digest, Sha256};
use tracing::debug;

pub const MAX_WIDTH: u32 = 800;
pub const JPEG_QUALITY: u8 = 85;

/// Base64 image body plus its MIME descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImagePayload {
    pub mime_type: String,
    pub data: String,
    pub width: u32,
    pub height: u32,
}

impl ImagePayload {
    /// `data:<mime>;base64,<data>`
    pub fn to_data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.data)
    }

    /// Raw encoded image bytes.
    pub fn decoded_bytes(&self) -> Result<Vec<u8>, RecognitionError> {
        BASE64
            .decode(self.data.as_bytes())
            .map_err(|err| RecognitionError::InvalidImage(format!("bad base64 payload: {err}")))
    }

    pub fn sha256_hex(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.data.as_bytes());
        hex::encode(hasher.finalize())
    }
}

/// Splits `data:<mime>;base64,<payload>` into its MIME type and payload.
pub fn split_data_url(url: &str) -> Result<(String, String), RecognitionError> {
    let malformed = || RecognitionError::InvalidImage("malformed data URL".to_string());
    let rest = url.trim().strip_prefix("data:").ok_or_else(malformed)?;
    let (descriptor, data) = rest.split_once(',').ok_or_else(malformed)?;
    let mime_type = descriptor
        .strip_suffix(";base64")
        .ok_or_else(malformed)?
        .trim();
    if !mime_type.starts_with("image/") || data.is_empty() {
        return Err(malformed());
    }
    Ok((mime_type.to_string(), data.to_string()))
}

/// Output dimensions: width capped at 800 with the aspect ratio kept.
pub fn target_dimensions(width: u32, height: u32) -> (u32, u32) {
    if width <= MAX_WIDTH {
        return (width, height);
    }
    let scaled = (f64::from(height) * f64::from(MAX_WIDTH) / f64::from(width)).round();
    (MAX_WIDTH, (scaled as u32).max(1))
}

pub fn read_file(path: &Path) -> Result<Vec<u8>, RecognitionError> {
    fs::read(path).map_err(|err| {
        RecognitionError::InvalidImage(format!("failed reading {}: {err}", path.display()))
    })
}

pub fn normalize_file(path: &Path) -> Result<ImagePayload, RecognitionError> {
    normalize(&read_file(path)?)
}

/// Encoded bytes carried by a `data:image/...;base64,` URL. The bytes still
/// need `normalize` before they are sent anywhere.
pub fn decode_data_url(url: &str) -> Result<Vec<u8>, RecognitionError> {
    let (_, data) = split_data_url(url)?;
    BASE64
        .decode(data.trim().as_bytes())
        .map_err(|err| RecognitionError::InvalidImage(format!("bad base64 payload: {err}")))
}

/// Decodes `bytes`, downsizes to at most 800 px wide and re-encodes as JPEG
/// at quality 85.
pub fn normalize(bytes: &[u8]) -> Result<ImagePayload, RecognitionError> {
    let format = image::guess_format(bytes)
        .map_err(|_| RecognitionError::InvalidImage("unrecognized image format".to_string()))?;
    let decoded = image::load_from_memory_with_format(bytes, format)
        .map_err(|err| RecognitionError::InvalidImage(format!("decode failed: {err}")))?;

    let (width, height) = decoded.dimensions();
    let (target_width, target_height) = target_dimensions(width, height);
    let resized = if (target_width, target_height) == (width, height) {
        decoded
    } else {
        decoded.resize_exact(target_width, target_height, FilterType::Triangle)
    };

    let flattened = flatten_onto_white(&resized);
    let mut encoded = Vec::new();
    JpegEncoder::new_with_quality(&mut encoded, JPEG_QUALITY)
        .encode_image(&DynamicImage::ImageRgb8(flattened))
        .map_err(|err| RecognitionError::UnknownFailure(format!("JPEG encode failed: {err}")))?;

    let data = BASE64.encode(&encoded);
    debug!(
        source_format = ?format,
        source_bytes = bytes.len(),
        encoded_chars = data.len(),
        width = target_width,
        height = target_height,
        "image normalized"
    );
    Ok(ImagePayload {
        mime_type: "image/jpeg".to_string(),
        data,
        width: target_width,
        height: target_height,
    })
}

fn flatten_onto_white(image: &DynamicImage) -> RgbImage {
    if !image.color().has_alpha() {
        return image.to_rgb8();
    }
    let rgba = image.to_rgba8();
    let mut flattened = RgbImage::new(rgba.width(), rgba.height());
    for (x, y, pixel) in rgba.enumerate_pixels() {
        let alpha = u16::from(pixel[3]);
        let blend = |channel: u8| -> u8 {
            (((u16::from(channel) * alpha) + (255 * (255 - alpha))) / 255) as u8
        };
        flattened.put_pixel(x, y, Rgb([blend(pixel[0]), blend(pixel[1]), blend(pixel[2])]));
    }
    flattened
}
