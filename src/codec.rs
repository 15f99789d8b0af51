//! Image payload decoding and mask encoding.

use base64::{Engine as _, engine::general_purpose::STANDARD};
use image::{GrayImage, ImageFormat};
use kornia_image::{Image, ImageSize, allocator::CpuAllocator};
use std::io::Cursor;

use crate::{
    error::TranslatorError,
    predictor::{Mask, RgbImage},
};

/// Decodes a base64 encoded image into an RGB image.
///
/// The format is detected from the payload; PNG, JPEG, BMP, GIF, TIFF and WebP
/// are supported. Grayscale, palette and alpha images are converted to RGB.
///
/// ASCII whitespace in the payload is ignored, so line-wrapped base64 is accepted.
pub fn decode_image(image_b64: &str) -> Result<RgbImage, TranslatorError> {
    let compact: String = image_b64
        .chars()
        .filter(|c| !c.is_ascii_whitespace())
        .collect();
    let bytes = STANDARD.decode(compact)?;

    let rgb = image::load_from_memory(&bytes)?.to_rgb8();
    let size = ImageSize {
        width: rgb.width() as usize,
        height: rgb.height() as usize,
    };

    Ok(Image::new(size, rgb.into_raw(), CpuAllocator)?)
}

/// Encodes a mask as a base64 grayscale PNG.
///
/// Nonzero mask values become 255 and zeros stay 0.
pub fn encode_mask(mask: &Mask) -> Result<String, TranslatorError> {
    let (width, height) = (mask.width(), mask.height());

    let pixels: Vec<u8> = mask
        .as_slice()
        .iter()
        .map(|&v| if v != 0.0 { 255 } else { 0 })
        .collect();

    let gray = GrayImage::from_raw(width as u32, height as u32, pixels)
        .ok_or(TranslatorError::MaskEncode { width, height })?;

    let mut png = Cursor::new(Vec::new());
    gray.write_to(&mut png, ImageFormat::Png)?;

    Ok(STANDARD.encode(png.into_inner()))
}
