//! Image encoding: decoded image → JPEG bytes → base64 `ImageData`.
//!
//! Card photos are 12 MP phone shots; JPEG at quality 95 keeps handwriting
//! legible while staying far below the multimodal API upload limits. The
//! encoder is deterministic, so the same input always yields the same bytes.

use crate::error::DecoderKind;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::ImageData;
use image::codecs::jpeg::JpegEncoder;
use image::DynamicImage;
use tracing::debug;

/// MIME type of every [`EncodedImage`].
pub const JPEG_MIME: &str = "image/jpeg";

/// Canonical transport form of one photo.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedImage {
    /// File name the bytes came from.
    pub name: String,
    /// JPEG bytes.
    pub bytes: Vec<u8>,
    /// Which decoder in the chain produced the pixels.
    pub decoder: DecoderKind,
}

impl EncodedImage {
    /// Base64 form, as embedded in the request body.
    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.bytes)
    }

    /// Wrap for the vision API. `detail: "high"` keeps small handwriting readable.
    pub fn to_image_data(&self) -> ImageData {
        let b64 = self.to_base64();
        debug!("Encoded {} → {} bytes base64", self.name, b64.len());
        ImageData::new(b64, JPEG_MIME).with_detail("high")
    }
}

/// Convert to 8-bit RGB if needed and encode as JPEG.
pub fn encode_jpeg(img: &DynamicImage, quality: u8) -> Result<Vec<u8>, image::ImageError> {
    let mut buf = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut buf, quality);
    match img {
        DynamicImage::ImageRgb8(rgb) => rgb.write_with_encoder(encoder)?,
        other => other.to_rgb8().write_with_encoder(encoder)?,
    }
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ColorType, Rgb, RgbImage, Rgba, RgbaImage};

    #[test]
    fn encode_converts_rgba_to_rgb_jpeg() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(10, 10, Rgba([255, 0, 0, 128])));
        let bytes = encode_jpeg(&img, 95).expect("encode should succeed");
        assert!(bytes.starts_with(&[0xFF, 0xD8, 0xFF]));

        let decoded = image::load_from_memory(&bytes).expect("valid jpeg");
        assert_eq!(decoded.color(), ColorType::Rgb8);
        assert_eq!((decoded.width(), decoded.height()), (10, 10));
    }

    #[test]
    fn encode_is_deterministic() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_fn(32, 16, |x, y| {
            Rgb([(x * 8) as u8, (y * 16) as u8, 90])
        }));
        assert_eq!(encode_jpeg(&img, 95).unwrap(), encode_jpeg(&img, 95).unwrap());
    }

    #[test]
    fn image_data_is_base64_jpeg() {
        let img = DynamicImage::ImageLuma8(image::GrayImage::from_pixel(4, 4, image::Luma([200])));
        let encoded = EncodedImage {
            name: "grey.png".into(),
            bytes: encode_jpeg(&img, 95).unwrap(),
            decoder: DecoderKind::Generic,
        };
        let data = encoded.to_image_data();
        assert_eq!(data.mime_type, JPEG_MIME);
        let decoded = STANDARD.decode(&data.data).expect("valid base64");
        assert_eq!(decoded, encoded.bytes);
    }
}
