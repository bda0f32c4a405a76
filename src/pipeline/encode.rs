//! Image encoding: `DynamicImage` → PNG or JPEG bytes for the archive.
//!
//! PNG is the default because it is lossless: rendered glyph edges stay
//! crisp on e-ink readers. JPEG trades that for much smaller books when the
//! source is mostly photographs or scans.

use crate::config::PageImageFormat;
use image::codecs::jpeg::JpegEncoder;
use image::DynamicImage;
use std::io::Cursor;
use tracing::debug;

/// A rendered page, encoded and ready to be stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedImage {
    pub format: PageImageFormat,
    pub width: u32,
    pub height: u32,
    pub bytes: Vec<u8>,
}

impl EncodedImage {
    pub fn media_type(&self) -> &'static str {
        self.format.media_type()
    }

    pub fn extension(&self) -> &'static str {
        self.format.extension()
    }
}

/// Encode a rasterised page.
///
/// JPEG has no alpha channel, so the image is flattened to RGB first.
pub fn encode_page(
    img: &DynamicImage,
    format: PageImageFormat,
    jpeg_quality: u8,
) -> Result<EncodedImage, image::ImageError> {
    let mut buf = Vec::new();
    match format {
        PageImageFormat::Png => {
            img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;
        }
        PageImageFormat::Jpeg => {
            let rgb = img.to_rgb8();
            let encoder = JpegEncoder::new_with_quality(&mut buf, jpeg_quality);
            rgb.write_with_encoder(encoder)?;
        }
    }
    debug!(
        "Encoded {}x{} image → {} bytes {}",
        img.width(),
        img.height(),
        buf.len(),
        format.extension()
    );

    Ok(EncodedImage {
        format,
        width: img.width(),
        height: img.height(),
        bytes: buf,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    fn red_square() -> DynamicImage {
        DynamicImage::ImageRgba8(RgbaImage::from_pixel(10, 10, Rgba([255, 0, 0, 255])))
    }

    #[test]
    fn encode_png() {
        let data = encode_page(&red_square(), PageImageFormat::Png, 85).expect("encode");
        assert_eq!(data.media_type(), "image/png");
        assert_eq!((data.width, data.height), (10, 10));
        assert_eq!(&data.bytes[..8], b"\x89PNG\r\n\x1a\n");
    }

    #[test]
    fn encode_jpeg_flattens_alpha() {
        let data = encode_page(&red_square(), PageImageFormat::Jpeg, 80).expect("encode");
        assert_eq!(data.extension(), "jpg");
        assert_eq!(&data.bytes[..2], &[0xFF, 0xD8]);
        let decoded = image::load_from_memory(&data.bytes).expect("decodable");
        assert_eq!(decoded.width(), 10);
    }
}
