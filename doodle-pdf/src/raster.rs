//! Raster preparation for embedding
//!
//! Every source image (PNG, JPEG, WebP) is decoded, flattened onto white,
//! downscaled to the print resolution cap and re-encoded as baseline JPEG
//! so it can be embedded as a DCTDecode XObject without further processing.

use std::io::Cursor;

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{GenericImageView, Rgb, RgbImage};

use crate::error::PdfResult;
use crate::geometry::{TRIM_SIZE, max_raster_edge};

const JPEG_QUALITY: u8 = 88;

/// Decoded, embed-ready image
#[derive(Debug, Clone)]
pub struct RasterImage {
    pub width: u32,
    pub height: u32,
    pub jpeg: Vec<u8>,
}

impl RasterImage {
    /// Decode and prepare an image for a page up to one trim width wide
    pub fn decode(bytes: &[u8]) -> PdfResult<Self> {
        Self::decode_with_limit(bytes, max_raster_edge(TRIM_SIZE))
    }

    pub fn decode_with_limit(bytes: &[u8], max_edge: u32) -> PdfResult<Self> {
        let img = image::load_from_memory(bytes)?;
        let (w, h) = img.dimensions();

        let img = if w.max(h) > max_edge {
            tracing::debug!(w, h, max_edge, "Downscaling raster");
            img.resize(max_edge, max_edge, FilterType::Triangle)
        } else {
            img
        };

        // Flatten alpha onto white so transparent regions do not print black
        let rgba = img.to_rgba8();
        let mut rgb = RgbImage::new(rgba.width(), rgba.height());
        for (x, y, px) in rgba.enumerate_pixels() {
            let [r, g, b, a] = px.0;
            let a = a as u16;
            let blend = |c: u8| ((c as u16 * a + 255 * (255 - a)) / 255) as u8;
            rgb.put_pixel(x, y, Rgb([blend(r), blend(g), blend(b)]));
        }

        let mut jpeg = Vec::new();
        let mut cursor = Cursor::new(&mut jpeg);
        let encoder = JpegEncoder::new_with_quality(&mut cursor, JPEG_QUALITY);
        rgb.write_with_encoder(encoder)?;

        Ok(Self {
            width: rgb.width(),
            height: rgb.height(),
            jpeg,
        })
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use image::{ImageFormat, Rgba, RgbaImage};
    use std::io::Cursor;

    /// Small solid-colour PNG
    pub fn png(width: u32, height: u32) -> Vec<u8> {
        let img = RgbaImage::from_pixel(width, height, Rgba([200, 80, 160, 255]));
        let mut bytes = Vec::new();
        img.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .expect("encode png");
        bytes
    }

    /// Fully transparent PNG
    pub fn transparent_png(width: u32, height: u32) -> Vec<u8> {
        let img = RgbaImage::from_pixel(width, height, Rgba([0, 0, 0, 0]));
        let mut bytes = Vec::new();
        img.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .expect("encode png");
        bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PdfError;

    #[test]
    fn test_decode_png_to_jpeg() {
        let raster = RasterImage::decode(&fixtures::png(40, 20)).unwrap();
        assert_eq!((raster.width, raster.height), (40, 20));
        // JPEG SOI marker
        assert_eq!(&raster.jpeg[..2], &[0xFF, 0xD8]);
    }

    #[test]
    fn test_downscale_keeps_aspect() {
        let raster = RasterImage::decode_with_limit(&fixtures::png(200, 100), 50).unwrap();
        assert_eq!(raster.width, 50);
        assert_eq!(raster.height, 25);
    }

    #[test]
    fn test_transparency_flattens_to_white() {
        let raster = RasterImage::decode(&fixtures::transparent_png(8, 8)).unwrap();
        let back = image::load_from_memory(&raster.jpeg).unwrap().to_rgb8();
        let px = back.get_pixel(4, 4).0;
        assert!(px.iter().all(|&c| c > 240), "{px:?}");
    }

    #[test]
    fn test_corrupt_bytes_fail() {
        let err = RasterImage::decode(b"definitely not an image").unwrap_err();
        assert!(matches!(err, PdfError::Image(_)));
    }
}
