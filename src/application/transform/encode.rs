use std::io::Cursor;

use image::{
    DynamicImage, ImageError, ImageFormat, RgbaImage,
    codecs::{
        jpeg::JpegEncoder,
        png::{CompressionType, FilterType, PngEncoder},
    },
};

use crate::domain::ImageKind;

/// zlib-style level (0..=9) for a 0..=100 quality value.
pub fn png_compression_level(quality: u8) -> u8 {
    (f64::from(quality.min(100)) * 0.09).floor() as u8
}

fn png_compression(level: u8) -> CompressionType {
    match level {
        0..=2 => CompressionType::Fast,
        3..=6 => CompressionType::Default,
        _ => CompressionType::Best,
    }
}

/// Encode the canvas in the source's format.
pub fn encode(kind: ImageKind, canvas: &RgbaImage, quality: u8) -> Result<Vec<u8>, ImageError> {
    let mut buffer = Vec::new();
    match kind {
        ImageKind::Jpeg => {
            let rgb = DynamicImage::ImageRgba8(canvas.clone()).to_rgb8();
            let encoder = JpegEncoder::new_with_quality(&mut buffer, quality.clamp(1, 100));
            rgb.write_with_encoder(encoder)?;
        }
        ImageKind::Png => {
            let compression = png_compression(png_compression_level(quality));
            let encoder =
                PngEncoder::new_with_quality(&mut buffer, compression, FilterType::Adaptive);
            canvas.write_with_encoder(encoder)?;
        }
        ImageKind::Gif => {
            let mut cursor = Cursor::new(&mut buffer);
            canvas.write_to(&mut cursor, ImageFormat::Gif)?;
        }
    }
    Ok(buffer)
}
