//! Palette detection for indexed sources and re-quantisation of the output.
//!
//! Indexed PNG and GIF sources with a transparent colour (at an index above
//! zero) are reduced back to a palette of the same size after resampling.

use std::io::Cursor;

use color_quant::NeuQuant;
use image::RgbaImage;

use crate::domain::ImageKind;

/// Training sample factor for the quantiser; 1 is slowest, 30 fastest.
const SAMPLE_FACTOR: i32 = 10;

/// Palette size of an indexed source with a transparent index above zero.
pub fn transparent_palette_size(kind: ImageKind, bytes: &[u8]) -> Option<usize> {
    let info = match kind {
        ImageKind::Png => inspect_png(bytes)?,
        ImageKind::Gif => inspect_gif(bytes)?,
        ImageKind::Jpeg => return None,
    };
    match info.transparent_index {
        Some(index) if index > 0 && info.colors > 0 => Some(info.colors),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PaletteInfo {
    colors: usize,
    transparent_index: Option<usize>,
}

fn inspect_png(bytes: &[u8]) -> Option<PaletteInfo> {
    let reader = png::Decoder::new(Cursor::new(bytes)).read_info().ok()?;
    let info = reader.info();
    if info.color_type != png::ColorType::Indexed {
        return None;
    }
    Some(PaletteInfo {
        colors: info.palette.as_ref().map_or(0, |palette| palette.len() / 3),
        transparent_index: info
            .trns
            .as_ref()
            .and_then(|alphas| alphas.iter().position(|alpha| *alpha == 0)),
    })
}

/// Reads the global table and the first frame's control extension.
fn inspect_gif(bytes: &[u8]) -> Option<PaletteInfo> {
    let mut decoder = gif::DecodeOptions::new().read_info(bytes).ok()?;
    let global = decoder.global_palette().map_or(0, |palette| palette.len() / 3);
    let frame = decoder.next_frame_info().ok()??;
    let colors = frame
        .palette
        .as_ref()
        .map_or(global, |palette| palette.len() / 3);
    Some(PaletteInfo {
        colors,
        transparent_index: frame.transparent.map(usize::from),
    })
}

/// Reduce `image` to at most `colors` distinct RGB values. Alpha is
/// preserved per pixel.
pub fn quantize(image: &mut RgbaImage, colors: usize) {
    if colors == 0 {
        return;
    }
    let mut distinct: Vec<[u8; 3]> = image
        .pixels()
        .map(|pixel| [pixel.0[0], pixel.0[1], pixel.0[2]])
        .collect();
    distinct.sort_unstable();
    distinct.dedup();
    if distinct.len() <= colors {
        return;
    }

    let opaque: Vec<u8> = image
        .pixels()
        .flat_map(|pixel| [pixel.0[0], pixel.0[1], pixel.0[2], u8::MAX])
        .collect();
    let quantizer = NeuQuant::new(SAMPLE_FACTOR, colors, &opaque);
    for pixel in image.pixels_mut() {
        let mut sample = [pixel.0[0], pixel.0[1], pixel.0[2], u8::MAX];
        quantizer.map_pixel(&mut sample);
        pixel.0[..3].copy_from_slice(&sample[..3]);
    }
}

#[cfg(test)]
mod tests {
    use image::Rgba;

    use super::*;

    fn indexed_png(palette_len: usize, trns: &[u8]) -> Vec<u8> {
        let mut bytes = Vec::new();
        let mut encoder = png::Encoder::new(&mut bytes, 4, 4);
        encoder.set_color(png::ColorType::Indexed);
        encoder.set_depth(png::BitDepth::Eight);
        encoder.set_palette(vec![0u8; palette_len * 3]);
        if !trns.is_empty() {
            encoder.set_trns(trns.to_vec());
        }
        let mut writer = encoder.write_header().expect("png header");
        writer.write_image_data(&[0u8; 16]).expect("png data");
        writer.finish().expect("png finish");
        bytes
    }

    fn indexed_gif(transparent: Option<u8>) -> Vec<u8> {
        let mut bytes = Vec::new();
        {
            let palette = [0u8; 4 * 3];
            let mut encoder = gif::Encoder::new(&mut bytes, 1, 1, &palette).expect("gif header");
            let frame = gif::Frame {
                width: 1,
                height: 1,
                buffer: vec![0u8].into(),
                transparent,
                ..gif::Frame::default()
            };
            encoder.write_frame(&frame).expect("gif frame");
        }
        bytes
    }

    #[test]
    fn indexed_png_with_transparent_index_reports_palette() {
        let bytes = indexed_png(16, &[255, 255, 0]);
        assert_eq!(transparent_palette_size(ImageKind::Png, &bytes), Some(16));
    }

    #[test]
    fn transparent_index_zero_is_ignored() {
        let bytes = indexed_png(16, &[0, 255]);
        assert_eq!(transparent_palette_size(ImageKind::Png, &bytes), None);
        let opaque = indexed_png(16, &[]);
        assert_eq!(transparent_palette_size(ImageKind::Png, &opaque), None);
    }

    #[test]
    fn gif_graphic_control_extension_is_read() {
        assert_eq!(
            transparent_palette_size(ImageKind::Gif, &indexed_gif(Some(2))),
            Some(4)
        );
        assert_eq!(transparent_palette_size(ImageKind::Gif, &indexed_gif(None)), None);
    }

    #[test]
    fn quantize_limits_distinct_colors() {
        let mut image =
            RgbaImage::from_fn(16, 16, |x, y| Rgba([(x * 16) as u8, (y * 16) as u8, 7, 255]));
        quantize(&mut image, 8);
        let distinct: std::collections::HashSet<_> = image.pixels().map(|p| p.0).collect();
        assert!(distinct.len() <= 8);
        assert!(image.pixels().all(|p| p.0[3] == 255));
    }
}
