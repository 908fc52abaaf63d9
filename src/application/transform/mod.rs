//! Decode, resample, filter and re-encode a source image.

pub mod canvas;
pub mod encode;
pub mod filters;
pub mod geometry;
pub mod optimize;
pub mod palette;

use std::time::Instant;

use image::ImageError;
use thiserror::Error;
use tracing::debug;

use crate::{
    cache::encode_entry,
    domain::{ImageKind, TransformParams},
};

pub use optimize::{OptimizeError, PngOptimizer};

const DEFAULT_MAX_SOURCE_BYTES: u64 = 15 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum TransformError {
    #[error("source is {size} bytes, over the {max} byte limit")]
    TooLarge { size: u64, max: u64 },
    #[error("unsupported image type `{mime}`")]
    Unsupported { mime: String },
    #[error("could not decode {kind} image")]
    Decode {
        kind: &'static str,
        #[source]
        source: ImageError,
    },
    #[error("could not encode {kind} image")]
    Encode {
        kind: &'static str,
        #[source]
        source: ImageError,
    },
}

/// Size bounds and defaults the transformer enforces.
#[derive(Debug, Clone)]
pub struct TransformLimits {
    pub max_width: u32,
    pub max_height: u32,
    pub default_width: u32,
    pub default_height: u32,
    pub max_source_bytes: u64,
    /// Keep PNG transparency instead of filling with the canvas colour.
    pub png_is_transparent: bool,
}

impl Default for TransformLimits {
    fn default() -> Self {
        Self {
            max_width: 1920,
            max_height: 1920,
            default_width: 100,
            default_height: 100,
            max_source_bytes: DEFAULT_MAX_SOURCE_BYTES,
            png_is_transparent: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TransformOutput {
    pub kind: ImageKind,
    pub width: u32,
    pub height: u32,
    /// Encoded image bytes without the cache header.
    pub payload: Vec<u8>,
}

impl TransformOutput {
    /// Payload framed as a cache entry.
    pub fn entry_bytes(&self) -> Vec<u8> {
        encode_entry(self.kind, &self.payload)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ImageTransformer {
    limits: TransformLimits,
    optimizer: Option<PngOptimizer>,
}

impl ImageTransformer {
    pub fn new(limits: TransformLimits, optimizer: Option<PngOptimizer>) -> Self {
        Self { limits, optimizer }
    }

    /// Transform `source`, declared as `mime`, according to `params`.
    ///
    /// CPU-bound; callers on an async runtime should use a blocking task.
    pub fn transform(
        &self,
        source: &[u8],
        mime: &str,
        params: &TransformParams,
    ) -> Result<TransformOutput, TransformError> {
        let started_at = Instant::now();
        let size = source.len() as u64;
        if size > self.limits.max_source_bytes {
            return Err(TransformError::TooLarge {
                size,
                max: self.limits.max_source_bytes,
            });
        }
        let kind = ImageKind::from_mime(mime).ok_or_else(|| TransformError::Unsupported {
            mime: mime.to_string(),
        })?;

        let decoded = image::load_from_memory_with_format(source, kind.format()).map_err(
            |source| TransformError::Decode {
                kind: kind.tag(),
                source,
            },
        )?;
        let source_image = decoded.to_rgba8();
        let (source_width, source_height) = source_image.dimensions();

        let (target_width, target_height) = geometry::resolve_target(
            source_width,
            source_height,
            params.width,
            params.height,
            &self.limits,
        );
        let placement = geometry::plan(
            params.zoom_crop,
            source_width,
            source_height,
            target_width,
            target_height,
            params.align,
        );

        let alpha = canvas::background_alpha(
            kind,
            params.canvas_transparent,
            self.limits.png_is_transparent,
        );
        let mut output = canvas::allocate(
            placement.canvas_width,
            placement.canvas_height,
            params.canvas_color,
            alpha,
        );
        canvas::composite(&mut output, &source_image, &placement);

        filters::apply_chain(&mut output, &params.filters);
        if params.sharpen {
            filters::sharpen(&mut output);
        }
        if let Some(colors) = palette::transparent_palette_size(kind, source) {
            palette::quantize(&mut output, colors);
        }

        let mut payload =
            encode::encode(kind, &output, params.quality).map_err(|source| TransformError::Encode {
                kind: kind.tag(),
                source,
            })?;
        if kind == ImageKind::Png
            && let Some(optimizer) = &self.optimizer
        {
            payload = optimizer.optimize(payload);
        }

        let elapsed = started_at.elapsed();
        metrics::histogram!("thumbd_transform_ms").record(elapsed.as_secs_f64() * 1000.0);
        debug!(
            target = "thumbd::transform",
            op = "transform::run",
            result = "ok",
            kind = kind.tag(),
            source_width,
            source_height,
            width = output.width(),
            height = output.height(),
            zoom_crop = params.zoom_crop.code(),
            payload_bytes = payload.len(),
            elapsed_ms = elapsed.as_millis() as u64,
            "Image transformed"
        );

        Ok(TransformOutput {
            kind,
            width: output.width(),
            height: output.height(),
            payload,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use image::{ImageFormat, Rgba, RgbaImage};

    use super::*;
    use crate::cache::{HEADER_LEN, parse_header};
    use crate::domain::{QueryParams, TransformDefaults};

    fn encoded(width: u32, height: u32, format: ImageFormat) -> Vec<u8> {
        let image = RgbaImage::from_pixel(width, height, Rgba([200, 30, 60, 255]));
        let mut bytes = Vec::new();
        let rgb = image::DynamicImage::ImageRgba8(image).to_rgb8();
        rgb.write_to(&mut Cursor::new(&mut bytes), format)
            .expect("encode fixture");
        bytes
    }

    fn params(query: &str) -> TransformParams {
        TransformParams::from_query(&QueryParams::parse(query), &TransformDefaults::default())
    }

    #[test]
    fn jpeg_width_only_keeps_aspect_ratio() {
        let source = encoded(800, 600, ImageFormat::Jpeg);
        let output = ImageTransformer::default()
            .transform(&source, "image/jpeg", &params("w=200&h=0&zc=1"))
            .expect("transform");
        assert_eq!((output.width, output.height), (200, 150));
        assert_eq!(output.kind, ImageKind::Jpeg);
        let decoded = image::load_from_memory(&output.payload).expect("decode output");
        assert_eq!((decoded.width(), decoded.height()), (200, 150));
    }

    #[test]
    fn png_stretch_ignores_aspect() {
        let source = encoded(100, 100, ImageFormat::Png);
        let output = ImageTransformer::default()
            .transform(&source, "image/png", &params("w=50&h=50&zc=0"))
            .expect("transform");
        assert_eq!((output.width, output.height), (50, 50));
    }

    #[test]
    fn entry_bytes_carry_header() {
        let source = encoded(10, 10, ImageFormat::Gif);
        let output = ImageTransformer::default()
            .transform(&source, "image/gif", &params("w=5&h=5&f=2|1&s=1"))
            .expect("transform");
        let entry = output.entry_bytes();
        let header = parse_header(&entry, entry.len() as u64).expect("header");
        assert_eq!(header.kind, ImageKind::Gif);
        assert_eq!(&entry[HEADER_LEN..], output.payload.as_slice());
    }

    #[test]
    fn canvas_color_shorthand_fills_png_border() {
        let source = encoded(80, 40, ImageFormat::Png);
        let output = ImageTransformer::default()
            .transform(&source, "image/png", &params("w=20&h=20&zc=2&cc=abc&ct=0"))
            .expect("transform");
        let decoded = image::load_from_memory(&output.payload)
            .expect("decode")
            .to_rgba8();
        assert_eq!(decoded.get_pixel(10, 18), &Rgba([0xaa, 0xbb, 0xcc, 0xff]));
    }

    #[test]
    fn rejects_oversized_unsupported_and_corrupt_sources() {
        let transformer = ImageTransformer::new(
            TransformLimits {
                max_source_bytes: 16,
                ..TransformLimits::default()
            },
            None,
        );
        let err = transformer
            .transform(&[0u8; 32], "image/png", &params("w=1"))
            .expect_err("too large");
        assert!(matches!(err, TransformError::TooLarge { size: 32, max: 16 }));

        let transformer = ImageTransformer::default();
        let err = transformer
            .transform(b"bytes", "image/webp", &params("w=1"))
            .expect_err("unsupported");
        assert!(matches!(err, TransformError::Unsupported { .. }));

        let err = transformer
            .transform(b"definitely not a png", "image/png", &params("w=1"))
            .expect_err("corrupt");
        assert!(matches!(err, TransformError::Decode { .. }));
    }
}
