use image::{Rgba, RgbaImage, imageops};

use crate::domain::{CanvasColor, ImageKind};

use super::geometry::Placement;

/// Fill alpha for a new canvas.
///
/// Only PNG sources may get a transparent background, and only when the
/// request asks for it and PNG transparency is not configured to be kept.
pub fn background_alpha(kind: ImageKind, requested_transparent: bool, png_is_transparent: bool) -> u8 {
    if kind == ImageKind::Png && requested_transparent && !png_is_transparent {
        0
    } else {
        u8::MAX
    }
}

pub fn allocate(width: u32, height: u32, color: CanvasColor, alpha: u8) -> RgbaImage {
    RgbaImage::from_pixel(width, height, Rgba([color.red, color.green, color.blue, alpha]))
}

/// Resample the planned source rectangle onto `canvas`.
///
/// Pixels are replaced, not blended, so source transparency survives.
pub fn composite(canvas: &mut RgbaImage, source: &RgbaImage, placement: &Placement) {
    let region = imageops::crop_imm(
        source,
        placement.source.x,
        placement.source.y,
        placement.source.width,
        placement.source.height,
    )
    .to_image();
    let resized = if (region.width(), region.height())
        == (placement.dest.width, placement.dest.height)
    {
        region
    } else {
        imageops::resize(
            &region,
            placement.dest.width,
            placement.dest.height,
            imageops::FilterType::Triangle,
        )
    };
    imageops::replace(
        canvas,
        &resized,
        i64::from(placement.dest.x),
        i64::from(placement.dest.y),
    );
}
