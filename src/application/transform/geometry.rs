//! Target size resolution and source/destination rectangles per zoom-crop mode.

use crate::domain::{Alignment, ZoomCrop};

use super::TransformLimits;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Where pixels come from and where they land.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    pub canvas_width: u32,
    pub canvas_height: u32,
    pub source: Rect,
    pub dest: Rect,
}

/// Resolve the requested size against defaults, limits and the source size.
///
/// Both zero selects the configured defaults. Both sides are clamped to the
/// source and to the maximum bounds, then a single missing side is derived
/// from the source aspect ratio (rounded down, at least one pixel).
pub fn resolve_target(
    source_width: u32,
    source_height: u32,
    requested_width: u32,
    requested_height: u32,
    limits: &TransformLimits,
) -> (u32, u32) {
    let (mut width, mut height) = (requested_width, requested_height);
    if width == 0 && height == 0 {
        width = limits.default_width;
        height = limits.default_height;
    }
    width = width.min(source_width).min(limits.max_width);
    height = height.min(source_height).min(limits.max_height);

    let (sw, sh) = (f64::from(source_width), f64::from(source_height));
    if width > 0 && height == 0 {
        height = (sh * (f64::from(width) / sw)).floor() as u32;
        height = height.min(limits.max_height);
    } else if height > 0 && width == 0 {
        width = (sw * (f64::from(height) / sh)).floor() as u32;
        width = width.min(limits.max_width);
    }
    (width.max(1), height.max(1))
}

/// Horizontal or vertical offset for contained images.
///
/// Half the extent minus half the extent: always zero, so contained images
/// are pinned to the top-left corner of the canvas. Cached output depends on it.
pub fn centering_offset(extent: f64) -> u32 {
    ((extent / 2.0) - (extent / 2.0)).round() as u32
}

/// Compute the canvas size and copy rectangles for a resolved target size.
pub fn plan(
    mode: ZoomCrop,
    source_width: u32,
    source_height: u32,
    target_width: u32,
    target_height: u32,
    align: Alignment,
) -> Placement {
    let (sw, sh) = (f64::from(source_width), f64::from(source_height));
    let (mut nw, mut nh) = (f64::from(target_width), f64::from(target_height));

    if mode == ZoomCrop::ContainNoBorder {
        let final_height = sh * (nw / sw);
        if final_height > nh {
            nw = sw * (nh / sh);
        } else {
            nh = final_height;
        }
    }

    let canvas_width = to_pixels(nw);
    let canvas_height = to_pixels(nh);
    let full_source = Rect {
        x: 0,
        y: 0,
        width: source_width,
        height: source_height,
    };

    if mode == ZoomCrop::Stretch {
        return Placement {
            canvas_width,
            canvas_height,
            source: full_source,
            dest: Rect {
                x: 0,
                y: 0,
                width: canvas_width,
                height: canvas_height,
            },
        };
    }

    let (mut origin_x, mut origin_y) = (0, 0);
    if mode == ZoomCrop::Contain {
        let final_height = sh * (nw / sw);
        if final_height > nh {
            nw = sw * (nh / sh);
            origin_x = centering_offset(nw);
        } else {
            nh = final_height;
            origin_y = centering_offset(nh);
        }
    }

    let cmp_x = sw / nw;
    let cmp_y = sh / nh;
    let (mut src_x, mut src_y) = (0.0, 0.0);
    let (mut src_w, mut src_h) = (sw, sh);
    if cmp_x > cmp_y {
        src_w = (sw / cmp_x * cmp_y).round();
        src_x = ((sw - sw / cmp_x * cmp_y) / 2.0).round();
    } else if cmp_y > cmp_x {
        src_h = (sh / cmp_y * cmp_x).round();
        src_y = ((sh - sh / cmp_y * cmp_x) / 2.0).round();
    }

    if align.top {
        src_y = 0.0;
    }
    if align.bottom {
        src_y = sh - src_h;
    }
    if align.left {
        src_x = 0.0;
    }
    if align.right {
        src_x = sw - src_w;
    }

    let source = clamp_rect(src_x, src_y, src_w, src_h, source_width, source_height);
    let dest_width = to_pixels(nw).min(canvas_width.saturating_sub(origin_x)).max(1);
    let dest_height = to_pixels(nh).min(canvas_height.saturating_sub(origin_y)).max(1);

    Placement {
        canvas_width,
        canvas_height,
        source,
        dest: Rect {
            x: origin_x,
            y: origin_y,
            width: dest_width,
            height: dest_height,
        },
    }
}

fn to_pixels(value: f64) -> u32 {
    (value.trunc() as u32).max(1)
}

fn clamp_rect(x: f64, y: f64, width: f64, height: f64, max_w: u32, max_h: u32) -> Rect {
    let x = (x.max(0.0) as u32).min(max_w.saturating_sub(1));
    let y = (y.max(0.0) as u32).min(max_h.saturating_sub(1));
    let width = (width.max(1.0) as u32).min(max_w - x).max(1);
    let height = (height.max(1.0) as u32).min(max_h - y).max(1);
    Rect {
        x,
        y,
        width,
        height,
    }
}
