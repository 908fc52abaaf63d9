//! Post-resample pixel filters and the sharpen kernel.
//!
//! Alpha is never altered by a convolution; it is copied from the centre
//! pixel. Edge pixels sample their nearest in-bounds neighbour.

use image::{Rgba, RgbaImage};

use crate::domain::{FilterChain, FilterOp, FilterStep};

type Kernel = [[f32; 3]; 3];

const EDGE_DETECT: Kernel = [[-1.0, 0.0, -1.0], [0.0, 4.0, 0.0], [-1.0, 0.0, -1.0]];
const EMBOSS: Kernel = [[1.5, 0.0, 0.0], [0.0, 0.0, 0.0], [0.0, 0.0, -1.5]];
const GAUSSIAN: Kernel = [[1.0, 2.0, 1.0], [2.0, 4.0, 2.0], [1.0, 2.0, 1.0]];
const MEAN_REMOVAL: Kernel = [[-1.0, -1.0, -1.0], [-1.0, 9.0, -1.0], [-1.0, -1.0, -1.0]];
const SHARPEN: Kernel = [[-1.0, -1.0, -1.0], [-1.0, 16.0, -1.0], [-1.0, -1.0, -1.0]];

/// Apply every step of `chain` in order.
pub fn apply_chain(image: &mut RgbaImage, chain: &FilterChain) {
    for step in chain.steps() {
        apply(image, step);
    }
}

pub fn apply(image: &mut RgbaImage, step: &FilterStep) {
    match step.op {
        FilterOp::Negate => map_rgb(image, |channel| 255 - channel),
        FilterOp::Grayscale => grayscale(image),
        FilterOp::Brightness => {
            let delta = step.arg(0);
            map_rgb(image, |channel| clamp_channel(i32::from(channel).saturating_add(delta)));
        }
        FilterOp::Contrast => contrast(image, step.arg(0)),
        FilterOp::Colorize => colorize(image, step.arg(0), step.arg(1), step.arg(2), step.arg(3)),
        FilterOp::EdgeDetect => convolve(image, &EDGE_DETECT, 1.0, 127.0),
        FilterOp::Emboss => convolve(image, &EMBOSS, 1.0, 127.0),
        FilterOp::GaussianBlur => convolve(image, &GAUSSIAN, 16.0, 0.0),
        FilterOp::SelectiveBlur => selective_blur(image),
        FilterOp::MeanRemoval => convolve(image, &MEAN_REMOVAL, 1.0, 0.0),
        FilterOp::Smooth => {
            let weight = step.arg(0) as f32;
            let mut kernel = [[1.0; 3]; 3];
            kernel[1][1] = weight;
            convolve(image, &kernel, weight + 8.0, 0.0);
        }
    }
}

pub fn sharpen(image: &mut RgbaImage) {
    convolve(image, &SHARPEN, 8.0, 0.0);
}

fn clamp_channel(value: i32) -> u8 {
    value.clamp(0, 255) as u8
}

fn map_rgb(image: &mut RgbaImage, f: impl Fn(u8) -> u8) {
    for pixel in image.pixels_mut() {
        for channel in &mut pixel.0[..3] {
            *channel = f(*channel);
        }
    }
}

fn grayscale(image: &mut RgbaImage) {
    for pixel in image.pixels_mut() {
        let [r, g, b, _] = pixel.0;
        let gray = (0.299 * f32::from(r) + 0.587 * f32::from(g) + 0.114 * f32::from(b)) as u8;
        pixel.0[..3].fill(gray);
    }
}

fn contrast(image: &mut RgbaImage, amount: i32) {
    let factor = ((100.0 - amount as f64) / 100.0).powi(2);
    map_rgb(image, |channel| {
        let scaled = ((f64::from(channel) / 255.0 - 0.5) * factor + 0.5) * 255.0;
        scaled.clamp(0.0, 255.0) as u8
    });
}

/// `alpha` uses the 0..=127 transparency scale: positive values fade the image.
fn colorize(image: &mut RgbaImage, red: i32, green: i32, blue: i32, alpha: i32) {
    for pixel in image.pixels_mut() {
        let [r, g, b, a] = pixel.0;
        let transparency = (255 - i32::from(a)) * 127 / 255;
        let transparency = transparency.saturating_add(alpha).clamp(0, 127);
        *pixel = Rgba([
            clamp_channel(i32::from(r).saturating_add(red)),
            clamp_channel(i32::from(g).saturating_add(green)),
            clamp_channel(i32::from(b).saturating_add(blue)),
            clamp_channel(255 - transparency * 255 / 127),
        ]);
    }
}

fn neighbour(source: &RgbaImage, x: u32, y: u32, dx: i64, dy: i64) -> &Rgba<u8> {
    let max_x = i64::from(source.width()) - 1;
    let max_y = i64::from(source.height()) - 1;
    let nx = (i64::from(x) + dx).clamp(0, max_x) as u32;
    let ny = (i64::from(y) + dy).clamp(0, max_y) as u32;
    source.get_pixel(nx, ny)
}

/// 3x3 convolution: `sum / divisor + offset`, clamped per channel.
pub fn convolve(image: &mut RgbaImage, kernel: &Kernel, divisor: f32, offset: f32) {
    let divisor = if divisor == 0.0 { 1.0 } else { divisor };
    let source = image.clone();
    for (x, y, pixel) in image.enumerate_pixels_mut() {
        let mut sums = [0.0f32; 3];
        for (j, row) in kernel.iter().enumerate() {
            for (i, weight) in row.iter().enumerate() {
                let sample = neighbour(&source, x, y, i as i64 - 1, j as i64 - 1);
                for (sum, channel) in sums.iter_mut().zip(sample.0) {
                    *sum += f32::from(channel) * weight;
                }
            }
        }
        for (channel, sum) in pixel.0[..3].iter_mut().zip(sums) {
            *channel = (sum / divisor + offset).clamp(0.0, 255.0) as u8;
        }
    }
}

/// Edge-preserving blur: neighbours are weighted by the inverse of their
/// per-channel distance to the centre, the centre itself by one half.
fn selective_blur(image: &mut RgbaImage) {
    let source = image.clone();
    for (x, y, pixel) in image.enumerate_pixels_mut() {
        let centre = source.get_pixel(x, y).0;
        let mut weights = [[[0.0f32; 3]; 3]; 3];
        let mut totals = [0.0f32; 3];
        for j in 0..3 {
            for i in 0..3 {
                let cell = &mut weights[j][i];
                if i == 1 && j == 1 {
                    *cell = [0.5; 3];
                } else {
                    let sample = neighbour(&source, x, y, i as i64 - 1, j as i64 - 1).0;
                    for c in 0..3 {
                        let diff = (f32::from(centre[c]) - f32::from(sample[c])).abs();
                        cell[c] = if diff != 0.0 { 1.0 / diff } else { 1.0 };
                    }
                }
                for c in 0..3 {
                    totals[c] += cell[c];
                }
            }
        }

        let mut blurred = [0.0f32; 3];
        for j in 0..3 {
            for i in 0..3 {
                let sample = neighbour(&source, x, y, i as i64 - 1, j as i64 - 1).0;
                for c in 0..3 {
                    let weight = if totals[c] != 0.0 {
                        weights[j][i][c] / totals[c]
                    } else {
                        weights[j][i][c]
                    };
                    blurred[c] += f32::from(sample[c]) * weight;
                }
            }
        }
        for (channel, value) in pixel.0[..3].iter_mut().zip(blurred) {
            *channel = value.round().clamp(0.0, 255.0) as u8;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid(r: u8, g: u8, b: u8) -> RgbaImage {
        RgbaImage::from_pixel(3, 3, Rgba([r, g, b, 200]))
    }

    #[test]
    fn negate_and_grayscale_keep_alpha() {
        let mut image = solid(10, 20, 30);
        apply_chain(&mut image, &FilterChain::parse("1"));
        assert_eq!(image.get_pixel(0, 0), &Rgba([245, 235, 225, 200]));

        let mut image = solid(200, 40, 10);
        apply_chain(&mut image, &FilterChain::parse("2"));
        let [r, g, b, a] = image.get_pixel(1, 1).0;
        assert_eq!((r, r), (g, b));
        assert!((83..=84).contains(&r));
        assert_eq!(a, 200);
    }

    #[test]
    fn brightness_clamps_channels() {
        let mut image = solid(250, 5, 128);
        apply_chain(&mut image, &FilterChain::parse("3,20"));
        assert_eq!(image.get_pixel(2, 2).0[..3], [255, 25, 148]);
    }

    #[test]
    fn blur_kernels_leave_flat_images_unchanged() {
        for spec in ["8", "9", "10", "11,4"] {
            let mut image = solid(90, 120, 150);
            apply_chain(&mut image, &FilterChain::parse(spec));
            assert_eq!(image.get_pixel(1, 1).0[..3], [90, 120, 150], "filter {spec}");
        }
    }

    #[test]
    fn edge_detect_of_flat_image_is_mid_gray() {
        let mut image = solid(40, 80, 160);
        apply_chain(&mut image, &FilterChain::parse("6"));
        assert_eq!(image.get_pixel(1, 1).0[..3], [127, 127, 127]);
    }

    #[test]
    fn sharpen_preserves_flat_regions() {
        let mut image = solid(60, 70, 80);
        sharpen(&mut image);
        assert_eq!(image.get_pixel(1, 1).0[..3], [60, 70, 80]);
    }

    #[test]
    fn colorize_shifts_channels() {
        let mut image = solid(100, 100, 100);
        apply_chain(&mut image, &FilterChain::parse("5,10,-20,200"));
        assert_eq!(image.get_pixel(0, 0).0[..3], [110, 80, 255]);
    }

    #[test]
    fn extreme_arguments_saturate_instead_of_wrapping() {
        let mut image = solid(100, 100, 100);
        apply_chain(&mut image, &FilterChain::parse("3,2147483647"));
        assert_eq!(image.get_pixel(0, 0).0[..3], [255, 255, 255]);

        let mut image = solid(100, 100, 100);
        apply_chain(&mut image, &FilterChain::parse("3,-2147483648"));
        assert_eq!(image.get_pixel(0, 0).0[..3], [0, 0, 0]);

        let mut image = solid(100, 100, 100);
        apply_chain(&mut image, &FilterChain::parse("5,2147483647,0,-2147483648,2147483647"));
        assert_eq!(image.get_pixel(0, 0).0, [255, 100, 0, 0]);
    }
}
