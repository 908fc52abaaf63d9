//! Thumbnail request model and lenient query-parameter parsing.

use std::{collections::HashMap, path::PathBuf, time::SystemTime};

use url::Url;

/// How the source aspect ratio is reconciled with the requested box.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ZoomCrop {
    /// Resample the whole source onto the whole target, ignoring aspect ratio.
    Stretch,
    /// Crop the largest matching-aspect region and fill the target.
    Crop,
    /// Fit inside the requested box; the canvas keeps the requested size.
    Contain,
    /// Fit inside the requested box; the canvas shrinks to the scaled size.
    ContainNoBorder,
}

impl ZoomCrop {
    /// Map a numeric `zc` value. Non-positive values stretch; anything above 3 crops.
    pub fn from_code(code: i64) -> Self {
        match code {
            i64::MIN..=0 => ZoomCrop::Stretch,
            2 => ZoomCrop::Contain,
            3 => ZoomCrop::ContainNoBorder,
            _ => ZoomCrop::Crop,
        }
    }

    pub fn code(self) -> u8 {
        match self {
            ZoomCrop::Stretch => 0,
            ZoomCrop::Crop => 1,
            ZoomCrop::Contain => 2,
            ZoomCrop::ContainNoBorder => 3,
        }
    }
}

/// Crop anchoring flags. Unset axes stay centred.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Alignment {
    pub top: bool,
    pub bottom: bool,
    pub left: bool,
    pub right: bool,
}

impl Alignment {
    pub const CENTER: Alignment = Alignment {
        top: false,
        bottom: false,
        left: false,
        right: false,
    };

    pub const TOP: Alignment = Alignment {
        top: true,
        bottom: false,
        left: false,
        right: false,
    };

    /// Parse composable flags such as `t`, `br` or `tl`. Unknown characters are ignored.
    pub fn parse(value: &str) -> Self {
        let mut alignment = Alignment::CENTER;
        for ch in value.chars() {
            match ch {
                't' => alignment.top = true,
                'b' => alignment.bottom = true,
                'l' => alignment.left = true,
                'r' => alignment.right = true,
                _ => {}
            }
        }
        alignment
    }
}

/// Opaque RGB background colour for the output canvas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CanvasColor {
    pub red: u8,
    pub green: u8,
    pub blue: u8,
}

impl CanvasColor {
    pub const WHITE: CanvasColor = CanvasColor {
        red: 0xff,
        green: 0xff,
        blue: 0xff,
    };

    /// Parse a 3- or 6-digit hex colour, with or without a leading `#`.
    ///
    /// Three digits expand by doubling each nibble (`abc` becomes `aabbcc`).
    /// Any other length, or non-hex digits, yields `None`.
    pub fn parse_hex(value: &str) -> Option<Self> {
        let trimmed = value.trim_start_matches('#');
        let expanded = match trimmed.len() {
            3 => trimmed.chars().flat_map(|ch| [ch, ch]).collect::<String>(),
            6 => trimmed.to_string(),
            _ => return None,
        };
        if !expanded.chars().all(|ch| ch.is_ascii_hexdigit()) {
            return None;
        }
        let channel = |range: std::ops::Range<usize>| u8::from_str_radix(&expanded[range], 16).ok();
        Some(CanvasColor {
            red: channel(0..2)?,
            green: channel(2..4)?,
            blue: channel(4..6)?,
        })
    }

    /// Parse `value`, falling back to `fallback` when it is not a valid colour.
    pub fn parse_or(value: &str, fallback: CanvasColor) -> Self {
        Self::parse_hex(value).unwrap_or(fallback)
    }

    pub fn to_hex(self) -> String {
        format!("{:02x}{:02x}{:02x}", self.red, self.green, self.blue)
    }
}

/// Post-resample pixel filters, addressed by their numeric id in `f=`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterOp {
    Negate,
    Grayscale,
    Brightness,
    Contrast,
    Colorize,
    EdgeDetect,
    Emboss,
    GaussianBlur,
    SelectiveBlur,
    MeanRemoval,
    Smooth,
}

impl FilterOp {
    pub fn from_id(id: i64) -> Option<Self> {
        let op = match id {
            1 => FilterOp::Negate,
            2 => FilterOp::Grayscale,
            3 => FilterOp::Brightness,
            4 => FilterOp::Contrast,
            5 => FilterOp::Colorize,
            6 => FilterOp::EdgeDetect,
            7 => FilterOp::Emboss,
            8 => FilterOp::GaussianBlur,
            9 => FilterOp::SelectiveBlur,
            10 => FilterOp::MeanRemoval,
            11 => FilterOp::Smooth,
            _ => return None,
        };
        Some(op)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FilterStep {
    pub op: FilterOp,
    pub args: [Option<i32>; 4],
}

impl FilterStep {
    /// Argument `index` (0-based), treating a missing slot as zero.
    pub fn arg(&self, index: usize) -> i32 {
        self.args.get(index).copied().flatten().unwrap_or(0)
    }
}

/// Ordered list of filters parsed from `id,arg,arg|id,...`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct FilterChain {
    steps: Vec<FilterStep>,
}

impl FilterChain {
    /// Unknown filter ids are skipped; missing argument slots stay `None`.
    pub fn parse(spec: &str) -> Self {
        let steps = spec
            .split('|')
            .filter(|segment| !segment.is_empty())
            .filter_map(|segment| {
                let mut parts = segment.split(',');
                let op = FilterOp::from_id(lenient_int(parts.next()?))?;
                let mut args = [None; 4];
                for slot in args.iter_mut() {
                    if let Some(raw) = parts.next() {
                        *slot = Some(lenient_int(raw).clamp(i32::MIN as i64, i32::MAX as i64) as i32);
                    }
                }
                Some(FilterStep { op, args })
            })
            .collect();
        Self { steps }
    }

    pub fn steps(&self) -> &[FilterStep] {
        &self.steps
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

/// Fully-resolved transform parameters for one request.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TransformParams {
    pub width: u32,
    pub height: u32,
    pub zoom_crop: ZoomCrop,
    pub quality: u8,
    pub align: Alignment,
    pub filters: FilterChain,
    pub sharpen: bool,
    pub canvas_color: CanvasColor,
    pub canvas_transparent: bool,
}

/// Fallbacks applied when a request omits a parameter.
#[derive(Debug, Clone)]
pub struct TransformDefaults {
    pub zoom_crop: ZoomCrop,
    pub quality: u8,
    pub filters: String,
    pub sharpen: bool,
    pub canvas_color: CanvasColor,
}

impl Default for TransformDefaults {
    fn default() -> Self {
        Self {
            zoom_crop: ZoomCrop::Crop,
            quality: 90,
            filters: String::new(),
            sharpen: false,
            canvas_color: CanvasColor::WHITE,
        }
    }
}

impl TransformParams {
    /// Build parameters from the `w h zc q a f s cc ct` query keys.
    pub fn from_query(query: &QueryParams, defaults: &TransformDefaults) -> Self {
        let width = clamp_u32(lenient_int(query.get("w").unwrap_or("0")).unsigned_abs());
        let height = clamp_u32(lenient_int(query.get("h").unwrap_or("0")).unsigned_abs());
        let zoom_crop = query
            .get("zc")
            .map(|value| ZoomCrop::from_code(lenient_int(value)))
            .unwrap_or(defaults.zoom_crop);
        let quality = query
            .get("q")
            .map(|value| lenient_int(value).unsigned_abs().min(100) as u8)
            .unwrap_or(defaults.quality);
        let align = Alignment::parse(query.get("a").unwrap_or("c"));
        let filters = FilterChain::parse(query.get("f").unwrap_or(defaults.filters.as_str()));
        let sharpen = query.get("s").map(truthy).unwrap_or(defaults.sharpen);
        let canvas_color = query
            .get("cc")
            .map(|value| CanvasColor::parse_or(value, defaults.canvas_color))
            .unwrap_or(defaults.canvas_color);
        let canvas_transparent = query.get("ct").map(truthy).unwrap_or(true);

        Self {
            width,
            height,
            zoom_crop,
            quality,
            align,
            filters,
            sharpen,
            canvas_color,
            canvas_transparent,
        }
    }
}

/// Where the source image comes from, with the state that identifies its version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceDescriptor {
    Local {
        path: PathBuf,
        modified: SystemTime,
        size: u64,
    },
    External {
        url: Url,
    },
}

impl SourceDescriptor {
    pub fn is_external(&self) -> bool {
        matches!(self, SourceDescriptor::External { .. })
    }
}

#[derive(Debug, Clone)]
pub struct ThumbnailRequest {
    pub source: SourceDescriptor,
    pub params: TransformParams,
    /// Raw query string as received; part of the cache fingerprint.
    pub query: String,
    pub webshot: bool,
}

/// Decoded query string that keeps the raw form for fingerprinting.
#[derive(Debug, Clone, Default)]
pub struct QueryParams {
    raw: String,
    values: HashMap<String, String>,
}

impl QueryParams {
    /// Later duplicates win, matching common form-decoding behaviour.
    pub fn parse(raw: &str) -> Self {
        let values = url::form_urlencoded::parse(raw.as_bytes())
            .into_owned()
            .collect::<HashMap<_, _>>();
        Self {
            raw: raw.to_string(),
            values,
        }
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }
}

/// Integer parse that reads an optional sign and leading digits, ignoring the rest.
///
/// `"200px"` is 200, `"-3"` is -3 and anything without leading digits is 0.
pub fn lenient_int(value: &str) -> i64 {
    let trimmed = value.trim_start();
    let (negative, digits) = match trimmed.as_bytes().first() {
        Some(b'-') => (true, &trimmed[1..]),
        Some(b'+') => (false, &trimmed[1..]),
        _ => (false, trimmed),
    };
    let magnitude = digits
        .bytes()
        .take_while(u8::is_ascii_digit)
        .fold(0i64, |acc, digit| {
            acc.saturating_mul(10).saturating_add(i64::from(digit - b'0'))
        });
    if negative { -magnitude } else { magnitude }
}

/// Empty strings and `"0"` are false; everything else is true.
pub fn truthy(value: &str) -> bool {
    !(value.is_empty() || value == "0")
}

fn clamp_u32(value: u64) -> u32 {
    u32::try_from(value).unwrap_or(u32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn three_digit_canvas_color_expands() {
        let color = CanvasColor::parse_hex("abc").expect("valid colour");
        assert_eq!(color.to_hex(), "aabbcc");
    }

    #[test]
    fn canvas_color_with_bad_length_falls_back() {
        let fallback = CanvasColor::parse_hex("102030").expect("fallback");
        assert_eq!(CanvasColor::parse_or("abcd", fallback), fallback);
        assert_eq!(CanvasColor::parse_or("zzzzzz", fallback), fallback);
        assert_eq!(CanvasColor::parse_or("#ff0000", fallback).red, 0xff);
    }

    #[test]
    fn filter_chain_skips_unknown_ids() {
        let chain = FilterChain::parse("2|99,1|3,-20|5,10,20,30,40");
        let ops: Vec<_> = chain.steps().iter().map(|step| step.op).collect();
        assert_eq!(
            ops,
            vec![FilterOp::Grayscale, FilterOp::Brightness, FilterOp::Colorize]
        );
        assert_eq!(chain.steps()[1].args, [Some(-20), None, None, None]);
        assert_eq!(chain.steps()[2].arg(3), 40);
        assert_eq!(chain.steps()[0].arg(0), 0);
    }

    #[test]
    fn alignment_flags_compose() {
        let align = Alignment::parse("tr");
        assert!(align.top && align.right);
        assert!(!align.bottom && !align.left);
        assert_eq!(Alignment::parse("c"), Alignment::CENTER);
    }

    #[test]
    fn zoom_crop_codes_map_leniently() {
        assert_eq!(ZoomCrop::from_code(0), ZoomCrop::Stretch);
        assert_eq!(ZoomCrop::from_code(-4), ZoomCrop::Stretch);
        assert_eq!(ZoomCrop::from_code(2), ZoomCrop::Contain);
        assert_eq!(ZoomCrop::from_code(7), ZoomCrop::Crop);
    }

    #[test]
    fn params_parse_from_query_with_defaults() {
        let query = QueryParams::parse("src=/a.jpg&w=-200px&zc=3&q=150&cc=%23abc&ct=0&s=1");
        let params = TransformParams::from_query(&query, &TransformDefaults::default());
        assert_eq!(params.width, 200);
        assert_eq!(params.height, 0);
        assert_eq!(params.zoom_crop, ZoomCrop::ContainNoBorder);
        assert_eq!(params.quality, 100);
        assert_eq!(params.canvas_color.to_hex(), "aabbcc");
        assert!(!params.canvas_transparent);
        assert!(params.sharpen);
        assert_eq!(params.align, Alignment::CENTER);
    }

    #[test]
    fn lenient_int_reads_leading_digits() {
        assert_eq!(lenient_int("  42abc"), 42);
        assert_eq!(lenient_int("-7"), -7);
        assert_eq!(lenient_int("abc"), 0);
        assert_eq!(lenient_int(""), 0);
    }
}
