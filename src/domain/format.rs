//! Supported image container formats.

use imagesize::ImageType;

/// The three raster formats the pipeline accepts and re-encodes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageKind {
    Jpeg,
    Png,
    Gif,
}

impl ImageKind {
    /// Three-byte tag stored in the cache entry header.
    pub fn tag(self) -> &'static str {
        match self {
            ImageKind::Jpeg => "jpg",
            ImageKind::Png => "png",
            ImageKind::Gif => "gif",
        }
    }

    pub fn from_tag(tag: &[u8]) -> Option<Self> {
        match tag {
            b"jpg" => Some(ImageKind::Jpeg),
            b"png" => Some(ImageKind::Png),
            b"gif" => Some(ImageKind::Gif),
            _ => None,
        }
    }

    pub fn mime(self) -> &'static str {
        match self {
            ImageKind::Jpeg => "image/jpeg",
            ImageKind::Png => "image/png",
            ImageKind::Gif => "image/gif",
        }
    }

    /// Accepts `image/jpeg`, `image/jpg`, `image/png` and `image/gif`, ignoring case.
    pub fn from_mime(mime: &str) -> Option<Self> {
        let lowered = mime.trim().to_ascii_lowercase();
        match lowered.as_str() {
            "image/jpeg" | "image/jpg" => Some(ImageKind::Jpeg),
            "image/png" => Some(ImageKind::Png),
            "image/gif" => Some(ImageKind::Gif),
            _ => None,
        }
    }

    pub fn format(self) -> image::ImageFormat {
        match self {
            ImageKind::Jpeg => image::ImageFormat::Jpeg,
            ImageKind::Png => image::ImageFormat::Png,
            ImageKind::Gif => image::ImageFormat::Gif,
        }
    }

    /// Sniff the format from the leading bytes of a file.
    pub fn detect(bytes: &[u8]) -> Option<Self> {
        match imagesize::image_type(bytes).ok()? {
            ImageType::Jpeg => Some(ImageKind::Jpeg),
            ImageType::Png => Some(ImageKind::Png),
            ImageType::Gif => Some(ImageKind::Gif),
            _ => None,
        }
    }
}

/// Best-effort MIME type for arbitrary bytes, used in diagnostics and format gating.
pub fn sniff_mime(bytes: &[u8]) -> String {
    match imagesize::image_type(bytes) {
        Ok(ImageType::Jpeg) => ImageKind::Jpeg.mime().to_string(),
        Ok(ImageType::Png) => ImageKind::Png.mime().to_string(),
        Ok(ImageType::Gif) => ImageKind::Gif.mime().to_string(),
        Ok(other) => format!("image/{other:?}").to_ascii_lowercase(),
        Err(_) => "application/octet-stream".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mime_aliases_resolve() {
        assert_eq!(ImageKind::from_mime("image/JPG"), Some(ImageKind::Jpeg));
        assert_eq!(ImageKind::from_mime("image/jpeg"), Some(ImageKind::Jpeg));
        assert_eq!(ImageKind::from_mime("image/webp"), None);
    }

    #[test]
    fn detects_png_signature() {
        let header = [
            0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 13, b'I', b'H', b'D', b'R', 0,
            0, 0, 1, 0, 0, 0, 1, 8, 6, 0, 0, 0,
        ];
        assert_eq!(ImageKind::detect(&header), Some(ImageKind::Png));
        assert_eq!(sniff_mime(&header), "image/png");
    }

    #[test]
    fn unknown_bytes_are_octet_stream() {
        assert_eq!(ImageKind::detect(b"hello world"), None);
        assert_eq!(sniff_mime(b"hello world"), "application/octet-stream");
    }
}
