//! Domain types for thumbnail requests and image formats.

pub mod format;
pub mod request;

pub use format::{ImageKind, sniff_mime};
pub use request::{
    Alignment, CanvasColor, FilterChain, FilterOp, FilterStep, QueryParams, SourceDescriptor,
    ThumbnailRequest, TransformDefaults, TransformParams, ZoomCrop,
};
