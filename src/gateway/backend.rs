//! Format gateway trait and shared types.
//!
//! The [`FormatGateway`] trait is the narrow seam between in-memory images
//! and encoded files: identify, load and save. Nothing past this trait knows
//! about file formats.
//!
//! The production implementation is
//! [`RustGateway`](super::rust_gateway::RustGateway), built on the `image`
//! crate's pure Rust codecs.

use super::params::ImageFormat;
use crate::image::SharedImage;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to decode {path}: {reason}")]
    Decode { path: String, reason: String },
    #[error("Processing failed: {0}")]
    ProcessingFailed(String),
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),
    #[error("Cannot save a null image")]
    NullImage,
}

/// Result of an identify operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

/// Trait for decode/encode backends.
///
/// A load fills the image's side-table with what the file provides (source
/// path, detected format, original size, ICC profile, Exif blob). A save
/// writes pixels in the requested format, narrowing depth or dropping alpha
/// where the format cannot carry them.
pub trait FormatGateway: Sync {
    /// Get image dimensions without decoding pixels where possible.
    fn identify(&self, path: &Path) -> Result<Dimensions, GatewayError>;

    /// Decode a file into a new image.
    fn load(&self, path: &Path) -> Result<SharedImage, GatewayError>;

    /// Encode `image` to `path` as `format`.
    fn save(&self, image: &SharedImage, path: &Path, format: ImageFormat)
    -> Result<(), GatewayError>;
}
