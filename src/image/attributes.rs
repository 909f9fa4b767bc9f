//! Well-known attribute keys and the values stored under them.
//!
//! Attributes are free-form, but the loader, the fingerprinting code and the
//! geometry operations agree on the keys below.

use super::history::ImageHistory;
use serde::{Deserialize, Serialize};

/// Absolute path the image was decoded from.
pub const ORIGINAL_FILE_PATH: &str = "originalFilePath";
/// Format name reported by the decoder (`"JPEG"`, `"PNG"`, ...).
pub const DETECTED_FILE_FORMAT: &str = "detectedFileFormat";
/// Set when the decoder could not guarantee a lossless re-encode.
pub const IS_READ_ONLY: &str = "isReadOnly";
/// Cached V1 content hash.
pub const UNIQUE_HASH: &str = "uniqueHash";
/// Cached V2 content hash.
pub const UNIQUE_HASH_V2: &str = "uniqueHashV2";
/// Dimensions of the file as stored on disk, tracked through rotations.
pub const ORIGINAL_SIZE: &str = "originalSize";
/// History as it was when the file was loaded.
pub const ORIGINAL_IMAGE_HISTORY: &str = "originalImageHistory";
/// Guards against applying the Exif orientation twice.
pub const EXIF_ROTATED: &str = "exifRotated";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum AttributeValue {
    Bool(bool),
    Text(String),
    Bytes(Vec<u8>),
    Size { width: u32, height: u32 },
    History(ImageHistory),
}

impl AttributeValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_size(&self) -> Option<(u32, u32)> {
        match self {
            Self::Size { width, height } => Some((*width, *height)),
            _ => None,
        }
    }

    pub fn as_history(&self) -> Option<&ImageHistory> {
        match self {
            Self::History(h) => Some(h),
            _ => None,
        }
    }
}

impl From<bool> for AttributeValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<String> for AttributeValue {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<&str> for AttributeValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<Vec<u8>> for AttributeValue {
    fn from(b: Vec<u8>) -> Self {
        Self::Bytes(b)
    }
}

impl From<ImageHistory> for AttributeValue {
    fn from(h: ImageHistory) -> Self {
        Self::History(h)
    }
}
