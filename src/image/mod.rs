//! The in-memory image: pixels plus everything that travels with them.
//!
//! | Piece | Type |
//! |---|---|
//! | **Pixels** | [`PixelBuffer`]: packed B/G/R/A, 8 or 16 bits per channel |
//! | **Handle** | [`SharedImage`]: copy-on-write `Arc` over pixels and side-table |
//! | **Side-table** | [`ImageMeta`]: attributes, embedded text, ICC and Exif blobs, history |
//! | **Depth** | [`DitherRng`], `to_sixteen_bit` / `to_eight_bit` |
//! | **Geometry** | crop, [`Rotation`], [`Flip`], [`Orientation`], [`TransformAction`] |

pub mod attributes;
pub mod buffer;
pub mod depth;
pub mod geometry;
pub mod history;
pub mod shared;

pub use attributes::AttributeValue;
pub use buffer::{BufferError, Color, ColorDepth, PixelBuffer, PixelData, Sample};
pub use depth::{DEFAULT_DITHER_SEED, DitherRng};
pub use geometry::{Flip, Orientation, Rotation, TransformAction};
pub use history::{
    FilterAction, FilterCategory, HistoryEntry, HistoryImageId, HistoryImageKind, ImageHistory,
};
pub use shared::{ImageMeta, SharedImage, clip_rect};
