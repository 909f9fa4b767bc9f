//! Pure calculation functions for scale geometry.
//!
//! All functions here are pure and testable without any images. Integer
//! division truncates everywhere so sizes match what the pixel loops expect.

use serde::{Deserialize, Serialize};

/// How a requested size relates to the source aspect ratio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AspectRatioMode {
    /// Use the requested size as is.
    #[default]
    Ignore,
    /// Largest size inside the request that keeps the aspect ratio.
    Keep,
    /// Smallest size covering the request that keeps the aspect ratio.
    KeepByExpanding,
}

/// Fit `source` to `target` under `mode`.
///
/// # Examples
/// ```
/// # use rasterbuf::scale::{AspectRatioMode, scaled_size};
/// // 4:3 into a 100x100 box keeps the width.
/// assert_eq!(scaled_size((800, 600), (100, 100), AspectRatioMode::Keep), (100, 75));
/// // Expanding keeps the height instead.
/// assert_eq!(scaled_size((800, 600), (100, 100), AspectRatioMode::KeepByExpanding), (133, 100));
/// ```
pub fn scaled_size(source: (u32, u32), target: (i64, i64), mode: AspectRatioMode) -> (i64, i64) {
    let (w, h) = (source.0 as i64, source.1 as i64);
    let (tw, th) = target;

    if mode == AspectRatioMode::Ignore || w == 0 || h == 0 {
        return target;
    }

    let rw = th.saturating_mul(w) / h;
    let use_height = match mode {
        AspectRatioMode::Keep => rw <= tw,
        _ => rw >= tw,
    };

    if use_height {
        (rw, th)
    } else {
        (tw, tw.saturating_mul(h) / w)
    }
}

/// Destination size of a section after its source rectangle was clipped
/// from `requested` to `clipped` pixels along one axis.
///
/// `None` when the intermediate product overflows.
pub fn clipped_extent(dst: i64, requested: i64, clipped: i64) -> Option<i64> {
    if requested == clipped {
        Some(dst)
    } else {
        Some(dst.checked_mul(clipped)? / requested)
    }
}

/// Extent the whole image would have at the section's scale factor.
///
/// The mapping tables are laid over this extent so that section pixels land
/// where they would in a full-image scale.
pub fn full_scaled_extent(dst: u64, image: u32, section: u32) -> u64 {
    dst * image as u64 / section as u64
}

/// First destination index of a section starting at `start`.
pub fn section_origin(start: u32, dst: u64, section: u32) -> u64 {
    start as u64 * dst / section as u64
}
