//! Image rescaling by area sampling.
//!
//! | Entry point | Produces |
//! |---|---|
//! | [`smooth_scale`] | whole image at a size, optionally fitted to the aspect ratio |
//! | [`smooth_scale_clipped`] | only a clip of the scaled image; equals cropping the full result |
//! | [`smooth_scale_section`] | a source rectangle scaled to a size |
//! | [`scale`] | [`ScaleQuality::Smooth`] area sampling or [`ScaleQuality::Fast`] nearest neighbour |
//!
//! The module is split into:
//! - **Calculations**: pure size math ([`scaled_size`] and section helpers)
//! - **Tables**: per-column/per-row source indices and weights
//! - **Kernel**: the pixel loops
//!
//! Invalid sizes, a null source or a clip that misses everything give a null
//! image. Scaling to the source size copies instead of resampling.

pub mod calculations;
mod kernel;
pub mod tables;

pub use calculations::{AspectRatioMode, scaled_size};
pub use tables::{ScaleMappingTables, ScaleRegime};

use crate::image::buffer::{checked_sample_count, try_with_capacity};
use crate::image::{PixelBuffer, PixelData, Sample, SharedImage, clip_rect};
use calculations::{clipped_extent, full_scaled_extent, section_origin};
use kernel::{Source, render_nearest, render_smooth};
use serde::{Deserialize, Serialize};
use std::ops::Range;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScaleQuality {
    /// Area-weighted box filter.
    #[default]
    Smooth,
    /// Nearest neighbour.
    Fast,
}

/// Scale the whole image to `(dw, dh)`, fitted according to `mode`.
pub fn smooth_scale(image: &SharedImage, dw: i64, dh: i64, mode: AspectRatioMode) -> SharedImage {
    let (w, h) = scaled_size(image.size(), (dw, dh), mode);
    if w <= 0 || h <= 0 {
        debug!(dw, dh, ?mode, "scaled size is empty");
        return SharedImage::null();
    }
    smooth_scale_clipped(image, w, h, 0, 0, w, h)
}

/// Scale to `(dw, dh)` with the chosen quality, ignoring the aspect ratio.
pub fn scale(image: &SharedImage, dw: i64, dh: i64, quality: ScaleQuality) -> SharedImage {
    match quality {
        ScaleQuality::Smooth => smooth_scale(image, dw, dh, AspectRatioMode::Ignore),
        ScaleQuality::Fast => clipped_scale(image, (dw, dh), (0, 0, dw, dh), false),
    }
}

/// The `(clip_x, clip_y, clip_w, clip_h)` part of the image scaled to
/// `(dw, dh)`. The clip is intersected with the destination first.
pub fn smooth_scale_clipped(
    image: &SharedImage,
    dw: i64,
    dh: i64,
    clip_x: i64,
    clip_y: i64,
    clip_w: i64,
    clip_h: i64,
) -> SharedImage {
    clipped_scale(image, (dw, dh), (clip_x, clip_y, clip_w, clip_h), true)
}

/// Scale the source rectangle `(sx, sy, sw, sh)` to `(dw, dh)`.
///
/// When the rectangle sticks out of the image it is clipped and the
/// destination shrinks by the same proportion.
pub fn smooth_scale_section(
    image: &SharedImage,
    sx: i64,
    sy: i64,
    sw: i64,
    sh: i64,
    dw: i64,
    dh: i64,
) -> SharedImage {
    if dw <= 0 || dh <= 0 || sw <= 0 || sh <= 0 || image.is_null() {
        debug!(sw, sh, dw, dh, "invalid section geometry");
        return SharedImage::null();
    }
    let (w, h) = image.size();
    let Some((csx, csy, csw, csh)) = clip_rect(w, h, sx, sy, sw, sh) else {
        debug!(sx, sy, sw, sh, "section misses the image");
        return SharedImage::null();
    };

    let (Some(dw), Some(dh)) = (
        clipped_extent(dw, sw, csw as i64),
        clipped_extent(dh, sh, csh as i64),
    ) else {
        warn!(dw, dh, "section size overflows");
        return SharedImage::null();
    };
    let (Some(dw), Some(dh)) = (positive_u32(dw), positive_u32(dh)) else {
        debug!(dw, dh, "clipped section has no destination pixels");
        return SharedImage::null();
    };

    if csw == dw && csh == dh {
        return image.copy_region(csx as i64, csy as i64, csw as i64, csh as i64);
    }

    let dxx = section_origin(csx, dw as u64, csw);
    let dyy = section_origin(csy, dh as u64, csh);
    run(
        image,
        ScaleJob {
            scaled: (
                full_scaled_extent(dw as u64, w, csw),
                full_scaled_extent(dh as u64, h, csh),
            ),
            up: (dw >= csw, dh >= csh),
            cols: dxx..dxx + dw as u64,
            rows: dyy..dyy + dh as u64,
            out: (dw, dh),
        },
        true,
    )
}

fn positive_u32(v: i64) -> Option<u32> {
    if v <= 0 { None } else { u32::try_from(v).ok() }
}

fn clipped_scale(
    image: &SharedImage,
    (dw, dh): (i64, i64),
    (clip_x, clip_y, clip_w, clip_h): (i64, i64, i64, i64),
    smooth: bool,
) -> SharedImage {
    if clip_w <= 0 || clip_h <= 0 || image.is_null() {
        debug!(clip_w, clip_h, "nothing to scale");
        return SharedImage::null();
    }
    let (Some(dw), Some(dh)) = (positive_u32(dw), positive_u32(dh)) else {
        debug!(dw, dh, "invalid destination size");
        return SharedImage::null();
    };
    let Some((cx, cy, cw, ch)) = clip_rect(dw, dh, clip_x, clip_y, clip_w, clip_h) else {
        debug!(clip_x, clip_y, clip_w, clip_h, "clip misses the destination");
        return SharedImage::null();
    };

    let (w, h) = image.size();
    if (w, h) == (dw, dh) {
        return if (cw, ch) == (dw, dh) {
            image.copy()
        } else {
            image.copy_region(cx as i64, cy as i64, cw as i64, ch as i64)
        };
    }

    run(
        image,
        ScaleJob {
            scaled: (dw as u64, dh as u64),
            up: (dw >= w, dh >= h),
            cols: cx as u64..(cx + cw) as u64,
            rows: cy as u64..(cy + ch) as u64,
            out: (cw, ch),
        },
        smooth,
    )
}

/// One resolved scale: table extents plus the destination window to render.
struct ScaleJob {
    /// Extent the full source maps onto.
    scaled: (u64, u64),
    up: (bool, bool),
    cols: Range<u64>,
    rows: Range<u64>,
    out: (u32, u32),
}

fn run(image: &SharedImage, job: ScaleJob, smooth: bool) -> SharedImage {
    let (ow, oh) = job.out;
    let Some(samples) = checked_sample_count(ow, oh, image.depth()) else {
        warn!(ow, oh, "scaled image too large");
        return SharedImage::null();
    };

    let (w, h) = image.size();
    let has_alpha = image.has_alpha();
    let data = match image.buffer().data() {
        PixelData::Eight(v) => {
            render(v, (w, h), samples, &job, has_alpha, smooth).map(PixelData::Eight)
        }
        PixelData::Sixteen(v) => {
            render(v, (w, h), samples, &job, has_alpha, smooth).map(PixelData::Sixteen)
        }
    };
    let Some(data) = data else {
        warn!(ow, oh, "could not allocate the scaled image");
        return SharedImage::null();
    };

    match PixelBuffer::from_data(ow, oh, has_alpha, data) {
        Ok(buffer) => SharedImage::from_parts(buffer, image.meta().clone()),
        Err(e) => {
            warn!(error = %e, "scaled buffer has the wrong size");
            SharedImage::null()
        }
    }
}

/// Allocate the output, then the tables, then fill the output. `None` when
/// either allocation is refused.
fn render<T: Sample>(
    samples: &[T],
    (w, h): (u32, u32),
    out_samples: usize,
    job: &ScaleJob,
    has_alpha: bool,
    smooth: bool,
) -> Option<Vec<T>> {
    let mut out = try_with_capacity(out_samples)?;
    let tables = ScaleMappingTables::new(
        (w, h),
        job.scaled,
        job.up,
        job.cols.clone(),
        job.rows.clone(),
        smooth,
    )?;
    let src = Source::new(samples, w, h);
    if smooth {
        render_smooth(&src, &tables, job.cols.clone(), job.rows.clone(), has_alpha, &mut out);
    } else {
        render_nearest(&src, &tables, job.cols.clone(), job.rows.clone(), &mut out);
    }
    Some(out)
}
