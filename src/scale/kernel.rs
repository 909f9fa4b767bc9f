//! Pixel loops for area-sampling and nearest-neighbour scaling.
//!
//! One generic kernel covers both sample widths; alpha handling is a flag on
//! the output stage. Every channel goes through the same arithmetic, alpha
//! included; without alpha the stored alpha is then forced to opaque.
//!
//! Fixed-point stages per regime (`ap` values are table weights):
//!
//! | Regime | Stage 1 | Stage 2 | Output |
//! |---|---|---|---|
//! | both up | 2×2 blend, 8-bit weights | | `>> 16` (or `>> 8` for one axis) |
//! | x up, y down | column box, 2.14 weights, `>> 10` | blend columns, 8-bit | `>> 12` (or `>> 4`) |
//! | x down, y up | row box, 2.14 weights, `>> 10` | blend rows, 8-bit | `>> 12` (or `>> 4`) |
//! | both down | row box `>> 9` | column box of rows `>> 14` | `>> 5` |
//!
//! Each shift applies to a whole weighted sum, never to its terms, so a
//! uniform area comes out at exactly its input value.

use super::tables::{BoxWeights, ScaleMappingTables, ScaleRegime};
use crate::image::Sample;
use crate::image::buffer::{ALPHA, CHANNELS};
use std::ops::Range;
use tracing::debug;

type Px = [i64; CHANNELS];

/// Read-only view of a packed source image. Reads past an edge return the
/// edge pixel.
pub struct Source<'a, T> {
    samples: &'a [T],
    width: usize,
    height: usize,
}

impl<'a, T: Sample> Source<'a, T> {
    pub fn new(samples: &'a [T], width: u32, height: u32) -> Self {
        debug_assert_eq!(samples.len(), width as usize * height as usize * CHANNELS);
        Self {
            samples,
            width: width as usize,
            height: height as usize,
        }
    }

    #[inline(always)]
    fn pixel(&self, x: usize, y: usize) -> Px {
        let x = x.min(self.width - 1);
        let y = y.min(self.height - 1);
        let i = (y * self.width + x) * CHANNELS;
        let p = &self.samples[i..i + CHANNELS];
        [p[0].widen(), p[1].widen(), p[2].widen(), p[3].widen()]
    }

    /// Weighted sum along a row starting at `(x, y)`.
    #[inline]
    fn row_box(&self, x: usize, y: usize, entry: i64) -> Px {
        let mut acc = [0; CHANNELS];
        for (offset, weight) in BoxWeights::from_entry(entry) {
            mul_add(&mut acc, self.pixel(x + offset, y), weight);
        }
        acc
    }

    /// Weighted sum down a column starting at `(x, y)`.
    #[inline]
    fn column_box(&self, x: usize, y: usize, entry: i64) -> Px {
        let mut acc = [0; CHANNELS];
        for (offset, weight) in BoxWeights::from_entry(entry) {
            mul_add(&mut acc, self.pixel(x, y + offset), weight);
        }
        acc
    }
}

#[inline(always)]
fn mul_add(acc: &mut Px, px: Px, weight: i64) {
    for c in 0..CHANNELS {
        acc[c] += px[c] * weight;
    }
}

#[inline(always)]
fn blend(a: Px, wa: i64, b: Px, wb: i64, shift: u32) -> Px {
    let mut out = [0; CHANNELS];
    for c in 0..CHANNELS {
        out[c] = (a[c] * wa + b[c] * wb) >> shift;
    }
    out
}

#[inline(always)]
fn shr(px: Px, shift: u32) -> Px {
    px.map(|v| v >> shift)
}

fn both_up<T: Sample>(src: &Source<'_, T>, sx: usize, sy: usize, xap: i64, yap: i64) -> Px {
    match (xap > 0, yap > 0) {
        (true, true) => {
            let top = blend(src.pixel(sx, sy), 256 - xap, src.pixel(sx + 1, sy), xap, 0);
            let bottom = blend(
                src.pixel(sx, sy + 1),
                256 - xap,
                src.pixel(sx + 1, sy + 1),
                xap,
                0,
            );
            blend(top, 256 - yap, bottom, yap, 16)
        }
        (false, true) => blend(src.pixel(sx, sy), 256 - yap, src.pixel(sx, sy + 1), yap, 8),
        (true, false) => blend(src.pixel(sx, sy), 256 - xap, src.pixel(sx + 1, sy), xap, 8),
        (false, false) => src.pixel(sx, sy),
    }
}

fn x_up_y_down<T: Sample>(src: &Source<'_, T>, sx: usize, sy: usize, xap: i64, yentry: i64) -> Px {
    let left = shr(src.column_box(sx, sy, yentry), 10);
    if xap > 0 {
        let right = shr(src.column_box(sx + 1, sy, yentry), 10);
        blend(left, 256 - xap, right, xap, 12)
    } else {
        shr(left, 4)
    }
}

fn x_down_y_up<T: Sample>(src: &Source<'_, T>, sx: usize, sy: usize, xentry: i64, yap: i64) -> Px {
    let top = shr(src.row_box(sx, sy, xentry), 10);
    if yap > 0 {
        let bottom = shr(src.row_box(sx, sy + 1, xentry), 10);
        blend(top, 256 - yap, bottom, yap, 12)
    } else {
        shr(top, 4)
    }
}

fn both_down<T: Sample>(
    src: &Source<'_, T>,
    sx: usize,
    sy: usize,
    xentry: i64,
    yentry: i64,
) -> Px {
    let mut acc = [0; CHANNELS];
    for (offset, weight) in BoxWeights::from_entry(yentry) {
        let row = shr(src.row_box(sx, sy + offset, xentry), 9);
        mul_add(&mut acc, row, weight);
    }
    shr(shr(acc, 14), 5)
}

#[inline(always)]
fn store<T: Sample>(out: &mut Vec<T>, px: Px, has_alpha: bool) {
    for (c, &v) in px.iter().enumerate() {
        if c == ALPHA && !has_alpha {
            out.push(T::OPAQUE);
        } else {
            out.push(T::narrow(v));
        }
    }
}

/// Area-sample destination columns `cols` and rows `rows` (absolute table
/// indices), appending `cols.len() × rows.len()` packed pixels to `out`.
///
/// `out` should already have room for them.
pub fn render_smooth<T: Sample>(
    src: &Source<'_, T>,
    tables: &ScaleMappingTables,
    cols: Range<u64>,
    rows: Range<u64>,
    has_alpha: bool,
    out: &mut Vec<T>,
) {
    let regime = tables.regime();
    debug!(?regime, has_alpha, "area sampling");

    for y in rows {
        let (sy, yw) = tables.y.at(y);
        for x in cols.clone() {
            let (sx, xw) = tables.x.at(x);
            let px = match regime {
                ScaleRegime::BothUp => both_up(src, sx, sy, xw, yw),
                ScaleRegime::XUpYDown => x_up_y_down(src, sx, sy, xw, yw),
                ScaleRegime::XDownYUp => x_down_y_up(src, sx, sy, xw, yw),
                ScaleRegime::BothDown => both_down(src, sx, sy, xw, yw),
            };
            store(out, px, has_alpha);
        }
    }
}

/// Copy the source pixel each destination pixel maps to.
pub fn render_nearest<T: Sample>(
    src: &Source<'_, T>,
    tables: &ScaleMappingTables,
    cols: Range<u64>,
    rows: Range<u64>,
    out: &mut Vec<T>,
) {
    for y in rows {
        let (sy, _) = tables.y.at(y);
        for x in cols.clone() {
            let (sx, _) = tables.x.at(x);
            let i = (sy.min(src.height - 1) * src.width + sx.min(src.width - 1)) * CHANNELS;
            out.extend_from_slice(&src.samples[i..i + CHANNELS]);
        }
    }
}
