//! Source coordinates and area weights for each destination column and row.
//!
//! Positions are 16.16 fixed point: destination index `i` maps to source
//! position `val = i * inc` with `inc = (src << 16) / dst`. Because the position is
//! an exact multiple of `inc`, any destination sub-range can be tabulated on
//! its own; sectioned and clipped scales only build the entries they render.
//!
//! The weight stored per entry depends on the axis direction:
//!
//! ```text
//! up-scaling:    fraction  = (val >> 8) & 0xff       8-bit blend weight
//!                           (0 at the last source sample)
//! down-scaling:  Cp        = ((dst << 14) / src) + 1  2.14 share of one source pixel
//!                ap        = ((0x100 - fraction) * Cp) >> 8
//!                entry     = ap | (Cp << 16)
//! ```
//!
//! Down-scaling boxes always sum to `1 << 14`: the first source pixel weighs
//! `ap`, following pixels `Cp` each, the last one whatever remains.

use crate::image::buffer::try_with_capacity;
use std::ops::Range;
use tracing::trace;

/// Total weight of one down-scaling box.
pub const BOX_UNIT: i64 = 1 << 14;

/// Per-axis lookup: where to read and how much each read weighs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AxisTable {
    /// First destination index covered by `points` and `weights`.
    pub offset: u64,
    pub points: Vec<usize>,
    pub weights: Vec<i64>,
    pub up_scale: bool,
}

impl AxisTable {
    /// Tabulate destination indices `range` of a `src → dst` mapping.
    ///
    /// `smooth == false` leaves all weights at zero, which turns every
    /// kernel into plain sampling. `None` when the allocator refuses the
    /// table.
    pub fn new(
        src: u32,
        dst: u64,
        up_scale: bool,
        range: Range<u64>,
        smooth: bool,
    ) -> Option<Self> {
        debug_assert!(src > 0 && dst > 0);
        let src64 = src as u64;
        let inc = (src64 << 16) / dst;
        let len = usize::try_from(range.end - range.start).ok()?;
        let mut points = try_with_capacity(len)?;
        let mut weights = try_with_capacity(len)?;
        // Only down-scaling needs Cp, and there dst < src keeps the shift in range.
        let cp = if up_scale {
            0
        } else {
            ((dst << 14) / src64) as i64 + 1
        };

        for i in range.clone() {
            let val = i * inc;
            let pos = val >> 16;
            points.push(pos as usize);
            if !smooth {
                weights.push(0);
                continue;
            }
            let fraction = ((val >> 8) & 0xff) as i64;
            let weight = if up_scale {
                if pos >= src64 - 1 { 0 } else { fraction }
            } else {
                let ap = ((0x100 - fraction) * cp) >> 8;
                ap | (cp << 16)
            };
            weights.push(weight);
        }

        Some(Self {
            offset: range.start,
            points,
            weights,
            up_scale,
        })
    }

    /// Source index and weight for destination index `i` (absolute).
    #[inline(always)]
    pub fn at(&self, i: u64) -> (usize, i64) {
        let k = (i - self.offset) as usize;
        (self.points[k], self.weights[k])
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// Both axes of one scale call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScaleMappingTables {
    pub x: AxisTable,
    pub y: AxisTable,
}

/// Which way each axis goes, the four-way split the kernels dispatch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScaleRegime {
    BothUp,
    /// Wider but shorter: blend across x, box across y.
    XUpYDown,
    /// Narrower but taller: box across x, blend across y.
    XDownYUp,
    BothDown,
}

impl ScaleMappingTables {
    /// Tables for rendering destination columns `cols` and rows `rows` of an
    /// image whose full extent `(src_w, src_h)` scales to `(scaled_w, scaled_h)`.
    ///
    /// `x_up`/`y_up` compare the *section* being scaled with its destination
    /// size; they can differ from `scaled_w >= src_w` only through rounding.
    /// `None` when either table cannot be allocated.
    pub fn new(
        (src_w, src_h): (u32, u32),
        (scaled_w, scaled_h): (u64, u64),
        (x_up, y_up): (bool, bool),
        cols: Range<u64>,
        rows: Range<u64>,
        smooth: bool,
    ) -> Option<Self> {
        let tables = Self {
            x: AxisTable::new(src_w, scaled_w, x_up, cols, smooth)?,
            y: AxisTable::new(src_h, scaled_h, y_up, rows, smooth)?,
        };
        trace!(
            columns = tables.x.len(),
            rows = tables.y.len(),
            x_up,
            y_up,
            "built scale tables"
        );
        Some(tables)
    }

    pub fn regime(&self) -> ScaleRegime {
        match (self.x.up_scale, self.y.up_scale) {
            (true, true) => ScaleRegime::BothUp,
            (true, false) => ScaleRegime::XUpYDown,
            (false, true) => ScaleRegime::XDownYUp,
            (false, false) => ScaleRegime::BothDown,
        }
    }
}

/// Weights of one down-scaling box: `(offset from first pixel, weight)`.
///
/// Yields `ap`, then `Cp` while more than `Cp` of the unit remains, then the
/// remainder. The weights always add up to [`BOX_UNIT`].
#[derive(Debug, Clone)]
pub struct BoxWeights {
    next: usize,
    remaining: i64,
    step: i64,
    first: Option<i64>,
}

impl BoxWeights {
    /// Split a packed `ap | (Cp << 16)` table entry.
    pub fn from_entry(entry: i64) -> Self {
        let ap = entry & 0xffff;
        let step = entry >> 16;
        Self {
            next: 0,
            remaining: BOX_UNIT - ap,
            step,
            first: Some(ap),
        }
    }
}

impl Iterator for BoxWeights {
    type Item = (usize, i64);

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(ap) = self.first.take() {
            return Some((0, ap));
        }
        if self.remaining <= 0 {
            return None;
        }
        self.next += 1;
        let weight = if self.step > 0 && self.remaining > self.step {
            self.step
        } else {
            self.remaining
        };
        self.remaining -= weight;
        Some((self.next, weight))
    }
}
