//! Packed pixel storage.
//!
//! A [`PixelBuffer`] is `width × height` pixels, four channels each, stored
//! row-major with no padding between scanlines. Channel order inside a pixel
//! is always blue, green, red, alpha, at either 8 or 16 bits per channel:
//!
//! ```text
//! 8-bit:   B G R A | B G R A | ...          4 bytes per pixel
//! 16-bit:  BB GG RR AA | BB GG RR AA | ...  8 bytes per pixel (native endian)
//! ```
//!
//! Samples are held as typed vectors (`Vec<u8>` or `Vec<u16>`) so the hot
//! loops index typed slices; the byte view required by codecs is a zero-copy
//! cast via `bytemuck`.
//!
//! A buffer with a zero dimension is the *null image*: it owns no samples.
//! Every other buffer holds exactly `width * height * 4` samples. The sizes
//! are computed with checked arithmetic so that absurd dimensions are
//! rejected before anything is allocated, and the allocation itself is
//! fallible: a request the allocator refuses is an error, not an abort.

use bytemuck::Pod;
use thiserror::Error;
use tracing::warn;

/// Channels per pixel, fixed for every depth.
pub const CHANNELS: usize = 4;

/// Index of each channel inside a pixel.
pub const BLUE: usize = 0;
pub const GREEN: usize = 1;
pub const RED: usize = 2;
pub const ALPHA: usize = 3;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BufferError {
    #[error("{width}x{height} pixels at {depth:?} overflows the addressable size")]
    Overflow {
        width: u32,
        height: u32,
        depth: ColorDepth,
    },
    #[error("buffer holds {actual} bytes, expected {expected}")]
    SizeMismatch { expected: usize, actual: usize },
    #[error("could not allocate {bytes} bytes of pixel data")]
    Alloc { bytes: usize },
}

/// Bits per channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ColorDepth {
    #[default]
    Eight,
    Sixteen,
}

impl ColorDepth {
    pub fn from_sixteen_bit(sixteen_bit: bool) -> Self {
        if sixteen_bit { Self::Sixteen } else { Self::Eight }
    }

    pub fn bytes_per_sample(self) -> usize {
        match self {
            Self::Eight => 1,
            Self::Sixteen => 2,
        }
    }

    pub fn bytes_per_pixel(self) -> usize {
        CHANNELS * self.bytes_per_sample()
    }

    pub fn max_value(self) -> u16 {
        match self {
            Self::Eight => u8::MAX as u16,
            Self::Sixteen => u16::MAX,
        }
    }
}

/// Channel sample type. Implemented for `u8` and `u16` only.
///
/// `narrow` truncates like a C store into a narrower integer; callers keep
/// their arithmetic inside the sample range.
pub trait Sample: Pod + Default + Send + Sync {
    const OPAQUE: Self;

    fn widen(self) -> i64;

    fn narrow(value: i64) -> Self;
}

impl Sample for u8 {
    const OPAQUE: Self = u8::MAX;

    #[inline(always)]
    fn widen(self) -> i64 {
        self as i64
    }

    #[inline(always)]
    fn narrow(value: i64) -> Self {
        value as u8
    }
}

impl Sample for u16 {
    const OPAQUE: Self = u16::MAX;

    #[inline(always)]
    fn widen(self) -> i64 {
        self as i64
    }

    #[inline(always)]
    fn narrow(value: i64) -> Self {
        value as u16
    }
}

/// Owned samples at one of the two supported depths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PixelData {
    Eight(Vec<u8>),
    Sixteen(Vec<u16>),
}

impl PixelData {
    pub fn depth(&self) -> ColorDepth {
        match self {
            Self::Eight(_) => ColorDepth::Eight,
            Self::Sixteen(_) => ColorDepth::Sixteen,
        }
    }

    /// Number of samples (not bytes).
    pub fn len(&self) -> usize {
        match self {
            Self::Eight(v) => v.len(),
            Self::Sixteen(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn zeroed(depth: ColorDepth, samples: usize) -> Result<Self, BufferError> {
        let alloc = || BufferError::Alloc {
            bytes: samples.saturating_mul(depth.bytes_per_sample()),
        };
        Ok(match depth {
            ColorDepth::Eight => Self::Eight(try_zeroed(samples).ok_or_else(alloc)?),
            ColorDepth::Sixteen => Self::Sixteen(try_zeroed(samples).ok_or_else(alloc)?),
        })
    }

    fn empty(depth: ColorDepth) -> Self {
        match depth {
            ColorDepth::Eight => Self::Eight(Vec::new()),
            ColorDepth::Sixteen => Self::Sixteen(Vec::new()),
        }
    }

    fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Eight(v) => v,
            Self::Sixteen(v) => bytemuck::cast_slice(v),
        }
    }

    fn as_bytes_mut(&mut self) -> &mut [u8] {
        match self {
            Self::Eight(v) => v,
            Self::Sixteen(v) => bytemuck::cast_slice_mut(v),
        }
    }
}

/// Largest allocation Rust will attempt, in bytes.
pub const MAX_ALLOC_BYTES: usize = isize::MAX as usize;

/// Number of samples for `width × height`, or `None` when the byte size
/// overflows or exceeds [`MAX_ALLOC_BYTES`].
pub fn checked_sample_count(width: u32, height: u32, depth: ColorDepth) -> Option<usize> {
    let pixels = (width as usize).checked_mul(height as usize)?;
    let samples = pixels.checked_mul(CHANNELS)?;
    let bytes = samples.checked_mul(depth.bytes_per_sample())?;
    (bytes <= MAX_ALLOC_BYTES).then_some(samples)
}

/// An empty vector with room for exactly `len` items, or `None` if the
/// allocator refuses.
pub(crate) fn try_with_capacity<T>(len: usize) -> Option<Vec<T>> {
    let mut v = Vec::new();
    v.try_reserve_exact(len).ok()?;
    Some(v)
}

/// `len` default-valued items, or `None` if the allocator refuses.
pub(crate) fn try_zeroed<T: Clone + Default>(len: usize) -> Option<Vec<T>> {
    let mut v = try_with_capacity(len)?;
    v.resize(len, T::default());
    Some(v)
}

/// Byte size for `width × height`, or `None` on overflow.
pub fn checked_byte_len(width: u32, height: u32, depth: ColorDepth) -> Option<usize> {
    checked_sample_count(width, height, depth)?.checked_mul(depth.bytes_per_sample())
}

/// A colour in the sample range of the image it belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Color {
    pub red: u16,
    pub green: u16,
    pub blue: u16,
    pub alpha: u16,
}

impl Color {
    pub const fn new(red: u16, green: u16, blue: u16, alpha: u16) -> Self {
        Self {
            red,
            green,
            blue,
            alpha,
        }
    }

    /// Fully opaque colour for the given depth.
    pub fn opaque(red: u16, green: u16, blue: u16, depth: ColorDepth) -> Self {
        Self::new(red, green, blue, depth.max_value())
    }

    fn to_channels(self) -> [u16; CHANNELS] {
        let mut px = [0u16; CHANNELS];
        px[BLUE] = self.blue;
        px[GREEN] = self.green;
        px[RED] = self.red;
        px[ALPHA] = self.alpha;
        px
    }

    fn from_channels(px: [u16; CHANNELS]) -> Self {
        Self::new(px[RED], px[GREEN], px[BLUE], px[ALPHA])
    }
}

/// Raw pixel storage with its geometry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelBuffer {
    width: u32,
    height: u32,
    has_alpha: bool,
    data: PixelData,
}

impl Default for PixelBuffer {
    fn default() -> Self {
        Self::null()
    }
}

impl PixelBuffer {
    /// The null image: no dimensions, no samples.
    pub fn null() -> Self {
        Self {
            width: 0,
            height: 0,
            has_alpha: false,
            data: PixelData::Eight(Vec::new()),
        }
    }

    /// A null buffer that still remembers depth and alpha flag.
    pub fn null_with(depth: ColorDepth, has_alpha: bool) -> Self {
        Self {
            width: 0,
            height: 0,
            has_alpha,
            data: PixelData::empty(depth),
        }
    }

    /// Allocate a zero-filled buffer.
    ///
    /// A zero dimension yields [`null_with`](Self::null_with).
    pub fn new(
        width: u32,
        height: u32,
        depth: ColorDepth,
        has_alpha: bool,
    ) -> Result<Self, BufferError> {
        if width == 0 || height == 0 {
            return Ok(Self::null_with(depth, has_alpha));
        }
        let samples = checked_sample_count(width, height, depth).ok_or_else(|| {
            warn!(width, height, ?depth, "pixel buffer size overflows");
            BufferError::Overflow {
                width,
                height,
                depth,
            }
        })?;
        let data = PixelData::zeroed(depth, samples).inspect_err(|e| {
            warn!(error = %e, "pixel buffer allocation failed");
        })?;
        Ok(Self {
            width,
            height,
            has_alpha,
            data,
        })
    }

    /// Wrap already-populated samples. The sample count must match exactly.
    pub fn from_data(
        width: u32,
        height: u32,
        has_alpha: bool,
        data: PixelData,
    ) -> Result<Self, BufferError> {
        let depth = data.depth();
        if width == 0 || height == 0 {
            if !data.is_empty() {
                return Err(BufferError::SizeMismatch {
                    expected: 0,
                    actual: data.len() * depth.bytes_per_sample(),
                });
            }
            return Ok(Self {
                width: 0,
                height: 0,
                has_alpha,
                data,
            });
        }
        let samples = checked_sample_count(width, height, depth).ok_or(BufferError::Overflow {
            width,
            height,
            depth,
        })?;
        if data.len() != samples {
            return Err(BufferError::SizeMismatch {
                expected: samples * depth.bytes_per_sample(),
                actual: data.len() * depth.bytes_per_sample(),
            });
        }
        Ok(Self {
            width,
            height,
            has_alpha,
            data,
        })
    }

    /// Build from the packed byte layout used by codecs.
    ///
    /// 8-bit data is taken over without copying when the bytes are owned;
    /// 16-bit data is always re-packed into `u16` samples because a byte
    /// allocation carries no 2-byte alignment guarantee.
    pub fn from_bytes(
        width: u32,
        height: u32,
        depth: ColorDepth,
        has_alpha: bool,
        bytes: std::borrow::Cow<'_, [u8]>,
    ) -> Result<Self, BufferError> {
        let expected = if width == 0 || height == 0 {
            0
        } else {
            checked_byte_len(width, height, depth).ok_or(BufferError::Overflow {
                width,
                height,
                depth,
            })?
        };
        if bytes.len() != expected {
            return Err(BufferError::SizeMismatch {
                expected,
                actual: bytes.len(),
            });
        }
        let data = match depth {
            ColorDepth::Eight => PixelData::Eight(bytes.into_owned()),
            ColorDepth::Sixteen => PixelData::Sixteen(
                bytes
                    .chunks_exact(2)
                    .map(|b| u16::from_ne_bytes([b[0], b[1]]))
                    .collect(),
            ),
        };
        Self::from_data(width, height, has_alpha, data)
    }

    pub fn is_null(&self) -> bool {
        self.width == 0 || self.height == 0 || self.data.is_empty()
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn depth(&self) -> ColorDepth {
        self.data.depth()
    }

    pub fn sixteen_bit(&self) -> bool {
        self.depth() == ColorDepth::Sixteen
    }

    pub fn has_alpha(&self) -> bool {
        self.has_alpha
    }

    pub fn set_has_alpha(&mut self, has_alpha: bool) {
        self.has_alpha = has_alpha;
    }

    pub fn bytes_per_pixel(&self) -> usize {
        self.depth().bytes_per_pixel()
    }

    /// Size of the packed byte view.
    pub fn byte_len(&self) -> usize {
        self.data.len() * self.depth().bytes_per_sample()
    }

    pub fn num_pixels(&self) -> usize {
        self.data.len() / CHANNELS
    }

    pub fn data(&self) -> &PixelData {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut PixelData {
        &mut self.data
    }

    /// Packed bytes, B/G/R/A per pixel.
    pub fn bits(&self) -> &[u8] {
        self.data.as_bytes()
    }

    pub fn bits_mut(&mut self) -> &mut [u8] {
        self.data.as_bytes_mut()
    }

    pub fn samples8(&self) -> Option<&[u8]> {
        match &self.data {
            PixelData::Eight(v) => Some(v),
            PixelData::Sixteen(_) => None,
        }
    }

    pub fn samples16(&self) -> Option<&[u16]> {
        match &self.data {
            PixelData::Sixteen(v) => Some(v),
            PixelData::Eight(_) => None,
        }
    }

    /// Take the samples out, leaving a null buffer behind.
    pub fn take_data(&mut self) -> PixelData {
        let depth = self.depth();
        self.width = 0;
        self.height = 0;
        std::mem::replace(&mut self.data, PixelData::empty(depth))
    }

    /// Collapse to the null state, keeping depth and alpha flag.
    pub fn clear(&mut self) {
        self.take_data();
    }

    fn pixel_index(&self, x: u32, y: u32) -> Option<usize> {
        if x >= self.width || y >= self.height {
            return None;
        }
        Some((y as usize * self.width as usize + x as usize) * CHANNELS)
    }

    pub fn pixel_color(&self, x: u32, y: u32) -> Option<Color> {
        let i = self.pixel_index(x, y)?;
        let px = match &self.data {
            PixelData::Eight(v) => {
                let p = &v[i..i + CHANNELS];
                [p[0] as u16, p[1] as u16, p[2] as u16, p[3] as u16]
            }
            PixelData::Sixteen(v) => {
                let p = &v[i..i + CHANNELS];
                [p[0], p[1], p[2], p[3]]
            }
        };
        Some(Color::from_channels(px))
    }

    /// Write one pixel. Values above the 8-bit range are truncated on
    /// 8-bit buffers. Returns `false` when `(x, y)` is outside the image.
    pub fn set_pixel_color(&mut self, x: u32, y: u32, color: Color) -> bool {
        let Some(i) = self.pixel_index(x, y) else {
            return false;
        };
        let px = color.to_channels();
        match &mut self.data {
            PixelData::Eight(v) => {
                for (dst, src) in v[i..i + CHANNELS].iter_mut().zip(px) {
                    *dst = src as u8;
                }
            }
            PixelData::Sixteen(v) => v[i..i + CHANNELS].copy_from_slice(&px),
        }
        true
    }

    /// Set every pixel to `color`.
    pub fn fill(&mut self, color: Color) {
        let px = color.to_channels();
        match &mut self.data {
            PixelData::Eight(v) => {
                let px = px.map(|c| c as u8);
                for chunk in v.chunks_exact_mut(CHANNELS) {
                    chunk.copy_from_slice(&px);
                }
            }
            PixelData::Sixteen(v) => {
                for chunk in v.chunks_exact_mut(CHANNELS) {
                    chunk.copy_from_slice(&px);
                }
            }
        }
    }

    /// Copy a rectangle that lies fully inside this buffer into a new one.
    pub(crate) fn copy_rect(&self, x: u32, y: u32, w: u32, h: u32) -> Result<Self, BufferError> {
        debug_assert!(x + w <= self.width && y + h <= self.height);
        let mut out = Self::new(w, h, self.depth(), self.has_alpha)?;
        match (&self.data, &mut out.data) {
            (PixelData::Eight(src), PixelData::Eight(dst)) => {
                blit_rows(src, self.width, dst, x, y, w, h)
            }
            (PixelData::Sixteen(src), PixelData::Sixteen(dst)) => {
                blit_rows(src, self.width, dst, x, y, w, h)
            }
            _ => unreachable!("copy_rect allocates at the source depth"),
        }
        Ok(out)
    }
}

/// Copy `w × h` pixels starting at `(x, y)` of a `src_width`-wide source into
/// a tightly packed `w`-wide destination, one scanline slice at a time.
fn blit_rows<T: Copy>(src: &[T], src_width: u32, dst: &mut [T], x: u32, y: u32, w: u32, h: u32) {
    let src_stride = src_width as usize * CHANNELS;
    let row_len = w as usize * CHANNELS;
    for (row, dst_row) in dst.chunks_exact_mut(row_len).take(h as usize).enumerate() {
        let start = (y as usize + row) * src_stride + x as usize * CHANNELS;
        dst_row.copy_from_slice(&src[start..start + row_len]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::borrow::Cow;

    #[test]
    fn byte_len_matches_formula() {
        for &(w, h) in &[(1, 1), (3, 7), (640, 480), (17, 1)] {
            let eight = PixelBuffer::new(w, h, ColorDepth::Eight, false).unwrap();
            assert_eq!(eight.byte_len(), (w * h * 4) as usize);
            let sixteen = PixelBuffer::new(w, h, ColorDepth::Sixteen, true).unwrap();
            assert_eq!(sixteen.byte_len(), (w * h * 8) as usize);
            assert_eq!(sixteen.bits().len(), sixteen.byte_len());
        }
    }

    #[test]
    fn zero_dimension_is_null() {
        let buf = PixelBuffer::new(0, 10, ColorDepth::Sixteen, true).unwrap();
        assert!(buf.is_null());
        assert_eq!(buf.byte_len(), 0);
        assert!(buf.sixteen_bit());
        assert!(buf.has_alpha());
    }

    #[cfg(target_pointer_width = "32")]
    #[test]
    fn overflow_is_rejected() {
        let err = PixelBuffer::new(u32::MAX, u32::MAX, ColorDepth::Sixteen, false).unwrap_err();
        assert!(matches!(err, BufferError::Overflow { .. }));
    }

    #[test]
    fn checked_sizes_detect_overflow() {
        assert_eq!(checked_byte_len(2, 3, ColorDepth::Sixteen), Some(48));
        assert_eq!(checked_sample_count(2, 3, ColorDepth::Eight), Some(24));
        // u32::MAX² · 8 exceeds any 64-bit usize.
        assert_eq!(checked_byte_len(u32::MAX, u32::MAX, ColorDepth::Sixteen), None);
    }

    #[cfg(target_pointer_width = "64")]
    #[test]
    fn sizes_past_isize_max_are_rejected() {
        // 2^31 · 2^29 · 4 · 2 = 2^63 bytes: fits in usize, not in isize.
        assert_eq!(checked_sample_count(1 << 31, 1 << 29, ColorDepth::Sixteen), None);
        assert_eq!(checked_byte_len(1 << 31, 1 << 29, ColorDepth::Sixteen), None);
        assert!(checked_sample_count(1 << 31, 1 << 29, ColorDepth::Eight).is_some());

        let err = PixelBuffer::new(1 << 31, 1 << 29, ColorDepth::Sixteen, false).unwrap_err();
        assert!(matches!(err, BufferError::Overflow { .. }));
    }

    #[cfg(target_pointer_width = "64")]
    #[test]
    fn refused_allocation_is_an_error() {
        // 2^62 bytes passes the size check but no allocator can provide it.
        let err = PixelBuffer::new(1 << 31, 1 << 28, ColorDepth::Sixteen, true).unwrap_err();
        assert_eq!(err, BufferError::Alloc { bytes: 1 << 62 });
    }

    #[test]
    fn from_bytes_rejects_wrong_size() {
        let err = PixelBuffer::from_bytes(2, 2, ColorDepth::Eight, false, Cow::Owned(vec![0; 15]))
            .unwrap_err();
        assert_eq!(
            err,
            BufferError::SizeMismatch {
                expected: 16,
                actual: 15
            }
        );
    }

    #[test]
    fn from_bytes_sixteen_bit_is_native_endian() {
        let mut bytes = Vec::new();
        for v in [1u16, 2, 3, 0xFFFF] {
            bytes.extend_from_slice(&v.to_ne_bytes());
        }
        let buf = PixelBuffer::from_bytes(1, 1, ColorDepth::Sixteen, true, Cow::Borrowed(&bytes))
            .unwrap();
        assert_eq!(buf.samples16().unwrap(), &[1, 2, 3, 0xFFFF]);
        assert_eq!(buf.bits(), bytes.as_slice());
    }

    #[test]
    fn pixel_roundtrip_respects_channel_order() {
        let mut buf = PixelBuffer::new(2, 2, ColorDepth::Eight, true).unwrap();
        assert!(buf.set_pixel_color(1, 0, Color::new(10, 20, 30, 40)));
        // Stored as B, G, R, A.
        assert_eq!(&buf.bits()[4..8], &[30, 20, 10, 40]);
        assert_eq!(buf.pixel_color(1, 0), Some(Color::new(10, 20, 30, 40)));
        assert_eq!(buf.pixel_color(2, 0), None);
        assert!(!buf.set_pixel_color(0, 2, Color::default()));
    }

    #[test]
    fn copy_rect_extracts_scanline_slices() {
        let mut buf = PixelBuffer::new(3, 3, ColorDepth::Sixteen, false).unwrap();
        for y in 0..3 {
            for x in 0..3 {
                let v = (y * 3 + x) as u16;
                buf.set_pixel_color(x, y, Color::new(v, v, v, 0xFFFF));
            }
        }
        let sub = buf.copy_rect(1, 1, 2, 2).unwrap();
        assert_eq!(sub.width(), 2);
        assert_eq!(sub.pixel_color(0, 0).unwrap().red, 4);
        assert_eq!(sub.pixel_color(1, 1).unwrap().red, 8);
    }

    #[test]
    fn take_data_leaves_null() {
        let mut buf = PixelBuffer::new(2, 1, ColorDepth::Eight, false).unwrap();
        let data = buf.take_data();
        assert_eq!(data.len(), 8);
        assert!(buf.is_null());
    }
}
