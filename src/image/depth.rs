//! Conversion between 8 and 16 bits per channel.
//!
//! Widening multiplies by 256 and fills the new low byte of the colour
//! channels with dither noise so that smooth gradients do not band after
//! later 16-bit processing. Alpha is widened without noise. Narrowing keeps
//! the high byte.
//!
//! The noise comes from a seeded [`DitherRng`], so a given seed always gives
//! the same 16-bit image.

use super::buffer::{ALPHA, CHANNELS, ColorDepth, PixelBuffer, PixelData, try_with_capacity};
use super::shared::SharedImage;
use tracing::{debug, warn};

/// Seed used when the caller does not supply one.
pub const DEFAULT_DITHER_SEED: u64 = 0x2545_F491_4F6C_DD1D;

/// xorshift64 generator for dither noise.
#[derive(Debug, Clone)]
pub struct DitherRng {
    state: u64,
}

impl Default for DitherRng {
    fn default() -> Self {
        Self::new(DEFAULT_DITHER_SEED)
    }
}

impl DitherRng {
    /// A zero seed would lock xorshift at zero, so it is replaced by the default.
    pub fn new(seed: u64) -> Self {
        Self {
            state: if seed == 0 { DEFAULT_DITHER_SEED } else { seed },
        }
    }

    fn next_u64(&mut self) -> u64 {
        self.state ^= self.state << 13;
        self.state ^= self.state >> 7;
        self.state ^= self.state << 17;
        self.state
    }

    /// Next dither term in `0..=255`.
    pub fn next_dither(&mut self) -> u16 {
        (self.next_u64() >> 56) as u16
    }
}

/// Widen 8-bit samples, adding noise to blue, green and red.
///
/// `None` when the allocator refuses the wider buffer.
pub fn widen_samples(src: &[u8], rng: &mut DitherRng) -> Option<Vec<u16>> {
    let mut out = try_with_capacity(src.len())?;
    for px in src.chunks_exact(CHANNELS) {
        for (channel, &s) in px.iter().enumerate() {
            let base = s as u16 * 256;
            if channel == ALPHA {
                out.push(base);
            } else {
                out.push(base + rng.next_dither());
            }
        }
    }
    Some(out)
}

/// Narrow 16-bit samples to their high byte.
pub fn narrow_samples(src: &[u16]) -> Vec<u8> {
    src.iter().map(|&s| (s >> 8) as u8).collect()
}

impl SharedImage {
    /// Widen to 16 bits with the default dither seed.
    pub fn to_sixteen_bit(&mut self) {
        self.to_sixteen_bit_with(&mut DitherRng::default());
    }

    /// Widen to 16 bits drawing dither noise from `rng`.
    ///
    /// No-op when already 16-bit or null.
    pub fn to_sixteen_bit_with(&mut self, rng: &mut DitherRng) {
        let Some(src) = self.samples8() else {
            return;
        };
        if self.is_null() {
            return;
        }
        match widen_samples(src, rng) {
            Some(widened) => self.install_converted(PixelData::Sixteen(widened)),
            None => warn!(
                width = self.width(),
                height = self.height(),
                "could not allocate 16-bit samples"
            ),
        }
    }

    /// Narrow to 8 bits. No-op when already 8-bit or null.
    pub fn to_eight_bit(&mut self) {
        let Some(src) = self.samples16() else {
            return;
        };
        if self.is_null() {
            return;
        }
        let narrowed = PixelData::Eight(narrow_samples(src));
        self.install_converted(narrowed);
    }

    /// Convert to `depth`, widening with noise from `rng`.
    pub fn convert_depth(&mut self, depth: ColorDepth, rng: &mut DitherRng) {
        match depth {
            ColorDepth::Eight => self.to_eight_bit(),
            ColorDepth::Sixteen => self.to_sixteen_bit_with(rng),
        }
    }

    fn install_converted(&mut self, data: PixelData) {
        let target = data.depth();
        match PixelBuffer::from_data(self.width(), self.height(), self.has_alpha(), data) {
            Ok(buffer) => {
                debug!(
                    width = self.width(),
                    height = self.height(),
                    depth = ?target,
                    "converted depth"
                );
                self.replace_buffer(buffer);
            }
            Err(e) => warn!(error = %e, "depth conversion produced a mismatched buffer"),
        }
    }
}
