//! Crop, rotation and mirroring.
//!
//! Rotations by 90° and 270° and crops build a new buffer; 180° rotation and
//! both flips permute pixels in place. All operations leave a null image
//! untouched.
//!
//! Pixels are moved as whole `[T; 4]` units, cast from the flat sample
//! vectors with `bytemuck`, so one generic routine serves both depths.

use super::attributes::{self, AttributeValue};
use super::buffer::{CHANNELS, PixelBuffer, PixelData, Sample, try_zeroed};
use super::shared::{SharedImage, clip_rect};
use crate::scale::{self, AspectRatioMode};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rotation {
    /// Quarter turn clockwise.
    Rot90,
    Rot180,
    /// Quarter turn counter-clockwise.
    Rot270,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flip {
    /// Mirror left to right.
    Horizontal,
    /// Mirror top to bottom.
    Vertical,
}

/// Exif orientation tag values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u16)]
pub enum Orientation {
    #[default]
    Unspecified = 0,
    Normal = 1,
    HFlip = 2,
    Rot180 = 3,
    VFlip = 4,
    Rot90HFlip = 5,
    Rot90 = 6,
    Rot90VFlip = 7,
    Rot270 = 8,
}

impl Orientation {
    pub fn from_exif(value: u16) -> Option<Self> {
        Some(match value {
            0 => Self::Unspecified,
            1 => Self::Normal,
            2 => Self::HFlip,
            3 => Self::Rot180,
            4 => Self::VFlip,
            5 => Self::Rot90HFlip,
            6 => Self::Rot90,
            7 => Self::Rot90VFlip,
            8 => Self::Rot270,
            _ => return None,
        })
    }
}

/// Lossless transformation as requested by a user or a metadata writer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransformAction {
    NoTransformation,
    FlipHorizontal,
    FlipVertical,
    Rotate90,
    Rotate180,
    Rotate270,
}

impl SharedImage {
    /// Keep only the part of `(x, y, w, h)` inside the image.
    ///
    /// A rectangle that misses the image, or has no area, leaves a null image
    /// with the same depth, alpha flag and side-table.
    pub fn crop(&mut self, x: i64, y: i64, w: i64, h: i64) {
        if self.is_null() {
            return;
        }
        let Some((cx, cy, cw, ch)) = clip_rect(self.width(), self.height(), x, y, w, h) else {
            debug!(x, y, w, h, "crop misses the image");
            self.replace_buffer(PixelBuffer::null_with(self.depth(), self.has_alpha()));
            return;
        };
        let copied = self.buffer().copy_rect(cx, cy, cw, ch);
        match copied {
            Ok(buffer) => self.replace_buffer(buffer),
            Err(e) => {
                warn!(error = %e, "crop allocation failed");
                self.replace_buffer(PixelBuffer::null_with(self.depth(), self.has_alpha()));
            }
        }
    }

    pub fn rotate(&mut self, rotation: Rotation) {
        if self.is_null() {
            return;
        }
        match rotation {
            Rotation::Rot180 => match self.buffer_mut().data_mut() {
                PixelData::Eight(v) => bytemuck::cast_slice_mut::<u8, [u8; 4]>(v).reverse(),
                PixelData::Sixteen(v) => bytemuck::cast_slice_mut::<u16, [u16; 4]>(v).reverse(),
            },
            Rotation::Rot90 | Rotation::Rot270 => {
                let clockwise = rotation == Rotation::Rot90;
                let (w, h) = self.size();
                let data = match self.buffer().data() {
                    PixelData::Eight(v) => transpose(v, w, h, clockwise).map(PixelData::Eight),
                    PixelData::Sixteen(v) => transpose(v, w, h, clockwise).map(PixelData::Sixteen),
                };
                let Some(data) = data else {
                    warn!(w, h, "could not allocate the rotated image");
                    return;
                };
                match PixelBuffer::from_data(h, w, self.has_alpha(), data) {
                    Ok(buffer) => self.replace_buffer(buffer),
                    Err(e) => debug!(error = %e, "rotation produced a mismatched buffer"),
                }
                self.swap_original_size();
            }
        }
    }

    pub fn flip(&mut self, direction: Flip) {
        if self.is_null() {
            return;
        }
        let width = self.width() as usize;
        match (direction, self.buffer_mut().data_mut()) {
            (Flip::Horizontal, PixelData::Eight(v)) => {
                mirror_rows(bytemuck::cast_slice_mut::<u8, [u8; 4]>(v), width)
            }
            (Flip::Horizontal, PixelData::Sixteen(v)) => {
                mirror_rows(bytemuck::cast_slice_mut::<u16, [u16; 4]>(v), width)
            }
            (Flip::Vertical, PixelData::Eight(v)) => {
                swap_rows(bytemuck::cast_slice_mut::<u8, [u8; 4]>(v), width)
            }
            (Flip::Vertical, PixelData::Sixteen(v)) => {
                swap_rows(bytemuck::cast_slice_mut::<u16, [u16; 4]>(v), width)
            }
        }
    }

    /// Bring an image stored with `orientation` upright.
    ///
    /// Returns whether any pixels moved.
    pub fn rotate_and_flip(&mut self, orientation: Orientation) -> bool {
        match orientation {
            Orientation::Normal | Orientation::Unspecified => return false,
            Orientation::HFlip => self.flip(Flip::Horizontal),
            Orientation::Rot180 => self.rotate(Rotation::Rot180),
            Orientation::VFlip => self.flip(Flip::Vertical),
            Orientation::Rot90HFlip => {
                self.rotate(Rotation::Rot90);
                self.flip(Flip::Horizontal);
            }
            Orientation::Rot90 => self.rotate(Rotation::Rot90),
            Orientation::Rot90VFlip => {
                self.rotate(Rotation::Rot90);
                self.flip(Flip::Vertical);
            }
            Orientation::Rot270 => self.rotate(Rotation::Rot270),
        }
        true
    }

    /// Undo [`rotate_and_flip`](Self::rotate_and_flip) for the same orientation.
    pub fn reverse_rotate_and_flip(&mut self, orientation: Orientation) -> bool {
        match orientation {
            Orientation::Normal | Orientation::Unspecified => return false,
            Orientation::HFlip => self.flip(Flip::Horizontal),
            Orientation::Rot180 => self.rotate(Rotation::Rot180),
            Orientation::VFlip => self.flip(Flip::Vertical),
            Orientation::Rot90HFlip => {
                self.flip(Flip::Horizontal);
                self.rotate(Rotation::Rot270);
            }
            Orientation::Rot90 => self.rotate(Rotation::Rot270),
            Orientation::Rot90VFlip => {
                self.flip(Flip::Vertical);
                self.rotate(Rotation::Rot270);
            }
            Orientation::Rot270 => self.rotate(Rotation::Rot90),
        }
        true
    }

    pub fn transform(&mut self, action: TransformAction) -> bool {
        match action {
            TransformAction::NoTransformation => return false,
            TransformAction::FlipHorizontal => self.flip(Flip::Horizontal),
            TransformAction::FlipVertical => self.flip(Flip::Vertical),
            TransformAction::Rotate90 => self.rotate(Rotation::Rot90),
            TransformAction::Rotate180 => self.rotate(Rotation::Rot180),
            TransformAction::Rotate270 => self.rotate(Rotation::Rot270),
        }
        true
    }

    pub fn was_exif_rotated(&self) -> bool {
        self.attribute(attributes::EXIF_ROTATED)
            .and_then(AttributeValue::as_bool)
            .unwrap_or(false)
    }

    /// Apply `orientation` once; later calls return `false`.
    pub fn exif_rotate(&mut self, orientation: Orientation) -> bool {
        if self.was_exif_rotated() {
            return false;
        }
        self.set_attribute(attributes::EXIF_ROTATED, true);
        self.rotate_and_flip(orientation)
    }

    /// Resample in place to `w × h`. Non-positive sizes are ignored.
    pub fn resize(&mut self, w: i64, h: i64) {
        if self.is_null() || w <= 0 || h <= 0 {
            return;
        }
        let scaled = scale::smooth_scale(self, w, h, AspectRatioMode::Ignore);
        self.replace_buffer(scaled.into_buffer());
    }

    fn swap_original_size(&mut self) {
        if let Some((width, height)) = self
            .attribute(attributes::ORIGINAL_SIZE)
            .and_then(AttributeValue::as_size)
        {
            self.set_attribute(
                attributes::ORIGINAL_SIZE,
                AttributeValue::Size {
                    width: height,
                    height: width,
                },
            );
        }
    }
}

/// Rotate a `w × h` grid of packed samples by a quarter turn, writing
/// straight into the flat output. `None` when it cannot be allocated.
fn transpose<T: Sample>(src: &[T], w: u32, h: u32, clockwise: bool) -> Option<Vec<T>> {
    let (w, h) = (w as usize, h as usize);
    let mut out = try_zeroed::<T>(src.len())?;
    let src_px = bytemuck::cast_slice::<T, [T; CHANNELS]>(src);
    let dst_px = bytemuck::cast_slice_mut::<T, [T; CHANNELS]>(&mut out);
    // The rotated image is h wide and w tall.
    for (y, row) in src_px.chunks_exact(w).enumerate() {
        for (x, &px) in row.iter().enumerate() {
            let (dx, dy) = if clockwise {
                (h - 1 - y, x)
            } else {
                (y, w - 1 - x)
            };
            dst_px[dy * h + dx] = px;
        }
    }
    Some(out)
}

fn mirror_rows<P>(pixels: &mut [P], width: usize) {
    for row in pixels.chunks_exact_mut(width) {
        row.reverse();
    }
}

fn swap_rows<P>(pixels: &mut [P], width: usize) {
    let rows = pixels.len() / width;
    for top in 0..rows / 2 {
        let bottom = rows - 1 - top;
        let (upper, lower) = pixels.split_at_mut(bottom * width);
        upper[top * width..(top + 1) * width].swap_with_slice(&mut lower[..width]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::{Color, ColorDepth};
    use crate::test_helpers::*;

    fn red_at(image: &SharedImage, x: u32, y: u32) -> u16 {
        image.pixel_color(x, y).unwrap().red
    }

    #[test]
    fn crop_clips_to_bounds() {
        let mut image = solid_image(10, 10, ColorDepth::Eight, false, RGB_A);
        image.crop(8, 8, 5, 5);
        assert_eq!(image.size(), (2, 2));
        assert_uniform(&image, RGB_A);
    }

    #[test]
    fn crop_outside_gives_null_with_depth() {
        let mut image = solid_image(4, 4, ColorDepth::Sixteen, true, RGB_A);
        image.set_attribute(attributes::DETECTED_FILE_FORMAT, "PNG");
        image.crop(10, 10, 2, 2);
        assert!(image.is_null());
        assert!(image.sixteen_bit());
        assert!(image.has_attribute(attributes::DETECTED_FILE_FORMAT));

        let mut other = solid_image(4, 4, ColorDepth::Eight, false, RGB_A);
        other.crop(0, 0, 0, 3);
        assert!(other.is_null());
    }

    #[test]
    fn crop_keeps_content() {
        let source = gradient_image(6, 5, ColorDepth::Sixteen, true);
        let mut image = source.copy();
        image.crop(1, 2, 3, 2);
        assert_eq!(image.size(), (3, 2));
        for y in 0..2 {
            for x in 0..3 {
                assert_eq!(image.pixel_color(x, y), source.pixel_color(x + 1, y + 2));
            }
        }
    }

    #[test]
    fn rot90_is_clockwise() {
        let source = gradient_image(3, 2, ColorDepth::Eight, false);
        let mut image = source.copy();
        image.rotate(Rotation::Rot90);
        assert_eq!(image.size(), (2, 3));
        // Bottom-left of the source becomes top-left.
        assert_eq!(red_at(&image, 0, 0), red_at(&source, 0, 1));
        // Top-left of the source becomes top-right.
        assert_eq!(red_at(&image, 1, 0), red_at(&source, 0, 0));
        assert_eq!(red_at(&image, 1, 2), red_at(&source, 2, 0));
    }

    #[test]
    fn quarter_turn_moves_whole_pixels() {
        for depth in [ColorDepth::Eight, ColorDepth::Sixteen] {
            let source = gradient_image(5, 3, depth, true);
            let mut cw = source.copy();
            cw.rotate(Rotation::Rot90);
            let mut ccw = source.copy();
            ccw.rotate(Rotation::Rot270);
            assert_eq!(cw.size(), (3, 5));
            assert_eq!(cw.num_bytes(), source.num_bytes());
            for y in 0..5 {
                for x in 0..3 {
                    assert_eq!(cw.pixel_color(x, y), source.pixel_color(y, 2 - x));
                    assert_eq!(ccw.pixel_color(x, y), source.pixel_color(4 - y, x));
                }
            }
        }
    }

    #[test]
    fn rot270_is_counter_clockwise() {
        let source = gradient_image(3, 2, ColorDepth::Sixteen, true);
        let mut image = source.copy();
        image.rotate(Rotation::Rot270);
        assert_eq!(image.size(), (2, 3));
        // Top-right of the source becomes top-left.
        assert_eq!(image.pixel_color(0, 0), source.pixel_color(2, 0));
        assert_eq!(image.pixel_color(1, 2), source.pixel_color(0, 1));
    }

    #[test]
    fn four_quarter_turns_restore() {
        for depth in [ColorDepth::Eight, ColorDepth::Sixteen] {
            let source = gradient_image(5, 3, depth, true);
            let mut image = source.copy();
            for _ in 0..4 {
                image.rotate(Rotation::Rot90);
            }
            assert_same_pixels(&image, &source);
        }
    }

    #[test]
    fn rot180_equals_two_quarter_turns() {
        let source = gradient_image(4, 3, ColorDepth::Eight, false);
        let mut half = source.copy();
        half.rotate(Rotation::Rot180);
        let mut quarters = source.copy();
        quarters.rotate(Rotation::Rot90);
        quarters.rotate(Rotation::Rot90);
        assert_same_pixels(&half, &quarters);
    }

    #[test]
    fn quarter_turn_swaps_original_size() {
        let mut image = solid_image(4, 2, ColorDepth::Eight, false, RGB_A);
        image.set_attribute(
            attributes::ORIGINAL_SIZE,
            AttributeValue::Size {
                width: 400,
                height: 200,
            },
        );
        image.rotate(Rotation::Rot270);
        assert_eq!(
            image
                .attribute(attributes::ORIGINAL_SIZE)
                .and_then(AttributeValue::as_size),
            Some((200, 400))
        );
        image.rotate(Rotation::Rot180);
        assert_eq!(
            image
                .attribute(attributes::ORIGINAL_SIZE)
                .and_then(AttributeValue::as_size),
            Some((200, 400))
        );
    }

    #[test]
    fn double_flip_is_identity() {
        let source = gradient_image(5, 4, ColorDepth::Sixteen, false);
        for direction in [Flip::Horizontal, Flip::Vertical] {
            let mut image = source.copy();
            image.flip(direction);
            assert_ne!(image.bits(), source.bits());
            image.flip(direction);
            assert_same_pixels(&image, &source);
        }
    }

    #[test]
    fn flips_mirror_correct_axis() {
        let source = gradient_image(3, 3, ColorDepth::Eight, false);
        let mut h = source.copy();
        h.flip(Flip::Horizontal);
        assert_eq!(h.pixel_color(0, 1), source.pixel_color(2, 1));
        let mut v = source.copy();
        v.flip(Flip::Vertical);
        assert_eq!(v.pixel_color(1, 0), source.pixel_color(1, 2));
        assert_eq!(v.pixel_color(1, 1), source.pixel_color(1, 1));
    }

    #[test]
    fn reverse_undoes_every_orientation() {
        let source = gradient_image(4, 3, ColorDepth::Eight, true);
        for value in 0..=8 {
            let orientation = Orientation::from_exif(value).unwrap();
            let mut image = source.copy();
            let changed = image.rotate_and_flip(orientation);
            assert_eq!(changed, value >= 2, "orientation {value}");
            image.reverse_rotate_and_flip(orientation);
            assert_same_pixels(&image, &source);
        }
        assert_eq!(Orientation::from_exif(9), None);
    }

    #[test]
    fn transform_dispatches() {
        let source = gradient_image(4, 2, ColorDepth::Eight, false);
        let mut image = source.copy();
        assert!(!image.transform(TransformAction::NoTransformation));
        assert!(image.transform(TransformAction::Rotate90));
        assert_eq!(image.size(), (2, 4));
        assert!(image.transform(TransformAction::Rotate270));
        assert_same_pixels(&image, &source);
    }

    #[test]
    fn exif_rotate_applies_once() {
        let mut image = solid_image(4, 2, ColorDepth::Eight, false, RGB_A);
        assert!(image.exif_rotate(Orientation::Rot90));
        assert_eq!(image.size(), (2, 4));
        assert!(!image.exif_rotate(Orientation::Rot90));
        assert_eq!(image.size(), (2, 4));
        assert!(image.was_exif_rotated());
    }

    #[test]
    fn resize_in_place() {
        let mut image = solid_image(8, 6, ColorDepth::Sixteen, false, (1000, 2000, 3000));
        image.set_metadata(vec![7]);
        image.resize(4, 3);
        assert_eq!(image.size(), (4, 3));
        assert!(image.sixteen_bit());
        assert_eq!(image.metadata(), &[7]);
        assert_uniform(&image, (1000, 2000, 3000));

        image.resize(0, 3);
        assert_eq!(image.size(), (4, 3));
    }

    #[test]
    fn null_image_is_untouched() {
        let mut image = SharedImage::null();
        image.rotate(Rotation::Rot90);
        image.flip(Flip::Vertical);
        image.crop(0, 0, 1, 1);
        assert!(image.is_null());
    }

    #[test]
    fn set_pixel_after_rotate_is_addressable() {
        let mut image = solid_image(3, 1, ColorDepth::Eight, false, RGB_A);
        image.rotate(Rotation::Rot90);
        assert!(image.set_pixel_color(0, 2, Color::opaque(1, 1, 1, ColorDepth::Eight)));
        assert!(!image.set_pixel_color(1, 0, Color::default()));
    }
}
