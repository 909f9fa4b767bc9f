//! Shared test utilities for the rasterbuf test suite.
//!
//! Image builders with predictable content, whole-image assertions and small
//! on-disk fixtures.
//!
//! # Usage
//!
//! ```rust
//! use crate::test_helpers::*;
//!
//! let image = solid_image(4, 4, ColorDepth::Eight, false, RGB_A);
//! let half = scale::smooth_scale(&image, 2, 2, AspectRatioMode::Ignore);
//! assert_uniform(&half, RGB_A);
//! ```

use std::path::{Path, PathBuf};

use crate::image::{Color, ColorDepth, SharedImage};

pub type Rgb = (u16, u16, u16);

/// The (10, 20, 30) colour used throughout the tests.
pub const RGB_A: Rgb = (10, 20, 30);

// =========================================================================
// Image builders
// =========================================================================

/// An image filled with one opaque colour.
pub fn solid_image(
    width: u32,
    height: u32,
    depth: ColorDepth,
    alpha: bool,
    rgb: Rgb,
) -> SharedImage {
    let mut image = SharedImage::new(width, height, depth, alpha).unwrap();
    image.fill(Color::opaque(rgb.0, rgb.1, rgb.2, depth));
    image
}

/// An image where every pixel differs from its neighbours.
///
/// Values fit the 8-bit range for images up to 16 pixels on a side and are
/// multiplied by 257 at 16 bits. With `alpha`, the alpha channel varies too.
pub fn gradient_image(width: u32, height: u32, depth: ColorDepth, alpha: bool) -> SharedImage {
    let mut image = SharedImage::new(width, height, depth, alpha).unwrap();
    let scale = match depth {
        ColorDepth::Eight => 1,
        ColorDepth::Sixteen => 257,
    };
    for y in 0..height {
        for x in 0..width {
            let red = (x * 16 + y) as u16 % 256;
            let green = (y * 16 + x) as u16 % 256;
            let blue = (x * 7 + y * 3) as u16 % 256;
            let a = if alpha {
                (255 - x * 4 - y) as u16 % 256
            } else {
                255
            };
            image.set_pixel_color(
                x,
                y,
                Color::new(red * scale, green * scale, blue * scale, a * scale),
            );
        }
    }
    image
}

/// All pixels, row-major.
pub fn pixels(image: &SharedImage) -> Vec<Color> {
    let mut out = Vec::with_capacity(image.num_pixels());
    for y in 0..image.height() {
        for x in 0..image.width() {
            out.push(image.pixel_color(x, y).unwrap());
        }
    }
    out
}

// =========================================================================
// Assertions
// =========================================================================

/// Every pixel has colour `rgb` and, without alpha, full opacity.
pub fn assert_uniform(image: &SharedImage, rgb: Rgb) {
    assert!(!image.is_null(), "expected pixels, got a null image");
    let opaque = image.depth().max_value();
    for (i, px) in pixels(image).into_iter().enumerate() {
        assert_eq!(
            (px.red, px.green, px.blue),
            rgb,
            "pixel {i} of {}x{} differs",
            image.width(),
            image.height()
        );
        if !image.has_alpha() {
            assert_eq!(px.alpha, opaque, "pixel {i} is not opaque");
        }
    }
}

/// Same geometry, depth and pixels.
pub fn assert_same_pixels(a: &SharedImage, b: &SharedImage) {
    assert_eq!(a.size(), b.size(), "sizes differ");
    assert_eq!(a.depth(), b.depth(), "depths differ");
    assert_eq!(a.has_alpha(), b.has_alpha(), "alpha flags differ");
    assert!(a.bits() == b.bits(), "pixel data differs");
}

// =========================================================================
// Files
// =========================================================================

pub fn write_test_file(dir: &Path, name: &str, bytes: &[u8]) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, bytes).unwrap();
    path
}

/// Encode a small RGB PNG with a gradient pattern.
pub fn create_test_png(path: &Path, width: u32, height: u32) {
    let img = ::image::RgbImage::from_fn(width, height, |x, y| {
        ::image::Rgb([(x % 256) as u8, (y % 256) as u8, 128])
    });
    img.save(path).unwrap();
}
