//! Pure Rust format gateway on top of the `image` crate.
//!
//! ## Crate mapping
//!
//! | Operation | Crate / function |
//! |---|---|
//! | Identify | `image::image_dimensions` |
//! | Decode (JPEG, PNG, TIFF, WebP) | `ImageReader` + `ImageDecoder` (ICC and Exif read before pixels) |
//! | Encode → JPEG | `JpegEncoder::new_with_quality`, alpha dropped |
//! | Encode → PNG / TIFF | `PngEncoder` / `TiffEncoder`, 8 or 16 bit |
//! | Encode → WebP | `WebPEncoder::new_lossless`, 8 bit |
//! | Encode → AVIF | `AvifEncoder` (rav1e, speed 6), 8 bit |
//!
//! Decoded pixels are widened to RGBA (8 or 16 bit by source depth) and
//! swapped into the B/G/R/A order of [`PixelBuffer`].

use super::backend::{Dimensions, FormatGateway, GatewayError};
use super::params::{ImageFormat, Quality};
use crate::image::attributes::{
    DETECTED_FILE_FORMAT, IS_READ_ONLY, ORIGINAL_FILE_PATH, ORIGINAL_SIZE,
};
use crate::image::depth::narrow_samples;
use crate::image::{AttributeValue, PixelBuffer, PixelData, SharedImage};
use ::image::codecs::avif::AvifEncoder;
use ::image::codecs::jpeg::JpegEncoder;
use ::image::codecs::png::PngEncoder;
use ::image::codecs::tiff::TiffEncoder;
use ::image::codecs::webp::WebPEncoder;
use ::image::{DynamicImage, ImageBuffer, ImageDecoder, ImageReader, Rgba, RgbaImage};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::debug;

/// Pure Rust gateway using the `image` crate ecosystem.
///
/// See the [module docs](self) for the crate-to-operation mapping.
#[derive(Debug, Clone, Copy, Default)]
pub struct RustGateway {
    quality: Quality,
}

impl RustGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Gateway encoding lossy formats at `quality`.
    pub fn with_quality(quality: Quality) -> Self {
        Self { quality }
    }

    pub fn quality(&self) -> Quality {
        self.quality
    }
}

fn decode_error(path: &Path, e: impl std::fmt::Display) -> GatewayError {
    GatewayError::Decode {
        path: path.display().to_string(),
        reason: e.to_string(),
    }
}

/// Swap channels 0 and 2 of every pixel: RGBA ↔ BGRA.
fn swap_red_blue<T>(samples: &mut [T]) {
    for px in samples.chunks_exact_mut(4) {
        px.swap(0, 2);
    }
}

/// What a decode yields besides pixels.
struct Decoded {
    image: DynamicImage,
    format: Option<::image::ImageFormat>,
    icc_profile: Option<Vec<u8>>,
    exif: Option<Vec<u8>>,
}

fn decode(path: &Path) -> Result<Decoded, GatewayError> {
    let reader = ImageReader::open(path)?.with_guessed_format()?;
    let format = reader.format();
    let mut decoder = reader.into_decoder().map_err(|e| decode_error(path, e))?;
    // Missing or unreadable profiles are not fatal.
    let icc_profile = decoder.icc_profile().ok().flatten();
    let exif = decoder.exif_metadata().ok().flatten();
    let image = DynamicImage::from_decoder(decoder).map_err(|e| decode_error(path, e))?;
    Ok(Decoded {
        image,
        format,
        icc_profile,
        exif,
    })
}

/// Convert decoded pixels to a B/G/R/A buffer at the source's depth.
fn to_pixel_buffer(image: DynamicImage) -> Result<PixelBuffer, GatewayError> {
    let color = image.color();
    let has_alpha = color.has_alpha();
    let sixteen_bit = color.bytes_per_pixel() > color.channel_count();
    let (width, height) = (image.width(), image.height());

    let data = if sixteen_bit {
        let mut samples = image.into_rgba16().into_raw();
        swap_red_blue(&mut samples);
        PixelData::Sixteen(samples)
    } else {
        let mut samples = image.into_rgba8().into_raw();
        swap_red_blue(&mut samples);
        PixelData::Eight(samples)
    };
    PixelBuffer::from_data(width, height, has_alpha, data)
        .map_err(|e| GatewayError::ProcessingFailed(e.to_string()))
}

fn eight_bit_image(
    width: u32,
    height: u32,
    mut samples: Vec<u8>,
    keep_alpha: bool,
) -> Result<DynamicImage, GatewayError> {
    swap_red_blue(&mut samples);
    let rgba = RgbaImage::from_raw(width, height, samples)
        .ok_or_else(|| GatewayError::ProcessingFailed("pixel buffer size mismatch".into()))?;
    let image = DynamicImage::ImageRgba8(rgba);
    Ok(if keep_alpha {
        image
    } else {
        DynamicImage::ImageRgb8(image.to_rgb8())
    })
}

fn sixteen_bit_image(
    width: u32,
    height: u32,
    mut samples: Vec<u16>,
    keep_alpha: bool,
) -> Result<DynamicImage, GatewayError> {
    swap_red_blue(&mut samples);
    let rgba = ImageBuffer::<Rgba<u16>, Vec<u16>>::from_raw(width, height, samples)
        .ok_or_else(|| GatewayError::ProcessingFailed("pixel buffer size mismatch".into()))?;
    let image = DynamicImage::ImageRgba16(rgba);
    Ok(if keep_alpha {
        image
    } else {
        DynamicImage::ImageRgb16(image.to_rgb16())
    })
}

/// Pixels of `image` in a layout `format` can encode.
fn encodable(image: &SharedImage, format: ImageFormat) -> Result<DynamicImage, GatewayError> {
    let (width, height) = image.size();
    let keep_alpha = image.has_alpha() && format.supports_alpha();
    match image.buffer().data() {
        PixelData::Sixteen(samples) if format.supports_sixteen_bit() => {
            sixteen_bit_image(width, height, samples.clone(), keep_alpha)
        }
        PixelData::Sixteen(samples) => {
            debug!(%format, "narrowing 16-bit samples for encoding");
            eight_bit_image(width, height, narrow_samples(samples), keep_alpha)
        }
        PixelData::Eight(samples) => eight_bit_image(width, height, samples.clone(), keep_alpha),
    }
}

fn encode(
    image: &DynamicImage,
    path: &Path,
    format: ImageFormat,
    quality: Quality,
) -> Result<(), GatewayError> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    let q = quality.value() as u8;
    let result = match format {
        ImageFormat::Jpeg => {
            image.write_with_encoder(JpegEncoder::new_with_quality(&mut writer, q))
        }
        ImageFormat::Png => image.write_with_encoder(PngEncoder::new(&mut writer)),
        ImageFormat::Tiff => image.write_with_encoder(TiffEncoder::new(&mut writer)),
        ImageFormat::WebP => image.write_with_encoder(WebPEncoder::new_lossless(&mut writer)),
        // speed 6 for reasonable throughput
        ImageFormat::Avif => {
            image.write_with_encoder(AvifEncoder::new_with_speed_quality(&mut writer, 6, q))
        }
    };
    result.map_err(|e| GatewayError::ProcessingFailed(format!("{format} encode failed: {e}")))?;
    writer.flush()?;
    Ok(())
}

impl FormatGateway for RustGateway {
    fn identify(&self, path: &Path) -> Result<Dimensions, GatewayError> {
        let (width, height) =
            ::image::image_dimensions(path).map_err(|e| decode_error(path, e))?;
        Ok(Dimensions { width, height })
    }

    fn load(&self, path: &Path) -> Result<SharedImage, GatewayError> {
        let decoded = decode(path)?;
        let buffer = to_pixel_buffer(decoded.image)?;
        let (width, height) = (buffer.width(), buffer.height());
        let format = decoded.format.and_then(ImageFormat::from_codec);
        debug!(
            path = %path.display(),
            width,
            height,
            sixteen_bit = buffer.sixteen_bit(),
            has_alpha = buffer.has_alpha(),
            "decoded image"
        );

        let mut image = SharedImage::from_buffer(buffer);
        image.set_attribute(ORIGINAL_FILE_PATH, path.to_string_lossy().into_owned());
        image.set_attribute(
            DETECTED_FILE_FORMAT,
            format.map(ImageFormat::name).unwrap_or("UNKNOWN"),
        );
        image.set_attribute(ORIGINAL_SIZE, AttributeValue::Size { width, height });
        // Formats we can decode but not write back.
        image.set_attribute(IS_READ_ONLY, format.is_none());
        image.set_icc_profile(decoded.icc_profile);
        image.set_metadata(decoded.exif.unwrap_or_default());
        Ok(image)
    }

    fn save(
        &self,
        image: &SharedImage,
        path: &Path,
        format: ImageFormat,
    ) -> Result<(), GatewayError> {
        if image.is_null() {
            return Err(GatewayError::NullImage);
        }
        let encodable = encodable(image, format)?;
        encode(&encodable, path, format, self.quality)?;
        debug!(path = %path.display(), %format, "saved image");
        Ok(())
    }
}
