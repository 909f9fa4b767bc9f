//! High-level image operations.
//!
//! These functions combine the in-memory transforms with gateway I/O: load a
//! file, run a list of [`Operation`]s, record them in the edit history, save.

use super::backend::{FormatGateway, GatewayError};
use super::params::ImageFormat;
use crate::image::{
    ColorDepth, DitherRng, FilterAction, FilterCategory, Flip, HistoryImageKind, Rotation,
    SharedImage,
};
use crate::scale::{self, AspectRatioMode, ScaleQuality};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Result type for image operations.
pub type Result<T> = std::result::Result<T, GatewayError>;

/// Identifier prefix of history entries written by these operations.
pub const FILTER_NAMESPACE: &str = "rasterbuf";

/// One in-memory transform.
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    Resize {
        width: i64,
        height: i64,
        aspect_ratio: AspectRatioMode,
        quality: ScaleQuality,
    },
    Rotate(Rotation),
    Flip(Flip),
    Crop {
        x: i64,
        y: i64,
        width: i64,
        height: i64,
    },
    Depth(ColorDepth),
}

impl Operation {
    /// History record describing this operation.
    pub fn filter_action(&self) -> FilterAction {
        let action = |name: &str| {
            FilterAction::new(
                format!("{FILTER_NAMESPACE}:{name}"),
                1,
                FilterCategory::Reproducible,
            )
        };
        match self {
            Operation::Resize {
                width,
                height,
                aspect_ratio,
                quality,
            } => action("resize")
                .with_param("width", width)
                .with_param("height", height)
                .with_param("aspectRatio", format!("{aspect_ratio:?}"))
                .with_param("quality", format!("{quality:?}")),
            Operation::Rotate(rotation) => action("rotate").with_param("angle", match rotation {
                Rotation::Rot90 => 90,
                Rotation::Rot180 => 180,
                Rotation::Rot270 => 270,
            }),
            Operation::Flip(flip) => action("flip").with_param("direction", format!("{flip:?}")),
            Operation::Crop {
                x,
                y,
                width,
                height,
            } => action("crop")
                .with_param("x", x)
                .with_param("y", y)
                .with_param("width", width)
                .with_param("height", height),
            // Dithering makes widening depend on the seed, not just the input.
            Operation::Depth(depth) => FilterAction::new(
                format!("{FILTER_NAMESPACE}:depth"),
                1,
                FilterCategory::Complex,
            )
            .with_param("bits", depth.bytes_per_sample() * 8),
        }
    }
}

/// Run `op` on `image` and record it in the history.
pub fn apply(image: &mut SharedImage, op: &Operation, rng: &mut DitherRng) {
    debug!(?op, "applying operation");
    match *op {
        Operation::Resize {
            width,
            height,
            aspect_ratio,
            quality,
        } => {
            let scaled = match quality {
                ScaleQuality::Smooth => scale::smooth_scale(image, width, height, aspect_ratio),
                ScaleQuality::Fast => {
                    let (w, h) = scale::scaled_size(image.size(), (width, height), aspect_ratio);
                    scale::scale(image, w, h, ScaleQuality::Fast)
                }
            };
            *image = scaled;
        }
        Operation::Rotate(rotation) => image.rotate(rotation),
        Operation::Flip(flip) => image.flip(flip),
        Operation::Crop {
            x,
            y,
            width,
            height,
        } => image.crop(x, y, width, height),
        Operation::Depth(depth) => image.convert_depth(depth, rng),
    }
    if !image.is_null() {
        image.add_filter_action(op.filter_action());
    }
}

/// Where [`process_file`] writes `source` converted to `format`.
pub fn output_path(source: &Path, output_dir: &Path, format: ImageFormat) -> PathBuf {
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "image".to_string());
    output_dir.join(format!("{stem}.{}", format.extension()))
}

/// Load `source`, run `ops` and save the result into `output_dir`.
///
/// The output format defaults to the source's extension, then PNG. The
/// source file is recorded as the original in the edit history.
pub fn process_file(
    gateway: &impl FormatGateway,
    source: &Path,
    output_dir: &Path,
    ops: &[Operation],
    format: Option<ImageFormat>,
    dither_seed: u64,
) -> Result<PathBuf> {
    let mut image = gateway.load(source)?;
    if let Err(e) = image.add_as_referred_image(source, HistoryImageKind::Original) {
        warn!(source = %source.display(), error = %e, "could not reference source in history");
    }

    let mut rng = DitherRng::new(dither_seed);
    for op in ops {
        apply(&mut image, op, &mut rng);
        if image.is_null() {
            return Err(GatewayError::ProcessingFailed(format!(
                "{op:?} left {} without pixels",
                source.display()
            )));
        }
    }

    let format = format
        .or_else(|| ImageFormat::from_path(source))
        .unwrap_or(ImageFormat::Png);
    let output = output_path(source, output_dir, format);
    gateway.save(&image, &output, format)?;
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::backend::tests::{MockGateway, RecordedOp};
    use crate::image::DEFAULT_DITHER_SEED;
    use crate::test_helpers::*;

    fn resize(width: i64, height: i64) -> Operation {
        Operation::Resize {
            width,
            height,
            aspect_ratio: AspectRatioMode::Ignore,
            quality: ScaleQuality::Smooth,
        }
    }

    #[test]
    fn apply_resize_records_history() {
        let mut image = solid_image(4, 4, ColorDepth::Eight, false, RGB_A);
        apply(&mut image, &resize(2, 2), &mut DitherRng::default());

        assert_eq!(image.size(), (2, 2));
        assert_uniform(&image, RGB_A);
        let entries = image.history().entries();
        assert_eq!(entries.len(), 1);
        let action = entries[0].action.as_ref().unwrap();
        assert_eq!(action.identifier, "rasterbuf:resize");
        assert_eq!(action.params.get("width").map(String::as_str), Some("2"));
    }

    #[test]
    fn apply_fast_resize_keeps_aspect() {
        let mut image = solid_image(8, 4, ColorDepth::Eight, false, RGB_A);
        let op = Operation::Resize {
            width: 4,
            height: 4,
            aspect_ratio: AspectRatioMode::Keep,
            quality: ScaleQuality::Fast,
        };
        apply(&mut image, &op, &mut DitherRng::default());
        assert_eq!(image.size(), (4, 2));
        assert_uniform(&image, RGB_A);
    }

    #[test]
    fn apply_crop_outside_leaves_null_without_history() {
        let mut image = solid_image(4, 4, ColorDepth::Eight, false, RGB_A);
        let op = Operation::Crop {
            x: 10,
            y: 10,
            width: 2,
            height: 2,
        };
        apply(&mut image, &op, &mut DitherRng::default());
        assert!(image.is_null());
        assert!(!image.has_image_history());
    }

    #[test]
    fn depth_is_complex_filter() {
        let action = Operation::Depth(ColorDepth::Sixteen).filter_action();
        assert_eq!(action.category, FilterCategory::Complex);
        assert_eq!(action.params.get("bits").map(String::as_str), Some("16"));
        let action = Operation::Rotate(Rotation::Rot270).filter_action();
        assert_eq!(action.params.get("angle").map(String::as_str), Some("270"));
    }

    #[test]
    fn output_path_swaps_extension() {
        assert_eq!(
            output_path(Path::new("/in/photo.jpeg"), Path::new("/out"), ImageFormat::Png),
            PathBuf::from("/out/photo.png")
        );
    }

    #[test]
    fn process_file_loads_transforms_and_saves() {
        let gateway =
            MockGateway::with_images(vec![solid_image(8, 6, ColorDepth::Eight, false, RGB_A)]);
        let ops = [resize(4, 3), Operation::Rotate(Rotation::Rot90)];

        let output = process_file(
            &gateway,
            Path::new("/photos/a.jpg"),
            Path::new("/out"),
            &ops,
            None,
            DEFAULT_DITHER_SEED,
        )
        .unwrap();
        assert_eq!(output, PathBuf::from("/out/a.jpg"));

        let recorded = gateway.get_operations();
        assert_eq!(recorded.len(), 2);
        assert!(matches!(&recorded[0], RecordedOp::Load(p) if p == "/photos/a.jpg"));
        assert!(matches!(
            &recorded[1],
            RecordedOp::Save {
                format: ImageFormat::Jpeg,
                width: 3,
                height: 4,
                ..
            }
        ));
    }

    #[test]
    fn process_file_explicit_format_and_depth() {
        let gateway =
            MockGateway::with_images(vec![solid_image(2, 2, ColorDepth::Eight, true, RGB_A)]);
        process_file(
            &gateway,
            Path::new("/photos/b"),
            Path::new("/out"),
            &[Operation::Depth(ColorDepth::Sixteen)],
            Some(ImageFormat::Tiff),
            1,
        )
        .unwrap();

        let recorded = gateway.get_operations();
        assert!(matches!(
            &recorded[1],
            RecordedOp::Save {
                format: ImageFormat::Tiff,
                depth: ColorDepth::Sixteen,
                output,
                ..
            } if output == "/out/b.tif"
        ));
    }

    #[test]
    fn process_file_rejects_emptied_image() {
        let gateway =
            MockGateway::with_images(vec![solid_image(2, 2, ColorDepth::Eight, false, RGB_A)]);
        let result = process_file(
            &gateway,
            Path::new("/photos/c.png"),
            Path::new("/out"),
            &[resize(0, 5)],
            None,
            1,
        );
        assert!(matches!(result, Err(GatewayError::ProcessingFailed(_))));
        // Nothing was saved.
        assert_eq!(gateway.get_operations().len(), 1);
    }
}
