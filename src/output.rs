//! CLI output formatting.
//!
//! # Output Format
//!
//! ## Info
//!
//! ```text
//! 001 dawn.jpg
//!     Size: 4000x3000, 8-bit, no alpha
//!     Format: JPEG
//!     ICC profile: 3144 bytes
//!     Metadata: 12288 bytes
//! ```
//!
//! ## Transform commands
//!
//! ```text
//! 001 dawn.jpg → out/dawn.jpg
//! 002 dusk.png: failed: Failed to decode dusk.png: ...
//!
//! Processed 1 of 2 files
//! ```
//!
//! ## Hash
//!
//! ```text
//! 0cc175b9c0f1b6a831c399e269772661  photos/dawn.jpg
//! ```
//!
//! # Architecture
//!
//! Each command has a `format_*` function (returns `Vec<String>` or
//! `String`) for testability. Format functions are pure: no I/O, no side
//! effects. `main` does the printing.

use crate::image::attributes::DETECTED_FILE_FORMAT;
use crate::image::{AttributeValue, SharedImage};
use std::path::Path;

/// Format a 1-based positional index as 3-digit zero-padded.
fn format_index(pos: usize) -> String {
    format!("{:0>3}", pos)
}

/// Return indentation string: 4 spaces per depth level.
fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

fn file_label(path: &Path) -> String {
    path.file_name()
        .map(|f| f.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Describe a loaded image.
pub fn format_info(index: usize, path: &Path, image: &SharedImage) -> Vec<String> {
    let mut lines = vec![format!("{} {}", format_index(index), file_label(path))];
    lines.push(format!(
        "{}Size: {}x{}, {}-bit, {}",
        indent(1),
        image.width(),
        image.height(),
        image.depth().bytes_per_sample() * 8,
        if image.has_alpha() { "alpha" } else { "no alpha" }
    ));
    if let Some(format) = image
        .attribute(DETECTED_FILE_FORMAT)
        .and_then(AttributeValue::as_text)
    {
        lines.push(format!("{}Format: {}", indent(1), format));
    }
    if let Some(icc) = image.icc_profile() {
        lines.push(format!("{}ICC profile: {} bytes", indent(1), icc.len()));
    }
    if !image.metadata().is_empty() {
        lines.push(format!("{}Metadata: {} bytes", indent(1), image.metadata().len()));
    }
    if image.has_image_history() {
        lines.push(format!("{}History: {} steps", indent(1), image.history().len()));
    }
    lines
}

/// One line per processed file: where it went, or why it did not.
pub fn format_processed<E: std::fmt::Display>(
    index: usize,
    source: &Path,
    result: &Result<impl AsRef<Path>, E>,
) -> String {
    match result {
        Ok(output) => format!(
            "{} {} → {}",
            format_index(index),
            file_label(source),
            output.as_ref().display()
        ),
        Err(e) => format!("{} {}: failed: {}", format_index(index), file_label(source), e),
    }
}

/// `md5sum`-style line.
pub fn format_hash(hash: &str, path: &Path) -> String {
    format!("{}  {}", hash, path.display())
}

pub fn format_summary(succeeded: usize, total: usize) -> String {
    if succeeded == total {
        format!("Processed {} files", total)
    } else {
        format!("Processed {} of {} files", succeeded, total)
    }
}
