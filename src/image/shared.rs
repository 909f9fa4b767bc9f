//! Copy-on-write image handle.
//!
//! A [`SharedImage`] is an `Arc` around the pixel buffer and its side-table.
//! Cloning a handle is O(1); the first mutation through a handle that is not
//! the sole owner deep-copies everything and rebinds that handle, so other
//! handles never observe the change.
//!
//! Operations that build a completely new buffer (depth conversion, rotation
//! by 90°, crop) go through [`SharedImage::replace_buffer`], which skips the
//! deep copy of pixels that are about to be discarded anyway.

use super::attributes::{self, AttributeValue};
use super::buffer::{BufferError, Color, ColorDepth, PixelBuffer, PixelData};
use super::history::{FilterAction, HistoryImageId, ImageHistory};
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Everything an image carries besides its pixels.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageMeta {
    pub attributes: BTreeMap<String, AttributeValue>,
    pub embedded_text: BTreeMap<String, String>,
    /// Opaque ICC profile bytes; never interpreted here.
    pub icc_profile: Option<Vec<u8>>,
    /// Opaque encoded Exif/IPTC/XMP blob.
    pub metadata: Vec<u8>,
    pub history: ImageHistory,
}

#[derive(Debug, Clone, Default)]
struct ImageData {
    buffer: PixelBuffer,
    meta: ImageMeta,
}

#[derive(Debug, Clone, Default)]
pub struct SharedImage {
    data: Arc<ImageData>,
}

impl SharedImage {
    pub fn null() -> Self {
        Self::default()
    }

    /// Allocate a zero-filled image.
    pub fn new(
        width: u32,
        height: u32,
        depth: ColorDepth,
        has_alpha: bool,
    ) -> Result<Self, BufferError> {
        Ok(Self::from_buffer(PixelBuffer::new(
            width, height, depth, has_alpha,
        )?))
    }

    pub fn from_buffer(buffer: PixelBuffer) -> Self {
        Self::from_parts(buffer, ImageMeta::default())
    }

    pub fn from_parts(buffer: PixelBuffer, meta: ImageMeta) -> Self {
        Self {
            data: Arc::new(ImageData { buffer, meta }),
        }
    }

    /// Wrap packed bytes. Borrowed bytes are copied, owned bytes taken over.
    pub fn from_bytes(
        width: u32,
        height: u32,
        depth: ColorDepth,
        has_alpha: bool,
        bytes: Cow<'_, [u8]>,
    ) -> Result<Self, BufferError> {
        Ok(Self::from_buffer(PixelBuffer::from_bytes(
            width, height, depth, has_alpha, bytes,
        )?))
    }

    // ------------------------------------------------------------------
    // Sharing
    // ------------------------------------------------------------------

    /// A second handle onto the same data.
    pub fn copy(&self) -> Self {
        self.clone()
    }

    /// True when another handle shares this data.
    pub fn is_shared(&self) -> bool {
        Arc::strong_count(&self.data) > 1
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.data, &other.data)
    }

    /// Become the sole owner, deep-copying if the data is shared.
    pub fn detach(&mut self) {
        if self.is_shared() {
            debug!(
                width = self.width(),
                height = self.height(),
                "detaching shared image"
            );
        }
        Arc::make_mut(&mut self.data);
    }

    /// The pixels, cloned only if another handle still shares them.
    pub fn into_buffer(self) -> PixelBuffer {
        match Arc::try_unwrap(self.data) {
            Ok(data) => data.buffer,
            Err(shared) => shared.buffer.clone(),
        }
    }

    /// Mutable pixels; detaches first.
    pub fn buffer_mut(&mut self) -> &mut PixelBuffer {
        &mut Arc::make_mut(&mut self.data).buffer
    }

    /// Mutable side-table; detaches first.
    pub fn meta_mut(&mut self) -> &mut ImageMeta {
        &mut Arc::make_mut(&mut self.data).meta
    }

    /// Swap in a freshly built buffer, keeping the side-table.
    ///
    /// When the data is shared only the side-table is cloned; the old pixels
    /// stay with the other handles.
    pub(crate) fn replace_buffer(&mut self, buffer: PixelBuffer) {
        match Arc::get_mut(&mut self.data) {
            Some(data) => data.buffer = buffer,
            None => {
                self.data = Arc::new(ImageData {
                    buffer,
                    meta: self.data.meta.clone(),
                })
            }
        }
    }

    /// Replace the pixels with packed bytes, keeping the side-table.
    ///
    /// On a size problem the image is left null and the error returned.
    pub fn put_buffer(
        &mut self,
        width: u32,
        height: u32,
        depth: ColorDepth,
        has_alpha: bool,
        bytes: Cow<'_, [u8]>,
    ) -> Result<(), BufferError> {
        match PixelBuffer::from_bytes(width, height, depth, has_alpha, bytes) {
            Ok(buffer) => {
                self.replace_buffer(buffer);
                Ok(())
            }
            Err(e) => {
                warn!(width, height, error = %e, "rejecting pixel buffer");
                self.replace_buffer(PixelBuffer::null());
                Err(e)
            }
        }
    }

    /// Take the pixels out, leaving a null image with the side-table intact.
    pub fn strip_image_data(&mut self) -> PixelData {
        self.buffer_mut().take_data()
    }

    /// Null image carrying a copy of this image's side-table.
    pub fn copy_meta_data(&self) -> Self {
        Self::from_parts(PixelBuffer::null(), self.data.meta.clone())
    }

    /// Deep copy of the part of `(x, y, w, h)` that overlaps the image.
    pub fn copy_region(&self, x: i64, y: i64, w: i64, h: i64) -> Self {
        match clip_rect(self.width(), self.height(), x, y, w, h) {
            Some((cx, cy, cw, ch)) => match self.data.buffer.copy_rect(cx, cy, cw, ch) {
                Ok(buffer) => Self::from_parts(buffer, self.data.meta.clone()),
                Err(e) => {
                    warn!(error = %e, "region copy failed");
                    self.copy_meta_data()
                }
            },
            None => {
                debug!(x, y, w, h, "region misses the image");
                self.copy_meta_data()
            }
        }
    }

    // ------------------------------------------------------------------
    // Geometry and pixels
    // ------------------------------------------------------------------

    pub fn buffer(&self) -> &PixelBuffer {
        &self.data.buffer
    }

    pub fn is_null(&self) -> bool {
        self.data.buffer.is_null()
    }

    pub fn width(&self) -> u32 {
        self.data.buffer.width()
    }

    pub fn height(&self) -> u32 {
        self.data.buffer.height()
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width(), self.height())
    }

    pub fn depth(&self) -> ColorDepth {
        self.data.buffer.depth()
    }

    pub fn sixteen_bit(&self) -> bool {
        self.data.buffer.sixteen_bit()
    }

    pub fn has_alpha(&self) -> bool {
        self.data.buffer.has_alpha()
    }

    pub fn set_has_alpha(&mut self, has_alpha: bool) {
        self.buffer_mut().set_has_alpha(has_alpha);
    }

    pub fn bytes_per_pixel(&self) -> usize {
        self.data.buffer.bytes_per_pixel()
    }

    pub fn num_bytes(&self) -> usize {
        self.data.buffer.byte_len()
    }

    pub fn num_pixels(&self) -> usize {
        self.data.buffer.num_pixels()
    }

    pub fn bits(&self) -> &[u8] {
        self.data.buffer.bits()
    }

    pub fn samples8(&self) -> Option<&[u8]> {
        self.data.buffer.samples8()
    }

    pub fn samples16(&self) -> Option<&[u16]> {
        self.data.buffer.samples16()
    }

    pub fn pixel_color(&self, x: u32, y: u32) -> Option<Color> {
        self.data.buffer.pixel_color(x, y)
    }

    pub fn set_pixel_color(&mut self, x: u32, y: u32, color: Color) -> bool {
        if x >= self.width() || y >= self.height() {
            return false;
        }
        self.buffer_mut().set_pixel_color(x, y, color)
    }

    pub fn fill(&mut self, color: Color) {
        if self.is_null() {
            return;
        }
        self.buffer_mut().fill(color);
    }

    // ------------------------------------------------------------------
    // Side-table
    // ------------------------------------------------------------------

    pub fn meta(&self) -> &ImageMeta {
        &self.data.meta
    }

    pub fn attribute(&self, key: &str) -> Option<&AttributeValue> {
        self.data.meta.attributes.get(key)
    }

    pub fn has_attribute(&self, key: &str) -> bool {
        self.data.meta.attributes.contains_key(key)
    }

    pub fn set_attribute(&mut self, key: impl Into<String>, value: impl Into<AttributeValue>) {
        self.meta_mut().attributes.insert(key.into(), value.into());
    }

    pub fn remove_attribute(&mut self, key: &str) -> Option<AttributeValue> {
        if !self.has_attribute(key) {
            return None;
        }
        self.meta_mut().attributes.remove(key)
    }

    pub fn embedded_text(&self, key: &str) -> Option<&str> {
        self.data.meta.embedded_text.get(key).map(String::as_str)
    }

    pub fn set_embedded_text(&mut self, key: impl Into<String>, text: impl Into<String>) {
        self.meta_mut()
            .embedded_text
            .insert(key.into(), text.into());
    }

    pub fn icc_profile(&self) -> Option<&[u8]> {
        self.data.meta.icc_profile.as_deref()
    }

    pub fn set_icc_profile(&mut self, profile: Option<Vec<u8>>) {
        self.meta_mut().icc_profile = profile;
    }

    pub fn metadata(&self) -> &[u8] {
        &self.data.meta.metadata
    }

    pub fn set_metadata(&mut self, blob: Vec<u8>) {
        self.meta_mut().metadata = blob;
    }

    /// Path from the `originalFilePath` attribute, if any.
    pub fn original_file_path(&self) -> Option<&str> {
        self.attribute(attributes::ORIGINAL_FILE_PATH)
            .and_then(AttributeValue::as_text)
    }

    // ------------------------------------------------------------------
    // History
    // ------------------------------------------------------------------

    pub fn history(&self) -> &ImageHistory {
        &self.data.meta.history
    }

    pub fn set_history(&mut self, history: ImageHistory) {
        self.meta_mut().history = history;
    }

    pub fn has_image_history(&self) -> bool {
        !self.data.meta.history.is_empty()
    }

    pub fn add_filter_action(&mut self, action: FilterAction) {
        self.meta_mut().history.add_action(action);
    }

    pub fn add_referred_image(&mut self, id: HistoryImageId) {
        self.meta_mut().history.add_referred_image(id);
    }

    pub fn insert_referred_image(&mut self, after_step: usize, id: HistoryImageId) {
        self.meta_mut()
            .history
            .insert_referred_image(after_step, id);
    }

    pub fn add_current_unique_image_id(&mut self, uuid: &str) {
        self.meta_mut().history.adjust_current_uuid(uuid);
    }

    /// History as recorded at load time, or empty.
    pub fn original_image_history(&self) -> ImageHistory {
        self.attribute(attributes::ORIGINAL_IMAGE_HISTORY)
            .and_then(AttributeValue::as_history)
            .cloned()
            .unwrap_or_default()
    }

    /// Mark the steps added since load as a new branch (or not).
    pub fn set_history_branch(&mut self, is_branch: bool) {
        let before = self.original_image_history();
        self.set_history_branch_after(&before, is_branch);
    }

    pub fn set_history_branch_after(&mut self, before_branch: &ImageHistory, is_branch: bool) {
        let added = self.history().len().saturating_sub(before_branch.len());
        self.set_history_branch_for_last_steps(added, is_branch);
    }

    pub fn set_history_branch_for_last_steps(&mut self, steps: usize, is_branch: bool) {
        self.meta_mut()
            .history
            .set_branch_for_last_steps(steps, is_branch);
    }
}

/// Intersect `(x, y, w, h)` with a `width × height` image.
///
/// Returns `None` for non-positive sizes or when nothing overlaps.
pub fn clip_rect(
    width: u32,
    height: u32,
    x: i64,
    y: i64,
    w: i64,
    h: i64,
) -> Option<(u32, u32, u32, u32)> {
    if w <= 0 || h <= 0 || width == 0 || height == 0 {
        return None;
    }
    let left = x.max(0);
    let top = y.max(0);
    let right = x.saturating_add(w).min(width as i64);
    let bottom = y.saturating_add(h).min(height as i64);
    if right <= left || bottom <= top {
        return None;
    }
    Some((
        left as u32,
        top as u32,
        (right - left) as u32,
        (bottom - top) as u32,
    ))
}
