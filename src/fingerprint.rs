//! Content fingerprints that identify an image file across renames.
//!
//! Two MD5 variants, both returned as lowercase hex:
//!
//! - **V1** hashes the encoded metadata, the first 8 KiB of the file and the
//!   file size written as decimal ASCII.
//! - **V2** hashes the first and the last 100 KiB of the file (overlapping
//!   for small files). Bytes in between do not contribute, so it stays cheap
//!   on large raw files.
//!
//! Hashes on a [`SharedImage`] are computed from its `originalFilePath`
//! attribute and cached in the `uniqueHash` / `uniqueHashV2` attributes.

use crate::image::attributes::{UNIQUE_HASH, UNIQUE_HASH_V2};
use crate::image::{AttributeValue, HistoryImageId, HistoryImageKind, SharedImage};
use md5::{Digest, Md5};
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;
use thiserror::Error;
use tracing::{debug, warn};

/// Bytes of file content hashed by V1.
pub const V1_HEAD_BYTES: u64 = 8192;

/// Bytes hashed from each end of the file by V2.
pub const V2_EDGE_BYTES: u64 = 100 * 1024;

#[derive(Error, Debug)]
pub enum FingerprintError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("file is empty: {0}")]
    Empty(String),
    #[error("image has no originalFilePath attribute")]
    MissingFilePath,
}

/// V1 hash of the file at `path`, seeded with the encoded `metadata`.
pub fn unique_hash_v1(path: &Path, metadata: &[u8]) -> Result<String, FingerprintError> {
    let mut file = File::open(path)?;
    let size = file.metadata()?.len();

    let mut head = Vec::with_capacity(V1_HEAD_BYTES as usize);
    (&mut file).take(V1_HEAD_BYTES).read_to_end(&mut head)?;
    if head.is_empty() {
        return Err(FingerprintError::Empty(path.display().to_string()));
    }

    let mut hasher = Md5::new();
    hasher.update(metadata);
    hasher.update(&head);
    hasher.update(size.to_string().as_bytes());
    Ok(format!("{:x}", hasher.finalize()))
}

/// V2 hash of the file at `path`.
pub fn unique_hash_v2(path: &Path) -> Result<String, FingerprintError> {
    let mut file = File::open(path)?;
    let size = file.metadata()?.len();
    let edge = size.min(V2_EDGE_BYTES);

    let mut hasher = Md5::new();
    if edge > 0 {
        let mut buf = Vec::with_capacity(edge as usize);
        (&mut file).take(edge).read_to_end(&mut buf)?;
        hasher.update(&buf);

        buf.clear();
        file.seek(SeekFrom::Start(size - edge))?;
        (&mut file).take(edge).read_to_end(&mut buf)?;
        hasher.update(&buf);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

/// Describe the file at `path` as a history reference of the given kind.
pub fn history_image_id(
    path: &Path,
    kind: HistoryImageKind,
) -> Result<HistoryImageId, FingerprintError> {
    let size = std::fs::metadata(path)?.len();
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let dir = path
        .parent()
        .map(|p| p.to_string_lossy().into_owned())
        .unwrap_or_default();

    Ok(HistoryImageId {
        uuid: String::new(),
        file_name,
        path: dir,
        unique_hash: unique_hash_v2(path)?,
        file_size: size,
        kind,
    })
}

impl SharedImage {
    /// V1 hash of the originating file, computed once and cached.
    pub fn unique_hash(&mut self) -> Result<String, FingerprintError> {
        self.cached_hash(UNIQUE_HASH, |image, path| {
            unique_hash_v1(path, image.metadata())
        })
    }

    /// V2 hash of the originating file, computed once and cached.
    pub fn unique_hash_v2(&mut self) -> Result<String, FingerprintError> {
        self.cached_hash(UNIQUE_HASH_V2, |_, path| unique_hash_v2(path))
    }

    fn cached_hash(
        &mut self,
        key: &str,
        compute: impl FnOnce(&Self, &Path) -> Result<String, FingerprintError>,
    ) -> Result<String, FingerprintError> {
        if let Some(hash) = self.attribute(key).and_then(AttributeValue::as_text) {
            return Ok(hash.to_string());
        }
        let Some(path) = self.original_file_path().filter(|p| !p.is_empty()) else {
            warn!(key, "hash requested without originalFilePath");
            return Err(FingerprintError::MissingFilePath);
        };
        let path = Path::new(path).to_path_buf();
        let hash = compute(self, &path)?;
        debug!(key, path = %path.display(), %hash, "computed content hash");
        self.set_attribute(key, hash.as_str());
        Ok(hash)
    }

    /// Record the file at `path` in the history, replacing any earlier
    /// reference to the same file.
    pub fn add_as_referred_image(
        &mut self,
        path: &Path,
        kind: HistoryImageKind,
    ) -> Result<HistoryImageId, FingerprintError> {
        let id = history_image_id(path, kind)?;
        let history = &mut self.meta_mut().history;
        history.purge_path_from_referred_images(&id.path, &id.file_name);
        history.add_referred_image(id.clone());
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::ColorDepth;
    use crate::image::attributes::ORIGINAL_FILE_PATH;
    use crate::test_helpers::*;
    use tempfile::TempDir;

    fn md5_hex(parts: &[&[u8]]) -> String {
        let mut hasher = Md5::new();
        for part in parts {
            hasher.update(part);
        }
        format!("{:x}", hasher.finalize())
    }

    // =========================================================================
    // V1
    // =========================================================================

    #[test]
    fn v1_hashes_metadata_head_and_size() {
        let tmp = TempDir::new().unwrap();
        let path = write_test_file(tmp.path(), "a.bin", b"hello world");
        let hash = unique_hash_v1(&path, b"EXIF").unwrap();
        assert_eq!(hash, md5_hex(&[b"EXIF", b"hello world", b"11"]));
        assert_eq!(hash.len(), 32);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn v1_reads_only_the_head() {
        let tmp = TempDir::new().unwrap();
        let mut bytes = vec![7u8; 20_000];
        let a = write_test_file(tmp.path(), "a.bin", &bytes);
        bytes[15_000] = 8;
        let b = write_test_file(tmp.path(), "b.bin", &bytes);
        assert_eq!(
            unique_hash_v1(&a, &[]).unwrap(),
            unique_hash_v1(&b, &[]).unwrap()
        );
        assert_eq!(
            unique_hash_v1(&a, &[]).unwrap(),
            md5_hex(&[&bytes[..8192], b"20000"])
        );
    }

    #[test]
    fn v1_empty_file_is_error() {
        let tmp = TempDir::new().unwrap();
        let path = write_test_file(tmp.path(), "empty.bin", b"");
        assert!(matches!(
            unique_hash_v1(&path, b"meta"),
            Err(FingerprintError::Empty(_))
        ));
    }

    #[test]
    fn missing_file_is_io_error() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("nope.jpg");
        assert!(matches!(unique_hash_v2(&path), Err(FingerprintError::Io(_))));
    }

    // =========================================================================
    // V2
    // =========================================================================

    #[test]
    fn v2_small_file_hashes_content_twice() {
        let tmp = TempDir::new().unwrap();
        let path = write_test_file(tmp.path(), "s.bin", b"abc");
        assert_eq!(unique_hash_v2(&path).unwrap(), md5_hex(&[b"abc", b"abc"]));
    }

    #[test]
    fn v2_ignores_middle_bytes() {
        let tmp = TempDir::new().unwrap();
        let bytes: Vec<u8> = (0..300 * 1024).map(|i| (i % 251) as u8).collect();
        let original = unique_hash_v2(&write_test_file(tmp.path(), "a.bin", &bytes)).unwrap();
        let edited = |name: &str, at: usize| {
            let mut changed = bytes.clone();
            changed[at] ^= 0xff;
            unique_hash_v2(&write_test_file(tmp.path(), name, &changed)).unwrap()
        };

        assert_eq!(edited("middle.bin", 150 * 1024), original);
        let head = edited("head.bin", 10);
        let tail = edited("tail.bin", bytes.len() - 10);
        assert_ne!(head, original);
        assert_ne!(tail, original);
        assert_ne!(head, tail);
    }

    #[test]
    fn v2_empty_file_hashes_nothing() {
        let tmp = TempDir::new().unwrap();
        let path = write_test_file(tmp.path(), "e.bin", b"");
        assert_eq!(
            unique_hash_v2(&path).unwrap(),
            "d41d8cd98f00b204e9800998ecf8427e"
        );
    }

    // =========================================================================
    // SharedImage integration
    // =========================================================================

    #[test]
    fn image_hash_needs_file_path() {
        let mut image = solid_image(2, 2, ColorDepth::Eight, false, RGB_A);
        assert!(matches!(
            image.unique_hash_v2(),
            Err(FingerprintError::MissingFilePath)
        ));
    }

    #[test]
    fn image_hash_is_cached() {
        let tmp = TempDir::new().unwrap();
        let path = write_test_file(tmp.path(), "img.bin", b"pixels");
        let mut image = solid_image(2, 2, ColorDepth::Eight, false, RGB_A);
        image.set_attribute(ORIGINAL_FILE_PATH, path.to_string_lossy().into_owned());
        image.set_metadata(b"exif".to_vec());

        let v1 = image.unique_hash().unwrap();
        assert_eq!(v1, md5_hex(&[b"exif", b"pixels", b"6"]));
        assert_eq!(
            image.attribute(UNIQUE_HASH).and_then(AttributeValue::as_text),
            Some(v1.as_str())
        );

        // Later file changes do not affect the cached value.
        std::fs::write(&path, b"changed").unwrap();
        assert_eq!(image.unique_hash().unwrap(), v1);
        let v2 = image.unique_hash_v2().unwrap();
        assert_eq!(v2, md5_hex(&[b"changed", b"changed"]));
    }

    #[test]
    fn referred_image_replaces_same_path() {
        let tmp = TempDir::new().unwrap();
        let path = write_test_file(tmp.path(), "orig.jpg", b"0123456789");
        let mut image = solid_image(1, 1, ColorDepth::Eight, false, RGB_A);

        let id = image
            .add_as_referred_image(&path, HistoryImageKind::Original)
            .unwrap();
        assert_eq!(id.file_name, "orig.jpg");
        assert_eq!(id.file_size, 10);
        assert_eq!(id.unique_hash, unique_hash_v2(&path).unwrap());

        image
            .add_as_referred_image(&path, HistoryImageKind::Source)
            .unwrap();
        let refs: Vec<_> = image
            .history()
            .entries()
            .iter()
            .flat_map(|e| e.referred_images.iter())
            .collect();
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].kind, HistoryImageKind::Source);
    }
}
