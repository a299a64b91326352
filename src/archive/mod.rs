pub mod tar;
pub mod zip;

use bytes::Bytes;
use std::path::Path;

use crate::error::ParseError;

pub use self::tar::TarGzReader;
pub use self::zip::ZipReader;

/// Upper bound on buffer capacity reserved from sizes an archive declares.
/// Buffers still grow past this as real data arrives.
const PREALLOC_LIMIT: u64 = 16 * 1024 * 1024;

/// Archive formats we know how to read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    Zip,
    TarGz,
}

impl ArchiveFormat {
    /// Classify a source URL by the extension of its path.
    ///
    /// The query string is dropped, then whatever follows the final `.` is
    /// compared case-insensitively. Only `gz` selects tar.gz; everything
    /// else, including a path with no `.` at all, is treated as ZIP.
    pub fn detect(url: &str) -> Self {
        let path = url.split('?').next().unwrap_or(url);
        let ext = path.rsplit('.').next().unwrap_or(path);
        if ext.eq_ignore_ascii_case("gz") {
            ArchiveFormat::TarGz
        } else {
            ArchiveFormat::Zip
        }
    }

    /// Classify staged bytes by their leading magic number
    pub fn sniff(header: &[u8]) -> Option<Self> {
        const ZIP_LOCAL: [u8; 4] = [0x50, 0x4b, 0x03, 0x04];
        const ZIP_EMPTY: [u8; 4] = [0x50, 0x4b, 0x05, 0x06];
        const GZIP: [u8; 2] = [0x1f, 0x8b];

        if header.starts_with(&ZIP_LOCAL) || header.starts_with(&ZIP_EMPTY) {
            Some(ArchiveFormat::Zip)
        } else if header.starts_with(&GZIP) {
            Some(ArchiveFormat::TarGz)
        } else {
            None
        }
    }
}

/// One record from an archive's entry table, with its content in memory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    /// Path inside the archive, using the archive's own separators
    pub path: String,
    pub is_dir: bool,
    /// Empty for directories
    pub content: Bytes,
}

impl ArchiveEntry {
    pub fn dir(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            is_dir: true,
            content: Bytes::new(),
        }
    }

    pub fn file(path: impl Into<String>, content: impl Into<Bytes>) -> Self {
        Self {
            path: path.into(),
            is_dir: false,
            content: content.into(),
        }
    }
}

/// Trait for reading the different archive formats.
///
/// Implementations block on file I/O and decompression, so callers on an
/// async runtime should run them through `spawn_blocking`.
pub trait ArchiveReader: Send + Sync {
    /// Read every entry of the staged archive in its native order.
    ///
    /// All-or-nothing: on error no entries are returned.
    fn read(&self, staged: &Path) -> Result<Vec<ArchiveEntry>, ParseError>;
}

/// Pick the reader for a format
pub fn reader_for(format: ArchiveFormat) -> Box<dyn ArchiveReader> {
    match format {
        ArchiveFormat::Zip => Box::new(ZipReader::new()),
        ArchiveFormat::TarGz => Box::new(TarGzReader::new()),
    }
}
