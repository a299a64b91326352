use bytes::Bytes;
use flate2::read::GzDecoder;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use super::{ArchiveEntry, ArchiveReader, PREALLOC_LIMIT};
use crate::error::ParseError;

/// Reads gzip-compressed tar streams front to back
pub struct TarGzReader;

impl Default for TarGzReader {
    fn default() -> Self {
        Self::new()
    }
}

impl TarGzReader {
    pub fn new() -> Self {
        TarGzReader
    }

    /// Walk a decompressed tar stream, buffering each file's data.
    fn read_stream<R: Read>(reader: R) -> Result<Vec<ArchiveEntry>, ParseError> {
        let corrupt = |what: &str, e: std::io::Error| ParseError::Corrupt(format!("{what}: {e}"));

        let mut archive = tar::Archive::new(reader);
        let mut entries = Vec::new();

        for entry in archive
            .entries()
            .map_err(|e| corrupt("failed to read tar stream", e))?
        {
            let mut entry = entry.map_err(|e| corrupt("failed to read tar entry", e))?;

            // Raw header bytes keep the archive's own separators and trailing '/'
            let path = String::from_utf8_lossy(&entry.path_bytes()).into_owned();
            let is_dir = entry.header().entry_type().is_dir() || path.ends_with('/');

            if is_dir {
                entries.push(ArchiveEntry::dir(path));
                continue;
            }

            // The header's size is untrusted until the data is actually there
            let declared = entry.size();
            let mut content = Vec::with_capacity(declared.min(PREALLOC_LIMIT) as usize);
            entry
                .read_to_end(&mut content)
                .map_err(|e| corrupt(&format!("failed to read {path} from tar"), e))?;
            if !entry.header().entry_type().is_gnu_sparse() && content.len() as u64 != declared {
                return Err(ParseError::Corrupt(format!(
                    "tar entry {path} declares {declared} bytes but holds {}",
                    content.len()
                )));
            }
            entries.push(ArchiveEntry::file(path, Bytes::from(content)));
        }

        Ok(entries)
    }
}

impl ArchiveReader for TarGzReader {
    fn read(&self, staged: &Path) -> Result<Vec<ArchiveEntry>, ParseError> {
        let file = File::open(staged)?;
        Self::read_stream(GzDecoder::new(BufReader::new(file)))
    }
}
