use bytes::Bytes;
use flate2::Crc;
use flate2::read::DeflateDecoder;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use super::{ArchiveEntry, ArchiveReader, PREALLOC_LIMIT};
use crate::error::ParseError;

/// Maximum size to read for the End of Central Directory search (64KB comment + record)
const EOCD_SEARCH_SIZE: u64 = 65536 + MIN_EOCD_SIZE as u64;

/// Minimum size for EOCD (4 bytes signature + 18 bytes data)
const MIN_EOCD_SIZE: usize = 22;

/// Central Directory File Header minimum size (fixed portion)
const CDFH_MIN_SIZE: usize = 46;

/// Local File Header minimum size (fixed portion)
const LOCAL_HEADER_MIN_SIZE: usize = 30;

const COMPRESSION_STORED: u16 = 0;
const COMPRESSION_DEFLATE: u16 = 8;

/// Reads ZIP archives through their central directory
pub struct ZipReader;

#[derive(Debug)]
struct EocdInfo {
    central_dir_offset: u64,
    central_dir_size: u64,
}

/// Central directory record for one entry
#[derive(Debug)]
struct CentralEntry {
    name: String,
    is_dir: bool,
    compression_method: u16,
    crc32: u32,
    compressed_size: u64,
    uncompressed_size: u64,
    local_header_offset: u64,
}

impl Default for ZipReader {
    fn default() -> Self {
        Self::new()
    }
}

impl ArchiveReader for ZipReader {
    fn read(&self, staged: &Path) -> Result<Vec<ArchiveEntry>, ParseError> {
        let mut file = File::open(staged)?;
        let size = file.metadata()?.len();
        if size < MIN_EOCD_SIZE as u64 {
            return Err(ParseError::Corrupt(
                "file too small to be a valid ZIP archive".to_string(),
            ));
        }

        // Locate the central directory from the tail of the file
        let tail_size = EOCD_SEARCH_SIZE.min(size);
        let tail = read_range(&mut file, size - tail_size, tail_size)?;
        let eocd = Self::find_eocd(&tail)?;

        let cd_end = eocd
            .central_dir_offset
            .checked_add(eocd.central_dir_size)
            .ok_or_else(|| ParseError::Corrupt("central directory bounds overflow".to_string()))?;
        if cd_end > size {
            return Err(ParseError::Corrupt(format!(
                "central directory extends beyond file bounds (offset {} + size {} > file size {})",
                eocd.central_dir_offset, eocd.central_dir_size, size
            )));
        }

        let central_dir = read_range(&mut file, eocd.central_dir_offset, eocd.central_dir_size)?;
        let records = Self::parse_central_directory(&central_dir, size)?;

        let mut entries = Vec::with_capacity(records.len());
        for record in records {
            if record.is_dir {
                entries.push(ArchiveEntry::dir(record.name));
                continue;
            }
            let content = Self::extract(&mut file, size, &record)?;
            entries.push(ArchiveEntry::file(record.name, content));
        }

        Ok(entries)
    }
}

impl ZipReader {
    pub fn new() -> Self {
        ZipReader
    }

    /// Find the End of Central Directory record, searching backwards.
    fn find_eocd(data: &[u8]) -> Result<EocdInfo, ParseError> {
        const EOCD_SIGNATURE: [u8; 4] = [0x50, 0x4b, 0x05, 0x06];

        if data.len() < MIN_EOCD_SIZE {
            return Err(ParseError::Corrupt(
                "could not find End of Central Directory record".to_string(),
            ));
        }

        for i in (0..=data.len() - MIN_EOCD_SIZE).rev() {
            if !data[i..].starts_with(&EOCD_SIGNATURE) {
                continue;
            }
            let eocd = &data[i..];

            let disk_number = u16::from_le_bytes([eocd[4], eocd[5]]);
            let disk_with_cd = u16::from_le_bytes([eocd[6], eocd[7]]);
            if disk_number != 0 || disk_with_cd != 0 {
                return Err(ParseError::Unsupported(format!(
                    "multi-disk ZIP archives (disk {disk_number}, CD disk {disk_with_cd})"
                )));
            }

            let central_dir_size = u32::from_le_bytes([eocd[12], eocd[13], eocd[14], eocd[15]]);
            let central_dir_offset = u32::from_le_bytes([eocd[16], eocd[17], eocd[18], eocd[19]]);

            // ZIP64 uses 0xFFFFFFFF as a placeholder
            if central_dir_size == u32::MAX || central_dir_offset == u32::MAX {
                return Err(ParseError::Unsupported("ZIP64 archives".to_string()));
            }

            return Ok(EocdInfo {
                central_dir_offset: central_dir_offset as u64,
                central_dir_size: central_dir_size as u64,
            });
        }

        Err(ParseError::Corrupt(
            "could not find End of Central Directory record".to_string(),
        ))
    }

    /// Parse the central directory file headers, preserving their order.
    ///
    /// Header layout (46 bytes fixed + variable):
    /// - 0: signature (0x02014b50)
    /// - 8: general purpose bit flag
    /// - 10: compression method
    /// - 16: crc-32
    /// - 20: compressed size
    /// - 24: uncompressed size
    /// - 28/30/32: file name, extra field and comment lengths
    /// - 42: relative offset of local header
    /// - 46: file name, extra field, comment
    fn parse_central_directory(
        data: &[u8],
        archive_size: u64,
    ) -> Result<Vec<CentralEntry>, ParseError> {
        const CDFH_SIGNATURE: [u8; 4] = [0x50, 0x4b, 0x01, 0x02];

        let u16_at = |pos: usize| u16::from_le_bytes([data[pos], data[pos + 1]]);
        let u32_at = |pos: usize| {
            u32::from_le_bytes([data[pos], data[pos + 1], data[pos + 2], data[pos + 3]])
        };

        let mut entries = Vec::new();
        let mut pos = 0;

        while pos + CDFH_MIN_SIZE <= data.len() {
            if !data[pos..].starts_with(&CDFH_SIGNATURE) {
                break;
            }

            let flags = u16_at(pos + 8);
            let compression_method = u16_at(pos + 10);
            let crc32 = u32_at(pos + 16);
            let compressed_size = u32_at(pos + 20);
            let uncompressed_size = u32_at(pos + 24);
            let local_header_offset = u32_at(pos + 42);

            if compressed_size == u32::MAX
                || uncompressed_size == u32::MAX
                || local_header_offset == u32::MAX
            {
                return Err(ParseError::Unsupported("ZIP64 entries".to_string()));
            }

            if local_header_offset as u64 >= archive_size {
                return Err(ParseError::Corrupt(format!(
                    "invalid local header offset {local_header_offset} (size {archive_size})"
                )));
            }

            let filename_len = u16_at(pos + 28) as usize;
            let extra_len = u16_at(pos + 30) as usize;
            let comment_len = u16_at(pos + 32) as usize;

            let end = pos + CDFH_MIN_SIZE + filename_len + extra_len + comment_len;
            if end > data.len() {
                return Err(ParseError::Corrupt(format!(
                    "truncated central directory entry at position {pos}"
                )));
            }

            let filename_bytes = &data[pos + CDFH_MIN_SIZE..pos + CDFH_MIN_SIZE + filename_len];
            let name: String = if flags & (1 << 11) != 0 {
                String::from_utf8_lossy(filename_bytes).into_owned()
            } else {
                // Legacy encoding: keep byte values as chars
                filename_bytes.iter().map(|&b| b as char).collect()
            };

            entries.push(CentralEntry {
                is_dir: name.ends_with('/'),
                name,
                compression_method,
                crc32,
                compressed_size: compressed_size as u64,
                uncompressed_size: uncompressed_size as u64,
                local_header_offset: local_header_offset as u64,
            });

            pos = end;
        }

        Ok(entries)
    }

    /// Read and decompress one file entry, verifying size and CRC-32.
    fn extract(file: &mut File, file_size: u64, entry: &CentralEntry) -> Result<Bytes, ParseError> {
        let name = &entry.name;

        let local_header = read_range(file, entry.local_header_offset, LOCAL_HEADER_MIN_SIZE as u64)
            .map_err(|_| ParseError::Corrupt(format!("truncated local header for {name}")))?;
        if !local_header.starts_with(&[0x50, 0x4b, 0x03, 0x04]) {
            return Err(ParseError::Corrupt(format!(
                "invalid local file header signature for {name}"
            )));
        }

        let filename_len = u16::from_le_bytes([local_header[26], local_header[27]]) as u64;
        let extra_len = u16::from_le_bytes([local_header[28], local_header[29]]) as u64;
        let data_offset = entry
            .local_header_offset
            .checked_add(LOCAL_HEADER_MIN_SIZE as u64)
            .and_then(|v| v.checked_add(filename_len))
            .and_then(|v| v.checked_add(extra_len))
            .ok_or_else(|| ParseError::Corrupt(format!("data offset overflow for {name}")))?;
        let data_end = data_offset
            .checked_add(entry.compressed_size)
            .ok_or_else(|| ParseError::Corrupt(format!("data end overflow for {name}")))?;

        if data_end > file_size {
            return Err(ParseError::Corrupt(format!(
                "data for {name} extends beyond file bounds ({} + {} > {})",
                data_offset, entry.compressed_size, file_size
            )));
        }

        let compressed = read_range(file, data_offset, entry.compressed_size)?;

        let content = match entry.compression_method {
            COMPRESSION_STORED => compressed,
            COMPRESSION_DEFLATE => {
                // Never trust the declared size for allocation; one byte past
                // it is enough to detect a mismatch
                let capacity = entry.uncompressed_size.min(PREALLOC_LIMIT) as usize;
                let mut out = Vec::with_capacity(capacity);
                let decoder = DeflateDecoder::new(&compressed[..]);
                let mut decoder = decoder.take(entry.uncompressed_size.saturating_add(1));
                decoder.read_to_end(&mut out).map_err(|e| {
                    ParseError::Corrupt(format!("failed to inflate {name}: {e}"))
                })?;
                out
            }
            other => {
                return Err(ParseError::Unsupported(format!(
                    "compression method {other} for {name}; only stored and deflate"
                )));
            }
        };

        if content.len() as u64 != entry.uncompressed_size {
            return Err(ParseError::Corrupt(format!(
                "size mismatch for {name}: expected {} bytes, got {}",
                entry.uncompressed_size,
                content.len()
            )));
        }

        let mut crc = Crc::new();
        crc.update(&content);
        if crc.sum() != entry.crc32 {
            return Err(ParseError::Corrupt(format!(
                "CRC-32 mismatch for {name}: expected {:#010x}, got {:#010x}",
                entry.crc32,
                crc.sum()
            )));
        }

        Ok(Bytes::from(content))
    }
}

/// Read exactly `length` bytes at `offset`
fn read_range(file: &mut File, offset: u64, length: u64) -> std::io::Result<Vec<u8>> {
    file.seek(SeekFrom::Start(offset))?;
    let mut buf = vec![0u8; length as usize];
    file.read_exact(&mut buf)?;
    Ok(buf)
}
