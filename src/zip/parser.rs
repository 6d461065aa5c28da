//! Low-level ZIP archive parser.
//!
//! This module handles the binary parsing of ZIP file structures,
//! reading from any source that implements the [`ReadAt`] trait.
//!
//! ## Parsing Strategy
//!
//! ZIP files are designed to be read from the end:
//! 1. Find the End of Central Directory (EOCD) at the file's end
//! 2. If ZIP64, read the ZIP64 EOCD for large file support
//! 3. Read the Central Directory to get metadata for all files
//! 4. For extraction, read each file's Local File Header to locate its data
//!
//! The member list therefore comes from the Central Directory, in the order
//! the archive stores it.

use byteorder::{LittleEndian, ReadBytesExt};
use std::io::{Cursor, Read};
use std::sync::Arc;

use crate::io::ReadAt;
use anyhow::{Context, Result, bail};

use super::structures::*;

/// Maximum ZIP comment size allowed by the format (65535 bytes).
///
/// This limits the search area when looking for EOCD with a comment.
const MAX_COMMENT_SIZE: u64 = 65535;

/// Header id of the ZIP64 extended information extra field
const ZIP64_EXTRA_ID: u16 = 0x0001;

/// Low-level ZIP file parser.
///
/// Typically used through [`ZipExtractor`](super::ZipExtractor)
/// rather than directly.
pub struct ZipParser<R: ReadAt> {
    /// The underlying data source
    reader: Arc<R>,
    /// Total size of the archive in bytes
    size: u64,
}

impl<R: ReadAt> ZipParser<R> {
    pub fn new(reader: Arc<R>) -> Self {
        let size = reader.size();
        Self { reader, size }
    }

    /// Read exactly `len` bytes at `offset`, failing on a truncated source.
    async fn read_exact_at(&self, offset: u64, len: usize, what: &str) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; len];
        let n = self.reader.read_at(offset, &mut buf).await?;
        if n < len {
            bail!("Truncated archive: {what} at offset {offset} needs {len} bytes, got {n}");
        }
        Ok(buf)
    }

    /// Find and parse the End of Central Directory record.
    ///
    /// The record normally sits in the last 22 bytes. When the archive
    /// carries a comment it is searched for backwards through the last
    /// 64 KiB, accepting only a signature whose comment length reaches
    /// exactly to the end of the file.
    ///
    /// # Returns
    ///
    /// A tuple of (EOCD record, offset of EOCD in file).
    ///
    /// # Errors
    ///
    /// Returns "Not a valid ZIP file" if no EOCD can be found.
    pub async fn find_eocd(&self) -> Result<(EndOfCentralDirectory, u64)> {
        let eocd_size = EndOfCentralDirectory::SIZE as u64;
        if self.size < eocd_size {
            bail!("Not a valid ZIP file");
        }

        // Common case: no archive comment
        let offset = self.size - eocd_size;
        let tail = self
            .read_exact_at(offset, EndOfCentralDirectory::SIZE, "End of Central Directory")
            .await?;
        if tail.starts_with(EndOfCentralDirectory::SIGNATURE) && tail[20..22] == [0u8, 0] {
            return Ok((EndOfCentralDirectory::from_bytes(&tail)?, offset));
        }

        let search_size = (MAX_COMMENT_SIZE + eocd_size).min(self.size);
        let search_start = self.size - search_size;
        let window = self
            .read_exact_at(search_start, search_size as usize, "archive tail")
            .await?;

        let last = window.len() - EndOfCentralDirectory::SIZE;
        for i in (0..=last).rev() {
            if !window[i..].starts_with(EndOfCentralDirectory::SIGNATURE) {
                continue;
            }
            let comment_len = u16::from_le_bytes([window[i + 20], window[i + 21]]) as usize;
            if comment_len == window.len() - i - EndOfCentralDirectory::SIZE {
                let eocd = EndOfCentralDirectory::from_bytes(&window[i..])?;
                return Ok((eocd, search_start + i as u64));
            }
        }

        bail!("Not a valid ZIP file")
    }

    /// Read the ZIP64 End of Central Directory record through the locator
    /// stored immediately before the regular EOCD.
    pub async fn read_zip64_eocd(&self, eocd_offset: u64) -> Result<Zip64EOCD> {
        let locator_offset = eocd_offset
            .checked_sub(Zip64EOCDLocator::SIZE as u64)
            .context("Invalid ZIP64 locator")?;
        let locator_buf = self
            .read_exact_at(locator_offset, Zip64EOCDLocator::SIZE, "ZIP64 locator")
            .await?;
        let locator = Zip64EOCDLocator::from_bytes(&locator_buf)?;

        let eocd64_buf = self
            .read_exact_at(
                locator.eocd64_offset,
                Zip64EOCD::MIN_SIZE,
                "ZIP64 End of Central Directory",
            )
            .await?;

        Zip64EOCD::from_bytes(&eocd64_buf)
    }

    /// List all entries in the ZIP archive, in Central Directory order.
    ///
    /// # Errors
    ///
    /// Returns an error if the archive is invalid, truncated, or cannot be
    /// read.
    pub async fn list_files(&self) -> Result<Vec<ZipFileEntry>> {
        let (eocd, eocd_offset) = self.find_eocd().await?;

        let (cd_offset, cd_size, total_entries) = if eocd.is_zip64() {
            let eocd64 = self.read_zip64_eocd(eocd_offset).await?;
            (eocd64.cd_offset, eocd64.cd_size, eocd64.total_entries)
        } else {
            (
                eocd.cd_offset as u64,
                eocd.cd_size as u64,
                eocd.total_entries as u64,
            )
        };

        if cd_offset.saturating_add(cd_size) > self.size {
            bail!("Central Directory extends past the end of the archive");
        }

        let cd_data = self
            .read_exact_at(cd_offset, cd_size as usize, "Central Directory")
            .await?;

        // The entry count comes from the archive; never trust it for allocation
        let capacity = total_entries.min(cd_size / CDFH_MIN_SIZE as u64) as usize;
        let mut entries = Vec::with_capacity(capacity);
        let mut cursor = Cursor::new(cd_data.as_slice());

        for index in 0..total_entries {
            let entry = parse_cdfh(&mut cursor)
                .with_context(|| format!("Central Directory entry {index} is malformed"))?;
            entries.push(entry);
        }

        Ok(entries)
    }

    /// Get the offset of the first data byte of an entry.
    ///
    /// The Local File Header may carry a different extra field than the
    /// Central Directory, so its lengths are read from the header itself.
    pub async fn get_data_offset(&self, entry: &ZipFileEntry) -> Result<u64> {
        let lfh = self
            .read_exact_at(entry.lfh_offset, LFH_SIZE, "Local File Header")
            .await?;

        if !lfh.starts_with(LFH_SIGNATURE) {
            bail!("Invalid Local File Header for {}", entry.file_name);
        }

        let mut cursor = Cursor::new(&lfh[26..]);
        let file_name_length = cursor.read_u16::<LittleEndian>()? as u64;
        let extra_field_length = cursor.read_u16::<LittleEndian>()? as u64;

        Ok(entry.lfh_offset + LFH_SIZE as u64 + file_name_length + extra_field_length)
    }

    pub fn reader(&self) -> &Arc<R> {
        &self.reader
    }
}

/// Parse one Central Directory File Header.
fn parse_cdfh(cursor: &mut Cursor<&[u8]>) -> Result<ZipFileEntry> {
    let mut sig = [0u8; 4];
    cursor.read_exact(&mut sig)?;
    if sig != CDFH_SIGNATURE {
        bail!("Invalid Central Directory File Header");
    }

    // version made by, version needed
    skip(cursor, 4);
    let flags = cursor.read_u16::<LittleEndian>()?;
    let compression_method = cursor.read_u16::<LittleEndian>()?;
    let last_mod_time = cursor.read_u16::<LittleEndian>()?;
    let last_mod_date = cursor.read_u16::<LittleEndian>()?;
    let crc32 = cursor.read_u32::<LittleEndian>()?;
    let mut compressed_size = cursor.read_u32::<LittleEndian>()? as u64;
    let mut uncompressed_size = cursor.read_u32::<LittleEndian>()? as u64;
    let file_name_length = cursor.read_u16::<LittleEndian>()?;
    let extra_field_length = cursor.read_u16::<LittleEndian>()?;
    let file_comment_length = cursor.read_u16::<LittleEndian>()?;
    // disk number start, internal and external attributes
    skip(cursor, 8);
    let mut lfh_offset = cursor.read_u32::<LittleEndian>()? as u64;

    let mut file_name_bytes = vec![0u8; file_name_length as usize];
    cursor.read_exact(&mut file_name_bytes)?;
    let file_name = String::from_utf8_lossy(&file_name_bytes).into_owned();
    let is_directory = file_name.ends_with('/');

    let mut extra_bytes = vec![0u8; extra_field_length as usize];
    cursor.read_exact(&mut extra_bytes)?;
    let mut extra = Cursor::new(extra_bytes.as_slice());

    while extra.position() + 4 <= extra_field_length as u64 {
        let header_id = extra.read_u16::<LittleEndian>()?;
        let field_size = extra.read_u16::<LittleEndian>()? as u64;
        let field_end = extra.position() + field_size;

        if header_id == ZIP64_EXTRA_ID {
            // Only the fields saturated in the fixed header are present, in this order
            if uncompressed_size == 0xFFFFFFFF && extra.position() + 8 <= field_end {
                uncompressed_size = extra.read_u64::<LittleEndian>()?;
            }
            if compressed_size == 0xFFFFFFFF && extra.position() + 8 <= field_end {
                compressed_size = extra.read_u64::<LittleEndian>()?;
            }
            if lfh_offset == 0xFFFFFFFF && extra.position() + 8 <= field_end {
                lfh_offset = extra.read_u64::<LittleEndian>()?;
            }
        }
        extra.set_position(field_end);
    }

    skip(cursor, file_comment_length as u64);

    Ok(ZipFileEntry {
        file_name,
        flags,
        compression_method: CompressionMethod::from_u16(compression_method),
        compressed_size,
        uncompressed_size,
        crc32,
        lfh_offset,
        last_mod_time,
        last_mod_date,
        is_directory,
    })
}

fn skip(cursor: &mut Cursor<&[u8]>, len: u64) {
    cursor.set_position(cursor.position() + len);
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    struct MemoryReader(Vec<u8>);

    #[async_trait]
    impl ReadAt for MemoryReader {
        async fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize> {
            let start = (offset as usize).min(self.0.len());
            let n = buf.len().min(self.0.len() - start);
            buf[..n].copy_from_slice(&self.0[start..start + n]);
            Ok(n)
        }

        fn size(&self) -> u64 {
            self.0.len() as u64
        }
    }

    fn build_zip(comment: Option<&str>) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        let options = |method| SimpleFileOptions::default().compression_method(method);

        writer
            .start_file("z-last.txt", options(zip::CompressionMethod::Stored))
            .unwrap();
        writer.write_all(b"first in archive").unwrap();
        writer
            .add_directory("b/", options(zip::CompressionMethod::Stored))
            .unwrap();
        writer
            .start_file("b/c.txt", options(zip::CompressionMethod::Deflated))
            .unwrap();
        writer.write_all(&b"c".repeat(1000)).unwrap();
        if let Some(comment) = comment {
            writer.set_comment(comment);
        }
        writer.finish().unwrap().into_inner()
    }

    fn parser(bytes: Vec<u8>) -> ZipParser<MemoryReader> {
        ZipParser::new(Arc::new(MemoryReader(bytes)))
    }

    #[tokio::test]
    async fn lists_entries_in_stored_order() {
        let entries = parser(build_zip(None)).list_files().await.unwrap();

        let names: Vec<_> = entries.iter().map(|e| e.file_name.as_str()).collect();
        assert_eq!(names, ["z-last.txt", "b/", "b/c.txt"]);

        assert!(!entries[0].is_directory);
        assert_eq!(entries[0].compression_method, CompressionMethod::Stored);
        assert_eq!(entries[0].uncompressed_size, 16);
        assert!(entries[1].is_directory);
        assert_eq!(entries[2].compression_method, CompressionMethod::Deflate);
        assert_eq!(entries[2].uncompressed_size, 1000);
        assert!(entries[2].compressed_size < 1000);
    }

    #[tokio::test]
    async fn finds_eocd_behind_archive_comment() {
        let parser = parser(build_zip(Some("ErUM datasets, see README")));
        let (eocd, offset) = parser.find_eocd().await.unwrap();

        assert_eq!(eocd.total_entries, 3);
        assert_eq!(eocd.comment_len as usize, "ErUM datasets, see README".len());
        assert_eq!(offset + 22 + eocd.comment_len as u64, parser.size);
    }

    #[tokio::test]
    async fn data_offset_points_past_local_header() {
        let bytes = build_zip(None);
        let parser = parser(bytes.clone());
        let entries = parser.list_files().await.unwrap();

        let offset = parser.get_data_offset(&entries[0]).await.unwrap() as usize;
        assert_eq!(&bytes[offset..offset + 16], b"first in archive");
    }

    #[tokio::test]
    async fn rejects_non_zip_data() {
        let err = parser(b"<html>rate limited</html>".to_vec())
            .list_files()
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Not a valid ZIP file");

        let err = parser(b"PK".to_vec()).list_files().await.unwrap_err();
        assert_eq!(err.to_string(), "Not a valid ZIP file");
    }

    #[tokio::test]
    async fn rejects_truncated_central_directory() {
        let bytes = build_zip(None);
        let eocd_offset = bytes.len() - 22;
        let mut truncated = bytes[..eocd_offset].to_vec();
        // Drop the first half of the archive but keep the EOCD pointing into it
        truncated.drain(..eocd_offset / 2);
        truncated.extend_from_slice(&bytes[eocd_offset..]);

        assert!(parser(truncated).list_files().await.is_err());
    }

    /// A single STORED member whose sizes, header offset, entry counts and
    /// Central Directory location all live in ZIP64 records.
    fn build_zip64(name: &str, data: &[u8]) -> Vec<u8> {
        use byteorder::WriteBytesExt;

        let mut crc = flate2::Crc::new();
        crc.update(data);
        let size = data.len() as u64;
        let mut out = Vec::new();

        // Local File Header with a ZIP64 extra field (sizes only)
        out.extend_from_slice(LFH_SIGNATURE);
        out.write_u16::<LittleEndian>(45).unwrap();
        out.write_u16::<LittleEndian>(0).unwrap();
        out.write_u16::<LittleEndian>(0).unwrap();
        out.write_u32::<LittleEndian>(0).unwrap();
        out.write_u32::<LittleEndian>(crc.sum()).unwrap();
        out.write_u32::<LittleEndian>(0xFFFFFFFF).unwrap();
        out.write_u32::<LittleEndian>(0xFFFFFFFF).unwrap();
        out.write_u16::<LittleEndian>(name.len() as u16).unwrap();
        out.write_u16::<LittleEndian>(20).unwrap();
        out.extend_from_slice(name.as_bytes());
        out.write_u16::<LittleEndian>(ZIP64_EXTRA_ID).unwrap();
        out.write_u16::<LittleEndian>(16).unwrap();
        out.write_u64::<LittleEndian>(size).unwrap();
        out.write_u64::<LittleEndian>(size).unwrap();
        out.extend_from_slice(data);

        // Central Directory with sizes and header offset in the extra field
        let cd_offset = out.len() as u64;
        out.extend_from_slice(CDFH_SIGNATURE);
        out.write_u16::<LittleEndian>(45).unwrap();
        out.write_u16::<LittleEndian>(45).unwrap();
        out.write_u16::<LittleEndian>(0).unwrap();
        out.write_u16::<LittleEndian>(0).unwrap();
        out.write_u32::<LittleEndian>(0).unwrap();
        out.write_u32::<LittleEndian>(crc.sum()).unwrap();
        out.write_u32::<LittleEndian>(0xFFFFFFFF).unwrap();
        out.write_u32::<LittleEndian>(0xFFFFFFFF).unwrap();
        out.write_u16::<LittleEndian>(name.len() as u16).unwrap();
        out.write_u16::<LittleEndian>(28).unwrap();
        out.write_u16::<LittleEndian>(0).unwrap();
        out.write_u16::<LittleEndian>(0).unwrap();
        out.write_u16::<LittleEndian>(0).unwrap();
        out.write_u32::<LittleEndian>(0).unwrap();
        out.write_u32::<LittleEndian>(0xFFFFFFFF).unwrap();
        out.extend_from_slice(name.as_bytes());
        out.write_u16::<LittleEndian>(ZIP64_EXTRA_ID).unwrap();
        out.write_u16::<LittleEndian>(24).unwrap();
        out.write_u64::<LittleEndian>(size).unwrap();
        out.write_u64::<LittleEndian>(size).unwrap();
        out.write_u64::<LittleEndian>(0).unwrap();
        let cd_size = out.len() as u64 - cd_offset;

        // ZIP64 End of Central Directory
        let eocd64_offset = out.len() as u64;
        out.extend_from_slice(Zip64EOCD::SIGNATURE);
        out.write_u64::<LittleEndian>(Zip64EOCD::MIN_SIZE as u64 - 12).unwrap();
        out.write_u16::<LittleEndian>(45).unwrap();
        out.write_u16::<LittleEndian>(45).unwrap();
        out.write_u32::<LittleEndian>(0).unwrap();
        out.write_u32::<LittleEndian>(0).unwrap();
        out.write_u64::<LittleEndian>(1).unwrap();
        out.write_u64::<LittleEndian>(1).unwrap();
        out.write_u64::<LittleEndian>(cd_size).unwrap();
        out.write_u64::<LittleEndian>(cd_offset).unwrap();

        // ZIP64 locator
        out.extend_from_slice(Zip64EOCDLocator::SIGNATURE);
        out.write_u32::<LittleEndian>(0).unwrap();
        out.write_u64::<LittleEndian>(eocd64_offset).unwrap();
        out.write_u32::<LittleEndian>(1).unwrap();

        // Regular EOCD with every field saturated
        out.extend_from_slice(EndOfCentralDirectory::SIGNATURE);
        out.write_u16::<LittleEndian>(0).unwrap();
        out.write_u16::<LittleEndian>(0).unwrap();
        out.write_u16::<LittleEndian>(0xFFFF).unwrap();
        out.write_u16::<LittleEndian>(0xFFFF).unwrap();
        out.write_u32::<LittleEndian>(0xFFFFFFFF).unwrap();
        out.write_u32::<LittleEndian>(0xFFFFFFFF).unwrap();
        out.write_u16::<LittleEndian>(0).unwrap();

        out
    }

    #[tokio::test]
    async fn reads_zip64_records_and_extra_fields() {
        let bytes = build_zip64("hi.txt", b"hello zip64");
        let parser = parser(bytes.clone());

        let (eocd, eocd_offset) = parser.find_eocd().await.unwrap();
        assert!(eocd.is_zip64());
        let eocd64 = parser.read_zip64_eocd(eocd_offset).await.unwrap();
        assert_eq!(eocd64.total_entries, 1);
        assert_eq!(eocd64.cd_offset, 30 + 6 + 20 + 11);
        assert_eq!(eocd64.cd_size, 46 + 6 + 28);

        let entries = parser.list_files().await.unwrap();
        assert_eq!(entries.len(), 1);
        let entry = &entries[0];
        assert_eq!(entry.file_name, "hi.txt");
        assert_eq!(entry.uncompressed_size, 11);
        assert_eq!(entry.compressed_size, 11);
        assert_eq!(entry.lfh_offset, 0);

        let offset = parser.get_data_offset(entry).await.unwrap() as usize;
        assert_eq!(&bytes[offset..offset + 11], b"hello zip64");
    }

    #[tokio::test]
    async fn extracts_from_zip64_archive() {
        let dir = tempfile::tempdir().unwrap();
        let reader = Arc::new(MemoryReader(build_zip64("nested/hi.txt", b"hello zip64")));
        let extractor = crate::zip::ZipExtractor::new(reader);

        let entries = extractor.list_files().await.unwrap();
        let written = extractor
            .extract_to_file(&entries[0], &dir.path().join("nested").join("hi.txt"))
            .await
            .unwrap();

        assert_eq!(written, 11);
        assert_eq!(
            std::fs::read(dir.path().join("nested").join("hi.txt")).unwrap(),
            b"hello zip64"
        );
    }

    #[tokio::test]
    async fn rejects_missing_zip64_locator() {
        let mut bytes = build_zip64("hi.txt", b"hello zip64");
        let locator = bytes.len() - 22 - Zip64EOCDLocator::SIZE;
        bytes[locator] = b'X';

        let err = parser(bytes).list_files().await.unwrap_err();
        assert_eq!(err.to_string(), "Invalid ZIP64 locator");
    }
}
