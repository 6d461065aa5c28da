use std::borrow::Cow;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use flate2::Crc;
use flate2::write::DeflateDecoder;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::io::ReadAt;
use crate::progress::ExtractProgress;

use super::parser::ZipParser;
use super::structures::{CompressionMethod, ZipFileEntry};

/// Size of the compressed chunks read from the archive per step
const CHUNK_SIZE: usize = 64 * 1024;

/// ZIP file extractor
pub struct ZipExtractor<R: ReadAt> {
    parser: ZipParser<R>,
}

impl<R: ReadAt> ZipExtractor<R> {
    pub fn new(reader: Arc<R>) -> Self {
        Self {
            parser: ZipParser::new(reader),
        }
    }

    /// List all files in the archive
    pub async fn list_files(&self) -> Result<Vec<ZipFileEntry>> {
        self.parser.list_files().await
    }

    /// Extract every member, in stored order, below `target_dir`.
    ///
    /// The reporter is started with the member count and advanced once per
    /// member, directories included. Returns the number of members handled.
    /// The first failing member aborts the run; members written before it
    /// stay on disk.
    pub async fn extract_all(
        &self,
        target_dir: &Path,
        progress: &dyn ExtractProgress,
    ) -> Result<usize> {
        let entries = self.list_files().await?;
        progress.start(entries.len() as u64);

        for entry in &entries {
            match enclosed_path(&entry.file_name) {
                Some(relative) => {
                    let output_path = target_dir.join(relative);
                    if entry.is_directory {
                        fs::create_dir_all(&output_path).await.with_context(|| {
                            format!("failed to create directory {}", output_path.display())
                        })?;
                    } else {
                        self.extract_to_file(entry, &output_path).await?;
                    }
                }
                None => warn!(name = %entry.file_name, "skipping entry without a usable path"),
            }
            progress.advance(entry);
        }

        progress.finish();
        Ok(entries.len())
    }

    /// Extract a single file member to `output_path`, overwriting it.
    ///
    /// The data is streamed in chunks; the decompressed length and CRC-32
    /// are checked against the Central Directory once the member is written.
    pub async fn extract_to_file(&self, entry: &ZipFileEntry, output_path: &Path) -> Result<u64> {
        if entry.is_encrypted() {
            bail!("{}: encrypted entries are not supported", entry.file_name);
        }
        let mut inflater = Inflater::new(entry)?;

        if let Some(parent) = output_path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("failed to create directory {}", parent.display()))?;
        }

        debug!(
            name = %entry.file_name,
            size = entry.uncompressed_size,
            modified = %entry.modified(),
            "extracting"
        );

        let mut offset = self.parser.get_data_offset(entry).await?;
        let mut remaining = entry.compressed_size;
        let mut file = fs::File::create(output_path)
            .await
            .with_context(|| format!("failed to create {}", output_path.display()))?;

        let mut crc = Crc::new();
        let mut written = 0u64;
        let mut buf = vec![0u8; remaining.min(CHUNK_SIZE as u64) as usize];

        while remaining > 0 {
            let want = remaining.min(CHUNK_SIZE as u64) as usize;
            let n = self.parser.reader().read_at(offset, &mut buf[..want]).await?;
            if n < want {
                bail!("{}: unexpected end of archive data", entry.file_name);
            }

            let out = inflater
                .feed(&buf[..want])
                .with_context(|| format!("{}: corrupt compressed data", entry.file_name))?;
            crc.update(&out);
            file.write_all(&out).await?;
            written += out.len() as u64;

            offset += want as u64;
            remaining -= want as u64;
        }

        let tail = inflater
            .finish()
            .with_context(|| format!("{}: corrupt compressed data", entry.file_name))?;
        crc.update(&tail);
        file.write_all(&tail).await?;
        written += tail.len() as u64;
        file.flush().await?;

        if written != entry.uncompressed_size {
            bail!(
                "{}: size mismatch (expected {} bytes, got {})",
                entry.file_name,
                entry.uncompressed_size,
                written
            );
        }
        if crc.sum() != entry.crc32 {
            bail!(
                "{}: CRC-32 mismatch (expected {:08x}, got {:08x})",
                entry.file_name,
                entry.crc32,
                crc.sum()
            );
        }

        Ok(written)
    }
}

/// Turns compressed chunks of one member into plain bytes.
enum Inflater {
    Stored,
    Deflate(DeflateDecoder<Vec<u8>>),
}

impl Inflater {
    fn new(entry: &ZipFileEntry) -> Result<Self> {
        match entry.compression_method {
            CompressionMethod::Stored => Ok(Inflater::Stored),
            CompressionMethod::Deflate => Ok(Inflater::Deflate(DeflateDecoder::new(Vec::new()))),
            CompressionMethod::Unknown(method) => bail!(
                "{}: unsupported compression method {method} (only STORED and DEFLATE are supported)",
                entry.file_name
            ),
        }
    }

    fn feed<'a>(&mut self, chunk: &'a [u8]) -> std::io::Result<Cow<'a, [u8]>> {
        match self {
            Inflater::Stored => Ok(Cow::Borrowed(chunk)),
            Inflater::Deflate(decoder) => {
                decoder.write_all(chunk)?;
                Ok(Cow::Owned(std::mem::take(decoder.get_mut())))
            }
        }
    }

    fn finish(self) -> std::io::Result<Vec<u8>> {
        match self {
            Inflater::Stored => Ok(Vec::new()),
            Inflater::Deflate(decoder) => decoder.finish(),
        }
    }
}

/// Map a member name to a path relative to the extraction directory.
///
/// Root prefixes, drive letters, `.` and `..` components are dropped, so the
/// result can never leave the directory it is joined onto. Returns `None`
/// when nothing remains.
pub fn enclosed_path(name: &str) -> Option<PathBuf> {
    let name = if cfg!(windows) {
        strip_drive(name)
    } else {
        name
    };
    let separators: &[char] = if cfg!(windows) { &['/', '\\'] } else { &['/'] };

    let path: PathBuf = name
        .split(separators)
        .filter(|part| !matches!(*part, "" | "." | ".."))
        .collect();

    if path.as_os_str().is_empty() {
        None
    } else {
        Some(path)
    }
}

fn strip_drive(name: &str) -> &str {
    let bytes = name.as_bytes();
    if bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':' {
        &name[2..]
    } else {
        name
    }
}
