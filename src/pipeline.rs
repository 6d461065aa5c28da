//! Download → extract → cleanup.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::fs;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::io::{Fetcher, LocalFileReader};
use crate::progress::{self, ExtractProgress};
use crate::zip::ZipExtractor;

/// Where the ErUM LHC datasets archive is published.
pub const DATASET_URL: &str = "https://www.dropbox.com/scl/fi/gvmelw7u619moo8nyg3j7/ErUMData.zip?rlkey=kq4do1fmalppjt2v24lzau4li&dl=1";

/// Name the archive is downloaded under before it is unpacked.
pub const ARCHIVE_NAME: &str = "ErUMData.zip";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub url: String,
    pub archive_name: String,
    /// Directory receiving both the archive and the extracted members
    pub target_dir: PathBuf,
    /// Hide the progress bars
    pub quiet: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            url: DATASET_URL.to_string(),
            archive_name: ARCHIVE_NAME.to_string(),
            target_dir: PathBuf::from("."),
            quiet: false,
        }
    }
}

impl Config {
    pub fn archive_path(&self) -> PathBuf {
        self.target_dir.join(&self.archive_name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Summary {
    pub downloaded_bytes: u64,
    pub extracted_entries: usize,
}

/// Run the whole pipeline.
///
/// The archive is removed only after every member has been extracted; on any
/// earlier failure it is left where it was downloaded.
pub async fn run(config: &Config) -> Result<Summary> {
    fs::create_dir_all(&config.target_dir)
        .await
        .map_err(|e| Error::io(&config.target_dir, e))?;

    let archive = config.archive_path();
    let fetcher = Fetcher::new()?;
    let downloaded_bytes = fetcher
        .fetch(&config.url, &archive, &progress::download_bar(config.quiet))
        .await?;

    let extracted_entries = extract(
        &archive,
        &config.target_dir,
        &progress::extract_bar(config.quiet),
    )
    .await?;

    cleanup(&archive).await?;

    Ok(Summary {
        downloaded_bytes,
        extracted_entries,
    })
}

/// Unpack every member of `archive` below `target_dir`.
pub async fn extract(archive: &Path, target_dir: &Path, progress: &dyn ExtractProgress) -> Result<usize> {
    info!("extracting {}", archive.display());

    let reader = LocalFileReader::new(archive).map_err(|e| Error::extract(archive, e))?;
    let extractor = ZipExtractor::new(Arc::new(reader));
    extractor
        .extract_all(target_dir, progress)
        .await
        .map_err(|e| Error::extract(archive, e))
}

async fn cleanup(archive: &Path) -> Result<()> {
    fs::remove_file(archive)
        .await
        .map_err(|e| Error::io(archive, e))?;
    debug!("removed {}", archive.display());
    Ok(())
}
