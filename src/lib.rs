//! # erumdata
//!
//! Fetches the ErUM LHC datasets archive and unpacks it.
//!
//! The whole tool is one straight pipeline:
//!
//! 1. download the archive with a single GET request ([`Fetcher`])
//! 2. extract every member, in stored order, with a progress bar
//!    ([`ZipExtractor`])
//! 3. delete the archive
//!
//! Every failure is fatal. When extraction fails the archive is left on disk.
//!
//! ## Example
//!
//! ```no_run
//! use erumdata::{Config, run};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let summary = run(&Config {
//!         target_dir: "datasets".into(),
//!         ..Config::default()
//!     })
//!     .await?;
//!     println!("{} members extracted", summary.extracted_entries);
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod error;
pub mod io;
pub mod pipeline;
pub mod progress;
pub mod zip;

pub use cli::Cli;
pub use error::{Error, Result};
pub use io::{Fetcher, LocalFileReader, ReadAt};
pub use pipeline::{ARCHIVE_NAME, Config, DATASET_URL, Summary, extract, run};
pub use progress::ExtractProgress;
pub use zip::{ZipExtractor, ZipFileEntry};
