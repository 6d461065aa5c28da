use clap::Parser;
use std::path::PathBuf;

use crate::pipeline::{ARCHIVE_NAME, Config, DATASET_URL};

#[derive(Parser, Debug)]
#[command(name = "erumdata")]
#[command(version)]
#[command(about = "Download the ErUM LHC datasets and unpack them into the working directory", long_about = None)]
#[command(after_help = "Examples:\n  \
  erumdata                      fetch ErUMData.zip, unpack it here, delete the archive\n  \
  erumdata -d data -q           unpack into ./data without progress bars\n  \
  erumdata --url https://example.com/other.zip -O other.zip")]
pub struct Cli {
    /// Archive URL
    #[arg(long, value_name = "URL", default_value = DATASET_URL)]
    pub url: String,

    /// File name the archive is saved under (deleted after extraction)
    #[arg(short = 'O', long = "output", value_name = "NAME", default_value = ARCHIVE_NAME)]
    pub archive_name: String,

    /// Extract files into DIR
    #[arg(short = 'd', long = "dir", value_name = "DIR", default_value = ".")]
    pub dir: PathBuf,

    /// Quiet mode (-qq => quieter)
    #[arg(short = 'q', long, action = clap::ArgAction::Count)]
    pub quiet: u8,
}

impl Cli {
    pub fn is_quiet(&self) -> bool {
        self.quiet > 0
    }

    pub fn is_very_quiet(&self) -> bool {
        self.quiet > 1
    }

    pub fn config(&self) -> Config {
        Config {
            url: self.url.clone(),
            archive_name: self.archive_name.clone(),
            target_dir: self.dir.clone(),
            quiet: self.is_quiet(),
        }
    }
}
