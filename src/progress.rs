//! Progress reporting for the download and the extraction.
//!
//! The extractor only talks to the [`ExtractProgress`] trait; the binary
//! plugs in an [`indicatif::ProgressBar`].

use std::fmt::Write;

use indicatif::{HumanBytes, ProgressBar, ProgressState, ProgressStyle};

use crate::zip::ZipFileEntry;

/// The characters to use to show progress in the progress bar.
const PROGRESS_CHARS: &str = "━━╾─";

/// Receives one `start`, then one `advance` per archive member in stored
/// order, then `finish` once every member has been written.
pub trait ExtractProgress: Send + Sync {
    fn start(&self, total: u64);
    fn advance(&self, entry: &ZipFileEntry);
    fn finish(&self);
}

impl ExtractProgress for ProgressBar {
    fn start(&self, total: u64) {
        self.set_length(total);
        self.set_position(0);
    }

    fn advance(&self, entry: &ZipFileEntry) {
        self.set_message(entry.file_name.clone());
        self.inc(1);
    }

    fn finish(&self) {
        self.finish_with_message("done");
    }
}

/// Style for the download bar: transferred bytes and throughput.
pub fn bytes_style() -> ProgressStyle {
    ProgressStyle::with_template(
        "  {spinner:.dim} {prefix:12!} [{elapsed_precise}] [{bar:30!.bright.yellow/dim.white}] {bytes:>10}/{total_bytes:10} @ {smoothed_bytes_per_sec:10}",
    )
    .unwrap_or_else(|_| ProgressStyle::default_bar())
    .progress_chars(PROGRESS_CHARS)
    .with_key(
        "smoothed_bytes_per_sec",
        |s: &ProgressState, w: &mut dyn Write| match (s.pos(), s.elapsed().as_millis()) {
            (pos, elapsed_ms) if elapsed_ms > 0 => {
                let _ = write!(w, "{}/s", HumanBytes((pos as f64 * 1000_f64 / elapsed_ms as f64) as u64));
            }
            _ => {
                let _ = write!(w, "-");
            }
        },
    )
}

/// Style for the extraction bar: members written out of the member count.
pub fn entries_style() -> ProgressStyle {
    ProgressStyle::with_template(
        "  {spinner:.dim} {prefix:12!} [{elapsed_precise}] [{bar:30!.bright.yellow/dim.white}] {pos:>5}/{len:5} {wide_msg:.dim}",
    )
    .unwrap_or_else(|_| ProgressStyle::default_bar())
    .progress_chars(PROGRESS_CHARS)
}

/// Byte counter for the download. The length is filled in once the
/// response announces a `Content-Length`.
pub fn download_bar(quiet: bool) -> ProgressBar {
    let pb = if quiet {
        ProgressBar::hidden()
    } else {
        ProgressBar::no_length()
    };
    pb.set_style(bytes_style());
    pb.set_prefix("downloading");
    pb
}

pub fn extract_bar(quiet: bool) -> ProgressBar {
    let pb = if quiet {
        ProgressBar::hidden()
    } else {
        ProgressBar::no_length()
    };
    pb.set_style(entries_style());
    pb.set_prefix("extracting");
    pb
}
