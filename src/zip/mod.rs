//! ZIP archive parsing and extraction.
//!
//! - [`structures`]: records of the ZIP format (EOCD, ZIP64 records, entries)
//! - [`parser`]: reads the member list from the Central Directory
//! - [`extractor`]: writes members to disk
//!
//! ## Supported Features
//!
//! - Standard ZIP format and ZIP64 extensions
//! - STORED and DEFLATE members, checked against their CRC-32
//!
//! ## Limitations
//!
//! - No encryption support
//! - No multi-disk archive support
//! - No BZIP2, LZMA, or other compression methods

mod extractor;
mod parser;
mod structures;

pub use extractor::{ZipExtractor, enclosed_path};
pub use parser::ZipParser;
pub use structures::*;
