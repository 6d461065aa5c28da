use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the download/extract pipeline.
///
/// Every variant is fatal: the pipeline stops at the first one and nothing is
/// retried.
#[derive(Error, Debug)]
pub enum Error {
    #[error("failed to build HTTP client")]
    Client(#[source] reqwest::Error),

    #[error("request to {url} failed")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("request to {url} failed with status: {status}")]
    Status {
        url: String,
        status: reqwest::StatusCode,
    },

    #[error("I/O error on {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to extract {path}")]
    Extract {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },
}

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn extract(path: impl Into<PathBuf>, source: anyhow::Error) -> Self {
        Error::Extract {
            path: path.into(),
            source,
        }
    }
}
