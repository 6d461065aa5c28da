use indicatif::ProgressBar;
use reqwest::Client;
use std::path::Path;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::error::{Error, Result};

pub const USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

/// Downloads a whole resource to a local file with a single GET request.
///
/// Redirects are followed. There is no timeout and no retry.
pub struct Fetcher {
    client: Client,
}

impl Fetcher {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(Error::Client)?;
        Ok(Self { client })
    }

    /// Download `url` into `destination`, replacing any existing file.
    ///
    /// The destination is only created once the server has answered with a
    /// success status, so a failed request leaves nothing behind. A failure
    /// while streaming the body can leave a partial file.
    ///
    /// Returns the number of bytes written.
    pub async fn fetch(&self, url: &str, destination: &Path, progress: &ProgressBar) -> Result<u64> {
        let request_error = |source: reqwest::Error| Error::Request {
            url: url.to_string(),
            source,
        };
        let write_error = |source: std::io::Error| Error::io(destination, source);

        info!("downloading {url}");
        let mut resp = self.client.get(url).send().await.map_err(request_error)?;

        if !resp.status().is_success() {
            return Err(Error::Status {
                url: url.to_string(),
                status: resp.status(),
            });
        }

        if let Some(len) = resp.content_length() {
            progress.set_length(len);
        }
        debug!(
            final_url = %resp.url(),
            content_length = ?resp.content_length(),
            "server accepted request"
        );

        let mut file = fs::File::create(destination).await.map_err(write_error)?;
        let mut written = 0u64;

        while let Some(chunk) = resp.chunk().await.map_err(request_error)? {
            file.write_all(&chunk).await.map_err(write_error)?;
            written += chunk.len() as u64;
            progress.inc(chunk.len() as u64);
        }
        file.flush().await.map_err(write_error)?;
        progress.finish();

        info!("saved {} bytes to {}", written, destination.display());
        Ok(written)
    }
}
