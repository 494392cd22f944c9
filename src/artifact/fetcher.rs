//! HTTP artifact fetching
//!
//! Bodies are streamed to `<dest>.part` and renamed into place only after
//! the last chunk is flushed, so an interrupted download never leaves a
//! truncated artifact at the destination.

use super::drive;
use crate::config::DownloadConfig;
use crate::error::ArtifactError;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Response};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, info};

/// Remote retrieval strategies used by the artifact resolver.
pub trait ArtifactFetcher: Send + Sync {
    /// Download a shared-drive file by identifier, following confirmation
    /// pages. Returns the number of bytes written.
    fn fetch_drive_file(
        &self,
        file_id: &str,
        dest: &Path,
    ) -> impl Future<Output = Result<u64, ArtifactError>> + Send;

    /// Plain GET of `url`, streamed to `dest`. Returns the number of bytes
    /// written.
    fn fetch_url(
        &self,
        url: &str,
        dest: &Path,
    ) -> impl Future<Output = Result<u64, ArtifactError>> + Send;
}

/// `reqwest` based fetcher
#[derive(Clone)]
pub struct HttpFetcher {
    client: Client,
    chunk_size: usize,
    /// Drive direct download endpoint, without the `id` parameter
    download_base: String,
}

impl HttpFetcher {
    /// Create a fetcher with the configured timeouts.
    ///
    /// Cookies are kept across requests; the drive confirmation flow
    /// depends on them.
    pub fn new(config: &DownloadConfig) -> Result<Self, ArtifactError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .cookie_store(true)
            .user_agent(concat!("plantguard/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            chunk_size: config.chunk_size.max(1),
            download_base: drive::DIRECT_DOWNLOAD_BASE.to_string(),
        })
    }

    /// Use a different drive download endpoint
    pub fn with_download_base(mut self, base: impl Into<String>) -> Self {
        self.download_base = base.into();
        self
    }

    async fn get(&self, url: &str) -> Result<Response, ArtifactError> {
        debug!(url = %url, "GET");
        let response = self.client.get(url).send().await?.error_for_status()?;
        Ok(response)
    }

    /// Stream a response body to `dest` in `chunk_size` writes.
    async fn stream_to_file(&self, mut response: Response, dest: &Path) -> Result<u64, ArtifactError> {
        if let Some(parent) = dest.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| io_error(parent, source))?;
        }

        let partial = partial_path(dest);
        let result: Result<u64, ArtifactError> = async {
            let file = tokio::fs::File::create(&partial)
                .await
                .map_err(|source| io_error(&partial, source))?;
            let mut writer = BufWriter::with_capacity(self.chunk_size, file);
            let mut written = 0_u64;

            while let Some(chunk) = response.chunk().await? {
                writer
                    .write_all(&chunk)
                    .await
                    .map_err(|source| io_error(&partial, source))?;
                written += chunk.len() as u64;
            }
            writer
                .flush()
                .await
                .map_err(|source| io_error(&partial, source))?;
            writer
                .into_inner()
                .sync_all()
                .await
                .map_err(|source| io_error(&partial, source))?;

            tokio::fs::rename(&partial, dest)
                .await
                .map_err(|source| io_error(dest, source))?;
            Ok(written)
        }
        .await;

        if result.is_err() {
            let _ = tokio::fs::remove_file(&partial).await;
        }
        result
    }
}

impl ArtifactFetcher for HttpFetcher {
    async fn fetch_drive_file(&self, file_id: &str, dest: &Path) -> Result<u64, ArtifactError> {
        let url = drive::download_url(&self.download_base, file_id);
        let response = self.get(&url).await?;

        if !is_html(&response) {
            return self.stream_to_file(response, dest).await;
        }

        // Large files answer with a confirmation page first
        let cookie_token = response
            .cookies()
            .find(|c| c.name().starts_with(drive::DOWNLOAD_WARNING_COOKIE))
            .map(|c| c.value().to_string());
        let page = response.text().await?;
        let next = drive::confirmation_url(&page, file_id)
            .or_else(|| cookie_token.map(|token| format!("{url}&confirm={token}")))
            .ok_or_else(|| ArtifactError::DownloadFailed {
                url: url.clone(),
                reason: "confirmation page carries no download token".to_string(),
            })?;

        info!(file_id = %file_id, "Following drive download confirmation");
        let response = self.get(&next).await?;
        if is_html(&response) {
            return Err(ArtifactError::DownloadFailed {
                url: next,
                reason: "drive returned an HTML page instead of the file".to_string(),
            });
        }
        self.stream_to_file(response, dest).await
    }

    async fn fetch_url(&self, url: &str, dest: &Path) -> Result<u64, ArtifactError> {
        let response = self.get(url).await?;
        // A viewer or sign-in page is never a model
        if is_html(&response) {
            return Err(ArtifactError::DownloadFailed {
                url: url.to_string(),
                reason: "server returned an HTML page instead of the file".to_string(),
            });
        }
        self.stream_to_file(response, dest).await
    }
}

fn is_html(response: &Response) -> bool {
    response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("text/html"))
}

/// Temporary download location next to `dest`
pub fn partial_path(dest: &Path) -> PathBuf {
    let mut name = dest.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".part");
    dest.with_file_name(name)
}

fn io_error(path: &Path, source: std::io::Error) -> ArtifactError {
    ArtifactError::Io {
        path: path.to_path_buf(),
        source,
    }
}
