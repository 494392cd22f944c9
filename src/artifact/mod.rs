//! Model artifact acquisition
//!
//! Resolution is two-phase. [`ArtifactResolver::ensure_available`] tries to
//! put the file on disk and only fails when there is nothing to try; download
//! failures are logged and swallowed. Model load then fails loudly if the
//! file is still absent or unusable, so "could not fetch" and "fetched but
//! unusable" stay distinguishable.

pub mod drive;
pub mod fetcher;

pub use fetcher::{ArtifactFetcher, HttpFetcher};

use crate::config::{DownloadConfig, ModelConfig};
use crate::error::ArtifactError;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Trained model file on durable local storage.
///
/// Read-only for the life of the process once present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelArtifact {
    pub path: PathBuf,
    pub source_url: Option<String>,
}

impl ModelArtifact {
    pub fn new(path: impl Into<PathBuf>, source_url: Option<String>) -> Self {
        Self {
            path: path.into(),
            source_url,
        }
    }

    pub fn from_config(config: &ModelConfig) -> Self {
        Self::new(
            config.path.clone(),
            config.url.clone().filter(|u| !u.trim().is_empty()),
        )
    }

    /// Whether the file exists right now
    pub fn present(&self) -> bool {
        self.path.is_file()
    }
}

/// Remote strategy that produced the artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchStrategy {
    SharedDrive,
    Streaming,
}

/// Successful outcome of [`ArtifactResolver::ensure_available`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactOutcome {
    /// File already existed; no network access happened
    AlreadyPresent,
    /// File was downloaded
    Downloaded { strategy: FetchStrategy, bytes: u64 },
    /// Every strategy failed; model load will report the absence
    Unavailable,
}

/// Ensures a model file exists before inference starts
pub struct ArtifactResolver<F = HttpFetcher> {
    fetcher: F,
}

impl ArtifactResolver<HttpFetcher> {
    /// Create a resolver backed by HTTP with the configured timeouts
    pub fn new(config: &DownloadConfig) -> Result<Self, ArtifactError> {
        Ok(Self::with_fetcher(HttpFetcher::new(config)?))
    }
}

impl<F: ArtifactFetcher> ArtifactResolver<F> {
    pub fn with_fetcher(fetcher: F) -> Self {
        Self { fetcher }
    }

    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }

    /// Resolve a configured artifact
    pub async fn ensure_artifact(
        &self,
        artifact: &ModelArtifact,
    ) -> Result<ArtifactOutcome, ArtifactError> {
        self.ensure_available(&artifact.path, artifact.source_url.as_deref())
            .await
    }

    /// Make sure a file exists at `local_path`, downloading it from
    /// `remote_url` if needed.
    ///
    /// Fails only with [`ArtifactError::Missing`] when the file is absent
    /// and no URL is configured. Download failures are logged at warn level
    /// and reported as [`ArtifactOutcome::Unavailable`].
    pub async fn ensure_available(
        &self,
        local_path: &Path,
        remote_url: Option<&str>,
    ) -> Result<ArtifactOutcome, ArtifactError> {
        if local_path.is_file() {
            info!(path = %local_path.display(), "Model artifact present");
            return Ok(ArtifactOutcome::AlreadyPresent);
        }

        let Some(url) = remote_url.map(str::trim).filter(|u| !u.is_empty()) else {
            return Err(ArtifactError::Missing {
                path: local_path.to_path_buf(),
            });
        };

        info!(path = %local_path.display(), url = %url, "Model artifact missing, downloading");

        if let Some(file_id) = drive::extract_file_id(url) {
            match self.fetcher.fetch_drive_file(&file_id, local_path).await {
                Ok(bytes) => {
                    info!(file_id = %file_id, bytes = bytes, "Downloaded model via shared drive");
                    return Ok(ArtifactOutcome::Downloaded {
                        strategy: FetchStrategy::SharedDrive,
                        bytes,
                    });
                }
                Err(e) => {
                    warn!(
                        file_id = %file_id,
                        error = %e,
                        "Shared drive download failed, falling back to streaming download"
                    );
                }
            }
        }

        match self.fetcher.fetch_url(url, local_path).await {
            Ok(bytes) => {
                info!(url = %url, bytes = bytes, "Downloaded model");
                Ok(ArtifactOutcome::Downloaded {
                    strategy: FetchStrategy::Streaming,
                    bytes,
                })
            }
            Err(e) => {
                warn!(
                    url = %url,
                    error = %e,
                    "Model download failed; model load will report the missing artifact"
                );
                Ok(ArtifactOutcome::Unavailable)
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use super::testing::RecordingFetcher;
    use super::*;
    use std::sync::atomic::Ordering;

    #[tokio::test]
    async fn test_present_file_makes_no_network_calls() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.onnx");
        std::fs::write(&path, b"weights").unwrap();

        let resolver = ArtifactResolver::with_fetcher(RecordingFetcher::default());
        let outcome = resolver
            .ensure_available(&path, Some("https://drive.google.com/file/d/ABC123/view"))
            .await
            .unwrap();

        assert_eq!(outcome, ArtifactOutcome::AlreadyPresent);
        assert_eq!(resolver.fetcher.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_missing_without_url_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.onnx");

        let resolver = ArtifactResolver::with_fetcher(RecordingFetcher::default());
        let result = resolver.ensure_available(&path, None).await;
        assert!(matches!(result, Err(ArtifactError::Missing { .. })));

        let result = resolver.ensure_available(&path, Some("  ")).await;
        assert!(matches!(result, Err(ArtifactError::Missing { .. })));
        assert_eq!(resolver.fetcher.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_drive_link_uses_drive_strategy() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.onnx");
        let fetcher = RecordingFetcher {
            drive_payload: Some(b"onnx-bytes".to_vec()),
            ..Default::default()
        };

        let resolver = ArtifactResolver::with_fetcher(fetcher);
        let outcome = resolver
            .ensure_available(&path, Some("https://drive.google.com/file/d/ABC123/view?usp=sharing"))
            .await
            .unwrap();

        assert_eq!(
            outcome,
            ArtifactOutcome::Downloaded {
                strategy: FetchStrategy::SharedDrive,
                bytes: 10
            }
        );
        assert_eq!(*resolver.fetcher.drive_ids.lock().unwrap(), vec!["ABC123"]);
        assert_eq!(resolver.fetcher.url_calls.load(Ordering::SeqCst), 0);
        assert!(path.is_file());
    }

    #[tokio::test]
    async fn test_drive_failure_falls_back_to_streaming() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.onnx");
        let fetcher = RecordingFetcher {
            url_payload: Some(b"streamed".to_vec()),
            ..Default::default()
        };

        let resolver = ArtifactResolver::with_fetcher(fetcher);
        let outcome = resolver
            .ensure_available(&path, Some("https://drive.google.com/uc?id=XYZ789"))
            .await
            .unwrap();

        assert_eq!(
            outcome,
            ArtifactOutcome::Downloaded {
                strategy: FetchStrategy::Streaming,
                bytes: 8
            }
        );
        assert_eq!(resolver.fetcher.drive_calls.load(Ordering::SeqCst), 1);
        assert_eq!(resolver.fetcher.url_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_plain_url_skips_drive_strategy() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.onnx");
        let fetcher = RecordingFetcher {
            url_payload: Some(b"streamed".to_vec()),
            ..Default::default()
        };

        let resolver = ArtifactResolver::with_fetcher(fetcher);
        resolver
            .ensure_available(&path, Some("https://models.example.org/plant.onnx"))
            .await
            .unwrap();

        assert_eq!(resolver.fetcher.drive_calls.load(Ordering::SeqCst), 0);
        assert_eq!(resolver.fetcher.url_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_download_failures_are_soft() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.onnx");

        let resolver = ArtifactResolver::with_fetcher(RecordingFetcher::default());
        let outcome = resolver
            .ensure_available(&path, Some("https://drive.google.com/file/d/ABC123/view"))
            .await
            .unwrap();

        assert_eq!(outcome, ArtifactOutcome::Unavailable);
        assert_eq!(resolver.fetcher.total_calls(), 2);
        assert!(!path.exists());
    }

    #[test]
    fn test_artifact_from_config_drops_blank_url() {
        let config = ModelConfig {
            url: Some("   ".to_string()),
            ..ModelConfig::default()
        };
        let artifact = ModelArtifact::from_config(&config);
        assert!(artifact.source_url.is_none());
        assert!(!artifact.present());
    }
}
