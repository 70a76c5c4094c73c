//! Local filesystem store

use super::traits::{ArtifactStore, sanitize_hint};
use crate::config::LocalStoreConfig;
use crate::error::{Error, Result, UploadError};
use crate::fetch::ImageRef;
use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, REFERER, USER_AGENT};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Store that downloads images and serves them from a public URL prefix
///
/// Files are written under a temporary name and renamed into place, so a
/// failed or interrupted download never leaves a file under its final name.
pub struct LocalArtifactStore {
    client: reqwest::Client,
    config: LocalStoreConfig,
}

impl LocalArtifactStore {
    /// Create a store from its configuration
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be created
    pub fn new(config: LocalStoreConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| Error::Other(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self { client, config })
    }

    fn public_prefix(&self) -> &str {
        self.config.public_base.trim_end_matches('/')
    }

    async fn download(&self, image: &ImageRef) -> std::result::Result<Vec<u8>, UploadError> {
        let failure = |reason: String| UploadError::Download {
            url: image.as_str().to_string(),
            reason,
        };

        let response = self
            .client
            .get(image.as_str())
            .header(USER_AGENT, &self.config.user_agent)
            .header(REFERER, &self.config.referer)
            .send()
            .await
            .map_err(|e| failure(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(failure(format!("HTTP {}", status.as_u16())));
        }

        if let Some(content_type) = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            && !content_type.starts_with("image/")
        {
            return Err(failure(format!("unexpected content type {}", content_type)));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| failure(format!("failed to read body: {}", e)))?;
        if bytes.is_empty() {
            return Err(failure("empty body".to_string()));
        }
        Ok(bytes.to_vec())
    }

    async fn write_atomically(&self, final_path: &Path, bytes: &[u8]) -> Result<()> {
        let storage_err = |reason: String| UploadError::Storage {
            path: final_path.to_path_buf(),
            reason,
        };

        tokio::fs::create_dir_all(&self.config.directory)
            .await
            .map_err(|e| storage_err(format!("failed to create directory: {}", e)))?;

        let temp_path = part_path(final_path);
        if let Err(e) = tokio::fs::write(&temp_path, bytes).await {
            remove_quietly(&temp_path).await;
            return Err(storage_err(format!("failed to write: {}", e)).into());
        }
        if let Err(e) = tokio::fs::rename(&temp_path, final_path).await {
            remove_quietly(&temp_path).await;
            return Err(storage_err(format!("failed to move into place: {}", e)).into());
        }
        Ok(())
    }
}

fn part_path(final_path: &Path) -> PathBuf {
    let mut name = final_path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".part");
    final_path.with_file_name(name)
}

async fn remove_quietly(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await
        && e.kind() != std::io::ErrorKind::NotFound
    {
        warn!(path = %path.display(), error = %e, "failed to clean up partial file");
    }
}

#[async_trait]
impl ArtifactStore for LocalArtifactStore {
    async fn store(&self, image: &ImageRef, naming_hint: &str) -> Result<String> {
        let bytes = self.download(image).await?;

        let file_name = format!(
            "{}_{}_{}.jpg",
            self.config.file_prefix,
            sanitize_hint(naming_hint),
            chrono::Utc::now().timestamp_millis()
        );
        let final_path = self.config.directory.join(&file_name);
        debug!(path = %final_path.display(), bytes = bytes.len(), "writing image");

        self.write_atomically(&final_path, &bytes).await?;

        let url = format!("{}/{}", self.public_prefix(), file_name);
        info!(path = %final_path.display(), url = %url, "image stored");
        Ok(url)
    }

    fn is_own_artifact(&self, reference: &str) -> bool {
        reference
            .strip_prefix(self.public_prefix())
            .is_some_and(|rest| rest.starts_with('/') && rest.len() > 1)
    }

    fn name(&self) -> &'static str {
        "local"
    }
}
