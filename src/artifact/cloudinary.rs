//! Hosted image service store with signed uploads

use super::traits::{ArtifactStore, sanitize_hint};
use crate::config::CloudinaryConfig;
use crate::error::{Error, Result, UploadError};
use crate::fetch::ImageRef;
use async_trait::async_trait;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tracing::{debug, info};

#[derive(Debug, Deserialize)]
struct UploadResponse {
    secure_url: Option<String>,
    error: Option<UploadErrorBody>,
}

#[derive(Debug, Deserialize)]
struct UploadErrorBody {
    message: String,
}

/// Store that hands the remote image URL to a hosted image service
///
/// The service fetches the image itself and applies a fixed face-centred
/// square crop, so no bytes pass through this process.
pub struct CloudinaryStore {
    client: reqwest::Client,
    config: CloudinaryConfig,
}

impl CloudinaryStore {
    /// Create a store from its configuration
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be created
    pub fn new(config: CloudinaryConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| Error::Other(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self { client, config })
    }

    fn transformation(&self) -> String {
        format!(
            "c_fill,g_face,h_{},w_{}/q_{}",
            self.config.height, self.config.width, self.config.quality
        )
    }

    fn upload_url(&self) -> String {
        format!(
            "{}/v1_1/{}/image/upload",
            self.config.api_base.trim_end_matches('/'),
            self.config.cloud_name
        )
    }

    /// Signed parameters in the order the service expects them to be hashed
    fn signed_params(&self, public_id: &str, timestamp: i64) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("folder", self.config.folder.clone()),
            ("public_id", public_id.to_string()),
            ("timestamp", timestamp.to_string()),
            ("transformation", self.transformation()),
        ];
        params.sort_by(|a, b| a.0.cmp(b.0));
        params
    }

    fn sign(&self, params: &[(&'static str, String)]) -> String {
        let payload = params
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("&");
        let mut hasher = Sha256::new();
        hasher.update(payload.as_bytes());
        hasher.update(self.config.api_secret.as_bytes());
        format!("{:x}", hasher.finalize())
    }
}

#[async_trait]
impl ArtifactStore for CloudinaryStore {
    async fn store(&self, image: &ImageRef, naming_hint: &str) -> Result<String> {
        let timestamp = chrono::Utc::now().timestamp();
        let public_id = format!("profile_{}_{}", sanitize_hint(naming_hint), timestamp);

        let signed = self.signed_params(&public_id, timestamp);
        let signature = self.sign(&signed);

        let mut form: Vec<(&str, String)> = signed;
        form.push(("file", image.as_str().to_string()));
        form.push(("api_key", self.config.api_key.clone()));
        form.push(("signature", signature));
        form.push(("signature_algorithm", "sha256".to_string()));

        debug!(public_id = %public_id, "uploading image to hosted store");

        let response = self
            .client
            .post(self.upload_url())
            .form(&form)
            .send()
            .await
            .map_err(|e| UploadError::Download {
                url: image.as_str().to_string(),
                reason: format!("upload request failed: {}", e),
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| UploadError::InvalidResponse(format!("unreadable body: {}", e)))?;
        let parsed: Option<UploadResponse> = serde_json::from_str(&body).ok();

        if !status.is_success() {
            let message = parsed
                .and_then(|r| r.error)
                .map(|e| e.message)
                .unwrap_or(body);
            return Err(UploadError::Rejected {
                status: status.as_u16(),
                message,
            }
            .into());
        }

        let url = parsed
            .and_then(|r| r.secure_url)
            .filter(|u| !u.is_empty())
            .ok_or_else(|| UploadError::InvalidResponse("missing secure_url".to_string()))?;

        info!(public_id = %public_id, url = %url, "image uploaded");
        Ok(url)
    }

    fn is_own_artifact(&self, reference: &str) -> bool {
        let Ok(parsed) = url::Url::parse(reference) else {
            return false;
        };
        let account_prefix = format!("/{}/", self.config.cloud_name);
        parsed.host_str() == Some(self.config.delivery_host.as_str())
            && parsed.path().starts_with(&account_prefix)
    }

    fn name(&self) -> &'static str {
        "cloudinary"
    }
}
