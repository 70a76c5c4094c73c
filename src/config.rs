//! Configuration types for profile-enrich

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration
///
/// Every section has sensible defaults, so an empty JSON object (`{}`) is a
/// valid configuration file that stores artifacts on the local filesystem.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Database location and session housekeeping
    #[serde(default)]
    pub persistence: PersistenceConfig,

    /// Which records are candidates for enrichment
    #[serde(default)]
    pub selection: SelectionConfig,

    /// Upstream profile source
    #[serde(default)]
    pub source: SourceConfig,

    /// Where fetched images end up
    #[serde(default)]
    pub artifacts: ArtifactConfig,

    /// Delays between records
    #[serde(default)]
    pub pacing: PacingConfig,

    /// Handling of rate-limited fetches
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
}

impl Config {
    /// Load a JSON configuration file
    ///
    /// Only the shape is checked here. Call [`Config::validate`] before
    /// building a pipeline from the result.
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| Error::Config {
            message: format!("failed to read {}: {}", path.display(), e),
            key: None,
        })?;
        let config: Config = serde_json::from_str(&raw)?;
        Ok(config)
    }

    /// Reject settings the pipeline cannot honor
    pub fn validate(&self) -> Result<()> {
        if self.selection.status.trim().is_empty() {
            return Err(Error::config("selection.status", "must not be empty"));
        }
        if self.selection.platform.trim().is_empty() {
            return Err(Error::config("selection.platform", "must not be empty"));
        }

        url::Url::parse(&self.source.base_url).map_err(|e| {
            Error::config("source.base_url", format!("invalid URL: {}", e))
        })?;
        if self.source.user_agents.is_empty() {
            return Err(Error::config(
                "source.user_agents",
                "at least one user agent is required",
            ));
        }

        self.pacing.validate()?;

        match &self.artifacts {
            ArtifactConfig::Cloudinary(c) => {
                for (key, value) in [
                    ("artifacts.cloud_name", &c.cloud_name),
                    ("artifacts.api_key", &c.api_key),
                    ("artifacts.api_secret", &c.api_secret),
                ] {
                    if value.trim().is_empty() {
                        return Err(Error::config(key, "must not be empty"));
                    }
                }
                if c.width == 0 || c.height == 0 {
                    return Err(Error::config(
                        "artifacts.width",
                        "crop dimensions must be positive",
                    ));
                }
            }
            ArtifactConfig::Local(l) => {
                if l.public_base.trim().is_empty() {
                    return Err(Error::config("artifacts.public_base", "must not be empty"));
                }
            }
        }

        Ok(())
    }
}

/// Database location and session housekeeping
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// Database path (default: "./profile-enrich.db")
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,

    /// Sessions still `in_progress` without an update for this long are
    /// considered abandoned and marked `interrupted` at startup (default: 1 hour)
    #[serde(default = "default_stale_session_after", with = "duration_serde")]
    pub stale_session_after: Duration,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            stale_session_after: default_stale_session_after(),
        }
    }
}

/// Candidate selection filters
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SelectionConfig {
    /// Required profile status (default: "published")
    #[serde(default = "default_status")]
    pub status: String,

    /// Social link platform to read the source URL from (default: "instagram")
    #[serde(default = "default_platform")]
    pub platform: String,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            status: default_status(),
            platform: default_platform(),
        }
    }
}

/// Upstream profile source
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Base URL of the source site (default: "https://www.instagram.com")
    #[serde(default = "default_source_base_url")]
    pub base_url: String,

    /// Web application id sent with profile lookups
    #[serde(default = "default_app_id")]
    pub app_id: String,

    /// Pre-authenticated session cookie value (None = anonymous)
    #[serde(default)]
    pub session_id: Option<String>,

    /// User agents rotated across requests
    #[serde(default = "default_user_agents")]
    pub user_agents: Vec<String>,

    /// Per-request timeout (default: 15 seconds)
    #[serde(default = "default_source_timeout", with = "duration_serde")]
    pub timeout: Duration,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            base_url: default_source_base_url(),
            app_id: default_app_id(),
            session_id: None,
            user_agents: default_user_agents(),
            timeout: default_source_timeout(),
        }
    }
}

/// Artifact store backend
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "snake_case")]
pub enum ArtifactConfig {
    /// Hosted image service with signed uploads
    Cloudinary(CloudinaryConfig),
    /// Files on local disk served under a public prefix
    Local(LocalStoreConfig),
}

impl Default for ArtifactConfig {
    fn default() -> Self {
        ArtifactConfig::Local(LocalStoreConfig::default())
    }
}

/// Hosted image service settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CloudinaryConfig {
    /// Account (cloud) name
    pub cloud_name: String,

    /// API key
    pub api_key: String,

    /// API secret used to sign uploads
    pub api_secret: String,

    /// Folder uploads are placed in (default: "profile-images")
    #[serde(default = "default_folder")]
    pub folder: String,

    /// Upload API base URL
    #[serde(default = "default_cloudinary_api_base")]
    pub api_base: String,

    /// Host that serves delivered artifacts; part of the artifact marker
    #[serde(default = "default_delivery_host")]
    pub delivery_host: String,

    /// Crop width in pixels (default: 500)
    #[serde(default = "default_crop_size")]
    pub width: u32,

    /// Crop height in pixels (default: 500)
    #[serde(default = "default_crop_size")]
    pub height: u32,

    /// Quality directive (default: "auto:best")
    #[serde(default = "default_quality")]
    pub quality: String,

    /// Upload request timeout (default: 60 seconds)
    #[serde(default = "default_upload_timeout", with = "duration_serde")]
    pub timeout: Duration,
}

/// Local filesystem store settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LocalStoreConfig {
    /// Directory images are written to (default: "./uploads/profile-images")
    #[serde(default = "default_local_directory")]
    pub directory: PathBuf,

    /// Public URL prefix for stored files; part of the artifact marker
    #[serde(default = "default_public_base")]
    pub public_base: String,

    /// File name prefix (default: "profile")
    #[serde(default = "default_file_prefix")]
    pub file_prefix: String,

    /// User agent sent when downloading images
    #[serde(default = "default_download_user_agent")]
    pub user_agent: String,

    /// Referer sent when downloading images; the image CDN rejects bare requests
    #[serde(default = "default_download_referer")]
    pub referer: String,

    /// Image download timeout (default: 30 seconds)
    #[serde(default = "default_download_timeout", with = "duration_serde")]
    pub timeout: Duration,
}

impl Default for LocalStoreConfig {
    fn default() -> Self {
        Self {
            directory: default_local_directory(),
            public_base: default_public_base(),
            file_prefix: default_file_prefix(),
            user_agent: default_download_user_agent(),
            referer: default_download_referer(),
            timeout: default_download_timeout(),
        }
    }
}

/// Inter-record pacing
///
/// Durations are expressed in milliseconds in the configuration file.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PacingConfig {
    /// Delay after an ordinary outcome (default: 5 seconds)
    #[serde(default = "default_baseline", with = "duration_millis_serde")]
    pub baseline: Duration,

    /// Delay after a challenge wall (default: 30 seconds)
    #[serde(default = "default_after_challenge", with = "duration_millis_serde")]
    pub after_challenge: Duration,

    /// Backoff after rate limiting, also used before the built-in retry
    /// (default: 60 seconds)
    #[serde(default = "default_after_rate_limit", with = "duration_millis_serde")]
    pub after_rate_limit: Duration,

    /// Uniform jitter added to every delay, as a fraction of it (default: 0.2)
    #[serde(default = "default_jitter_ratio")]
    pub jitter_ratio: f64,

    /// Take a cool-down pause after every N processed records (None = never)
    #[serde(default = "default_cooldown_every")]
    pub cooldown_every: Option<u32>,

    /// Length of the cool-down pause (default: 30 seconds)
    #[serde(default = "default_cooldown", with = "duration_millis_serde")]
    pub cooldown: Duration,
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            baseline: default_baseline(),
            after_challenge: default_after_challenge(),
            after_rate_limit: default_after_rate_limit(),
            jitter_ratio: default_jitter_ratio(),
            cooldown_every: default_cooldown_every(),
            cooldown: default_cooldown(),
        }
    }
}

impl PacingConfig {
    fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.jitter_ratio) {
            return Err(Error::config(
                "pacing.jitter_ratio",
                "must be between 0.0 and 1.0",
            ));
        }
        if self.cooldown_every == Some(0) {
            return Err(Error::config(
                "pacing.cooldown_every",
                "must be at least 1 when set",
            ));
        }

        // The tiers must stay distinguishable even when the baseline gets its
        // maximum jitter.
        let baseline_ceiling = self.baseline.as_secs_f64() * (1.0 + self.jitter_ratio);
        if self.after_challenge.as_secs_f64() <= baseline_ceiling {
            return Err(Error::config(
                "pacing.after_challenge",
                "must exceed the jittered baseline delay",
            ));
        }
        if self.after_rate_limit.as_secs_f64() <= baseline_ceiling {
            return Err(Error::config(
                "pacing.after_rate_limit",
                "must exceed the jittered baseline delay",
            ));
        }
        Ok(())
    }
}

/// Rate-limit retry policy
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Retries of the same record after a rate-limit backoff (default: 1)
    ///
    /// A record still rate limited after the last retry is deferred, never
    /// failed, so a later pass picks it up again.
    #[serde(default = "default_rate_limit_retries")]
    pub retries: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            retries: default_rate_limit_retries(),
        }
    }
}

fn default_database_path() -> PathBuf {
    PathBuf::from("./profile-enrich.db")
}

fn default_stale_session_after() -> Duration {
    Duration::from_secs(3600)
}

fn default_status() -> String {
    "published".to_string()
}

fn default_platform() -> String {
    "instagram".to_string()
}

fn default_source_base_url() -> String {
    "https://www.instagram.com".to_string()
}

fn default_app_id() -> String {
    "936619743392459".to_string()
}

fn default_user_agents() -> Vec<String> {
    vec![
        "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36".to_string(),
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36".to_string(),
    ]
}

fn default_source_timeout() -> Duration {
    Duration::from_secs(15)
}

fn default_folder() -> String {
    "profile-images".to_string()
}

fn default_cloudinary_api_base() -> String {
    "https://api.cloudinary.com".to_string()
}

fn default_delivery_host() -> String {
    "res.cloudinary.com".to_string()
}

fn default_crop_size() -> u32 {
    500
}

fn default_quality() -> String {
    "auto:best".to_string()
}

fn default_upload_timeout() -> Duration {
    Duration::from_secs(60)
}

fn default_local_directory() -> PathBuf {
    PathBuf::from("./uploads/profile-images")
}

fn default_public_base() -> String {
    "/uploads/profile-images".to_string()
}

fn default_file_prefix() -> String {
    "profile".to_string()
}

fn default_download_user_agent() -> String {
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36".to_string()
}

fn default_download_referer() -> String {
    "https://www.instagram.com/".to_string()
}

fn default_download_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_baseline() -> Duration {
    Duration::from_secs(5)
}

fn default_after_challenge() -> Duration {
    Duration::from_secs(30)
}

fn default_after_rate_limit() -> Duration {
    Duration::from_secs(60)
}

fn default_jitter_ratio() -> f64 {
    0.2
}

fn default_cooldown_every() -> Option<u32> {
    Some(20)
}

fn default_cooldown() -> Duration {
    Duration::from_secs(30)
}

fn default_rate_limit_retries() -> u32 {
    1
}

// Duration serialization helper (whole seconds)
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

// Duration serialization helper (milliseconds)
mod duration_millis_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn empty_object_yields_defaults() {
        let config: Config = serde_json::from_str("{}").expect("deserialize failed");
        assert_eq!(config.selection.status, "published");
        assert_eq!(config.selection.platform, "instagram");
        assert_eq!(config.pacing.baseline, Duration::from_secs(5));
        assert_eq!(config.pacing.after_rate_limit, Duration::from_secs(60));
        assert_eq!(config.rate_limit.retries, 1);
        assert!(matches!(config.artifacts, ArtifactConfig::Local(_)));
        config.validate().expect("defaults must validate");
    }

    #[test]
    fn pacing_durations_are_read_as_milliseconds() {
        let json = r#"{"pacing": {"baseline": 250, "after_challenge": 1000, "after_rate_limit": 2000}}"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.pacing.baseline, Duration::from_millis(250));
        assert_eq!(config.pacing.after_challenge, Duration::from_secs(1));
        assert_eq!(config.pacing.after_rate_limit, Duration::from_secs(2));
    }

    #[test]
    fn cloudinary_backend_is_selected_by_tag() {
        let json = r#"{
            "artifacts": {
                "backend": "cloudinary",
                "cloud_name": "demo",
                "api_key": "key",
                "api_secret": "secret"
            }
        }"#;
        let config: Config = serde_json::from_str(json).unwrap();
        match &config.artifacts {
            ArtifactConfig::Cloudinary(c) => {
                assert_eq!(c.cloud_name, "demo");
                assert_eq!(c.folder, "profile-images");
                assert_eq!(c.width, 500);
                assert_eq!(c.quality, "auto:best");
            }
            other => panic!("expected cloudinary backend, got {other:?}"),
        }
        config.validate().unwrap();
    }

    #[test]
    fn challenge_delay_must_exceed_jittered_baseline() {
        let mut config = Config::default();
        config.pacing.baseline = Duration::from_secs(10);
        config.pacing.jitter_ratio = 0.5;
        config.pacing.after_challenge = Duration::from_secs(15);

        match config.validate() {
            Err(Error::Config { key, .. }) => {
                assert_eq!(key.as_deref(), Some("pacing.after_challenge"));
            }
            other => panic!("expected config error, got {other:?}"),
        }
    }

    #[test]
    fn rate_limit_delay_must_exceed_baseline() {
        let mut config = Config::default();
        config.pacing.jitter_ratio = 0.0;
        config.pacing.after_rate_limit = config.pacing.baseline;

        match config.validate() {
            Err(Error::Config { key, .. }) => {
                assert_eq!(key.as_deref(), Some("pacing.after_rate_limit"));
            }
            other => panic!("expected config error, got {other:?}"),
        }
    }

    #[test]
    fn zero_cooldown_interval_is_rejected() {
        let mut config = Config::default();
        config.pacing.cooldown_every = Some(0);
        assert!(matches!(config.validate(), Err(Error::Config { .. })));
    }

    #[test]
    fn empty_cloudinary_secret_is_rejected() {
        let json = r#"{"artifacts": {"backend": "cloudinary", "cloud_name": "demo", "api_key": "k", "api_secret": " "}}"#;
        let config: Config = serde_json::from_str(json).unwrap();
        match config.validate() {
            Err(Error::Config { key, .. }) => {
                assert_eq!(key.as_deref(), Some("artifacts.api_secret"));
            }
            other => panic!("expected config error, got {other:?}"),
        }
    }

    #[test]
    fn invalid_base_url_is_rejected() {
        let mut config = Config::default();
        config.source.base_url = "not a url".into();
        assert!(matches!(config.validate(), Err(Error::Config { .. })));
    }

    #[test]
    fn from_file_loads_with_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"selection": {{"platform": "tiktok"}}, "rate_limit": {{"retries": 0}}}}"#
        )
        .unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.selection.platform, "tiktok");
        assert_eq!(config.selection.status, "published");
        assert_eq!(config.rate_limit.retries, 0);
    }

    #[test]
    fn from_file_reports_missing_file_as_config_error() {
        let result = Config::from_file(Path::new("/definitely/not/here.json"));
        assert!(matches!(result, Err(Error::Config { key: None, .. })));
    }

    #[test]
    fn from_file_reports_malformed_json_as_serialization_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"selection": "#).unwrap();

        let result = Config::from_file(file.path());
        assert!(matches!(result, Err(Error::Serialization(_))));
    }

    #[test]
    fn from_file_leaves_store_credentials_to_validate() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"artifacts": {{"backend": "cloudinary", "cloud_name": "", "api_key": "", "api_secret": ""}}}}"#
        )
        .unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert!(matches!(config.artifacts, ArtifactConfig::Cloudinary(_)));
        assert!(matches!(config.validate(), Err(Error::Config { .. })));
    }

    #[test]
    fn duration_serde_rejects_negative_integer() {
        let json = r#"{"persistence": {"stale_session_after": -5}}"#;
        assert!(serde_json::from_str::<Config>(json).is_err());
    }
}
