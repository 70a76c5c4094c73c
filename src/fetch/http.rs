//! HTTP fetch provider backed by the source's web profile endpoint

use super::outcome::{FetchOutcome, ImageRef};
use super::traits::FetchProvider;
use crate::config::SourceConfig;
use crate::error::{Error, Result};
use crate::extract::Identifier;
use async_trait::async_trait;
use rand::seq::SliceRandom;
use regex::Regex;
use reqwest::header::{ACCEPT, COOKIE, LOCATION, USER_AGENT};
use serde::Deserialize;
use tracing::debug;

const PROFILE_INFO_PATH: &str = "/api/v1/users/web_profile_info/";

#[derive(Debug, Deserialize)]
struct ProfileEnvelope {
    data: Option<ProfileData>,
    status: Option<String>,
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProfileData {
    user: Option<ProfileUser>,
}

#[derive(Debug, Deserialize)]
struct ProfileUser {
    profile_pic_url_hd: Option<String>,
    profile_pic_url: Option<String>,
}

impl ProfileUser {
    fn best_picture(self) -> Option<String> {
        self.profile_pic_url_hd
            .filter(|u| !u.is_empty())
            .or(self.profile_pic_url.filter(|u| !u.is_empty()))
    }
}

/// Fetch provider that queries the source's web profile API
///
/// - Sends the configured app id, a rotating user agent, and the session cookie
///   when one is configured.
/// - Does not follow redirects: a redirect to the login page means the session
///   expired, a redirect to a challenge page means a challenge wall.
/// - Falls back to scanning HTML pages for embedded picture URLs when the
///   endpoint answers with markup instead of JSON.
pub struct HttpFetchProvider {
    client: reqwest::Client,
    config: SourceConfig,
    hd_pattern: Regex,
    regular_pattern: Regex,
}

impl HttpFetchProvider {
    /// Create a provider from the source configuration
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be created
    pub fn new(config: SourceConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| Error::Other(format!("Failed to create HTTP client: {}", e)))?;

        let hd_pattern = Regex::new(r#""profile_pic_url_hd"\s*:\s*"((?:[^"\\]|\\.)+)""#)
            .map_err(|e| Error::Other(format!("Invalid picture pattern: {}", e)))?;
        let regular_pattern = Regex::new(r#""profile_pic_url"\s*:\s*"((?:[^"\\]|\\.)+)""#)
            .map_err(|e| Error::Other(format!("Invalid picture pattern: {}", e)))?;

        Ok(Self {
            client,
            config,
            hd_pattern,
            regular_pattern,
        })
    }

    fn user_agent(&self) -> &str {
        self.config
            .user_agents
            .choose(&mut rand::thread_rng())
            .map(String::as_str)
            .unwrap_or("profile-enrich")
    }

    fn classify_body(&self, body: &str) -> FetchOutcome {
        match serde_json::from_str::<ProfileEnvelope>(body) {
            Ok(envelope) => {
                if envelope.status.as_deref() == Some("fail") {
                    return FetchOutcome::from_body_markers(body).unwrap_or_else(|| {
                        FetchOutcome::PermanentError(
                            envelope
                                .message
                                .unwrap_or_else(|| "upstream reported failure".to_string()),
                        )
                    });
                }
                match envelope
                    .data
                    .and_then(|d| d.user)
                    .and_then(ProfileUser::best_picture)
                {
                    Some(url) => FetchOutcome::Success(ImageRef::new(url)),
                    None => FetchOutcome::NotFound,
                }
            }
            Err(_) => {
                if let Some(url) = self.embedded_picture(body) {
                    return FetchOutcome::Success(ImageRef::new(url));
                }
                FetchOutcome::from_body_markers(body).unwrap_or_else(|| {
                    FetchOutcome::PermanentError("unrecognized profile response".to_string())
                })
            }
        }
    }

    /// Pull a picture URL out of JSON embedded in an HTML page
    fn embedded_picture(&self, body: &str) -> Option<String> {
        [&self.hd_pattern, &self.regular_pattern]
            .into_iter()
            .filter_map(|pattern| pattern.captures(body))
            .filter_map(|caps| caps.get(1))
            .find_map(|raw| unescape_json_string(raw.as_str()))
    }
}

/// Decode a JSON string literal body (`&`, `\/`, ...)
fn unescape_json_string(raw: &str) -> Option<String> {
    serde_json::from_str::<String>(&format!("\"{}\"", raw))
        .ok()
        .filter(|s| !s.is_empty())
}

#[async_trait]
impl FetchProvider for HttpFetchProvider {
    async fn fetch_high_res(&self, identifier: &Identifier) -> FetchOutcome {
        let url = format!(
            "{}{}",
            self.config.base_url.trim_end_matches('/'),
            PROFILE_INFO_PATH
        );

        let mut request = self
            .client
            .get(&url)
            .query(&[("username", identifier.as_str())])
            .header(USER_AGENT, self.user_agent())
            .header("X-IG-App-ID", &self.config.app_id)
            .header(ACCEPT, "*/*");

        if let Some(session) = &self.config.session_id {
            request = request.header(COOKIE, format!("sessionid={}", session));
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => return FetchOutcome::from_transport_error(&e),
        };

        let status = response.status();
        if status.is_redirection() {
            let location = response
                .headers()
                .get(LOCATION)
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default()
                .to_string();
            debug!(identifier = %identifier, location = %location, "profile lookup redirected");
            return FetchOutcome::from_redirect(&location);
        }

        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => return FetchOutcome::from_transport_error(&e),
        };

        if !status.is_success() {
            debug!(identifier = %identifier, status = status.as_u16(), "profile lookup failed");
            return FetchOutcome::from_error_response(status.as_u16(), &body);
        }

        self.classify_body(&body)
    }

    fn name(&self) -> &'static str {
        "http"
    }
}
