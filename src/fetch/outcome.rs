//! Fetch outcome taxonomy

use serde::{Deserialize, Serialize};

/// Reference to a remote image (its URL)
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ImageRef(String);

impl ImageRef {
    /// Wrap an image URL
    pub fn new(url: impl Into<String>) -> Self {
        Self(url.into())
    }

    /// Borrow the URL
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ImageRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Classified result of one fetch attempt
///
/// The pipeline's retry and pacing policy is keyed entirely on these variants.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FetchOutcome {
    /// High-resolution image located
    Success(ImageRef),
    /// Profile does not exist, is private, or has no picture
    NotFound,
    /// Upstream demands an anti-automation challenge
    ChallengeRequired,
    /// The session credential is no longer accepted
    AuthExpired,
    /// Upstream throttled the request
    RateLimited,
    /// Connection-level failure (timeout, DNS, reset, gateway)
    TransientError(String),
    /// Anything else
    PermanentError(String),
}

impl FetchOutcome {
    /// Short label used in logs
    pub fn label(&self) -> &'static str {
        match self {
            FetchOutcome::Success(_) => "success",
            FetchOutcome::NotFound => "not_found",
            FetchOutcome::ChallengeRequired => "challenge_required",
            FetchOutcome::AuthExpired => "auth_expired",
            FetchOutcome::RateLimited => "rate_limited",
            FetchOutcome::TransientError(_) => "transient_error",
            FetchOutcome::PermanentError(_) => "permanent_error",
        }
    }

    /// Classify a transport-level `reqwest` failure
    pub fn from_transport_error(err: &reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() || err.is_request() || err.is_body() {
            FetchOutcome::TransientError(err.to_string())
        } else {
            FetchOutcome::PermanentError(err.to_string())
        }
    }

    /// Classify a non-success HTTP response from its status and body text
    ///
    /// Body markers win over the bare status code, because the upstream
    /// reports challenges and expired logins with generic 400/403 codes.
    pub fn from_error_response(status: u16, body: &str) -> Self {
        if let Some(outcome) = Self::from_body_markers(body) {
            return outcome;
        }
        match status {
            401 => FetchOutcome::AuthExpired,
            404 | 410 => FetchOutcome::NotFound,
            429 => FetchOutcome::RateLimited,
            408 | 502 | 503 | 504 => {
                FetchOutcome::TransientError(format!("upstream returned HTTP {status}"))
            }
            _ => FetchOutcome::PermanentError(format!("upstream returned HTTP {status}")),
        }
    }

    /// Recognize upstream signals embedded in a response body
    pub fn from_body_markers(body: &str) -> Option<Self> {
        let lower = body.to_ascii_lowercase();
        if lower.contains("checkpoint_required") || lower.contains("challenge_required") {
            Some(FetchOutcome::ChallengeRequired)
        } else if lower.contains("login_required") {
            Some(FetchOutcome::AuthExpired)
        } else if lower.contains("please wait a few minutes")
            || lower.contains("too many requests")
            || lower.contains("rate limit")
        {
            Some(FetchOutcome::RateLimited)
        } else if lower.contains("user not found") || lower.contains("user_not_found") {
            Some(FetchOutcome::NotFound)
        } else {
            None
        }
    }

    /// Classify a redirect by where it points
    ///
    /// The upstream answers expired sessions with a redirect to its login page
    /// and challenges with a redirect to a challenge page.
    pub fn from_redirect(location: &str) -> Self {
        let lower = location.to_ascii_lowercase();
        if lower.contains("/challenge") || lower.contains("/checkpoint") {
            FetchOutcome::ChallengeRequired
        } else if lower.contains("/accounts/login") {
            FetchOutcome::AuthExpired
        } else {
            FetchOutcome::PermanentError(format!("unexpected redirect to {location}"))
        }
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_map_to_taxonomy() {
        assert_eq!(FetchOutcome::from_error_response(404, ""), FetchOutcome::NotFound);
        assert_eq!(
            FetchOutcome::from_error_response(429, ""),
            FetchOutcome::RateLimited
        );
        assert_eq!(
            FetchOutcome::from_error_response(401, ""),
            FetchOutcome::AuthExpired
        );
        assert!(matches!(
            FetchOutcome::from_error_response(503, ""),
            FetchOutcome::TransientError(_)
        ));
        assert!(matches!(
            FetchOutcome::from_error_response(418, ""),
            FetchOutcome::PermanentError(_)
        ));
    }

    #[test]
    fn body_markers_override_status() {
        let body = r#"{"message":"challenge_required","status":"fail"}"#;
        assert_eq!(
            FetchOutcome::from_error_response(400, body),
            FetchOutcome::ChallengeRequired
        );

        let body = r#"{"message":"login_required","status":"fail"}"#;
        assert_eq!(
            FetchOutcome::from_error_response(403, body),
            FetchOutcome::AuthExpired
        );

        let body = r#"{"message":"Please wait a few minutes before you try again.","status":"fail"}"#;
        assert_eq!(
            FetchOutcome::from_error_response(400, body),
            FetchOutcome::RateLimited
        );
    }

    #[test]
    fn checkpoint_is_a_challenge() {
        assert_eq!(
            FetchOutcome::from_body_markers(r#"{"message":"checkpoint_required"}"#),
            Some(FetchOutcome::ChallengeRequired)
        );
        assert_eq!(FetchOutcome::from_body_markers("all good"), None);
    }

    #[test]
    fn redirects_are_classified_by_location() {
        assert_eq!(
            FetchOutcome::from_redirect("https://www.instagram.com/accounts/login/?next=/api"),
            FetchOutcome::AuthExpired
        );
        assert_eq!(
            FetchOutcome::from_redirect("https://www.instagram.com/challenge/?next=/"),
            FetchOutcome::ChallengeRequired
        );
        assert!(matches!(
            FetchOutcome::from_redirect("https://elsewhere.example/"),
            FetchOutcome::PermanentError(_)
        ));
    }

    #[test]
    fn labels_are_stable() {
        assert_eq!(FetchOutcome::RateLimited.label(), "rate_limited");
        assert_eq!(
            FetchOutcome::Success(ImageRef::new("https://cdn/x.jpg")).label(),
            "success"
        );
    }
}
