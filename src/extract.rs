//! Profile URL → identifier extraction
//!
//! Pure and total: every input yields either an [`Identifier`] or `None`,
//! never a panic and never network access.

use serde::{Deserialize, Serialize};

/// Canonical username extracted from a source profile URL
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identifier(String);

impl Identifier {
    /// Borrow the identifier as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Identifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Identifier {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Extract the username from a profile URL
///
/// Query string and fragment are ignored, trailing slashes are stripped, the
/// last path segment is percent-decoded and a leading `@` is removed.
/// Scheme-less inputs (`instagram.com/name`, `@name`) are treated as paths.
///
/// ```
/// use profile_enrich::extract::extract_identifier;
///
/// let id = extract_identifier("https://www.instagram.com/@name/?hl=en").unwrap();
/// assert_eq!(id.as_str(), "name");
/// assert!(extract_identifier("https://www.instagram.com/").is_none());
/// assert!(extract_identifier("").is_none());
/// ```
pub fn extract_identifier(url: &str) -> Option<Identifier> {
    let input = url.trim();
    if input.is_empty() {
        return None;
    }

    let path = match url::Url::parse(input) {
        Ok(parsed) if parsed.cannot_be_a_base() => return None,
        Ok(parsed) => parsed.path().to_owned(),
        Err(url::ParseError::RelativeUrlWithoutBase) => {
            let end = input.find(['?', '#']).unwrap_or(input.len());
            input[..end].to_owned()
        }
        Err(_) => return None,
    };

    let segment = path.trim_end_matches('/').rsplit('/').next()?;
    let decoded = urlencoding::decode(segment).ok()?;
    let name = decoded.trim().trim_start_matches('@');

    if name.is_empty() || name.contains(char::is_whitespace) || name.contains('/') {
        return None;
    }

    Some(Identifier(name.to_owned()))
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn id(url: &str) -> Option<String> {
        extract_identifier(url).map(|i| i.as_str().to_owned())
    }

    #[test]
    fn strips_query_and_mention_marker() {
        assert_eq!(id("https://x/@name?x=1").as_deref(), Some("name"));
    }

    #[test]
    fn empty_and_blank_inputs_yield_none() {
        assert_eq!(id(""), None);
        assert_eq!(id("   "), None);
    }

    #[test]
    fn typical_profile_urls() {
        assert_eq!(
            id("https://www.instagram.com/some.user/").as_deref(),
            Some("some.user")
        );
        assert_eq!(
            id("https://instagram.com/some_user?igsh=abc123").as_deref(),
            Some("some_user")
        );
        assert_eq!(
            id("http://instagram.com/some_user///").as_deref(),
            Some("some_user")
        );
        assert_eq!(
            id("https://www.instagram.com/some_user#top").as_deref(),
            Some("some_user")
        );
    }

    #[test]
    fn scheme_less_inputs_are_treated_as_paths() {
        assert_eq!(id("instagram.com/handle").as_deref(), Some("handle"));
        assert_eq!(id("@handle").as_deref(), Some("handle"));
        assert_eq!(id("handle?ref=bio").as_deref(), Some("handle"));
    }

    #[test]
    fn url_without_path_segment_yields_none() {
        assert_eq!(id("https://www.instagram.com"), None);
        assert_eq!(id("https://www.instagram.com/"), None);
        assert_eq!(id("https://www.instagram.com/?u=name"), None);
        assert_eq!(id("https://www.instagram.com/@"), None);
    }

    #[test]
    fn percent_escapes_are_decoded() {
        assert_eq!(
            id("https://www.instagram.com/%40encoded").as_deref(),
            Some("encoded")
        );
        assert_eq!(id("https://www.instagram.com/a%20b"), None);
        assert_eq!(id("https://www.instagram.com/%FF%FE"), None);
    }

    #[test]
    fn unparseable_inputs_yield_none() {
        assert_eq!(id("http://[::1"), None);
        assert_eq!(id("mailto:someone@example.com"), None);
        assert_eq!(id("https://"), None);
    }

    #[test]
    fn never_panics_on_odd_input() {
        let inputs = [
            "?", "#", "/", "//", "@", "@@", "?@", "/@/", "ü", "https://ü/ü", "%", "%%",
            "%zz", "a/b/c/../", "https://x:99999/name", "\u{0}", "\\\\server\\share",
            "javascript:alert(1)", "https://x/@?", "   https://x/name   ",
        ];
        for input in inputs {
            let _ = extract_identifier(input);
        }
        assert_eq!(id("   https://x/name   ").as_deref(), Some("name"));
    }
}
