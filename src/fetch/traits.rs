//! Fetch provider trait

use super::outcome::FetchOutcome;
use crate::extract::Identifier;
use async_trait::async_trait;

/// Source of high-resolution profile images
///
/// Implementations never return errors: every failure is folded into a
/// [`FetchOutcome`] variant so that the caller's dispatch stays exhaustive.
///
/// # Examples
///
/// ```no_run
/// use profile_enrich::config::SourceConfig;
/// use profile_enrich::extract::extract_identifier;
/// use profile_enrich::fetch::{FetchOutcome, FetchProvider, HttpFetchProvider};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let provider = HttpFetchProvider::new(SourceConfig::default())?;
/// let id = extract_identifier("https://www.instagram.com/someone/").unwrap();
///
/// match provider.fetch_high_res(&id).await {
///     FetchOutcome::Success(image) => println!("found {image}"),
///     other => println!("no image: {}", other.label()),
/// }
/// # Ok(())
/// # }
/// ```
#[async_trait]
pub trait FetchProvider: Send + Sync {
    /// Look up the high-resolution picture for `identifier`
    async fn fetch_high_res(&self, identifier: &Identifier) -> FetchOutcome;

    /// Human-readable name for logging
    fn name(&self) -> &'static str;
}
