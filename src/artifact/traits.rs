//! Artifact store trait

use crate::error::Result;
use crate::fetch::ImageRef;
use async_trait::async_trait;

/// Durable home for fetched images
///
/// `store` either returns a durable URL or an error, never something in
/// between: a failed call leaves nothing the record store could link to.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Persist `image` and return its durable URL
    ///
    /// `naming_hint` is a human-readable fragment (usually the identifier)
    /// folded into the stored name.
    async fn store(&self, image: &ImageRef, naming_hint: &str) -> Result<String>;

    /// Whether `reference` was produced by this store
    ///
    /// Drives the idempotence guard: records whose current reference matches
    /// are skipped without any network call.
    fn is_own_artifact(&self, reference: &str) -> bool;

    /// Human-readable name for logging
    fn name(&self) -> &'static str;
}

/// Reduce a naming hint to characters safe in file names and public ids
pub(crate) fn sanitize_hint(hint: &str) -> String {
    let cleaned: String = hint
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_matches('.');
    if cleaned.is_empty() {
        "unnamed".to_string()
    } else {
        cleaned.to_string()
    }
}
