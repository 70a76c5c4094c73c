//! Durable storage for fetched images
//!
//! [`ArtifactStore`] is the seam between the pipeline and wherever images end
//! up. Two backends ship with the crate:
//!
//! - [`CloudinaryStore`] hands the remote URL to a hosted image service that
//!   crops and serves it
//! - [`LocalArtifactStore`] downloads the bytes into a directory served under
//!   a public URL prefix
//!
//! Each backend owns its artifact marker ([`ArtifactStore::is_own_artifact`]),
//! derived from the shape of the URLs it returns.

mod cloudinary;
mod local;
mod traits;

pub use cloudinary::CloudinaryStore;
pub use local::LocalArtifactStore;
pub use traits::ArtifactStore;

use crate::config::ArtifactConfig;
use crate::error::Result;
use std::sync::Arc;

/// Build the configured artifact store backend
pub fn from_config(config: &ArtifactConfig) -> Result<Arc<dyn ArtifactStore>> {
    let store: Arc<dyn ArtifactStore> = match config {
        ArtifactConfig::Cloudinary(c) => Arc::new(CloudinaryStore::new(c.clone())?),
        ArtifactConfig::Local(l) => Arc::new(LocalArtifactStore::new(l.clone())?),
    };
    Ok(store)
}
