//! Persistence seams used by the pipeline
//!
//! [`RecordStore`] owns the profile records, [`ProgressLedger`] owns the
//! per-session counters. [`Database`](crate::db::Database) implements both;
//! tests substitute in-memory fakes.

use crate::error::Result;
use crate::types::{BatchWindow, CandidateRecord, ProgressCounts, RecordId, SessionId, SessionStatus};
use async_trait::async_trait;

/// Filters selecting the records a batch works on
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CandidateQuery {
    /// Required record status (e.g. "published")
    pub status: String,
    /// Social platform the source URL is read from (e.g. "instagram")
    pub platform: String,
    /// Slice of the id-ordered candidate list
    pub window: BatchWindow,
}

/// Source of candidate records and sink for their new artifact reference
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// List eligible records in ascending id order, restricted to the window
    ///
    /// A record with several links on the platform appears once, carrying
    /// the lowest URL.
    async fn list_candidates(&self, query: &CandidateQuery) -> Result<Vec<CandidateRecord>>;

    /// Point a record at its new artifact
    ///
    /// # Errors
    /// Fails when the record does not exist.
    async fn update_artifact(&self, id: RecordId, artifact_url: &str) -> Result<()>;
}

/// Durable, session-scoped progress counters
///
/// All three operations are upserts keyed by session id.
#[async_trait]
pub trait ProgressLedger: Send + Sync {
    /// Create (or restart) a session row in `in_progress` with zeroed counters
    async fn init(&self, session: &SessionId, total: u64) -> Result<()>;

    /// Store the latest counters; a write carrying fewer processed records
    /// than the stored row is ignored
    async fn update(&self, session: &SessionId, counts: &ProgressCounts) -> Result<()>;

    /// Finalize a session; sessions already in a terminal status are left alone
    async fn complete(&self, session: &SessionId, status: SessionStatus) -> Result<()>;
}
