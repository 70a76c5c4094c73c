//! Database layer for profile-enrich
//!
//! Handles SQLite persistence for profile records and the progress ledger.
//!
//! ## Submodules
//!
//! Methods on [`Database`] are organized by domain:
//! - `migrations`: Database lifecycle, schema migrations
//! - `records`: Profile records and their social links ([`RecordStore`](crate::store::RecordStore))
//! - `progress`: Session counters and status ([`ProgressLedger`](crate::store::ProgressLedger))

use crate::types::{
    CandidateRecord, ProgressCounts, ProgressSnapshot, RecordId, SessionId, SessionStatus,
};
use crate::{Error, Result};
use sqlx::{FromRow, sqlite::SqlitePool};

mod migrations;
mod progress;
mod records;

/// New profile to be inserted into the database
#[derive(Debug, Clone)]
pub struct NewProfile {
    /// Display name
    pub name: String,
    /// Publication status (e.g. "published", "draft")
    pub status: String,
    /// Current image reference
    pub image_url: Option<String>,
}

/// Profile record from database
#[derive(Debug, Clone, FromRow)]
pub struct Profile {
    /// Unique database ID
    pub id: i64,
    /// Display name
    pub name: String,
    /// Publication status
    pub status: String,
    /// Current image reference
    pub image_url: Option<String>,
    /// Unix timestamp of the last update
    pub updated_at: i64,
}

/// Candidate row as selected for a batch (raw from SQLite)
#[derive(Debug, Clone, FromRow)]
pub struct CandidateRow {
    /// Profile ID
    pub id: i64,
    /// Display name
    pub name: String,
    /// Current image reference
    pub image_url: Option<String>,
    /// Lowest profile URL on the selected platform
    pub source_url: String,
}

impl From<CandidateRow> for CandidateRecord {
    fn from(row: CandidateRow) -> Self {
        CandidateRecord {
            id: RecordId(row.id),
            name: row.name,
            artifact_ref: row.image_url,
            source_url: row.source_url,
        }
    }
}

/// Progress ledger row (raw from SQLite)
#[derive(Debug, Clone, FromRow)]
pub struct ProgressRow {
    /// Session ID
    pub session_id: String,
    /// Candidates in the batch
    pub total_profiles: i64,
    /// Records handled so far
    pub processed: i64,
    /// Successful records
    pub success: i64,
    /// Failed records
    pub failed: i64,
    /// Skipped or rate-limit deferred records
    pub skipped: i64,
    /// Challenge-deferred records
    pub challenge: i64,
    /// Session status string
    pub status: String,
    /// Unix timestamp when the session (re)started
    pub started_at: i64,
    /// Unix timestamp of the last counter update
    pub updated_at: i64,
    /// Unix timestamp when the session was finalized
    pub completed_at: Option<i64>,
}

impl TryFrom<ProgressRow> for ProgressSnapshot {
    type Error = Error;

    fn try_from(row: ProgressRow) -> Result<Self> {
        use chrono::{TimeZone, Utc};

        let timestamp = |secs: i64| Utc.timestamp_opt(secs, 0).single().unwrap_or_else(Utc::now);
        let count = |value: i64| u64::try_from(value).unwrap_or(0);

        Ok(ProgressSnapshot {
            session_id: SessionId::new(row.session_id),
            counts: ProgressCounts {
                total: count(row.total_profiles),
                processed: count(row.processed),
                success: count(row.success),
                failed: count(row.failed),
                skipped: count(row.skipped),
                challenge: count(row.challenge),
            },
            status: row.status.parse::<SessionStatus>()?,
            started_at: timestamp(row.started_at),
            updated_at: timestamp(row.updated_at),
            completed_at: row.completed_at.map(timestamp),
        })
    }
}

/// Database handle for profile-enrich
pub struct Database {
    pool: SqlitePool,
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;
