//! Progress ledger: per-session counters and status.

use crate::error::DatabaseError;
use crate::store::ProgressLedger;
use crate::types::{ProgressCounts, ProgressSnapshot, SessionId, SessionStatus};
use crate::{Error, Result};
use async_trait::async_trait;
use std::time::Duration;

use super::{Database, ProgressRow};

fn to_db_count(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

impl Database {
    /// Create or restart a session with zeroed counters
    pub async fn init_session(&self, session: &SessionId, total: u64) -> Result<()> {
        let now = chrono::Utc::now().timestamp();

        sqlx::query(
            r#"
            INSERT INTO scraping_progress (
                session_id, total_profiles, processed, success, failed, skipped, challenge,
                status, started_at, updated_at, completed_at
            )
            VALUES (?, ?, 0, 0, 0, 0, 0, 'in_progress', ?, ?, NULL)
            ON CONFLICT(session_id) DO UPDATE SET
                total_profiles = excluded.total_profiles,
                processed = 0,
                success = 0,
                failed = 0,
                skipped = 0,
                challenge = 0,
                status = 'in_progress',
                started_at = excluded.started_at,
                updated_at = excluded.updated_at,
                completed_at = NULL
            "#,
        )
        .bind(session.as_str())
        .bind(to_db_count(total))
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to initialize session: {}",
                e
            )))
        })?;

        Ok(())
    }

    /// Store session counters unless the stored row is already further along
    pub async fn update_session(&self, session: &SessionId, counts: &ProgressCounts) -> Result<()> {
        let now = chrono::Utc::now().timestamp();

        sqlx::query(
            r#"
            INSERT INTO scraping_progress (
                session_id, total_profiles, processed, success, failed, skipped, challenge,
                status, started_at, updated_at, completed_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, 'in_progress', ?, ?, NULL)
            ON CONFLICT(session_id) DO UPDATE SET
                total_profiles = excluded.total_profiles,
                processed = excluded.processed,
                success = excluded.success,
                failed = excluded.failed,
                skipped = excluded.skipped,
                challenge = excluded.challenge,
                updated_at = excluded.updated_at
            WHERE excluded.processed >= scraping_progress.processed
            "#,
        )
        .bind(session.as_str())
        .bind(to_db_count(counts.total))
        .bind(to_db_count(counts.processed))
        .bind(to_db_count(counts.success))
        .bind(to_db_count(counts.failed))
        .bind(to_db_count(counts.skipped))
        .bind(to_db_count(counts.challenge))
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to update session progress: {}",
                e
            )))
        })?;

        Ok(())
    }

    /// Move a non-terminal session into a terminal status
    ///
    /// Returns false when the session was already finalized.
    pub async fn complete_session(
        &self,
        session: &SessionId,
        status: SessionStatus,
    ) -> Result<bool> {
        if !status.is_terminal() {
            return Err(Error::Other(format!(
                "cannot complete session {} with non-terminal status {}",
                session, status
            )));
        }

        let now = chrono::Utc::now().timestamp();

        let result = sqlx::query(
            r#"
            INSERT INTO scraping_progress (session_id, status, started_at, updated_at, completed_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(session_id) DO UPDATE SET
                status = excluded.status,
                updated_at = excluded.updated_at,
                completed_at = excluded.completed_at
            WHERE scraping_progress.status IN ('pending', 'in_progress')
            "#,
        )
        .bind(session.as_str())
        .bind(status.as_str())
        .bind(now)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to complete session: {}",
                e
            )))
        })?;

        Ok(result.rows_affected() > 0)
    }

    /// Get a session by ID
    pub async fn get_session(&self, session: &SessionId) -> Result<Option<ProgressSnapshot>> {
        let row = sqlx::query_as::<_, ProgressRow>(
            r#"
            SELECT session_id, total_profiles, processed, success, failed, skipped, challenge,
                   status, started_at, updated_at, completed_at
            FROM scraping_progress
            WHERE session_id = ?
            "#,
        )
        .bind(session.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to get session: {}",
                e
            )))
        })?;

        row.map(ProgressSnapshot::try_from).transpose()
    }

    /// List the most recently started sessions, newest first
    pub async fn list_sessions(&self, limit: u32) -> Result<Vec<ProgressSnapshot>> {
        let rows = sqlx::query_as::<_, ProgressRow>(
            r#"
            SELECT session_id, total_profiles, processed, success, failed, skipped, challenge,
                   status, started_at, updated_at, completed_at
            FROM scraping_progress
            ORDER BY started_at DESC, session_id DESC
            LIMIT ?
            "#,
        )
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to list sessions: {}",
                e
            )))
        })?;

        rows.into_iter().map(ProgressSnapshot::try_from).collect()
    }

    /// Mark abandoned sessions as interrupted
    ///
    /// A session still `pending` or `in_progress` whose last update is older
    /// than `older_than` belonged to a process that died without finalizing
    /// it. Returns the number of sessions swept.
    pub async fn interrupt_stale_sessions(&self, older_than: Duration) -> Result<u64> {
        let now = chrono::Utc::now().timestamp();
        let cutoff = now.saturating_sub(i64::try_from(older_than.as_secs()).unwrap_or(i64::MAX));

        let result = sqlx::query(
            r#"
            UPDATE scraping_progress
            SET status = 'interrupted', updated_at = ?, completed_at = ?
            WHERE status IN ('pending', 'in_progress') AND updated_at < ?
            "#,
        )
        .bind(now)
        .bind(now)
        .bind(cutoff)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to sweep stale sessions: {}",
                e
            )))
        })?;

        Ok(result.rows_affected())
    }
}

#[async_trait]
impl ProgressLedger for Database {
    async fn init(&self, session: &SessionId, total: u64) -> Result<()> {
        self.init_session(session, total).await
    }

    async fn update(&self, session: &SessionId, counts: &ProgressCounts) -> Result<()> {
        self.update_session(session, counts).await
    }

    async fn complete(&self, session: &SessionId, status: SessionStatus) -> Result<()> {
        if !self.complete_session(session, status).await? {
            tracing::debug!(session_id = %session, status = %status, "session already finalized");
        }
        Ok(())
    }
}
