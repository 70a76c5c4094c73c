//! Profile records and their social links.

use crate::error::DatabaseError;
use crate::store::{CandidateQuery, RecordStore};
use crate::types::{CandidateRecord, RecordId};
use crate::{Error, Result};
use async_trait::async_trait;

use super::{CandidateRow, Database, NewProfile, Profile};

impl Database {
    /// Insert a new profile
    pub async fn insert_profile(&self, profile: &NewProfile) -> Result<RecordId> {
        let now = chrono::Utc::now().timestamp();

        let result = sqlx::query(
            r#"
            INSERT INTO profiles (name, status, image_url, updated_at)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(&profile.name)
        .bind(&profile.status)
        .bind(&profile.image_url)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to insert profile: {}",
                e
            )))
        })?;

        Ok(RecordId(result.last_insert_rowid()))
    }

    /// Attach a social link to a profile
    pub async fn add_social_link(&self, profile: RecordId, platform: &str, url: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO social_links (profile_id, platform, url)
            VALUES (?, ?, ?)
            "#,
        )
        .bind(profile)
        .bind(platform)
        .bind(url)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to insert social link: {}",
                e
            )))
        })?;

        Ok(())
    }

    /// Get a profile by ID
    pub async fn get_profile(&self, id: RecordId) -> Result<Option<Profile>> {
        let row = sqlx::query_as::<_, Profile>(
            r#"
            SELECT id, name, status, image_url, updated_at
            FROM profiles
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to get profile: {}",
                e
            )))
        })?;

        Ok(row)
    }

    /// List candidate profiles for a batch
    ///
    /// One row per profile even with several links on the platform; the
    /// lowest URL is used. Ordered by id so windows are stable across runs.
    pub async fn list_candidate_rows(&self, query: &CandidateQuery) -> Result<Vec<CandidateRow>> {
        // SQLite treats a negative LIMIT as unbounded
        let limit = query.window.limit.map_or(-1, i64::from);

        let rows = sqlx::query_as::<_, CandidateRow>(
            r#"
            SELECT p.id AS id, p.name AS name, p.image_url AS image_url, MIN(sl.url) AS source_url
            FROM profiles p
            JOIN social_links sl ON sl.profile_id = p.id
            WHERE p.status = ? AND sl.platform = ?
            GROUP BY p.id
            ORDER BY p.id ASC
            LIMIT ? OFFSET ?
            "#,
        )
        .bind(&query.status)
        .bind(&query.platform)
        .bind(limit)
        .bind(i64::from(query.window.offset))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to list candidate profiles: {}",
                e
            )))
        })?;

        Ok(rows)
    }

    /// Set a profile's image reference
    pub async fn set_profile_image(&self, id: RecordId, image_url: &str) -> Result<()> {
        let now = chrono::Utc::now().timestamp();

        let result = sqlx::query(
            r#"
            UPDATE profiles
            SET image_url = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(image_url)
        .bind(now)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to update profile image: {}",
                e
            )))
        })?;

        if result.rows_affected() == 0 {
            return Err(Error::Database(DatabaseError::NotFound(format!(
                "Profile with ID {} not found",
                id
            ))));
        }

        Ok(())
    }
}

#[async_trait]
impl RecordStore for Database {
    async fn list_candidates(&self, query: &CandidateQuery) -> Result<Vec<CandidateRecord>> {
        let rows = self.list_candidate_rows(query).await?;
        Ok(rows.into_iter().map(CandidateRecord::from).collect())
    }

    async fn update_artifact(&self, id: RecordId, artifact_url: &str) -> Result<()> {
        self.set_profile_image(id, artifact_url).await
    }
}
