use crate::db::*;
use crate::store::ProgressLedger;
use crate::types::{ProgressCounts, SessionId, SessionStatus};
use std::time::Duration;
use tempfile::NamedTempFile;

fn counts(total: u64, success: u64, failed: u64, skipped: u64, challenge: u64) -> ProgressCounts {
    ProgressCounts {
        total,
        processed: success + failed + skipped + challenge,
        success,
        failed,
        skipped,
        challenge,
    }
}

#[tokio::test]
async fn test_init_creates_in_progress_session() {
    let temp_file = NamedTempFile::new().unwrap();
    let db = Database::new(temp_file.path()).await.unwrap();
    let session = SessionId::new("1700000000000");

    db.init(&session, 5).await.unwrap();

    let snapshot = db.get_session(&session).await.unwrap().unwrap();
    assert_eq!(snapshot.status, SessionStatus::InProgress);
    assert_eq!(snapshot.counts, ProgressCounts::new(5));
    assert!(snapshot.completed_at.is_none());

    db.close().await;
}

#[tokio::test]
async fn test_update_is_monotonic() {
    let temp_file = NamedTempFile::new().unwrap();
    let db = Database::new(temp_file.path()).await.unwrap();
    let session = SessionId::new("s1");

    db.init(&session, 5).await.unwrap();
    db.update(&session, &counts(5, 2, 1, 0, 0)).await.unwrap();

    // A stale write with fewer processed records is ignored
    db.update(&session, &counts(5, 1, 0, 0, 0)).await.unwrap();
    let snapshot = db.get_session(&session).await.unwrap().unwrap();
    assert_eq!(snapshot.counts.processed, 3);
    assert_eq!(snapshot.counts.success, 2);
    assert!(snapshot.counts.is_consistent());

    db.update(&session, &counts(5, 2, 1, 1, 1)).await.unwrap();
    let snapshot = db.get_session(&session).await.unwrap().unwrap();
    assert_eq!(snapshot.counts.processed, 5);
    assert_eq!(snapshot.counts.challenge, 1);

    db.close().await;
}

#[tokio::test]
async fn test_complete_finalizes_exactly_once() {
    let temp_file = NamedTempFile::new().unwrap();
    let db = Database::new(temp_file.path()).await.unwrap();
    let session = SessionId::new("s2");

    db.init(&session, 1).await.unwrap();
    assert!(db.complete_session(&session, SessionStatus::Stopped).await.unwrap());
    assert!(!db.complete_session(&session, SessionStatus::Completed).await.unwrap());

    // The trait method treats the second call as a no-op
    db.complete(&session, SessionStatus::Interrupted).await.unwrap();

    let snapshot = db.get_session(&session).await.unwrap().unwrap();
    assert_eq!(snapshot.status, SessionStatus::Stopped);
    assert!(snapshot.completed_at.is_some());

    db.close().await;
}

#[tokio::test]
async fn test_complete_rejects_non_terminal_status() {
    let temp_file = NamedTempFile::new().unwrap();
    let db = Database::new(temp_file.path()).await.unwrap();
    let session = SessionId::new("s3");

    db.init(&session, 1).await.unwrap();
    assert!(db.complete(&session, SessionStatus::InProgress).await.is_err());

    db.close().await;
}

#[tokio::test]
async fn test_init_restarts_existing_session() {
    let temp_file = NamedTempFile::new().unwrap();
    let db = Database::new(temp_file.path()).await.unwrap();
    let session = SessionId::new("s4");

    db.init(&session, 3).await.unwrap();
    db.update(&session, &counts(3, 3, 0, 0, 0)).await.unwrap();
    db.complete(&session, SessionStatus::Completed).await.unwrap();

    db.init(&session, 7).await.unwrap();
    let snapshot = db.get_session(&session).await.unwrap().unwrap();
    assert_eq!(snapshot.status, SessionStatus::InProgress);
    assert_eq!(snapshot.counts, ProgressCounts::new(7));
    assert!(snapshot.completed_at.is_none());

    // Counters may advance again after a restart
    db.update(&session, &counts(7, 1, 0, 0, 0)).await.unwrap();
    let snapshot = db.get_session(&session).await.unwrap().unwrap();
    assert_eq!(snapshot.counts.processed, 1);

    db.close().await;
}

#[tokio::test]
async fn test_update_and_complete_upsert_unknown_session() {
    let temp_file = NamedTempFile::new().unwrap();
    let db = Database::new(temp_file.path()).await.unwrap();

    let updated = SessionId::new("never-initialized");
    db.update(&updated, &counts(4, 1, 0, 0, 0)).await.unwrap();
    let snapshot = db.get_session(&updated).await.unwrap().unwrap();
    assert_eq!(snapshot.status, SessionStatus::InProgress);
    assert_eq!(snapshot.counts.total, 4);

    let completed = SessionId::new("completed-cold");
    db.complete(&completed, SessionStatus::Failed).await.unwrap();
    let snapshot = db.get_session(&completed).await.unwrap().unwrap();
    assert_eq!(snapshot.status, SessionStatus::Failed);

    db.close().await;
}

#[tokio::test]
async fn test_get_unknown_session_is_none() {
    let temp_file = NamedTempFile::new().unwrap();
    let db = Database::new(temp_file.path()).await.unwrap();

    assert!(db.get_session(&SessionId::new("nope")).await.unwrap().is_none());

    db.close().await;
}

#[tokio::test]
async fn test_list_sessions_newest_first() {
    let temp_file = NamedTempFile::new().unwrap();
    let db = Database::new(temp_file.path()).await.unwrap();

    for (id, started_at) in [("100", 100_i64), ("300", 300), ("200", 200)] {
        db.init(&SessionId::new(id), 1).await.unwrap();
        sqlx::query("UPDATE scraping_progress SET started_at = ? WHERE session_id = ?")
            .bind(started_at)
            .bind(id)
            .execute(db.pool())
            .await
            .unwrap();
    }

    let sessions = db.list_sessions(2).await.unwrap();
    let ids: Vec<&str> = sessions.iter().map(|s| s.session_id.as_str()).collect();
    assert_eq!(ids, vec!["300", "200"]);

    db.close().await;
}

#[tokio::test]
async fn test_interrupt_stale_sessions() {
    let temp_file = NamedTempFile::new().unwrap();
    let db = Database::new(temp_file.path()).await.unwrap();

    let stale = SessionId::new("stale");
    let fresh = SessionId::new("fresh");
    let finished = SessionId::new("finished");

    db.init(&stale, 1).await.unwrap();
    db.init(&fresh, 1).await.unwrap();
    db.init(&finished, 1).await.unwrap();
    db.complete(&finished, SessionStatus::Completed).await.unwrap();

    let long_ago = chrono::Utc::now().timestamp() - 7200;
    sqlx::query("UPDATE scraping_progress SET updated_at = ? WHERE session_id IN (?, ?)")
        .bind(long_ago)
        .bind(stale.as_str())
        .bind(finished.as_str())
        .execute(db.pool())
        .await
        .unwrap();

    let swept = db
        .interrupt_stale_sessions(Duration::from_secs(3600))
        .await
        .unwrap();
    assert_eq!(swept, 1);

    let status = |s: &SessionId| {
        let db = &db;
        let s = s.clone();
        async move { db.get_session(&s).await.unwrap().unwrap().status }
    };
    assert_eq!(status(&stale).await, SessionStatus::Interrupted);
    assert_eq!(status(&fresh).await, SessionStatus::InProgress);
    assert_eq!(status(&finished).await, SessionStatus::Completed);

    db.close().await;
}
