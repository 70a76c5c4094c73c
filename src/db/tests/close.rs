use crate::db::*;
use crate::store::{CandidateQuery, ProgressLedger, RecordStore};
use crate::types::{BatchWindow, RecordId, SessionId};
use tempfile::NamedTempFile;

/// Verify that listing candidates after closing the pool returns an error
/// rather than hanging or panicking.
#[tokio::test]
async fn test_list_candidates_after_pool_close_returns_error() {
    let temp_file = NamedTempFile::new().unwrap();
    let db = Database::new(temp_file.path()).await.unwrap();

    db.pool().close().await;

    let query = CandidateQuery {
        status: "published".to_string(),
        platform: "instagram".to_string(),
        window: BatchWindow::default(),
    };
    let result = db.list_candidates(&query).await;
    assert!(
        result.is_err(),
        "list_candidates after pool close should return an error, got: {:?}",
        result
    );
}

/// Verify that updating a record after closing the pool returns an error
#[tokio::test]
async fn test_update_artifact_after_pool_close_returns_error() {
    let temp_file = NamedTempFile::new().unwrap();
    let db = Database::new(temp_file.path()).await.unwrap();

    db.pool().close().await;

    let result = db.update_artifact(RecordId(1), "https://cdn/x.jpg").await;
    assert!(
        result.is_err(),
        "update_artifact after pool close should return an error, got: {:?}",
        result
    );
}

/// Verify that ledger init after closing the pool returns an error
#[tokio::test]
async fn test_ledger_init_after_pool_close_returns_error() {
    let temp_file = NamedTempFile::new().unwrap();
    let db = Database::new(temp_file.path()).await.unwrap();

    db.pool().close().await;

    let result = db.init(&SessionId::new("1"), 3).await;
    assert!(
        result.is_err(),
        "init after pool close should return an error, got: {:?}",
        result
    );
}
