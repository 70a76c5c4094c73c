//! Core types and events for profile-enrich

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

/// Unique identifier for a profile record
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(pub i64);

impl RecordId {
    /// Get the inner i64 value
    pub fn get(&self) -> i64 {
        self.0
    }
}

impl From<i64> for RecordId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for RecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl sqlx::Type<sqlx::Sqlite> for RecordId {
    fn type_info() -> sqlx::sqlite::SqliteTypeInfo {
        <i64 as sqlx::Type<sqlx::Sqlite>>::type_info()
    }

    fn compatible(ty: &sqlx::sqlite::SqliteTypeInfo) -> bool {
        <i64 as sqlx::Type<sqlx::Sqlite>>::compatible(ty)
    }
}

impl<'q> sqlx::Encode<'q, sqlx::Sqlite> for RecordId {
    fn encode_by_ref(
        &self,
        buf: &mut Vec<sqlx::sqlite::SqliteArgumentValue<'q>>,
    ) -> Result<sqlx::encode::IsNull, Box<dyn std::error::Error + Send + Sync>> {
        sqlx::Encode::<sqlx::Sqlite>::encode_by_ref(&self.0, buf)
    }
}

impl<'r> sqlx::Decode<'r, sqlx::Sqlite> for RecordId {
    fn decode(value: sqlx::sqlite::SqliteValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let id = <i64 as sqlx::Decode<sqlx::Sqlite>>::decode(value)?;
        Ok(Self(id))
    }
}

/// Session identifier
///
/// `<millis>-<tag>`: wall-clock milliseconds at session start, zero-padded so
/// ids sort by start time, followed by a tag drawn once per process. Two
/// processes starting in the same millisecond therefore never share an id,
/// and ids generated within one process are strictly increasing.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

/// Issues session ids for one process
struct SessionIdGenerator {
    last_millis: AtomicI64,
    tag: String,
}

impl SessionIdGenerator {
    fn new() -> Self {
        Self {
            last_millis: AtomicI64::new(0),
            tag: format!("{:08x}", rand::random::<u32>()),
        }
    }

    fn next_at(&self, now_millis: i64) -> SessionId {
        let prev = self
            .last_millis
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
                Some(now_millis.max(last + 1))
            })
            .unwrap_or(now_millis);
        SessionId(format!("{:013}-{}", now_millis.max(prev + 1), self.tag))
    }
}

static SESSION_IDS: LazyLock<SessionIdGenerator> = LazyLock::new(SessionIdGenerator::new);

impl SessionId {
    /// Generate a fresh session id for a new run
    pub fn generate() -> Self {
        SESSION_IDS.next_at(Utc::now().timestamp_millis())
    }

    /// Wrap an existing id (e.g. one read back from the ledger)
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the id as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lifecycle status of an enrichment session
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Row created, run not started yet
    Pending,
    /// Run is processing records
    InProgress,
    /// Every record in the window was handled
    Completed,
    /// Run aborted because the upstream credential expired
    Stopped,
    /// Run was cancelled by the operator (or abandoned by a crashed process)
    Interrupted,
    /// Run hit an unrecoverable error
    Failed,
}

impl SessionStatus {
    /// Database / display representation
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Pending => "pending",
            SessionStatus::InProgress => "in_progress",
            SessionStatus::Completed => "completed",
            SessionStatus::Stopped => "stopped",
            SessionStatus::Interrupted => "interrupted",
            SessionStatus::Failed => "failed",
        }
    }

    /// Whether the session has been finalized
    pub fn is_terminal(&self) -> bool {
        !matches!(self, SessionStatus::Pending | SessionStatus::InProgress)
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SessionStatus {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(SessionStatus::Pending),
            "in_progress" => Ok(SessionStatus::InProgress),
            "completed" => Ok(SessionStatus::Completed),
            "stopped" => Ok(SessionStatus::Stopped),
            "interrupted" => Ok(SessionStatus::Interrupted),
            "failed" => Ok(SessionStatus::Failed),
            other => Err(crate::Error::Other(format!(
                "unknown session status: {other}"
            ))),
        }
    }
}

/// Snapshot of one profile record taken for the current batch
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateRecord {
    /// Stable record id
    pub id: RecordId,
    /// Display name
    pub name: String,
    /// Current image reference, if any
    pub artifact_ref: Option<String>,
    /// Profile URL on the source network
    pub source_url: String,
}

/// Slice of the eligible-record order processed by one session
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchWindow {
    /// Maximum number of records (None = unbounded)
    pub limit: Option<u32>,
    /// Number of records to skip from the start of the order
    pub offset: u32,
}

/// Counters persisted in the progress ledger
///
/// `processed` always equals `success + failed + skipped + challenge`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressCounts {
    /// Candidates in the batch
    pub total: u64,
    /// Records that reached a terminal sub-state
    pub processed: u64,
    /// Records enriched and persisted
    pub success: u64,
    /// Records that failed this pass
    pub failed: u64,
    /// Records skipped (already stored) or deferred by rate limiting
    pub skipped: u64,
    /// Records deferred by a challenge wall
    pub challenge: u64,
}

impl ProgressCounts {
    /// Counters for a fresh batch
    pub fn new(total: u64) -> Self {
        Self {
            total,
            ..Default::default()
        }
    }

    /// Account for one record outcome
    pub fn record(&mut self, outcome: &RecordOutcome) {
        match outcome {
            RecordOutcome::Succeeded { .. } => self.success += 1,
            RecordOutcome::Failed(_) => self.failed += 1,
            RecordOutcome::Skipped(_) => self.skipped += 1,
            RecordOutcome::Deferred(DeferReason::ChallengeRequired) => self.challenge += 1,
            RecordOutcome::Deferred(DeferReason::RateLimited) => self.skipped += 1,
        }
        self.processed += 1;
    }

    /// Check the processed-sum invariant
    pub fn is_consistent(&self) -> bool {
        self.processed == self.success + self.failed + self.skipped + self.challenge
    }
}

/// Stage a record moves through inside the pipeline
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordStage {
    /// Selected, not yet examined
    Pending,
    /// Checking the marker and extracting the identifier
    Extracting,
    /// Asking the fetch provider for the image
    Fetching,
    /// Handing the image to the artifact store
    Uploading,
    /// Writing the new reference back to the record store
    Persisting,
}

/// Terminal result of processing one record
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", content = "detail", rename_all = "snake_case")]
pub enum RecordOutcome {
    /// Image stored and record updated
    Succeeded {
        /// Durable URL now stored on the record
        artifact_url: String,
    },
    /// Record could not be enriched this pass
    Failed(FailureReason),
    /// Record needed no work
    Skipped(SkipReason),
    /// Upstream throttling; record stays eligible for a later pass
    Deferred(DeferReason),
}

/// Why a record failed
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "message", rename_all = "snake_case")]
pub enum FailureReason {
    /// No identifier could be extracted from the source URL
    InvalidUrl,
    /// Upstream reports the profile missing, private, or without a picture
    NotFound,
    /// Connection-level failure
    Transient(String),
    /// Unclassified upstream failure
    Permanent(String),
    /// Artifact store failure
    Upload(String),
    /// Record store write failure
    Persist(String),
}

/// Why a record was skipped
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Current reference already carries the artifact store's marker
    AlreadyStored,
}

/// Why a record was deferred
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeferReason {
    /// Anti-automation challenge
    ChallengeRequired,
    /// Rate limited, including after the built-in retry
    RateLimited,
}

/// Pacing tier applied between two records
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaceTier {
    /// Normal inter-record delay
    Baseline,
    /// Extended delay after a challenge
    AfterChallenge,
    /// Long delay after rate limiting
    AfterRateLimit,
    /// Periodic cool-down after a block of records
    Cooldown,
}

/// Events emitted by the pipeline
///
/// Subscribe via [`EnrichmentPipeline::subscribe`](crate::EnrichmentPipeline::subscribe).
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// A session started
    SessionStarted {
        /// Session id
        session_id: SessionId,
        /// Candidates in the batch
        total: u64,
        /// Window being processed
        window: BatchWindow,
    },
    /// A record is about to be processed
    RecordStarted {
        /// Record id
        record_id: RecordId,
        /// Display name
        name: String,
        /// 1-based position across the whole order (offset included)
        position: u64,
    },
    /// A record moved to a new stage
    StageChanged {
        /// Record id
        record_id: RecordId,
        /// New stage
        stage: RecordStage,
    },
    /// A record reached a terminal sub-state
    RecordFinished {
        /// Record id
        record_id: RecordId,
        /// Outcome
        outcome: RecordOutcome,
    },
    /// The pipeline is pausing between records
    Pacing {
        /// Tier that selected the delay
        tier: PaceTier,
        /// Delay duration
        delay: Duration,
    },
    /// The upstream credential expired; remaining records are abandoned
    SessionAborted {
        /// Record whose fetch reported the expiry
        record_id: RecordId,
    },
    /// A session was finalized
    SessionFinished {
        /// Session id
        session_id: SessionId,
        /// Terminal status
        status: SessionStatus,
        /// Final counters
        counts: ProgressCounts,
    },
}

/// Progress ledger row as read back from storage
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    /// Session id
    pub session_id: SessionId,
    /// Counters
    pub counts: ProgressCounts,
    /// Lifecycle status
    pub status: SessionStatus,
    /// When the session (re)started
    pub started_at: DateTime<Utc>,
    /// Last counter update
    pub updated_at: DateTime<Utc>,
    /// When the session was finalized
    pub completed_at: Option<DateTime<Utc>>,
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn millis_of(id: &SessionId) -> i64 {
        id.as_str().split_once('-').unwrap().0.parse().unwrap()
    }

    #[test]
    fn session_ids_are_strictly_increasing() {
        let ids: Vec<SessionId> = (0..50).map(|_| SessionId::generate()).collect();
        for pair in ids.windows(2) {
            assert!(millis_of(&pair[1]) > millis_of(&pair[0]), "{} !> {}", pair[1], pair[0]);
            assert!(pair[1].as_str() > pair[0].as_str());
        }
    }

    #[test]
    fn generators_in_the_same_millisecond_issue_distinct_ids() {
        let now = 1_700_000_000_000;
        let first = SessionIdGenerator::new();
        let second = SessionIdGenerator::new();

        let a = first.next_at(now);
        let b = second.next_at(now);
        assert_ne!(a, b);
        assert_eq!(millis_of(&a), now);
        assert_eq!(millis_of(&b), now);
    }

    #[test]
    fn clock_stepping_back_does_not_reuse_an_id() {
        let generator = SessionIdGenerator::new();
        let a = generator.next_at(1_700_000_000_500);
        let b = generator.next_at(1_700_000_000_000);
        assert_ne!(a, b);
        assert!(millis_of(&b) > millis_of(&a));
    }

    #[test]
    fn ids_sort_by_start_time_as_strings() {
        let generator = SessionIdGenerator::new();
        let early = generator.next_at(999_999_999_999);
        let late = generator.next_at(1_000_000_000_000);
        assert!(late.as_str() > early.as_str());
    }

    #[test]
    fn session_status_string_round_trip() {
        for status in [
            SessionStatus::Pending,
            SessionStatus::InProgress,
            SessionStatus::Completed,
            SessionStatus::Stopped,
            SessionStatus::Interrupted,
            SessionStatus::Failed,
        ] {
            assert_eq!(status.as_str().parse::<SessionStatus>().unwrap(), status);
        }
        assert!("done".parse::<SessionStatus>().is_err());
    }

    #[test]
    fn only_pending_and_in_progress_are_non_terminal() {
        assert!(!SessionStatus::Pending.is_terminal());
        assert!(!SessionStatus::InProgress.is_terminal());
        assert!(SessionStatus::Completed.is_terminal());
        assert!(SessionStatus::Stopped.is_terminal());
        assert!(SessionStatus::Interrupted.is_terminal());
        assert!(SessionStatus::Failed.is_terminal());
    }

    #[test]
    fn counts_keep_processed_sum_invariant() {
        let mut counts = ProgressCounts::new(6);
        let outcomes = [
            RecordOutcome::Succeeded {
                artifact_url: "https://cdn/a.jpg".into(),
            },
            RecordOutcome::Failed(FailureReason::NotFound),
            RecordOutcome::Skipped(SkipReason::AlreadyStored),
            RecordOutcome::Deferred(DeferReason::ChallengeRequired),
            RecordOutcome::Deferred(DeferReason::RateLimited),
            RecordOutcome::Failed(FailureReason::InvalidUrl),
        ];
        let mut last_processed = 0;
        for outcome in &outcomes {
            counts.record(outcome);
            assert!(counts.is_consistent());
            assert!(counts.processed > last_processed);
            last_processed = counts.processed;
        }
        assert_eq!(counts.success, 1);
        assert_eq!(counts.failed, 2);
        assert_eq!(counts.skipped, 2, "rate-limit deferrals count as skipped");
        assert_eq!(counts.challenge, 1);
        assert_eq!(counts.processed, 6);
    }

    #[test]
    fn record_outcome_serializes_with_tag() {
        let json = serde_json::to_value(RecordOutcome::Failed(FailureReason::Transient(
            "timeout".into(),
        )))
        .unwrap();
        assert_eq!(json["result"], "failed");
        assert_eq!(json["detail"]["kind"], "transient");
        assert_eq!(json["detail"]["message"], "timeout");
    }
}
