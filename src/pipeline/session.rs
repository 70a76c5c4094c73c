//! Result of one pipeline run

use crate::types::{ProgressCounts, RecordId, RecordOutcome, SessionId, SessionStatus};
use serde::{Deserialize, Serialize};

/// Summary returned by [`EnrichmentPipeline::run`](super::EnrichmentPipeline::run)
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionReport {
    /// Ledger key of the run
    pub session_id: SessionId,
    /// Terminal status written to the ledger
    pub status: SessionStatus,
    /// Final counters
    pub counts: ProgressCounts,
    /// Per-record outcomes in processing order
    pub outcomes: Vec<(RecordId, RecordOutcome)>,
}

impl SessionReport {
    /// Outcome recorded for `id`, if the record was reached
    pub fn outcome_for(&self, id: RecordId) -> Option<&RecordOutcome> {
        self.outcomes
            .iter()
            .find(|(record, _)| *record == id)
            .map(|(_, outcome)| outcome)
    }

    /// Process exit code for this run
    ///
    /// `completed` and `interrupted` exit cleanly, `stopped` (expired
    /// credential) exits with 2, everything else with 1.
    pub fn exit_code(&self) -> i32 {
        match self.status {
            SessionStatus::Completed | SessionStatus::Interrupted => 0,
            SessionStatus::Stopped => 2,
            SessionStatus::Failed | SessionStatus::Pending | SessionStatus::InProgress => 1,
        }
    }
}
