//! Per-record state machine: Extracting → Fetching → Uploading → Persisting

use super::EnrichmentPipeline;
use crate::extract::{Identifier, extract_identifier};
use crate::fetch::{FetchOutcome, ImageRef};
use crate::types::{
    CandidateRecord, DeferReason, Event, FailureReason, PaceTier, RecordOutcome, RecordStage,
    SkipReason,
};
use tracing::{debug, info, warn};

/// How a record left the state machine
pub(super) enum RecordFlow {
    /// Terminal sub-state reached; `tier` selects the pause before the next record
    Finished {
        outcome: RecordOutcome,
        tier: PaceTier,
    },
    /// Credential expired; the session must stop without counting this record
    AuthExpired,
}

impl RecordFlow {
    fn finished(outcome: RecordOutcome, tier: PaceTier) -> Self {
        RecordFlow::Finished { outcome, tier }
    }
}

impl EnrichmentPipeline {
    pub(super) async fn process_record(&self, record: &CandidateRecord) -> RecordFlow {
        self.enter_stage(record, RecordStage::Extracting);

        if let Some(current) = record.artifact_ref.as_deref()
            && self.artifacts.is_own_artifact(current)
        {
            debug!(record_id = %record.id, "already stored, skipping");
            return RecordFlow::finished(
                RecordOutcome::Skipped(SkipReason::AlreadyStored),
                PaceTier::Baseline,
            );
        }

        let Some(identifier) = extract_identifier(&record.source_url) else {
            warn!(record_id = %record.id, url = %record.source_url, "no identifier in source URL");
            return RecordFlow::finished(
                RecordOutcome::Failed(FailureReason::InvalidUrl),
                PaceTier::Baseline,
            );
        };

        self.enter_stage(record, RecordStage::Fetching);
        let (fetched, was_rate_limited) = self.fetch_with_backoff(record, &identifier).await;

        // Any rate limit during this record keeps the next pause long, even
        // when a retry went through.
        let settled_tier = if was_rate_limited {
            PaceTier::AfterRateLimit
        } else {
            PaceTier::Baseline
        };

        match fetched {
            FetchOutcome::Success(image) => {
                let outcome = self.store_and_link(record, &identifier, &image).await;
                RecordFlow::finished(outcome, settled_tier)
            }
            FetchOutcome::NotFound => {
                info!(record_id = %record.id, identifier = %identifier, "profile not found");
                RecordFlow::finished(
                    RecordOutcome::Failed(FailureReason::NotFound),
                    settled_tier,
                )
            }
            FetchOutcome::PermanentError(message) => {
                warn!(record_id = %record.id, identifier = %identifier, error = %message, "fetch failed");
                RecordFlow::finished(
                    RecordOutcome::Failed(FailureReason::Permanent(message)),
                    settled_tier,
                )
            }
            FetchOutcome::TransientError(message) => {
                warn!(record_id = %record.id, identifier = %identifier, error = %message, "transient fetch failure");
                RecordFlow::finished(
                    RecordOutcome::Failed(FailureReason::Transient(message)),
                    settled_tier,
                )
            }
            FetchOutcome::ChallengeRequired => {
                warn!(record_id = %record.id, identifier = %identifier, "challenge required, deferring");
                let tier = if was_rate_limited {
                    PaceTier::AfterRateLimit
                } else {
                    PaceTier::AfterChallenge
                };
                RecordFlow::finished(
                    RecordOutcome::Deferred(DeferReason::ChallengeRequired),
                    tier,
                )
            }
            FetchOutcome::RateLimited => {
                warn!(record_id = %record.id, identifier = %identifier, "still rate limited, deferring");
                RecordFlow::finished(
                    RecordOutcome::Deferred(DeferReason::RateLimited),
                    PaceTier::AfterRateLimit,
                )
            }
            FetchOutcome::AuthExpired => RecordFlow::AuthExpired,
        }
    }

    /// Fetch, retrying the same record after a rate-limit backoff
    ///
    /// Returns the final outcome and whether any attempt was rate limited.
    async fn fetch_with_backoff(
        &self,
        record: &CandidateRecord,
        identifier: &Identifier,
    ) -> (FetchOutcome, bool) {
        let mut retries_left = self.rate_limit_retries;
        let mut was_rate_limited = false;

        loop {
            let outcome = self.fetcher.fetch_high_res(identifier).await;
            debug!(record_id = %record.id, identifier = %identifier, outcome = outcome.label(), "fetched");

            if outcome != FetchOutcome::RateLimited {
                return (outcome, was_rate_limited);
            }
            was_rate_limited = true;

            if retries_left == 0 || self.cancel.is_cancelled() {
                return (outcome, was_rate_limited);
            }
            retries_left -= 1;

            let backoff = self.pacing.rate_limit_backoff();
            warn!(
                record_id = %record.id,
                identifier = %identifier,
                delay_ms = backoff.as_millis() as u64,
                "rate limited, backing off before retry"
            );
            self.emit_event(Event::Pacing {
                tier: PaceTier::AfterRateLimit,
                delay: backoff,
            });
            if !self.pause(backoff).await {
                return (outcome, was_rate_limited);
            }
        }
    }

    async fn store_and_link(
        &self,
        record: &CandidateRecord,
        identifier: &Identifier,
        image: &ImageRef,
    ) -> RecordOutcome {
        self.enter_stage(record, RecordStage::Uploading);
        let artifact_url = match self.artifacts.store(image, identifier.as_str()).await {
            Ok(url) => url,
            Err(e) => {
                warn!(record_id = %record.id, identifier = %identifier, error = %e, "artifact store failed");
                return RecordOutcome::Failed(FailureReason::Upload(e.to_string()));
            }
        };

        self.enter_stage(record, RecordStage::Persisting);
        if let Err(e) = self.records.update_artifact(record.id, &artifact_url).await {
            warn!(record_id = %record.id, error = %e, "failed to persist artifact reference");
            return RecordOutcome::Failed(FailureReason::Persist(e.to_string()));
        }

        info!(record_id = %record.id, identifier = %identifier, url = %artifact_url, "record enriched");
        RecordOutcome::Succeeded { artifact_url }
    }
}
