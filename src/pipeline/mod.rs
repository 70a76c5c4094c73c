//! Batch enrichment orchestrator
//!
//! [`EnrichmentPipeline`] pulls a window of candidate records, walks them one
//! at a time through extract → fetch → store → persist, pauses between
//! records according to the [`PacingPolicy`], and keeps the progress ledger
//! current after every record.
//!
//! Session outcomes:
//!
//! | Status | Cause |
//! |---|---|
//! | `completed` | every record in the window reached a terminal sub-state |
//! | `interrupted` | the cancellation token fired |
//! | `stopped` | the fetch provider reported an expired credential |
//! | `failed` | candidates could not be listed |

use crate::artifact::ArtifactStore;
use crate::config::Config;
use crate::error::Result;
use crate::fetch::FetchProvider;
use crate::pacing::{PacingPolicy, Sleeper};
use crate::store::{CandidateQuery, ProgressLedger, RecordStore};
use crate::types::{
    BatchWindow, CandidateRecord, Event, PaceTier, ProgressCounts, RecordStage, SessionId,
    SessionStatus,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

mod record;
mod session;

pub use session::SessionReport;

use record::RecordFlow;

/// Capabilities the pipeline is assembled from
pub struct PipelineParts {
    /// Candidate source and artifact reference sink
    pub records: Arc<dyn RecordStore>,
    /// Session counters
    pub ledger: Arc<dyn ProgressLedger>,
    /// Upstream image lookup
    pub fetcher: Arc<dyn FetchProvider>,
    /// Durable image storage
    pub artifacts: Arc<dyn ArtifactStore>,
    /// Used for every pacing and backoff pause
    pub sleeper: Arc<dyn Sleeper>,
}

/// Resumable, rate-aware batch enrichment of profile records
pub struct EnrichmentPipeline {
    records: Arc<dyn RecordStore>,
    ledger: Arc<dyn ProgressLedger>,
    fetcher: Arc<dyn FetchProvider>,
    artifacts: Arc<dyn ArtifactStore>,
    sleeper: Arc<dyn Sleeper>,
    pacing: PacingPolicy,
    status_filter: String,
    platform_filter: String,
    rate_limit_retries: u32,
    event_tx: broadcast::Sender<Event>,
    cancel: CancellationToken,
}

impl EnrichmentPipeline {
    /// Assemble a pipeline from its capabilities and configuration
    pub fn new(parts: PipelineParts, config: &Config) -> Self {
        let (event_tx, _rx) = broadcast::channel(1000);

        Self {
            records: parts.records,
            ledger: parts.ledger,
            fetcher: parts.fetcher,
            artifacts: parts.artifacts,
            sleeper: parts.sleeper,
            pacing: PacingPolicy::from(config.pacing.clone()),
            status_filter: config.selection.status.clone(),
            platform_filter: config.selection.platform.clone(),
            rate_limit_retries: config.rate_limit.retries,
            event_tx,
            cancel: CancellationToken::new(),
        }
    }

    /// Subscribe to pipeline events
    ///
    /// Each subscriber receives every event; a subscriber more than 1000
    /// events behind starts losing the oldest ones.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Token that interrupts the run when cancelled
    ///
    /// The in-flight record is allowed to finish; pacing and backoff pauses
    /// end immediately.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Request an interrupt
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Eligible records in the window that do not yet carry this store's marker
    pub async fn pending(&self, window: BatchWindow) -> Result<Vec<CandidateRecord>> {
        let candidates = self.records.list_candidates(&self.query(window)).await?;
        Ok(candidates
            .into_iter()
            .filter(|c| {
                !c.artifact_ref
                    .as_deref()
                    .is_some_and(|r| self.artifacts.is_own_artifact(r))
            })
            .collect())
    }

    /// Run one session over `window`
    ///
    /// # Errors
    /// Returns error when candidates cannot be listed (the session is
    /// recorded as `failed`) or the ledger cannot be initialized. Per-record
    /// failures never surface here; they are counted in the report.
    pub async fn run(&self, window: BatchWindow) -> Result<SessionReport> {
        let session_id = SessionId::generate();

        let candidates = match self.records.list_candidates(&self.query(window)).await {
            Ok(candidates) => candidates,
            Err(e) => {
                error!(session_id = %session_id, error = %e, "failed to list candidates");
                self.record_failed_session(&session_id).await;
                return Err(e);
            }
        };

        let total = candidates.len() as u64;
        self.ledger.init(&session_id, total).await?;

        info!(
            session_id = %session_id,
            total,
            limit = ?window.limit,
            offset = window.offset,
            fetcher = self.fetcher.name(),
            store = self.artifacts.name(),
            "enrichment session started"
        );
        self.emit_event(Event::SessionStarted {
            session_id: session_id.clone(),
            total,
            window,
        });

        let mut counts = ProgressCounts::new(total);
        let mut outcomes = Vec::with_capacity(candidates.len());
        let mut status = SessionStatus::Completed;
        let mut next_pause: Option<PaceTier> = None;

        for (index, record) in candidates.iter().enumerate() {
            if self.cancel.is_cancelled() {
                status = SessionStatus::Interrupted;
                break;
            }

            if let Some(tier) = next_pause.take() {
                let pause = self.pacing.delay_after(tier, counts.processed);
                debug!(
                    session_id = %session_id,
                    tier = ?pause.tier,
                    delay_ms = pause.delay.as_millis() as u64,
                    "pacing before next record"
                );
                self.emit_event(Event::Pacing {
                    tier: pause.tier,
                    delay: pause.delay,
                });
                if !self.pause(pause.delay).await {
                    status = SessionStatus::Interrupted;
                    break;
                }
            }

            self.emit_event(Event::RecordStarted {
                record_id: record.id,
                name: record.name.clone(),
                position: u64::from(window.offset) + index as u64 + 1,
            });

            match self.process_record(record).await {
                RecordFlow::Finished { outcome, tier } => {
                    counts.record(&outcome);
                    if let Err(e) = self.ledger.update(&session_id, &counts).await {
                        warn!(session_id = %session_id, error = %e, "failed to update progress ledger");
                    }
                    self.emit_event(Event::RecordFinished {
                        record_id: record.id,
                        outcome: outcome.clone(),
                    });
                    outcomes.push((record.id, outcome));
                    next_pause = Some(tier);
                }
                RecordFlow::AuthExpired => {
                    warn!(
                        session_id = %session_id,
                        record_id = %record.id,
                        "upstream session expired, stopping"
                    );
                    self.emit_event(Event::SessionAborted {
                        record_id: record.id,
                    });
                    status = SessionStatus::Stopped;
                    break;
                }
            }
        }

        if let Err(e) = self.ledger.complete(&session_id, status).await {
            error!(session_id = %session_id, error = %e, "failed to finalize session");
        }

        info!(
            session_id = %session_id,
            status = %status,
            processed = counts.processed,
            success = counts.success,
            failed = counts.failed,
            skipped = counts.skipped,
            challenge = counts.challenge,
            "enrichment session finished"
        );
        self.emit_event(Event::SessionFinished {
            session_id: session_id.clone(),
            status,
            counts,
        });

        Ok(SessionReport {
            session_id,
            status,
            counts,
            outcomes,
        })
    }

    fn query(&self, window: BatchWindow) -> CandidateQuery {
        CandidateQuery {
            status: self.status_filter.clone(),
            platform: self.platform_filter.clone(),
            window,
        }
    }

    /// Leave a `failed` row behind for a session that never got going
    async fn record_failed_session(&self, session_id: &SessionId) {
        if let Err(e) = self.ledger.init(session_id, 0).await {
            warn!(session_id = %session_id, error = %e, "failed to record failed session");
            return;
        }
        if let Err(e) = self.ledger.complete(session_id, SessionStatus::Failed).await {
            warn!(session_id = %session_id, error = %e, "failed to record failed session");
        }
        self.emit_event(Event::SessionFinished {
            session_id: session_id.clone(),
            status: SessionStatus::Failed,
            counts: ProgressCounts::default(),
        });
    }

    /// Sleep unless cancelled first; returns false on cancellation
    async fn pause(&self, delay: Duration) -> bool {
        tokio::select! {
            _ = self.sleeper.sleep(delay) => true,
            _ = self.cancel.cancelled() => false,
        }
    }

    fn enter_stage(&self, record: &CandidateRecord, stage: RecordStage) {
        self.emit_event(Event::StageChanged {
            record_id: record.id,
            stage,
        });
    }

    /// Emit an event to all subscribers
    ///
    /// With no subscribers the event is dropped.
    fn emit_event(&self, event: Event) {
        self.event_tx.send(event).ok();
    }
}
