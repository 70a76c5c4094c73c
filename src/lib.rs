//! # profile-enrich
//!
//! Resumable, rate-aware batch enrichment of profile records with
//! high-resolution images.
//!
//! A run ("session") selects a window of published profiles that link to the
//! source network, looks up each profile's high-resolution picture, stores it
//! durably, and writes the new reference back to the record. Progress is kept
//! in a ledger so operators can inspect a run and resume with the next
//! window.
//!
//! ## Design
//!
//! - **Capability seams** - fetch, artifact storage, record storage and the
//!   ledger are traits, so the pipeline is tested against scripted fakes
//! - **Classified failures** - upstream results are a closed
//!   [`FetchOutcome`](fetch::FetchOutcome) enum; the pipeline matches it
//!   exhaustively
//! - **Gentle on the upstream** - tiered, jittered pauses between records and
//!   a backoff-then-retry on rate limiting
//! - **Event-driven** - consumers subscribe to [`Event`]s
//!
//! ## Quick Start
//!
//! ```no_run
//! use profile_enrich::{
//!     BatchWindow, Config, Database, EnrichmentPipeline, PipelineParts, TokioSleeper, artifact,
//!     fetch::HttpFetchProvider,
//! };
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::default();
//!     let db = Arc::new(Database::new(&config.persistence.database_path).await?);
//!
//!     let pipeline = EnrichmentPipeline::new(
//!         PipelineParts {
//!             records: db.clone(),
//!             ledger: db.clone(),
//!             fetcher: Arc::new(HttpFetchProvider::new(config.source.clone())?),
//!             artifacts: artifact::from_config(&config.artifacts)?,
//!             sleeper: Arc::new(TokioSleeper),
//!         },
//!         &config,
//!     );
//!
//!     let mut events = pipeline.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     let report = pipeline.run(BatchWindow { limit: Some(50), offset: 0 }).await?;
//!     println!("{}: {:?}", report.status, report.counts);
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Artifact stores for fetched images
pub mod artifact;
/// Configuration types
pub mod config;
/// Database persistence layer
pub mod db;
/// Error types
pub mod error;
/// Profile URL → identifier extraction
pub mod extract;
/// Upstream image lookup
pub mod fetch;
/// Inter-record pacing
pub mod pacing;
/// Batch enrichment orchestrator
pub mod pipeline;
/// Record store and progress ledger traits
pub mod store;
/// Core types and events
pub mod types;

use tokio_util::sync::CancellationToken;

// Re-export commonly used types
pub use artifact::ArtifactStore;
pub use config::Config;
pub use db::Database;
pub use error::{DatabaseError, Error, Result, UploadError};
pub use fetch::{FetchOutcome, FetchProvider};
pub use pacing::{PacingPolicy, Sleeper, TokioSleeper};
pub use pipeline::{EnrichmentPipeline, PipelineParts, SessionReport};
pub use store::{CandidateQuery, ProgressLedger, RecordStore};
pub use types::{
    BatchWindow, CandidateRecord, Event, ProgressCounts, ProgressSnapshot, RecordId,
    RecordOutcome, SessionId, SessionStatus,
};

/// Exit status used when a second signal aborts the process
pub const FORCED_EXIT_CODE: i32 = 130;

/// Run one session with graceful signal handling.
///
/// A termination signal cancels the pipeline's token: the record in flight
/// finishes, pauses end early, and the session is recorded as `interrupted`.
/// A second signal exits the process immediately with [`FORCED_EXIT_CODE`],
/// leaving the session to the stale-session sweep.
///
/// - **Unix:** listens for SIGTERM and SIGINT. When neither can be registered
///   the run proceeds without interrupt support.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// # Example
///
/// ```no_run
/// # use profile_enrich::{BatchWindow, EnrichmentPipeline, run_with_shutdown};
/// # async fn example(pipeline: EnrichmentPipeline) -> profile_enrich::Result<()> {
/// let report = run_with_shutdown(&pipeline, BatchWindow::default()).await?;
/// std::process::exit(report.exit_code());
/// # }
/// ```
pub async fn run_with_shutdown(
    pipeline: &EnrichmentPipeline,
    window: BatchWindow,
) -> Result<SessionReport> {
    let watcher = tokio::spawn(watch_for_interrupts(
        pipeline.cancellation_token(),
        wait_for_signal,
        || std::process::exit(FORCED_EXIT_CODE),
    ));

    let result = pipeline.run(window).await;
    watcher.abort();
    result
}

/// First signal cancels `token`, the second calls `force_exit`
async fn watch_for_interrupts<S, F>(
    token: CancellationToken,
    mut next_signal: S,
    force_exit: impl FnOnce(),
) where
    S: FnMut() -> F,
    F: Future<Output = ()>,
{
    next_signal().await;
    tracing::info!("Finishing the current record before stopping (signal again to exit now)");
    token.cancel();

    next_signal().await;
    tracing::warn!("Second signal received, exiting without finalizing the session");
    force_exit();
}

/// Wait for a registered signal source to fire
///
/// Never resolves when registration failed or the source closed, so a
/// missing handler can not be mistaken for an interrupt.
async fn signal_or_pending<F, E>(registration: std::result::Result<F, E>, name: &'static str)
where
    F: Future<Output = Option<()>>,
    E: std::fmt::Display,
{
    let fired = match registration {
        Ok(signal) => signal.await,
        Err(e) => {
            tracing::warn!(error = %e, signal = name, "Could not register signal handler");
            None
        }
    };

    match fired {
        Some(()) => tracing::info!(signal = name, "Received signal"),
        None => std::future::pending::<()>().await,
    }
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Signal registration may fail in restricted environments (containers, tests)
    let sigterm = signal(SignalKind::terminate());
    let sigint = signal(SignalKind::interrupt());
    if sigterm.is_err() && sigint.is_err() {
        tracing::error!("No signal handlers could be registered, the run can not be interrupted");
    }

    tokio::select! {
        _ = signal_or_pending(sigterm.map(|mut s| async move { s.recv().await }), "SIGTERM") => {}
        _ = signal_or_pending(sigint.map(|mut s| async move { s.recv().await }), "SIGINT") => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let ctrl_c = tokio::signal::ctrl_c()
        .await
        .map(|()| std::future::ready(Some(())));
    signal_or_pending(ctrl_c, "Ctrl+C").await;
}
