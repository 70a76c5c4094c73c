//! Command-line entry point for profile-enrich

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use profile_enrich::{
    BatchWindow, Config, Database, EnrichmentPipeline, Event, PipelineParts, ProgressSnapshot,
    RecordOutcome, SessionId, TokioSleeper, artifact, fetch::HttpFetchProvider, run_with_shutdown,
};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "profile-enrich", version, about = "Enrich profile records with high-resolution images")]
struct Cli {
    /// JSON configuration file (defaults apply when omitted)
    #[arg(long, short, env = "PROFILE_ENRICH_CONFIG")]
    config: Option<PathBuf>,

    /// Override the database path from the configuration
    #[arg(long, env = "PROFILE_ENRICH_DATABASE")]
    database: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Process one window of candidate records
    Run(RunArgs),
    /// List recent sessions, newest first
    Sessions {
        /// Maximum number of sessions to show
        #[arg(long, default_value_t = 20)]
        limit: u32,
    },
    /// Show one session's counters
    Session {
        /// Session id as printed by `run` or `sessions`
        id: String,
    },
    /// List eligible records that have not been enriched yet
    Pending(WindowArgs),
}

impl Command {
    /// Whether the command talks to the upstream source or the artifact store
    fn builds_pipeline(&self) -> bool {
        matches!(self, Command::Run(_) | Command::Pending(_))
    }
}

#[derive(Debug, Args)]
struct WindowArgs {
    /// Maximum number of records (unbounded when omitted)
    #[arg(long)]
    limit: Option<u32>,

    /// Records to skip from the start of the id order
    #[arg(long, visible_alias = "skip", default_value_t = 0)]
    offset: u32,
}

impl From<&WindowArgs> for BatchWindow {
    fn from(args: &WindowArgs) -> Self {
        BatchWindow {
            limit: args.limit,
            offset: args.offset,
        }
    }
}

#[derive(Debug, Args)]
struct RunArgs {
    #[command(flatten)]
    window: WindowArgs,

    /// Pre-authenticated upstream session cookie
    #[arg(long, env = "SOURCE_SESSION_ID", hide_env_values = true)]
    session_id: Option<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    init_tracing();

    let cli = Cli::parse();
    match dispatch(cli).await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            tracing::error!(error = %format!("{e:#}"), "profile-enrich failed");
            eprintln!("error: {e:#}");
            ExitCode::from(1)
        }
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(cli: &Cli) -> anyhow::Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("loading configuration from {}", path.display()))?,
        None => Config::default(),
    };
    if let Some(database) = &cli.database {
        config.persistence.database_path = database.clone();
    }
    if let Command::Run(args) = &cli.command
        && args.session_id.is_some()
    {
        config.source.session_id = args.session_id.clone();
    }
    // Ledger inspection only needs the database path
    if cli.command.builds_pipeline() {
        config.validate().context("invalid configuration")?;
    }
    Ok(config)
}

async fn dispatch(cli: Cli) -> anyhow::Result<u8> {
    let config = load_config(&cli)?;
    let db = Arc::new(
        Database::new(&config.persistence.database_path)
            .await
            .with_context(|| {
                format!(
                    "opening database {}",
                    config.persistence.database_path.display()
                )
            })?,
    );

    let code = match &cli.command {
        Command::Run(args) => run_session(&config, db.clone(), BatchWindow::from(&args.window)).await?,
        Command::Sessions { limit } => {
            for snapshot in db.list_sessions(*limit).await? {
                print_snapshot(&snapshot);
            }
            0
        }
        Command::Session { id } => match db.get_session(&SessionId::new(id.as_str())).await? {
            Some(snapshot) => {
                print_snapshot(&snapshot);
                0
            }
            None => anyhow::bail!("no session with id {id}"),
        },
        Command::Pending(window) => {
            let pipeline = build_pipeline(&config, db.clone())?;
            let pending = pipeline.pending(BatchWindow::from(window)).await?;
            for record in &pending {
                println!("{}\t{}\t{}", record.id, record.name, record.source_url);
            }
            println!("{} record(s) pending", pending.len());
            0
        }
    };

    if let Ok(db) = Arc::try_unwrap(db) {
        db.close().await;
    }
    Ok(code)
}

fn build_pipeline(config: &Config, db: Arc<Database>) -> anyhow::Result<EnrichmentPipeline> {
    let fetcher = HttpFetchProvider::new(config.source.clone())?;
    let artifacts = artifact::from_config(&config.artifacts)?;
    Ok(EnrichmentPipeline::new(
        PipelineParts {
            records: db.clone(),
            ledger: db,
            fetcher: Arc::new(fetcher),
            artifacts,
            sleeper: Arc::new(TokioSleeper),
        },
        config,
    ))
}

async fn run_session(config: &Config, db: Arc<Database>, window: BatchWindow) -> anyhow::Result<u8> {
    let swept = db
        .interrupt_stale_sessions(config.persistence.stale_session_after)
        .await?;
    if swept > 0 {
        tracing::warn!(swept, "marked abandoned sessions as interrupted");
    }

    let pipeline = build_pipeline(config, db)?;
    let printer = tokio::spawn(print_events(pipeline.subscribe()));

    let report = run_with_shutdown(&pipeline, window).await?;
    drop(pipeline);
    let _ = printer.await;

    println!(
        "session {} {}: total={} processed={} success={} failed={} skipped={} challenge={}",
        report.session_id,
        report.status,
        report.counts.total,
        report.counts.processed,
        report.counts.success,
        report.counts.failed,
        report.counts.skipped,
        report.counts.challenge,
    );
    Ok(u8::try_from(report.exit_code()).unwrap_or(1))
}

async fn print_events(mut events: tokio::sync::broadcast::Receiver<Event>) {
    use tokio::sync::broadcast::error::RecvError;

    loop {
        match events.recv().await {
            Ok(Event::SessionStarted { session_id, total, window }) => {
                println!(
                    "session {session_id}: {total} record(s), offset {}, limit {}",
                    window.offset,
                    window.limit.map_or("none".to_string(), |l| l.to_string())
                );
            }
            Ok(Event::RecordStarted { name, position, .. }) => {
                println!("[{position}] {name}");
            }
            Ok(Event::RecordFinished { outcome, .. }) => match outcome {
                RecordOutcome::Succeeded { artifact_url } => println!("    stored {artifact_url}"),
                RecordOutcome::Failed(reason) => println!("    failed: {reason:?}"),
                RecordOutcome::Skipped(reason) => println!("    skipped: {reason:?}"),
                RecordOutcome::Deferred(reason) => println!("    deferred: {reason:?}"),
            },
            Ok(Event::Pacing { tier, delay }) => {
                println!("    waiting {:.1}s ({tier:?})", delay.as_secs_f64());
            }
            Ok(Event::SessionAborted { record_id }) => {
                println!("upstream session expired at record {record_id}; stopping");
            }
            Ok(Event::StageChanged { .. }) | Ok(Event::SessionFinished { .. }) => {}
            Err(RecvError::Lagged(missed)) => {
                tracing::debug!(missed, "progress printer fell behind");
            }
            Err(RecvError::Closed) => break,
        }
    }
}

fn print_snapshot(snapshot: &ProgressSnapshot) {
    let counts = &snapshot.counts;
    println!(
        "{}\t{}\tstarted {}\ttotal={} processed={} success={} failed={} skipped={} challenge={}{}",
        snapshot.session_id,
        snapshot.status,
        snapshot.started_at.format("%Y-%m-%d %H:%M:%S"),
        counts.total,
        counts.processed,
        counts.success,
        counts.failed,
        counts.skipped,
        counts.challenge,
        snapshot
            .completed_at
            .map(|t| format!("\tfinished {}", t.format("%Y-%m-%d %H:%M:%S")))
            .unwrap_or_default(),
    );
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn config_without_store_credentials() -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"persistence": {{"database_path": "/tmp/enrich.db"}},
                "artifacts": {{"backend": "cloudinary", "cloud_name": "", "api_key": "", "api_secret": ""}}}}"#
        )
        .unwrap();
        file
    }

    fn parse(config: &tempfile::NamedTempFile, command: &[&str]) -> Cli {
        let path = config.path().to_str().unwrap();
        let args = ["profile-enrich", "--config", path]
            .into_iter()
            .chain(command.iter().copied());
        Cli::try_parse_from(args).unwrap()
    }

    #[test]
    fn ledger_commands_load_without_store_credentials() {
        let file = config_without_store_credentials();

        for command in [&["sessions"][..], &["session", "1700000000000-00c0ffee"][..]] {
            let config = load_config(&parse(&file, command)).unwrap();
            assert_eq!(config.persistence.database_path, PathBuf::from("/tmp/enrich.db"));
        }
    }

    #[test]
    fn pipeline_commands_require_a_valid_store() {
        let file = config_without_store_credentials();

        for command in [&["run", "--limit", "5"][..], &["pending"][..]] {
            assert!(load_config(&parse(&file, command)).is_err(), "{command:?}");
        }
    }

    #[test]
    fn database_flag_overrides_the_file() {
        let file = config_without_store_credentials();
        let path = file.path().to_str().unwrap();
        let cli = Cli::try_parse_from([
            "profile-enrich",
            "--config",
            path,
            "--database",
            "/var/lib/enrich.db",
            "sessions",
        ])
        .unwrap();

        let config = load_config(&cli).unwrap();
        assert_eq!(config.persistence.database_path, PathBuf::from("/var/lib/enrich.db"));
    }
}
