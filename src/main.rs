//! Comment-Harvester main entry point
//!
//! This is the command-line interface for the Comment-Harvester collector.

use clap::Parser;
use comment_harvester::config::{load_config_with_hash, Config};
use comment_harvester::crawler::{
    finalize_interrupted_run, fixed_offset, run_preflight, Harvester, StaticProbe,
};
use comment_harvester::monitor::EvidenceRecorder;
use comment_harvester::output::{load_statistics, print_statistics, RECENT_EVENTS};
use comment_harvester::storage::{open_storage, RunStatus};
use comment_harvester::CommentFetcher;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// Comment-Harvester: an adaptive news comment collector
///
/// Walks the comment threads of the configured articles, pacing requests
/// with an adaptive rate governor and stopping on structural drift or bans.
#[derive(Parser, Debug)]
#[command(name = "comment-harvester")]
#[command(version = "1.0.0")]
#[command(about = "An adaptive news comment collector", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Resume an interrupted run, keeping its id and snapshot
    #[arg(long, value_name = "RUN_ID", conflicts_with_all = ["preflight", "stats"])]
    resume: Option<String>,

    /// Probe a few configured articles and exit
    #[arg(long, conflicts_with = "stats")]
    preflight: bool,

    /// Show statistics for a run (latest by default) and exit
    #[arg(long, value_name = "RUN_ID", num_args = 0..=1, default_missing_value = "")]
    stats: Option<String>,
}

/// Exit code for a run finalized as FAILED
const EXIT_FAILED: u8 = 2;

/// Exit code for a run finalized as PARTIAL
const EXIT_PARTIAL: u8 = 3;

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = match load_config_with_hash(&cli.config) {
        Ok((cfg, hash)) => {
            tracing::info!("Configuration loaded successfully (hash: {})", hash);
            (cfg, hash)
        }
        Err(e) => {
            tracing::error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    if let Some(run_id) = cli.stats.as_deref() {
        let run_id = Some(run_id).filter(|id| !id.is_empty());
        handle_stats(&config, run_id)?;
        Ok(ExitCode::SUCCESS)
    } else if cli.preflight {
        handle_preflight(&config).await
    } else {
        handle_run(config, &config_hash, cli.resume.as_deref()).await
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("comment_harvester=info,warn"),
            1 => EnvFilter::new("comment_harvester=debug,info"),
            2 => EnvFilter::new("comment_harvester=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Handles the --stats mode
fn handle_stats(config: &Config, run_id: Option<&str>) -> Result<(), Box<dyn std::error::Error>> {
    println!("Database: {}\n", config.storage.database_path);

    let storage = open_storage(Path::new(&config.storage.database_path))?;
    let stats = load_statistics(&storage, run_id, RECENT_EVENTS)?;
    print_statistics(&stats);

    Ok(())
}

/// Handles the --preflight mode; exits non-zero when the check fails
async fn handle_preflight(config: &Config) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let offset = fixed_offset(config.snapshot.timezone_offset_hours)?;
    let evidence = EvidenceRecorder::new(
        "preflight",
        Path::new(&config.storage.evidence_dir),
        offset,
    )?;
    let mut fetcher = CommentFetcher::new(config, Some(evidence))?;
    let probe = StaticProbe::from_config(config);

    let report = run_preflight(config, &mut fetcher, &probe).await;
    println!(
        "Pre-flight: {}/{} samples passed",
        report.passed, report.samples
    );

    if report.is_pass() {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}

/// Handles the main collection run
///
/// The run executes on its own task so a panic or Ctrl-C still leaves a
/// finalized `PARTIAL` run record behind.
async fn handle_run(
    config: Config,
    config_hash: &str,
    resume: Option<&str>,
) -> Result<ExitCode, Box<dyn std::error::Error>> {
    tracing::info!(
        "Articles: {}, candidates: {}",
        config.articles.len(),
        config.candidates.len()
    );

    let database_path = PathBuf::from(&config.storage.database_path);
    let volume = config.volume.clone();
    let storage = open_storage(&database_path)?;
    let probe = StaticProbe::from_config(&config);

    let harvester = Harvester::start(config, config_hash, storage, probe, resume)?;
    let run_id = harvester.run_id().to_string();

    let mut handle = tokio::spawn(harvester.run());

    let interrupted = tokio::select! {
        joined = &mut handle => match joined {
            Ok(Ok((outcome, _storage))) => {
                tracing::info!(
                    "Run {} finished: {} ({} articles, {} comments, grade {}, health {})",
                    outcome.run_id,
                    outcome.status,
                    outcome.total_articles,
                    outcome.total_comments,
                    outcome.volume_grade.as_str(),
                    outcome.health_score
                );
                if let Some(failure) = &outcome.failure {
                    tracing::error!("Run ended by: {}", failure);
                }
                return Ok(exit_code_for(outcome.status));
            }
            Ok(Err(e)) => {
                tracing::error!("Run {} could not be finalized: {}", run_id, e);
                return Err(e.into());
            }
            Err(join_error) => {
                tracing::error!("Run task for {} panicked: {}", run_id, join_error);
                format!("Run task panicked: {}", join_error)
            }
        },
        _ = tokio::signal::ctrl_c() => {
            tracing::warn!("Interrupt received, stopping run {}", run_id);
            handle.abort();
            // Wait for the aborted task so its database handle is released
            let _ = handle.await;
            "Interrupted by user".to_string()
        }
    };

    let mut storage = open_storage(&database_path)?;
    finalize_interrupted_run(&mut storage, &run_id, &volume, &interrupted)?;

    Ok(exit_code_for(RunStatus::Partial))
}

fn exit_code_for(status: RunStatus) -> ExitCode {
    match status {
        RunStatus::Success | RunStatus::Stopped => ExitCode::SUCCESS,
        RunStatus::Failed => ExitCode::from(EXIT_FAILED),
        RunStatus::Partial => ExitCode::from(EXIT_PARTIAL),
    }
}
