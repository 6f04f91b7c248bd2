//! market-e2e - session driver for the marketplace end-to-end suites
//!
//! Brings the deployment up before any test runs and tears it down after the
//! last one. Suites themselves are plain `cargo test` targets gated by
//! features; `run` wires the two together.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use market_e2e::reset::StatementOutcome;
use market_e2e::TestSession;
use std::process::{ExitCode, Stdio};
use tokio::process::Command;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Exit code when the deployment never became ready.
const BRING_UP_FAILED: u8 = 2;

#[derive(Debug, Parser)]
#[command(name = "market-e2e", version, about = "Marketplace end-to-end session driver")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Start the deployment and wait until it is ready
    Up(UpArgs),

    /// Tear down the deployment and its volumes
    Down,

    /// Empty every mutable table in every store
    Reset,

    /// Probe a running deployment and validate the truncation plan
    Check,

    /// Bring up, run the suites, tear down
    Run(RunArgs),
}

#[derive(Debug, Args)]
struct UpArgs {
    /// Start the configuration service first and wait for it
    #[arg(long)]
    staged: bool,
}

#[derive(Debug, Args)]
struct RunArgs {
    /// Cargo features selecting the suites
    #[arg(long, default_value = "all")]
    features: String,

    /// Start the configuration service first and wait for it
    #[arg(long)]
    staged: bool,

    /// Leave the deployment running afterwards
    #[arg(long)]
    keep: bool,

    /// Extra arguments passed to the test binaries
    #[arg(last = true)]
    test_args: Vec<String>,
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "market_e2e=info".into());

    let json = std::env::var("E2E_LOG_FORMAT").is_ok_and(|format| format == "json");
    let registry = tracing_subscriber::registry().with(filter);

    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    init_tracing();

    let cli = Cli::parse();
    let session = TestSession::from_env().context("Failed to load harness configuration")?;

    match cli.command {
        Commands::Up(args) => {
            if let Err(e) = session.bring_up(args.staged).await {
                error!(target: "e2e.session", error = %e, "Bring-up failed");
                return Ok(ExitCode::from(BRING_UP_FAILED));
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::Down => {
            session.tear_down().await;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Reset => {
            let report = session.reset().await?;
            for entry in &report.entries {
                let outcome = match &entry.outcome {
                    StatementOutcome::Truncated => "truncated".to_string(),
                    StatementOutcome::MissingTable => "absent".to_string(),
                    StatementOutcome::Failed(e) => format!("failed: {}", e),
                };
                println!("{:<12} {:<20} {}", entry.store.name(), entry.table, outcome);
            }
            Ok(if report.is_clean() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
        Commands::Check => {
            let report = session.check().await?;
            println!(
                "Deployment ready; plan v{} covers {} tables ({} store/table pairs absent)",
                session.plan().version(),
                session.plan().tables().len(),
                report.missing.len()
            );
            Ok(ExitCode::SUCCESS)
        }
        Commands::Run(args) => run_session(&session, args).await,
    }
}

async fn run_session(session: &TestSession, args: RunArgs) -> Result<ExitCode> {
    if let Err(e) = session.bring_up(args.staged).await {
        error!(target: "e2e.session", error = %e, "Bring-up failed, no tests were run");
        if !args.keep {
            session.tear_down().await;
        }
        return Ok(ExitCode::from(BRING_UP_FAILED));
    }

    let mut test_args = vec!["--test-threads=1".to_string()];
    test_args.extend(args.test_args);

    info!(target: "e2e.session", features = %args.features, "Running suites");
    let status = Command::new(std::env::var("CARGO").unwrap_or_else(|_| "cargo".to_string()))
        .args(["test", "-p", env!("CARGO_PKG_NAME"), "--features", &args.features, "--"])
        .args(&test_args)
        .stdin(Stdio::null())
        .status()
        .await;

    if args.keep {
        info!(target: "e2e.session", "Leaving deployment running");
    } else {
        session.tear_down().await;
    }

    let status = status.context("Failed to spawn cargo test")?;
    if status.success() {
        Ok(ExitCode::SUCCESS)
    } else {
        warn!(target: "e2e.session", %status, "Suites failed");
        Ok(ExitCode::FAILURE)
    }
}
