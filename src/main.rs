mod auth;
mod config;
mod error;
mod models;
mod report;
mod service;

use crate::config::{config_path, ensure_initialized, load_config};
use auth::ConsolePrompt;
use clap::{Parser, Subcommand};
use error::AppError;
use service::EarningsService;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

const LOG_ENV: &str = "ADMOB_EARNINGS_LOG";

#[derive(Debug, Parser)]
#[command(name = "admob-earnings")]
#[command(about = "Print AdMob estimated earnings for one month")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Create the config and data directories with a default config.toml.
    Init,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

async fn run(cli: Cli) -> Result<(), AppError> {
    match cli.command {
        Some(Commands::Init) => {
            ensure_initialized()?;
            println!(
                "Initialized admob-earnings config at {}",
                config_path()?.display()
            );
        }
        None => {
            let cfg = load_config()?;
            let display_key = cfg.report.display_key.clone();
            let svc = EarningsService::new(cfg, ConsolePrompt)?;
            let earnings = svc.earnings().await?;
            println!("{}", report::present(&earnings, &display_key)?);
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::debug!(error = ?err, "run failed");
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}
