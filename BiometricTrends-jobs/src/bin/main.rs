use anyhow::{Context, Result};
use clap::Parser;
use dotenv::dotenv;
use tracing::{error, info};

use biometric_trends_data::database::DatabasePool;
use biometric_trends_data::repository::BiometricRepository;
use biometric_trends_jobs::cli::Cli;
use biometric_trends_jobs::config::JobConfig;
use biometric_trends_jobs::jobs::{render_summary, run_command, run_with_timeout};
use biometric_trends_jobs::logging::init_tracing;

/// Entry point of the `biometric-trends` job runner
///
/// Loads `.env`, sets up tracing, connects to the configured database, runs
/// the selected job under a watchdog and prints its report. Per-unit analysis
/// failures are part of the report and do not change the exit code.
#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    let dotenv_loaded = dotenv().is_ok();

    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if !dotenv_loaded {
        info!(".env file not found, using process environment only");
    }
    info!("Starting biometric-trends {}", cli.command.name());

    let config = JobConfig::load(cli.database.as_deref())?;

    let pool = DatabasePool::connect(&config.database).context("Failed to open the database")?;
    info!("Connected to {}", pool.connection_info());
    let repository = BiometricRepository::new(pool);

    let job = run_command(cli.command, repository, config.analysis.clone());
    let report = match run_with_timeout(cli.command.name(), config.timeout, job).await {
        Ok(report) => report,
        Err(e) => {
            error!("Job {} failed: {:#}", cli.command.name(), e);
            return Err(e);
        }
    };

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{}", render_summary(&report));
    }

    Ok(())
}
