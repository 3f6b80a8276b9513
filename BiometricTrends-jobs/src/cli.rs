//! Usage:
//! ```bash
//! # Classify every patient's glucose, weight and blood pressure trend
//! biometric-trends analyze-trends
//!
//! # Rebuild the hourly summary table
//! biometric-trends aggregate-hourly --database data/biometrics.db
//!
//! # Both, aggregation first, printing the reports as JSON
//! biometric-trends run-all --json
//! ```

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    name = "biometric-trends",
    about = "Biometric trend analysis and hourly aggregation jobs",
    long_about = "Runs the patient biometric jobs once against the configured database and exits."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// SQLite database file, overrides DB_SQLITE_PATH
    #[arg(long, global = true)]
    pub database: Option<String>,

    /// Print the job report as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Enable debug logging
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Classify the trend of every patient's biometrics
    AnalyzeTrends,

    /// Summarize raw biometrics into hourly min/max/avg/count rows
    AggregateHourly,

    /// Run the hourly aggregation, then the trend analysis
    RunAll,
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::AnalyzeTrends => "analyze-trends",
            Command::AggregateHourly => "aggregate-hourly",
            Command::RunAll => "run-all",
        }
    }
}
