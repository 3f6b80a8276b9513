use std::env;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::info;

use biometric_trends_data::database::{DatabaseConfig, DatabaseType};
use biometric_trends_domain::config::AnalysisConfig;

/// Watchdog applied to a job when `JOB_TIMEOUT_SECONDS` is not set
pub const DEFAULT_JOB_TIMEOUT_SECONDS: u64 = 900;

/// Everything a job run needs, resolved from the environment and the command line
#[derive(Debug, Clone)]
pub struct JobConfig {
    pub database: DatabaseConfig,
    pub analysis: AnalysisConfig,
    pub timeout: Duration,
}

impl JobConfig {
    /// Load the configuration from the environment, then apply `--database`
    pub fn load(database_override: Option<&str>) -> Result<Self> {
        let mut database = DatabaseConfig::from_env().context("Invalid database configuration")?;
        if let Some(path) = database_override {
            info!("Using SQLite database from the command line: {}", path);
            database.db_type = DatabaseType::Sqlite;
            database.sqlite_path = Some(path.to_string());
        }

        let analysis = AnalysisConfig::from_env().context("Invalid analysis configuration")?;

        let timeout_seconds = env::var("JOB_TIMEOUT_SECONDS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .filter(|seconds| *seconds > 0)
            .unwrap_or(DEFAULT_JOB_TIMEOUT_SECONDS);

        Ok(Self {
            database,
            analysis,
            timeout: Duration::from_secs(timeout_seconds),
        })
    }
}
