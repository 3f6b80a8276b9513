use std::future::Future;
use std::time::Duration;

use anyhow::{anyhow, Result};
use serde::Serialize;
use tracing::info;

use biometric_trends_data::repository::BiometricRepositoryTrait;
use biometric_trends_domain::config::AnalysisConfig;
use biometric_trends_domain::services::{
    AggregationReport, AnalysisReport, HourlyAggregationService, TrendAnalysisService,
};

use crate::cli::Command;

/// Reports produced by one invocation
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct JobReport {
    pub command: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aggregation: Option<AggregationReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analysis: Option<AnalysisReport>,
}

/// Run the jobs selected by `command` against `repository`.
///
/// `run-all` aggregates first so the summaries are current when trends are read.
pub async fn run_command<R>(command: Command, repository: R, analysis: AnalysisConfig) -> Result<JobReport>
where
    R: BiometricRepositoryTrait + Clone,
{
    let mut report = JobReport {
        command: command.name().to_string(),
        ..JobReport::default()
    };

    if matches!(command, Command::AggregateHourly | Command::RunAll) {
        let service = HourlyAggregationService::new(repository.clone());
        report.aggregation = Some(service.run().await?);
    }

    if matches!(command, Command::AnalyzeTrends | Command::RunAll) {
        let service = TrendAnalysisService::new(repository, analysis);
        report.analysis = Some(service.analyze_all_patients().await?);
    }

    Ok(report)
}

/// Await `job`, failing if it does not finish within `limit`
pub async fn run_with_timeout<F, T>(name: &str, limit: Duration, job: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    info!("Running {} with a {}s timeout", name, limit.as_secs());
    match tokio::time::timeout(limit, job).await {
        Ok(result) => result,
        Err(_) => Err(anyhow!("{} did not finish within {}s", name, limit.as_secs())),
    }
}

/// Human readable summary of a job report
pub fn render_summary(report: &JobReport) -> String {
    let mut lines = vec![format!("{} finished", report.command)];

    if let Some(aggregation) = &report.aggregation {
        lines.push(format!(
            "  hourly aggregation: {} raw rows, {} skipped, {} summaries upserted",
            aggregation.raw_rows, aggregation.skipped_rows, aggregation.aggregates_upserted
        ));
    }

    if let Some(analysis) = &report.analysis {
        lines.push(format!(
            "  trend analysis: {} patients, {} analyzed, {} insufficient data, {} failed",
            analysis.patients, analysis.analyzed, analysis.insufficient_data, analysis.failed
        ));
        for failure in &analysis.failures {
            lines.push(format!(
                "    patient {} {}: {}",
                failure.patient_id, failure.metric_type, failure.error
            ));
        }
    }

    lines.join("\n")
}
