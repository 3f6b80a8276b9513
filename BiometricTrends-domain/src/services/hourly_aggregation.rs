use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use biometric_trends_data::models::HourlySummaryRow;
use biometric_trends_data::repository::{BiometricRepositoryTrait, RepositoryError};

use crate::entities::conversions;
use crate::services::aggregation::aggregate;

/// Hourly aggregation errors
#[derive(Debug, Error)]
pub enum AggregationError {
    /// Repository error
    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),
}

/// Summary of one aggregation run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregationReport {
    /// Raw values read from storage, one per series component
    pub raw_rows: usize,
    /// Rows skipped because their series is unknown
    pub skipped_rows: usize,
    /// Hourly summaries written
    pub aggregates_upserted: usize,
}

/// Rebuilds the hourly summary table from the raw biometrics
pub struct HourlyAggregationService<R: BiometricRepositoryTrait> {
    repository: R,
}

impl<R: BiometricRepositoryTrait> HourlyAggregationService<R> {
    /// Create a new hourly aggregation service
    pub fn new(repository: R) -> Self {
        Self { repository }
    }

    /// Aggregate every raw reading and upsert the hourly summaries.
    ///
    /// Safe to re-run: each summary overwrites the row with the same
    /// patient, series and hour.
    pub async fn run(&self) -> Result<AggregationReport, AggregationError> {
        info!("Starting hourly biometric aggregation");

        let raw_rows = self.repository.fetch_raw_biometrics_for_aggregation().await?;
        let mut report = AggregationReport {
            raw_rows: raw_rows.len(),
            ..AggregationReport::default()
        };

        if raw_rows.is_empty() {
            info!("No biometric data to aggregate");
            return Ok(report);
        }

        let mut readings = Vec::with_capacity(raw_rows.len());
        for row in raw_rows {
            match conversions::convert_to_domain_raw_reading(row) {
                Ok(reading) => readings.push(reading),
                Err(err) => {
                    warn!("Skipping raw biometric row: {}", err);
                    report.skipped_rows += 1;
                }
            }
        }

        let summaries: Vec<HourlySummaryRow> = aggregate(&readings)
            .iter()
            .map(conversions::convert_to_data_hourly_summary)
            .collect();

        report.aggregates_upserted = self.repository.upsert_hourly_aggregates(&summaries).await?;

        info!(
            "Completed hourly aggregation: raw_rows={}, skipped={}, aggregates={}",
            report.raw_rows, report.skipped_rows, report.aggregates_upserted
        );

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use biometric_trends_data::models::{biometric_types, CreateBiometricRequest};
    use biometric_trends_data::repository::tests::MockBiometricRepository;
    use biometric_trends_data::repository::BiometricRepository;
    use chrono::{DateTime, TimeZone, Utc};

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 2, 10, hour, minute, 0).unwrap()
    }

    #[tokio::test]
    async fn test_run_writes_hourly_summaries() {
        let repo = BiometricRepository::in_memory();
        for (minute, value) in [(15, 100.0), (45, 120.0)] {
            repo.store_measurement(CreateBiometricRequest::scalar(1, biometric_types::GLUCOSE, value, at(10, minute)))
                .await
                .unwrap();
        }
        repo.store_measurement(CreateBiometricRequest::blood_pressure(1, 118, 76, at(11, 5)))
            .await
            .unwrap();

        let report = HourlyAggregationService::new(repo.clone()).run().await.unwrap();
        assert_eq!(report.raw_rows, 4);
        assert_eq!(report.aggregates_upserted, 3);

        let summaries = repo.get_hourly_summaries(1).await.unwrap();
        let glucose = summaries
            .iter()
            .find(|s| s.biometric_type == biometric_types::GLUCOSE)
            .unwrap();
        assert_eq!(glucose.hour_start, at(10, 0));
        assert_eq!(glucose.min_value, 100.0);
        assert_eq!(glucose.max_value, 120.0);
        assert_eq!(glucose.avg_value, 110.0);
        assert_eq!(glucose.count, 2);

        let systolic = summaries
            .iter()
            .find(|s| s.biometric_type == biometric_types::BLOOD_PRESSURE_SYSTOLIC)
            .unwrap();
        assert_eq!((systolic.hour_start, systolic.avg_value), (at(11, 0), 118.0));
    }

    #[tokio::test]
    async fn test_rerun_overwrites_instead_of_duplicating() {
        let repo = BiometricRepository::in_memory();
        repo.store_measurement(CreateBiometricRequest::scalar(1, biometric_types::WEIGHT, 70.0, at(9, 0)))
            .await
            .unwrap();
        let service = HourlyAggregationService::new(repo.clone());
        service.run().await.unwrap();

        repo.store_measurement(CreateBiometricRequest::scalar(1, biometric_types::WEIGHT, 72.0, at(9, 30)))
            .await
            .unwrap();
        service.run().await.unwrap();
        service.run().await.unwrap();

        let summaries = repo.get_hourly_summaries(1).await.unwrap();
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].count, 2);
        assert_eq!(summaries[0].avg_value, 71.0);
    }

    #[tokio::test]
    async fn test_empty_source_is_a_no_op() {
        let repo = MockBiometricRepository::new().with_aggregate_upsert_failure();
        let report = HourlyAggregationService::new(repo).run().await.unwrap();
        assert_eq!(report, AggregationReport::default());
    }

    #[tokio::test]
    async fn test_upsert_failure_fails_the_run() {
        let repo = MockBiometricRepository::new().with_aggregate_upsert_failure();
        repo.store_measurement(CreateBiometricRequest::scalar(1, biometric_types::GLUCOSE, 99.0, at(8, 0)))
            .await
            .unwrap();

        let err = HourlyAggregationService::new(repo).run().await.unwrap_err();
        assert!(matches!(err, AggregationError::Repository(_)));
    }
}
