use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, info};

use biometric_trends_data::repository::{BiometricRepositoryTrait, RepositoryError};

use crate::config::AnalysisConfig;
use crate::entities::conversions;
use crate::entities::{MetricType, TrendLabel, TrendResult, TrendStatistics};
use crate::services::classifier::classify;
use crate::services::statistics::{self, StatisticsError};

/// Errors of a single patient/metric analysis
#[derive(Debug, Error)]
pub enum TrendAnalysisError {
    /// Repository error
    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),

    /// Stored measurement does not match its metric type
    #[error("Invalid measurement: {0}")]
    InvalidMeasurement(String),

    /// Statistics could not be computed
    #[error("Statistics error: {0}")]
    Statistics(#[from] StatisticsError),

    /// The analysis window cannot be placed before the analysis time
    #[error("Invalid analysis window: {0}")]
    InvalidWindow(String),
}

/// A patient/metric unit that failed during a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisFailure {
    pub patient_id: i64,
    pub metric_type: MetricType,
    pub error: String,
}

/// Summary of one analysis run over every patient
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisReport {
    /// Patients visited
    pub patients: usize,
    /// Units that received a trend label from their statistics
    pub analyzed: usize,
    /// Units recorded as insufficient data
    pub insufficient_data: usize,
    /// Units that failed
    pub failed: usize,
    pub failures: Vec<AnalysisFailure>,
}

impl AnalysisReport {
    fn record(&mut self, patient_id: i64, metric_type: MetricType, outcome: Result<TrendResult, TrendAnalysisError>) {
        match outcome {
            Ok(result) if result.label == TrendLabel::InsufficientData => self.insufficient_data += 1,
            Ok(_) => self.analyzed += 1,
            Err(err) => {
                self.failed += 1;
                self.failures.push(AnalysisFailure {
                    patient_id,
                    metric_type,
                    error: err.to_string(),
                });
            }
        }
    }
}

/// Trend analysis over every patient's biometric series
pub struct TrendAnalysisService<R: BiometricRepositoryTrait> {
    repository: R,
    config: AnalysisConfig,
}

impl<R: BiometricRepositoryTrait> TrendAnalysisService<R> {
    /// Create a new trend analysis service
    pub fn new(repository: R, config: AnalysisConfig) -> Self {
        Self { repository, config }
    }

    /// Start of the analysis window ending at `now`
    fn window_start(&self, now: DateTime<Utc>) -> Result<DateTime<Utc>, TrendAnalysisError> {
        self.config
            .window()
            .and_then(|window| now.checked_sub_signed(window))
            .ok_or_else(|| {
                TrendAnalysisError::InvalidWindow(format!(
                    "{} hours before {} is out of range",
                    self.config.window_hours, now
                ))
            })
    }

    /// Analyze one patient's metric now and persist the label
    pub async fn analyze_patient_metric(
        &self,
        patient_id: i64,
        metric_type: MetricType,
    ) -> Result<TrendResult, TrendAnalysisError> {
        self.analyze_patient_metric_at(patient_id, metric_type, Utc::now()).await
    }

    /// Analyze one patient's metric as of `now` and persist the label.
    ///
    /// The window ends at `now`, which is also the recorded analysis time.
    pub async fn analyze_patient_metric_at(
        &self,
        patient_id: i64,
        metric_type: MetricType,
        now: DateTime<Utc>,
    ) -> Result<TrendResult, TrendAnalysisError> {
        let since = self.window_start(now)?;
        let rows = self
            .repository
            .fetch_measurements(patient_id, metric_type.as_str(), since)
            .await?;

        let measurements = rows
            .into_iter()
            .map(conversions::convert_to_domain_measurement)
            .collect::<Result<Vec<_>, _>>()
            .map_err(TrendAnalysisError::InvalidMeasurement)?;

        let result = if measurements.len() < self.config.min_data_points {
            debug!(
                "Insufficient data for patient {} {}: {} of {} points",
                patient_id,
                metric_type,
                measurements.len(),
                self.config.min_data_points
            );
            TrendResult::insufficient_data(patient_id, metric_type, measurements.len(), now)
        } else {
            let points: Vec<(DateTime<Utc>, f64)> = measurements
                .iter()
                .map(|m| (m.timestamp, m.value.scalar()))
                .collect();
            let values: Vec<f64> = points.iter().map(|(_, value)| *value).collect();

            let mut linear_trend = statistics::linear_trend(&points)?;
            linear_trend.slope *= self.config.slope_unit.scale();

            let trend_statistics = TrendStatistics {
                linear_trend,
                percentage_change: statistics::percentage_change(&values),
                volatility: statistics::volatility(&values),
                seasonal: statistics::seasonal_decomposition(&points),
            };

            let label = classify(
                metric_type,
                &trend_statistics.linear_trend,
                trend_statistics.percentage_change,
                trend_statistics.volatility,
            );

            info!(
                patient_id,
                metric_type = %metric_type,
                slope = trend_statistics.linear_trend.slope,
                r_squared = trend_statistics.linear_trend.r_squared,
                percentage_change = trend_statistics.percentage_change,
                volatility = trend_statistics.volatility,
                trend_strength = trend_statistics.seasonal.map(|s| s.trend_strength),
                seasonality_strength = trend_statistics.seasonal.map(|s| s.seasonality_strength),
                "Classified trend as {}",
                label
            );

            TrendResult::classified(patient_id, metric_type, label, trend_statistics, measurements.len(), now)
        };

        self.repository
            .upsert_trend(conversions::convert_to_data_trend_row(&result))
            .await?;

        Ok(result)
    }

    /// Analyze every metric of every patient now
    pub async fn analyze_all_patients(&self) -> Result<AnalysisReport, TrendAnalysisError> {
        self.analyze_all_patients_at(Utc::now()).await
    }

    /// Analyze every metric of every patient as of `now`.
    ///
    /// Patients are paged by `patient_batch_size`. A failing unit is logged and
    /// reported without stopping the run; only a failure to page through the
    /// patients aborts it.
    pub async fn analyze_all_patients_at(&self, now: DateTime<Utc>) -> Result<AnalysisReport, TrendAnalysisError> {
        info!("Starting trend analysis for all patients");
        self.window_start(now)?;

        let batch_size = self.config.patient_batch_size.max(1);
        let concurrency = self.config.concurrency.max(1);
        let mut report = AnalysisReport::default();
        let mut offset = 0;

        loop {
            let patient_ids = self.repository.fetch_patient_ids(offset, batch_size).await?;
            if patient_ids.is_empty() {
                break;
            }
            debug!("Analyzing batch of {} patients at offset {}", patient_ids.len(), offset);

            let units: Vec<(i64, MetricType)> = patient_ids
                .iter()
                .flat_map(|&patient_id| MetricType::ALL.into_iter().map(move |metric| (patient_id, metric)))
                .collect();

            let outcomes: Vec<_> = stream::iter(units)
                .map(|(patient_id, metric_type)| async move {
                    let outcome = self.analyze_patient_metric_at(patient_id, metric_type, now).await;
                    (patient_id, metric_type, outcome)
                })
                .buffer_unordered(concurrency)
                .collect()
                .await;

            for (patient_id, metric_type, outcome) in outcomes {
                if let Err(err) = &outcome {
                    error!(
                        patient_id,
                        metric_type = %metric_type,
                        "Error analyzing trend: {}",
                        err
                    );
                }
                report.record(patient_id, metric_type, outcome);
            }

            report.patients += patient_ids.len();
            if patient_ids.len() < batch_size {
                break;
            }
            offset += patient_ids.len();
        }

        report.failures.sort_by_key(|f| (f.patient_id, f.metric_type));

        info!(
            "Completed trend analysis: patients={}, analyzed={}, insufficient_data={}, failed={}",
            report.patients, report.analyzed, report.insufficient_data, report.failed
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
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 7, 1, 12, 0, 0).unwrap()
    }

    async fn seed_hourly<R: BiometricRepositoryTrait>(repo: &R, patient_id: i64, metric: &str, values: &[f64]) {
        repo.register_patient(patient_id, None).await.unwrap();
        let start = now() - Duration::hours(values.len() as i64);
        for (i, value) in values.iter().enumerate() {
            repo.store_measurement(CreateBiometricRequest::scalar(
                patient_id,
                metric,
                *value,
                start + Duration::hours(i as i64),
            ))
            .await
            .unwrap();
        }
    }

    fn service<R: BiometricRepositoryTrait>(repo: R) -> TrendAnalysisService<R> {
        TrendAnalysisService::new(repo, AnalysisConfig::default())
    }

    #[tokio::test]
    async fn test_spiking_glucose_is_volatile() {
        let repo = BiometricRepository::in_memory();
        seed_hourly(&repo, 1, biometric_types::GLUCOSE, &[90.0, 95.0, 100.0, 150.0, 200.0]).await;

        let result = service(repo.clone())
            .analyze_patient_metric_at(1, MetricType::Glucose, now())
            .await
            .unwrap();

        assert_eq!(result.label, TrendLabel::Volatile);
        assert_eq!(result.data_points, 5);
        let stats = result.statistics.unwrap();
        assert!(stats.volatility > 0.2);
        assert!(stats.seasonal.is_none());

        let stored = repo.get_trend(1, biometric_types::GLUCOSE).await.unwrap().unwrap();
        assert_eq!(stored.trend, "volatile");
        assert_eq!(stored.analyzed_at, now());
    }

    #[tokio::test]
    async fn test_flat_weight_is_stable() {
        let repo = BiometricRepository::in_memory();
        seed_hourly(&repo, 1, biometric_types::WEIGHT, &[70.0, 70.1, 69.9, 70.0]).await;

        let config = AnalysisConfig {
            min_data_points: 4,
            ..AnalysisConfig::default()
        };
        let result = TrendAnalysisService::new(repo, config)
            .analyze_patient_metric_at(1, MetricType::Weight, now())
            .await
            .unwrap();

        assert_eq!(result.label, TrendLabel::Stable);
    }

    #[tokio::test]
    async fn test_steady_rise_and_fall() {
        let repo = BiometricRepository::in_memory();
        seed_hourly(&repo, 1, biometric_types::GLUCOSE, &[100.0, 102.0, 104.0, 106.0, 108.0]).await;
        seed_hourly(&repo, 2, biometric_types::GLUCOSE, &[108.0, 106.0, 104.0, 102.0, 100.0]).await;
        let service = service(repo);

        let rising = service.analyze_patient_metric_at(1, MetricType::Glucose, now()).await.unwrap();
        let falling = service.analyze_patient_metric_at(2, MetricType::Glucose, now()).await.unwrap();

        assert_eq!(rising.label, TrendLabel::Increasing);
        assert_eq!(falling.label, TrendLabel::Decreasing);
    }

    #[tokio::test]
    async fn test_short_series_is_insufficient_data() {
        let repo = BiometricRepository::in_memory();
        seed_hourly(&repo, 1, biometric_types::GLUCOSE, &[90.0, 95.0, 300.0, 20.0]).await;

        let result = service(repo.clone())
            .analyze_patient_metric_at(1, MetricType::Glucose, now())
            .await
            .unwrap();

        assert_eq!(result.label, TrendLabel::InsufficientData);
        assert!(result.statistics.is_none());
        let stored = repo.get_trend(1, biometric_types::GLUCOSE).await.unwrap().unwrap();
        assert_eq!(stored.trend, "insufficient_data");
    }

    #[tokio::test]
    async fn test_measurements_outside_window_are_ignored() {
        let repo = BiometricRepository::in_memory();
        repo.register_patient(1, None).await.unwrap();
        let old = now() - Duration::days(45);
        for i in 0..10 {
            repo.store_measurement(CreateBiometricRequest::scalar(
                1,
                biometric_types::WEIGHT,
                80.0 + i as f64,
                old + Duration::hours(i),
            ))
            .await
            .unwrap();
        }

        let result = service(repo)
            .analyze_patient_metric_at(1, MetricType::Weight, now())
            .await
            .unwrap();
        assert_eq!(result.label, TrendLabel::InsufficientData);
        assert_eq!(result.data_points, 0);
    }

    #[tokio::test]
    async fn test_blood_pressure_uses_component_mean() {
        let repo = BiometricRepository::in_memory();
        repo.register_patient(1, None).await.unwrap();
        let start = now() - Duration::hours(5);
        for i in 0..5 {
            repo.store_measurement(CreateBiometricRequest::blood_pressure(
                1,
                120 + i * 2,
                80 + i * 2,
                start + Duration::hours(i as i64),
            ))
            .await
            .unwrap();
        }

        let result = service(repo)
            .analyze_patient_metric_at(1, MetricType::BloodPressure, now())
            .await
            .unwrap();

        // Means run 100, 102, ... 108
        let stats = result.statistics.unwrap();
        assert!((stats.percentage_change - 8.0).abs() < 1e-9);
        assert_eq!(result.label, TrendLabel::Increasing);
    }

    #[tokio::test]
    async fn test_per_day_slope_unit() {
        let repo = BiometricRepository::in_memory();
        seed_hourly(&repo, 1, biometric_types::GLUCOSE, &[100.0, 102.0, 104.0, 106.0, 108.0]).await;
        let config = AnalysisConfig {
            slope_unit: crate::config::SlopeUnit::PerDay,
            ..AnalysisConfig::default()
        };

        let result = TrendAnalysisService::new(repo, config)
            .analyze_patient_metric_at(1, MetricType::Glucose, now())
            .await
            .unwrap();

        let slope = result.statistics.unwrap().linear_trend.slope;
        assert!((slope - 48.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_failures_are_isolated_per_unit() {
        let repo = MockBiometricRepository::new().with_failing_patient(2);
        for patient_id in 1..=3 {
            seed_hourly(&repo, patient_id, biometric_types::GLUCOSE, &[100.0, 101.0, 100.0, 101.0, 100.0]).await;
        }

        let report = service(repo.clone()).analyze_all_patients_at(now()).await.unwrap();

        assert_eq!(report.patients, 3);
        assert_eq!(report.analyzed, 2);
        assert_eq!(report.insufficient_data, 4);
        assert_eq!(report.failed, 3);
        assert!(report.failures.iter().all(|f| f.patient_id == 2));
        assert_eq!(repo.measurement_fetches(), 9);

        assert!(repo.get_trend(1, biometric_types::GLUCOSE).await.unwrap().is_some());
        assert!(repo.get_trend(2, biometric_types::GLUCOSE).await.unwrap().is_none());
        assert!(repo.get_trend(3, biometric_types::WEIGHT).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_persistence_failure_is_reported() {
        let repo = MockBiometricRepository::new().with_trend_upsert_failure();
        seed_hourly(&repo, 1, biometric_types::WEIGHT, &[70.0, 70.0, 70.0, 70.0, 70.0]).await;

        let err = service(repo.clone())
            .analyze_patient_metric_at(1, MetricType::Weight, now())
            .await
            .unwrap_err();
        assert!(matches!(err, TrendAnalysisError::Repository(_)));

        let report = service(repo).analyze_all_patients_at(now()).await.unwrap();
        assert_eq!(report.failed, 3);
    }

    #[tokio::test]
    async fn test_paging_and_concurrency_cover_every_patient() {
        let repo = BiometricRepository::in_memory();
        for patient_id in 1..=5 {
            seed_hourly(&repo, patient_id, biometric_types::GLUCOSE, &[100.0, 102.0, 104.0, 106.0, 108.0]).await;
        }
        let config = AnalysisConfig {
            patient_batch_size: 2,
            concurrency: 4,
            ..AnalysisConfig::default()
        };

        let service = TrendAnalysisService::new(repo.clone(), config);
        let report = service.analyze_all_patients_at(now()).await.unwrap();
        assert_eq!(report.patients, 5);
        assert_eq!(report.analyzed, 5);
        assert_eq!(report.insufficient_data, 10);
        assert_eq!(report.failed, 0);

        // A second run overwrites the same rows
        let later = now() + Duration::minutes(5);
        service.analyze_all_patients_at(later).await.unwrap();
        for patient_id in 1..=5 {
            let stored = repo.get_trend(patient_id, biometric_types::GLUCOSE).await.unwrap().unwrap();
            assert_eq!(stored.trend, "increasing");
            assert_eq!(stored.analyzed_at, later);
        }
    }

    #[tokio::test]
    async fn test_out_of_range_window_fails_the_run_without_panicking() {
        let repo = BiometricRepository::in_memory();
        seed_hourly(&repo, 1, biometric_types::GLUCOSE, &[100.0, 101.0, 100.0, 101.0, 100.0]).await;

        for window_hours in [3_000_000_000, i64::MAX] {
            let config = AnalysisConfig {
                window_hours,
                ..AnalysisConfig::default()
            };
            let err = TrendAnalysisService::new(repo.clone(), config)
                .analyze_all_patients_at(now())
                .await
                .unwrap_err();
            assert!(matches!(err, TrendAnalysisError::InvalidWindow(_)), "window_hours={}", window_hours);
        }
        assert!(repo.get_trend(1, biometric_types::GLUCOSE).await.unwrap().is_none());

        let config = AnalysisConfig {
            window_hours: crate::config::MAX_WINDOW_HOURS,
            ..AnalysisConfig::default()
        };
        let err = TrendAnalysisService::new(repo, config)
            .analyze_patient_metric_at(1, MetricType::Glucose, DateTime::<Utc>::MIN_UTC + Duration::hours(1))
            .await
            .unwrap_err();
        assert!(matches!(err, TrendAnalysisError::InvalidWindow(_)));
    }

    #[tokio::test]
    async fn test_no_patients_is_an_empty_report() {
        let report = service(BiometricRepository::in_memory())
            .analyze_all_patients_at(now())
            .await
            .unwrap();
        assert_eq!(report, AnalysisReport::default());
    }
}
