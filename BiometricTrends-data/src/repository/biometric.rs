use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::debug;

use crate::database::DatabasePool;
use crate::models::{
    BiometricRow, BiometricTrendRow, CreateBiometricRequest, HourlySummaryRow, PatientRow, RawBiometricRow,
};
use super::errors::RepositoryError;
use super::in_memory::InMemoryStorage;
use super::storage::DatabaseStorage;

/// Repository trait for biometric measurements and the analytics written from them
#[async_trait]
pub trait BiometricRepositoryTrait: Send + Sync {
    /// Register a patient, keeping the existing row if the id is already known
    async fn register_patient(&self, id: i64, name: Option<String>) -> Result<PatientRow, RepositoryError>;

    /// Store a new biometric measurement
    async fn store_measurement(&self, request: CreateBiometricRequest) -> Result<BiometricRow, RepositoryError>;

    /// Get one page of patient ids, ordered by id
    async fn fetch_patient_ids(&self, offset: usize, limit: usize) -> Result<Vec<i64>, RepositoryError>;

    /// Get a patient's measurements of one type taken at or after `since`, oldest first
    async fn fetch_measurements(
        &self,
        patient_id: i64,
        biometric_type: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<BiometricRow>, RepositoryError>;

    /// Insert or replace the trend keyed by (patient_id, biometric_type)
    async fn upsert_trend(&self, trend: BiometricTrendRow) -> Result<(), RepositoryError>;

    /// Get the stored trend of a patient's biometric
    async fn get_trend(
        &self,
        patient_id: i64,
        biometric_type: &str,
    ) -> Result<Option<BiometricTrendRow>, RepositoryError>;

    /// Get every value that feeds the hourly aggregation, blood pressure split per component
    async fn fetch_raw_biometrics_for_aggregation(&self) -> Result<Vec<RawBiometricRow>, RepositoryError>;

    /// Insert or overwrite summaries keyed by (patient_id, biometric_type, hour_start)
    async fn upsert_hourly_aggregates(&self, rows: &[HourlySummaryRow]) -> Result<usize, RepositoryError>;

    /// Get a patient's hourly summaries
    async fn get_hourly_summaries(&self, patient_id: i64) -> Result<Vec<HourlySummaryRow>, RepositoryError>;
}

#[derive(Debug, Clone)]
enum StorageBackend {
    Database(DatabasePool),
    InMemory(InMemoryStorage),
}

/// Repository for biometric data.
/// Backed by an explicitly constructed database pool, or by in-memory storage when no database is used.
#[derive(Debug, Clone)]
pub struct BiometricRepository {
    backend: StorageBackend,
}

impl BiometricRepository {
    /// Create a repository on top of a database pool
    pub fn new(pool: DatabasePool) -> Self {
        Self {
            backend: StorageBackend::Database(pool),
        }
    }

    /// Create a repository that keeps everything in process memory
    pub fn in_memory() -> Self {
        Self {
            backend: StorageBackend::InMemory(InMemoryStorage::new()),
        }
    }

    /// Whether writes outlive the process
    pub fn is_persistent(&self) -> bool {
        matches!(self.backend, StorageBackend::Database(_))
    }
}

#[async_trait]
impl BiometricRepositoryTrait for BiometricRepository {
    async fn register_patient(&self, id: i64, name: Option<String>) -> Result<PatientRow, RepositoryError> {
        match &self.backend {
            StorageBackend::Database(pool) => DatabaseStorage::register_patient(pool, id, name).await,
            StorageBackend::InMemory(storage) => storage.register_patient(id, name).await,
        }
    }

    async fn store_measurement(&self, request: CreateBiometricRequest) -> Result<BiometricRow, RepositoryError> {
        request.validate()?;

        match &self.backend {
            StorageBackend::Database(pool) => DatabaseStorage::store_measurement(pool, request).await,
            StorageBackend::InMemory(storage) => {
                debug!("Storing {} measurement in memory", request.biometric_type);
                storage.store_measurement(request).await
            }
        }
    }

    async fn fetch_patient_ids(&self, offset: usize, limit: usize) -> Result<Vec<i64>, RepositoryError> {
        match &self.backend {
            StorageBackend::Database(pool) => DatabaseStorage::fetch_patient_ids(pool, offset, limit).await,
            StorageBackend::InMemory(storage) => storage.fetch_patient_ids(offset, limit).await,
        }
    }

    async fn fetch_measurements(
        &self,
        patient_id: i64,
        biometric_type: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<BiometricRow>, RepositoryError> {
        match &self.backend {
            StorageBackend::Database(pool) => {
                DatabaseStorage::fetch_measurements(pool, patient_id, biometric_type, since).await
            }
            StorageBackend::InMemory(storage) => storage.fetch_measurements(patient_id, biometric_type, since).await,
        }
    }

    async fn upsert_trend(&self, trend: BiometricTrendRow) -> Result<(), RepositoryError> {
        match &self.backend {
            StorageBackend::Database(pool) => DatabaseStorage::upsert_trend(pool, &trend).await,
            StorageBackend::InMemory(storage) => storage.upsert_trend(&trend).await,
        }
    }

    async fn get_trend(
        &self,
        patient_id: i64,
        biometric_type: &str,
    ) -> Result<Option<BiometricTrendRow>, RepositoryError> {
        match &self.backend {
            StorageBackend::Database(pool) => DatabaseStorage::get_trend(pool, patient_id, biometric_type).await,
            StorageBackend::InMemory(storage) => storage.get_trend(patient_id, biometric_type).await,
        }
    }

    async fn fetch_raw_biometrics_for_aggregation(&self) -> Result<Vec<RawBiometricRow>, RepositoryError> {
        match &self.backend {
            StorageBackend::Database(pool) => DatabaseStorage::fetch_raw_biometrics_for_aggregation(pool).await,
            StorageBackend::InMemory(storage) => storage.fetch_raw_biometrics_for_aggregation().await,
        }
    }

    async fn upsert_hourly_aggregates(&self, rows: &[HourlySummaryRow]) -> Result<usize, RepositoryError> {
        if rows.iter().any(|row| row.count < 1) {
            return Err(RepositoryError::Validation(
                "hourly summaries must cover at least one reading".to_string(),
            ));
        }

        match &self.backend {
            StorageBackend::Database(pool) => DatabaseStorage::upsert_hourly_aggregates(pool, rows).await,
            StorageBackend::InMemory(storage) => storage.upsert_hourly_aggregates(rows).await,
        }
    }

    async fn get_hourly_summaries(&self, patient_id: i64) -> Result<Vec<HourlySummaryRow>, RepositoryError> {
        match &self.backend {
            StorageBackend::Database(pool) => DatabaseStorage::get_hourly_summaries(pool, patient_id).await,
            StorageBackend::InMemory(storage) => storage.get_hourly_summaries(patient_id).await,
        }
    }
}

/// Mock biometric repository for testing
#[cfg(any(test, feature = "mock"))]
pub mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// In-memory repository that can be told to fail specific operations
    #[derive(Debug, Clone, Default)]
    pub struct MockBiometricRepository {
        storage: InMemoryStorage,
        failing_patients: HashSet<i64>,
        fail_trend_upserts: bool,
        fail_aggregate_upserts: bool,
        measurement_fetches: Arc<AtomicUsize>,
    }

    impl MockBiometricRepository {
        /// Create a new empty mock repository
        pub fn new() -> Self {
            Self::default()
        }

        /// Make every measurement fetch for this patient fail
        pub fn with_failing_patient(mut self, patient_id: i64) -> Self {
            self.failing_patients.insert(patient_id);
            self
        }

        /// Make every trend upsert fail
        pub fn with_trend_upsert_failure(mut self) -> Self {
            self.fail_trend_upserts = true;
            self
        }

        /// Make every hourly summary upsert fail
        pub fn with_aggregate_upsert_failure(mut self) -> Self {
            self.fail_aggregate_upserts = true;
            self
        }

        /// Number of measurement fetches served so far
        pub fn measurement_fetches(&self) -> usize {
            self.measurement_fetches.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl BiometricRepositoryTrait for MockBiometricRepository {
        async fn register_patient(&self, id: i64, name: Option<String>) -> Result<PatientRow, RepositoryError> {
            self.storage.register_patient(id, name).await
        }

        async fn store_measurement(&self, request: CreateBiometricRequest) -> Result<BiometricRow, RepositoryError> {
            self.storage.store_measurement(request).await
        }

        async fn fetch_patient_ids(&self, offset: usize, limit: usize) -> Result<Vec<i64>, RepositoryError> {
            self.storage.fetch_patient_ids(offset, limit).await
        }

        async fn fetch_measurements(
            &self,
            patient_id: i64,
            biometric_type: &str,
            since: DateTime<Utc>,
        ) -> Result<Vec<BiometricRow>, RepositoryError> {
            self.measurement_fetches.fetch_add(1, Ordering::SeqCst);
            if self.failing_patients.contains(&patient_id) {
                return Err(RepositoryError::Lock(format!(
                    "mock is configured to fail reads for patient {}",
                    patient_id
                )));
            }
            self.storage.fetch_measurements(patient_id, biometric_type, since).await
        }

        async fn upsert_trend(&self, trend: BiometricTrendRow) -> Result<(), RepositoryError> {
            if self.fail_trend_upserts {
                return Err(RepositoryError::Lock("mock is configured to fail trend upserts".to_string()));
            }
            self.storage.upsert_trend(&trend).await
        }

        async fn get_trend(
            &self,
            patient_id: i64,
            biometric_type: &str,
        ) -> Result<Option<BiometricTrendRow>, RepositoryError> {
            self.storage.get_trend(patient_id, biometric_type).await
        }

        async fn fetch_raw_biometrics_for_aggregation(&self) -> Result<Vec<RawBiometricRow>, RepositoryError> {
            self.storage.fetch_raw_biometrics_for_aggregation().await
        }

        async fn upsert_hourly_aggregates(&self, rows: &[HourlySummaryRow]) -> Result<usize, RepositoryError> {
            if self.fail_aggregate_upserts {
                return Err(RepositoryError::Lock("mock is configured to fail summary upserts".to_string()));
            }
            self.storage.upsert_hourly_aggregates(rows).await
        }

        async fn get_hourly_summaries(&self, patient_id: i64) -> Result<Vec<HourlySummaryRow>, RepositoryError> {
            self.storage.get_hourly_summaries(patient_id).await
        }
    }
}

#[cfg(test)]
mod backend_tests {
    use super::tests::MockBiometricRepository;
    use super::*;
    use crate::models::biometric_types;
    use chrono::{Duration, TimeZone};

    fn base_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap()
    }

    fn repositories() -> Vec<BiometricRepository> {
        vec![
            BiometricRepository::in_memory(),
            BiometricRepository::new(DatabasePool::in_memory().unwrap()),
        ]
    }

    #[tokio::test]
    async fn test_fetch_measurements_is_windowed_and_ordered() {
        for repo in repositories() {
            let t0 = base_time();
            for (offset, value) in [(3, 103.0), (1, 101.0), (0, 100.0), (2, 102.0)] {
                repo.store_measurement(CreateBiometricRequest::scalar(
                    1,
                    biometric_types::GLUCOSE,
                    value,
                    t0 + Duration::hours(offset),
                ))
                .await
                .unwrap();
            }
            repo.store_measurement(CreateBiometricRequest::scalar(1, biometric_types::WEIGHT, 70.0, t0))
                .await
                .unwrap();
            repo.store_measurement(CreateBiometricRequest::scalar(2, biometric_types::GLUCOSE, 90.0, t0))
                .await
                .unwrap();

            let rows = repo
                .fetch_measurements(1, biometric_types::GLUCOSE, t0 + Duration::hours(1))
                .await
                .unwrap();
            let values: Vec<f64> = rows.iter().filter_map(|r| r.value).collect();
            assert_eq!(values, vec![101.0, 102.0, 103.0], "persistent={}", repo.is_persistent());
        }
    }

    #[tokio::test]
    async fn test_store_measurement_rejects_mismatched_columns() {
        for repo in repositories() {
            let mut request = CreateBiometricRequest::scalar(1, biometric_types::GLUCOSE, 100.0, base_time());
            request.value = None;

            let err = repo.store_measurement(request).await.unwrap_err();
            assert!(matches!(err, RepositoryError::Validation(_)));
        }
    }

    #[tokio::test]
    async fn test_store_measurement_replaces_reading_at_same_timestamp() {
        for repo in repositories() {
            let t0 = base_time();
            let first = repo
                .store_measurement(CreateBiometricRequest::scalar(1, biometric_types::GLUCOSE, 100.0, t0))
                .await
                .unwrap();
            let second = repo
                .store_measurement(CreateBiometricRequest::scalar(1, biometric_types::GLUCOSE, 140.0, t0))
                .await
                .unwrap();
            assert_eq!(first.id, second.id, "persistent={}", repo.is_persistent());

            // Other types at the same instant are separate entries
            repo.store_measurement(CreateBiometricRequest::scalar(1, biometric_types::WEIGHT, 70.0, t0))
                .await
                .unwrap();

            let rows = repo.fetch_measurements(1, biometric_types::GLUCOSE, t0).await.unwrap();
            assert_eq!(rows.len(), 1);
            assert_eq!(rows[0].value, Some(140.0));
            assert_eq!(repo.fetch_raw_biometrics_for_aggregation().await.unwrap().len(), 2);
        }
    }

    #[tokio::test]
    async fn test_patient_pages() {
        for repo in repositories() {
            for id in [5, 1, 3, 2, 4] {
                repo.register_patient(id, None).await.unwrap();
            }
            // Registering again keeps the original row
            let again = repo.register_patient(3, Some("renamed".to_string())).await.unwrap();
            assert_eq!(again.name, None);

            assert_eq!(repo.fetch_patient_ids(0, 2).await.unwrap(), vec![1, 2]);
            assert_eq!(repo.fetch_patient_ids(2, 2).await.unwrap(), vec![3, 4]);
            assert_eq!(repo.fetch_patient_ids(4, 2).await.unwrap(), vec![5]);
            assert!(repo.fetch_patient_ids(6, 2).await.unwrap().is_empty());
        }
    }

    #[tokio::test]
    async fn test_upsert_trend_keeps_one_row_per_key() {
        for repo in repositories() {
            let first = BiometricTrendRow {
                patient_id: 1,
                biometric_type: biometric_types::WEIGHT.to_string(),
                trend: "stable".to_string(),
                analyzed_at: base_time(),
            };
            repo.upsert_trend(first.clone()).await.unwrap();

            let second = BiometricTrendRow {
                trend: "increasing".to_string(),
                analyzed_at: base_time() + Duration::hours(1),
                ..first
            };
            repo.upsert_trend(second.clone()).await.unwrap();

            let stored = repo.get_trend(1, biometric_types::WEIGHT).await.unwrap();
            assert_eq!(stored, Some(second));
            assert!(repo.get_trend(1, biometric_types::GLUCOSE).await.unwrap().is_none());
        }
    }

    #[tokio::test]
    async fn test_raw_rows_split_blood_pressure() {
        for repo in repositories() {
            let t0 = base_time();
            repo.store_measurement(CreateBiometricRequest::blood_pressure(1, 120, 80, t0))
                .await
                .unwrap();
            let mut systolic_only = CreateBiometricRequest::blood_pressure(1, 130, 85, t0 + Duration::minutes(5));
            systolic_only.diastolic = None;
            repo.store_measurement(systolic_only).await.unwrap();
            repo.store_measurement(CreateBiometricRequest::scalar(1, biometric_types::GLUCOSE, 99.0, t0))
                .await
                .unwrap();

            let rows = repo.fetch_raw_biometrics_for_aggregation().await.unwrap();
            let count = |kind: &str| rows.iter().filter(|r| r.biometric_type == kind).count();
            assert_eq!(rows.len(), 4);
            assert_eq!(count(biometric_types::BLOOD_PRESSURE_SYSTOLIC), 2);
            assert_eq!(count(biometric_types::BLOOD_PRESSURE_DIASTOLIC), 1);
            assert_eq!(count(biometric_types::GLUCOSE), 1);
        }
    }

    #[tokio::test]
    async fn test_upsert_hourly_aggregates_overwrites() {
        for repo in repositories() {
            let row = HourlySummaryRow {
                patient_id: 1,
                biometric_type: biometric_types::GLUCOSE.to_string(),
                hour_start: base_time(),
                min_value: 100.0,
                max_value: 120.0,
                avg_value: 110.0,
                count: 2,
            };
            assert_eq!(repo.upsert_hourly_aggregates(&[row.clone()]).await.unwrap(), 1);

            let replaced = HourlySummaryRow {
                max_value: 140.0,
                avg_value: 120.0,
                count: 3,
                ..row.clone()
            };
            repo.upsert_hourly_aggregates(&[replaced.clone()]).await.unwrap();

            assert_eq!(repo.get_hourly_summaries(1).await.unwrap(), vec![replaced]);
            assert!(repo.get_hourly_summaries(2).await.unwrap().is_empty());

            let empty = HourlySummaryRow { count: 0, ..row };
            assert!(repo.upsert_hourly_aggregates(&[empty]).await.is_err());
        }
    }

    #[tokio::test]
    async fn test_mock_failure_injection() {
        let mock = MockBiometricRepository::new()
            .with_failing_patient(2)
            .with_trend_upsert_failure();

        assert!(mock.fetch_measurements(1, biometric_types::GLUCOSE, base_time()).await.is_ok());
        assert!(mock.fetch_measurements(2, biometric_types::GLUCOSE, base_time()).await.is_err());
        assert_eq!(mock.measurement_fetches(), 2);

        let trend = BiometricTrendRow {
            patient_id: 1,
            biometric_type: biometric_types::GLUCOSE.to_string(),
            trend: "stable".to_string(),
            analyzed_at: base_time(),
        };
        assert!(mock.upsert_trend(trend).await.is_err());
    }
}
