use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};

use crate::models::{
    BiometricRow, BiometricTrendRow, CreateBiometricRequest, HourlySummaryRow, PatientRow, RawBiometricRow,
};
use super::errors::RepositoryError;

#[derive(Debug, Default)]
struct InMemoryState {
    patients: BTreeMap<i64, PatientRow>,
    biometrics: Vec<BiometricRow>,
    next_biometric_id: i64,
    trends: HashMap<(i64, String), BiometricTrendRow>,
    hourly: BTreeMap<(i64, String, DateTime<Utc>), HourlySummaryRow>,
}

/// In-memory storage implementation mirroring the SQL tables
#[derive(Debug, Clone, Default)]
pub struct InMemoryStorage {
    state: Arc<Mutex<InMemoryState>>,
}

impl InMemoryStorage {
    /// Create a new in-memory storage
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a patient unless one with the same id already exists
    pub async fn register_patient(&self, id: i64, name: Option<String>) -> Result<PatientRow, RepositoryError> {
        let mut state = self.state.lock()?;
        let patient = state.patients.entry(id).or_insert_with(|| PatientRow {
            id,
            name,
            created_at: Utc::now(),
        });
        Ok(patient.clone())
    }

    /// Store a measurement in memory, replacing the reading already stored for
    /// the same patient, type and timestamp
    pub async fn store_measurement(&self, request: CreateBiometricRequest) -> Result<BiometricRow, RepositoryError> {
        let mut state = self.state.lock()?;
        let existing = state.biometrics.iter().position(|row| {
            row.patient_id == request.patient_id
                && row.biometric_type == request.biometric_type
                && row.timestamp == request.timestamp
        });

        match existing {
            Some(index) => {
                let row = request.into_row(state.biometrics[index].id);
                state.biometrics[index] = row.clone();
                Ok(row)
            }
            None => {
                state.next_biometric_id += 1;
                let row = request.into_row(state.next_biometric_id);
                state.biometrics.push(row.clone());
                Ok(row)
            }
        }
    }

    /// Get one page of patient ids, ordered by id
    pub async fn fetch_patient_ids(&self, offset: usize, limit: usize) -> Result<Vec<i64>, RepositoryError> {
        let state = self.state.lock()?;
        Ok(state.patients.keys().skip(offset).take(limit).copied().collect())
    }

    /// Get a patient's measurements of one type taken at or after `since`, oldest first
    pub async fn fetch_measurements(
        &self,
        patient_id: i64,
        biometric_type: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<BiometricRow>, RepositoryError> {
        let state = self.state.lock()?;
        let mut rows: Vec<BiometricRow> = state
            .biometrics
            .iter()
            .filter(|row| {
                row.patient_id == patient_id && row.biometric_type == biometric_type && row.timestamp >= since
            })
            .cloned()
            .collect();

        rows.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then(a.id.cmp(&b.id)));
        Ok(rows)
    }

    /// Insert or replace the trend of a patient's biometric
    pub async fn upsert_trend(&self, trend: &BiometricTrendRow) -> Result<(), RepositoryError> {
        let mut state = self.state.lock()?;
        state
            .trends
            .insert((trend.patient_id, trend.biometric_type.clone()), trend.clone());
        Ok(())
    }

    /// Get the stored trend of a patient's biometric
    pub async fn get_trend(
        &self,
        patient_id: i64,
        biometric_type: &str,
    ) -> Result<Option<BiometricTrendRow>, RepositoryError> {
        let state = self.state.lock()?;
        Ok(state.trends.get(&(patient_id, biometric_type.to_string())).cloned())
    }

    /// Get every value that feeds the hourly aggregation
    pub async fn fetch_raw_biometrics_for_aggregation(&self) -> Result<Vec<RawBiometricRow>, RepositoryError> {
        let state = self.state.lock()?;
        let mut rows: Vec<RawBiometricRow> = state
            .biometrics
            .iter()
            .flat_map(BiometricRow::aggregation_rows)
            .collect();

        rows.sort_by(|a, b| {
            (a.patient_id, &a.biometric_type, a.timestamp).cmp(&(b.patient_id, &b.biometric_type, b.timestamp))
        });
        Ok(rows)
    }

    /// Insert or overwrite hourly summaries
    pub async fn upsert_hourly_aggregates(&self, rows: &[HourlySummaryRow]) -> Result<usize, RepositoryError> {
        let mut state = self.state.lock()?;
        for row in rows {
            state.hourly.insert(
                (row.patient_id, row.biometric_type.clone(), row.hour_start),
                row.clone(),
            );
        }
        Ok(rows.len())
    }

    /// Get a patient's hourly summaries ordered by series and hour
    pub async fn get_hourly_summaries(&self, patient_id: i64) -> Result<Vec<HourlySummaryRow>, RepositoryError> {
        let state = self.state.lock()?;
        Ok(state
            .hourly
            .range((patient_id, String::new(), DateTime::<Utc>::MIN_UTC)..)
            .take_while(|((id, _, _), _)| *id == patient_id)
            .map(|(_, row)| row.clone())
            .collect())
    }
}
