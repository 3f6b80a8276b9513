use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Storage model for one hourly bucket of a patient's biometric series
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HourlySummaryRow {
    pub patient_id: i64,

    /// glucose, weight, blood_pressure_systolic or blood_pressure_diastolic
    pub biometric_type: String,

    /// Start of the hour, always on an exact hour boundary
    pub hour_start: DateTime<Utc>,

    pub min_value: f64,
    pub max_value: f64,

    /// Mean of the bucket, rounded to two decimals
    pub avg_value: f64,

    /// Number of readings in the bucket
    pub count: i64,
}
