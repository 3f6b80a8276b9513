use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Storage model for the latest trend classification of a patient's biometric
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BiometricTrendRow {
    /// Patient the trend belongs to
    pub patient_id: i64,

    /// glucose, weight or blood_pressure
    pub biometric_type: String,

    /// Trend label as a string, e.g. "increasing" or "insufficient_data"
    pub trend: String,

    /// When the analysis ran
    pub analyzed_at: DateTime<Utc>,
}
