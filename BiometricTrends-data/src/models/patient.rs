use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Storage model for a patient. Only the identity matters to the analytics jobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatientRow {
    pub id: i64,
    pub name: Option<String>,
    pub created_at: DateTime<Utc>,
}
