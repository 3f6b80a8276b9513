use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Biometric type names as stored in the `biometric_type` columns
pub mod biometric_types {
    pub const GLUCOSE: &str = "glucose";
    pub const WEIGHT: &str = "weight";
    pub const BLOOD_PRESSURE: &str = "blood_pressure";

    /// Derived series written to the hourly summary table
    pub const BLOOD_PRESSURE_SYSTOLIC: &str = "blood_pressure_systolic";
    pub const BLOOD_PRESSURE_DIASTOLIC: &str = "blood_pressure_diastolic";
}

/// Storage model for a single biometric measurement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BiometricRow {
    /// Row identifier
    pub id: i64,

    /// Patient the measurement belongs to
    pub patient_id: i64,

    /// One of the values in [`biometric_types`]
    pub biometric_type: String,

    /// Scalar value (glucose, weight)
    pub value: Option<f64>,

    /// Systolic pressure (blood pressure only)
    pub systolic: Option<i32>,

    /// Diastolic pressure (blood pressure only)
    pub diastolic: Option<i32>,

    /// Optional unit, e.g. mg/dL, kg, mmHg
    pub unit: Option<String>,

    /// When the measurement was taken
    pub timestamp: DateTime<Utc>,
}

/// Input data for storing a new biometric measurement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateBiometricRequest {
    pub patient_id: i64,
    pub biometric_type: String,
    pub value: Option<f64>,
    pub systolic: Option<i32>,
    pub diastolic: Option<i32>,
    pub unit: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl CreateBiometricRequest {
    /// Request for a scalar measurement such as glucose or weight
    pub fn scalar(patient_id: i64, biometric_type: &str, value: f64, timestamp: DateTime<Utc>) -> Self {
        Self {
            patient_id,
            biometric_type: biometric_type.to_string(),
            value: Some(value),
            systolic: None,
            diastolic: None,
            unit: None,
            timestamp,
        }
    }

    /// Request for a blood pressure measurement
    pub fn blood_pressure(patient_id: i64, systolic: i32, diastolic: i32, timestamp: DateTime<Utc>) -> Self {
        Self {
            patient_id,
            biometric_type: biometric_types::BLOOD_PRESSURE.to_string(),
            value: None,
            systolic: Some(systolic),
            diastolic: Some(diastolic),
            unit: Some("mmHg".to_string()),
            timestamp,
        }
    }

    /// Attach a unit to the request
    pub fn with_unit(mut self, unit: &str) -> Self {
        self.unit = Some(unit.to_string());
        self
    }

    /// Check that the populated columns match the biometric type
    pub fn validate(&self) -> Result<(), String> {
        match self.biometric_type.as_str() {
            biometric_types::GLUCOSE | biometric_types::WEIGHT => match self.value {
                Some(value) if value.is_finite() => Ok(()),
                _ => Err(format!(
                    "invalid {} measurement: a finite value is required",
                    self.biometric_type
                )),
            },
            biometric_types::BLOOD_PRESSURE => {
                if self.systolic.is_none() && self.diastolic.is_none() {
                    Err("invalid blood_pressure measurement: systolic or diastolic is required".to_string())
                } else {
                    Ok(())
                }
            }
            other => Err(format!("invalid biometric type: {}", other)),
        }
    }

    /// Materialize the stored row once an id has been assigned
    pub fn into_row(self, id: i64) -> BiometricRow {
        BiometricRow {
            id,
            patient_id: self.patient_id,
            biometric_type: self.biometric_type,
            value: self.value,
            systolic: self.systolic,
            diastolic: self.diastolic,
            unit: self.unit,
            timestamp: self.timestamp,
        }
    }
}

/// One value of one series, the input of the hourly aggregation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawBiometricRow {
    pub patient_id: i64,

    /// glucose, weight, blood_pressure_systolic or blood_pressure_diastolic
    pub biometric_type: String,

    pub timestamp: DateTime<Utc>,

    pub value: f64,
}

impl BiometricRow {
    /// Rows this measurement contributes to the hourly aggregation.
    ///
    /// Glucose and weight contribute their value when present. Blood pressure
    /// contributes one systolic and one diastolic row, each only when that
    /// component is present. Unknown types contribute nothing.
    pub fn aggregation_rows(&self) -> Vec<RawBiometricRow> {
        let row = |biometric_type: &str, value: f64| RawBiometricRow {
            patient_id: self.patient_id,
            biometric_type: biometric_type.to_string(),
            timestamp: self.timestamp,
            value,
        };

        match self.biometric_type.as_str() {
            biometric_types::GLUCOSE | biometric_types::WEIGHT => self
                .value
                .map(|value| vec![row(&self.biometric_type, value)])
                .unwrap_or_default(),
            biometric_types::BLOOD_PRESSURE => {
                let mut rows = Vec::with_capacity(2);
                if let Some(systolic) = self.systolic {
                    rows.push(row(biometric_types::BLOOD_PRESSURE_SYSTOLIC, f64::from(systolic)));
                }
                if let Some(diastolic) = self.diastolic {
                    rows.push(row(biometric_types::BLOOD_PRESSURE_DIASTOLIC, f64::from(diastolic)));
                }
                rows
            }
            _ => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, hour, minute, 0).unwrap()
    }

    #[test]
    fn test_blood_pressure_expands_into_two_rows() {
        let row = CreateBiometricRequest::blood_pressure(1, 120, 80, at(10, 15)).into_row(1);
        let rows = row.aggregation_rows();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].biometric_type, biometric_types::BLOOD_PRESSURE_SYSTOLIC);
        assert_eq!(rows[0].value, 120.0);
        assert_eq!(rows[1].biometric_type, biometric_types::BLOOD_PRESSURE_DIASTOLIC);
        assert_eq!(rows[1].value, 80.0);
        assert!(rows.iter().all(|r| r.timestamp == at(10, 15) && r.patient_id == 1));
    }

    #[test]
    fn test_blood_pressure_with_one_component_expands_into_one_row() {
        let mut request = CreateBiometricRequest::blood_pressure(1, 120, 80, at(10, 15));
        request.systolic = None;
        let rows = request.into_row(7).aggregation_rows();

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].biometric_type, biometric_types::BLOOD_PRESSURE_DIASTOLIC);
    }

    #[test]
    fn test_scalar_rows() {
        let glucose = CreateBiometricRequest::scalar(2, biometric_types::GLUCOSE, 101.5, at(9, 0)).into_row(1);
        assert_eq!(glucose.aggregation_rows().len(), 1);

        let mut missing = glucose.clone();
        missing.value = None;
        assert!(missing.aggregation_rows().is_empty());

        let mut unknown = glucose;
        unknown.biometric_type = "heart_rate".to_string();
        assert!(unknown.aggregation_rows().is_empty());
    }

    #[test]
    fn test_validate_request() {
        assert!(CreateBiometricRequest::scalar(1, biometric_types::WEIGHT, 70.0, at(8, 0)).validate().is_ok());
        assert!(CreateBiometricRequest::blood_pressure(1, 120, 80, at(8, 0)).validate().is_ok());

        let nan = CreateBiometricRequest::scalar(1, biometric_types::GLUCOSE, f64::NAN, at(8, 0));
        assert!(nan.validate().unwrap_err().contains("finite"));

        let mut empty_bp = CreateBiometricRequest::blood_pressure(1, 120, 80, at(8, 0));
        empty_bp.systolic = None;
        empty_bp.diastolic = None;
        assert!(empty_bp.validate().is_err());

        let unknown = CreateBiometricRequest::scalar(1, "heart_rate", 60.0, at(8, 0));
        assert!(unknown.validate().unwrap_err().contains("heart_rate"));
    }
}
