use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Biometric metric types that can be analyzed for trends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricType {
    Glucose,
    Weight,
    BloodPressure,
}

impl MetricType {
    /// Every metric type, in analysis order
    pub const ALL: [MetricType; 3] = [MetricType::Glucose, MetricType::Weight, MetricType::BloodPressure];

    /// Name used in storage
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricType::Glucose => "glucose",
            MetricType::Weight => "weight",
            MetricType::BloodPressure => "blood_pressure",
        }
    }

    /// Fractional coefficient-of-variation cutoff for this metric.
    ///
    /// Also scales the slope and percentage change bounds of the stable rule.
    pub fn stability_threshold(&self) -> f64 {
        match self {
            MetricType::Glucose => 0.10,
            MetricType::Weight => 0.03,
            MetricType::BloodPressure => 0.07,
        }
    }
}

impl fmt::Display for MetricType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MetricType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "glucose" => Ok(MetricType::Glucose),
            "weight" => Ok(MetricType::Weight),
            "blood_pressure" => Ok(MetricType::BloodPressure),
            _ => Err(format!("Unknown metric type: {}", s)),
        }
    }
}

/// Value carried by a measurement; exactly one shape per metric type
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MeasurementValue {
    /// Glucose or weight
    Scalar(f64),

    /// Blood pressure in mmHg
    BloodPressure { systolic: i32, diastolic: i32 },
}

impl MeasurementValue {
    /// Single number fed to the trend statistics.
    /// Blood pressure uses the mean of both components.
    pub fn scalar(&self) -> f64 {
        match *self {
            MeasurementValue::Scalar(value) => value,
            MeasurementValue::BloodPressure { systolic, diastolic } => {
                (f64::from(systolic) + f64::from(diastolic)) / 2.0
            }
        }
    }
}

/// A single immutable biometric measurement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    pub patient_id: i64,
    pub metric_type: MetricType,
    pub timestamp: DateTime<Utc>,
    pub value: MeasurementValue,
    pub unit: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_type_round_trips_through_str() {
        for metric in MetricType::ALL {
            assert_eq!(metric.as_str().parse::<MetricType>(), Ok(metric));
            assert_eq!(metric.to_string(), metric.as_str());
        }
        assert!("heart_rate".parse::<MetricType>().is_err());
    }

    #[test]
    fn test_stability_thresholds() {
        assert_eq!(MetricType::Glucose.stability_threshold(), 0.10);
        assert_eq!(MetricType::Weight.stability_threshold(), 0.03);
        assert_eq!(MetricType::BloodPressure.stability_threshold(), 0.07);
    }

    #[test]
    fn test_blood_pressure_scalar_is_component_mean() {
        let value = MeasurementValue::BloodPressure {
            systolic: 121,
            diastolic: 80,
        };
        assert_eq!(value.scalar(), 100.5);
        assert_eq!(MeasurementValue::Scalar(98.6).scalar(), 98.6);
    }

    #[test]
    fn test_metric_type_serializes_snake_case() {
        let json = serde_json::to_string(&MetricType::BloodPressure).unwrap();
        assert_eq!(json, "\"blood_pressure\"");
    }
}
