use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Series key of the hourly aggregation.
/// Blood pressure is split into one series per component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregateSeries {
    Glucose,
    Weight,
    BloodPressureSystolic,
    BloodPressureDiastolic,
}

impl AggregateSeries {
    pub fn as_str(&self) -> &'static str {
        match self {
            AggregateSeries::Glucose => "glucose",
            AggregateSeries::Weight => "weight",
            AggregateSeries::BloodPressureSystolic => "blood_pressure_systolic",
            AggregateSeries::BloodPressureDiastolic => "blood_pressure_diastolic",
        }
    }
}

impl fmt::Display for AggregateSeries {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AggregateSeries {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "glucose" => Ok(AggregateSeries::Glucose),
            "weight" => Ok(AggregateSeries::Weight),
            "blood_pressure_systolic" => Ok(AggregateSeries::BloodPressureSystolic),
            "blood_pressure_diastolic" => Ok(AggregateSeries::BloodPressureDiastolic),
            _ => Err(format!("Unknown aggregate series: {}", s)),
        }
    }
}

/// One value of one series, input of the hourly aggregation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawReading {
    pub patient_id: i64,
    pub series: AggregateSeries,
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

/// Summary of one series over one clock hour
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HourlyAggregate {
    pub patient_id: i64,
    pub series: AggregateSeries,
    /// Exact hour boundary
    pub hour_start: DateTime<Utc>,
    pub min_value: f64,
    pub max_value: f64,
    /// Mean rounded to 2 decimal places
    pub avg_value: f64,
    /// Never zero
    pub count: usize,
}
