use std::env;
use std::fmt;
use std::str::FromStr;

use chrono::Duration;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};
use validator::Validate;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A value is outside its allowed range
    #[error("Invalid analysis configuration: {0}")]
    Validation(String),
}

/// Time unit of the regression slope fed to the classifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlopeUnit {
    /// Value change per second
    #[default]
    PerSecond,
    /// Value change per day
    PerDay,
}

impl SlopeUnit {
    /// Factor applied to a per-second slope
    pub fn scale(&self) -> f64 {
        match self {
            SlopeUnit::PerSecond => 1.0,
            SlopeUnit::PerDay => 86_400.0,
        }
    }
}

impl fmt::Display for SlopeUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SlopeUnit::PerSecond => f.write_str("per_second"),
            SlopeUnit::PerDay => f.write_str("per_day"),
        }
    }
}

impl FromStr for SlopeUnit {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "per_second" | "second" => Ok(SlopeUnit::PerSecond),
            "per_day" | "day" => Ok(SlopeUnit::PerDay),
            _ => Err(format!("Unknown slope unit: {}", s)),
        }
    }
}

/// Longest accepted analysis window, ten years in hours
pub const MAX_WINDOW_HOURS: i64 = 87_600;

/// Settings of the trend analysis run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct AnalysisConfig {
    /// How far back measurements are pulled, in hours
    #[validate(range(min = 1, max = 87600, message = "window must be between one hour and ten years"))]
    pub window_hours: i64,

    /// Minimum measurements in the window for a trend to be computed
    #[validate(range(min = 2, message = "at least two data points are needed for a regression"))]
    pub min_data_points: usize,

    /// Patients fetched per page
    #[validate(range(min = 1, message = "batch size must be positive"))]
    pub patient_batch_size: usize,

    /// Patient/metric units analyzed at the same time
    #[validate(range(min = 1, max = 64, message = "concurrency must be between 1 and 64"))]
    pub concurrency: usize,

    pub slope_unit: SlopeUnit,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            window_hours: 30 * 24,
            min_data_points: 5,
            patient_batch_size: 100,
            concurrency: 1,
            slope_unit: SlopeUnit::PerSecond,
        }
    }
}

impl AnalysisConfig {
    /// Analysis window as a duration, `None` when it does not fit one
    pub fn window(&self) -> Option<Duration> {
        Duration::try_hours(self.window_hours)
    }

    /// Create the analysis configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the configuration from any key/value source, falling back to
    /// defaults for missing or unparsable values
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let config = Self {
            window_hours: parse_or(&lookup, "TREND_WINDOW_HOURS", defaults.window_hours),
            min_data_points: parse_or(&lookup, "TREND_MIN_DATA_POINTS", defaults.min_data_points),
            patient_batch_size: parse_or(&lookup, "TREND_PATIENT_BATCH_SIZE", defaults.patient_batch_size),
            concurrency: parse_or(&lookup, "TREND_CONCURRENCY", defaults.concurrency),
            slope_unit: parse_or(&lookup, "TREND_SLOPE_UNIT", defaults.slope_unit),
        };

        config.check()?;

        info!(
            "Analysis configuration: window={}h, min_data_points={}, batch_size={}, concurrency={}, slope_unit={}",
            config.window_hours,
            config.min_data_points,
            config.patient_batch_size,
            config.concurrency,
            config.slope_unit
        );

        Ok(config)
    }

    /// Validate the configuration, joining every field error into one message
    pub fn check(&self) -> Result<(), ConfigError> {
        if let Err(validation_errors) = self.validate() {
            let error_message = validation_errors
                .field_errors()
                .iter()
                .map(|(field, errors)| {
                    let error_msgs: Vec<String> = errors
                        .iter()
                        .map(|err| match &err.message {
                            Some(msg) => msg.to_string(),
                            None => format!("invalid {}", field),
                        })
                        .collect();
                    format!("{}: {}", field, error_msgs.join(", "))
                })
                .collect::<Vec<String>>()
                .join("; ");

            return Err(ConfigError::Validation(error_message));
        }

        Ok(())
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(raw) => match raw.trim().parse::<T>() {
            Ok(value) => value,
            Err(_) => {
                warn!("Ignoring unparsable {}={:?}, using the default", key, raw);
                default
            }
        },
        None => default,
    }
}
