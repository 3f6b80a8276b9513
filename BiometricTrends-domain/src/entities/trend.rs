use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::measurement::MetricType;

/// Trend category assigned to a patient's metric series
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendLabel {
    Increasing,
    Decreasing,
    Stable,
    Volatile,
    InsufficientData,
}

impl TrendLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrendLabel::Increasing => "increasing",
            TrendLabel::Decreasing => "decreasing",
            TrendLabel::Stable => "stable",
            TrendLabel::Volatile => "volatile",
            TrendLabel::InsufficientData => "insufficient_data",
        }
    }
}

impl fmt::Display for TrendLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TrendLabel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "increasing" => Ok(TrendLabel::Increasing),
            "decreasing" => Ok(TrendLabel::Decreasing),
            "stable" => Ok(TrendLabel::Stable),
            "volatile" => Ok(TrendLabel::Volatile),
            "insufficient_data" => Ok(TrendLabel::InsufficientData),
            _ => Err(format!("Unknown trend label: {}", s)),
        }
    }
}

/// Least squares fit of value against seconds since the first reading
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LinearTrend {
    /// Change in value per second, or per day when configured
    pub slope: f64,
    pub intercept: f64,
    /// Coefficient of determination, always within [0, 1]
    pub r_squared: f64,
}

/// Share of the series variance explained by each decomposition component
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SeasonalStrength {
    pub trend_strength: f64,
    pub seasonality_strength: f64,
}

/// Statistics behind a classified trend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendStatistics {
    pub linear_trend: LinearTrend,
    pub percentage_change: f64,
    pub volatility: f64,
    /// Weekly decomposition, absent when it could not be computed
    pub seasonal: Option<SeasonalStrength>,
}

/// Outcome of analyzing one patient's metric
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendResult {
    pub patient_id: i64,
    pub metric_type: MetricType,
    pub label: TrendLabel,
    pub analyzed_at: DateTime<Utc>,
    /// Number of measurements inside the analysis window
    pub data_points: usize,
    /// Always `None` for [`TrendLabel::InsufficientData`]
    pub statistics: Option<TrendStatistics>,
}

impl TrendResult {
    /// Result for a series too short to analyze
    pub fn insufficient_data(
        patient_id: i64,
        metric_type: MetricType,
        data_points: usize,
        analyzed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            patient_id,
            metric_type,
            label: TrendLabel::InsufficientData,
            analyzed_at,
            data_points,
            statistics: None,
        }
    }

    /// Result carrying the statistics the label was derived from
    pub fn classified(
        patient_id: i64,
        metric_type: MetricType,
        label: TrendLabel,
        statistics: TrendStatistics,
        data_points: usize,
        analyzed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            patient_id,
            metric_type,
            label,
            analyzed_at,
            data_points,
            statistics: Some(statistics),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trend_label_strings() {
        for label in [
            TrendLabel::Increasing,
            TrendLabel::Decreasing,
            TrendLabel::Stable,
            TrendLabel::Volatile,
            TrendLabel::InsufficientData,
        ] {
            assert_eq!(label.as_str().parse::<TrendLabel>(), Ok(label));
        }
        assert_eq!(
            serde_json::to_string(&TrendLabel::InsufficientData).unwrap(),
            "\"insufficient_data\""
        );
    }

    #[test]
    fn test_insufficient_data_has_no_statistics() {
        let result = TrendResult::insufficient_data(1, MetricType::Weight, 3, Utc::now());
        assert_eq!(result.label, TrendLabel::InsufficientData);
        assert!(result.statistics.is_none());
    }
}
