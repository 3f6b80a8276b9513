use biometric_trends_data::models::{BiometricRow, BiometricTrendRow, HourlySummaryRow, RawBiometricRow};

use super::aggregate::{AggregateSeries, HourlyAggregate, RawReading};
use super::measurement::{Measurement, MeasurementValue, MetricType};
use super::trend::TrendResult;

// Conversion functions between domain entities and data models
// These functions follow the pattern convert_to_[target_layer]_[model_name]

/// Convert a stored biometric row into a measurement.
///
/// Fails when the populated columns do not match the metric type: glucose and
/// weight need a finite `value`, blood pressure needs both components.
pub fn convert_to_domain_measurement(row: BiometricRow) -> Result<Measurement, String> {
    let metric_type: MetricType = row.biometric_type.parse()?;

    let value = match metric_type {
        MetricType::Glucose | MetricType::Weight => match row.value {
            Some(value) if value.is_finite() => MeasurementValue::Scalar(value),
            _ => {
                return Err(format!(
                    "{} measurement {} has no usable value",
                    metric_type, row.id
                ))
            }
        },
        MetricType::BloodPressure => match (row.systolic, row.diastolic) {
            (Some(systolic), Some(diastolic)) => MeasurementValue::BloodPressure { systolic, diastolic },
            _ => {
                return Err(format!(
                    "blood_pressure measurement {} is missing a component",
                    row.id
                ))
            }
        },
    };

    Ok(Measurement {
        patient_id: row.patient_id,
        metric_type,
        timestamp: row.timestamp,
        value,
        unit: row.unit,
    })
}

/// Convert a trend result into the row upserted per (patient, metric)
pub fn convert_to_data_trend_row(result: &TrendResult) -> BiometricTrendRow {
    BiometricTrendRow {
        patient_id: result.patient_id,
        biometric_type: result.metric_type.as_str().to_string(),
        trend: result.label.as_str().to_string(),
        analyzed_at: result.analyzed_at,
    }
}

/// Convert a raw aggregation row, rejecting unknown series names
pub fn convert_to_domain_raw_reading(row: RawBiometricRow) -> Result<RawReading, String> {
    let series: AggregateSeries = row.biometric_type.parse()?;
    Ok(RawReading {
        patient_id: row.patient_id,
        series,
        timestamp: row.timestamp,
        value: row.value,
    })
}

/// Convert an hourly aggregate into its summary table row
pub fn convert_to_data_hourly_summary(aggregate: &HourlyAggregate) -> HourlySummaryRow {
    HourlySummaryRow {
        patient_id: aggregate.patient_id,
        biometric_type: aggregate.series.as_str().to_string(),
        hour_start: aggregate.hour_start,
        min_value: aggregate.min_value,
        max_value: aggregate.max_value,
        avg_value: aggregate.avg_value,
        count: aggregate.count as i64,
    }
}
