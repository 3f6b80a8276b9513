use std::collections::BTreeMap;

use chrono::{DateTime, Duration, DurationRound, Timelike, Utc};

use crate::entities::{AggregateSeries, HourlyAggregate, RawReading};

/// Start of the clock hour containing `timestamp`
pub fn truncate_to_hour(timestamp: DateTime<Utc>) -> DateTime<Utc> {
    timestamp
        .duration_trunc(Duration::hours(1))
        .unwrap_or_else(|_| {
            // Out of the nanosecond range; clear the fields directly
            timestamp
                .with_nanosecond(0)
                .and_then(|t| t.with_second(0))
                .and_then(|t| t.with_minute(0))
                .unwrap_or(timestamp)
        })
}

/// Round half away from zero to 2 decimal places
pub fn round_to_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[derive(Debug)]
struct Bucket {
    min: f64,
    max: f64,
    sum: f64,
    count: usize,
}

/// Group readings by patient, series and hour and summarize each group.
///
/// Output is ordered by (patient_id, series, hour_start) and contains only
/// groups with at least one reading.
pub fn aggregate(readings: &[RawReading]) -> Vec<HourlyAggregate> {
    let mut buckets: BTreeMap<(i64, AggregateSeries, DateTime<Utc>), Bucket> = BTreeMap::new();

    for reading in readings {
        let key = (reading.patient_id, reading.series, truncate_to_hour(reading.timestamp));
        buckets
            .entry(key)
            .and_modify(|bucket| {
                bucket.min = bucket.min.min(reading.value);
                bucket.max = bucket.max.max(reading.value);
                bucket.sum += reading.value;
                bucket.count += 1;
            })
            .or_insert(Bucket {
                min: reading.value,
                max: reading.value,
                sum: reading.value,
                count: 1,
            });
    }

    buckets
        .into_iter()
        .map(|((patient_id, series, hour_start), bucket)| HourlyAggregate {
            patient_id,
            series,
            hour_start,
            min_value: bucket.min,
            max_value: bucket.max,
            avg_value: round_to_cents(bucket.sum / bucket.count as f64),
            count: bucket.count,
        })
        .collect()
}
