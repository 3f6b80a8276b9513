//! Statistics primitives behind trend classification.
//!
//! Every function is pure. Degenerate input yields a documented sentinel
//! (0 or `None`) or a [`StatisticsError`], never a panic or NaN.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use thiserror::Error;
use tracing::warn;

use crate::entities::{LinearTrend, SeasonalStrength};

/// Period of the additive decomposition, in daily samples
pub const SEASONAL_PERIOD: usize = 7;

/// Resampled points below which decomposition is not attempted
pub const MIN_RESAMPLED_POINTS: usize = 8;

/// Statistics errors
#[derive(Debug, Error, PartialEq)]
pub enum StatisticsError {
    /// Not enough points for the computation
    #[error("Insufficient data: need at least {needed} points, got {actual}")]
    InsufficientData { needed: usize, actual: usize },

    /// NaN or infinite value in the input
    #[error("Non-finite value at position {0}")]
    NonFiniteValue(usize),
}

/// Ordinary least squares fit of value against seconds since the earliest point.
///
/// When every timestamp is identical the minimum-norm fit is returned: a flat
/// line through the mean with R² 0. R² is 0 when the values have no variance
/// or the sums overflow, and is clamped into [0, 1].
pub fn linear_trend(points: &[(DateTime<Utc>, f64)]) -> Result<LinearTrend, StatisticsError> {
    if points.len() < 2 {
        return Err(StatisticsError::InsufficientData {
            needed: 2,
            actual: points.len(),
        });
    }
    if let Some(position) = points.iter().position(|(_, value)| !value.is_finite()) {
        return Err(StatisticsError::NonFiniteValue(position));
    }

    let origin = points
        .iter()
        .map(|(timestamp, _)| timestamp.timestamp_micros())
        .min()
        .unwrap_or_default();
    let xs: Vec<f64> = points
        .iter()
        .map(|(timestamp, _)| (timestamp.timestamp_micros() - origin) as f64 / 1_000_000.0)
        .collect();
    let ys: Vec<f64> = points.iter().map(|(_, value)| *value).collect();

    let n = points.len() as f64;
    let mean_x = xs.iter().sum::<f64>() / n;
    let mean_y = ys.iter().sum::<f64>() / n;

    let (sxx, sxy) = xs.iter().zip(&ys).fold((0.0, 0.0), |(sxx, sxy), (x, y)| {
        let dx = x - mean_x;
        (dx.mul_add(dx, sxx), dx.mul_add(y - mean_y, sxy))
    });
    if sxx == 0.0 {
        return Ok(LinearTrend {
            slope: 0.0,
            intercept: mean_y,
            r_squared: 0.0,
        });
    }

    let slope = sxy / sxx;
    let intercept = slope.mul_add(-mean_x, mean_y);

    let ss_tot: f64 = ys.iter().map(|y| (y - mean_y).powi(2)).sum();
    let ss_res: f64 = xs
        .iter()
        .zip(&ys)
        .map(|(x, y)| (y - slope.mul_add(*x, intercept)).powi(2))
        .sum();

    let ratio = 1.0 - ss_res / ss_tot;
    let r_squared = if ss_tot == 0.0 || !ratio.is_finite() {
        0.0
    } else {
        ratio.clamp(0.0, 1.0)
    };

    Ok(LinearTrend {
        slope,
        intercept,
        r_squared,
    })
}

/// Relative change from the first to the last value, in percent.
/// 0 for fewer than two values or a zero first value.
pub fn percentage_change(values: &[f64]) -> f64 {
    match (values.first(), values.last()) {
        (Some(&first), Some(&last)) if values.len() >= 2 && first != 0.0 => (last - first) / first * 100.0,
        _ => 0.0,
    }
}

/// Coefficient of variation: population standard deviation over the mean.
/// 0 for an empty series or a zero mean.
pub fn volatility(values: &[f64]) -> f64 {
    let Some(mean) = mean(values) else {
        return 0.0;
    };
    if mean == 0.0 {
        return 0.0;
    }
    population_variance(values).unwrap_or(0.0).sqrt() / mean
}

/// Best-effort weekly decomposition of a series resampled to one point per day.
///
/// Returns `None` whenever the decomposition cannot be computed; the caller
/// treats it as an optional enrichment.
pub fn seasonal_decomposition(points: &[(DateTime<Utc>, f64)]) -> Option<SeasonalStrength> {
    if let Some(position) = points.iter().position(|(_, value)| !value.is_finite()) {
        warn!("Seasonal decomposition skipped: non-finite value at position {}", position);
        return None;
    }

    let series = match resample_daily(points) {
        Some(series) => series,
        None => {
            warn!("Seasonal decomposition skipped: duplicate or missing timestamps");
            return None;
        }
    };

    if series.len() < MIN_RESAMPLED_POINTS {
        warn!(
            "Seasonal decomposition skipped: {} daily points, need {}",
            series.len(),
            MIN_RESAMPLED_POINTS
        );
        return None;
    }

    let series_variance = population_variance(&series).unwrap_or(0.0);
    if series_variance == 0.0 {
        warn!("Seasonal decomposition skipped: series has no variance");
        return None;
    }

    if series.len() < 2 * SEASONAL_PERIOD {
        warn!(
            "Seasonal decomposition skipped: {} daily points do not cover two {}-day cycles",
            series.len(),
            SEASONAL_PERIOD
        );
        return None;
    }

    let trend = centered_moving_average(&series, SEASONAL_PERIOD);
    let seasonal = seasonal_component(&series, &trend, SEASONAL_PERIOD);

    let defined_trend: Vec<f64> = trend.iter().flatten().copied().collect();
    let trend_variance = population_variance(&defined_trend).unwrap_or(0.0);
    let seasonal_variance = population_variance(&seasonal).unwrap_or(0.0);

    Some(SeasonalStrength {
        trend_strength: trend_variance / series_variance,
        seasonality_strength: seasonal_variance / series_variance,
    })
}

/// One value per day starting at the first timestamp.
///
/// A day slot takes the reading stamped exactly on it, otherwise the previous
/// slot's value. `None` on empty input or duplicate timestamps.
fn resample_daily(points: &[(DateTime<Utc>, f64)]) -> Option<Vec<f64>> {
    let mut by_time: BTreeMap<DateTime<Utc>, f64> = BTreeMap::new();
    for (timestamp, value) in points {
        if by_time.insert(*timestamp, *value).is_some() {
            return None;
        }
    }

    let (&first, &first_value) = by_time.iter().next()?;
    let (&last, _) = by_time.iter().next_back()?;

    let mut series = Vec::new();
    let mut previous = first_value;
    let mut slot = first;
    while slot <= last {
        let value = by_time.get(&slot).copied().unwrap_or(previous);
        series.push(value);
        previous = value;
        slot += Duration::days(1);
    }

    Some(series)
}

/// Centered moving average; undefined for the `period / 2` points at each edge
fn centered_moving_average(series: &[f64], period: usize) -> Vec<Option<f64>> {
    let half = period / 2;
    (0..series.len())
        .map(|i| {
            if i < half || i + half >= series.len() {
                None
            } else {
                mean(&series[i - half..=i + half])
            }
        })
        .collect()
}

/// Per-phase mean of the detrended series, centered to zero and tiled to the series length
fn seasonal_component(series: &[f64], trend: &[Option<f64>], period: usize) -> Vec<f64> {
    let mut sums = vec![0.0; period];
    let mut counts = vec![0usize; period];
    for (i, (value, trend)) in series.iter().zip(trend).enumerate() {
        if let Some(trend) = trend {
            sums[i % period] += value - trend;
            counts[i % period] += 1;
        }
    }

    let phase_means: Vec<f64> = sums
        .iter()
        .zip(&counts)
        .map(|(sum, &count)| if count == 0 { 0.0 } else { sum / count as f64 })
        .collect();
    let offset = mean(&phase_means).unwrap_or(0.0);

    (0..series.len()).map(|i| phase_means[i % period] - offset).collect()
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

fn population_variance(values: &[f64]) -> Option<f64> {
    let mean = mean(values)?;
    Some(values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64)
}
