use crate::entities::{LinearTrend, MetricType, TrendLabel};

/// R² above which a fitted line alone decides the direction
pub const STRONG_FIT_R_SQUARED: f64 = 0.7;

/// Classify a series from its regression, percentage change and volatility.
///
/// Rules are applied in order, the first match wins. `t` is the metric's
/// stability threshold:
///
/// 1. volatility > 2t is `Volatile`
/// 2. |slope| < t and |percentage change| < 10t is `Stable`
/// 3. rising slope confirmed by a rising change or a strong fit is `Increasing`
/// 4. falling slope confirmed by a falling change or a strong fit is `Decreasing`
/// 5. anything else is `Stable`
pub fn classify(
    metric_type: MetricType,
    linear_trend: &LinearTrend,
    percentage_change: f64,
    volatility: f64,
) -> TrendLabel {
    let threshold = metric_type.stability_threshold();
    let slope = linear_trend.slope;
    let strong_fit = linear_trend.r_squared > STRONG_FIT_R_SQUARED;

    if volatility > 2.0 * threshold {
        TrendLabel::Volatile
    } else if slope.abs() < threshold && percentage_change.abs() < 10.0 * threshold {
        TrendLabel::Stable
    } else if (slope > 0.0 && percentage_change > 0.0) || (strong_fit && slope > 0.0) {
        TrendLabel::Increasing
    } else if (slope < 0.0 && percentage_change < 0.0) || (strong_fit && slope < 0.0) {
        TrendLabel::Decreasing
    } else {
        TrendLabel::Stable
    }
}
