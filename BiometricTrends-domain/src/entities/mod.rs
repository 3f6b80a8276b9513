// Domain entities and value objects
pub mod aggregate;
pub mod conversions;
pub mod measurement;
pub mod trend;

// Re-export common types for easier imports
pub use aggregate::{AggregateSeries, HourlyAggregate, RawReading};
pub use measurement::{Measurement, MeasurementValue, MetricType};
pub use trend::{LinearTrend, SeasonalStrength, TrendLabel, TrendResult, TrendStatistics};
