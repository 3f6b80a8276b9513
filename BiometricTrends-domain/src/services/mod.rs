// Domain services
// Pure statistics, classification and aggregation, plus the two jobs that run them over the repository

pub mod aggregation;
pub mod classifier;
pub mod hourly_aggregation;
pub mod statistics;
pub mod trend_analysis;

// Re-export the job services and their reports
pub use hourly_aggregation::{AggregationError, AggregationReport, HourlyAggregationService};
pub use trend_analysis::{AnalysisFailure, AnalysisReport, TrendAnalysisError, TrendAnalysisService};
