// Biometric Trends Jobs
//
// One-shot runners for the trend analysis and hourly aggregation jobs.

pub mod cli;
pub mod config;
pub mod jobs;
pub mod logging;
