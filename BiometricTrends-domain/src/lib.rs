// Biometric Trends Domain
// Trend classification and hourly aggregation of patient biometrics

// Analysis settings
pub mod config;

// Domain entities
pub mod entities;

// Services that implement business logic
pub mod services;

// Re-export the data crate modules for convenience
pub use biometric_trends_data::{database, repository};
