// Storage models
pub mod biometric;
pub mod hourly_summary;
pub mod patient;
pub mod trend;

pub use biometric::{biometric_types, BiometricRow, CreateBiometricRequest, RawBiometricRow};
pub use hourly_summary::HourlySummaryRow;
pub use patient::PatientRow;
pub use trend::BiometricTrendRow;
