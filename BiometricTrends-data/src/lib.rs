// Biometric Trends Data
// Storage of patients, raw biometrics and the analytics tables derived from them

// Database connection management
pub mod database;

// Repository implementations for data access
pub mod repository;

// Data storage models
pub mod models;
