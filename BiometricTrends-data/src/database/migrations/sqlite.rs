use rusqlite::Connection;
use tracing::info;

/// Run SQLite migrations
pub fn run_migrations(conn: &Connection) -> Result<(), String> {
    info!("Running SQLite migrations");

    create_patients_table(conn)?;
    create_biometrics_table(conn)?;
    create_biometrics_index(conn)?;
    create_biometric_trends_table(conn)?;
    create_hourly_summary_table(conn)?;

    info!("SQLite migrations completed successfully");
    Ok(())
}

/// Create the patients table
fn create_patients_table(conn: &Connection) -> Result<(), String> {
    info!("Creating patients table if not exists");

    conn.execute(
        "CREATE TABLE IF NOT EXISTS patients (
            id INTEGER PRIMARY KEY,
            name TEXT,
            created_at TEXT NOT NULL
        )",
        [],
    ).map_err(|e| e.to_string())?;

    Ok(())
}

/// Create the raw biometrics table
fn create_biometrics_table(conn: &Connection) -> Result<(), String> {
    info!("Creating biometrics table if not exists");

    conn.execute(
        "CREATE TABLE IF NOT EXISTS biometrics (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            patient_id INTEGER NOT NULL,
            biometric_type TEXT NOT NULL,
            value REAL,
            systolic INTEGER,
            diastolic INTEGER,
            unit TEXT,
            timestamp TEXT NOT NULL
        )",
        [],
    ).map_err(|e| e.to_string())?;

    Ok(())
}

/// Create the unique entry index, which also backs the windowed per-patient lookup.
///
/// A patient has at most one reading of a type per timestamp.
fn create_biometrics_index(conn: &Connection) -> Result<(), String> {
    info!("Creating unique index on biometrics (patient_id, biometric_type, timestamp)");

    conn.execute(
        "CREATE UNIQUE INDEX IF NOT EXISTS uq_biometric_entry
        ON biometrics (patient_id, biometric_type, timestamp)",
        [],
    ).map_err(|e| format!("Failed to create index: {}", e))?;

    Ok(())
}

/// Create the trend results table, one row per patient and biometric type
fn create_biometric_trends_table(conn: &Connection) -> Result<(), String> {
    info!("Creating biometric_trends table if not exists");

    conn.execute(
        "CREATE TABLE IF NOT EXISTS biometric_trends (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            patient_id INTEGER NOT NULL,
            biometric_type TEXT NOT NULL,
            trend TEXT NOT NULL,
            analyzed_at TEXT NOT NULL,
            UNIQUE (patient_id, biometric_type)
        )",
        [],
    ).map_err(|e| e.to_string())?;

    Ok(())
}

/// Create the hourly summary table, one row per patient, series and hour
fn create_hourly_summary_table(conn: &Connection) -> Result<(), String> {
    info!("Creating patient_biometric_hourly_summary table if not exists");

    conn.execute(
        "CREATE TABLE IF NOT EXISTS patient_biometric_hourly_summary (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            patient_id INTEGER NOT NULL,
            biometric_type TEXT NOT NULL,
            hour_start TEXT NOT NULL,
            min_value REAL NOT NULL,
            max_value REAL NOT NULL,
            avg_value REAL NOT NULL,
            count INTEGER NOT NULL CHECK (count >= 1),
            UNIQUE (patient_id, biometric_type, hour_start)
        )",
        [],
    ).map_err(|e| e.to_string())?;

    Ok(())
}
