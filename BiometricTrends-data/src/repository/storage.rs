use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{params, OptionalExtension, Row};
use tracing::debug;

use crate::database::{DatabasePool, SqliteConnection};
use crate::models::{
    BiometricRow, BiometricTrendRow, CreateBiometricRequest, HourlySummaryRow, PatientRow, RawBiometricRow,
};
use super::errors::RepositoryError;

/// Fixed-width UTC text so that string order equals time order in SQL comparisons
pub(crate) fn format_timestamp(timestamp: &DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Read an RFC 3339 text column back into a UTC timestamp
fn read_timestamp(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let text: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&text)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn read_biometric(row: &Row<'_>) -> rusqlite::Result<BiometricRow> {
    Ok(BiometricRow {
        id: row.get(0)?,
        patient_id: row.get(1)?,
        biometric_type: row.get(2)?,
        value: row.get(3)?,
        systolic: row.get(4)?,
        diastolic: row.get(5)?,
        unit: row.get(6)?,
        timestamp: read_timestamp(row, 7)?,
    })
}

fn read_trend(row: &Row<'_>) -> rusqlite::Result<BiometricTrendRow> {
    Ok(BiometricTrendRow {
        patient_id: row.get(0)?,
        biometric_type: row.get(1)?,
        trend: row.get(2)?,
        analyzed_at: read_timestamp(row, 3)?,
    })
}

fn read_hourly_summary(row: &Row<'_>) -> rusqlite::Result<HourlySummaryRow> {
    Ok(HourlySummaryRow {
        patient_id: row.get(0)?,
        biometric_type: row.get(1)?,
        hour_start: read_timestamp(row, 2)?,
        min_value: row.get(3)?,
        max_value: row.get(4)?,
        avg_value: row.get(5)?,
        count: row.get(6)?,
    })
}

/// Run `operation` on a pooled connection from tokio's blocking thread pool
async fn with_connection<T, F>(pool: &DatabasePool, operation: F) -> Result<T, RepositoryError>
where
    T: Send + 'static,
    F: FnOnce(&mut SqliteConnection) -> Result<T, RepositoryError> + Send + 'static,
{
    let pool = pool.clone();
    tokio::task::spawn_blocking(move || {
        let mut conn = pool.get()?;
        operation(&mut conn)
    })
    .await
    .map_err(|e| RepositoryError::Task(format!("Database task failed: {}", e)))?
}

/// Database storage operations for patients, biometrics and analytics results
pub struct DatabaseStorage;

impl DatabaseStorage {
    /// Insert a patient unless one with the same id already exists
    pub async fn register_patient(
        pool: &DatabasePool,
        id: i64,
        name: Option<String>,
    ) -> Result<PatientRow, RepositoryError> {
        debug!("Registering patient in database: id={}", id);

        with_connection(pool, move |conn| {
            conn.execute(
                "INSERT INTO patients (id, name, created_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT (id) DO NOTHING",
                params![id, name, format_timestamp(&Utc::now())],
            )?;

            conn.query_row(
                "SELECT id, name, created_at FROM patients WHERE id = ?1",
                [id],
                |row| {
                    Ok(PatientRow {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        created_at: read_timestamp(row, 2)?,
                    })
                },
            )
            .optional()?
            .ok_or_else(|| RepositoryError::NotFound(format!("patient {}", id)))
        })
        .await
    }

    /// Store a measurement, replacing the reading already stored for the same
    /// patient, type and timestamp
    pub async fn store_measurement(
        pool: &DatabasePool,
        request: CreateBiometricRequest,
    ) -> Result<BiometricRow, RepositoryError> {
        debug!(
            "Storing {} measurement in database: patient_id={}",
            request.biometric_type, request.patient_id
        );

        with_connection(pool, move |conn| {
            let timestamp = format_timestamp(&request.timestamp);
            conn.execute(
                "INSERT INTO biometrics
                 (patient_id, biometric_type, value, systolic, diastolic, unit, timestamp)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT (patient_id, biometric_type, timestamp)
                 DO UPDATE SET value = excluded.value,
                               systolic = excluded.systolic,
                               diastolic = excluded.diastolic,
                               unit = excluded.unit",
                params![
                    request.patient_id,
                    request.biometric_type,
                    request.value,
                    request.systolic,
                    request.diastolic,
                    request.unit,
                    timestamp,
                ],
            )?;

            let id: i64 = conn.query_row(
                "SELECT id FROM biometrics
                 WHERE patient_id = ?1 AND biometric_type = ?2 AND timestamp = ?3",
                params![request.patient_id, request.biometric_type, timestamp],
                |row| row.get(0),
            )?;

            Ok(request.into_row(id))
        })
        .await
    }

    /// Get one page of patient ids, ordered by id
    pub async fn fetch_patient_ids(
        pool: &DatabasePool,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<i64>, RepositoryError> {
        debug!("Fetching patient ids from database: offset={}, limit={}", offset, limit);

        with_connection(pool, move |conn| {
            let mut stmt = conn.prepare("SELECT id FROM patients ORDER BY id LIMIT ?1 OFFSET ?2")?;
            let ids = stmt
                .query_map(params![limit as i64, offset as i64], |row| row.get(0))?
                .collect::<Result<Vec<i64>, _>>()?;
            Ok(ids)
        })
        .await
    }

    /// Get a patient's measurements of one type taken at or after `since`, oldest first
    pub async fn fetch_measurements(
        pool: &DatabasePool,
        patient_id: i64,
        biometric_type: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<BiometricRow>, RepositoryError> {
        debug!(
            "Fetching {} measurements from database: patient_id={}, since={}",
            biometric_type, patient_id, since
        );

        let biometric_type = biometric_type.to_string();
        with_connection(pool, move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, patient_id, biometric_type, value, systolic, diastolic, unit, timestamp
                 FROM biometrics
                 WHERE patient_id = ?1 AND biometric_type = ?2 AND timestamp >= ?3
                 ORDER BY timestamp ASC, id ASC",
            )?;
            let rows = stmt
                .query_map(params![patient_id, biometric_type, format_timestamp(&since)], read_biometric)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
    }

    /// Insert or replace the trend of a patient's biometric
    pub async fn upsert_trend(pool: &DatabasePool, trend: &BiometricTrendRow) -> Result<(), RepositoryError> {
        debug!(
            "Upserting trend in database: patient_id={}, biometric_type={}, trend={}",
            trend.patient_id, trend.biometric_type, trend.trend
        );

        let trend = trend.clone();
        with_connection(pool, move |conn| {
            conn.execute(
                "INSERT INTO biometric_trends (patient_id, biometric_type, trend, analyzed_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT (patient_id, biometric_type)
                 DO UPDATE SET trend = excluded.trend, analyzed_at = excluded.analyzed_at",
                params![
                    trend.patient_id,
                    trend.biometric_type,
                    trend.trend,
                    format_timestamp(&trend.analyzed_at),
                ],
            )?;
            Ok(())
        })
        .await
    }

    /// Get the stored trend of a patient's biometric
    pub async fn get_trend(
        pool: &DatabasePool,
        patient_id: i64,
        biometric_type: &str,
    ) -> Result<Option<BiometricTrendRow>, RepositoryError> {
        let biometric_type = biometric_type.to_string();
        with_connection(pool, move |conn| {
            let trend = conn
                .query_row(
                    "SELECT patient_id, biometric_type, trend, analyzed_at
                     FROM biometric_trends WHERE patient_id = ?1 AND biometric_type = ?2",
                    params![patient_id, biometric_type],
                    read_trend,
                )
                .optional()?;
            Ok(trend)
        })
        .await
    }

    /// Get every value that feeds the hourly aggregation.
    ///
    /// Blood pressure rows are split into systolic and diastolic series, each
    /// row only contributing the components that are present.
    pub async fn fetch_raw_biometrics_for_aggregation(
        pool: &DatabasePool,
    ) -> Result<Vec<RawBiometricRow>, RepositoryError> {
        debug!("Fetching raw biometrics for aggregation from database");

        with_connection(pool, |conn| {
            let mut stmt = conn.prepare(
                "SELECT patient_id, biometric_type, timestamp, value
                 FROM biometrics
                 WHERE biometric_type IN ('glucose', 'weight') AND value IS NOT NULL

                 UNION ALL

                 SELECT patient_id, 'blood_pressure_systolic', timestamp, CAST(systolic AS REAL)
                 FROM biometrics
                 WHERE biometric_type = 'blood_pressure' AND systolic IS NOT NULL

                 UNION ALL

                 SELECT patient_id, 'blood_pressure_diastolic', timestamp, CAST(diastolic AS REAL)
                 FROM biometrics
                 WHERE biometric_type = 'blood_pressure' AND diastolic IS NOT NULL

                 ORDER BY 1, 2, 3",
            )?;
            let rows = stmt
                .query_map([], |row| {
                    Ok(RawBiometricRow {
                        patient_id: row.get(0)?,
                        biometric_type: row.get(1)?,
                        timestamp: read_timestamp(row, 2)?,
                        value: row.get(3)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
    }

    /// Insert or overwrite hourly summaries in a single transaction
    pub async fn upsert_hourly_aggregates(
        pool: &DatabasePool,
        rows: &[HourlySummaryRow],
    ) -> Result<usize, RepositoryError> {
        debug!("Upserting {} hourly summaries in database", rows.len());

        let rows = rows.to_vec();
        with_connection(pool, move |conn| {
            let tx = conn.transaction()?;
            {
                let mut stmt = tx.prepare(
                    "INSERT INTO patient_biometric_hourly_summary
                     (patient_id, biometric_type, hour_start, min_value, max_value, avg_value, count)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                     ON CONFLICT (patient_id, biometric_type, hour_start)
                     DO UPDATE SET min_value = excluded.min_value,
                                   max_value = excluded.max_value,
                                   avg_value = excluded.avg_value,
                                   count = excluded.count",
                )?;
                for row in &rows {
                    stmt.execute(params![
                        row.patient_id,
                        row.biometric_type,
                        format_timestamp(&row.hour_start),
                        row.min_value,
                        row.max_value,
                        row.avg_value,
                        row.count,
                    ])?;
                }
            }
            tx.commit()?;
            Ok(rows.len())
        })
        .await
    }

    /// Get a patient's hourly summaries ordered by series and hour
    pub async fn get_hourly_summaries(
        pool: &DatabasePool,
        patient_id: i64,
    ) -> Result<Vec<HourlySummaryRow>, RepositoryError> {
        with_connection(pool, move |conn| {
            let mut stmt = conn.prepare(
                "SELECT patient_id, biometric_type, hour_start, min_value, max_value, avg_value, count
                 FROM patient_biometric_hourly_summary
                 WHERE patient_id = ?1
                 ORDER BY biometric_type, hour_start",
            )?;
            let rows = stmt
                .query_map([patient_id], read_hourly_summary)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
    }
}
