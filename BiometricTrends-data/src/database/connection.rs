//! Database connection module for the biometric trends jobs
//!
//! The pool is built once by the job runner from a [`DatabaseConfig`] and handed
//! to the repository. Nothing here is global, so tests can open as many
//! independent in-memory databases as they like.

use std::env;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::OpenFlags;
use thiserror::Error;
use tracing::{info, warn};

use super::migrations;

/// Supported database types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatabaseType {
    /// SQLite database (file-based)
    Sqlite,
    /// Private in-memory SQLite database, gone when the pool is dropped
    Memory,
}

impl FromStr for DatabaseType {
    type Err = DatabaseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sqlite" => Ok(DatabaseType::Sqlite),
            "memory" | "sqlite-memory" => Ok(DatabaseType::Memory),
            _ => Err(DatabaseError::UnsupportedDatabaseType(s.to_string())),
        }
    }
}

impl fmt::Display for DatabaseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DatabaseType::Sqlite => write!(f, "sqlite"),
            DatabaseType::Memory => write!(f, "memory"),
        }
    }
}

/// Database error
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// SQLite error
    #[error("SQLite error: {0}")]
    SqliteError(#[from] rusqlite::Error),

    /// SQLite connection pool error
    #[error("SQLite connection pool error: {0}")]
    SqlitePoolError(#[from] r2d2::Error),

    /// Unsupported database type
    #[error("Unsupported database type: {0}")]
    UnsupportedDatabaseType(String),

    /// Configuration error
    #[error("Database configuration error: {0}")]
    ConfigError(String),

    /// Migration error
    #[error("Database migration error: {0}")]
    MigrationError(String),

    /// Generic database error
    #[error("Database error: {0}")]
    GenericError(String),
}

/// Database configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Database type (sqlite, memory)
    pub db_type: DatabaseType,
    /// Path to SQLite database file
    pub sqlite_path: Option<String>,
    /// Maximum number of pooled connections
    pub max_connections: u32,
    /// Connection timeout in seconds
    pub timeout_seconds: u64,
}

/// Default location of the SQLite file when `DB_SQLITE_PATH` is not set
pub const DEFAULT_SQLITE_PATH: &str = "data/biometrics.db";

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            db_type: DatabaseType::Sqlite,
            sqlite_path: Some(DEFAULT_SQLITE_PATH.to_string()),
            max_connections: 10,
            timeout_seconds: 30,
        }
    }
}

impl DatabaseConfig {
    /// Configuration for a throwaway in-memory database
    pub fn in_memory() -> Self {
        Self {
            db_type: DatabaseType::Memory,
            sqlite_path: None,
            max_connections: 1,
            ..Self::default()
        }
    }

    /// Create a new database configuration from environment variables
    pub fn from_env() -> Result<Self, DatabaseError> {
        let defaults = Self::default();

        let db_type_str = env::var("DB_TYPE").unwrap_or_else(|_| "sqlite".to_string());
        let db_type = db_type_str.parse::<DatabaseType>()?;

        let sqlite_path = match db_type {
            DatabaseType::Sqlite => {
                let path = env::var("DB_SQLITE_PATH").unwrap_or_else(|_| DEFAULT_SQLITE_PATH.to_string());
                info!("Using SQLite database at: {}", path);
                Some(path)
            }
            DatabaseType::Memory => {
                info!("Using in-memory SQLite database");
                None
            }
        };

        let max_connections = env::var("DB_MAX_CONNECTIONS")
            .ok()
            .and_then(|s| s.parse::<u32>().ok())
            .unwrap_or(defaults.max_connections);

        let timeout_seconds = env::var("DB_TIMEOUT_SECONDS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(defaults.timeout_seconds);

        if max_connections == 0 {
            return Err(DatabaseError::ConfigError(
                "DB_MAX_CONNECTIONS must be at least 1".to_string(),
            ));
        }

        info!(
            "Database configuration: max_connections={}, timeout={}s",
            max_connections, timeout_seconds
        );

        Ok(DatabaseConfig {
            db_type,
            sqlite_path,
            max_connections,
            timeout_seconds,
        })
    }
}

/// Pooled SQLite connection handle
pub type SqliteConnection = PooledConnection<SqliteConnectionManager>;

/// Connection pool shared by the repository and every job it serves
#[derive(Clone)]
pub struct DatabasePool {
    pool: Arc<Pool<SqliteConnectionManager>>,
    db_type: DatabaseType,
}

impl fmt::Debug for DatabasePool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabasePool")
            .field("db_type", &self.db_type)
            .field("state", &self.pool.state())
            .finish()
    }
}

impl DatabasePool {
    /// Build the pool described by `config` and bring the schema up to date
    pub fn connect(config: &DatabaseConfig) -> Result<Self, DatabaseError> {
        info!("Initializing database pool with type: {}", config.db_type);

        let pool = match config.db_type {
            DatabaseType::Sqlite => initialize_sqlite_pool(config)?,
            DatabaseType::Memory => initialize_in_memory_sqlite_pool(config)?,
        };

        let pool = DatabasePool {
            pool: Arc::new(pool),
            db_type: config.db_type,
        };
        pool.run_migrations()?;

        Ok(pool)
    }

    /// Shortcut for a fresh, migrated in-memory database
    pub fn in_memory() -> Result<Self, DatabaseError> {
        Self::connect(&DatabaseConfig::in_memory())
    }

    /// Database type backing this pool
    pub fn db_type(&self) -> DatabaseType {
        self.db_type
    }

    /// Check out a connection
    pub fn get(&self) -> Result<SqliteConnection, r2d2::Error> {
        self.pool.get()
    }

    /// Run database migrations
    fn run_migrations(&self) -> Result<(), DatabaseError> {
        info!("Running database migrations");

        let conn = self.get()?;
        migrations::run_sqlite_migrations(&conn)
            .map_err(|e| DatabaseError::MigrationError(e.to_string()))?;

        info!("Database migrations completed successfully");
        Ok(())
    }

    /// Get information about the current database connection
    pub fn connection_info(&self) -> String {
        let location = match self.get() {
            Ok(conn) => {
                match conn.query_row("PRAGMA database_list", [], |row| row.get::<_, String>(2)) {
                    Ok(path) if path.is_empty() || path == ":memory:" => "SQLite in-memory database".to_string(),
                    Ok(path) => format!("SQLite database at {}", path),
                    Err(_) => "SQLite database (path unknown)".to_string(),
                }
            }
            Err(e) => return format!("SQLite connection error: {}", e),
        };

        let state = self.pool.state();
        format!(
            "{} (connections: active={}, idle={})",
            location, state.connections, state.idle_connections
        )
    }
}

/// Initialize SQLite connection pool
fn initialize_sqlite_pool(config: &DatabaseConfig) -> Result<Pool<SqliteConnectionManager>, DatabaseError> {
    let sqlite_path = config
        .sqlite_path
        .clone()
        .unwrap_or_else(|| DEFAULT_SQLITE_PATH.to_string());

    info!("Initializing SQLite database at: {}", sqlite_path);

    if let Some(parent) = Path::new(&sqlite_path).parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            info!("Creating parent directory: {:?}", parent);
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::ConfigError(format!("Failed to create {}: {}", parent.display(), e))
            })?;
        }
    }

    let manager = SqliteConnectionManager::file(&sqlite_path)
        .with_flags(OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE)
        .with_init(|conn| conn.busy_timeout(Duration::from_secs(5)));

    let pool = Pool::builder()
        .max_size(config.max_connections)
        .connection_timeout(Duration::from_secs(config.timeout_seconds))
        .build(manager)?;

    info!("SQLite connection pool created successfully");
    Ok(pool)
}

/// Initialize an in-memory SQLite database
fn initialize_in_memory_sqlite_pool(config: &DatabaseConfig) -> Result<Pool<SqliteConnectionManager>, DatabaseError> {
    // Every in-memory connection is its own database
    if config.max_connections != 1 {
        warn!(
            "In-memory SQLite ignores max_connections={}, using a single connection",
            config.max_connections
        );
    }

    let manager = SqliteConnectionManager::memory();
    let pool = Pool::builder()
        .max_size(1)
        .connection_timeout(Duration::from_secs(config.timeout_seconds))
        .build(manager)?;

    info!("In-memory SQLite database initialized successfully");
    Ok(pool)
}
