//! Persistence Layer
//!
//! SQLite storage for candles, signals and executions, plus the externally
//! owned trading switches and risk settings the worker reads.
//! Uses sqlx with async operations.
//!
//! # Database Schema
//!
//! ## candles
//! - interval: "15s" or "3m"
//! - symbol, interval_start (epoch seconds, aligned)
//! - open, high, low, close
//! - backfill: synthesized flat candle for a gap
//! - unique on (interval, symbol, interval_start)
//!
//! ## signals
//! - signal_key: primary key
//! - user, symbol, side, entry_time, fvg_time and the sized bracket
//! - status: DETECTED, TAKEN or BLOCKED, with block_reason and exec_key
//!
//! ## executions
//! - id: autoincrement
//! - exec_key: unique, doubles as the broker custom tag
//! - order fields, status, entry_order_id, error
//!
//! ## trading_state / risk_settings
//! - one row per user, written by the dashboard

pub mod models;
pub mod repository;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::ConnectOptions;
use std::path::Path;
use std::str::FromStr;
use tracing::info;

/// Database connection pool
pub type DbPool = SqlitePool;

/// Database initialization error
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Database connection error: {0}")]
    ConnectionError(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    MigrationError(String),

    #[error("Query error: {0}")]
    QueryError(String),
}

const MIGRATIONS: &[(&str, &str)] = &[
    (
        "candles table",
        r#"
        CREATE TABLE IF NOT EXISTS candles (
            interval TEXT NOT NULL CHECK(interval IN ('15s', '3m')),
            symbol TEXT NOT NULL,
            interval_start INTEGER NOT NULL,
            open REAL NOT NULL,
            high REAL NOT NULL,
            low REAL NOT NULL,
            close REAL NOT NULL,
            backfill BOOLEAN NOT NULL DEFAULT 0,
            created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
            UNIQUE (interval, symbol, interval_start)
        )
        "#,
    ),
    (
        "signals table",
        r#"
        CREATE TABLE IF NOT EXISTS signals (
            signal_key TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            symbol TEXT NOT NULL,
            side TEXT NOT NULL CHECK(side IN ('long', 'short')),
            entry_time INTEGER NOT NULL,
            fvg_time INTEGER NOT NULL,
            entry_price REAL NOT NULL,
            stop_price REAL,
            take_profit_price REAL,
            stop_ticks INTEGER,
            tp_ticks INTEGER,
            rr REAL,
            contracts INTEGER,
            risk_usd_planned REAL,
            status TEXT NOT NULL CHECK(status IN ('DETECTED', 'TAKEN', 'BLOCKED')),
            block_reason TEXT,
            exec_key TEXT,
            created_at DATETIME NOT NULL,
            updated_at DATETIME NOT NULL
        )
        "#,
    ),
    (
        "executions table",
        r#"
        CREATE TABLE IF NOT EXISTS executions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            exec_key TEXT NOT NULL UNIQUE,
            signal_key TEXT,
            user_id TEXT NOT NULL,
            broker TEXT NOT NULL,
            contract_id TEXT NOT NULL,
            side TEXT NOT NULL CHECK(side IN ('long', 'short')),
            qty INTEGER NOT NULL,
            entry_type TEXT NOT NULL,
            stop_loss_ticks INTEGER NOT NULL,
            take_profit_ticks INTEGER NOT NULL,
            status TEXT NOT NULL,
            entry_order_id TEXT,
            error TEXT,
            created_at DATETIME NOT NULL,
            updated_at DATETIME NOT NULL
        )
        "#,
    ),
    (
        "trading_state table",
        r#"
        CREATE TABLE IF NOT EXISTS trading_state (
            user_id TEXT PRIMARY KEY,
            is_paused BOOLEAN NOT NULL DEFAULT 0,
            is_kill_switched BOOLEAN NOT NULL DEFAULT 0,
            updated_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    ),
    (
        "risk_settings table",
        r#"
        CREATE TABLE IF NOT EXISTS risk_settings (
            user_id TEXT PRIMARY KEY,
            risk_usd REAL NOT NULL,
            reward_risk_ratio REAL NOT NULL,
            max_stop_ticks INTEGER NOT NULL,
            entry_type TEXT NOT NULL,
            updated_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    ),
    (
        "signals status index",
        "CREATE INDEX IF NOT EXISTS idx_signals_status ON signals(status)",
    ),
    (
        "executions open-trade index",
        "CREATE INDEX IF NOT EXISTS idx_executions_user_contract ON executions(user_id, contract_id, status)",
    ),
    (
        "executions order id index",
        "CREATE INDEX IF NOT EXISTS idx_executions_order_id ON executions(entry_order_id)",
    ),
];

/// Initialize the database connection pool with default settings
///
/// # Arguments
/// - `database_url`: SQLite URL (e.g., "sqlite://data/imbalance_trader.db" or "sqlite::memory:")
///
/// # Errors
/// Returns error if database connection fails or migrations fail
pub async fn init_database(database_url: &str) -> Result<DbPool, DatabaseError> {
    let config = DatabaseConfig {
        url: database_url.to_string(),
        ..DatabaseConfig::default()
    };
    init_database_with(&config).await
}

/// Initialize the database connection pool from a [`DatabaseConfig`]
pub async fn init_database_with(config: &DatabaseConfig) -> Result<DbPool, DatabaseError> {
    info!("Initializing database: {}", config.url);

    // Ensure data directory exists
    if let Some(db_path) = config.url.strip_prefix("sqlite://") {
        if let Some(parent) = Path::new(db_path).parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::ConnectionError(sqlx::Error::Configuration(Box::new(e)))
            })?;
        }
    }

    let statement_level = if config.log_queries {
        tracing::log::LevelFilter::Debug
    } else {
        tracing::log::LevelFilter::Trace
    };
    let options = SqliteConnectOptions::from_str(&config.url)?
        .create_if_missing(true)
        .log_statements(statement_level);

    // every connection to an in-memory database is a separate database
    let pool = if config.is_in_memory() {
        SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?
    } else {
        SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(options)
            .await?
    };

    run_migrations(&pool).await?;

    info!("✓ Database initialized successfully");

    Ok(pool)
}

/// Run database migrations
async fn run_migrations(pool: &DbPool) -> Result<(), DatabaseError> {
    info!("Running database migrations...");

    for (name, sql) in MIGRATIONS {
        sqlx::query(sql).execute(pool).await.map_err(|e| {
            DatabaseError::MigrationError(format!("Failed to create {}: {}", name, e))
        })?;
    }

    info!("✓ Database migrations completed successfully");

    Ok(())
}

/// Database configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Database URL (e.g., "sqlite://data/imbalance_trader.db")
    pub url: String,

    /// Maximum number of connections in the pool
    pub max_connections: u32,

    /// Enable query logging
    pub log_queries: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://data/imbalance_trader.db".to_string(),
            max_connections: 5,
            log_queries: cfg!(debug_assertions),
        }
    }
}

impl DatabaseConfig {
    /// Load from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let url = std::env::var("DATABASE_URL").unwrap_or(defaults.url);

        let max_connections = std::env::var("DATABASE_MAX_CONNECTIONS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.max_connections);

        let log_queries = std::env::var("DATABASE_LOG_QUERIES")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.log_queries);

        Self {
            url,
            max_connections,
            log_queries,
        }
    }

    pub fn is_in_memory(&self) -> bool {
        self.url.contains(":memory:") || self.url.contains("mode=memory")
    }
}
