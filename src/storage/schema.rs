//! Database schema definitions.
//!
//! Both tables are append-only; there are no foreign keys between them.
//! Timestamps are stored as Unix milliseconds (INTEGER).

use sqlx::SqlitePool;

use crate::storage::StorageError;

/// SQL statement for creating the ping_results table.
///
/// One row per probe cycle per target. `concerns` holds an ordered JSON
/// array of `{kind, detail}` objects.
pub const PING_RESULTS_TABLE_DDL: &str = r#"
CREATE TABLE IF NOT EXISTS ping_results (
    id                  INTEGER PRIMARY KEY AUTOINCREMENT,
    server_ip           TEXT NOT NULL,
    country             TEXT NOT NULL,
    partner             TEXT NOT NULL,
    dn_ext              TEXT NOT NULL,
    ts                  INTEGER NOT NULL,
    packets_transmitted INTEGER NOT NULL,
    packets_received    INTEGER NOT NULL,
    packets_lost        INTEGER NOT NULL,
    loss_percentage     REAL NOT NULL,
    min_time            REAL,
    avg_time            REAL,
    max_time            REAL,
    mdev_time           REAL,
    is_high_latency     INTEGER NOT NULL,
    success             INTEGER NOT NULL,
    concerns            TEXT NOT NULL DEFAULT '[]'
);
"#;

/// Composite index for per-target range scans; row count grows without
/// bound over the process lifetime, so equality-plus-range lookups must
/// not table-scan.
pub const PING_RESULTS_IP_TS_INDEX_DDL: &str = r#"
CREATE INDEX IF NOT EXISTS idx_ping_results_ip_ts ON ping_results(server_ip, ts);
"#;

/// Timestamp index for time-window queries across all targets.
pub const PING_RESULTS_TS_INDEX_DDL: &str = r#"
CREATE INDEX IF NOT EXISTS idx_ping_results_ts ON ping_results(ts);
"#;

/// SQL statement for creating the logs table.
pub const LOGS_TABLE_DDL: &str = r#"
CREATE TABLE IF NOT EXISTS logs (
    id      INTEGER PRIMARY KEY AUTOINCREMENT,
    ts      INTEGER NOT NULL,
    level   TEXT NOT NULL,
    message TEXT NOT NULL,
    module  TEXT NOT NULL,
    trace   TEXT
);
"#;

pub const LOGS_TS_INDEX_DDL: &str = r#"
CREATE INDEX IF NOT EXISTS idx_logs_ts ON logs(ts);
"#;

/// Initialize the database schema.
///
/// Creates all tables and indexes if they don't exist. Failure here is
/// fatal at startup; the caller should not continue without a schema.
pub async fn init_schema(pool: &SqlitePool) -> Result<(), StorageError> {
    for ddl in [
        PING_RESULTS_TABLE_DDL,
        PING_RESULTS_IP_TS_INDEX_DDL,
        PING_RESULTS_TS_INDEX_DDL,
        LOGS_TABLE_DDL,
        LOGS_TS_INDEX_DDL,
    ] {
        sqlx::query(ddl).execute(pool).await?;
    }

    tracing::info!("Database schema initialized");
    Ok(())
}
