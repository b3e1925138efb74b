//! Structured log sink: append-only diagnostic rows in the `logs` table.
//!
//! Every component may write here concurrently within a sweep; reads are
//! filtered, limited, and newest-first.

use sqlx::Row;
use std::str::FromStr;

use crate::storage::db::Db;
use crate::storage::types::{LogEntry, LogLevel};
use crate::storage::StorageError;

/// Default number of rows returned by log queries.
const DEFAULT_LIMIT: u32 = 100;

/// Hard cap on rows returned by a single query.
const MAX_LIMIT: u32 = 10_000;

/// Filters for reading log entries.
#[derive(Debug, Clone, Default)]
pub struct LogQuery {
    pub level: Option<LogLevel>,
    pub module: Option<String>,
    pub limit: Option<u32>,
}

/// Handle to the `logs` table. Cheap to clone.
#[derive(Clone)]
pub struct LogStore {
    db: Db,
}

impl std::fmt::Debug for LogStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogStore").finish_non_exhaustive()
    }
}

impl LogStore {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    /// Append one log row.
    pub async fn insert(&self, entry: &LogEntry) -> Result<i64, StorageError> {
        let result = sqlx::query(
            "INSERT INTO logs (ts, level, message, module, trace) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(entry.ts.timestamp_millis())
        .bind(entry.level.as_ref())
        .bind(&entry.message)
        .bind(&entry.module)
        .bind(&entry.trace)
        .execute(self.db.pool())
        .await?;

        Ok(result.last_insert_rowid())
    }

    /// Append a log row, downgrading persistence failures to a tracing
    /// warning. Diagnostics must never fail the measurement pipeline.
    pub async fn record(
        &self,
        level: LogLevel,
        module: &str,
        message: impl Into<String>,
        trace: Option<String>,
    ) {
        let entry = LogEntry::new(level, module, message, trace);
        if let Err(e) = self.insert(&entry).await {
            tracing::warn!(error = %e, module, "Failed to persist log entry");
        }
    }

    /// Read log entries, optionally filtered by level and module,
    /// most recent first.
    pub async fn query(&self, q: &LogQuery) -> Result<Vec<LogEntry>, StorageError> {
        let limit = q.limit.unwrap_or(DEFAULT_LIMIT).min(MAX_LIMIT);

        let mut sql =
            String::from("SELECT id, ts, level, message, module, trace FROM logs WHERE 1 = 1");
        if q.level.is_some() {
            sql.push_str(" AND level = ?");
        }
        if q.module.is_some() {
            sql.push_str(" AND module = ?");
        }
        sql.push_str(" ORDER BY ts DESC, id DESC LIMIT ?");

        let mut query = sqlx::query(&sql);
        if let Some(level) = q.level {
            query = query.bind(level.as_ref().to_owned());
        }
        if let Some(ref module) = q.module {
            query = query.bind(module);
        }
        query = query.bind(limit);

        let rows = query.fetch_all(self.db.pool()).await?;
        rows.iter()
            .map(|row| {
                let millis: i64 = row.try_get("ts")?;
                let ts = chrono::DateTime::from_timestamp_millis(millis).ok_or_else(|| {
                    StorageError::InvalidData(format!("timestamp out of range: {millis}"))
                })?;
                let level_str: String = row.try_get("level")?;
                Ok(LogEntry {
                    id: Some(row.try_get("id")?),
                    ts,
                    level: LogLevel::from_str(&level_str).unwrap_or(LogLevel::Info),
                    message: row.try_get("message")?,
                    module: row.try_get("module")?,
                    trace: row.try_get("trace")?,
                })
            })
            .collect()
    }
}
