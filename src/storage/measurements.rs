//! Measurement store: append-only writes and the read contract consumed
//! by the reporting layer.
//!
//! All SQL that touches caller-supplied input uses bound parameters; the
//! country filter is assembled from `?` placeholders only.

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use strum_macros::{AsRefStr, Display, EnumString};

use crate::storage::db::Db;
use crate::storage::types::{is_stale, Concern, Measurement};
use crate::storage::StorageError;

/// Default number of rows returned by history queries.
const DEFAULT_LIMIT: u32 = 100;

/// Hard cap on rows returned by a single query.
const MAX_LIMIT: u32 = 10_000;

// =============================================================================
// Query Types
// =============================================================================

/// Time bucket width for aggregated latency series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, EnumString, Display, AsRefStr)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum TimeGranularity {
    #[default]
    Minute,
    Hour,
    Day,
}

impl TimeGranularity {
    /// strftime format applied to the row timestamp. Static strings only;
    /// never interpolate caller input here.
    fn format(self) -> &'static str {
        match self {
            Self::Minute => "%Y-%m-%d %H:%M",
            Self::Hour => "%Y-%m-%d %H:00",
            Self::Day => "%Y-%m-%d",
        }
    }
}

/// Query for bucketed latency averages over a time window.
#[derive(Debug, Clone)]
pub struct BucketedQuery {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    /// Empty means all countries.
    pub countries: Vec<String>,
    pub granularity: TimeGranularity,
}

/// One aggregated point: average latency for a country within a bucket.
#[derive(Debug, Clone, serde::Serialize)]
pub struct BucketedRow {
    pub bucket: String,
    pub country: String,
    /// None when no probe in the bucket produced replies.
    pub avg_latency: Option<f64>,
}

/// Latest known state of one target, for the fleet status view.
#[derive(Debug, Clone, serde::Serialize)]
pub struct TargetStatus {
    pub server_ip: String,
    pub country: String,
    pub partner: String,
    pub dn_ext: String,
    pub last_check: DateTime<Utc>,
    pub avg_time: Option<f64>,
    pub success: bool,
    pub is_high_latency: bool,
    pub stale: bool,
}

// =============================================================================
// Store
// =============================================================================

/// Handle to the `ping_results` table.
///
/// Cheap to clone; pass one to each component that needs it instead of
/// sharing ambient global state.
#[derive(Clone)]
pub struct MeasurementStore {
    db: Db,
}

impl std::fmt::Debug for MeasurementStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MeasurementStore").finish_non_exhaustive()
    }
}

impl MeasurementStore {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    /// Append one measurement row. Never updates or deletes.
    pub async fn insert(&self, m: &Measurement) -> Result<i64, StorageError> {
        let concerns = serde_json::to_string(&m.concerns)?;
        let result = sqlx::query(
            "INSERT INTO ping_results (
                server_ip, country, partner, dn_ext, ts,
                packets_transmitted, packets_received, packets_lost, loss_percentage,
                min_time, avg_time, max_time, mdev_time,
                is_high_latency, success, concerns
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&m.server_ip)
        .bind(&m.country)
        .bind(&m.partner)
        .bind(&m.dn_ext)
        .bind(m.ts.timestamp_millis())
        .bind(m.packets_transmitted)
        .bind(m.packets_received)
        .bind(m.packets_lost)
        .bind(m.loss_percentage)
        .bind(m.min_time)
        .bind(m.avg_time)
        .bind(m.max_time)
        .bind(m.mdev_time)
        .bind(m.is_high_latency)
        .bind(m.success)
        .bind(concerns)
        .execute(self.db.pool())
        .await?;

        Ok(result.last_insert_rowid())
    }

    /// Bucketed latency averages in `[start, end]`, grouped by country,
    /// ordered by bucket (so each country's series is time-ascending).
    pub async fn bucketed(&self, q: &BucketedQuery) -> Result<Vec<BucketedRow>, StorageError> {
        validate_range(q.start, q.end)?;

        let mut sql = format!(
            "SELECT strftime('{}', ts / 1000, 'unixepoch') AS bucket,
                    country,
                    ROUND(AVG(avg_time), 2) AS avg_latency
             FROM ping_results
             WHERE ts >= ? AND ts <= ?",
            q.granularity.format()
        );
        if !q.countries.is_empty() {
            sql.push_str(" AND country IN (");
            sql.push_str(&vec!["?"; q.countries.len()].join(","));
            sql.push(')');
        }
        sql.push_str(" GROUP BY bucket, country ORDER BY bucket, country");

        let mut query = sqlx::query(&sql)
            .bind(q.start.timestamp_millis())
            .bind(q.end.timestamp_millis());
        for country in &q.countries {
            query = query.bind(country);
        }

        let rows = query.fetch_all(self.db.pool()).await?;
        rows.iter()
            .map(|row| {
                Ok(BucketedRow {
                    bucket: row.try_get("bucket")?,
                    country: row.try_get("country")?,
                    avg_latency: row.try_get("avg_latency")?,
                })
            })
            .collect()
    }

    /// Newest row per target, with the staleness flag applied.
    pub async fn latest_per_target(&self) -> Result<Vec<TargetStatus>, StorageError> {
        let rows = sqlx::query(
            "SELECT m.server_ip, m.country, m.partner, m.dn_ext, m.ts,
                    m.avg_time, m.success, m.is_high_latency
             FROM ping_results m
             JOIN (
                 SELECT server_ip, MAX(ts) AS max_ts
                 FROM ping_results
                 GROUP BY server_ip
             ) latest ON m.server_ip = latest.server_ip AND m.ts = latest.max_ts
             GROUP BY m.server_ip
             ORDER BY m.country, m.server_ip",
        )
        .fetch_all(self.db.pool())
        .await?;

        let now = Utc::now();
        rows.iter()
            .map(|row| {
                let last_check = timestamp_from_row(row, "ts")?;
                Ok(TargetStatus {
                    server_ip: row.try_get("server_ip")?,
                    country: row.try_get("country")?,
                    partner: row.try_get("partner")?,
                    dn_ext: row.try_get("dn_ext")?,
                    last_check,
                    avg_time: row.try_get("avg_time")?,
                    success: row.try_get("success")?,
                    is_high_latency: row.try_get("is_high_latency")?,
                    stale: is_stale(last_check, now),
                })
            })
            .collect()
    }

    /// Recent history for one target, newest first.
    pub async fn history(
        &self,
        server_ip: &str,
        limit: Option<u32>,
    ) -> Result<Vec<Measurement>, StorageError> {
        let limit = limit.unwrap_or(DEFAULT_LIMIT).min(MAX_LIMIT);

        let rows = sqlx::query(
            "SELECT id, server_ip, country, partner, dn_ext, ts,
                    packets_transmitted, packets_received, packets_lost, loss_percentage,
                    min_time, avg_time, max_time, mdev_time,
                    is_high_latency, success, concerns
             FROM ping_results
             WHERE server_ip = ?
             ORDER BY ts DESC, id DESC
             LIMIT ?",
        )
        .bind(server_ip)
        .bind(limit)
        .fetch_all(self.db.pool())
        .await?;

        rows.iter().map(measurement_from_row).collect()
    }

    /// Raw rows in `[start, end]`, time-ascending, for export.
    pub async fn export(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Measurement>, StorageError> {
        validate_range(start, end)?;

        let rows = sqlx::query(
            "SELECT id, server_ip, country, partner, dn_ext, ts,
                    packets_transmitted, packets_received, packets_lost, loss_percentage,
                    min_time, avg_time, max_time, mdev_time,
                    is_high_latency, success, concerns
             FROM ping_results
             WHERE ts >= ? AND ts <= ?
             ORDER BY ts ASC, id ASC",
        )
        .bind(start.timestamp_millis())
        .bind(end.timestamp_millis())
        .fetch_all(self.db.pool())
        .await?;

        rows.iter().map(measurement_from_row).collect()
    }
}

// =============================================================================
// Helpers
// =============================================================================

fn validate_range(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<(), StorageError> {
    if start > end {
        return Err(StorageError::InvalidQuery(format!(
            "time range start ({start}) is after end ({end})"
        )));
    }
    Ok(())
}

fn timestamp_from_row(row: &SqliteRow, column: &str) -> Result<DateTime<Utc>, StorageError> {
    let millis: i64 = row.try_get(column)?;
    DateTime::from_timestamp_millis(millis)
        .ok_or_else(|| StorageError::InvalidData(format!("timestamp out of range: {millis}")))
}

fn measurement_from_row(row: &SqliteRow) -> Result<Measurement, StorageError> {
    let concerns_json: String = row.try_get("concerns")?;
    let concerns: Vec<Concern> = serde_json::from_str(&concerns_json).unwrap_or_else(|e| {
        tracing::debug!(error = %e, raw = %concerns_json, "Unparseable concern list, returning empty");
        Vec::new()
    });

    Ok(Measurement {
        id: Some(row.try_get("id")?),
        server_ip: row.try_get("server_ip")?,
        country: row.try_get("country")?,
        partner: row.try_get("partner")?,
        dn_ext: row.try_get("dn_ext")?,
        ts: timestamp_from_row(row, "ts")?,
        packets_transmitted: row.try_get::<i64, _>("packets_transmitted")?.try_into().unwrap_or(0),
        packets_received: row.try_get::<i64, _>("packets_received")?.try_into().unwrap_or(0),
        packets_lost: row.try_get::<i64, _>("packets_lost")?.try_into().unwrap_or(0),
        loss_percentage: row.try_get("loss_percentage")?,
        min_time: row.try_get("min_time")?,
        avg_time: row.try_get("avg_time")?,
        max_time: row.try_get("max_time")?,
        mdev_time: row.try_get("mdev_time")?,
        is_high_latency: row.try_get("is_high_latency")?,
        success: row.try_get("success")?,
        concerns,
    })
}
