//! Core data types for the storage layer.
//!
//! This module defines the rows persisted by the measurement pipeline:
//!
//! - [`Measurement`]: one probe result per target per sweep (`ping_results` table)
//! - [`Concern`]: a secondary-threshold flag attached to a measurement
//! - [`LogEntry`]: diagnostic log rows (`logs` table)
//! - [`LogLevel`]: log severity levels

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Freshness window: a target whose newest measurement is older than this
/// is considered stale.
pub const STALE_AFTER_SECS: i64 = 300;

/// The one staleness predicate, shared by the all-targets and
/// single-target views.
pub fn is_stale(last: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    now - last >= Duration::seconds(STALE_AFTER_SECS)
}

/// Log severity levels, stored uppercase as in the `logs.level` column.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumString, Display, AsRefStr,
)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE", ascii_case_insensitive)]
pub enum LogLevel {
    /// Verbose diagnostic information.
    Debug,
    /// Normal operational information.
    Info,
    /// Potential issue that may require attention.
    Warning,
    /// Error condition requiring investigation.
    Error,
    /// Severe failure requiring immediate action.
    Critical,
}

/// A diagnostic log row in the `logs` table. Append-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    /// Auto-generated row identifier.
    pub id: Option<i64>,
    /// Entry timestamp (UTC).
    pub ts: DateTime<Utc>,
    /// Severity level.
    pub level: LogLevel,
    /// Short human-readable description.
    pub message: String,
    /// Component that produced the entry (e.g. "PING", "SERVER").
    pub module: String,
    /// Captured failure trace, if any.
    pub trace: Option<String>,
}

impl LogEntry {
    /// Create a new log entry timestamped now.
    pub fn new(
        level: LogLevel,
        module: impl Into<String>,
        message: impl Into<String>,
        trace: Option<String>,
    ) -> Self {
        Self {
            id: None,
            ts: Utc::now(),
            level,
            message: message.into(),
            module: module.into(),
            trace,
        }
    }
}

/// Kinds of concern a measurement can raise.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumString, Display, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum ConcernKind {
    /// Average latency above the critical boundary.
    VeryHighLatency,
    /// Latency variation (mdev) above the jitter threshold.
    HighJitter,
    /// Packet loss above the loss threshold.
    PacketLoss,
}

/// A single concern raised for a measurement.
///
/// Concerns are persisted as an ordered JSON array in the `concerns`
/// column, so the read side needs no bespoke parser.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Concern {
    /// What crossed a threshold.
    pub kind: ConcernKind,
    /// The observed value, human-readable (e.g. "312.4ms").
    pub detail: String,
}

impl Concern {
    pub fn new(kind: ConcernKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }
}

/// One probe result row in the `ping_results` table.
///
/// Exactly one row is written per target per sweep, including total probe
/// failures (zeroed counters, `success = false`). Rows are never updated
/// or deleted by the core; "latest for a target" is a max-timestamp query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Measurement {
    /// Auto-generated row identifier.
    pub id: Option<i64>,
    /// Probed host address.
    pub server_ip: String,
    /// Target country label.
    pub country: String,
    /// Partner operating the target.
    pub partner: String,
    /// Domain extension label.
    pub dn_ext: String,
    /// Creation time, set once by the sweep (UTC).
    pub ts: DateTime<Utc>,
    /// Echo requests sent.
    pub packets_transmitted: u32,
    /// Echo replies received.
    pub packets_received: u32,
    /// transmitted - received, recomputed rather than trusted from text.
    pub packets_lost: u32,
    /// Loss percentage in 0..=100.
    pub loss_percentage: f64,
    /// Minimum round-trip time in ms; None when no reply arrived.
    pub min_time: Option<f64>,
    /// Average round-trip time in ms; None when no reply arrived.
    pub avg_time: Option<f64>,
    /// Maximum round-trip time in ms; None when no reply arrived.
    pub max_time: Option<f64>,
    /// Round-trip deviation in ms; None on Windows output or no reply.
    pub mdev_time: Option<f64>,
    /// Average latency exceeded the "fair" threshold.
    pub is_high_latency: bool,
    /// At least one reply arrived.
    pub success: bool,
    /// Ordered concern list (latency, then jitter, then loss).
    pub concerns: Vec<Concern>,
}
