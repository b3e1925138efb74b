//! Latency classification.
//!
//! Pure functions from parsed ping statistics plus configured thresholds
//! to a quality bucket and a set of concerns. No I/O and no clock here;
//! alerting side effects live with the sweep that calls this.

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

use super::parser::PingStats;
use crate::storage::{Concern, ConcernKind};

/// Jitter (mdev) above this raises a concern.
pub const HIGH_JITTER_MS: f64 = 50.0;

/// Packet loss above this percentage raises a concern.
pub const PACKET_LOSS_PCT: f64 = 1.0;

/// Latency quality bucket, ordered best to worst.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumString, Display, AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum LatencyBucket {
    Excellent,
    Good,
    Fair,
    Poor,
    Critical,
    /// No latency data: the probe produced zero successful responses.
    Failed,
}

/// Ascending latency boundaries in milliseconds. A sample lands in a
/// bucket when its average is <= that bucket's boundary; beyond `poor`
/// it is critical.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatencyThresholds {
    pub excellent: f64,
    pub good: f64,
    pub fair: f64,
    pub poor: f64,
}

impl Default for LatencyThresholds {
    fn default() -> Self {
        Self {
            excellent: 20.0,
            good: 50.0,
            fair: 100.0,
            poor: 200.0,
        }
    }
}

impl LatencyThresholds {
    /// Boundaries must be strictly ascending and positive.
    pub fn validate(&self) -> Result<(), String> {
        let bounds = [self.excellent, self.good, self.fair, self.poor];
        if bounds.iter().any(|b| *b <= 0.0) {
            return Err("latency thresholds must be positive".to_string());
        }
        if !bounds.windows(2).all(|w| w[0] < w[1]) {
            return Err(format!(
                "latency thresholds must be strictly ascending: {:.1} < {:.1} < {:.1} < {:.1}",
                self.excellent, self.good, self.fair, self.poor
            ));
        }
        Ok(())
    }
}

/// Operator alerting limits, checked independently of bucketing.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertThresholds {
    pub max_latency_ms: f64,
    pub max_packet_loss_pct: f64,
    pub max_jitter_ms: f64,
}

impl Default for AlertThresholds {
    fn default() -> Self {
        Self {
            max_latency_ms: 200.0,
            max_packet_loss_pct: 5.0,
            max_jitter_ms: 100.0,
        }
    }
}

/// Result of classifying one sample.
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub bucket: LatencyBucket,
    /// True when the average sits above the `fair` boundary.
    pub is_high_latency: bool,
    pub concerns: Vec<Concern>,
}

/// Bucket a sample and collect its concerns.
///
/// A sample without an average (total loss or unparseable output)
/// classifies as [`LatencyBucket::Failed`] with no concerns.
pub fn classify(stats: &PingStats, thresholds: &LatencyThresholds) -> Classification {
    let Some(avg) = stats.avg_time else {
        return Classification {
            bucket: LatencyBucket::Failed,
            is_high_latency: false,
            concerns: Vec::new(),
        };
    };

    let bucket = if avg <= thresholds.excellent {
        LatencyBucket::Excellent
    } else if avg <= thresholds.good {
        LatencyBucket::Good
    } else if avg <= thresholds.fair {
        LatencyBucket::Fair
    } else if avg <= thresholds.poor {
        LatencyBucket::Poor
    } else {
        LatencyBucket::Critical
    };

    let mut concerns = Vec::new();
    if avg > thresholds.poor {
        concerns.push(Concern::new(
            ConcernKind::VeryHighLatency,
            format!("avg {avg:.1}ms exceeds {:.1}ms", thresholds.poor),
        ));
    }
    if let Some(mdev) = stats.mdev_time {
        if mdev > HIGH_JITTER_MS {
            concerns.push(Concern::new(
                ConcernKind::HighJitter,
                format!("mdev {mdev:.1}ms exceeds {HIGH_JITTER_MS:.1}ms"),
            ));
        }
    }
    if stats.loss_percentage > PACKET_LOSS_PCT {
        concerns.push(Concern::new(
            ConcernKind::PacketLoss,
            format!("{:.1}% packet loss", stats.loss_percentage),
        ));
    }

    Classification {
        bucket,
        is_high_latency: avg > thresholds.fair,
        concerns,
    }
}

/// Check a sample against operator alert limits. Returns one message
/// per breached limit; empty when all limits hold or the probe failed.
pub fn check_alert_conditions(stats: &PingStats, alerts: &AlertThresholds) -> Vec<String> {
    let mut breaches = Vec::new();
    if let Some(avg) = stats.avg_time {
        if avg > alerts.max_latency_ms {
            breaches.push(format!(
                "latency {avg:.1}ms exceeds limit {:.1}ms",
                alerts.max_latency_ms
            ));
        }
    }
    if stats.success && stats.loss_percentage > alerts.max_packet_loss_pct {
        breaches.push(format!(
            "packet loss {:.1}% exceeds limit {:.1}%",
            stats.loss_percentage, alerts.max_packet_loss_pct
        ));
    }
    if let Some(mdev) = stats.mdev_time {
        if mdev > alerts.max_jitter_ms {
            breaches.push(format!(
                "jitter {mdev:.1}ms exceeds limit {:.1}ms",
                alerts.max_jitter_ms
            ));
        }
    }
    breaches
}
