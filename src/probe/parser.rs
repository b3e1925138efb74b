//! Ping output parser.
//!
//! Converts the raw text of the platform `ping` utility into a normalized
//! [`PingStats`] record. Parsing is pure and total: malformed or partial
//! text yields zeroed fields and `success = false`, never an error, so a
//! parse failure converges to the same measurement shape as a probe
//! failure.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// The platform flavor of ping output (and flags).
///
/// An explicit parameter everywhere rather than an OS probe inside the
/// parser, so both dialects are testable on any host.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumString, Display, AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Dialect {
    /// `ping -c N -W secs`, summary: "T packets transmitted, R received, ...".
    Unix,
    /// `ping -n N -w millis`, summary: "Packets: Sent = T, Received = R, ...".
    Windows,
}

impl Dialect {
    /// The dialect of the host this process runs on.
    pub fn native() -> Self {
        if cfg!(windows) {
            Self::Windows
        } else {
            Self::Unix
        }
    }

    /// Flag selecting the echo request count.
    pub fn count_flag(self) -> &'static str {
        match self {
            Self::Unix => "-c",
            Self::Windows => "-n",
        }
    }

    /// Flag selecting the per-reply timeout.
    pub fn timeout_flag(self) -> &'static str {
        match self {
            Self::Unix => "-W",
            Self::Windows => "-w",
        }
    }

    /// Timeout argument in the dialect's unit: seconds on Unix,
    /// milliseconds on Windows.
    pub fn timeout_value(self, timeout: Duration) -> String {
        match self {
            Self::Unix => timeout.as_secs().to_string(),
            Self::Windows => timeout.as_millis().to_string(),
        }
    }
}

/// Normalized ping statistics.
///
/// Latency fields are `None` when the probe produced zero successful
/// responses (or, for `mdev_time`, when the dialect does not report it).
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PingStats {
    pub packets_transmitted: u32,
    pub packets_received: u32,
    pub packets_lost: u32,
    pub loss_percentage: f64,
    pub min_time: Option<f64>,
    pub avg_time: Option<f64>,
    pub max_time: Option<f64>,
    pub mdev_time: Option<f64>,
    pub success: bool,
}

impl PingStats {
    /// The failure-shaped record stored when the probe process itself
    /// fails: zeroed counters, total loss, no latency data.
    pub fn probe_failure() -> Self {
        Self {
            loss_percentage: 100.0,
            ..Self::default()
        }
    }
}

/// Parse raw ping output for the given dialect.
pub fn parse(output: &str, dialect: Dialect) -> PingStats {
    let mut stats = PingStats::default();
    match dialect {
        Dialect::Unix => parse_unix(output, &mut stats),
        Dialect::Windows => parse_windows(output, &mut stats),
    }
    stats.success = stats.packets_received > 0;
    stats
}

/// Windows summary:
/// `    Packets: Sent = 4, Received = 4, Lost = 0 (0% loss),`
/// `    Minimum = 8ms, Maximum = 9ms, Average = 8ms`
fn parse_windows(output: &str, stats: &mut PingStats) {
    for line in output.lines() {
        if line.contains("Packets: Sent =") {
            let parts: Vec<&str> = line.split(',').collect();
            stats.packets_transmitted = int_after_eq(parts.first()).unwrap_or(0);
            stats.packets_received = int_after_eq(parts.get(1)).unwrap_or(0);
            // Lost is recomputed, not trusted from the text.
            stats.packets_lost = stats
                .packets_transmitted
                .saturating_sub(stats.packets_received);
            stats.loss_percentage = parts
                .get(2)
                .and_then(|p| p.split('(').nth(1))
                .and_then(|p| p.split('%').next())
                .and_then(|p| p.trim().parse().ok())
                .unwrap_or(0.0);
        }

        if line.contains("Minimum =") {
            let parts: Vec<&str> = line.split(',').collect();
            stats.min_time = num_after_eq(parts.first());
            stats.max_time = num_after_eq(parts.get(1));
            stats.avg_time = num_after_eq(parts.get(2));
            // Windows ping does not report deviation.
            stats.mdev_time = None;
        }
    }
}

/// Unix summary:
/// `4 packets transmitted, 4 received, 0% packet loss, time 3004ms`
/// `rtt min/avg/max/mdev = 8.164/8.164/8.164/0.000 ms`
fn parse_unix(output: &str, stats: &mut PingStats) {
    for line in output.lines() {
        if line.contains("packets transmitted") {
            let parts: Vec<&str> = line.split(',').collect();
            stats.packets_transmitted = first_int(parts.first()).unwrap_or(0);
            stats.packets_received = first_int(parts.get(1)).unwrap_or(0);
            stats.loss_percentage = parts
                .iter()
                .find(|p| p.contains('%'))
                .and_then(|p| p.trim().split('%').next())
                .and_then(|p| p.trim().parse().ok())
                .unwrap_or(0.0);
            stats.packets_lost = stats
                .packets_transmitted
                .saturating_sub(stats.packets_received);
        }

        if line.contains("min/avg/max/mdev") {
            if let Some(values) = line.split('=').nth(1) {
                let times: Vec<&str> = values.trim().split('/').collect();
                stats.min_time = times.first().and_then(|t| t.trim().parse().ok());
                stats.avg_time = times.get(1).and_then(|t| t.trim().parse().ok());
                stats.max_time = times.get(2).and_then(|t| t.trim().parse().ok());
                // Last field carries the "ms" unit.
                stats.mdev_time = times
                    .get(3)
                    .and_then(|t| t.split_whitespace().next())
                    .and_then(|t| t.parse().ok());
            }
        }
    }
}

fn int_after_eq(part: Option<&&str>) -> Option<u32> {
    part.and_then(|p| p.split('=').nth(1))
        .and_then(|v| v.trim().parse().ok())
}

fn num_after_eq(part: Option<&&str>) -> Option<f64> {
    part.and_then(|p| p.split('=').nth(1))
        .map(|v| v.trim().trim_end_matches("ms").trim())
        .and_then(|v| v.parse().ok())
}

fn first_int(part: Option<&&str>) -> Option<u32> {
    part.and_then(|p| p.split_whitespace().next())
        .and_then(|v| v.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    const UNIX_OUTPUT: &str = "\
PING 8.8.8.8 (8.8.8.8) 56(84) bytes of data.
64 bytes from 8.8.8.8: icmp_seq=1 ttl=117 time=8.16 ms
64 bytes from 8.8.8.8: icmp_seq=2 ttl=117 time=8.21 ms

--- 8.8.8.8 ping statistics ---
4 packets transmitted, 4 received, 0% packet loss, time 3004ms
rtt min/avg/max/mdev = 8.1/8.2/8.3/0.4 ms
";

    const WINDOWS_OUTPUT: &str = "\
Pinging 8.8.8.8 with 32 bytes of data:
Reply from 8.8.8.8: bytes=32 time=8ms TTL=117

Ping statistics for 8.8.8.8:
    Packets: Sent = 4, Received = 4, Lost = 0 (0% loss),
Approximate round trip times in milli-seconds:
    Minimum = 8.1ms, Maximum = 8.3ms, Average = 8.2ms
";

    #[test]
    fn test_parse_unix_full() {
        let stats = parse(UNIX_OUTPUT, Dialect::Unix);

        assert_eq!(stats.packets_transmitted, 4);
        assert_eq!(stats.packets_received, 4);
        assert_eq!(stats.packets_lost, 0);
        assert_eq!(stats.loss_percentage, 0.0);
        assert_eq!(stats.min_time, Some(8.1));
        assert_eq!(stats.avg_time, Some(8.2));
        assert_eq!(stats.max_time, Some(8.3));
        assert_eq!(stats.mdev_time, Some(0.4));
        assert!(stats.success);
    }

    #[test]
    fn test_parse_windows_full() {
        let stats = parse(WINDOWS_OUTPUT, Dialect::Windows);

        assert_eq!(stats.packets_transmitted, 4);
        assert_eq!(stats.packets_received, 4);
        assert_eq!(stats.packets_lost, 0);
        assert_eq!(stats.loss_percentage, 0.0);
        assert_eq!(stats.min_time, Some(8.1));
        assert_eq!(stats.avg_time, Some(8.2));
        assert_eq!(stats.max_time, Some(8.3));
        assert_eq!(stats.mdev_time, None);
        assert!(stats.success);
    }

    #[test]
    fn test_dialects_normalize_equal() {
        // Same true statistics through both dialects: equal up to mdev,
        // which Windows never reports.
        let unix = parse(UNIX_OUTPUT, Dialect::Unix);
        let windows = parse(WINDOWS_OUTPUT, Dialect::Windows);

        assert_eq!(unix.packets_transmitted, windows.packets_transmitted);
        assert_eq!(unix.packets_received, windows.packets_received);
        assert_eq!(unix.packets_lost, windows.packets_lost);
        assert_eq!(unix.loss_percentage, windows.loss_percentage);
        assert_eq!(unix.min_time, windows.min_time);
        assert_eq!(unix.avg_time, windows.avg_time);
        assert_eq!(unix.max_time, windows.max_time);
        assert_eq!(unix.success, windows.success);
    }

    #[test]
    fn test_parse_unix_with_loss() {
        let output = "\
--- 10.0.0.1 ping statistics ---
4 packets transmitted, 3 received, 25% packet loss, time 3010ms
rtt min/avg/max/mdev = 9.0/10.0/11.0/0.8 ms
";
        let stats = parse(output, Dialect::Unix);
        assert_eq!(stats.packets_transmitted, 4);
        assert_eq!(stats.packets_received, 3);
        assert_eq!(stats.packets_lost, 1);
        assert_eq!(stats.loss_percentage, 25.0);
        assert!(stats.success);
    }

    #[test]
    fn test_parse_windows_lost_recomputed() {
        // The Lost figure in the text is ignored; lost comes from
        // transmitted - received.
        let output = "    Packets: Sent = 4, Received = 1, Lost = 9 (75% loss),";
        let stats = parse(output, Dialect::Windows);
        assert_eq!(stats.packets_lost, 3);
        assert_eq!(stats.loss_percentage, 75.0);
    }

    #[test]
    fn test_parse_total_loss_has_no_latency() {
        let output = "\
--- 10.0.0.1 ping statistics ---
4 packets transmitted, 0 received, 100% packet loss, time 3100ms
";
        let stats = parse(output, Dialect::Unix);
        assert_eq!(stats.packets_transmitted, 4);
        assert_eq!(stats.packets_received, 0);
        assert_eq!(stats.packets_lost, 4);
        assert_eq!(stats.loss_percentage, 100.0);
        assert_eq!(stats.avg_time, None);
        assert!(!stats.success);
    }

    #[test]
    fn test_parse_garbage_yields_zeroed_failure() {
        for dialect in [Dialect::Unix, Dialect::Windows] {
            let stats = parse("no ping output here at all", dialect);
            assert_eq!(stats.packets_transmitted, 0);
            assert_eq!(stats.packets_received, 0);
            assert_eq!(stats.avg_time, None);
            assert!(!stats.success);
        }
    }

    #[test]
    fn test_packet_invariant_holds() {
        for output in [UNIX_OUTPUT, "4 packets transmitted, 3 received, 25% packet loss"] {
            let stats = parse(output, Dialect::Unix);
            assert_eq!(
                stats.packets_transmitted,
                stats.packets_received + stats.packets_lost
            );
        }
    }

    #[test]
    fn test_probe_failure_shape() {
        let stats = PingStats::probe_failure();
        assert_eq!(stats.packets_transmitted, 0);
        assert_eq!(stats.loss_percentage, 100.0);
        assert_eq!(stats.avg_time, None);
        assert!(!stats.success);
    }

    #[test]
    fn test_dialect_flags_and_timeout_units() {
        let timeout = Duration::from_secs(5);
        assert_eq!(Dialect::Unix.count_flag(), "-c");
        assert_eq!(Dialect::Unix.timeout_flag(), "-W");
        assert_eq!(Dialect::Unix.timeout_value(timeout), "5");
        assert_eq!(Dialect::Windows.count_flag(), "-n");
        assert_eq!(Dialect::Windows.timeout_flag(), "-w");
        assert_eq!(Dialect::Windows.timeout_value(timeout), "5000");
    }
}
